// Domain layer: records, output documents and the image store port.

pub mod model;
pub mod ports;
