use serde::{Deserialize, Serialize};

/// Storage directory (relative to the media root) for place images.
pub const UPLOAD_DIR: &str = "places";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub id: i64,
    pub title: String,
    pub description_short: String,
    /// Rich-text markup, stored and returned verbatim.
    pub description_long: String,
    pub lat: f64,
    pub lng: f64,
}

/// Field values for creating or fully replacing a place.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NewPlace {
    pub title: String,
    pub description_short: String,
    pub description_long: String,
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub id: i64,
    pub place_id: i64,
    /// Name of the blob inside the image store, e.g. `places/a.jpg`.
    pub blob_ref: String,
    pub position: u32,
}

#[derive(Debug, Clone)]
pub struct PlaceWithImages {
    pub place: Place,
    /// Sorted by position, then insertion order.
    pub images: Vec<Image>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "FeatureCollection")]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "Feature")]
pub struct Feature {
    pub geometry: Geometry,
    pub properties: FeatureProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
    /// GeoJSON positions are longitude first.
    Point { coordinates: [f64; 2] },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureProperties {
    pub title: String,
    pub place_id: i64,
    pub details_url: String,
}

impl Feature {
    pub fn from_place(place: &Place) -> Self {
        Self {
            geometry: Geometry::Point {
                coordinates: [place.lng, place.lat],
            },
            properties: FeatureProperties {
                title: place.title.clone(),
                place_id: place.id,
                details_url: details_url(place.id),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceDetail {
    pub title: String,
    pub imgs: Vec<String>,
    pub description_short: String,
    pub description_long: String,
    pub coordinates: DetailCoordinates,
}

/// Coordinates as decimal strings; existing consumers expect strings here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailCoordinates {
    pub lng: String,
    pub lat: String,
}

impl DetailCoordinates {
    pub fn from_place(place: &Place) -> Self {
        Self {
            lng: format_coordinate(place.lng),
            lat: format_coordinate(place.lat),
        }
    }
}

pub fn details_url(place_id: i64) -> String {
    format!("/places/{}/", place_id)
}

/// Shortest round-trip form of a coordinate, written the way Python's
/// `repr(float)` writes it: plain decimals for exponents in `-4..16`, with a
/// trailing `.0` on whole numbers, and `5e-05` / `1e+16` style outside.
pub fn format_coordinate(value: f64) -> String {
    if !value.is_finite() || value == 0.0 {
        return decimal_form(value);
    }

    let scientific = format!("{:e}", value);
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return decimal_form(value);
    };
    let Ok(exponent) = exponent.parse::<i32>() else {
        return decimal_form(value);
    };

    if (-4..16).contains(&exponent) {
        decimal_form(value)
    } else {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", mantissa, sign, exponent.abs())
    }
}

fn decimal_form(value: f64) -> String {
    let formatted = value.to_string();
    if value.is_finite() && !formatted.contains('.') {
        format!("{}.0", formatted)
    } else {
        formatted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lake() -> Place {
        Place {
            id: 7,
            title: "Lake".to_string(),
            description_short: String::new(),
            description_long: String::new(),
            lat: 20.25,
            lng: 10.5,
        }
    }

    #[test]
    fn test_feature_coordinates_are_lng_first() {
        let feature = serde_json::to_value(Feature::from_place(&lake())).unwrap();

        assert_eq!(
            feature,
            json!({
                "type": "Feature",
                "geometry": {"type": "Point", "coordinates": [10.5, 20.25]},
                "properties": {"title": "Lake", "placeId": 7, "detailsUrl": "/places/7/"}
            })
        );
    }

    #[test]
    fn test_empty_feature_collection() {
        let collection = FeatureCollection { features: vec![] };
        assert_eq!(
            serde_json::to_string(&collection).unwrap(),
            r#"{"type":"FeatureCollection","features":[]}"#
        );
    }

    #[test]
    fn test_format_coordinate() {
        assert_eq!(format_coordinate(10.5), "10.5");
        assert_eq!(format_coordinate(20.25), "20.25");
        assert_eq!(format_coordinate(37.0), "37.0");
        assert_eq!(format_coordinate(-0.1275), "-0.1275");
        assert_eq!(format_coordinate(55.753676), "55.753676");
        assert_eq!(format_coordinate(0.0), "0.0");
        assert_eq!(format_coordinate(-0.0), "-0.0");
    }

    #[test]
    fn test_format_coordinate_exponent_form() {
        assert_eq!(format_coordinate(0.0001), "0.0001");
        assert_eq!(format_coordinate(0.00005), "5e-05");
        assert_eq!(format_coordinate(-0.00005), "-5e-05");
        assert_eq!(format_coordinate(1.5e-7), "1.5e-07");
        assert_eq!(format_coordinate(1e-100), "1e-100");
        assert_eq!(format_coordinate(1e15), "1000000000000000.0");
        assert_eq!(format_coordinate(1e16), "1e+16");
        assert_eq!(format_coordinate(1.25e20), "1.25e+20");
    }

    #[test]
    fn test_detail_coordinates_are_strings() {
        let coordinates = serde_json::to_value(DetailCoordinates::from_place(&lake())).unwrap();
        assert_eq!(coordinates, json!({"lng": "10.5", "lat": "20.25"}));
    }
}
