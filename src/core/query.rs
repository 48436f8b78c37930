use crate::adapters::sqlite::Database;
use crate::domain::model::{DetailCoordinates, Feature, FeatureCollection, PlaceDetail};
use crate::domain::ports::ImageStore;
use crate::utils::error::{PlacesError, Result};
use url::Url;

/// Read-only projections of the place store.
pub struct QueryService<S: ImageStore> {
    db: Database,
    images: S,
}

impl<S: ImageStore> QueryService<S> {
    pub fn new(db: Database, images: S) -> Self {
        Self { db, images }
    }

    pub fn images(&self) -> &S {
        &self.images
    }

    /// Every place as a GeoJSON point feature, in store order.
    pub fn places_geojson(&self) -> Result<FeatureCollection> {
        let repo = self.db.connect()?;
        let places = repo.select_all_with_images()?;

        tracing::debug!("Building feature collection for {} places", places.len());

        Ok(FeatureCollection {
            features: places
                .iter()
                .map(|entry| Feature::from_place(&entry.place))
                .collect(),
        })
    }

    /// Detail document for one place; image URLs are made absolute against
    /// `origin` (`scheme://host` of the current request).
    pub fn place_detail(&self, id: i64, origin: &Url) -> Result<PlaceDetail> {
        let repo = self.db.connect()?;
        let place = repo
            .select_by_id(id)?
            .ok_or_else(|| PlacesError::not_found("Place", id))?;

        let imgs = repo
            .select_images(place.id)?
            .iter()
            .map(|image| self.absolute_url(origin, &image.blob_ref))
            .collect::<Result<Vec<String>>>()?;

        Ok(PlaceDetail {
            coordinates: DetailCoordinates::from_place(&place),
            title: place.title,
            imgs,
            description_short: place.description_short,
            description_long: place.description_long,
        })
    }

    fn absolute_url(&self, origin: &Url, blob_ref: &str) -> Result<String> {
        let relative = self.images.url(blob_ref);
        origin
            .join(&relative)
            .map(String::from)
            .map_err(|e| PlacesError::InvalidValueError {
                field: "image url".to_string(),
                value: relative,
                reason: e.to_string(),
            })
    }
}
