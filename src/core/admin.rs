use crate::adapters::sqlite::Database;
use crate::domain::model::{Image, NewPlace, Place, UPLOAD_DIR};
use crate::domain::ports::ImageStore;
use crate::utils::error::{PlacesError, Result};
use std::path::Path;

/// Editing operations used by an administrative surface.
pub struct PlaceAdmin<S: ImageStore> {
    db: Database,
    images: S,
}

impl<S: ImageStore> PlaceAdmin<S> {
    pub fn new(db: Database, images: S) -> Self {
        Self { db, images }
    }

    pub fn create_place(&self, place: &NewPlace) -> Result<Place> {
        let created = self.db.connect()?.insert_place(place)?;
        tracing::info!("Created place {} '{}'", created.id, created.title);
        Ok(created)
    }

    pub fn update_place(&self, id: i64, place: &NewPlace) -> Result<Place> {
        self.db
            .connect()?
            .update_place(id, place)?
            .ok_or_else(|| PlacesError::not_found("Place", id))
    }

    pub fn search_places(&self, query: &str) -> Result<Vec<Place>> {
        self.db.connect()?.search_by_title(query)
    }

    /// Deletes the place, its image rows and their blobs.
    pub async fn delete_place(&self, id: i64) -> Result<()> {
        let images = {
            let repo = self.db.connect()?;
            if repo.select_by_id(id)?.is_none() {
                return Err(PlacesError::not_found("Place", id));
            }
            let images = repo.select_images(id)?;
            repo.delete_place(id)?;
            images
        };

        for image in &images {
            self.delete_blob(&image.blob_ref).await;
        }

        tracing::info!("Deleted place {} and {} images", id, images.len());
        Ok(())
    }

    pub async fn add_image(
        &self,
        place_id: i64,
        filename: &str,
        data: &[u8],
        position: u32,
    ) -> Result<Image> {
        if self.db.connect()?.select_by_id(place_id)?.is_none() {
            return Err(PlacesError::not_found("Place", place_id));
        }

        // Only the final component of an uploaded name is kept.
        let filename = Path::new(filename)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("image");
        let blob_ref = self
            .images
            .store(&format!("{}/{}", UPLOAD_DIR, filename), data)
            .await?;

        let inserted = self
            .db
            .connect()
            .and_then(|repo| repo.insert_image(place_id, &blob_ref, position));

        match inserted {
            Ok(image) => Ok(image),
            Err(e) => {
                self.delete_blob(&blob_ref).await;
                Err(e)
            }
        }
    }

    pub async fn remove_image(&self, image_id: i64) -> Result<()> {
        let image = {
            let repo = self.db.connect()?;
            let image = repo
                .select_image(image_id)?
                .ok_or_else(|| PlacesError::not_found("Image", image_id))?;
            repo.delete_image(image_id)?;
            image
        };

        self.delete_blob(&image.blob_ref).await;
        Ok(())
    }

    /// `ordered_image_ids` must list every image of the place exactly once.
    pub fn reorder_images(&self, place_id: i64, ordered_image_ids: &[i64]) -> Result<()> {
        let mut repo = self.db.connect()?;
        if repo.select_by_id(place_id)?.is_none() {
            return Err(PlacesError::not_found("Place", place_id));
        }
        repo.reorder_images(place_id, ordered_image_ids)
    }

    // Rows are already gone at this point; a leftover blob is only logged.
    async fn delete_blob(&self, blob_ref: &str) {
        if let Err(e) = self.images.delete(blob_ref).await {
            tracing::warn!("Failed to delete image file {}: {}", blob_ref, e);
        }
    }
}
