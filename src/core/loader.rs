use crate::adapters::sqlite::Database;
use crate::config::LoaderConfig;
use crate::domain::model::{NewPlace, PlaceWithImages, UPLOAD_DIR};
use crate::domain::ports::ImageStore;
use crate::utils::error::{PlacesError, Result};
use crate::utils::validation::validate_url;
use reqwest::Client;
use serde::{Deserialize, Deserializer};
use std::time::Duration;
use url::Url;

/// Remote description of a single place.
#[derive(Debug, Clone, Deserialize)]
pub struct PlaceDocument {
    pub title: String,
    #[serde(default)]
    pub description_short: Option<String>,
    #[serde(default)]
    pub description_long: Option<String>,
    pub coordinates: DocumentCoordinates,
    #[serde(default)]
    pub imgs: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct DocumentCoordinates {
    #[serde(deserialize_with = "coordinate")]
    pub lng: f64,
    #[serde(deserialize_with = "coordinate")]
    pub lat: f64,
}

/// Documents in the wild carry coordinates both as numbers and as
/// numeric strings such as `"37.50169"`.
fn coordinate<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(value) => Ok(value),
        Raw::Text(text) => text.trim().parse::<f64>().map_err(|_| {
            serde::de::Error::custom(format!("invalid coordinate '{}'", text))
        }),
    }
}

impl PlaceDocument {
    pub fn to_new_place(&self) -> NewPlace {
        NewPlace {
            title: self.title.clone(),
            description_short: self.description_short.clone().unwrap_or_default(),
            description_long: self.description_long.clone().unwrap_or_default(),
            lat: self.coordinates.lat,
            lng: self.coordinates.lng,
        }
    }

    pub fn image_urls(&self) -> &[String] {
        self.imgs.as_deref().unwrap_or_default()
    }
}

struct DownloadedImage {
    filename: String,
    data: Vec<u8>,
    position: u32,
}

/// Creates one place with its images from a remote JSON document.
///
/// Fetches run one at a time: the document first, then each image in array
/// order. Nothing is written until every fetch has succeeded, and a failure
/// while writing removes the blobs stored so far, so a failed load leaves no
/// place behind.
pub struct PlaceLoader<S: ImageStore> {
    db: Database,
    images: S,
    client: Client,
}

impl<S: ImageStore> PlaceLoader<S> {
    pub fn new(db: Database, images: S, config: &LoaderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.fetch_timeout_secs))
            .build()?;

        Ok(Self { db, images, client })
    }

    pub async fn load(&self, json_url: &str) -> Result<PlaceWithImages> {
        let json_url = validate_url("json_url", json_url)?;

        let document = self.fetch_document(&json_url).await?;
        tracing::info!(
            "Fetched '{}' with {} images",
            document.title,
            document.image_urls().len()
        );

        let mut downloads = Vec::with_capacity(document.image_urls().len());
        for (position, image_url) in document.image_urls().iter().enumerate() {
            let filename = image_filename(image_url)?;
            let data = self.fetch_bytes(image_url).await?;
            downloads.push(DownloadedImage {
                filename,
                data,
                position: position as u32,
            });
        }

        let mut stored: Vec<(String, u32)> = Vec::with_capacity(downloads.len());
        for download in &downloads {
            let name = format!("{}/{}", UPLOAD_DIR, download.filename);
            match self.images.store(&name, &download.data).await {
                Ok(blob_ref) => stored.push((blob_ref, download.position)),
                Err(e) => {
                    self.discard(&stored).await;
                    return Err(e);
                }
            }
        }

        let inserted = self
            .db
            .connect()
            .and_then(|mut repo| repo.insert_place_with_images(&document.to_new_place(), &stored));

        match inserted {
            Ok(created) => {
                tracing::info!(
                    "Created place {} '{}' with {} images",
                    created.place.id,
                    created.place.title,
                    created.images.len()
                );
                Ok(created)
            }
            Err(e) => {
                self.discard(&stored).await;
                Err(e)
            }
        }
    }

    async fn fetch_document(&self, url: &Url) -> Result<PlaceDocument> {
        let body = self.fetch_bytes(url.as_str()).await?;

        serde_json::from_slice(&body).map_err(|e| PlacesError::ParseError {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        tracing::debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PlacesError::fetch(url, e))?;

        let status = response.status();
        tracing::debug!("Response status for {}: {}", url, status);
        if !status.is_success() {
            return Err(PlacesError::fetch(url, format!("HTTP {}", status)));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| PlacesError::fetch(url, e))?;
        Ok(body.to_vec())
    }

    async fn discard(&self, stored: &[(String, u32)]) {
        for (blob_ref, _) in stored {
            if let Err(e) = self.images.delete(blob_ref).await {
                tracing::warn!("Failed to remove {} after aborted load: {}", blob_ref, e);
            }
        }
    }
}

/// Last non-empty path segment of an image URL; query and fragment are
/// ignored.
pub fn image_filename(image_url: &str) -> Result<String> {
    let url = Url::parse(image_url).map_err(|e| PlacesError::fetch(image_url, e))?;

    let filename = url
        .path_segments()
        .and_then(|segments| segments.filter(|segment| !segment.is_empty()).last())
        .unwrap_or("image");

    Ok(filename.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::storage::LocalImageStore;
    use httpmock::prelude::*;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        db: Database,
        loader: PlaceLoader<LocalImageStore>,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let db = Database::open(dir.path().join("places.db")).unwrap();
        let images = LocalImageStore::new(dir.path().join("media"), "/media/");
        let loader = PlaceLoader::new(db.clone(), images, &LoaderConfig::default()).unwrap();
        Fixture { dir, db, loader }
    }

    #[test]
    fn test_image_filename() {
        assert_eq!(image_filename("http://x/a.jpg").unwrap(), "a.jpg");
        assert_eq!(
            image_filename("https://cdn.example.com/media/2020/photo.png?size=large#top").unwrap(),
            "photo.png"
        );
        assert_eq!(image_filename("http://x/dir/b.jpg/").unwrap(), "b.jpg");
        assert_eq!(image_filename("http://x/").unwrap(), "image");
        assert!(image_filename("not a url").is_err());
    }

    #[test]
    fn test_document_defaults() {
        let document: PlaceDocument = serde_json::from_str(
            r#"{"title":"Lake","coordinates":{"lng":10.5,"lat":20.25}}"#,
        )
        .unwrap();

        let place = document.to_new_place();
        assert_eq!(place.description_short, "");
        assert_eq!(place.description_long, "");
        assert_eq!(place.lng, 10.5);
        assert_eq!(place.lat, 20.25);
        assert!(document.image_urls().is_empty());
    }

    #[tokio::test]
    async fn test_load_place_with_images() {
        let fx = fixture();
        let server = MockServer::start();

        let document_mock = server.mock(|when, then| {
            when.method(GET).path("/lake.json");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(serde_json::json!({
                    "title": "Lake",
                    "description_short": "A lake",
                    "description_long": "<p>Deep water</p>",
                    "coordinates": {"lng": 10.5, "lat": 20.25},
                    "imgs": [server.url("/x/a.jpg"), server.url("/x/b.jpg")]
                }));
        });
        let a_mock = server.mock(|when, then| {
            when.method(GET).path("/x/a.jpg");
            then.status(200).body("image a");
        });
        let b_mock = server.mock(|when, then| {
            when.method(GET).path("/x/b.jpg");
            then.status(200).body("image b");
        });

        let created = fx.loader.load(&server.url("/lake.json")).await.unwrap();

        document_mock.assert();
        a_mock.assert();
        b_mock.assert();

        assert_eq!(created.place.title, "Lake");
        assert_eq!(created.place.description_long, "<p>Deep water</p>");

        let repo = fx.db.connect().unwrap();
        let images = repo.select_images(created.place.id).unwrap();
        let stored: Vec<(&str, u32)> = images
            .iter()
            .map(|image| (image.blob_ref.as_str(), image.position))
            .collect();
        assert_eq!(stored, vec![("places/a.jpg", 0), ("places/b.jpg", 1)]);

        let on_disk = std::fs::read(fx.dir.path().join("media/places/b.jpg")).unwrap();
        assert_eq!(on_disk, b"image b");
    }

    #[tokio::test]
    async fn test_unreachable_document_creates_nothing() {
        let fx = fixture();
        let server = MockServer::start();

        let document_mock = server.mock(|when, then| {
            when.method(GET).path("/missing.json");
            then.status(404);
        });

        let result = fx.loader.load(&server.url("/missing.json")).await;

        document_mock.assert();
        assert!(matches!(result, Err(PlacesError::FetchError { .. })));
        assert!(fx.db.connect().unwrap().select_all().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_required_field_is_parse_error() {
        let fx = fixture();
        let server = MockServer::start();

        server.mock(|when, then| {
            when.method(GET).path("/no-coordinates.json");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(serde_json::json!({"title": "Nowhere"}));
        });

        let result = fx.loader.load(&server.url("/no-coordinates.json")).await;

        assert!(matches!(result, Err(PlacesError::ParseError { .. })));
        assert!(fx.db.connect().unwrap().select_all().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_string_coordinates_are_accepted() {
        let fx = fixture();
        let server = MockServer::start();

        server.mock(|when, then| {
            when.method(GET).path("/vdnh.json");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(serde_json::json!({
                    "title": "VDNH",
                    "coordinates": {"lng": "37.62", "lat": " 55.826 "}
                }));
        });

        let created = fx.loader.load(&server.url("/vdnh.json")).await.unwrap();

        assert_eq!(created.place.lng, 37.62);
        assert_eq!(created.place.lat, 55.826);
        assert!(created.images.is_empty());
    }

    #[tokio::test]
    async fn test_non_numeric_coordinate_is_parse_error() {
        let fx = fixture();
        let server = MockServer::start();

        server.mock(|when, then| {
            when.method(GET).path("/bad-lng.json");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(serde_json::json!({
                    "title": "Nowhere",
                    "coordinates": {"lng": "east", "lat": 55.8}
                }));
        });

        let result = fx.loader.load(&server.url("/bad-lng.json")).await;

        assert!(matches!(result, Err(PlacesError::ParseError { .. })));
        assert!(fx.db.connect().unwrap().select_all().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_document_is_parse_error() {
        let fx = fixture();
        let server = MockServer::start();

        server.mock(|when, then| {
            when.method(GET).path("/broken.json");
            then.status(200).body("{\"title\": ");
        });

        let result = fx.loader.load(&server.url("/broken.json")).await;
        assert!(matches!(result, Err(PlacesError::ParseError { .. })));
    }

    #[tokio::test]
    async fn test_failed_image_aborts_whole_load() {
        let fx = fixture();
        let server = MockServer::start();

        server.mock(|when, then| {
            when.method(GET).path("/lake.json");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(serde_json::json!({
                    "title": "Lake",
                    "coordinates": {"lng": 10.5, "lat": 20.25},
                    "imgs": [server.url("/x/a.jpg"), server.url("/x/gone.jpg")]
                }));
        });
        server.mock(|when, then| {
            when.method(GET).path("/x/a.jpg");
            then.status(200).body("image a");
        });
        server.mock(|when, then| {
            when.method(GET).path("/x/gone.jpg");
            then.status(500);
        });

        let result = fx.loader.load(&server.url("/lake.json")).await;

        assert!(matches!(result, Err(PlacesError::FetchError { .. })));
        assert!(fx.db.connect().unwrap().select_all().unwrap().is_empty());
        assert!(!fx.dir.path().join("media/places/a.jpg").exists());
    }

    #[tokio::test]
    async fn test_rejects_non_http_url() {
        let fx = fixture();
        let result = fx.loader.load("ftp://example.com/place.json").await;
        assert!(matches!(result, Err(PlacesError::InvalidValueError { .. })));
    }
}
