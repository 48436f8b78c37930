use anyhow::Result;
use httpmock::prelude::*;
use places_map::config::AppConfig;
use places_map::{Database, LocalImageStore, PlaceLoader, PlacesError, QueryService};
use tempfile::TempDir;
use url::Url;

fn config_for(dir: &TempDir) -> AppConfig {
    let mut config = AppConfig::default();
    config.database.path = dir.path().join("db/places.db");
    config.media.root = dir.path().join("media");
    config.loader.fetch_timeout_secs = 5;
    config
}

fn loader_for(config: &AppConfig) -> Result<(Database, PlaceLoader<LocalImageStore>)> {
    let db = Database::open(&config.database.path)?;
    let images = LocalImageStore::from_config(&config.media);
    let loader = PlaceLoader::new(db.clone(), images, &config.loader)?;
    Ok((db, loader))
}

/// The "Lake" document from end to end: load, then read back through the
/// query service.
#[tokio::test]
async fn test_load_then_query() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = config_for(&temp_dir);
    let (db, loader) = loader_for(&config)?;

    let server = MockServer::start();
    let document_mock = server.mock(|when, then| {
        when.method(GET).path("/places/lake.json");
        then.status(200)
            .header("Content-Type", "application/json")
            .json_body(serde_json::json!({
                "title": "Lake",
                "coordinates": {"lng": 10.5, "lat": 20.25},
                "imgs": [server.url("/x/a.jpg"), server.url("/x/b.jpg")]
            }));
    });
    let a_mock = server.mock(|when, then| {
        when.method(GET).path("/x/a.jpg");
        then.status(200).body("first image");
    });
    let b_mock = server.mock(|when, then| {
        when.method(GET).path("/x/b.jpg");
        then.status(200).body("second image");
    });

    let created = loader.load(&server.url("/places/lake.json")).await?;

    document_mock.assert();
    a_mock.assert();
    b_mock.assert();

    assert_eq!(created.place.title, "Lake");
    assert_eq!(created.place.description_short, "");
    assert_eq!(created.place.description_long, "");
    let images: Vec<(&str, u32)> = created
        .images
        .iter()
        .map(|image| (image.blob_ref.as_str(), image.position))
        .collect();
    assert_eq!(images, vec![("places/a.jpg", 0), ("places/b.jpg", 1)]);

    let queries = QueryService::new(db, LocalImageStore::from_config(&config.media));

    let collection = queries.places_geojson()?;
    assert_eq!(collection.features.len(), 1);

    let detail = queries.place_detail(created.place.id, &Url::parse("https://maps.example.com")?)?;
    assert_eq!(
        detail.imgs,
        vec![
            "https://maps.example.com/media/places/a.jpg",
            "https://maps.example.com/media/places/b.jpg"
        ]
    );
    assert_eq!(detail.coordinates.lng, "10.5");
    assert_eq!(detail.coordinates.lat, "20.25");

    Ok(())
}

#[tokio::test]
async fn test_loading_same_document_twice_creates_two_places() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = config_for(&temp_dir);
    let (db, loader) = loader_for(&config)?;

    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/lake.json");
        then.status(200)
            .header("Content-Type", "application/json")
            .json_body(serde_json::json!({
                "title": "Lake",
                "coordinates": {"lng": 10.5, "lat": 20.25},
                "imgs": [server.url("/x/a.jpg")]
            }));
    });
    server.mock(|when, then| {
        when.method(GET).path("/x/a.jpg");
        then.status(200).body("image");
    });

    let first = loader.load(&server.url("/lake.json")).await?;
    let second = loader.load(&server.url("/lake.json")).await?;

    assert_ne!(first.place.id, second.place.id);
    assert_eq!(first.images[0].blob_ref, "places/a.jpg");
    assert_eq!(second.images[0].blob_ref, "places/a_1.jpg");
    assert_eq!(db.connect()?.select_all()?.len(), 2);

    Ok(())
}

#[tokio::test]
async fn test_unreachable_host_is_fatal() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = config_for(&temp_dir);
    let (db, loader) = loader_for(&config)?;

    // Nothing listens on the discard port
    let result = loader.load("http://127.0.0.1:9/place.json").await;

    let err = result.expect_err("load should fail");
    assert!(matches!(err, PlacesError::FetchError { .. }));
    assert_eq!(err.exit_code(), 1);
    assert!(db.connect()?.select_all()?.is_empty());

    Ok(())
}
