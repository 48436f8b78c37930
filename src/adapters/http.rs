use crate::adapters::sqlite::Database;
use crate::adapters::storage::LocalImageStore;
use crate::config::AppConfig;
use crate::core::query::QueryService;
use crate::domain::ports::ImageStore;
use crate::utils::error::{PlacesError, Result};
use actix_web::{middleware, web, App, HttpRequest, HttpResponse, HttpServer};
use url::Url;

/// Registers the read endpoints and the media route under `media_url`.
pub fn configure<S: ImageStore + 'static>(cfg: &mut web::ServiceConfig, media_url: &str) {
    cfg.route("/places.geojson", web::get().to(places_geojson::<S>))
        .route("/places/{id}/", web::get().to(place_detail::<S>))
        .route(
            &format!("{}{{path:.*}}", media_url),
            web::get().to(media_file::<S>),
        );
}

pub async fn serve(config: &AppConfig) -> Result<()> {
    let db = Database::open(&config.database.path)?;
    let images = LocalImageStore::from_config(&config.media);
    let queries = web::Data::new(QueryService::new(db, images));
    let media_url = config.media.url.clone();

    tracing::info!(
        "Listening on http://{}:{}",
        config.server.bind,
        config.server.port
    );

    HttpServer::new(move || {
        let media_url = media_url.clone();
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(queries.clone())
            .configure(move |cfg| configure::<LocalImageStore>(cfg, &media_url))
    })
    .bind((config.server.bind.as_str(), config.server.port))?
    .run()
    .await?;

    Ok(())
}

async fn places_geojson<S: ImageStore + 'static>(
    queries: web::Data<QueryService<S>>,
) -> Result<HttpResponse> {
    let collection = web::block(move || queries.places_geojson()).await??;
    Ok(HttpResponse::Ok().json(collection))
}

async fn place_detail<S: ImageStore + 'static>(
    req: HttpRequest,
    path: web::Path<i64>,
    queries: web::Data<QueryService<S>>,
) -> Result<HttpResponse> {
    let id = path.into_inner();
    let origin = request_origin(&req)?;
    tracing::debug!("Place detail {} for origin {}", id, origin);

    let detail = web::block(move || queries.place_detail(id, &origin)).await??;
    Ok(HttpResponse::Ok().json(detail))
}

async fn media_file<S: ImageStore + 'static>(
    path: web::Path<String>,
    queries: web::Data<QueryService<S>>,
) -> Result<HttpResponse> {
    let blob_ref = path.into_inner();
    let data = queries
        .images()
        .read(&blob_ref)
        .await
        .map_err(|e| match e {
            PlacesError::InvalidValueError { .. } => PlacesError::not_found("Image file", &blob_ref),
            other => other,
        })?;

    Ok(HttpResponse::Ok()
        .content_type(content_type(&blob_ref))
        .body(data))
}

/// `scheme://host` of the current request, honouring forwarding headers.
fn request_origin(req: &HttpRequest) -> Result<Url> {
    let info = req.connection_info();
    let origin = format!("{}://{}", info.scheme(), info.host());
    Url::parse(&origin).map_err(|e| PlacesError::InvalidValueError {
        field: "request origin".to_string(),
        value: origin.clone(),
        reason: e.to_string(),
    })
}

fn content_type(blob_ref: &str) -> &'static str {
    let extension = blob_ref
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}
