use clap::Parser;
use places_map::adapters::http;
use places_map::utils::{logger, validation::Validate};
use places_map::{AppConfig, Cli, Command, Database, LocalImageStore, PlaceLoader, Result};

#[actix_web::main]
async fn main() {
    let cli = Cli::parse();

    let config = match cli.resolve_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ {}", e);
            std::process::exit(e.exit_code());
        }
    };

    logger::init_logger(cli.verbose, config.logging.format);
    tracing::debug!("Resolved config: {:?}", config);

    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        eprintln!("❌ {}", e);
        std::process::exit(e.exit_code());
    }

    let result = match &cli.command {
        Command::Serve { .. } => http::serve(&config).await,
        Command::LoadPlace { json_url } => load_place(&config, json_url).await,
    };

    if let Err(e) = result {
        tracing::error!("❌ Command failed: {}", e);
        eprintln!("❌ {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn load_place(config: &AppConfig, json_url: &str) -> Result<()> {
    let db = Database::open(&config.database.path)?;
    let images = LocalImageStore::from_config(&config.media);
    let loader = PlaceLoader::new(db, images, &config.loader)?;

    let created = loader.load(json_url).await?;
    println!("Loaded: {}", created.place.title);

    Ok(())
}
