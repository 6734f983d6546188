mod classifier;
mod config;
mod error;
mod handlers;
mod models;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};
use anyhow::Context;
use log::{info, warn};

use crate::classifier::Classifier;
use crate::config::AppConfig;
use crate::handlers::AppState;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; the process environment still applies.
    let dotenv = dotenvy::dotenv();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    if let Ok(path) = dotenv {
        info!("loaded environment from {}", path.display());
    }

    let config = AppConfig::from_env()?;
    if config.uses_default_secret() {
        warn!("SECRET_KEY not set, using the built-in fallback key");
    }

    let model = classifier::load_model(&config.model_path)
        .context("model artifact could not be loaded, aborting startup")?
        .map(|model| Arc::new(model) as Arc<dyn Classifier>);

    let state = web::Data::new(AppState::new(model));
    if !state.has_model() {
        warn!("starting without a model, POST /predict will answer 500");
    }

    info!("server running at http://{}:{}", config.host, config.port);
    info!("  GET  /         prediction form");
    info!("  POST /predict  credit default prediction");

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header();

        App::new()
            .wrap(Logger::default())
            .wrap(cors)
            .app_data(state.clone())
            .configure(handlers::routes)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await?;

    Ok(())
}
