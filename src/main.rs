use std::sync::Arc;

use actix_cors::Cors;
use actix_web::http::header::{self, HeaderName};
use actix_web::{App, HttpServer, middleware, web};
use anyhow::{Context, Result};
use log::info;
use sqlx::postgres::PgPoolOptions;

use api::AppState;
use config::Config;
use query::QueryService;
use store::PgRunStore;
use sync::{SyncService, SyncSettings};

mod api;
mod config;
mod currency_symbols;
mod error;
mod etag;
mod exchange_rate;
mod merge;
mod providers;
mod query;
mod scheduler;
mod store;
mod sync;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Arc::new(Config::from_env()?);

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .context("Can't connect to the database")?;
    sqlx::migrate!()
        .run(&pool)
        .await
        .context("Can't run database migrations")?;

    let store = Arc::new(PgRunStore::new(pool));
    let providers =
        providers::build_providers(&config).context("Can't build the HTTP client")?;

    let sync = Arc::new(SyncService::new(
        store.clone(),
        providers,
        SyncSettings::from(config.as_ref()),
    ));
    let query = QueryService::new(
        store,
        config.provider_priority.clone(),
        config.symbols_provider.as_str(),
    );

    if config.enable_scheduler {
        scheduler::start_sync_scheduler(
            sync.clone(),
            scheduler::effective_period(config.rates_ttl),
            config.sync_deadline,
        );
    }

    let state = web::Data::new(AppState {
        query,
        sync,
        config: config.clone(),
    });

    let allow_origins = config.allow_origins.clone();
    info!("Listening on {}", config.bind_addr);
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(cors(&allow_origins))
            .wrap(middleware::Logger::default())
            .configure(api::configure)
    })
    .bind(&config.bind_addr)
    .with_context(|| format!("Can't bind {}", config.bind_addr))?
    .run()
    .await?;

    Ok(())
}

fn cors(allow_origins: &[String]) -> Cors {
    let cors = Cors::default()
        .allowed_methods(vec!["GET", "POST"])
        .allowed_headers(vec![
            header::CONTENT_TYPE,
            header::IF_NONE_MATCH,
            HeaderName::from_static("x-api-key"),
        ])
        .expose_headers(vec![header::ETAG, header::CACHE_CONTROL])
        .max_age(3600);

    if allow_origins.iter().any(|origin| origin == "*") {
        cors.allow_any_origin()
    } else {
        allow_origins
            .iter()
            .fold(cors, |cors, origin| cors.allowed_origin(origin))
    }
}
