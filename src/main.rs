use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use feedmixer::aggregate::Aggregator;
use feedmixer::cache::{spawn_sweeper, SessionCache};
use feedmixer::database;
use feedmixer::ingest::Ingestor;
use feedmixer::parser::HttpFeedParser;
use feedmixer::store::{FeedRegistry, ItemStore};
use feedmixer::{configure, AppState, Args};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let address = format!("{}:{}", args.ip, args.port);

    let conn = database::init_db(&args.db_path).await.map_err(|e| {
        std::io::Error::other(format!("database initialization failed: {e}"))
    })?;

    let store = ItemStore::new(conn.clone());
    let registry = FeedRegistry::new(conn.clone());
    let ingestor = Ingestor::new(store.clone(), Arc::new(HttpFeedParser));
    let aggregator = Aggregator::new(registry.clone(), ingestor);
    let sessions = Arc::new(SessionCache::new(args.session_ttl));

    spawn_sweeper(sessions.clone(), args.sweep_interval);

    let app_state = web::Data::new(AppState {
        store,
        registry,
        aggregator,
        sessions,
    });

    info!("Server running at http://{address}");
    let res = HttpServer::new(move || App::new().app_data(app_state.clone()).configure(configure))
        .bind(&address)?
        .run()
        .await;

    let _ = conn.close().await;
    res
}
