use actix_web::{
    cookie::{time::Duration as CookieDuration, Cookie},
    route, web, HttpRequest, HttpResponse,
};
use clap::Parser;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

pub mod aggregate;
pub mod cache;
pub mod database;
pub mod error;
pub mod ingest;
pub mod model;
pub mod parser;
pub mod store;

use aggregate::Aggregator;
use cache::SessionCache;
use error::Result;
use store::{FeedRegistry, ItemStore};

#[derive(Parser, Debug)]
#[clap(about, version, author)]
pub struct Args {
    #[clap(short, long, default_value = "127.0.0.1")]
    pub ip: String,

    #[clap(short, long, default_value = "3000")]
    pub port: u16,

    /// Seconds a session snapshot stays valid.
    #[clap(short = 't', long, default_value = "1800")]
    pub session_ttl: i64,

    /// Seconds between eviction sweep passes.
    #[clap(short, long, default_value = "1800")]
    pub sweep_interval: u64,

    #[clap(short, long, default_value = "items.db")]
    pub db_path: String,
}

pub struct AppState {
    pub store: ItemStore,
    pub registry: FeedRegistry,
    pub aggregator: Aggregator,
    pub sessions: Arc<SessionCache>,
}

const SESSION_COOKIE: &str = "session_id";
const SESSION_COOKIE_MAX_AGE_SECS: i64 = 3600;

fn session_cookie(session_id: String) -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE, session_id)
        .path("/")
        .max_age(CookieDuration::seconds(SESSION_COOKIE_MAX_AGE_SECS))
        .finish()
}

fn session_id_from(req: &HttpRequest) -> Option<String> {
    req.cookie(SESSION_COOKIE).map(|c| c.value().to_string())
}

#[derive(Deserialize)]
pub struct Bounds {
    pub lower_bound: usize,
    pub upper_bound: usize,
}

#[derive(Deserialize)]
pub struct FeedUrl {
    pub url: String,
}

#[derive(Deserialize)]
pub struct ItemId {
    pub id: String,
}

/// Page of the caller's shuffled session feed. The snapshot is built on
/// first access and then served unchanged until refreshed or swept.
#[route("/api/feed", method = "GET")]
async fn get_feed(
    query: web::Query<Bounds>,
    app_data: web::Data<AppState>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let Some(session_id) = session_id_from(&req) else {
        return Ok(HttpResponse::BadRequest().body("Session ID not found"));
    };

    let items = app_data
        .sessions
        .get_or_create(&session_id, &app_data.aggregator)
        .await?;

    let lower = query.lower_bound.min(items.len());
    let upper = query.upper_bound.clamp(lower, items.len());
    Ok(HttpResponse::Ok().json(&items[lower..upper]))
}

#[route("/api/add_feed", method = "POST")]
async fn add_feed(
    query: web::Query<FeedUrl>,
    app_data: web::Data<AppState>,
) -> Result<HttpResponse> {
    app_data.registry.add(&query.url).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Feed added successfully" })))
}

/// Rebuild the caller's snapshot, creating a session if needed.
#[route("/api/refresh", method = "POST")]
async fn refresh_feed(app_data: web::Data<AppState>, req: HttpRequest) -> Result<HttpResponse> {
    let session_id = session_id_from(&req).unwrap_or_else(|| Uuid::new_v4().to_string());

    app_data
        .sessions
        .refresh(&session_id, &app_data.aggregator)
        .await?;

    Ok(HttpResponse::Ok()
        .cookie(session_cookie(session_id))
        .body("Feed refreshed"))
}

#[route("/api/end_session", method = "POST")]
async fn end_session(app_data: web::Data<AppState>, req: HttpRequest) -> Result<HttpResponse> {
    let Some(session_id) = session_id_from(&req) else {
        return Ok(HttpResponse::BadRequest().body("Session ID not found"));
    };

    app_data.sessions.end(&session_id).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Session ended" })))
}

/// Toggle the liked flag in the store, then swap the updated item into
/// the caller's cached snapshot so the change is visible immediately.
#[route("/api/like", method = "POST")]
async fn like_item(
    query: web::Query<ItemId>,
    app_data: web::Data<AppState>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let Some(session_id) = session_id_from(&req) else {
        return Ok(HttpResponse::BadRequest().body("Session ID not found"));
    };

    let updated = app_data.store.toggle_like(&query.id).await?;
    let liked = updated.liked;
    app_data
        .sessions
        .apply_like(&session_id, &query.id, updated)
        .await?;

    let message = if liked {
        format!("Feed item {} liked successfully", query.id)
    } else {
        format!("Like removed from item {} successfully", query.id)
    };
    Ok(HttpResponse::Ok()
        .cookie(session_cookie(session_id))
        .body(message))
}

#[route("/api/hide", method = "POST")]
async fn hide_item(
    query: web::Query<ItemId>,
    app_data: web::Data<AppState>,
) -> Result<HttpResponse> {
    let item = app_data.store.set_hidden(&query.id).await?;
    Ok(HttpResponse::Ok().body(format!("Feed item {} hidden successfully", item.id)))
}

/// Full item table dump, handy for debugging.
#[route("/api/items", method = "GET")]
async fn list_items(app_data: web::Data<AppState>) -> Result<HttpResponse> {
    let items = app_data.store.select_all().await?;
    Ok(HttpResponse::Ok().json(items))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(get_feed)
        .service(add_feed)
        .service(refresh_feed)
        .service(end_session)
        .service(like_item)
        .service(hide_item)
        .service(list_items);
}
