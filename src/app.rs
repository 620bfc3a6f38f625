use axum::{
    Json, Router,
    http::{HeaderValue, Method, header::CONTENT_TYPE},
    middleware,
    routing::{get, post, put},
};
use log::{info, warn};
use serde_json::json;
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use crate::config::Config;
use crate::login::{self, SessionStore};
use crate::mailer::Mailer;
use crate::{db, events, users};

pub struct AppState {
    pub pool: SqlitePool,
    pub sessions: SessionStore,
    pub config: Config,
    pub mailer: Option<Arc<Mailer>>,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: Config) -> Arc<Self> {
        let mailer = config.smtp.as_ref().and_then(|smtp| match Mailer::new(smtp) {
            Ok(mailer) => Some(Arc::new(mailer)),
            Err(e) => {
                warn!("Mailer disabled: {e}");
                None
            }
        });

        Arc::new(Self {
            pool,
            sessions: SessionStore::new(config.session_ttl),
            config,
            mailer,
        })
    }

    /// Connect to the configured database and build the state around it.
    pub async fn connect(config: Config) -> Result<Arc<Self>, sqlx::Error> {
        let pool = db::connect(&config.database_url).await?;
        Ok(Self::new(pool, config))
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let public = Router::new()
        .route("/api/health", get(health))
        .route("/api/auth/register", post(login::handle_register))
        .route("/api/auth/login", post(login::handle_login))
        .route("/api/auth/logout", post(login::handle_logout))
        .route("/api/auth/forgot-password", post(login::handle_forgot_password))
        .route("/api/auth/reset-password", post(login::handle_reset_password));

    let protected = Router::new()
        .route("/api/me", get(users::me).patch(users::update_me))
        .route("/api/me/password", post(login::handle_change_password))
        .route("/api/users", get(users::search))
        .route("/api/users/:username", get(users::profile))
        .route(
            "/api/users/:username/follow",
            post(users::follow).delete(users::unfollow),
        )
        .route("/api/users/:username/followers", get(users::followers))
        .route("/api/users/:username/following", get(users::following))
        .route("/api/users/:username/events", get(events::user_events))
        .route("/api/events", get(events::board).post(events::create))
        .route("/api/events/order", put(events::reorder))
        .route(
            "/api/events/:id",
            get(events::get_event)
                .patch(events::update)
                .delete(events::delete),
        )
        .route(
            "/api/events/:id/like",
            post(events::like).delete(events::unlike),
        )
        .route("/api/events/:id/share", post(events::share))
        .route("/api/events/:id/copy", post(events::copy))
        .route("/api/feed", get(events::feed))
        .route("/api/inbox", get(events::inbox))
        .route("/api/mentions", get(events::mentions))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            login::require_auth,
        ));

    let mut app = Router::new().merge(public).merge(protected);

    // The built frontend bundle, when deployed next to the server.
    let static_dir = &state.config.static_dir;
    if Path::new(static_dir).is_dir() {
        app = app.fallback_service(ServeDir::new(static_dir));
    }

    app.layer(cors_layer(&state.config)).with_state(state)
}

fn cors_layer(config: &Config) -> CorsLayer {
    let Some(origin) = &config.cors_origin else {
        return CorsLayer::permissive();
    };

    match origin.parse::<HeaderValue>() {
        Ok(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_credentials(true)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
            ])
            .allow_headers([CONTENT_TYPE]),
        Err(e) => {
            warn!("Invalid CORS_ORIGIN {origin:?}: {e}, falling back to permissive CORS");
            CorsLayer::permissive()
        }
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let addr = config.addr.clone();
    let state = AppState::connect(config).await?;
    let app = router(state);

    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
