//! App Forge Backend
//!
//! Generates single-file web apps with a chat model, deploys them to a hosting
//! platform and keeps an append-only version history with diff and restore.

mod api;
mod auth;
mod config;
mod db;
mod errors;
mod lifecycle;
mod models;
mod notify;
mod platform;
mod search;
mod validation;
mod versions;

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tokio::sync::Mutex;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::Config;
use db::Repository;
use lifecycle::AppManager;
use notify::ToastCenter;
use platform::local::{LocalFileStore, LocalHosting, LocalRegistry};
use platform::{ChatClient, HttpChatClient, Platform};
use search::SearchIndex;
use versions::DiffSelection;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub search: Arc<SearchIndex>,
    pub config: Arc<Config>,
    pub manager: Arc<AppManager>,
    pub toasts: Arc<ToastCenter>,
    pub chat: Arc<dyn ChatClient>,
    pub hosting: Arc<LocalHosting>,
    pub files: Arc<LocalFileStore>,
    /// Diff selection per app id.
    pub selections: Arc<Mutex<HashMap<String, DiffSelection>>>,
}

impl AppState {
    /// Wire the local platform, the manager and the notifier around a store.
    pub async fn build(
        config: Config,
        repo: Arc<Repository>,
        search: Arc<SearchIndex>,
        chat: Arc<dyn ChatClient>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let files = Arc::new(LocalFileStore::open(&config.sites_path).await?);
        let hosting = Arc::new(LocalHosting::new(repo.pool().clone(), &config.public_url));
        let registry = Arc::new(LocalRegistry::new(repo.pool().clone()));
        let toasts = Arc::new(ToastCenter::new(config.toast_ttl));

        let platform = Platform {
            chat: chat.clone(),
            fs: files.clone(),
            hosting: hosting.clone(),
            registry,
            user: config.platform_user.clone(),
        };
        let manager = Arc::new(AppManager::new(
            repo.clone(),
            platform,
            toasts.clone(),
            config.default_model.clone(),
        ));

        Ok(Self {
            repo,
            search,
            config: Arc::new(config),
            manager,
            toasts,
            chat,
            hosting,
            files,
            selections: Arc::new(Mutex::new(HashMap::new())),
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting App Forge Backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Index path: {:?}", config.index_path);
    tracing::info!("Sites path: {:?}", config.sites_path);
    tracing::info!("Bind address: {}", config.bind_addr);

    if config.platform_user.is_none() {
        tracing::warn!("No platform user configured. Creating and duplicating apps is disabled!");
    }

    // Initialize database
    let pool = db::init_database(&config.db_path).await?;
    let repo = Arc::new(Repository::new(pool));

    // Initialize search index; the indexer builds it from the store
    let search = Arc::new(SearchIndex::open(&config.index_path)?);
    search::spawn_indexer(repo.clone(), search.clone());

    let chat: Arc<dyn ChatClient> = Arc::new(HttpChatClient::new(
        config.chat_api_url.clone(),
        config.chat_api_key.clone(),
    ));

    let bind_addr = config.bind_addr;
    let state = AppState::build(config, repo, search, chat).await?;

    // Build router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server listening on {}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let guard = auth::PskGuard::new(state.config.api_psk.as_deref());
    if !guard.is_enabled() {
        tracing::warn!("No API PSK configured (FORGE_API_PSK). Authentication is disabled!");
    }

    // API routes
    let api_routes = Router::new()
        // Datastore
        .route("/datastore", get(api::get_datastore))
        .route("/datastore/revision", get(api::get_revision))
        .route("/datastore/changes", get(api::wait_for_changes))
        .route("/datastore/import", post(api::import_datastore))
        // Apps
        .route("/apps", get(api::list_apps).post(api::create_app))
        .route("/apps/bulk-delete", post(api::bulk_delete_apps))
        .route(
            "/apps/{id}",
            get(api::get_app)
                .put(api::update_app)
                .delete(api::delete_app),
        )
        .route("/apps/{id}/duplicate", post(api::duplicate_app))
        .route("/apps/{id}/favorite", post(api::toggle_favorite))
        .route("/apps/{id}/views", post(api::increment_views))
        .route("/apps/{id}/launch", post(api::launch_app))
        .route("/apps/{id}/iterate", post(api::iterate_app))
        // Versions
        .route("/apps/{id}/versions", get(api::list_versions))
        .route("/apps/{id}/versions/watch", get(api::watch_versions))
        .route("/apps/{id}/restore", post(api::restore_version))
        .route(
            "/apps/{id}/diff-selection",
            get(api::get_diff_selection)
                .post(api::select_diff_version)
                .delete(api::reset_diff_selection),
        )
        .route("/apps/{id}/diff", get(api::get_selection_diff))
        .route("/versions/{id}", get(api::get_version))
        .route("/diff", get(api::diff_versions))
        // Status
        .route("/generation", get(api::get_generation))
        .route("/notifications", get(api::list_notifications))
        .route(
            "/notifications/{id}",
            axum::routing::delete(api::dismiss_notification),
        )
        // Models and search
        .route("/models", get(api::list_models))
        .route("/templates", get(api::list_templates))
        .route("/search", get(api::search_apps))
        // Apply PSK auth middleware
        .layer(middleware::from_fn_with_state(guard, auth::require_psk));

    // Health check and hosted sites (no auth required)
    let public_routes = Router::new()
        .route("/health", get(health_check))
        .route("/sites/{subdomain}/", get(api::serve_site_index))
        .route("/sites/{subdomain}/{*path}", get(api::serve_site_file));

    Router::new()
        .nest("/api", api_routes)
        .merge(public_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests;
