//! JSON web API over the catalog and the OSDU client

mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::api::OsduClient;

/// Shared state for all routes.
#[derive(Clone)]
pub struct AppState {
    pub client: Arc<OsduClient>,
}

impl AppState {
    pub fn new(client: OsduClient) -> Self {
        Self {
            client: Arc::new(client),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/domains", get(handlers::list_domains))
        .route("/api/domains/{domain}", get(handlers::get_domain))
        .route("/api/entities", get(handlers::search_entities))
        .route("/api/records/{domain}/{entity}", get(handlers::list_records))
        .route("/api/record/{*id}", get(handlers::get_record))
        .route(
            "/api/debug/strategies/{domain}/{entity}",
            get(handlers::diagnose_search),
        )
        .route("/api/debug/record/{*id}", get(handlers::diagnose_record))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Bind `addr` and serve until the process is stopped.
pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}
