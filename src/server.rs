use crate::simulator::BracketSimulator;
use axum::{extract::State, response::IntoResponse, routing::get, Router};
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

pub fn router(sim: Arc<BracketSimulator>) -> Router {
    Router::new()
        .route("/state.json", get(get_state_json))
        .route("/progress.json", get(get_progress_json))
        .with_state(sim)
}

pub async fn serve(sim: Arc<BracketSimulator>, addr: String) {
    let app = router(sim);
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("state server failed to bind {addr}: {e}");
            return;
        }
    };
    info!("state server listening at http://{addr}/state.json");
    if let Err(e) = axum::serve(listener, app).await {
        error!("state server error: {e}");
    }
}

fn no_cache_json<T: Serialize>(payload: &T) -> impl IntoResponse {
    let body = serde_json::to_string(payload).unwrap_or_else(|_| "{}".to_string());
    (
        [
            ("Content-Type", "application/json"),
            ("Cache-Control", "no-store"),
            ("Pragma", "no-cache"),
            ("Expires", "0"),
        ],
        body,
    )
}

async fn get_state_json(State(sim): State<Arc<BracketSimulator>>) -> impl IntoResponse {
    no_cache_json(&sim.get_current_state())
}

async fn get_progress_json(State(sim): State<Arc<BracketSimulator>>) -> impl IntoResponse {
    no_cache_json(&sim.get_simulation_progress())
}
