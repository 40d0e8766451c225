use axum::extract::State;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use turtle_engine::{CancelToken, CredentialService};
use turtle_types::{GetRequest, GetResponse, PostRequest, PostResponse};

use crate::error::ServerResult;

/// Shared by every handler.
#[derive(Clone, Debug)]
pub struct AppState {
    pub service: CredentialService,
    /// Fires on shutdown so in-flight calls stop before committing.
    pub cancel: CancelToken,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// Highest committed event sequence.
    pub head: u64,
}

pub async fn health_handler(State(state): State<AppState>) -> ServerResult<Json<HealthResponse>> {
    let head = state.service.log().head().await?;
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        head,
    }))
}

pub async fn get_handler(
    State(state): State<AppState>,
    Json(request): Json<GetRequest>,
) -> ServerResult<Json<GetResponse>> {
    Ok(Json(state.service.get(request, &state.cancel).await?))
}

pub async fn post_handler(
    State(state): State<AppState>,
    Json(request): Json<PostRequest>,
) -> ServerResult<Json<PostResponse>> {
    Ok(Json(state.service.post(request, &state.cancel).await?))
}
