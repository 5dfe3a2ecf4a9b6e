//! Models endpoint
//!
//! Lists the model keys callers can select, with the provider that serves each.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::{error::AppResult, AppState};

/// Model information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    pub id: String,
    pub object: String,
    pub provider: String,
    pub upstream_model: Option<String>,
    pub description: String,
}

/// Models list response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsResponse {
    pub object: String,
    pub data: Vec<Model>,
}

/// List the model catalog
pub async fn list_models(
    State(state): State<Arc<AppState>>,
) -> AppResult<(StatusCode, Json<ModelsResponse>)> {
    let catalog = state.bridge.router().catalog();

    let models = catalog
        .all()
        .iter()
        .map(|spec| Model {
            id: spec.key.clone(),
            object: "model".to_string(),
            provider: spec.provider.clone(),
            upstream_model: spec.upstream_model.clone(),
            description: spec.desc.clone(),
        })
        .collect();

    Ok((
        StatusCode::OK,
        Json(ModelsResponse {
            object: "list".to_string(),
            data: models,
        }),
    ))
}
