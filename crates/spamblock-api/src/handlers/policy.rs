//! Blocking policy handlers

use axum::{extract::State, http::StatusCode, Json};
use spamblock_common::config::PolicyConfig;
use std::sync::Arc;
use tracing::warn;

use crate::routes::AppState;

/// Current policy
pub async fn get_policy(State(state): State<Arc<AppState>>) -> Json<PolicyConfig> {
    Json(state.checker.policy().await)
}

/// Replace the policy
pub async fn update_policy(
    State(state): State<Arc<AppState>>,
    Json(policy): Json<PolicyConfig>,
) -> Result<Json<PolicyConfig>, StatusCode> {
    if !policy.min_block_score.is_finite()
        || !(0.0..=100.0).contains(&policy.sfs_min_confidence)
    {
        warn!(
            min_block_score = policy.min_block_score,
            sfs_min_confidence = policy.sfs_min_confidence,
            "Rejected invalid policy"
        );
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }

    state.checker.set_policy(policy.clone()).await;
    Ok(Json(policy))
}
