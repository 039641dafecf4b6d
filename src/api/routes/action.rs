//! Control endpoint

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::actions::ActionName;
use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
    types::StatusResponse,
};

/// A validated `POST /action` body
#[derive(Debug, PartialEq)]
pub struct ActionRequest {
    pub service: String,
    pub action: ActionName,
}

impl ActionRequest {
    /// Check the shape of a raw body
    ///
    /// Fields are inspected by hand so each failure gets its own reason.
    pub fn from_value(body: &Value) -> ApiResult<Self> {
        let (Some(service), Some(action)) = (
            body.get("service").filter(|v| !v.is_null()),
            body.get("action").filter(|v| !v.is_null()),
        ) else {
            return Err(ApiError::InvalidRequest(
                "you must provide a service and action".to_string(),
            ));
        };

        let (Some(service), Some(action)) = (service.as_str(), action.as_str()) else {
            return Err(ApiError::InvalidRequest(
                "service and action must be strings".to_string(),
            ));
        };

        let action = action
            .parse::<ActionName>()
            .map_err(|_| ApiError::InvalidRequest("invalid action".to_string()))?;

        Ok(Self {
            service: service.to_string(),
            action,
        })
    }
}

/// POST /action
///
/// Validates the request and the action's preconditions, then schedules the
/// action without waiting for it.
#[instrument(skip_all)]
pub async fn run_action(
    State(state): State<ApiState>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<StatusResponse>> {
    let Json(body) = body.map_err(|rejection| {
        warn!("rejecting malformed body: {rejection}");
        ApiError::InvalidRequest(rejection.body_text())
    })?;

    let ActionRequest { service, action } = ActionRequest::from_value(&body)?;

    state
        .runner
        .assert_runnable(action, &service)
        .await
        .inspect_err(|e| warn!("refusing {action} on {service}: {e}"))?;

    info!("scheduling {action} on {service}");
    state.runner.spawn_execute(action, service);

    Ok(Json(StatusResponse::ok()))
}
