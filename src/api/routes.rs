use crate::config::Config;
use crate::db::Database;
use crate::extract::{self, ExtractedMedication, ExtractionError, ExtractionRequest};
use crate::model::Prescription;
use crate::notify::{LocalNotificationPlatform, NotificationPlatform, ScheduledNotification};
use crate::store::PrescriptionStore;
use anyhow::Context;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Clone)]
pub struct ApiState {
    pub config: Arc<Config>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/status", get(status))
        .route("/api/v1/prescriptions", get(prescriptions))
        .route("/api/v1/alarms", get(alarms))
        .route("/api/v1/extract", post(extract_prescription))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct StatusPayload {
    prescriptions: usize,
    scheduled_alarms: usize,
    notifications_enabled: bool,
    permission: String,
    last_saved_at: Option<i64>,
    api_port: u16,
}

#[derive(Debug, Serialize)]
struct PrescriptionsPayload {
    count: usize,
    prescriptions: Vec<Prescription>,
}

#[derive(Debug, Serialize)]
struct AlarmsPayload {
    count: usize,
    alarms: Vec<ScheduledNotification>,
}

#[derive(Debug, Serialize)]
struct ExtractPayload {
    result: Vec<ExtractedMedication>,
}

async fn status(State(state): State<ApiState>) -> ApiResult<Json<StatusPayload>> {
    let config = &state.config;
    let store = PrescriptionStore::with_key(Database::open(&config.db_path)?, &config.store_key);
    let platform = LocalNotificationPlatform::open(&config.db_path, config.notifications_enabled)?;

    Ok(Json(StatusPayload {
        prescriptions: store.get_all_prescriptions().len(),
        scheduled_alarms: platform.list_scheduled()?.len(),
        notifications_enabled: config.notifications_enabled,
        permission: platform.permission_status()?.to_string(),
        last_saved_at: store.storage().item_updated_at(&config.store_key)?,
        api_port: config.api_port,
    }))
}

async fn prescriptions(State(state): State<ApiState>) -> ApiResult<Json<PrescriptionsPayload>> {
    let store = PrescriptionStore::with_key(
        Database::open(&state.config.db_path)?,
        &state.config.store_key,
    );
    let prescriptions = store.get_all_prescriptions();

    Ok(Json(PrescriptionsPayload {
        count: prescriptions.len(),
        prescriptions,
    }))
}

async fn alarms(State(state): State<ApiState>) -> ApiResult<Json<AlarmsPayload>> {
    let platform = LocalNotificationPlatform::open(
        &state.config.db_path,
        state.config.notifications_enabled,
    )?;
    let alarms = platform.list_scheduled()?;

    Ok(Json(AlarmsPayload {
        count: alarms.len(),
        alarms,
    }))
}

async fn extract_prescription(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(request): Json<ExtractionRequest>,
) -> ApiResult<Json<ExtractPayload>> {
    authorize(&headers, &state.config.api_tokens)?;

    let config = Arc::clone(&state.config);
    let result =
        tokio::task::spawn_blocking(move || extract::extract_medications(&config, &request))
            .await
            .context("extraction task failed")??;

    Ok(Json(ExtractPayload { result }))
}

/// Accepts `Authorization: Bearer <token>` when the token is one of `tokens`.
fn authorize(headers: &HeaderMap, tokens: &[String]) -> Result<(), ExtractionError> {
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(ExtractionError::Unauthenticated)?;

    if tokens.iter().any(|token| token == presented) {
        Ok(())
    } else {
        Err(ExtractionError::Unauthenticated)
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug)]
enum ApiError {
    BadRequest(String),
    Unauthenticated(String),
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for ApiError {
    fn from(value: anyhow::Error) -> Self {
        Self::Internal(value)
    }
}

impl From<ExtractionError> for ApiError {
    fn from(value: ExtractionError) -> Self {
        match value {
            ExtractionError::Unauthenticated => Self::Unauthenticated(value.to_string()),
            ExtractionError::InvalidImage => Self::BadRequest(value.to_string()),
            other => Self::Internal(other.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "code": "invalid-argument", "error": message })),
            )
                .into_response(),
            ApiError::Unauthenticated(message) => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "code": "unauthenticated", "error": message })),
            )
                .into_response(),
            ApiError::Internal(error) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "code": "internal", "error": error.to_string() })),
            )
                .into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ApiError, authorize};
    use crate::extract::ExtractionError;
    use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
    use axum::response::IntoResponse;

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).expect("header value"),
        );
        headers
    }

    #[test]
    fn accepts_only_configured_tokens() {
        let tokens = vec!["family-phone".to_string()];

        assert!(authorize(&bearer("family-phone"), &tokens).is_ok());
        assert!(matches!(
            authorize(&bearer("stranger"), &tokens),
            Err(ExtractionError::Unauthenticated)
        ));
        assert!(matches!(
            authorize(&HeaderMap::new(), &tokens),
            Err(ExtractionError::Unauthenticated)
        ));
        assert!(authorize(&bearer("family-phone"), &[]).is_err());
    }

    #[test]
    fn extraction_errors_map_to_status_codes() {
        let cases = [
            (ExtractionError::Unauthenticated, StatusCode::UNAUTHORIZED),
            (ExtractionError::InvalidImage, StatusCode::BAD_REQUEST),
            (
                ExtractionError::Internal("model offline".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            let response = ApiError::from(error).into_response();
            assert_eq!(response.status(), expected);
        }
    }
}
