use crate::engine::{EngineError, EngineHandle};
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tracing::Instrument;

/// `POST /predict` body.
#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    /// `data:<mime>;base64,<payload>`
    pub image: String,
}

/// HTTP routes for the inference daemon.
///
/// - `POST /predict`: classify every face in one image.
/// - `GET /status`: version and model lifecycle state.
pub fn router(engine: EngineHandle, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/predict", post(predict))
        .route("/status", get(status))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(engine)
}

async fn predict(
    State(engine): State<EngineHandle>,
    payload: Result<Json<PredictRequest>, JsonRejection>,
) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    let span = tracing::info_span!("predict", request_id = %request_id);

    async move {
        let Json(req) = match payload {
            Ok(p) => p,
            Err(rejection) => {
                tracing::warn!(error = %rejection.body_text(), "rejected request body");
                let status = if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
                    StatusCode::PAYLOAD_TOO_LARGE
                } else {
                    StatusCode::BAD_REQUEST
                };
                return error_response(status, rejection.body_text());
            }
        };

        match engine.predict(req.image, request_id).await {
            Ok(results) => {
                tracing::info!(faces = results.len(), "prediction served");
                Json(results).into_response()
            }
            Err(err) => err.into_response(),
        }
    }
    .instrument(span)
    .await
}

async fn status(State(engine): State<EngineHandle>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "models": engine.status(),
        "threshold": engine.settings().threshold,
    }))
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = match &self {
            EngineError::Decode(_) => StatusCode::BAD_REQUEST,
            EngineError::ModelsUnavailable(_) | EngineError::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            tracing::error!(error = %self, "prediction failed");
        } else {
            tracing::warn!(error = %self, status = status.as_u16(), "prediction rejected");
        }

        error_response(status, self.to_string())
    }
}

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}
