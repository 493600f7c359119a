use axum::{
    body::Bytes,
    extract::{FromRequest, Request, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::{
    error::RelayResult,
    models::relay::{CurriculumRequest, CurriculumResponse},
    state::AppState,
};

/// Relays `{"prompt": ...}` to the model and answers `{"curriculum": ...}`.
///
/// Mounted for every method so that anything but POST gets the plain-text 405.
/// The body is only buffered (and size-checked) once the method is known to be POST.
pub async fn generate_curriculum(State(state): State<AppState>, request: Request) -> Response {
    if request.method() != Method::POST {
        return (StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed").into_response();
    }

    let body = match Bytes::from_request(request, &state).await {
        Ok(body) => body,
        Err(rejection) => {
            warn!("Rejected request body: {}", rejection.body_text());
            return rejection.into_response();
        }
    };

    let request_id = Uuid::new_v4();
    let span = info_span!("generate_curriculum", %request_id);

    async move {
        match relay_prompt(&state, &body).await {
            Ok(curriculum) => {
                info!("Relayed {} bytes of generated text", curriculum.len());
                Json(CurriculumResponse { curriculum }).into_response()
            }
            Err(e) => {
                error!("Curriculum generation failed: {}", e);
                e.into_response()
            }
        }
    }
    .instrument(span)
    .await
}

async fn relay_prompt(state: &AppState, body: &[u8]) -> RelayResult<String> {
    let prompt = CurriculumRequest::parse_prompt(body)?;
    info!("Received prompt ({} chars)", prompt.chars().count());
    state.relay.generate(&prompt).await
}
