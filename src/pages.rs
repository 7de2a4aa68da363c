//! Routes for axum.

use crate::{AppState, lineardoc};
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::{sync::Arc, time::Instant};

/// All errors that may occur while answering a segmentation request.
#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    /// The pipeline rejected or failed on the document.
    #[error(transparent)]
    Pipeline(#[from] lineardoc::Error),

    /// The worker task died before producing a result.
    #[error("worker error: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Every failure answers with the error message in the result field,
        // so callers have one envelope to parse.
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(SegmentResponse {
                result: self.to_string(),
            }),
        )
            .into_response()
    }
}

/// The request envelope.
#[derive(serde::Deserialize)]
pub(crate) struct SegmentRequest {
    /// The Parsoid HTML to prepare.
    html: String,
}

/// The response envelope.
#[derive(serde::Serialize)]
pub(crate) struct SegmentResponse {
    /// The prepared HTML on success, or the error message on failure.
    result: String,
}

/// The segmentation route handler.
///
/// The pipeline's document graph uses `Rc`-shared tags and is not `Send`,
/// so the whole run happens on a blocking worker thread; only the compiled
/// rules and the finished string cross back.
pub(crate) async fn segment(
    State(state): State<AppState>,
    Json(SegmentRequest { html }): Json<SegmentRequest>,
) -> Result<impl IntoResponse, Error> {
    let start = Instant::now();
    let size = html.len();

    let result = tokio::task::spawn_blocking(move || {
        let contextualizer = lineardoc::Contextualizer::new(Arc::clone(&state.rules));
        lineardoc::prepare(&html, contextualizer, &state.segmenter)
    })
    .await??;

    log::debug!("Prepared {size} bytes in {:.2?}", start.elapsed());

    Ok(Json(SegmentResponse { result }))
}
