use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use serde::Deserialize;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

use super::state::AppState;

#[derive(Deserialize)]
pub struct StreamQuery {
    pub request_id: String,
}

/// Stage events for one analysis run. Subscribe before posting the matching
/// `/api/analyze` request; the stream closes when the run finishes, or when
/// no run has claimed the request id within the unclaimed timeout.
pub async fn analyze_stream(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, std::convert::Infallible>>> {
    let (rx, watch) = state.progress.watch(&query.request_id);
    let request_id = query.request_id;

    let stream = BroadcastStream::new(rx)
        .timeout(state.unclaimed_stream_timeout)
        .take_while(move |item| match item {
            Ok(_) => true,
            Err(_) => {
                let claimed = watch.is_claimed();
                if !claimed {
                    debug!(request_id = %request_id, "No run claimed the stage stream");
                }
                claimed
            }
        })
        .filter_map(|item| match item {
            Ok(Ok(stage)) => match Event::default().event("stage").json_data(&stage) {
                Ok(event) => Some(Ok(event)),
                Err(e) => {
                    warn!("Failed to encode stage event: {}", e);
                    None
                }
            },
            _ => None,
        });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
