use axum::{
    Json,
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures_util::Stream;
use serde::Serialize;
use std::{convert::Infallible, time::Duration};
use tokio_stream::wrappers::{BroadcastStream, errors::BroadcastStreamRecvError};

use crate::{
    api::{ApiState, error::ApiError},
    logging,
    session::{AggregateStatus, ServiceEvent},
};

#[derive(Debug, Serialize)]
pub(crate) struct HealthResponse {
    pub(crate) ok: bool,
}

pub(crate) async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { ok: true })
}

pub(crate) async fn status(
    State(state): State<ApiState>,
) -> Result<Json<AggregateStatus>, ApiError> {
    Ok(Json(state.sessions.query_status().await?))
}

/// `status` frames (throttled aggregate) and `notice` frames (one-shot), starting with the
/// current status.
pub(crate) async fn events(
    State(state): State<ApiState>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let rx = state.sessions.subscribe();
    let initial = state.sessions.query_status().await?;
    let stream = service_sse_stream(ServiceEvent::Status(initial), BroadcastStream::new(rx));
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn service_sse_stream(
    initial: ServiceEvent,
    stream: BroadcastStream<ServiceEvent>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    use futures_util::StreamExt as _;

    let live = stream.filter_map(|msg| async move {
        match msg {
            Ok(ev) => Some(ev),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                if logging::warn_throttled("sse_subscriber_lagged", Duration::from_secs(30)) {
                    tracing::warn!(skipped, "sse subscriber lagged; frames dropped");
                }
                None
            }
        }
    });

    futures_util::stream::iter([initial])
        .chain(live)
        .map(|ev| Ok(to_sse_event(&ev)))
}

fn to_sse_event(ev: &ServiceEvent) -> Event {
    let (name, json) = match ev {
        ServiceEvent::Status(status) => ("status", serde_json::to_string(status)),
        ServiceEvent::Notice(notice) => ("notice", serde_json::to_string(notice)),
    };
    let json = json.unwrap_or_else(|err| {
        tracing::warn!(error = %err, event = name, "failed to serialize SSE payload; emitting fallback");
        "{}".to_string()
    });
    Event::default().event(name).data(json)
}
