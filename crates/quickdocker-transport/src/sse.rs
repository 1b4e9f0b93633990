//! Server-sent log tails.

use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::{Stream, StreamExt};
use quickdocker_session::DEFAULT_TAIL;
use serde::Deserialize;

use crate::{error::ApiError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub tail: Option<usize>,
}

/// Follow a container's logs. Each event's data is one JSON-encoded line.
///
/// Unknown containers fail with 404 before the stream starts.
pub async fn container_logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<LogsQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    let tail = query.tail.unwrap_or(DEFAULT_TAIL);
    let lines = state.logs.stream(&id, tail).await?;
    let events = lines.map(|line| Event::default().json_data(line));
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
