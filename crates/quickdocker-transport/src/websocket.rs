//! WebSocket endpoints: interactive exec and state watch.

use axum::{
    extract::{
        Path, Query, State, WebSocketUpgrade,
        ws::{CloseFrame, Message, WebSocket},
    },
    response::IntoResponse,
};
use futures::{
    SinkExt, StreamExt, future,
    stream::{SplitSink, SplitStream},
};
use quickdocker_core::{
    BridgeError, ClientSink, ClientStream, CloseCode, InboundFrame, OutboundFrame, TermSize,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::state::AppState;

/// Close reasons longer than this do not fit a control frame.
const MAX_CLOSE_REASON: usize = 123;

#[derive(Debug, Deserialize)]
pub struct ExecQuery {
    pub cols: Option<u16>,
    pub rows: Option<u16>,
}

impl ExecQuery {
    fn size(&self) -> TermSize {
        let default = TermSize::default();
        TermSize::new(
            self.cols.unwrap_or(default.cols),
            self.rows.unwrap_or(default.rows),
        )
    }
}

/// Interactive shell in a container.
///
/// Binary frames carry raw terminal bytes both ways. A text frame holding
/// `{"type":"resize","cols":C,"rows":R}` resizes the TTY; any other text is
/// typed into the shell.
pub async fn exec_handler(
    ws: WebSocketUpgrade,
    Path(container_id): Path<String>,
    Query(query): Query<ExecQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let size = query.size();
    ws.on_upgrade(move |socket| handle_exec(socket, state, container_id, size))
}

async fn handle_exec(mut socket: WebSocket, state: AppState, container_id: String, size: TermSize) {
    let handle = match state.exec.open(&container_id, size).await {
        Ok(handle) => handle,
        Err(e) => {
            tracing::warn!(container_id, error = %e, "Exec session open failed");
            let close = close_message(CloseCode::for_error(&e), &e.to_string());
            if let Err(e) = socket.send(close).await {
                tracing::debug!(container_id, error = %e, "Client already gone, close frame dropped");
            }
            return;
        }
    };

    let (sink, stream) = socket.split();
    let report = state
        .exec
        .run(handle, client_sink(sink), client_stream(stream))
        .await;
    tracing::debug!(
        session_id = %report.session_id,
        controls = report.controls(),
        "Exec WebSocket finished"
    );
}

/// Project snapshots every interval until the client goes away.
pub async fn events_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_events(socket, state))
}

async fn handle_events(socket: WebSocket, state: AppState) {
    let ws_id = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();
    let mut watch = state.events.watch();
    tracing::info!(%ws_id, "State watcher connected");

    loop {
        tokio::select! {
            event = watch.next() => {
                let Some(event) = event else { break };
                let json = match serde_json::to_string(&event) {
                    Ok(j) => j,
                    Err(e) => {
                        tracing::error!("Failed to serialize state event: {e}");
                        continue;
                    }
                };
                if sender.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    tracing::info!(%ws_id, "State watcher disconnected");
}

fn close_message(code: CloseCode, reason: &str) -> Message {
    let mut end = reason.len().min(MAX_CLOSE_REASON);
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    Message::Close(Some(CloseFrame {
        code: code.code(),
        reason: reason[..end].to_string().into(),
    }))
}

fn to_message(frame: OutboundFrame) -> Message {
    match frame {
        OutboundFrame::Binary(data) => Message::Binary(data),
        OutboundFrame::Close { code, reason } => close_message(code, &reason),
    }
}

/// Ping and pong are answered by the socket itself and never surface.
fn from_message(msg: Message) -> Option<InboundFrame> {
    match msg {
        Message::Binary(data) => Some(InboundFrame::Binary(data)),
        Message::Text(text) => Some(InboundFrame::Text(text.as_str().to_owned())),
        Message::Close(_) => Some(InboundFrame::Close),
        Message::Ping(_) | Message::Pong(_) => None,
    }
}

fn client_sink(sink: SplitSink<WebSocket, Message>) -> ClientSink {
    Box::pin(
        sink.sink_map_err(BridgeError::client)
            .with(|frame: OutboundFrame| future::ready(Ok::<_, BridgeError>(to_message(frame)))),
    )
}

fn client_stream(stream: SplitStream<WebSocket>) -> ClientStream {
    stream
        .filter_map(|msg| {
            future::ready(match msg {
                Ok(msg) => from_message(msg).map(Ok),
                Err(e) => Some(Err(BridgeError::client(e))),
            })
        })
        .boxed()
}

#[cfg(test)]
mod tests {
    use axum::body::Bytes;

    use super::*;

    #[test]
    fn test_close_reason_truncated_on_char_boundary() {
        let reason = "é".repeat(100);
        let Message::Close(Some(frame)) = close_message(CloseCode::InternalError, &reason) else {
            panic!("expected close frame");
        };
        assert_eq!(frame.code, 1011);
        assert!(frame.reason.as_str().len() <= MAX_CLOSE_REASON);
        assert!(frame.reason.as_str().chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_frame_mapping() {
        assert_eq!(
            from_message(Message::Text("ls\r".into())),
            Some(InboundFrame::Text("ls\r".to_string()))
        );
        assert_eq!(from_message(Message::Ping(Bytes::new())), None);
        assert_eq!(from_message(Message::Close(None)), Some(InboundFrame::Close));

        let out = to_message(OutboundFrame::Binary(Bytes::from_static(b"\x1b[0m")));
        assert!(matches!(out, Message::Binary(b) if b.as_ref() == b"\x1b[0m"));
    }

    #[test]
    fn test_query_defaults() {
        let query = ExecQuery {
            cols: Some(132),
            rows: None,
        };
        assert_eq!(query.size(), TermSize::new(132, 24));
    }
}
