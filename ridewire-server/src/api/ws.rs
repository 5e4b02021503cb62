use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use kanau::processor::Processor;
use ridewire_core::events::{ChannelHandle, ConnectionClosed, OutboundReceiver};
use ridewire_core::processors::InboundFrame;
use tokio_stream::wrappers::ReceiverStream;

use crate::state::AppState;

/// `GET /ws`: the dispatch channel.
///
/// Every connection gets a bounded outbound queue drained by its own writer
/// task; the reader loop below feeds inbound text frames to the
/// [`MessageRouter`](ridewire_core::processors::MessageRouter). Binary and
/// ping frames are ignored.
pub async fn dispatch_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let buffer = state.dispatcher.config().outbound_buffer;
    let (handle, outbound_rx) = ChannelHandle::open(buffer);
    let connection = handle.id();
    let (sink, mut stream) = socket.split();
    tracing::info!(%connection, "WS: connection opened");

    let mut writer = tokio::spawn(write_outbound(sink, outbound_rx));
    let mut shutdown_rx = state.shutdown_rx.clone();

    loop {
        tokio::select! {
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        let frame = InboundFrame {
                            connection: handle.clone(),
                            payload: text.as_str().to_owned(),
                        };
                        if let Err(never) = state.router.process(frame).await {
                            match never {}
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(%connection, error = %e, "WS: receive failed");
                        break;
                    }
                }
            }

            _ = &mut writer => {
                tracing::debug!(%connection, "WS: writer stopped");
                break;
            }

            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }

    if let Err(never) = state.dispatcher.process(ConnectionClosed { connection }).await {
        match never {}
    }
    drop(handle);
    writer.abort();
    tracing::info!(%connection, "WS: connection closed");
}

/// Serialize queued messages into text frames until the queue or the
/// socket closes.
async fn write_outbound(
    mut sink: futures_util::stream::SplitSink<WebSocket, Message>,
    outbound_rx: OutboundReceiver,
) {
    let mut outbound = ReceiverStream::new(outbound_rx);
    while let Some(message) = outbound.next().await {
        let json = match serde_json::to_string(&message) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(error = %e, kind = message.kind(), "WS: failed to encode message");
                continue;
            }
        };
        if sink.send(Message::Text(json.into())).await.is_err() {
            return;
        }
    }
    let _ = sink.close().await;
}
