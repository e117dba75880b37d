//! Push channel from the service.
//!
//! The WebSocket transport only produces `UpdateEvent`s onto a queue; whoever
//! consumes them never sees the socket.

use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::common::{FaceLinkError, Result};
use crate::service::protocol::{PushMessage, UpdateEvent};

enum PumpEnd {
    Cancelled,
    Closed,
    ConsumerGone,
}

/// Connect to `url` and forward events until `cancel` fires. Connection errors
/// are logged; with `reconnect` set the channel retries after that delay.
pub fn spawn_push_channel(
    url: String,
    reconnect: Option<Duration>,
    events: mpsc::Sender<UpdateEvent>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match pump(&url, &events, &cancel).await {
                Ok(PumpEnd::Cancelled) | Ok(PumpEnd::ConsumerGone) => break,
                Ok(PumpEnd::Closed) => info!("Update stream closed by server"),
                Err(e) => error!("Update stream error ({}): {}", url, e),
            }

            let Some(delay) = reconnect else { break };
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => debug!("Reconnecting update stream"),
            }
        }
        info!("Update stream disconnected");
    })
}

async fn pump(
    url: &str,
    events: &mpsc::Sender<UpdateEvent>,
    cancel: &CancellationToken,
) -> Result<PumpEnd> {
    let (mut ws, _response) = tokio::select! {
        _ = cancel.cancelled() => return Ok(PumpEnd::Cancelled),
        connected = connect_async(url) => connected
            .map_err(|e| FaceLinkError::Transport(format!("connect failed: {}", e)))?,
    };
    info!("Connected to update stream {}", url);

    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => {
                if let Err(e) = ws.close(None).await {
                    debug!("Update stream close: {}", e);
                }
                return Ok(PumpEnd::Cancelled);
            }
            message = ws.next() => message,
        };

        match message {
            None | Some(Ok(Message::Close(_))) => return Ok(PumpEnd::Closed),
            Some(Err(e)) => return Err(FaceLinkError::Transport(e.to_string())),
            Some(Ok(Message::Text(text))) => {
                let Some(event) = parse_event(&text) else { continue };
                if events.send(event).await.is_err() {
                    return Ok(PumpEnd::ConsumerGone);
                }
            }
            Some(Ok(_)) => {}
        }
    }
}

/// Decode one push message. Malformed and unknown messages are skipped.
pub fn parse_event(text: &str) -> Option<UpdateEvent> {
    match serde_json::from_str::<PushMessage>(text) {
        Ok(message) => {
            let kind = message.kind.clone();
            let event = message.into_event();
            if event.is_none() {
                debug!("Ignoring push message of type {}", kind);
            }
            event
        }
        Err(e) => {
            warn!("Push message parse error: {}", e);
            None
        }
    }
}
