//! Websocket connection manager.
//!
//! DESIGN
//! ======
//! `open` performs the handshake and splits the socket. A reader task decodes
//! every inbound frame and pushes the result onto an unbounded channel, so the
//! session loop sees one ordered stream of [`Inbound`] events. The write half
//! stays with the `Connection` and is driven only by its owner.
//!
//! LIFECYCLE
//! =========
//! 1. `open` → handshake → reader task spawned
//! 2. Inbound frames → `Inbound::Message` / `Inbound::Malformed`
//! 3. Transport loss → one terminal `Inbound::Disconnected`, then the stream ends
//! 4. `close` → close frame sent, reader stopped; later sends fail
//!
//! There is no reconnect here. Recovery means a fresh `open`.

use frames::{ClientMessage, DecodeError, ServerMessage};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("websocket connect failed: {0}")]
    Connect(Box<tokio_tungstenite::tungstenite::Error>),
    #[error("websocket send failed: {0}")]
    Send(Box<tokio_tungstenite::tungstenite::Error>),
    #[error("connection closed")]
    Closed,
}

/// One event from the inbound side of the transport.
#[derive(Debug)]
pub enum Inbound {
    Message(ServerMessage),
    /// A frame arrived but failed to decode. The connection stays open.
    Malformed(DecodeError),
    /// The transport is gone. Always the last event.
    Disconnected { reason: String },
}

pub struct Connection {
    sink: Option<SplitSink<WsStream, Message>>,
    inbound: mpsc::UnboundedReceiver<Inbound>,
    reader: Option<JoinHandle<()>>,
}

impl Connection {
    /// Open the transport to `url` (credentials are already in the query).
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Connect`] when the handshake fails.
    pub async fn open(url: &str) -> Result<Self, ConnectionError> {
        let (stream, _) = connect_async(url)
            .await
            .map_err(|error| ConnectionError::Connect(Box::new(error)))?;
        info!(url = %redact_token(url), "connection: open");

        let (sink, stream) = stream.split();
        let (tx, inbound) = mpsc::unbounded_channel();
        let reader = tokio::spawn(read_loop(stream, tx));

        Ok(Self { sink: Some(sink), inbound, reader: Some(reader) })
    }

    /// Send one frame.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Closed`] after `close`, and
    /// [`ConnectionError::Send`] when the transport rejects the write.
    pub async fn send(&mut self, message: &ClientMessage) -> Result<(), ConnectionError> {
        let Some(sink) = self.sink.as_mut() else {
            return Err(ConnectionError::Closed);
        };
        let text = frames::encode_client_message(message);
        debug!(kind = message.kind().as_str(), "connection: send");
        sink.send(Message::Text(text.into()))
            .await
            .map_err(|error| ConnectionError::Send(Box::new(error)))
    }

    /// Next inbound event. `None` once the terminal event has been consumed.
    pub async fn next(&mut self) -> Option<Inbound> {
        self.inbound.recv().await
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sink.is_none()
    }

    /// Close the transport. Safe to call more than once.
    pub async fn close(&mut self) {
        let Some(mut sink) = self.sink.take() else {
            return;
        };
        if let Err(error) = sink.send(Message::Close(None)).await {
            debug!(error = %error, "connection: close frame not sent");
        }
        let _ = sink.close().await;
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.inbound.close();
        info!("connection: closed");
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

async fn read_loop(mut stream: SplitStream<WsStream>, tx: mpsc::UnboundedSender<Inbound>) {
    let reason = loop {
        let Some(frame) = stream.next().await else {
            break "stream ended".to_owned();
        };
        let event = match frame {
            Ok(Message::Text(text)) => decode(text.as_bytes()),
            Ok(Message::Binary(bytes)) => decode(&bytes),
            Ok(Message::Close(frame)) => {
                break frame
                    .map(|f| f.reason.to_string())
                    .filter(|reason| !reason.is_empty())
                    .unwrap_or_else(|| "closed by peer".to_owned());
            }
            Ok(_) => continue,
            Err(error) => break error.to_string(),
        };
        if tx.send(event).is_err() {
            return;
        }
    };
    warn!(%reason, "connection: disconnected");
    let _ = tx.send(Inbound::Disconnected { reason });
}

fn decode(bytes: &[u8]) -> Inbound {
    match frames::decode_server_message(bytes) {
        Ok(message) => Inbound::Message(message),
        Err(error) => Inbound::Malformed(error),
    }
}

/// Strip the credential from a session URL before it reaches the logs.
fn redact_token(url: &str) -> String {
    match url.split_once("token=") {
        Some((head, _)) => format!("{head}token=***"),
        None => url.to_owned(),
    }
}

#[cfg(test)]
#[path = "connection_test.rs"]
mod tests;
