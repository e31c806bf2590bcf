//! WebSocket push channel.
//!
//! The backend broadcasts one JSON incident snapshot per text frame after
//! every mutation. Frames are decoded here and handed to the board's
//! [`PushHub`](incident_board::push::PushHub) through the [`PushSource`]
//! trait.

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use incident_board::push::PushSource;
use incident_core::normalize;
use incident_core::types::Incident;
use incident_core::BoardError;

/// A connected push channel.
pub struct WsPushSource {
    url: String,
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsPushSource {
    pub async fn connect(url: &str) -> Result<Self, BoardError> {
        let (stream, _) = connect_async(url)
            .await
            .map_err(|err| BoardError::Transport {
                message: format!("push channel {url}: {err}"),
            })?;
        tracing::info!(url, "push channel connected");
        Ok(Self {
            url: url.to_string(),
            stream,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl std::fmt::Debug for WsPushSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsPushSource")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl PushSource for WsPushSource {
    async fn next(&mut self) -> Option<Result<Incident, BoardError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(decode_frame(&text)),
                Ok(Message::Binary(bytes)) => {
                    return Some(match std::str::from_utf8(&bytes) {
                        Ok(text) => decode_frame(text),
                        Err(err) => Err(BoardError::invalid_response(format!(
                            "push message: {err}"
                        ))),
                    })
                }
                Ok(Message::Close(frame)) => {
                    tracing::info!(url = %self.url, ?frame, "push channel closed by server");
                    return None;
                }
                Ok(_) => continue,
                Err(err) => {
                    tracing::warn!(url = %self.url, error = %err, "push channel read failed");
                    return None;
                }
            }
        }
    }
}

/// Decode one push frame into an incident snapshot.
pub fn decode_frame(raw: &str) -> Result<Incident, BoardError> {
    normalize::incident_from_str(raw)
}
