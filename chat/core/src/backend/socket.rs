//! Socket Relay
//!
//! Streams completions through a WebSocket chat proxy.
//!
//! # Wire Protocol
//!
//! - Open a connection to the proxy URL.
//! - Send one text frame: `{"chatId", "appId", "systemPrompt", "message"}`.
//!   History is not sent; the proxy keeps context per `chatId`.
//! - Every inbound text frame is one fragment.
//! - Close code 1000 means the answer is complete. Any other code or a close
//!   without status is [`RelayError::Closed`]. A transport error at any point
//!   is [`RelayError::Connect`].

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio_tungstenite::tungstenite::Message;

use super::traits::{Relay, RelayError, RelayRequest};

/// Close code for a normal closure
const NORMAL_CLOSURE: u16 = 1000;

/// Default chat proxy endpoint
pub const DEFAULT_SOCKET_URL: &str = "wss://backend.buildpicoapps.com/api/chatbot/chat";

/// Default application identifier expected by the proxy
pub const DEFAULT_APP_ID: &str = "animal-rate";

/// Socket relay configuration
#[derive(Clone, Debug, PartialEq)]
pub struct SocketRelayConfig {
    /// `ws://` or `wss://` endpoint
    pub url: String,
    /// Application identifier sent on open
    pub app_id: String,
    /// System prompt sent on open
    pub system_prompt: String,
}

impl Default for SocketRelayConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_SOCKET_URL.to_string(),
            app_id: DEFAULT_APP_ID.to_string(),
            system_prompt: String::new(),
        }
    }
}

/// First (and only) outbound frame
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OpeningFrame<'a> {
    chat_id: &'a str,
    app_id: &'a str,
    system_prompt: &'a str,
    message: &'a str,
}

/// WebSocket proxy relay
#[derive(Clone, Debug)]
pub struct SocketRelay {
    config: SocketRelayConfig,
}

impl SocketRelay {
    /// Create a socket relay
    #[must_use]
    pub fn new(config: SocketRelayConfig) -> Self {
        Self { config }
    }

    /// Endpoint this relay connects to
    #[must_use]
    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Serialize the opening frame for a request
    fn opening_frame(&self, request: &RelayRequest) -> Result<String, RelayError> {
        serde_json::to_string(&OpeningFrame {
            chat_id: request.session_id.as_str(),
            app_id: &self.config.app_id,
            system_prompt: &self.config.system_prompt,
            message: &request.message,
        })
        .map_err(|e| RelayError::Decode(e.to_string()))
    }
}

#[async_trait]
impl Relay for SocketRelay {
    fn name(&self) -> &str {
        "socket"
    }

    async fn stream(
        &self,
        request: &RelayRequest,
        on_fragment: &mut (dyn FnMut(String) + Send),
    ) -> Result<(), RelayError> {
        let frame = self.opening_frame(request)?;

        let (mut socket, _response) = tokio_tungstenite::connect_async(self.config.url.as_str())
            .await
            .map_err(|e| {
                tracing::error!(url = %self.config.url, error = %e, "WebSocket connect failed");
                RelayError::Connect(e.to_string())
            })?;

        socket
            .send(Message::Text(frame))
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to send opening frame");
                RelayError::Connect(e.to_string())
            })?;

        while let Some(incoming) = socket.next().await {
            match incoming {
                Ok(Message::Text(text)) => {
                    if !text.is_empty() {
                        on_fragment(text);
                    }
                }
                Ok(Message::Close(close)) => {
                    let code = close.map(|frame| u16::from(frame.code));
                    // Flush the queued close reply before dropping the socket
                    let _ = socket.flush().await;

                    return if code == Some(NORMAL_CLOSURE) {
                        Ok(())
                    } else {
                        tracing::error!(code = ?code, "WebSocket closed abnormally");
                        Err(RelayError::Closed { code })
                    };
                }
                Ok(other) => {
                    tracing::trace!(kind = ?frame_kind(&other), "Ignoring non-text frame");
                }
                Err(e) => {
                    tracing::error!(error = %e, "WebSocket error");
                    return Err(RelayError::Connect(e.to_string()));
                }
            }
        }

        // Socket ended without a close frame
        Err(RelayError::Closed { code: None })
    }
}

fn frame_kind(message: &Message) -> &'static str {
    match message {
        Message::Text(_) => "text",
        Message::Binary(_) => "binary",
        Message::Ping(_) => "ping",
        Message::Pong(_) => "pong",
        Message::Close(_) => "close",
        Message::Frame(_) => "frame",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::SessionId;

    #[test]
    fn test_opening_frame_shape() {
        let relay = SocketRelay::new(SocketRelayConfig {
            url: "ws://127.0.0.1:1".to_string(),
            app_id: "demo-app".to_string(),
            system_prompt: "Be brief.".to_string(),
        });
        let session = SessionId("chat-42".to_string());
        let request = RelayRequest::new("Hello", session);

        let frame = relay.opening_frame(&request).unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();

        assert_eq!(value["chatId"], "chat-42");
        assert_eq!(value["appId"], "demo-app");
        assert_eq!(value["systemPrompt"], "Be brief.");
        assert_eq!(value["message"], "Hello");
        assert_eq!(value.as_object().unwrap().len(), 4);
    }

    #[test]
    fn test_default_config() {
        let config = SocketRelayConfig::default();
        assert_eq!(config.url, DEFAULT_SOCKET_URL);
        assert_eq!(config.app_id, DEFAULT_APP_ID);
    }

    #[tokio::test]
    async fn test_connect_failure_is_connect_error() {
        // Port 1 on loopback is never listening
        let relay = SocketRelay::new(SocketRelayConfig {
            url: "ws://127.0.0.1:1/chat".to_string(),
            ..SocketRelayConfig::default()
        });
        let request = RelayRequest::new("Hello", SessionId::new());
        let mut fragments = Vec::new();

        let result = relay.stream(&request, &mut |f| fragments.push(f)).await;

        assert!(matches!(result, Err(RelayError::Connect(_))));
        assert!(fragments.is_empty());
    }
}
