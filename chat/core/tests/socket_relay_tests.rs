//! Socket relay against a local WebSocket server

use chat_core::backend::{Relay, RelayError, RelayRequest, SocketRelay, SocketRelayConfig};
use chat_core::SessionId;
use futures::{SinkExt, StreamExt};
use pretty_assertions::assert_eq;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

/// How the test server ends the exchange
#[derive(Clone, Copy)]
enum Ending {
    Close(u16),
    Drop,
}

/// Serve one connection: capture the opening frame, send `fragments`, end
async fn serve_once(
    fragments: Vec<&'static str>,
    ending: Ending,
) -> (String, oneshot::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/api/chatbot/chat", listener.local_addr().unwrap());
    let (opening_tx, opening_rx) = oneshot::channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        if let Some(Ok(Message::Text(opening))) = ws.next().await {
            let _ = opening_tx.send(opening);
        }

        for fragment in fragments {
            ws.send(Message::Text(fragment.to_string())).await.unwrap();
        }

        match ending {
            Ending::Close(code) => {
                let frame = CloseFrame {
                    code: CloseCode::from(code),
                    reason: "".into(),
                };
                let _ = ws.close(Some(frame)).await;
                // Drain until the client answers the close
                while let Some(Ok(_)) = ws.next().await {}
            }
            Ending::Drop => drop(ws),
        }
    });

    (url, opening_rx)
}

fn relay(url: String) -> SocketRelay {
    SocketRelay::new(SocketRelayConfig {
        url,
        app_id: "animal-rate".to_string(),
        system_prompt: "Keep it short.".to_string(),
    })
}

#[tokio::test]
async fn test_normal_close_is_success() {
    let (url, _opening) = serve_once(vec!["Hi", " there!"], Ending::Close(1000)).await;
    let relay = relay(url);
    let request = RelayRequest::new("Hello", SessionId::new());
    let mut fragments = Vec::new();

    let result = relay.stream(&request, &mut |f| fragments.push(f)).await;

    assert_eq!(result, Ok(()));
    assert_eq!(fragments, vec!["Hi", " there!"]);
}

#[tokio::test]
async fn test_abnormal_close_is_failure() {
    let (url, _opening) = serve_once(vec!["partial"], Ending::Close(1011)).await;
    let relay = relay(url);
    let request = RelayRequest::new("test", SessionId::new());
    let mut fragments = Vec::new();

    let result = relay.stream(&request, &mut |f| fragments.push(f)).await;

    assert_eq!(result, Err(RelayError::Closed { code: Some(1011) }));
    // Delivered fragments stay delivered
    assert_eq!(fragments, vec!["partial"]);
}

#[tokio::test]
async fn test_vanishing_server_is_failure() {
    let (url, _opening) = serve_once(vec!["a"], Ending::Drop).await;
    let relay = relay(url);
    let request = RelayRequest::new("test", SessionId::new());
    let mut fragments = Vec::new();

    let result = relay.stream(&request, &mut |f| fragments.push(f)).await;

    let error = result.unwrap_err();
    assert!(
        matches!(
            error,
            RelayError::Connect(_) | RelayError::Closed { code: None }
        ),
        "unexpected error: {error:?}"
    );
    if let RelayError::Connect(_) = error {
        assert_eq!(
            error.to_string(),
            "A connection error occurred. Service may be temporarily unavailable."
        );
    }
}

#[tokio::test]
async fn test_opening_frame_sent() {
    let (url, opening) = serve_once(vec![], Ending::Close(1000)).await;
    let relay = relay(url);
    let session = SessionId("chat-7".to_string());
    let request = RelayRequest::new("What is HRM?", session);

    let result = relay.stream(&request, &mut |_| {}).await;
    assert_eq!(result, Ok(()));

    let opening: serde_json::Value = serde_json::from_str(&opening.await.unwrap()).unwrap();
    assert_eq!(opening["chatId"], "chat-7");
    assert_eq!(opening["appId"], "animal-rate");
    assert_eq!(opening["systemPrompt"], "Keep it short.");
    assert_eq!(opening["message"], "What is HRM?");
}
