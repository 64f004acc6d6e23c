use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;

use crate::{Client, Config, RetryConfig};

/// Mint an unsigned token whose routing claim points at `base_url`.
///
/// The signature segment is a placeholder; the client never verifies it.
pub fn unsigned_token(base_url: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"ES256","kid":"test","typ":"JWT"}"#);
    let claims = serde_json::json!({
        "aud": ["com.1password.streamingservice", base_url],
        "sub": "test-integration",
        "iat": 1623259114,
    });
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.dGVzdC1zaWduYXR1cmU")
}

/// Create a test client with retries disabled for predictable behavior.
pub fn test_client() -> Client {
    Client::new(Config {
        retry: Some(RetryConfig::disabled()),
        ..Default::default()
    })
    .expect("client")
}

/// Create a test client that retries without waiting.
pub fn fast_retry_client(max_attempts: u32) -> Client {
    Client::new(Config {
        retry: Some(RetryConfig {
            max_attempts,
            base_backoff: Duration::from_millis(0),
            max_backoff: Duration::from_millis(1),
        }),
        ..Default::default()
    })
    .expect("client")
}

/// Start a server that accepts connections and reads requests but never
/// answers. Connections stay open until the client gives up.
pub async fn start_stalled_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");

    tokio::spawn(async move {
        loop {
            let (mut socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => return,
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                loop {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(_) => continue,
                    }
                }
            });
        }
    });

    format!("http://{}", addr)
}
