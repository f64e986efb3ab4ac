//! Telegram Bot API notifier.

use super::Notifier;
use crate::config::TelegramSettings;
use crate::diff::DiffResult;
use crate::error::NotifyError;
use crate::output::render_diff_report;
use crate::types::ScanRecord;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Longest message the Bot API accepts, in characters.
pub const TELEGRAM_MAX_MESSAGE_LEN: usize = 4096;

const DEFAULT_API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Sends the diff report to one chat.
#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    client: reqwest::Client,
    api_base: String,
    token: String,
    chat_id: i64,
}

impl TelegramNotifier {
    pub fn new(token: impl Into<String>, chat_id: i64) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            api_base: DEFAULT_API_BASE.to_string(),
            token: token.into(),
            chat_id,
        })
    }

    /// Build a notifier from the `[telegram]` section, or `None` when it is
    /// disabled or has no token.
    pub fn from_settings(settings: &TelegramSettings) -> Result<Option<Self>, NotifyError> {
        if !settings.is_active() {
            return Ok(None);
        }
        Self::new(settings.token.clone(), settings.chat_id).map(Some)
    }

    /// Point at a different API server.
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    /// Send `text`, split into as many messages as needed.
    pub async fn send(&self, text: &str) -> Result<(), NotifyError> {
        let chunks = split_message(text, TELEGRAM_MAX_MESSAGE_LEN);
        let total = chunks.len();
        for (i, chunk) in chunks.iter().enumerate() {
            debug!(part = i + 1, total, chars = chunk.chars().count(), "sending telegram message");
            self.send_chunk(chunk).await?;
        }
        info!(parts = total, "telegram notification sent");
        Ok(())
    }

    async fn send_chunk(&self, text: &str) -> Result<(), NotifyError> {
        // The token is part of the URL; keep it out of error messages.
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.token);
        let response: ApiResponse = self
            .client
            .post(&url)
            .json(&SendMessage {
                chat_id: self.chat_id,
                text,
            })
            .send()
            .await
            .map_err(|e| NotifyError::Http(e.without_url()))?
            .json()
            .await
            .map_err(|e| NotifyError::Http(e.without_url()))?;

        if !response.ok {
            return Err(NotifyError::Api(
                response
                    .description
                    .unwrap_or_else(|| "request rejected".to_string()),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn notify(&self, diff: &DiffResult, _fresh: &[ScanRecord]) -> Result<(), NotifyError> {
        self.send(&render_diff_report(diff)).await
    }
}

/// Split `text` into pieces of at most `max_chars` characters.
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return vec![String::new()];
    }
    chars
        .chunks(max_chars)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    #[test]
    fn test_split_short_message() {
        assert_eq!(split_message("hello", 4096), vec!["hello".to_string()]);
    }

    #[test]
    fn test_split_counts_characters_not_bytes() {
        let text = "é".repeat(5);
        let parts = split_message(&text, 2);
        assert_eq!(parts, vec!["éé", "éé", "é"]);
    }

    #[test]
    fn test_split_exact_multiple() {
        let text = "x".repeat(TELEGRAM_MAX_MESSAGE_LEN * 2);
        let parts = split_message(&text, TELEGRAM_MAX_MESSAGE_LEN);
        assert_eq!(parts.len(), 2);
        assert!(parts.iter().all(|p| p.len() == TELEGRAM_MAX_MESSAGE_LEN));
    }

    #[test]
    fn test_disabled_settings_build_nothing() {
        let settings = TelegramSettings {
            enabled: false,
            token: "t".to_string(),
            chat_id: 1,
        };
        assert!(TelegramNotifier::from_settings(&settings).unwrap().is_none());
    }

    /// Answer `replies.len()` requests with canned JSON bodies, reporting
    /// each request body on the returned channel.
    async fn fake_api(replies: Vec<&'static str>) -> (String, mpsc::UnboundedReceiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            for reply in replies {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = Vec::new();
                let mut chunk = [0u8; 4096];
                let body = loop {
                    let n = socket.read(&mut chunk).await.unwrap();
                    buf.extend_from_slice(&chunk[..n]);
                    let text = String::from_utf8_lossy(&buf).to_string();
                    if let Some((head, body)) = text.split_once("\r\n\r\n") {
                        let len = head
                            .lines()
                            .find_map(|l| {
                                let (name, value) = l.split_once(':')?;
                                name.eq_ignore_ascii_case("content-length")
                                    .then(|| value.trim().parse::<usize>().ok())?
                            })
                            .unwrap_or(0);
                        if body.len() >= len {
                            break body.to_string();
                        }
                    }
                    if n == 0 {
                        break String::new();
                    }
                };
                tx.send(body).unwrap();

                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    reply.len(),
                    reply
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
        });

        (format!("http://{}", addr), rx)
    }

    #[tokio::test]
    async fn test_send_posts_chat_and_text() {
        let (base, mut bodies) = fake_api(vec![r#"{"ok":true,"result":{}}"#]).await;
        let notifier = TelegramNotifier::new("123:abc", 42).unwrap().with_api_base(base);

        notifier.send("DIFF REPORT").await.unwrap();

        let body: serde_json::Value = serde_json::from_str(&bodies.recv().await.unwrap()).unwrap();
        assert_eq!(body["chat_id"], 42);
        assert_eq!(body["text"], "DIFF REPORT");
    }

    #[tokio::test]
    async fn test_long_message_is_sent_in_parts() {
        let ok = r#"{"ok":true}"#;
        let (base, mut bodies) = fake_api(vec![ok, ok]).await;
        let notifier = TelegramNotifier::new("t", 7).unwrap().with_api_base(base);

        notifier.send(&"a".repeat(TELEGRAM_MAX_MESSAGE_LEN + 10)).await.unwrap();

        let first: serde_json::Value = serde_json::from_str(&bodies.recv().await.unwrap()).unwrap();
        let second: serde_json::Value = serde_json::from_str(&bodies.recv().await.unwrap()).unwrap();
        assert_eq!(first["text"].as_str().unwrap().len(), TELEGRAM_MAX_MESSAGE_LEN);
        assert_eq!(second["text"].as_str().unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_transport_error_hides_token() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let notifier = TelegramNotifier::new("123456:SECRET-TOKEN", 1)
            .unwrap()
            .with_api_base(format!("http://{}", addr));

        let err = notifier.send("hi").await.unwrap_err();
        assert!(matches!(err, NotifyError::Http(_)));
        assert!(!err.to_string().contains("SECRET-TOKEN"), "{}", err);
        assert!(!format!("{:?}", err).contains("SECRET-TOKEN"));
    }

    #[tokio::test]
    async fn test_undecodable_reply_hides_token() {
        let (base, _bodies) = fake_api(vec!["not json"]).await;
        let notifier = TelegramNotifier::new("123456:SECRET-TOKEN", 1)
            .unwrap()
            .with_api_base(base);

        let err = notifier.send("hi").await.unwrap_err();
        assert!(matches!(err, NotifyError::Http(_)));
        assert!(!err.to_string().contains("SECRET-TOKEN"), "{}", err);
    }

    #[tokio::test]
    async fn test_api_rejection_is_an_error() {
        let (base, _bodies) =
            fake_api(vec![r#"{"ok":false,"description":"Bad Request: chat not found"}"#]).await;
        let notifier = TelegramNotifier::new("t", 1).unwrap().with_api_base(base);

        match notifier.send("hi").await {
            Err(NotifyError::Api(msg)) => assert!(msg.contains("chat not found")),
            other => panic!("expected API error, got {:?}", other),
        }
    }
}
