//! WhatsApp channel: Cloud API (Graph) media download and text replies.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::error::ChannelError;
use crate::pipeline::types::{MediaDownload, MediaRef, MessagingTransport};

/// Graph API root including version.
pub const GRAPH_API_BASE: &str = "https://graph.facebook.com/v20.0";

/// Maximum text body length accepted by the messages endpoint.
const WHATSAPP_MAX_MESSAGE_LENGTH: usize = 4096;

/// Content type assumed when neither the API nor the download says otherwise.
const DEFAULT_CONTENT_TYPE: &str = "image/jpeg";

/// WhatsApp Cloud API transport.
pub struct WhatsAppChannel {
    access_token: SecretString,
    phone_number_id: String,
    api_base: String,
    client: reqwest::Client,
}

impl WhatsAppChannel {
    pub fn new(access_token: SecretString, phone_number_id: impl Into<String>) -> Self {
        Self {
            access_token,
            phone_number_id: phone_number_id.into(),
            api_base: GRAPH_API_BASE.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Use a different Graph host (tests, proxies).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/{path}", self.api_base.trim_end_matches('/'))
    }

    fn media_error(media_id: &str, reason: impl ToString) -> ChannelError {
        ChannelError::MediaUnavailable {
            name: "whatsapp".into(),
            media_id: media_id.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Send a single body chunk (≤4096 chars).
    async fn send_message_chunk(&self, to: &str, text: &str) -> Result<(), ChannelError> {
        let body = serde_json::json!({
            "messaging_product": "whatsapp",
            "to": to,
            "type": "text",
            "text": { "body": text }
        });

        let resp = self
            .client
            .post(self.api_url(&format!("{}/messages", self.phone_number_id)))
            .bearer_auth(self.access_token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "whatsapp".into(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let err = resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: "whatsapp".into(),
                reason: format!("messages returned {status}: {err}"),
            });
        }

        Ok(())
    }
}

/// `GET /{media-id}` response.
#[derive(Debug, Deserialize)]
struct MediaInfo {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
}

#[async_trait]
impl MessagingTransport for WhatsAppChannel {
    fn name(&self) -> &str {
        "whatsapp"
    }

    async fn fetch_media(&self, media: &MediaRef) -> Result<MediaDownload, ChannelError> {
        // 1) resolve the media ID to a short-lived download URL
        let resp = self
            .client
            .get(self.api_url(&media.id))
            .bearer_auth(self.access_token.expose_secret())
            .send()
            .await
            .map_err(|e| Self::media_error(&media.id, e))?;

        if !resp.status().is_success() {
            return Err(Self::media_error(
                &media.id,
                format!("media lookup returned {}", resp.status()),
            ));
        }

        let info: MediaInfo = resp
            .json()
            .await
            .map_err(|e| Self::media_error(&media.id, e))?;

        let Some(url) = info.url.filter(|u| !u.is_empty()) else {
            return Err(Self::media_error(&media.id, "media lookup returned no url"));
        };

        // 2) download it (the URL also needs the token)
        let resp = self
            .client
            .get(&url)
            .bearer_auth(self.access_token.expose_secret())
            .send()
            .await
            .map_err(|e| Self::media_error(&media.id, e))?;

        if !resp.status().is_success() {
            return Err(Self::media_error(
                &media.id,
                format!("download returned {}", resp.status()),
            ));
        }

        let content_type = info
            .mime_type
            .or_else(|| media.mime_type.clone())
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| Self::media_error(&media.id, e))?;

        tracing::debug!(media_id = %media.id, len = bytes.len(), "WhatsApp media downloaded");
        Ok(MediaDownload {
            bytes: bytes.to_vec(),
            content_type,
        })
    }

    /// Splits bodies that exceed the 4096-char limit.
    async fn send_text(&self, to: &str, body: &str) -> Result<(), ChannelError> {
        for chunk in split_message(body, WHATSAPP_MAX_MESSAGE_LENGTH) {
            self.send_message_chunk(to, &chunk).await?;
        }
        tracing::debug!(to = %to, "WhatsApp text sent");
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Split a message into chunks of at most `max_chars` characters.
/// Tries to split on newlines, then spaces, then hard-cuts.
fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut remaining = text;

    loop {
        // Byte offset of the first char past the limit, if any.
        let Some((limit, _)) = remaining.char_indices().nth(max_chars) else {
            chunks.push(remaining.to_string());
            break;
        };

        let window = &remaining[..limit];
        let separator = window
            .rfind('\n')
            .or_else(|| window.rfind(' '))
            .filter(|&at| at > 0);

        // Drop only the separator itself; indentation on the next line stays.
        let (split_at, resume_at) = match separator {
            Some(at) => (at, at + 1),
            None => (limit, limit),
        };

        chunks.push(remaining[..split_at].to_string());
        remaining = &remaining[resume_at..];
        if remaining.is_empty() {
            break;
        }
    }

    chunks
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::extract::{Path, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use tokio::net::TcpListener;

    use super::*;

    // ── URL / splitting ─────────────────────────────────────────────

    #[test]
    fn whatsapp_api_url() {
        let ch = WhatsAppChannel::new(SecretString::from("t".to_string()), "1234");
        assert_eq!(
            ch.api_url("1234/messages"),
            "https://graph.facebook.com/v20.0/1234/messages"
        );
    }

    #[test]
    fn split_message_short() {
        assert_eq!(split_message("Hello", 4096), vec!["Hello"]);
    }

    #[test]
    fn split_message_exact_limit() {
        let msg = "a".repeat(4096);
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 4096);
    }

    #[test]
    fn split_message_over_limit_on_newline() {
        let msg = format!("{}\n{}", "a".repeat(2000), "b".repeat(3000));
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks, vec!["a".repeat(2000), "b".repeat(3000)]);
    }

    #[test]
    fn split_message_over_limit_on_space() {
        let msg = format!("{} {}", "a".repeat(2000), "b".repeat(3000));
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks, vec!["a".repeat(2000), "b".repeat(3000)]);
    }

    #[test]
    fn split_message_keeps_indentation_after_newline() {
        let msg = format!("{}\n  - 🔥 163 kcal", "a".repeat(10));
        let chunks = split_message(&msg, 14);
        assert_eq!(chunks, vec!["a".repeat(10), "  - 🔥 163 kcal".to_string()]);
    }

    #[test]
    fn split_message_no_good_split_point() {
        let chunks = split_message(&"a".repeat(5000), 4096);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 4096);
        assert_eq!(chunks[1].len(), 904);
    }

    #[test]
    fn split_message_counts_chars_not_bytes() {
        // Each emoji is 4 bytes; 10 of them fit a 10-char limit.
        let msg = "🍽".repeat(10);
        assert_eq!(split_message(&msg, 10), vec![msg.clone()]);
        assert_eq!(split_message(&msg, 4).len(), 3);
    }

    // ── Against a local stand-in for the Graph API ──────────────────

    #[derive(Clone, Default)]
    struct GraphState {
        base: Arc<Mutex<String>>,
        sent: Arc<Mutex<Vec<serde_json::Value>>>,
    }

    fn authorized(headers: &HeaderMap) -> bool {
        headers.get("authorization").and_then(|v| v.to_str().ok()) == Some("Bearer wa-test")
    }

    async fn media_info(
        State(state): State<GraphState>,
        Path(id): Path<String>,
        headers: HeaderMap,
    ) -> impl IntoResponse {
        if !authorized(&headers) {
            return StatusCode::UNAUTHORIZED.into_response();
        }
        let base = state.base.lock().unwrap().clone();
        match id.as_str() {
            "media-ok" => Json(serde_json::json!({
                "url": format!("{base}/download/media-ok"),
                "mime_type": "image/png"
            }))
            .into_response(),
            "media-no-url" => Json(serde_json::json!({"id": "media-no-url"})).into_response(),
            _ => StatusCode::NOT_FOUND.into_response(),
        }
    }

    async fn download(headers: HeaderMap) -> impl IntoResponse {
        if !authorized(&headers) {
            return StatusCode::UNAUTHORIZED.into_response();
        }
        vec![0x89u8, 0x50, 0x4E, 0x47].into_response()
    }

    async fn messages(
        State(state): State<GraphState>,
        Path(number_id): Path<String>,
        headers: HeaderMap,
        Json(body): Json<serde_json::Value>,
    ) -> impl IntoResponse {
        if !authorized(&headers) || number_id != "1234" {
            return StatusCode::UNAUTHORIZED.into_response();
        }
        state.sent.lock().unwrap().push(body);
        Json(serde_json::json!({"messages": [{"id": "wamid.out"}]})).into_response()
    }

    async fn start_graph() -> (String, GraphState) {
        let state = GraphState::default();
        let app = Router::new()
            .route("/v20.0/{id}", get(media_info))
            .route("/v20.0/{id}/messages", post(messages))
            .route("/download/media-ok", get(download))
            .with_state(state.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        let base = format!("http://127.0.0.1:{port}");
        *state.base.lock().unwrap() = base.clone();
        (base, state)
    }

    fn channel(base: &str, token: &str) -> WhatsAppChannel {
        WhatsAppChannel::new(SecretString::from(token.to_string()), "1234")
            .with_api_base(format!("{base}/v20.0"))
    }

    fn media(id: &str) -> MediaRef {
        MediaRef {
            id: id.into(),
            mime_type: Some("image/jpeg".into()),
        }
    }

    #[tokio::test]
    async fn fetch_media_resolves_url_then_downloads() {
        let (base, _) = start_graph().await;
        let download = channel(&base, "wa-test")
            .fetch_media(&media("media-ok"))
            .await
            .unwrap();
        assert_eq!(download.bytes, vec![0x89, 0x50, 0x4E, 0x47]);
        assert_eq!(download.content_type, "image/png");
    }

    #[tokio::test]
    async fn fetch_media_without_url_is_unavailable() {
        let (base, _) = start_graph().await;
        let err = channel(&base, "wa-test")
            .fetch_media(&media("media-no-url"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no url"), "{err}");
    }

    #[tokio::test]
    async fn fetch_media_unknown_id_is_unavailable() {
        let (base, _) = start_graph().await;
        let err = channel(&base, "wa-test")
            .fetch_media(&media("missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::MediaUnavailable { .. }));
    }

    #[tokio::test]
    async fn send_text_posts_whatsapp_payload() {
        let (base, state) = start_graph().await;
        channel(&base, "wa-test")
            .send_text("5511999999999", "hello")
            .await
            .unwrap();

        let sent = state.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0]["messaging_product"], "whatsapp");
        assert_eq!(sent[0]["to"], "5511999999999");
        assert_eq!(sent[0]["text"]["body"], "hello");
    }

    #[tokio::test]
    async fn send_text_rejected_is_send_failed() {
        let (base, _) = start_graph().await;
        let err = channel(&base, "bad-token")
            .send_text("5511999999999", "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::SendFailed { .. }));
    }
}
