use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::LazyLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::backend::error::{ChatError, Result};

const WATCH_URL: &str = "https://www.youtube.com/watch";
const LIVE_CHAT_URL: &str = "https://www.youtube.com/youtubei/v1/live_chat/get_live_chat";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const CLIENT_NAME: &str = "WEB";
const CLIENT_VERSION: &str = "2.20240101.00.00";
const DEFAULT_POLL_DELAY: Duration = Duration::from_secs(1);
const MAX_POLL_DELAY: Duration = Duration::from_secs(10);

static API_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""INNERTUBE_API_KEY":"([^"]+)""#).expect("valid pattern"));
static CONTINUATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""continuation":"([^"]+)""#).expect("valid pattern"));

/// One chat line as delivered by the poller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatItem {
    pub author: String,
    pub message: String,
}

/// A live chat being polled
#[async_trait]
pub trait LiveChatHandle: Send {
    fn is_alive(&self) -> bool;

    /// Next batch of messages. Waits out the server-advised poll delay.
    async fn fetch_batch(&mut self) -> Result<Vec<ChatItem>>;

    fn terminate(&mut self);
}

/// Opens a `LiveChatHandle` for a video
#[async_trait]
pub trait LiveChatSource: Send + Sync {
    async fn create(&self, video_id: &str) -> Result<Box<dyn LiveChatHandle>>;
}

/// Polls the public web live-chat endpoint. Needs no API key.
pub struct InnertubeLiveChat {
    client: reqwest::Client,
}

impl InnertubeLiveChat {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl Default for InnertubeLiveChat {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LiveChatSource for InnertubeLiveChat {
    async fn create(&self, video_id: &str) -> Result<Box<dyn LiveChatHandle>> {
        let html = self
            .client
            .get(WATCH_URL)
            .query(&[("v", video_id)])
            .send()
            .await?
            .text()
            .await?;

        let (api_key, continuation) = extract_page_tokens(&html)?;
        log::info!("Polling live chat of {}", video_id);

        Ok(Box::new(InnertubeHandle {
            client: self.client.clone(),
            api_key,
            continuation: Some(continuation),
            delay: Duration::ZERO,
            since_usec: now_usec(),
        }))
    }
}

struct InnertubeHandle {
    client: reqwest::Client,
    api_key: String,
    continuation: Option<String>,
    delay: Duration,
    /// Backlog older than the connect time is skipped
    since_usec: u64,
}

#[async_trait]
impl LiveChatHandle for InnertubeHandle {
    fn is_alive(&self) -> bool {
        self.continuation.is_some()
    }

    async fn fetch_batch(&mut self) -> Result<Vec<ChatItem>> {
        let Some(continuation) = self.continuation.clone() else {
            return Ok(Vec::new());
        };
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let body = json!({
            "context": {
                "client": {
                    "clientName": CLIENT_NAME,
                    "clientVersion": CLIENT_VERSION,
                }
            },
            "continuation": continuation,
        });

        let response = self
            .client
            .post(LIVE_CHAT_URL)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ChatError::Http(format!(
                "Live chat poll failed: HTTP {}",
                response.status()
            )));
        }

        let page = parse_chat_response(&response.json::<Value>().await?, self.since_usec);
        match page.next {
            Some((token, delay)) => {
                self.continuation = Some(token);
                self.delay = delay;
            }
            None => {
                log::info!("Live chat offered no further continuation");
                self.continuation = None;
            }
        }
        Ok(page.items)
    }

    fn terminate(&mut self) {
        self.continuation = None;
    }
}

fn now_usec() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64
}

/// Innertube key and the first live-chat continuation from a watch page
fn extract_page_tokens(html: &str) -> Result<(String, String)> {
    let api_key = API_KEY_RE
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| ChatError::Resolution("Video page has no innertube key".to_string()))?;

    let continuation = html
        .find("liveChatRenderer")
        .and_then(|pos| CONTINUATION_RE.captures(&html[pos..]))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| {
            ChatError::Resolution("No live chat on this video. Is the stream live?".to_string())
        })?;

    Ok((api_key, continuation))
}

#[derive(Debug, Default)]
struct ChatPage {
    items: Vec<ChatItem>,
    next: Option<(String, Duration)>,
}

fn parse_chat_response(json: &Value, since_usec: u64) -> ChatPage {
    let Some(chat) = json.pointer("/continuationContents/liveChatContinuation") else {
        return ChatPage::default();
    };

    let items = chat
        .get("actions")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|action| action.pointer("/addChatItemAction/item/liveChatTextMessageRenderer"))
        .filter(|item| {
            let sent = item
                .get("timestampUsec")
                .and_then(Value::as_str)
                .and_then(|t| t.parse::<u64>().ok())
                .unwrap_or(u64::MAX);
            sent >= since_usec
        })
        .filter_map(parse_text_message)
        .collect();

    let next = chat
        .pointer("/continuations/0")
        .and_then(|c| {
            c.get("invalidationContinuationData")
                .or_else(|| c.get("timedContinuationData"))
        })
        .and_then(|data| {
            let token = data.get("continuation")?.as_str()?.to_string();
            let delay = data
                .get("timeoutMs")
                .and_then(Value::as_u64)
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_POLL_DELAY)
                .min(MAX_POLL_DELAY);
            Some((token, delay))
        });

    ChatPage { items, next }
}

/// Author and flattened text of one renderer. Emoji runs become their first
/// shortcut, or the emoji id when there is none.
fn parse_text_message(item: &Value) -> Option<ChatItem> {
    let author = item
        .pointer("/authorName/simpleText")
        .and_then(Value::as_str)?
        .to_string();

    let mut message = String::new();
    for run in item.pointer("/message/runs").and_then(Value::as_array)? {
        if let Some(text) = run.get("text").and_then(Value::as_str) {
            message.push_str(text);
        } else if let Some(emoji) = run.get("emoji") {
            let shortcut = emoji
                .pointer("/shortcuts/0")
                .or_else(|| emoji.get("emojiId"))
                .and_then(Value::as_str);
            if let Some(shortcut) = shortcut {
                message.push_str(shortcut);
            }
        }
    }

    Some(ChatItem { author, message })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_page_tokens() {
        let html = r#"<script>var ytcfg={"INNERTUBE_API_KEY":"AIzaTest"};
            {"continuation":"not-this-one"} ... "liveChatRenderer":{"continuations":[{"reloadContinuationData":{"continuation":"0ofMyAN"}}]}</script>"#;

        let (key, continuation) = extract_page_tokens(html).unwrap();
        assert_eq!(key, "AIzaTest");
        assert_eq!(continuation, "0ofMyAN");
    }

    #[test]
    fn test_page_tokens_per_page() {
        for (key, continuation) in [("AIzaOne", "c1"), ("AIzaTwo", "c2")] {
            let html = format!(
                r#"{{"INNERTUBE_API_KEY":"{}"}} "liveChatRenderer":{{"continuation":"{}"}}"#,
                key, continuation
            );
            assert_eq!(
                extract_page_tokens(&html).unwrap(),
                (key.to_string(), continuation.to_string())
            );
        }
    }

    #[test]
    fn test_offline_page() {
        let html = r#"{"INNERTUBE_API_KEY":"AIzaTest"} {"continuation":"comments"}"#;
        assert!(matches!(
            extract_page_tokens(html),
            Err(ChatError::Resolution(_))
        ));
        assert!(extract_page_tokens("<html></html>").is_err());
    }

    #[test]
    fn test_parse_chat_response() {
        let json: Value = serde_json::from_str(
            r#"{
            "continuationContents": {"liveChatContinuation": {
                "continuations": [{"invalidationContinuationData": {"continuation": "next-token", "timeoutMs": 5000}}],
                "actions": [
                    {"addChatItemAction": {"item": {"liveChatTextMessageRenderer": {
                        "authorName": {"simpleText": "Alice"},
                        "timestampUsec": "2000",
                        "message": {"runs": [{"text": "hi "}, {"emoji": {"emojiId": "x", "shortcuts": [":wave:"]}}]}
                    }}}},
                    {"addChatItemAction": {"item": {"liveChatTextMessageRenderer": {
                        "authorName": {"simpleText": "Old"},
                        "timestampUsec": "500",
                        "message": {"runs": [{"text": "backlog"}]}
                    }}}},
                    {"addChatItemAction": {"item": {"liveChatPaidMessageRenderer": {}}}},
                    {"markChatItemAsDeletedAction": {}}
                ]
            }}
        }"#,
        )
        .unwrap();

        let page = parse_chat_response(&json, 1000);
        assert_eq!(
            page.items,
            vec![ChatItem {
                author: "Alice".to_string(),
                message: "hi :wave:".to_string()
            }]
        );
        assert_eq!(
            page.next,
            Some(("next-token".to_string(), Duration::from_secs(5)))
        );
    }

    #[test]
    fn test_timed_continuation_and_delay_cap() {
        let json: Value = serde_json::from_str(
            r#"{"continuationContents": {"liveChatContinuation": {
                "continuations": [{"timedContinuationData": {"continuation": "t", "timeoutMs": 60000}}]
            }}}"#,
        )
        .unwrap();

        let page = parse_chat_response(&json, 0);
        assert!(page.items.is_empty());
        assert_eq!(page.next, Some(("t".to_string(), MAX_POLL_DELAY)));
    }

    #[test]
    fn test_ended_chat_has_no_continuation() {
        let json: Value = serde_json::from_str(r#"{"responseContext": {}}"#).unwrap();
        let page = parse_chat_response(&json, 0);
        assert!(page.items.is_empty());
        assert!(page.next.is_none());
    }
}
