//! Live chat ingestion
//!
//! Polls the YouTube live chat API and turns recognized messages into
//! scene commands. The poller stays parked until the control surface
//! hands over a chat id, and survives API hiccups with an error budget
//! instead of dying.

use crate::assets::{CHAT_POLL_FLOOR_SECS, MAX_CHAT_FAIL};
use crate::events::Command;
use log::{info, warn};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const CHAT_ENDPOINT: &str = "https://www.googleapis.com/youtube/v3/liveChat/messages";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatMessageList {
    polling_interval_millis: Option<u64>,
    #[serde(default)]
    items: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatMessage {
    snippet: ChatSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatSnippet {
    text_message_details: Option<TextMessageDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TextMessageDetails {
    message_text: String,
}

enum Wait {
    Continue,
    Shutdown,
}

pub struct ChatPoller {
    client: reqwest::Client,
    api_key: String,
    chat_ids: mpsc::Receiver<String>,
    commands: mpsc::Sender<Command>,
    cancel: CancellationToken,
}

impl ChatPoller {
    pub fn new(
        api_key: String,
        chat_ids: mpsc::Receiver<String>,
        commands: mpsc::Sender<Command>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            chat_ids,
            commands,
            cancel,
        }
    }

    pub async fn run(mut self) {
        let mut chat_id = tokio::select! {
            _ = self.cancel.cancelled() => return,
            id = self.chat_ids.recv() => match id {
                Some(id) => id,
                None => return,
            },
        };
        info!("ChatPoller: received chat id {chat_id}");

        let mut error_count: u32 = 0;
        loop {
            if error_count > MAX_CHAT_FAIL {
                warn!("ChatPoller: too many errors, pausing for a minute");
                error_count = 0;
                if let Wait::Shutdown = self.wait(&mut chat_id, Duration::from_secs(60)).await {
                    return;
                }
            }

            let wait = match self.poll(&chat_id).await {
                Ok(page) => {
                    error_count = 0;
                    self.dispatch(&page);
                    page.polling_interval_millis
                        .map(Duration::from_millis)
                        .unwrap_or_default()
                        .max(Duration::from_secs(CHAT_POLL_FLOOR_SECS))
                }
                Err(e) => {
                    error_count += 1;
                    warn!("ChatPoller: poll failed ({error_count} in a row): {e}");
                    Duration::from_secs(10)
                }
            };

            if let Wait::Shutdown = self.wait(&mut chat_id, wait).await {
                return;
            }
        }
    }

    async fn poll(&self, chat_id: &str) -> anyhow::Result<ChatMessageList> {
        let response = self
            .client
            .get(CHAT_ENDPOINT)
            .query(&[
                ("liveChatId", chat_id),
                ("part", "snippet,authorDetails"),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    fn dispatch(&self, page: &ChatMessageList) {
        for message in &page.items {
            let Some(details) = &message.snippet.text_message_details else {
                continue;
            };
            if details.message_text.trim().eq_ignore_ascii_case("bang") {
                // non-blocking: a full command queue drops the bang
                let _ = self.commands.try_send(Command::Bang);
            }
        }
    }

    /// Sleep between polls, waking early for shutdown or a new chat id.
    async fn wait(&mut self, chat_id: &mut String, duration: Duration) -> Wait {
        tokio::select! {
            _ = self.cancel.cancelled() => Wait::Shutdown,
            id = self.chat_ids.recv() => match id {
                Some(id) => {
                    info!("ChatPoller: switching to chat id {id}");
                    *chat_id = id;
                    Wait::Continue
                }
                None => Wait::Shutdown,
            },
            _ = tokio::time::sleep(duration) => Wait::Continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_chat_page_shape() {
        let raw = r#"{
            "pollingIntervalMillis": 5000,
            "items": [
                {"snippet": {"textMessageDetails": {"messageText": "BANG"}}},
                {"snippet": {}},
                {"snippet": {"textMessageDetails": {"messageText": "hello"}}}
            ]
        }"#;

        let page: ChatMessageList = serde_json::from_str(raw).unwrap();
        assert_eq!(page.polling_interval_millis, Some(5000));
        assert_eq!(page.items.len(), 3);
        assert!(page.items[1].snippet.text_message_details.is_none());
    }

    #[tokio::test]
    async fn dispatch_maps_bangs_onto_the_command_queue() {
        let (tx, mut rx) = mpsc::channel(4);
        let (_id_tx, id_rx) = mpsc::channel(1);
        let poller = ChatPoller::new("key".into(), id_rx, tx, CancellationToken::new());

        let page: ChatMessageList = serde_json::from_str(
            r#"{
                "items": [
                    {"snippet": {"textMessageDetails": {"messageText": " bang "}}},
                    {"snippet": {"textMessageDetails": {"messageText": "not a bang"}}}
                ]
            }"#,
        )
        .unwrap();
        poller.dispatch(&page);

        assert_eq!(rx.try_recv().unwrap(), Command::Bang);
        assert!(rx.try_recv().is_err());
    }
}
