//! chat 핸들러
//!
//! 별칭 기반 인메모리 사서함을 제공합니다. 요청은 봉투 형태로
//! 들어오며, 봉투의 `data` 필드에 JSON 채팅 요청이 담깁니다.
//!
//! # 요청 형식
//!
//! ```json
//! { "command": "send", "message": { "sender": "...", "receiver": "...",
//!   "timestamp": "...", "content": "..." } }
//! { "command": "get", "alias": "..." }
//! ```
//!
//! 응답은 항상 base64(JSON) 봉투 한 줄입니다.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt::Write as _;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::RuntimeOptions;
use crate::protocol::Message;
use crate::service::Service;
use crate::tool::ServerResult;

const SERVICE: &str = "chat";

/// 채팅 메시지
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// 보낸 사람 별칭
    pub sender: String,
    /// 받는 사람 별칭
    pub receiver: String,
    /// 보낸 시각
    pub timestamp: DateTime<Utc>,
    /// 본문
    pub content: String,
}

/// 채팅 요청 커맨드
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatCommand {
    /// 메시지 보내기
    Send,
    /// 내 사서함 비우며 읽기
    Get,
}

/// 채팅 요청
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// 수행할 커맨드
    pub command: ChatCommand,
    /// get: 읽을 사서함의 별칭
    #[serde(default)]
    pub alias: Option<String>,
    /// send: 보낼 메시지
    #[serde(default)]
    pub message: Option<ChatMessage>,
}

/// chat 핸들러
///
/// 사서함은 수신자 별칭을 키로 하는 인메모리 큐이며, 런타임 옵션의
/// 상한을 넘으면 가장 오래된 메시지부터 버립니다.
pub struct ChatHandler {
    mailboxes: DashMap<String, VecDeque<ChatMessage>>,
    options: Arc<RuntimeOptions>,
}

impl ChatHandler {
    /// 새로운 chat 핸들러 생성
    pub fn new(options: Arc<RuntimeOptions>) -> Self {
        Self {
            mailboxes: DashMap::new(),
            options,
        }
    }

    fn send(&self, request: &ChatRequest) -> Message {
        let Some(message) = request.message.clone() else {
            return Message::fail(Some(SERVICE), "Missing message in send request.");
        };
        if message.receiver.is_empty() {
            return Message::fail(Some(SERVICE), "Could not send message to user with given alias.");
        }

        // 상한 0은 무제한을 의미
        let cap = self.options.snapshot().chat_mailbox_cap;
        let receiver = message.receiver.clone();
        let mut mailbox = self.mailboxes.entry(receiver.clone()).or_default();
        if cap > 0 {
            while mailbox.len() >= cap {
                mailbox.pop_front();
            }
        }
        mailbox.push_back(message);

        Message::ok(Some(SERVICE), format!("Message sent to {receiver}"))
    }

    fn get(&self, request: &ChatRequest) -> Message {
        let Some(alias) = request.alias.as_deref() else {
            return Message::fail(Some(SERVICE), "Missing alias in get request.");
        };
        let Some(mut mailbox) = self.mailboxes.get_mut(alias) else {
            return Message::fail(Some(SERVICE), "Could not receive messages.");
        };

        let mut body = format!("Received {} messages:\n", mailbox.len());
        while let Some(message) = mailbox.pop_front() {
            let _ = writeln!(
                body,
                "{} ({}): {}",
                message.timestamp.format("%H:%M"),
                message.sender,
                message.content
            );
        }

        Message::ok(Some(SERVICE), body)
    }
}

#[async_trait]
impl Service for ChatHandler {
    async fn invoke(&self, _client_id: Uuid, data: &str) -> ServerResult<String> {
        let response = match serde_json::from_str::<ChatRequest>(data) {
            Err(e) => Message::fail(Some(SERVICE), format!("Invalid chat request: {e}")),
            Ok(request) => match request.command {
                ChatCommand::Send => self.send(&request),
                ChatCommand::Get => self.get(&request),
            },
        };
        response.encode()
    }
}
