//! configure 핸들러
//!
//! 서버 재시작 없이 런타임 옵션을 조회/변경합니다.
//!
//! # 요청 형식
//!
//! ```text
//! configure get <섹션>
//! configure update <섹션> <키> <값>
//! ```
//!
//! 섹션은 `ping`, `chat`이며, 코어 설정(포트, 워커 수 등)은 한 서버
//! 수명 동안 불변이므로 이 핸들러의 대상이 아닙니다.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::config::RuntimeOptions;
use crate::service::Service;
use crate::tool::ServerResult;

/// configure 핸들러
pub struct ConfigureHandler {
    options: Arc<RuntimeOptions>,
}

impl ConfigureHandler {
    /// 새로운 configure 핸들러 생성
    pub fn new(options: Arc<RuntimeOptions>) -> Self {
        Self { options }
    }

    fn get(&self, section: &str) -> String {
        let values = self.options.snapshot();
        match section {
            "ping" => format!("ping max_data_size={}", values.ping_max_data_size),
            "chat" => format!("chat mailbox_cap={}", values.chat_mailbox_cap),
            other => format!("Unknown section '{other}' for Configure service."),
        }
    }

    fn update(&self, client_id: Uuid, section: &str, key: &str, value: &str) -> String {
        let Ok(parsed) = value.parse::<usize>() else {
            return format!("Invalid value '{value}' for key '{key}'.");
        };

        let updated = match (section, key) {
            ("ping", "max_data_size") => {
                self.options.update(|v| v.ping_max_data_size = parsed);
                true
            }
            ("chat", "mailbox_cap") => {
                self.options.update(|v| v.chat_mailbox_cap = parsed);
                true
            }
            _ => false,
        };

        if updated {
            info!(
                "클라이언트 '{}'가 설정을 변경: {}.{} = {}",
                client_id, section, key, parsed
            );
            format!("Updated {section} {key}={parsed}")
        } else {
            format!("Unknown key '{key}' in section '{section}'.")
        }
    }
}

#[async_trait]
impl Service for ConfigureHandler {
    async fn invoke(&self, client_id: Uuid, data: &str) -> ServerResult<String> {
        let mut parts = data.split_whitespace();
        let response = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some("get"), Some(section), None, _) => self.get(section),
            (Some("update"), Some(section), Some(key), Some(value)) => {
                self.update(client_id, section, key, value)
            }
            _ => "Unknown command for Configure service.".to_string(),
        };
        Ok(format!("configure {response}"))
    }
}
