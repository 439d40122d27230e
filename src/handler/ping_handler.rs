//! ping 핸들러
//!
//! `ping <크기>` 요청에 대해 요청한 길이의 무작위 영숫자 문자열을
//! 돌려줍니다. 연결 상태와 왕복 처리량을 확인하는 용도입니다.

use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::RuntimeOptions;
use crate::service::Service;
use crate::tool::ServerResult;

/// ping 핸들러
pub struct PingHandler {
    options: Arc<RuntimeOptions>,
}

impl PingHandler {
    /// 새로운 ping 핸들러 생성
    pub fn new(options: Arc<RuntimeOptions>) -> Self {
        Self { options }
    }
}

#[async_trait]
impl Service for PingHandler {
    async fn invoke(&self, _client_id: Uuid, data: &str) -> ServerResult<String> {
        let max = self.options.snapshot().ping_max_data_size;

        let argument = data.split(' ').next().unwrap_or_default();
        let Ok(length) = argument.parse::<usize>() else {
            return Ok("Invalid argument or value.".to_string());
        };
        if length > max {
            return Ok("Invalid argument or value.".to_string());
        }

        let mut rng = rand::thread_rng();
        let payload: String = (0..length)
            .map(|_| rng.sample(Alphanumeric) as char)
            .collect();
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;

    fn handler() -> PingHandler {
        PingHandler::new(Arc::new(RuntimeOptions::new(&ServerConfig::for_tests())))
    }

    /// 요청한 길이의 영숫자 응답을 돌려줘야 함
    #[tokio::test]
    async fn test_ping_returns_requested_length() {
        let handler = handler();
        let response = handler.invoke(Uuid::new_v4(), "5").await.unwrap();
        assert_eq!(response.len(), 5);
        assert!(response.chars().all(|c| c.is_ascii_alphanumeric()));

        let response = handler.invoke(Uuid::new_v4(), "0").await.unwrap();
        assert!(response.is_empty());
    }

    /// 잘못된 인자는 에러 문구로 응답해야 함
    #[tokio::test]
    async fn test_ping_invalid_argument() {
        let handler = handler();
        for argument in ["abc", "-1", "", "9999999"] {
            let response = handler.invoke(Uuid::new_v4(), argument).await.unwrap();
            assert_eq!(response, "Invalid argument or value.");
        }
    }

    /// 런타임 옵션의 최대 크기를 따라야 함
    #[tokio::test]
    async fn test_ping_respects_runtime_max() {
        let options = Arc::new(RuntimeOptions::new(&ServerConfig::for_tests()));
        let handler = PingHandler::new(options.clone());

        options.update(|v| v.ping_max_data_size = 3);
        let response = handler.invoke(Uuid::new_v4(), "4").await.unwrap();
        assert_eq!(response, "Invalid argument or value.");
        let response = handler.invoke(Uuid::new_v4(), "3").await.unwrap();
        assert_eq!(response.len(), 3);
    }
}
