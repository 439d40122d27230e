//! alias 핸들러
//!
//! `alias <이름>` 요청으로 연결에 사람이 읽을 수 있는 별칭을
//! 배정합니다. 별칭은 프로세스 범위에서 유일하며, 채팅 사서함의
//! 수신자 키로 사용됩니다.

use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::service::{ClientService, Service};
use crate::tool::ServerResult;

/// alias 핸들러
pub struct AliasHandler {
    client_service: Arc<ClientService>,
}

impl AliasHandler {
    /// 새로운 alias 핸들러 생성
    pub fn new(client_service: Arc<ClientService>) -> Self {
        Self { client_service }
    }
}

#[async_trait]
impl Service for AliasHandler {
    async fn invoke(&self, client_id: Uuid, data: &str) -> ServerResult<String> {
        let alias = data.trim();
        if alias.is_empty() || alias.contains(char::is_whitespace) {
            return Ok("Invalid alias. An alias must be a single non-empty word.".to_string());
        }

        // 확인-후-설정이 아니라 원자적 선점으로 중복 배정 경쟁을 닫습니다.
        if !self.client_service.try_claim_alias(client_id, alias) {
            return Ok(format!("Alias '{alias}' is already in use."));
        }

        Ok(format!("Alias set to '{alias}'."))
    }
}
