//! 커맨드 서버 핸들러 레이어
//!
//! 각 커맨드의 비즈니스 로직을 담당하는 핸들러들을 정의합니다.
//! 모든 핸들러는 [`Service`](crate::service::Service) 능력
//! 인터페이스를 구현하며, 시작 시 명시적 등록 목록으로 서비스
//! 레지스트리에 조립됩니다.
//!
//! # 핸들러 구조
//!
//! ```text
//! Handler Layer
//! ├── PingHandler (연결 확인, 무작위 페이로드)
//! ├── AliasHandler (별칭 배정)
//! ├── ChatHandler (별칭 사서함)
//! ├── FileHandler (파일 저장소)
//! └── ConfigureHandler (런타임 설정 조회/변경)
//! ```

pub mod alias_handler;
pub mod chat_handler;
pub mod configure_handler;
pub mod file_handler;
pub mod ping_handler;

pub use alias_handler::AliasHandler;
pub use chat_handler::ChatHandler;
pub use configure_handler::ConfigureHandler;
pub use file_handler::FileHandler;
pub use ping_handler::PingHandler;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::config::{RuntimeOptions, ServerConfig};
use crate::service::{ClientService, ServiceRegistry};

/// 설정의 활성화 플래그에 따라 서비스 레지스트리를 조립합니다.
///
/// 리플렉션 스캐닝 대신 명시적 등록 목록을 사용해 시작 시점에
/// 사용할 수 있는 커맨드가 결정됩니다.
pub fn build_registry(
    config: &ServerConfig,
    client_service: Arc<ClientService>,
    options: Arc<RuntimeOptions>,
) -> Result<ServiceRegistry> {
    let mut registry = ServiceRegistry::new();

    if config.ping_enabled {
        registry.register("ping", Arc::new(PingHandler::new(options.clone())));
    }
    if config.alias_enabled {
        registry.register("alias", Arc::new(AliasHandler::new(client_service)));
    }
    if config.chat_enabled {
        registry.register("chat", Arc::new(ChatHandler::new(options.clone())));
    }
    if config.file_enabled {
        let handler = FileHandler::new(config.file_base_path.clone())
            .context("file 서비스 기본 디렉토리 생성 실패")?;
        registry.register("file", Arc::new(handler));
    }
    if config.configure_enabled {
        registry.register("configure", Arc::new(ConfigureHandler::new(options)));
    }

    let mut commands = registry.commands();
    commands.sort();
    info!("사용 가능한 서비스: {}", commands.join(", "));
    Ok(registry)
}
