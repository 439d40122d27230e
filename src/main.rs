//! 커맨드 서버 메인 진입점
//!
//! 환경 설정은 .env 파일 또는 시스템 환경변수에서 로드됩니다.
//!
//! 환경변수:
//! - server_host: 서버 호스트 (기본값: "127.0.0.1")
//! - server_port: 서버 포트 (기본값: "4000")
//! - queue_capacity: 요청 큐 용량, 0 = 무제한 (기본값: "0")
//! - worker_count: 디스패처 워커 수 (기본값: CPU 수)
//! - read_timeout_ms / write_timeout_ms: 연결별 타임아웃 (기본값: 0)
//! - ping_enabled / alias_enabled / chat_enabled / file_enabled /
//!   configure_enabled: 핸들러 활성화 플래그 (기본값: true)

use anyhow::Result;
use cmdserver::config::{validate_config, ServerConfig};
use cmdserver::server::Server;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // 로깅 설정
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // 환경 설정 로드 및 검증
    let config = ServerConfig::from_env()?;
    validate_config(&config)?;

    info!("=== 커맨드 서버 설정 ===");
    info!("바인딩 주소: {}", config.bind_address());
    info!("워커 수: {}", config.worker_count);
    info!("큐 용량: {} (0 = 무제한)", config.queue_capacity);
    info!("========================");

    // 서버 시작
    let mut server = Server::new(config)?;
    server.start().await?;

    // 종료 시그널 대기
    tokio::signal::ctrl_c().await?;
    info!("종료 시그널 수신, 서버를 중지합니다...");

    server.stop().await?;
    Ok(())
}
