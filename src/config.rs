//! 커맨드 서버 환경 설정 모듈
//!
//! .env 파일과 환경변수에서 서버 설정을 로드하고 관리합니다.
//! 코어는 설정을 한 서버 수명 동안 불변 입력으로 취급하며,
//! 런타임에 바뀔 수 있는 값만 [`RuntimeOptions`]로 분리합니다.

use anyhow::Result;
use std::path::Path;
use std::sync::RwLock;
use tracing::{info, warn};

/// 커맨드 서버 설정 구조체
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// 서버 호스트 주소
    pub host: String,
    /// 서버 포트 번호
    pub port: u16,
    /// 연결별 읽기 타임아웃 (밀리초, 0 = 없음)
    pub read_timeout_ms: u64,
    /// 연결별 쓰기 타임아웃 (밀리초, 0 = 없음)
    pub write_timeout_ms: u64,
    /// 요청 큐 용량 (0 = 무제한, >0 = 배압 적용)
    pub queue_capacity: usize,
    /// 디스패처 워커 수
    pub worker_count: usize,
    /// ping 서비스 활성화 여부
    pub ping_enabled: bool,
    /// alias 서비스 활성화 여부
    pub alias_enabled: bool,
    /// chat 서비스 활성화 여부
    pub chat_enabled: bool,
    /// file 서비스 활성화 여부
    pub file_enabled: bool,
    /// configure 서비스 활성화 여부
    pub configure_enabled: bool,
    /// file 서비스가 사용할 기본 디렉토리
    pub file_base_path: String,
    /// ping 응답 최대 크기 (초기값, 런타임에 변경 가능)
    pub ping_max_data_size: usize,
    /// 채팅 사서함당 최대 보관 메시지 수 (초기값, 런타임에 변경 가능)
    pub chat_mailbox_cap: usize,
}

impl ServerConfig {
    /// 환경변수에서 설정을 로드합니다.
    ///
    /// 로드 순서:
    /// 1. 현재 또는 상위 디렉토리의 .env 파일
    /// 2. 시스템 환경변수
    /// 3. 기본값
    pub fn from_env() -> Result<Self> {
        Self::load_env_file();

        let config = Self {
            host: env_or("server_host", "127.0.0.1"),
            port: env_parse("server_port", 4000),
            read_timeout_ms: env_parse("read_timeout_ms", 0),
            write_timeout_ms: env_parse("write_timeout_ms", 0),
            queue_capacity: env_parse("queue_capacity", 0),
            worker_count: env_parse("worker_count", num_cpus::get()),
            ping_enabled: env_parse("ping_enabled", true),
            alias_enabled: env_parse("alias_enabled", true),
            chat_enabled: env_parse("chat_enabled", true),
            file_enabled: env_parse("file_enabled", true),
            configure_enabled: env_parse("configure_enabled", true),
            file_base_path: env_or("file_base_path", "files"),
            ping_max_data_size: env_parse("ping_max_data_size", 1024),
            chat_mailbox_cap: env_parse("chat_mailbox_cap", 256),
        };

        info!("서버 설정 로드 완료: {:?}", config);
        Ok(config)
    }

    /// 테스트용 기본 설정 (포트 0 = 임의 포트 바인딩)
    pub fn for_tests() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            read_timeout_ms: 0,
            write_timeout_ms: 0,
            queue_capacity: 0,
            worker_count: 2,
            ping_enabled: true,
            alias_enabled: true,
            chat_enabled: true,
            file_enabled: false,
            configure_enabled: true,
            file_base_path: "files".to_string(),
            ping_max_data_size: 1024,
            chat_mailbox_cap: 256,
        }
    }

    /// 서버 바인딩 주소를 반환합니다.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// .env 파일을 로드합니다.
    fn load_env_file() {
        let env_paths = vec![".env", "../.env"];

        let mut loaded = false;
        for path in env_paths {
            if Path::new(path).exists() && dotenv::from_filename(path).is_ok() {
                info!(".env 파일 로드 성공: {}", path);
                loaded = true;
                break;
            }
        }

        if !loaded {
            warn!(".env 파일을 찾을 수 없습니다. 기본값과 시스템 환경변수를 사용합니다.");
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr + Copy>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// 설정 검증 유틸리티
pub fn validate_config(config: &ServerConfig) -> Result<()> {
    if config.host.is_empty() {
        anyhow::bail!("서버 호스트 주소가 비어있습니다");
    }

    if config.worker_count == 0 {
        anyhow::bail!("워커 수는 1 이상이어야 합니다");
    }

    if config.file_enabled && config.file_base_path.is_empty() {
        anyhow::bail!("file 서비스가 활성화되었지만 기본 디렉토리가 비어있습니다");
    }

    Ok(())
}

/// 런타임에 읽고 갱신할 수 있는 설정 값
///
/// configure 서비스가 이 저장소를 통해 다른 핸들러의 동작 파라미터를
/// 서버 재시작 없이 조회/변경합니다.
#[derive(Debug)]
pub struct RuntimeOptions {
    inner: RwLock<RuntimeValues>,
}

/// 런타임 설정 값 스냅샷
#[derive(Debug, Clone)]
pub struct RuntimeValues {
    /// ping 응답 최대 크기
    pub ping_max_data_size: usize,
    /// 채팅 사서함당 최대 보관 메시지 수
    pub chat_mailbox_cap: usize,
}

impl RuntimeOptions {
    /// 초기 설정에서 런타임 옵션 저장소를 생성합니다.
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            inner: RwLock::new(RuntimeValues {
                ping_max_data_size: config.ping_max_data_size,
                chat_mailbox_cap: config.chat_mailbox_cap,
            }),
        }
    }

    /// 현재 값 스냅샷을 반환합니다.
    pub fn snapshot(&self) -> RuntimeValues {
        self.inner.read().expect("런타임 옵션 락 오염").clone()
    }

    /// 값을 갱신합니다.
    pub fn update<F: FnOnce(&mut RuntimeValues)>(&self, update_fn: F) {
        let mut values = self.inner.write().expect("런타임 옵션 락 오염");
        update_fn(&mut values);
    }
}
