//! 공통 에러 처리 시스템
//!
//! 커맨드 서버에서 발생하는 모든 에러를 체계적으로 분류합니다.
//! 클라이언트에게 전송되는 응답 문자열은 각 컴포넌트에서 별도로 만들고,
//! 이 타입은 내부 전파와 로깅에 사용됩니다.

use thiserror::Error;
use uuid::Uuid;

/// 커맨드 서버 에러 타입
///
/// 프레이밍, 큐, 서비스, 네트워크 등 서버에서 발생할 수 있는
/// 모든 에러를 체계적으로 분류합니다.
#[derive(Debug, Error)]
pub enum ServerError {
    /// 연결 관련 에러 (상태 전이 위반, 이미 종료된 연결 등)
    #[error("연결 에러 [클라이언트 {client_id}]: {message}")]
    Connection { client_id: Uuid, message: String },

    /// 프로토콜 관련 에러 (봉투 디코딩 실패, 잘못된 요청 형식)
    ///
    /// 회선 경계가 온전한 경우에만 발생하며, 연결을 끊지 않고
    /// 에러 응답으로 복구됩니다.
    #[error("프로토콜 에러: {message}")]
    Protocol { message: String },

    /// 요청 큐 관련 에러 (닫힌 큐에 쓰기/읽기 시도)
    #[error("요청 큐 에러 [작업: {operation}]: 큐가 닫혀 있습니다")]
    QueueClosed { operation: String },

    /// 서비스(핸들러) 관련 에러
    #[error("서비스 에러 [{service}]: {message}")]
    Service { service: String, message: String },

    /// 네트워크 I/O 에러 (읽기/쓰기 실패, 리셋, 타임아웃)
    ///
    /// 해당 연결에만 치명적이며 프로세스 전체에는 영향을 주지 않습니다.
    #[error("네트워크 에러: {0}")]
    Network(#[from] std::io::Error),

    /// 직렬화/역직렬화 에러
    #[error("직렬화 에러: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 설정 관련 에러
    #[error("설정 에러 [키: {key}]: {message}")]
    Configuration { key: String, message: String },
}

impl ServerError {
    /// 프로토콜 에러 생성
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// 연결 에러 생성
    pub fn connection(client_id: Uuid, message: impl Into<String>) -> Self {
        Self::Connection {
            client_id,
            message: message.into(),
        }
    }

    /// 서비스 에러 생성
    pub fn service(service: &str, message: impl Into<String>) -> Self {
        Self::Service {
            service: service.to_string(),
            message: message.into(),
        }
    }

    /// 닫힌 큐 에러 생성
    pub fn queue_closed(operation: &str) -> Self {
        Self::QueueClosed {
            operation: operation.to_string(),
        }
    }
}

/// 결과 타입 별칭
pub type ServerResult<T> = Result<T, ServerError>;
