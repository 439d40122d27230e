//! 커맨드 서버 공통 유틸리티 모듈
//!
//! 에러 타입 등 컴포넌트 전반에서 쓰이는 공통 기능을 제공합니다.

pub mod error;

pub use error::{ServerError, ServerResult};
