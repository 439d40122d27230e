//! 회선 프로토콜 정의
//!
//! 클라이언트와 서버 간 통신을 위한 줄 단위 프로토콜을 정의합니다.
//! 하나의 프레임은 `\n`으로 끝나는 한 줄이며, 두 가지 요청 형태를 지원합니다.
//!
//! # 프로토콜 구조
//!
//! **커맨드 형태 (공백 포함 줄):**
//! ```text
//! <커맨드 토큰><공백><페이로드>\n
//! ```
//! 첫 번째 공백에서 분리되며, 커맨드 토큰은 소문자로 정규화됩니다.
//!
//! **봉투 형태 (공백 없는 줄):**
//! ```text
//! base64(JSON { service, succeeded, error, headers, data })\n
//! ```
//! 채팅, 파일 전송처럼 구조화된 요청/응답에 사용하며, 바이너리 데이터는
//! 봉투의 `data` 필드에 base64로 담습니다.
//!
//! # 사용 예시
//!
//! ```rust
//! use cmdserver::protocol::{LineCodec, Frame};
//!
//! let mut codec = LineCodec::new();
//! codec.extend(b"ping 5\n");
//! let line = codec.next_frame().unwrap();
//! match Frame::parse(&line).unwrap() {
//!     Frame::Command { command, data } => {
//!         assert_eq!(command, "ping");
//!         assert_eq!(data, "5");
//!     }
//!     _ => unreachable!(),
//! }
//! ```

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::{Buf, BytesMut};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::tool::{ServerError, ServerResult};

/// 파싱된 요청
///
/// 연결 식별자, 커맨드 토큰, 데이터 페이로드로 구성됩니다.
/// 트랜시버 객체에 대한 참조를 가지지 않으며, 응답 전송 시에는
/// 식별자 기반으로 레지스트리를 조회합니다. 연결이 끊긴 뒤에도
/// 안전하게 폐기할 수 있습니다.
#[derive(Debug, Clone)]
pub struct Request {
    /// 요청을 보낸 연결의 식별자
    pub client_id: Uuid,
    /// 커맨드 토큰 (소문자 정규화됨)
    pub command: String,
    /// 데이터 페이로드 (추가 인코딩된 바이너리일 수 있음)
    pub data: String,
}

/// 응답 봉투 (Message)
///
/// 구조화된 요청/응답에 사용되는 봉투입니다. 회선에서는 JSON을
/// base64로 인코딩한 한 줄로 표현됩니다.
///
/// # 불변식
///
/// `succeeded == true`이면 `data`가 의미를 가지고,
/// `succeeded == false`이면 `error`가 비어 있지 않습니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// 연결 식별자 (회선에는 실리지 않고 수신 시 채워집니다)
    #[serde(skip)]
    pub client_id: Uuid,
    /// 논리 서비스 태그 (예: "chat", "file")
    #[serde(default)]
    pub service: Option<String>,
    /// 성공 여부
    #[serde(default)]
    pub succeeded: bool,
    /// 실패 시 에러 설명
    #[serde(default)]
    pub error: Option<String>,
    /// 부가 헤더 (예: 바이너리 페이로드 옆의 파일 이름)
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
    /// 데이터 페이로드 (바이너리는 base64 문자열로)
    #[serde(default)]
    pub data: Option<String>,
}

impl Message {
    /// 성공 봉투 생성
    pub fn ok(service: Option<&str>, data: impl Into<String>) -> Self {
        Self {
            client_id: Uuid::nil(),
            service: service.map(str::to_string),
            succeeded: true,
            error: None,
            headers: None,
            data: Some(data.into()),
        }
    }

    /// 실패 봉투 생성
    pub fn fail(service: Option<&str>, error: impl Into<String>) -> Self {
        Self {
            client_id: Uuid::nil(),
            service: service.map(str::to_string),
            succeeded: false,
            error: Some(error.into()),
            headers: None,
            data: None,
        }
    }

    /// 헤더를 추가합니다.
    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.headers
            .get_or_insert_with(HashMap::new)
            .insert(key.to_string(), value.to_string());
        self
    }

    /// 봉투를 회선 표현(base64(JSON))으로 인코딩합니다.
    pub fn encode(&self) -> ServerResult<String> {
        let json = serde_json::to_string(self)?;
        Ok(BASE64.encode(json.as_bytes()))
    }

    /// 회선 표현(base64(JSON))에서 봉투를 디코딩합니다.
    ///
    /// 디코딩에 실패해도 예외를 연결 경계 밖으로 전파하지 않고
    /// 프로토콜 에러로 변환합니다.
    pub fn decode(line: &str, client_id: Uuid) -> ServerResult<Self> {
        let bytes = BASE64
            .decode(line.trim_end())
            .map_err(|e| ServerError::protocol(format!("base64 디코딩 실패: {e}")))?;
        let json = std::str::from_utf8(&bytes)
            .map_err(|e| ServerError::protocol(format!("UTF-8 디코딩 실패: {e}")))?;
        let mut message: Message = serde_json::from_str(json)
            .map_err(|e| ServerError::protocol(format!("봉투 역직렬화 실패: {e}")))?;
        message.client_id = client_id;
        Ok(message)
    }
}

/// 한 프레임의 해석 결과
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// 커맨드 형태: 첫 번째 공백에서 분리된 (커맨드, 페이로드)
    Command { command: String, data: String },
    /// 봉투 형태: 내부 공백이 없는 줄 (base64(JSON) 원문)
    Envelope(String),
}

impl Frame {
    /// 한 줄을 프레임으로 해석합니다.
    ///
    /// 내부 공백이 있으면 첫 번째 공백에서 (커맨드, 페이로드)로 분리하고
    /// 커맨드를 소문자로 정규화합니다. 공백이 없으면 봉투 형태로
    /// 간주합니다. 빈 줄은 빈 봉투가 되어 이후 디코딩 단계에서
    /// "invalid request" 에러 응답으로 처리됩니다.
    ///
    /// UTF-8이 아닌 입력은 줄 경계가 온전하므로 프로토콜 에러로
    /// 변환되어 에러 봉투 응답을 받고, 연결은 유지됩니다.
    pub fn parse(line: &[u8]) -> ServerResult<Frame> {
        let text = std::str::from_utf8(line)
            .map_err(|e| ServerError::protocol(format!("UTF-8 디코딩 실패: {e}")))?;
        Ok(match text.find(' ') {
            Some(pos) => Frame::Command {
                command: text[..pos].to_lowercase(),
                data: text[pos + 1..].to_string(),
            },
            None => Frame::Envelope(text.to_string()),
        })
    }
}

/// 줄 단위 코덱
///
/// 누적 버퍼에서 `\n`으로 끝나는 완전한 프레임을 잘라냅니다.
/// 구분자가 아직 없는 부분 프레임은 버퍼에 남겨 다음 입력을 기다립니다.
#[derive(Debug, Default)]
pub struct LineCodec {
    buffer: BytesMut,
}

impl LineCodec {
    /// 새로운 코덱 생성
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
        }
    }

    /// 수신한 바이트를 버퍼에 누적합니다.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// 읽기 루프에서 직접 채울 수 있는 내부 버퍼
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buffer
    }

    /// 완전한 프레임 하나를 잘라냅니다.
    ///
    /// `\n` 구분자까지의 바이트를 (구분자 제외) 반환하고 버퍼에서
    /// 소비합니다. 완전한 프레임이 없으면 `None`을 반환하며, 남은
    /// 바이트는 다음 호출까지 유지됩니다.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        let pos = self.buffer.iter().position(|&b| b == b'\n')?;
        let line = self.buffer[..pos].to_vec();
        self.buffer.advance(pos + 1);
        Some(line)
    }
}

/// 전송할 문자열에 프레임 구분자를 붙입니다.
///
/// 이미 `\n`으로 끝나면 그대로 두어 응답 줄이 항상 정확히 하나의
/// `\n`으로 끝나도록 합니다.
pub fn encode_line(data: &str) -> String {
    if data.ends_with('\n') {
        data.to_string()
    } else {
        format!("{data}\n")
    }
}
