//! file 핸들러
//!
//! 설정된 기본 디렉토리 아래에 키-값 방식의 파일 저장소를 제공합니다.
//! 요청은 봉투 형태로 들어오며, 파일 내용은 봉투 `data` 필드에
//! base64로 담깁니다. `get` 응답은 `Filename` 헤더로 파일 이름을
//! 함께 돌려줍니다.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;
use uuid::Uuid;

use crate::protocol::Message;
use crate::service::Service;
use crate::tool::ServerResult;

const SERVICE: &str = "file";

/// 파일 요청 커맨드
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCommand {
    /// 파일 내려받기
    Get,
    /// 파일 저장
    Put,
    /// 파일 삭제
    Delete,
    /// 파일 목록
    List,
}

/// 파일 요청
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRequest {
    /// 수행할 커맨드
    pub command: FileCommand,
    /// 대상 파일 이름 (list에서는 생략)
    #[serde(default)]
    pub file_name: Option<String>,
    /// put: base64로 인코딩된 파일 내용
    #[serde(default)]
    pub data: Option<String>,
}

/// file 핸들러
pub struct FileHandler {
    base_path: PathBuf,
}

impl FileHandler {
    /// 새로운 file 핸들러 생성
    ///
    /// 기본 디렉토리가 없으면 만듭니다.
    pub fn new(base_path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let base_path = base_path.into();
        std::fs::create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }

    /// 파일 이름을 기본 디렉토리 아래 경로로 해석합니다.
    ///
    /// 경로 구분자나 상위 디렉토리 참조가 들어간 이름은 거부해
    /// 기본 디렉토리 밖으로 나가지 못하게 합니다.
    fn resolve(&self, file_name: &str) -> Option<PathBuf> {
        if file_name.is_empty()
            || file_name.contains('/')
            || file_name.contains('\\')
            || file_name.contains("..")
        {
            return None;
        }
        Some(self.base_path.join(file_name))
    }

    fn named_path(&self, request: &FileRequest) -> Result<(String, PathBuf), Message> {
        let Some(file_name) = request.file_name.clone() else {
            return Err(Message::fail(Some(SERVICE), "Missing file name."));
        };
        match self.resolve(&file_name) {
            Some(path) => Ok((file_name, path)),
            None => Err(Message::fail(Some(SERVICE), "Invalid file name.")),
        }
    }

    async fn get_file(&self, request: &FileRequest) -> Message {
        let (file_name, path) = match self.named_path(request) {
            Ok(resolved) => resolved,
            Err(failure) => return failure,
        };
        if !path.exists() {
            return Message::fail(Some(SERVICE), "File not found!");
        }

        match tokio::fs::read(&path).await {
            Ok(bytes) => Message::ok(Some(SERVICE), BASE64.encode(bytes))
                .with_header("Filename", &file_name),
            Err(e) => Message::fail(Some(SERVICE), format!("Could not read file: {e}")),
        }
    }

    async fn put_file(&self, request: &FileRequest) -> Message {
        let (file_name, path) = match self.named_path(request) {
            Ok(resolved) => resolved,
            Err(failure) => return failure,
        };
        let Some(data) = request.data.as_deref() else {
            return Message::fail(Some(SERVICE), "Missing file data.");
        };
        let bytes = match BASE64.decode(data) {
            Ok(bytes) => bytes,
            Err(e) => return Message::fail(Some(SERVICE), format!("Invalid file data: {e}")),
        };

        match tokio::fs::write(&path, bytes).await {
            Ok(()) => Message::ok(Some(SERVICE), format!("File {file_name} saved.")),
            Err(e) => Message::fail(Some(SERVICE), format!("Could not write file: {e}")),
        }
    }

    async fn delete_file(&self, request: &FileRequest) -> Message {
        let (file_name, path) = match self.named_path(request) {
            Ok(resolved) => resolved,
            Err(failure) => return failure,
        };
        if !path.exists() {
            return Message::fail(Some(SERVICE), "File not found!");
        }

        match tokio::fs::remove_file(&path).await {
            Ok(()) => Message::ok(Some(SERVICE), format!("File {file_name} deleted.")),
            Err(e) => Message::fail(Some(SERVICE), format!("Could not delete file: {e}")),
        }
    }

    async fn list_files(&self) -> Message {
        let mut names = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.base_path).await {
            Ok(entries) => entries,
            Err(e) => return Message::fail(Some(SERVICE), format!("Could not list files: {e}")),
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();

        Message::ok(
            Some(SERVICE),
            format!("List of {} files:\n{}", names.len(), names.join("\n")),
        )
    }
}

#[async_trait]
impl Service for FileHandler {
    async fn invoke(&self, client_id: Uuid, data: &str) -> ServerResult<String> {
        let response = match serde_json::from_str::<FileRequest>(data) {
            Err(e) => Message::fail(Some(SERVICE), format!("Invalid file request: {e}")),
            Ok(request) => {
                debug!(
                    "클라이언트 '{}' 파일 요청: {:?} {:?}",
                    client_id, request.command, request.file_name
                );
                match request.command {
                    FileCommand::Get => self.get_file(&request).await,
                    FileCommand::Put => self.put_file(&request).await,
                    FileCommand::Delete => self.delete_file(&request).await,
                    FileCommand::List => self.list_files().await,
                }
            }
        };
        response.encode()
    }
}
