//! 연결 트랜시버
//!
//! 라이브 연결 하나를 소유하는 컴포넌트입니다. 수신 바이트에 줄 코덱을
//! 돌려 요청을 만들어 요청 큐에 넣고, 송신 연산으로 응답을 프레이밍해
//! 전송합니다. 연결 수명주기(시작/중지/해제)와 해제 알림을 담당합니다.
//!
//! # 상태 기계
//!
//! ```text
//! Created → Active → Stopping → Closed
//! ```
//!
//! - `start`: Created → Active, 읽기 루프 태스크를 생성합니다.
//! - `transmit`: Active 상태에서만 가능, 쓰기 실패 시 Stopping으로
//!   전이합니다.
//! - `stop`: 멱등. 읽기 루프를 취소하고 소켓을 닫은 뒤 해제 알림
//!   채널로 레지스트리 정리를 요청합니다.
//! - 해제(Dispose)는 Rust의 `Drop`에 대응하며, `stop` 이후에 소켓과
//!   취소 리소스가 자연히 반납됩니다.
//!
//! # 실패 의미론
//!
//! 줄 경계가 온전한 프레임의 디코딩 실패는 에러 봉투 응답으로
//! 복구되고 연결은 유지됩니다. 전송 계층 실패(읽기/쓰기 에러, 리셋,
//! 타임아웃)는 해당 연결에만 치명적이며 Stopping → Closed로 바로
//! 전이합니다.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::protocol::{encode_line, Frame, LineCodec, Message, Request};
use crate::service::request_queue::RequestQueue;
use crate::tool::{ServerError, ServerResult};

/// 트랜시버 수명주기 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TransceiverState {
    /// 생성됨 (아직 시작 전)
    Created = 0,
    /// 읽기 루프 동작 중, 송신 가능
    Active = 1,
    /// 종료 진행 중
    Stopping = 2,
    /// 종료 완료
    Closed = 3,
}

impl TransceiverState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Created,
            1 => Self::Active,
            2 => Self::Stopping,
            _ => Self::Closed,
        }
    }
}

/// 트랜시버 능력 인터페이스
///
/// 전송 계층별 구현이 공유하는 최소 계약입니다. 레지스트리와
/// 디스패처는 이 트레이트만 알고, 공유 프레이밍 로직은 상속이 아니라
/// [`LineCodec`] 합성으로 재사용합니다.
#[async_trait]
pub trait Transceiver: Send + Sync {
    /// 연결 식별자
    fn id(&self) -> Uuid;

    /// 현재 수명주기 상태
    fn state(&self) -> TransceiverState;

    /// 응답을 프레이밍해 전송합니다. Active 상태에서만 가능합니다.
    async fn transmit(&self, data: &str) -> ServerResult<()>;

    /// 연결을 종료합니다. 멱등합니다.
    async fn stop(&self);
}

/// TCP 트랜시버
///
/// 요청 큐(배압 지점), 해제 알림 채널, 서버 전역 종료 신호를
/// 주입받아 연결 하나를 구동합니다.
pub struct TcpTransceiver {
    id: Uuid,
    state: AtomicU8,
    writer: Mutex<Option<OwnedWriteHalf>>,
    queue: Arc<RequestQueue>,
    disconnect_tx: mpsc::UnboundedSender<Uuid>,
    shutdown_rx: watch::Receiver<bool>,
    cancel_tx: watch::Sender<bool>,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl TcpTransceiver {
    /// 새로운 트랜시버 생성
    ///
    /// # Arguments
    ///
    /// * `queue` - 파싱된 요청을 넣을 요청 큐
    /// * `disconnect_tx` - 해제 시 식별자를 보낼 알림 채널
    /// * `shutdown_rx` - 서버 전역 종료 신호
    /// * `read_timeout` / `write_timeout` - 연결별 타임아웃 (0 = 없음)
    pub fn new(
        queue: Arc<RequestQueue>,
        disconnect_tx: mpsc::UnboundedSender<Uuid>,
        shutdown_rx: watch::Receiver<bool>,
        read_timeout: Duration,
        write_timeout: Duration,
    ) -> Self {
        let (cancel_tx, _) = watch::channel(false);
        Self {
            id: Uuid::new_v4(),
            state: AtomicU8::new(TransceiverState::Created as u8),
            writer: Mutex::new(None),
            queue,
            disconnect_tx,
            shutdown_rx,
            cancel_tx,
            read_timeout,
            write_timeout,
        }
    }

    /// 트랜시버를 시작합니다 (Created → Active).
    ///
    /// 스트림을 읽기/쓰기로 분리해 쓰기 반쪽을 보관하고,
    /// 읽기 루프 태스크를 생성합니다.
    pub async fn start(self: &Arc<Self>, stream: TcpStream) -> ServerResult<()> {
        self.state
            .compare_exchange(
                TransceiverState::Created as u8,
                TransceiverState::Active as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .map_err(|_| ServerError::connection(self.id, "이미 시작된 트랜시버입니다".to_string()))?;

        let (read_half, write_half) = stream.into_split();
        *self.writer.lock().await = Some(write_half);

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.receive_loop(read_half).await;
        });
        Ok(())
    }

    /// 읽기 루프
    ///
    /// 바이트를 코덱 버퍼로 읽어들이고 완전한 프레임마다
    /// [`process_line`](Self::process_line)을 호출합니다. 전송 계층
    /// 에러나 취소/종료 신호가 오면 루프를 빠져나와 연결을 정리합니다.
    async fn receive_loop(self: Arc<Self>, mut reader: OwnedReadHalf) {
        let mut codec = LineCodec::new();
        let mut cancel_rx = self.cancel_tx.subscribe();
        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            let read = async {
                if self.read_timeout.is_zero() {
                    reader.read_buf(codec.buffer_mut()).await
                } else {
                    match tokio::time::timeout(
                        self.read_timeout,
                        reader.read_buf(codec.buffer_mut()),
                    )
                    .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(std::io::Error::new(
                            std::io::ErrorKind::TimedOut,
                            "읽기 타임아웃",
                        )),
                    }
                }
            };

            let n = tokio::select! {
                _ = cancel_rx.changed() => break,
                _ = shutdown_rx.changed() => break,
                result = read => match result {
                    Ok(0) => break, // 상대방이 연결을 닫음
                    Ok(n) => n,
                    Err(e) => {
                        // 프레임 경계조차 찾을 수 없는 전송 계층 실패는
                        // 해당 연결을 해체합니다.
                        warn!("클라이언트 '{}' 읽기 실패: {}", self.id, e);
                        break;
                    }
                },
            };
            debug!("클라이언트 '{}'에서 {}바이트 수신", self.id, n);

            let mut teardown = false;
            while let Some(line) = codec.next_frame() {
                if let Err(e) = self.process_line(&line).await {
                    match e {
                        ServerError::Protocol { .. } => {
                            // 줄 경계가 온전한 디코딩 실패는 에러 봉투로
                            // 응답하고 연결을 유지합니다.
                            error!("클라이언트 '{}' 요청 해석 실패: {}", self.id, e);
                            self.transmit_error(&e.to_string()).await;
                        }
                        other => {
                            error!("클라이언트 '{}' 요청 처리 실패: {}", self.id, other);
                            teardown = true;
                            break;
                        }
                    }
                }
            }
            if teardown {
                break;
            }
        }

        self.stop().await;
    }

    /// 완전한 프레임 하나를 요청으로 변환해 큐에 넣습니다.
    ///
    /// 제한 큐가 가득 차면 여기서 블로킹되어 느린 디스패처가 빠른
    /// 생산자를 스로틀링합니다 (취소 가능).
    async fn process_line(&self, line: &[u8]) -> ServerResult<()> {
        let request = match Frame::parse(line)? {
            Frame::Command { command, data } => Request {
                client_id: self.id,
                command,
                data,
            },
            Frame::Envelope(raw) => {
                if raw.trim().is_empty() {
                    return Err(ServerError::protocol("invalid request"));
                }
                let message = Message::decode(&raw, self.id)?;
                let Some(service) = message.service else {
                    return Err(ServerError::protocol("invalid request"));
                };
                Request {
                    client_id: self.id,
                    command: service.to_lowercase(),
                    data: message.data.unwrap_or_default(),
                }
            }
        };

        debug!(
            "클라이언트 '{}' 요청 수신: '{}' ({}바이트)",
            self.id,
            request.command,
            request.data.len()
        );

        let mut cancel_rx = self.cancel_tx.subscribe();
        tokio::select! {
            _ = cancel_rx.changed() => Err(ServerError::queue_closed("write")),
            result = self.queue.write(request) => result,
        }
    }

    /// 디코딩 실패를 에러 봉투로 변환해 전송합니다.
    async fn transmit_error(&self, error: &str) {
        let message = Message::fail(None, error);
        match message.encode() {
            Ok(encoded) => {
                if let Err(e) = self.transmit(&encoded).await {
                    warn!("클라이언트 '{}' 에러 응답 전송 실패: {}", self.id, e);
                }
            }
            Err(e) => warn!("에러 봉투 인코딩 실패: {}", e),
        }
    }
}

#[async_trait]
impl Transceiver for TcpTransceiver {
    fn id(&self) -> Uuid {
        self.id
    }

    fn state(&self) -> TransceiverState {
        TransceiverState::from_u8(self.state.load(Ordering::SeqCst))
    }

    async fn transmit(&self, data: &str) -> ServerResult<()> {
        if self.state() != TransceiverState::Active {
            return Err(ServerError::connection(
                self.id,
                "Active 상태가 아닌 트랜시버로 전송 시도".to_string(),
            ));
        }

        let framed = encode_line(data);
        let result = {
            let mut writer = self.writer.lock().await;
            let Some(writer) = writer.as_mut() else {
                return Err(ServerError::connection(self.id, "쓰기 핸들이 이미 닫혔습니다".to_string()));
            };

            let write = async {
                writer.write_all(framed.as_bytes()).await?;
                writer.flush().await
            };
            if self.write_timeout.is_zero() {
                write.await
            } else {
                match tokio::time::timeout(self.write_timeout, write).await {
                    Ok(result) => result,
                    Err(_) => Err(std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        "쓰기 타임아웃",
                    )),
                }
            }
        };

        match result {
            Ok(()) => Ok(()),
            Err(e) => {
                // 쓰기 실패는 해당 연결에 치명적: Stopping으로 전이
                warn!("클라이언트 '{}' 쓰기 실패: {}", self.id, e);
                self.stop().await;
                Err(ServerError::Network(e))
            }
        }
    }

    async fn stop(&self) {
        // Created/Active에서만 Stopping으로 전이, 그 외에는 멱등하게 무시
        loop {
            let current = self.state.load(Ordering::SeqCst);
            if current == TransceiverState::Stopping as u8
                || current == TransceiverState::Closed as u8
            {
                return;
            }
            if self
                .state
                .compare_exchange(
                    current,
                    TransceiverState::Stopping as u8,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                )
                .is_ok()
            {
                break;
            }
        }

        // 읽기 루프 취소
        let _ = self.cancel_tx.send(true);

        // 쓰기 반쪽을 닫아 상대방에게 종료를 알림
        {
            let mut writer = self.writer.lock().await;
            if let Some(mut write_half) = writer.take() {
                let _ = write_half.shutdown().await;
            }
        }

        self.state
            .store(TransceiverState::Closed as u8, Ordering::SeqCst);

        // 레지스트리 정리를 위한 해제 알림 (최소 1회 전달)
        if self.disconnect_tx.send(self.id).is_err() {
            debug!("해제 알림 채널이 이미 닫혔습니다: '{}'", self.id);
        }
        info!("클라이언트 '{}' 연결 종료", self.id);
    }
}
