//! TCP 리스너 서비스
//!
//! 새 전송 연결을 수락해 연결마다 트랜시버를 만들고 레지스트리에
//! 등록합니다. 수락 루프는 자체 태스크에서 돌며, 수락 에러는 해당
//! 리스너에 치명적입니다: 로깅 후 루프를 종료하고 자동 재시작하지
//! 않습니다 (이미 연결된 클라이언트는 계속 서비스됩니다).

use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::service::client_service::{Client, ClientService};
use crate::service::request_queue::RequestQueue;
use crate::service::transceiver::TcpTransceiver;

/// TCP 리스너 서비스
pub struct ListenerService {
    client_service: Arc<ClientService>,
    queue: Arc<RequestQueue>,
    disconnect_tx: mpsc::UnboundedSender<Uuid>,
    shutdown_rx: watch::Receiver<bool>,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl ListenerService {
    /// 새로운 리스너 서비스 생성
    pub fn new(
        config: &ServerConfig,
        client_service: Arc<ClientService>,
        queue: Arc<RequestQueue>,
        disconnect_tx: mpsc::UnboundedSender<Uuid>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            client_service,
            queue,
            disconnect_tx,
            shutdown_rx,
            read_timeout: Duration::from_millis(config.read_timeout_ms),
            write_timeout: Duration::from_millis(config.write_timeout_ms),
        }
    }

    /// 수락 루프를 실행합니다.
    ///
    /// 종료 신호가 오면 정상 종료하고, 수락 에러가 발생하면 루프를
    /// 종료합니다 (리스너 소켓 실패로 간주).
    pub async fn run(mut self, listener: TcpListener) {
        loop {
            let accepted = tokio::select! {
                _ = self.shutdown_rx.changed() => {
                    info!("종료 신호 수신, 리스너를 중지합니다");
                    return;
                }
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, addr)) => {
                    self.handle_connection(stream, addr.to_string()).await;
                }
                Err(e) => {
                    // 리스너 소켓 실패: 새 연결 수락은 중단되지만
                    // 기존 연결과 프로세스는 계속 동작합니다.
                    error!("연결 수락 실패, 리스너를 종료합니다: {}", e);
                    return;
                }
            }
        }
    }

    async fn handle_connection(&self, stream: tokio::net::TcpStream, addr: String) {
        let transceiver = Arc::new(TcpTransceiver::new(
            self.queue.clone(),
            self.disconnect_tx.clone(),
            self.shutdown_rx.clone(),
            self.read_timeout,
            self.write_timeout,
        ));

        use crate::service::transceiver::Transceiver as _;
        let id = transceiver.id();

        // 읽기 루프를 띄우기 전에 등록해야 즉시 끊긴 연결의 해제
        // 알림이 항상 등록된 항목을 제거합니다.
        let client = Client::new(id, transceiver.clone());
        if !self.client_service.add(client) {
            // 식별자는 재사용되지 않으므로 실제로는 도달하지 않음
            warn!("클라이언트 '{}' 등록 실패 (중복 식별자)", id);
            transceiver.stop().await;
            return;
        }

        if let Err(e) = transceiver.start(stream).await {
            error!("트랜시버 시작 실패 ({}): {}", addr, e);
            self.client_service.remove(id);
            return;
        }

        info!("새 클라이언트 '{}' 연결 ({}, TCP)", id, addr);
        info!("현재 연결 수: {}", self.client_service.client_count());
    }
}
