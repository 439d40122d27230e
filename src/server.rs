//! 커맨드 서버 조립
//!
//! 레지스트리, 요청 큐, 디스패처, 리스너를 묶어 하나의 서버로
//! 만듭니다. 외부 부트스트랩(main)은 `start()` / `stop()` 수명주기
//! 연산만 사용합니다.
//!
//! # 종료 순서
//!
//! 하나의 종료 신호가 올라가면:
//! 1. 리스너가 새 연결 수락을 멈춥니다.
//! 2. 각 트랜시버의 읽기 루프가 다음 확인 시점에 빠져나와 전송을
//!    닫습니다.
//! 3. 요청 큐가 drain-and-reset으로 남은 항목을 폐기합니다.
//! 4. 각 디스패처 워커가 현재 항목까지 처리하고 종료합니다.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{RuntimeOptions, ServerConfig};
use crate::handler::build_registry;
use crate::service::{
    ClientService, DispatcherService, ListenerService, RequestQueue, ServiceRegistry,
};

/// 커맨드 서버
pub struct Server {
    config: ServerConfig,
    client_service: Arc<ClientService>,
    queue: Arc<RequestQueue>,
    registry: Arc<ServiceRegistry>,
    shutdown_tx: watch::Sender<bool>,
    disconnect_tx: mpsc::UnboundedSender<Uuid>,
    disconnect_rx: Option<mpsc::UnboundedReceiver<Uuid>>,
    tasks: Vec<JoinHandle<()>>,
    worker_tasks: Vec<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl Server {
    /// 설정에서 서버를 조립합니다.
    pub fn new(config: ServerConfig) -> Result<Self> {
        let client_service = Arc::new(ClientService::new());
        let queue = Arc::new(RequestQueue::new(config.queue_capacity));
        let options = Arc::new(RuntimeOptions::new(&config));
        let registry = Arc::new(build_registry(
            &config,
            client_service.clone(),
            options,
        )?);
        let (shutdown_tx, _) = watch::channel(false);
        let (disconnect_tx, disconnect_rx) = mpsc::unbounded_channel();

        Ok(Self {
            config,
            client_service,
            queue,
            registry,
            shutdown_tx,
            disconnect_tx,
            disconnect_rx: Some(disconnect_rx),
            tasks: Vec::new(),
            worker_tasks: Vec::new(),
            local_addr: None,
        })
    }

    /// 레지스트리 핸들 (테스트와 운영 조회용)
    pub fn client_service(&self) -> Arc<ClientService> {
        self.client_service.clone()
    }

    /// 바인딩된 주소. `start` 이후에만 값이 있습니다.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// 서버를 시작합니다.
    ///
    /// 리스너를 바인딩하고 수락 루프, 해제 알림 처리, 워커 풀
    /// 태스크를 생성합니다. 바인딩된 주소를 반환합니다.
    pub async fn start(&mut self) -> Result<SocketAddr> {
        info!("서버 시작 중... ({})", self.config.bind_address());

        let listener = TcpListener::bind(self.config.bind_address())
            .await
            .context("리스너 바인드 실패")?;
        let addr = listener.local_addr().context("바인딩 주소 조회 실패")?;
        self.local_addr = Some(addr);

        // 해제 알림 처리: 트랜시버 → 레지스트리 정리
        let disconnect_rx = self
            .disconnect_rx
            .take()
            .context("서버가 이미 시작되었습니다")?;
        self.tasks.push(tokio::spawn(Self::disconnect_loop(
            disconnect_rx,
            self.client_service.clone(),
        )));

        // 수락 루프
        let listener_service = ListenerService::new(
            &self.config,
            self.client_service.clone(),
            self.queue.clone(),
            self.disconnect_tx.clone(),
            self.shutdown_tx.subscribe(),
        );
        self.tasks.push(tokio::spawn(listener_service.run(listener)));

        // 디스패처 워커 풀
        let dispatcher = Arc::new(DispatcherService::new(
            self.queue.clone(),
            self.client_service.clone(),
            self.registry.clone(),
            self.shutdown_tx.subscribe(),
        ));
        self.worker_tasks
            .extend(dispatcher.spawn_workers(self.config.worker_count));

        info!(
            "서버가 {}에서 실행 중입니다 (워커 {}개, 큐 용량 {})",
            addr, self.config.worker_count, self.config.queue_capacity
        );
        Ok(addr)
    }

    async fn disconnect_loop(
        mut disconnect_rx: mpsc::UnboundedReceiver<Uuid>,
        client_service: Arc<ClientService>,
    ) {
        while let Some(id) = disconnect_rx.recv().await {
            if client_service.remove(id) {
                info!("클라이언트 '{}' 해제 완료", id);
                info!("현재 연결 수: {}", client_service.client_count());
            } else {
                // clear_all 경로와 겹치면 이미 제거되어 있을 수 있음
                debug!("클라이언트 '{}'는 이미 제거되었습니다", id);
            }
        }
    }

    /// 서버를 중지합니다.
    pub async fn stop(&mut self) -> Result<()> {
        info!("서버 중지 중...");

        // 종료 신호: 리스너, 읽기 루프, 워커가 빠져나옵니다.
        let _ = self.shutdown_tx.send(true);

        // 큐에 남은 요청 폐기
        self.queue.drain_and_reset().await;

        // 워커는 현재 항목까지 처리한 뒤 스스로 종료하므로
        // 중단하지 않고 합류를 기다립니다.
        for worker in self.worker_tasks.drain(..) {
            let _ = worker.await;
        }

        // 연결된 클라이언트 일괄 해체
        self.client_service.clear_all().await;

        for task in self.tasks.drain(..) {
            task.abort();
        }

        info!("서버가 중지되었습니다");
        Ok(())
    }
}
