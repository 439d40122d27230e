//! 디스패처 / 워커 풀
//!
//! 고정 개수의 워커가 요청 큐를 나눠 소비합니다. 각 워커는 요청의
//! 커맨드를 서비스 레지스트리에서 해석해 핸들러를 호출하고, 결과를
//! 원래 연결로 돌려보냅니다.
//!
//! # 순서 보장
//!
//! 서로 다른 연결의 요청 간에는 순서가 보장되지 않습니다. 한 연결의
//! 요청은 큐에 넣은 순서대로 꺼내지지만, 여러 워커가 한 큐를
//! 소비하므로 느린 핸들러가 이후 요청의 처리를 막지 않습니다.
//!
//! # 실패 의미론
//!
//! 커맨드 미등록과 핸들러 실패는 모두 이 경계에서 흡수되어 텍스트
//! 에러 응답으로 변환됩니다. 처리 중 클라이언트가 끊긴 경우 응답은
//! 로깅 후 폐기되며, 재전송하지 않습니다.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::protocol::Request;
use crate::service::client_service::ClientService;
use crate::service::request_queue::RequestQueue;
use crate::tool::ServerResult;

/// 핸들러 능력 인터페이스
///
/// 각 커맨드의 비즈니스 로직을 구현하는 외부 단위가 만족해야 하는
/// 계약입니다. 내부 실패는 `Err`로 반환하면 디스패처가 텍스트 에러
/// 응답으로 변환합니다. 이 경계 밖으로 패닉을 전파해서는 안 됩니다.
#[async_trait]
pub trait Service: Send + Sync {
    /// 요청을 처리해 응답 문자열을 만듭니다.
    ///
    /// # Arguments
    ///
    /// * `client_id` - 호출자의 연결 식별자
    /// * `data` - 요청 페이로드 (추가 인코딩된 바이너리일 수 있음)
    async fn invoke(&self, client_id: Uuid, data: &str) -> ServerResult<String>;
}

/// 서비스 레지스트리
///
/// 커맨드 토큰 → 핸들러의 불변 매핑입니다. 시작 시 명시적 등록
/// 목록으로 한 번 조립되고 이후 읽기 전용으로 취급됩니다 (런타임
/// 타입 스캐닝 대신 시작 시점 검증 가능한 정적 테이블).
#[derive(Default)]
pub struct ServiceRegistry {
    services: HashMap<String, Arc<dyn Service>>,
}

impl ServiceRegistry {
    /// 빈 레지스트리 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 핸들러를 등록합니다. 커맨드 토큰은 소문자로 정규화됩니다.
    pub fn register(&mut self, command: &str, service: Arc<dyn Service>) {
        self.services.insert(command.to_lowercase(), service);
    }

    /// 커맨드 토큰으로 핸들러를 해석합니다 (대소문자 무시 정확 일치).
    pub fn resolve(&self, command: &str) -> Option<Arc<dyn Service>> {
        self.services.get(&command.to_lowercase()).cloned()
    }

    /// 등록된 커맨드 토큰 목록
    pub fn commands(&self) -> Vec<String> {
        self.services.keys().cloned().collect()
    }
}

/// 디스패처 서비스
pub struct DispatcherService {
    queue: Arc<RequestQueue>,
    client_service: Arc<ClientService>,
    registry: Arc<ServiceRegistry>,
    shutdown_rx: watch::Receiver<bool>,
}

impl DispatcherService {
    /// 새로운 디스패처 생성
    pub fn new(
        queue: Arc<RequestQueue>,
        client_service: Arc<ClientService>,
        registry: Arc<ServiceRegistry>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            queue,
            client_service,
            registry,
            shutdown_rx,
        }
    }

    /// 워커 풀을 시작합니다.
    pub fn spawn_workers(self: &Arc<Self>, worker_count: usize) -> Vec<JoinHandle<()>> {
        (0..worker_count)
            .map(|index| {
                let this = Arc::clone(self);
                tokio::spawn(async move {
                    debug!("요청 워커 #{} 시작", index + 1);
                    this.worker_loop().await;
                    debug!("요청 워커 #{} 종료", index + 1);
                })
            })
            .collect()
    }

    /// 워커 루프: 요청을 꺼내 처리하고, 종료 신호가 오면
    /// 현재 항목까지 처리한 뒤 빠져나옵니다.
    async fn worker_loop(&self) {
        let mut shutdown_rx = self.shutdown_rx.clone();
        loop {
            let request = tokio::select! {
                _ = shutdown_rx.changed() => return,
                result = self.queue.read() => match result {
                    Ok(request) => request,
                    Err(_) => {
                        // 큐가 drain-and-reset 중: 종료가 아니면 잠시 뒤 재시도
                        if *shutdown_rx.borrow() {
                            return;
                        }
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        continue;
                    }
                },
            };
            self.process(request).await;
        }
    }

    /// 요청 하나를 처리합니다.
    async fn process(&self, request: Request) {
        debug!(
            "클라이언트 '{}' 요청 처리: '{}'",
            request.client_id, request.command
        );

        let response = match self.registry.resolve(&request.command) {
            None => {
                let reason = format!("Could not find service for '{}' command.", request.command);
                warn!(
                    "클라이언트 '{}' 요청 처리 실패: {}",
                    request.client_id, reason
                );
                reason
            }
            Some(service) => match service.invoke(request.client_id, &request.data).await {
                Ok(response) => response,
                Err(e) => {
                    // 핸들러 실패는 이 경계에서 흡수해 에러 응답으로 변환
                    warn!(
                        "클라이언트 '{}'의 '{}' 처리 중 핸들러 실패: {}",
                        request.client_id, request.command, e
                    );
                    format!("Request failed: {e}")
                }
            },
        };

        // 응답 경로는 식별자 기반 조회만 사용 (stale 포인터 방지)
        match self.client_service.get_by_id(request.client_id) {
            None => {
                // 큐 대기와 처리 사이에 연결이 끊긴 경우: 폐기하고 로깅
                info!(
                    "클라이언트 '{}'가 이미 해제되어 응답을 폐기합니다",
                    request.client_id
                );
            }
            Some(client) => {
                if let Err(e) = client.transceiver.transmit(&response).await {
                    warn!(
                        "클라이언트 '{}' 응답 전송 실패: {}",
                        request.client_id, e
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::client_service::Client;
    use crate::service::transceiver::{Transceiver, TransceiverState};
    use crate::tool::ServerError;
    use std::sync::Mutex;

    /// 전송된 응답을 기록하는 테스트용 트랜시버
    struct RecordingTransceiver {
        id: Uuid,
        sent: Mutex<Vec<String>>,
    }

    impl RecordingTransceiver {
        fn new(id: Uuid) -> Self {
            Self {
                id,
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Transceiver for RecordingTransceiver {
        fn id(&self) -> Uuid {
            self.id
        }

        fn state(&self) -> TransceiverState {
            TransceiverState::Active
        }

        async fn transmit(&self, data: &str) -> ServerResult<()> {
            self.sent.lock().unwrap().push(data.to_string());
            Ok(())
        }

        async fn stop(&self) {}
    }

    /// 페이로드를 그대로 돌려주는 테스트용 핸들러
    struct EchoService;

    #[async_trait]
    impl Service for EchoService {
        async fn invoke(&self, _client_id: Uuid, data: &str) -> ServerResult<String> {
            Ok(data.to_string())
        }
    }

    /// 항상 실패하는 테스트용 핸들러
    struct FailingService;

    #[async_trait]
    impl Service for FailingService {
        async fn invoke(&self, _client_id: Uuid, _data: &str) -> ServerResult<String> {
            Err(ServerError::service("failing", "의도된 실패"))
        }
    }

    fn dispatcher_with(
        registry: ServiceRegistry,
    ) -> (Arc<DispatcherService>, Arc<ClientService>, Arc<RequestQueue>) {
        let queue = Arc::new(RequestQueue::new(0));
        let client_service = Arc::new(ClientService::new());
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let dispatcher = Arc::new(DispatcherService::new(
            queue.clone(),
            client_service.clone(),
            Arc::new(registry),
            shutdown_rx,
        ));
        (dispatcher, client_service, queue)
    }

    fn register_client(client_service: &ClientService) -> (Uuid, Arc<RecordingTransceiver>) {
        let id = Uuid::new_v4();
        let transceiver = Arc::new(RecordingTransceiver::new(id));
        client_service.add(Client::new(id, transceiver.clone()));
        (id, transceiver)
    }

    /// 등록된 커맨드는 핸들러 결과를 원래 연결로 돌려보내야 함
    #[tokio::test]
    async fn test_dispatch_resolves_and_transmits() {
        let mut registry = ServiceRegistry::new();
        registry.register("echo", Arc::new(EchoService));
        let (dispatcher, client_service, _queue) = dispatcher_with(registry);
        let (id, transceiver) = register_client(&client_service);

        dispatcher
            .process(Request {
                client_id: id,
                command: "echo".to_string(),
                data: "hello".to_string(),
            })
            .await;

        assert_eq!(*transceiver.sent.lock().unwrap(), vec!["hello".to_string()]);
    }

    /// 대소문자 무시 해석 테스트
    #[test]
    fn test_registry_case_insensitive_resolve() {
        let mut registry = ServiceRegistry::new();
        registry.register("Echo", Arc::new(EchoService));

        assert!(registry.resolve("echo").is_some());
        assert!(registry.resolve("ECHO").is_some());
        assert!(registry.resolve("frobnicate").is_none());
    }

    /// 미등록 커맨드는 정확한 에러 문구로 응답해야 함
    #[tokio::test]
    async fn test_unknown_command_response() {
        let (dispatcher, client_service, _queue) = dispatcher_with(ServiceRegistry::new());
        let (id, transceiver) = register_client(&client_service);

        dispatcher
            .process(Request {
                client_id: id,
                command: "frobnicate".to_string(),
                data: "xyz".to_string(),
            })
            .await;

        assert_eq!(
            *transceiver.sent.lock().unwrap(),
            vec!["Could not find service for 'frobnicate' command.".to_string()]
        );
    }

    /// 핸들러 실패는 에러 응답으로 변환되어야 함
    #[tokio::test]
    async fn test_handler_failure_converted() {
        let mut registry = ServiceRegistry::new();
        registry.register("failing", Arc::new(FailingService));
        let (dispatcher, client_service, _queue) = dispatcher_with(registry);
        let (id, transceiver) = register_client(&client_service);

        dispatcher
            .process(Request {
                client_id: id,
                command: "failing".to_string(),
                data: String::new(),
            })
            .await;

        let sent = transceiver.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].starts_with("Request failed:"));
    }

    /// 처리 중이던 항목은 종료 신호가 와도 끝까지 처리되어야 함
    #[tokio::test]
    async fn test_shutdown_waits_for_current_item() {
        /// 일부러 느리게 응답하는 테스트용 핸들러
        struct SlowService;

        #[async_trait]
        impl Service for SlowService {
            async fn invoke(&self, _client_id: Uuid, data: &str) -> ServerResult<String> {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok(data.to_string())
            }
        }

        let mut registry = ServiceRegistry::new();
        registry.register("slow", Arc::new(SlowService));

        let queue = Arc::new(RequestQueue::new(0));
        let client_service = Arc::new(ClientService::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let dispatcher = Arc::new(DispatcherService::new(
            queue.clone(),
            client_service.clone(),
            Arc::new(registry),
            shutdown_rx,
        ));
        let (id, transceiver) = register_client(&client_service);

        let workers = dispatcher.spawn_workers(1);
        queue
            .write(Request {
                client_id: id,
                command: "slow".to_string(),
                data: "done".to_string(),
            })
            .await
            .unwrap();

        // 워커가 항목을 집어들 시간을 준 뒤 종료 신호를 보냄
        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown_tx.send(true).unwrap();

        for worker in workers {
            tokio::time::timeout(Duration::from_secs(1), worker)
                .await
                .expect("종료 신호 후 워커가 합류하지 않음")
                .unwrap();
        }

        // 처리 중이던 항목의 응답이 전송되어 있어야 함
        assert_eq!(*transceiver.sent.lock().unwrap(), vec!["done".to_string()]);
    }

    /// 처리 중 끊긴 클라이언트의 응답은 폐기되어야 함
    #[tokio::test]
    async fn test_disconnected_client_response_dropped() {
        let mut registry = ServiceRegistry::new();
        registry.register("echo", Arc::new(EchoService));
        let (dispatcher, client_service, _queue) = dispatcher_with(registry);
        let (id, transceiver) = register_client(&client_service);

        // 큐 대기와 처리 사이에 연결이 끊긴 상황을 재현
        client_service.remove(id);

        dispatcher
            .process(Request {
                client_id: id,
                command: "echo".to_string(),
                data: "late".to_string(),
            })
            .await;

        // 에러 없이 조용히 폐기되어야 함
        assert!(transceiver.sent.lock().unwrap().is_empty());
    }
}
