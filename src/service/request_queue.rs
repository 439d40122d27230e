//! 요청 큐
//!
//! 연결 I/O와 요청 처리를 분리하는 배압 큐입니다.
//! 트랜시버(생산자)가 파싱한 요청을 넣고 디스패처 워커(소비자)가
//! 꺼내며, 꺼내는 순간 소유권이 넘어가 공유 변경이 없습니다.
//!
//! # 용량 정책
//!
//! - 용량 0: 무제한 큐
//! - 용량 > 0: 제한 큐, 가득 차면 `write`가 블로킹되어 느린 소비자가
//!   빠른 생산자를 스로틀링합니다 (시스템의 주 배압 지점)
//!
//! # 전달 보장
//!
//! 항목은 정확히 한 소비자에게 최대 한 번 전달됩니다 (브로드캐스트
//! 아님). 순서는 하나의 내부 큐 인스턴스 수명 동안 FIFO이며,
//! `drain_and_reset` 경계를 넘어서는 보장되지 않습니다.

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use crate::protocol::Request;
use crate::tool::{ServerError, ServerResult};

enum QueueSender {
    Bounded(mpsc::Sender<Request>),
    Unbounded(mpsc::UnboundedSender<Request>),
}

enum QueueReceiver {
    Bounded(mpsc::Receiver<Request>),
    Unbounded(mpsc::UnboundedReceiver<Request>),
}

impl QueueReceiver {
    fn try_recv(&mut self) -> Option<Request> {
        match self {
            QueueReceiver::Bounded(rx) => rx.try_recv().ok(),
            QueueReceiver::Unbounded(rx) => rx.try_recv().ok(),
        }
    }

    async fn recv(&mut self) -> Option<Request> {
        match self {
            QueueReceiver::Bounded(rx) => rx.recv().await,
            QueueReceiver::Unbounded(rx) => rx.recv().await,
        }
    }
}

/// 배압 요청 큐
///
/// 다중 생산자(연결별 읽기 루프), 다중 소비자(디스패처 워커)를
/// 지원합니다. 소비자들은 내부 수신단을 뮤텍스로 공유합니다.
pub struct RequestQueue {
    capacity: usize,
    sender: std::sync::RwLock<Option<QueueSender>>,
    receiver: Mutex<QueueReceiver>,
}

impl RequestQueue {
    /// 설정된 용량 정책으로 큐를 생성합니다.
    ///
    /// # Arguments
    ///
    /// * `capacity` - 0이면 무제한, 0보다 크면 제한 큐
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = Self::create_channel(capacity);
        Self {
            capacity,
            sender: std::sync::RwLock::new(Some(sender)),
            receiver: Mutex::new(receiver),
        }
    }

    fn create_channel(capacity: usize) -> (QueueSender, QueueReceiver) {
        if capacity > 0 {
            let (tx, rx) = mpsc::channel(capacity);
            (QueueSender::Bounded(tx), QueueReceiver::Bounded(rx))
        } else {
            let (tx, rx) = mpsc::unbounded_channel();
            (QueueSender::Unbounded(tx), QueueReceiver::Unbounded(rx))
        }
    }

    fn clone_sender(&self) -> ServerResult<QueueSender> {
        let guard = self.sender.read().expect("요청 큐 송신단 락 오염");
        match guard.as_ref() {
            Some(QueueSender::Bounded(tx)) => Ok(QueueSender::Bounded(tx.clone())),
            Some(QueueSender::Unbounded(tx)) => Ok(QueueSender::Unbounded(tx.clone())),
            None => Err(ServerError::queue_closed("write")),
        }
    }

    /// 요청을 큐에 넣습니다.
    ///
    /// 제한 큐가 가득 차면 용량이 생길 때까지 블로킹됩니다.
    /// 큐가 닫혀 있으면 에러를 반환합니다.
    pub async fn write(&self, request: Request) -> ServerResult<()> {
        match self.clone_sender()? {
            QueueSender::Bounded(tx) => tx
                .send(request)
                .await
                .map_err(|_| ServerError::queue_closed("write")),
            QueueSender::Unbounded(tx) => tx
                .send(request)
                .map_err(|_| ServerError::queue_closed("write")),
        }
    }

    /// 블로킹 없이 쓰기 가능 여부를 확인합니다.
    pub fn try_wait_writable(&self) -> bool {
        let guard = self.sender.read().expect("요청 큐 송신단 락 오염");
        match guard.as_ref() {
            Some(QueueSender::Bounded(tx)) => tx.try_reserve().is_ok(),
            Some(QueueSender::Unbounded(_)) => true,
            None => false,
        }
    }

    /// 요청 하나를 꺼냅니다.
    ///
    /// 항목이 생길 때까지 블로킹되며, 큐가 닫히고 비어 있으면
    /// 에러를 반환합니다.
    pub async fn read(&self) -> ServerResult<Request> {
        let mut receiver = self.receiver.lock().await;
        receiver
            .recv()
            .await
            .ok_or_else(|| ServerError::queue_closed("read"))
    }

    /// 큐가 닫힐 때까지 항목을 차례로 내놓는 지연 시퀀스를 반환합니다.
    pub fn read_all(&self) -> ReadAll<'_> {
        ReadAll { queue: self }
    }

    /// 큐를 닫고 버퍼에 남은 항목을 폐기한 뒤 같은 용량 정책으로
    /// 재초기화합니다.
    ///
    /// 폐기된 항목 수를 로깅하며, 폐기된 항목은 이후 어떤 `read`에도
    /// 전달되지 않습니다. 서버 종료 경로에서 사용됩니다.
    pub async fn drain_and_reset(&self) {
        // 송신단을 먼저 닫아 블로킹 중인 소비자를 깨웁니다.
        {
            let mut guard = self.sender.write().expect("요청 큐 송신단 락 오염");
            guard.take();
        }

        let mut receiver = self.receiver.lock().await;
        let mut discarded = 0usize;
        while receiver.try_recv().is_some() {
            discarded += 1;
        }
        if discarded > 0 {
            warn!("요청 큐에서 {}개 요청을 폐기합니다", discarded);
        }

        let (sender, new_receiver) = Self::create_channel(self.capacity);
        *receiver = new_receiver;
        {
            let mut guard = self.sender.write().expect("요청 큐 송신단 락 오염");
            *guard = Some(sender);
        }
        debug!("요청 큐 재초기화 완료 (용량: {})", self.capacity);
    }
}

/// [`RequestQueue::read_all`]이 반환하는 지연 시퀀스
pub struct ReadAll<'a> {
    queue: &'a RequestQueue,
}

impl ReadAll<'_> {
    /// 다음 항목을 기다립니다. 큐가 닫히면 `None`을 반환합니다.
    pub async fn next(&mut self) -> Option<Request> {
        self.queue.read().await.ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use uuid::Uuid;

    fn request(data: &str) -> Request {
        Request {
            client_id: Uuid::new_v4(),
            command: "ping".to_string(),
            data: data.to_string(),
        }
    }

    /// 무제한 큐의 FIFO 순서 테스트
    #[tokio::test]
    async fn test_fifo_order() {
        let queue = RequestQueue::new(0);

        for i in 0..5 {
            queue.write(request(&i.to_string())).await.unwrap();
        }
        for i in 0..5 {
            assert_eq!(queue.read().await.unwrap().data, i.to_string());
        }
    }

    /// 배압 테스트 (용량 1: 두 번째 쓰기는 읽기 전까지 블로킹)
    #[tokio::test]
    async fn test_bounded_backpressure() {
        let queue = Arc::new(RequestQueue::new(1));

        queue.write(request("X")).await.unwrap();
        assert!(!queue.try_wait_writable());

        // 두 번째 쓰기는 블로킹되어야 함
        let writer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.write(request("Y")).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!writer.is_finished());

        // 읽기 한 번으로 블로킹이 풀려야 함
        assert_eq!(queue.read().await.unwrap().data, "X");
        tokio::time::timeout(Duration::from_secs(1), writer)
            .await
            .expect("읽기 후에도 쓰기가 완료되지 않음")
            .unwrap()
            .unwrap();
        assert_eq!(queue.read().await.unwrap().data, "Y");
    }

    /// 최대 1회 전달 테스트 (두 소비자가 한 항목을 중복 수신하지 않음)
    #[tokio::test]
    async fn test_at_most_once_delivery() {
        let queue = Arc::new(RequestQueue::new(0));
        let total = 100usize;

        for i in 0..total {
            queue.write(request(&i.to_string())).await.unwrap();
        }
        queue
            .sender
            .write()
            .expect("요청 큐 송신단 락 오염")
            .take();

        let mut consumers = Vec::new();
        for _ in 0..2 {
            let queue = queue.clone();
            consumers.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                let mut items = queue.read_all();
                while let Some(item) = items.next().await {
                    seen.push(item.data);
                }
                seen
            }));
        }

        let mut all = Vec::new();
        for consumer in consumers {
            all.extend(consumer.await.unwrap());
        }
        all.sort_by_key(|d| d.parse::<usize>().unwrap());
        assert_eq!(all.len(), total);
        for (i, data) in all.iter().enumerate() {
            assert_eq!(data, &i.to_string());
        }
    }

    /// 폐기된 항목은 이후 읽기에 전달되지 않아야 함
    #[tokio::test]
    async fn test_drain_discards_buffered_items() {
        let queue = RequestQueue::new(0);

        queue.write(request("stale-1")).await.unwrap();
        queue.write(request("stale-2")).await.unwrap();
        queue.drain_and_reset().await;

        // 재초기화된 큐는 다시 사용 가능해야 함
        queue.write(request("fresh")).await.unwrap();
        assert_eq!(queue.read().await.unwrap().data, "fresh");
    }

    /// 닫힌 큐에 대한 쓰기는 에러를 반환해야 함
    #[tokio::test]
    async fn test_write_after_close() {
        let queue = Arc::new(RequestQueue::new(1));

        // 가득 찬 큐에 블로킹된 쓰기는 drain 시 깨어나 실패해야 함
        queue.write(request("X")).await.unwrap();
        let writer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.write(request("Y")).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        queue.drain_and_reset().await;
        let result = tokio::time::timeout(Duration::from_secs(1), writer)
            .await
            .expect("drain 후에도 쓰기가 깨어나지 않음")
            .unwrap();
        assert!(matches!(result, Err(ServerError::QueueClosed { .. })));
    }
}
