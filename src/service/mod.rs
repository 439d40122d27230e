//! 커맨드 서버 서비스 레이어
//!
//! 서버 코어를 구성하는 컴포넌트들을 정의합니다.
//!
//! # 구조
//!
//! ```text
//! Service Layer
//! ├── ClientService (클라이언트 레지스트리)
//! │   ├── 식별자/별칭 조회
//! │   ├── 연결/해제 경쟁 아래의 원자적 추가/제거
//! │   └── 일괄 해체 (서버 종료)
//! ├── RequestQueue (배압 요청 큐)
//! │   ├── 제한/무제한 용량 정책
//! │   ├── 취소 가능한 블로킹 읽기/쓰기
//! │   └── drain-and-reset (종료 경로)
//! ├── TcpTransceiver (연결 트랜시버)
//! │   ├── 줄 코덱 기반 수신 루프
//! │   ├── 프레이밍 송신
//! │   └── 수명주기 상태 기계
//! ├── ListenerService (수락 루프)
//! └── DispatcherService (워커 풀)
//!     ├── 커맨드 해석
//!     ├── 핸들러 호출
//!     └── 응답 라우팅
//! ```
//!
//! # 데이터 흐름
//!
//! ```text
//! Listener → (등록) → ClientService
//! Transceiver → (파싱, 적재) → RequestQueue → (소비) → Dispatcher
//! Dispatcher → (조회) → ClientService → (전송) → Transceiver
//! ```

pub mod client_service;
pub mod dispatcher;
pub mod listener;
pub mod request_queue;
pub mod transceiver;

pub use client_service::{Client, ClientService};
pub use dispatcher::{DispatcherService, Service, ServiceRegistry};
pub use listener::ListenerService;
pub use request_queue::RequestQueue;
pub use transceiver::{TcpTransceiver, Transceiver, TransceiverState};
