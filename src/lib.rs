//! 커맨드 프로토콜 서버 라이브러리
//!
//! 클라이언트가 지속 연결을 열고 줄 단위 요청을 보내면, 줄 단위
//! (또는 base64(JSON) 봉투) 응답을 돌려주는 연결 지향 서버입니다.
//!
//! # 아키텍처
//!
//! ```text
//! cmdserver
//! ├── protocol (줄 코덱, 프레임, 봉투)
//! ├── service (서버 코어)
//! │   ├── ClientService (클라이언트 레지스트리)
//! │   ├── RequestQueue (배압 요청 큐)
//! │   ├── TcpTransceiver (연결 트랜시버)
//! │   ├── ListenerService (수락 루프)
//! │   └── DispatcherService (워커 풀)
//! ├── handler (커맨드 핸들러: ping / alias / chat / file / configure)
//! ├── config (환경 설정 + 런타임 옵션)
//! ├── server (조립, start/stop 수명주기)
//! └── tool (공통 에러 타입)
//! ```
//!
//! # 사용 예시
//!
//! ```rust,no_run
//! use cmdserver::config::ServerConfig;
//! use cmdserver::server::Server;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let mut server = Server::new(ServerConfig::from_env()?)?;
//! let addr = server.start().await?;
//! println!("listening on {addr}");
//! // ...
//! server.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod handler;
pub mod protocol;
pub mod server;
pub mod service;
pub mod tool;

pub use config::ServerConfig;
pub use server::Server;
