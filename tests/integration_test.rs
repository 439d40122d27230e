//! 커맨드 서버 통합 테스트
//!
//! 서버를 임의 포트(포트 0)에 띄우고 실제 TCP 연결로 전체 플로우를
//! 확인합니다:
//! 1. 커맨드 줄 요청 → 디스패치 → 응답 수신
//! 2. 미등록 커맨드 에러 응답
//! 3. 별칭 배정과 중복 거부
//! 4. 봉투 형태(채팅) 요청/응답
//! 5. 연결 해제 시 레지스트리 정리

use anyhow::Result;
use cmdserver::config::ServerConfig;
use cmdserver::protocol::Message;
use cmdserver::server::Server;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use uuid::Uuid;

/// 응답 한 줄(`\n`까지)을 읽습니다.
async fn read_line(stream: &mut TcpStream) -> Result<String> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = stream.read(&mut byte).await?;
        if n == 0 {
            anyhow::bail!("응답 전에 연결이 닫혔습니다");
        }
        if byte[0] == b'\n' {
            break;
        }
        line.push(byte[0]);
    }
    Ok(String::from_utf8(line)?)
}

async fn start_server() -> Result<(Server, std::net::SocketAddr)> {
    let mut server = Server::new(ServerConfig::for_tests())?;
    let addr = server.start().await?;
    Ok((server, addr))
}

#[tokio::test]
async fn test_ping_roundtrip() -> Result<()> {
    let (mut server, addr) = start_server().await?;
    let mut stream = TcpStream::connect(addr).await?;

    // 시나리오 A: `ping 5` → 5글자 응답 한 줄
    stream.write_all(b"ping 5\n").await?;
    let response = read_line(&mut stream).await?;
    assert_eq!(response.len(), 5);
    assert!(response.chars().all(|c| c.is_ascii_alphanumeric()));
    println!("✅ ping 응답 수신: {response}");

    // 커맨드는 대소문자를 무시해야 함
    stream.write_all(b"PING 3\n").await?;
    assert_eq!(read_line(&mut stream).await?.len(), 3);

    server.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_unknown_command_keeps_connection() -> Result<()> {
    let (mut server, addr) = start_server().await?;
    let mut stream = TcpStream::connect(addr).await?;

    // 시나리오 B: 미등록 커맨드는 정확한 에러 문구로 응답
    stream.write_all(b"frobnicate xyz\n").await?;
    let response = read_line(&mut stream).await?;
    assert_eq!(response, "Could not find service for 'frobnicate' command.");

    // 연결은 유지되어야 함
    stream.write_all(b"ping 2\n").await?;
    assert_eq!(read_line(&mut stream).await?.len(), 2);
    println!("✅ 미등록 커맨드 후에도 연결 유지");

    server.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_alias_uniqueness_between_clients() -> Result<()> {
    let (mut server, addr) = start_server().await?;
    let mut client1 = TcpStream::connect(addr).await?;
    let mut client2 = TcpStream::connect(addr).await?;

    // 시나리오 C: 첫 번째 클라이언트가 별칭을 선점
    client1.write_all(b"alias alice\n").await?;
    assert_eq!(read_line(&mut client1).await?, "Alias set to 'alice'.");

    // 두 번째 클라이언트의 같은 별칭은 거부됨
    client2.write_all(b"alias alice\n").await?;
    assert_eq!(
        read_line(&mut client2).await?,
        "Alias 'alice' is already in use."
    );

    let aliases = server.client_service().list_aliases();
    assert_eq!(aliases, vec!["alice".to_string()]);
    println!("✅ 별칭 유일성 확인");

    server.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_chat_envelope_flow() -> Result<()> {
    let (mut server, addr) = start_server().await?;
    let mut stream = TcpStream::connect(addr).await?;

    // 봉투 형태 요청: service 태그와 JSON 채팅 요청을 담음
    let send = serde_json::json!({
        "command": "send",
        "message": {
            "sender": "alice",
            "receiver": "bob",
            "timestamp": chrono::Utc::now(),
            "content": "hi bob"
        }
    });
    let envelope = Message::ok(Some("chat"), send.to_string()).encode()?;
    stream.write_all(format!("{envelope}\n").as_bytes()).await?;

    let response = Message::decode(&read_line(&mut stream).await?, Uuid::nil())?;
    assert!(response.succeeded);
    assert_eq!(response.data.as_deref(), Some("Message sent to bob"));

    // bob의 사서함을 읽음
    let get = serde_json::json!({ "command": "get", "alias": "bob" });
    let envelope = Message::ok(Some("chat"), get.to_string()).encode()?;
    stream.write_all(format!("{envelope}\n").as_bytes()).await?;

    let response = Message::decode(&read_line(&mut stream).await?, Uuid::nil())?;
    assert!(response.succeeded);
    let body = response.data.unwrap();
    assert!(body.starts_with("Received 1 messages:"));
    assert!(body.contains("(alice): hi bob"));
    println!("✅ 채팅 봉투 왕복 확인");

    server.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_malformed_envelope_gets_error_reply() -> Result<()> {
    let (mut server, addr) = start_server().await?;
    let mut stream = TcpStream::connect(addr).await?;

    // 디코딩할 수 없는 봉투 줄: 에러 봉투로 응답하고 연결은 유지
    stream.write_all(b"!!garbage!!\n").await?;
    let response = Message::decode(&read_line(&mut stream).await?, Uuid::nil())?;
    assert!(!response.succeeded);
    assert!(response.error.is_some());

    // 빈 줄도 마찬가지로 에러 봉투
    stream.write_all(b"\n").await?;
    let response = Message::decode(&read_line(&mut stream).await?, Uuid::nil())?;
    assert!(!response.succeeded);
    assert!(response.error.unwrap().contains("invalid request"));

    stream.write_all(b"ping 1\n").await?;
    assert_eq!(read_line(&mut stream).await?.len(), 1);
    println!("✅ 잘못된 봉투 복구 확인");

    server.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_disconnect_cleans_registry() -> Result<()> {
    let (mut server, addr) = start_server().await?;
    let client_service = server.client_service();

    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(b"ping 1\n").await?;
    read_line(&mut stream).await?;
    assert_eq!(client_service.client_count(), 1);

    // 시나리오 E의 전제: 연결 해제 시 레지스트리가 정리되어야 함
    drop(stream);
    let mut cleaned = false;
    for _ in 0..50 {
        if client_service.client_count() == 0 {
            cleaned = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(cleaned, "연결 해제 후에도 레지스트리에 항목이 남아 있음");
    println!("✅ 해제 후 레지스트리 정리 확인");

    server.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_multiple_clients_interleaved() -> Result<()> {
    let (mut server, addr) = start_server().await?;

    // 여러 클라이언트의 요청이 서로를 막지 않아야 함
    let mut handles = Vec::new();
    for _ in 0..4 {
        handles.push(tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            for size in [1usize, 8, 32] {
                stream
                    .write_all(format!("ping {size}\n").as_bytes())
                    .await
                    .unwrap();
                let response = read_line(&mut stream).await.unwrap();
                assert_eq!(response.len(), size);
            }
        }));
    }
    for handle in handles {
        tokio::time::timeout(Duration::from_secs(5), handle).await??;
    }
    println!("✅ 다중 클라이언트 동시 처리 확인");

    server.stop().await?;
    Ok(())
}
