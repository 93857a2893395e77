//! Late headers and caching over a real TCP connection.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use respcache::cache::{CacheControl, ResponseCachingMiddleware};
use respcache::context::Context;
use respcache::middleware::{LoggerMiddleware, Pipeline, from_fn};
use respcache::{Response, Server};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use uuid::Uuid;

async fn spawn_site(runs: Arc<AtomicUsize>) -> std::net::SocketAddr {
    let pipeline = Pipeline::new(|ctx: Context| async move {
        ctx.into_response()
            .cache_control(CacheControl::public().max_age_secs(60))
            .content_type("text/html")
            .body("Test response")
    })
    .with(Arc::new(LoggerMiddleware))
    .with(Arc::new(ResponseCachingMiddleware::default()))
    .with_handler(from_fn(move |mut ctx, next| {
        let runs = Arc::clone(&runs);
        async move {
            ctx.response_mut().add_header("removeme", "should not exist");
            ctx.on_starting(move |res: &mut Response| {
                runs.fetch_add(1, Ordering::SeqCst);
                if res.content_type_value() == Some("text/html") {
                    res.add_header("test", Uuid::new_v4().to_string());
                    res.remove_header("removeme");
                }
            })
            .unwrap();
            next.run(ctx).await
        }
    }));

    let server = Server::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr();
    tokio::spawn(server.run(pipeline));
    addr
}

async fn fetch(addr: std::net::SocketAddr, path: &str) -> String {
    send(addr, "GET", path).await
}

async fn send(addr: std::net::SocketAddr, method: &str, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();
    String::from_utf8(raw).unwrap()
}

fn header<'a>(raw: &'a str, name: &str) -> Option<&'a str> {
    let head = raw.split("\r\n\r\n").next()?;
    head.lines().skip(1).find_map(|line| {
        let (k, v) = line.split_once(':')?;
        k.trim().eq_ignore_ascii_case(name).then(|| v.trim())
    })
}

#[tokio::test]
async fn cached_late_header_is_stable_over_tcp() {
    let runs = Arc::new(AtomicUsize::new(0));
    let addr = spawn_site(Arc::clone(&runs)).await;

    let first = fetch(addr, "/").await;
    let second = fetch(addr, "/").await;

    assert!(first.starts_with("HTTP/1.1 200 OK\r\n"));
    assert_eq!(header(&first, "cache-control"), Some("public, max-age=60"));
    assert_eq!(header(&first, "content-type"), Some("text/html"));
    assert_eq!(header(&first, "connection"), Some("close"));
    assert!(header(&first, "removeme").is_none());
    assert!(header(&second, "removeme").is_none());

    let value = header(&first, "test").expect("test header on first response");
    assert_eq!(header(&second, "test"), Some(value));
    assert!(second.ends_with("Test response"));
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn head_replay_has_no_body() {
    let runs = Arc::new(AtomicUsize::new(0));
    let addr = spawn_site(Arc::clone(&runs)).await;

    let first = send(addr, "HEAD", "/").await;
    let second = send(addr, "HEAD", "/").await;

    for raw in [&first, &second] {
        assert!(raw.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(raw.ends_with("\r\n\r\n"));
        assert_eq!(header(raw, "content-length"), Some("13"));
    }
    assert!(header(&second, "age").is_some());
    assert_eq!(header(&first, "test"), header(&second, "test"));
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn malformed_request_gets_400() {
    let runs = Arc::new(AtomicUsize::new(0));
    let addr = spawn_site(Arc::clone(&runs)).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(b"NOT A REQUEST\r\n\r\n").await.unwrap();
    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();

    assert!(String::from_utf8_lossy(&raw).starts_with("HTTP/1.1 400 Bad Request\r\n"));
    assert_eq!(runs.load(Ordering::SeqCst), 0);
}
