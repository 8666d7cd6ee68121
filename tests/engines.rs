//! End-to-end tests: each engine bound to an ephemeral port, exercised with
//! raw TCP clients.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use httpforge::server::ConnectionHandler;
use httpforge::{
    Engine, Metrics, OverloadPolicy, PoolConfig, ReactorEngine, Response, Router,
    SingleThreadEngine, ThreadPerConnEngine, ThreadPoolEngine,
};

const IDLE_TIMEOUT: Duration = Duration::from_millis(2_000);
const GRACE: Duration = Duration::from_millis(2_000);

fn test_router(metrics: Arc<Metrics>) -> Router {
    let mut router = Router::new();
    router.register("GET", "/", |_req| Response::ok("Welcome to HTTPForge!\n"));
    router.register("GET", "/hello", |_req| {
        thread::sleep(Duration::from_millis(20));
        Response::ok("Hello, World!\n")
    });
    router.register("POST", "/data", |req| {
        Response::ok(format!("Received POST data:\n{}", req.body()))
    });
    router.register("GET", "/metrics", move |_req| {
        let json = serde_json::to_string_pretty(&metrics.snapshot()).unwrap();
        Response::builder()
            .status(200, "OK")
            .header("Content-Type", "application/json")
            .body(json)
            .build()
    });
    router
}

fn handler_fixture() -> (ConnectionHandler, Arc<Metrics>) {
    let metrics = Arc::new(Metrics::new());
    let router = Arc::new(test_router(Arc::clone(&metrics)));
    (
        ConnectionHandler::new(router, Arc::clone(&metrics), IDLE_TIMEOUT),
        metrics,
    )
}

/// Run the engine on a background thread and wait for it to bind.
fn start_engine(engine: Arc<dyn Engine>) -> (SocketAddr, JoinHandle<()>) {
    let runner = Arc::clone(&engine);
    let handle = thread::spawn(move || {
        runner.start().expect("engine failed to start");
    });

    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(addr) = engine.local_addr() {
            return (addr, handle);
        }
        assert!(Instant::now() < deadline, "engine never bound");
        thread::sleep(Duration::from_millis(10));
    }
}

/// Read exactly one HTTP response (headers plus Content-Length body).
fn read_response(stream: &mut TcpStream) -> String {
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    let mut buf: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 1024];

    loop {
        if let Some(header_end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let headers = String::from_utf8_lossy(&buf[..header_end]).to_lowercase();
            let content_length: usize = headers
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .map(|v| v.trim().parse().unwrap())
                .unwrap_or(0);
            let total = header_end + 4 + content_length;
            if buf.len() >= total {
                return String::from_utf8_lossy(&buf[..total]).into_owned();
            }
        }
        let n = stream.read(&mut chunk).expect("read failed");
        assert!(n > 0, "connection closed before full response");
        buf.extend_from_slice(&chunk[..n]);
    }
}

fn get(addr: SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).unwrap();
    let request = format!("GET {} HTTP/1.1\r\nHost: localhost\r\n\r\n", path);
    stream.write_all(request.as_bytes()).unwrap();
    read_response(&mut stream)
}

#[test]
fn single_engine_serves_a_request() {
    let (handler, _metrics) = handler_fixture();
    let engine: Arc<dyn Engine> = Arc::new(SingleThreadEngine::new("127.0.0.1:0", handler));
    let (addr, handle) = start_engine(Arc::clone(&engine));

    let response = get(addr, "/");
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.contains("Welcome to HTTPForge!"));

    engine.stop();
    handle.join().unwrap();
    assert!(engine.local_addr().is_none());
}

#[test]
fn unknown_path_returns_404_naming_the_path() {
    let (handler, _metrics) = handler_fixture();
    let engine: Arc<dyn Engine> = Arc::new(SingleThreadEngine::new("127.0.0.1:0", handler));
    let (addr, handle) = start_engine(Arc::clone(&engine));

    let response = get(addr, "/nonexistent");
    assert!(response.starts_with("HTTP/1.1 404 Not Found\r\n"));
    assert!(response.contains("404 Not Found: /nonexistent"));

    engine.stop();
    handle.join().unwrap();
}

#[test]
fn thread_engine_handles_concurrent_connections() {
    let (handler, metrics) = handler_fixture();
    let engine: Arc<dyn Engine> =
        Arc::new(ThreadPerConnEngine::new("127.0.0.1:0", handler, GRACE));
    let (addr, handle) = start_engine(Arc::clone(&engine));

    let clients: Vec<_> = (0..4)
        .map(|_| {
            thread::spawn(move || {
                let response = get(addr, "/hello");
                assert!(response.contains("Hello, World!"));
            })
        })
        .collect();
    for client in clients {
        client.join().unwrap();
    }
    assert_eq!(metrics.total_requests(), 4);

    engine.stop();
    handle.join().unwrap();
}

#[test]
fn keep_alive_serves_two_requests_on_one_connection() {
    let (handler, metrics) = handler_fixture();
    let engine: Arc<dyn Engine> =
        Arc::new(ThreadPerConnEngine::new("127.0.0.1:0", handler, GRACE));
    let (addr, handle) = start_engine(Arc::clone(&engine));

    let mut stream = TcpStream::connect(addr).unwrap();
    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: x\r\nConnection: keep-alive\r\n\r\n")
        .unwrap();
    let first = read_response(&mut stream);
    assert!(first.contains("Connection: keep-alive\r\n"));

    // No Connection header on the second request: the session must close.
    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n")
        .unwrap();
    let second = read_response(&mut stream);
    assert!(second.contains("Connection: close\r\n"));

    // The server closes after the second exchange.
    let mut rest = Vec::new();
    stream.read_to_end(&mut rest).unwrap();
    assert!(rest.is_empty());
    assert_eq!(metrics.total_requests(), 2);

    engine.stop();
    handle.join().unwrap();
}

#[test]
fn pool_engine_serves_requests() {
    let (handler, _metrics) = handler_fixture();
    let config = PoolConfig {
        core_size: 2,
        max_size: 2,
        queue_capacity: 8,
        overload_policy: OverloadPolicy::CallerRuns,
    };
    let engine: Arc<dyn Engine> =
        Arc::new(ThreadPoolEngine::new("127.0.0.1:0", handler, config, GRACE));
    let (addr, handle) = start_engine(Arc::clone(&engine));

    for _ in 0..3 {
        let response = get(addr, "/");
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    }

    engine.stop();
    handle.join().unwrap();
}

#[test]
fn saturated_abort_pool_answers_503_on_the_wire() {
    let (handler, _metrics) = handler_fixture();
    let config = PoolConfig {
        core_size: 1,
        max_size: 1,
        queue_capacity: 1,
        overload_policy: OverloadPolicy::Abort,
    };
    let engine: Arc<dyn Engine> =
        Arc::new(ThreadPoolEngine::new("127.0.0.1:0", handler, config, GRACE));
    let (addr, handle) = start_engine(Arc::clone(&engine));

    // Two quiet connections: the first occupies the single worker (blocked
    // reading until the idle timeout), the second fills the one queue slot.
    let busy = TcpStream::connect(addr).unwrap();
    thread::sleep(Duration::from_millis(100));
    let queued = TcpStream::connect(addr).unwrap();
    thread::sleep(Duration::from_millis(100));

    // Core + queue saturated: the next connection is rejected at the door.
    let mut rejected = TcpStream::connect(addr).unwrap();
    let response = read_response(&mut rejected);
    assert!(response.starts_with("HTTP/1.1 503 Service Unavailable\r\n"));
    assert!(response.contains("Connection: close\r\n"));

    // The rejected socket is closed right after the response.
    let mut rest = Vec::new();
    rejected.read_to_end(&mut rest).unwrap();
    assert!(rest.is_empty());

    // Release the held connections so shutdown drains cleanly.
    drop(busy);
    drop(queued);
    engine.stop();
    handle.join().unwrap();
}

#[test]
fn metrics_endpoint_reports_counts() {
    let (handler, _metrics) = handler_fixture();
    let engine: Arc<dyn Engine> = Arc::new(SingleThreadEngine::new("127.0.0.1:0", handler));
    let (addr, handle) = start_engine(Arc::clone(&engine));

    let _ = get(addr, "/");
    let response = get(addr, "/metrics");
    assert!(response.contains("Content-Type: application/json\r\n"));
    // The /metrics request itself is counted before its handler runs.
    assert!(response.contains("\"totalRequests\": 2"));
    assert!(response.contains("\"latency\""));

    engine.stop();
    handle.join().unwrap();
}

fn reactor_fixture() -> Arc<dyn Engine> {
    let metrics = Arc::new(Metrics::new());
    let router = Arc::new(test_router(Arc::clone(&metrics)));
    Arc::new(ReactorEngine::new(
        "127.0.0.1:0",
        router,
        metrics,
        2,
        64,
        GRACE,
    ))
}

#[test]
fn reactor_engine_serves_and_closes() {
    let engine = reactor_fixture();
    let (addr, handle) = start_engine(Arc::clone(&engine));

    let mut stream = TcpStream::connect(addr).unwrap();
    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n")
        .unwrap();
    let response = read_response(&mut stream);
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.contains("Connection: close\r\n"));
    assert!(response.contains("Welcome to HTTPForge!"));

    // The reactor always closes after responding.
    let mut rest = Vec::new();
    stream.read_to_end(&mut rest).unwrap();
    assert!(rest.is_empty());

    engine.stop();
    handle.join().unwrap();
}

#[test]
fn reactor_engine_waits_for_full_post_body() {
    let engine = reactor_fixture();
    let (addr, handle) = start_engine(Arc::clone(&engine));

    let mut stream = TcpStream::connect(addr).unwrap();
    stream
        .write_all(b"POST /data HTTP/1.1\r\nHost: x\r\nContent-Length: 11\r\n\r\nhello")
        .unwrap();
    // The body finishes in a second packet.
    thread::sleep(Duration::from_millis(50));
    stream.write_all(b" world").unwrap();

    let response = read_response(&mut stream);
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.contains("Received POST data:\nhello world"));

    engine.stop();
    handle.join().unwrap();
}

#[test]
fn reactor_engine_serves_concurrent_clients() {
    let engine = reactor_fixture();
    let (addr, handle) = start_engine(Arc::clone(&engine));

    let clients: Vec<_> = (0..4)
        .map(|_| {
            thread::spawn(move || {
                let response = get(addr, "/hello");
                assert!(response.contains("Hello, World!"));
            })
        })
        .collect();
    for client in clients {
        client.join().unwrap();
    }

    engine.stop();
    handle.join().unwrap();
}

#[test]
fn stop_unblocks_a_quiet_accept_loop() {
    let (handler, _metrics) = handler_fixture();
    let engine: Arc<dyn Engine> = Arc::new(SingleThreadEngine::new("127.0.0.1:0", handler));
    let (_addr, handle) = start_engine(Arc::clone(&engine));

    // No traffic at all: stop must still bring start() home.
    engine.stop();
    let deadline = Instant::now() + Duration::from_secs(5);
    while !handle.is_finished() {
        assert!(Instant::now() < deadline, "stop did not unblock accept");
        thread::sleep(Duration::from_millis(10));
    }
    handle.join().unwrap();
}
