// Server loop module
// Accepts connections until shutdown is signalled

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use tokio::net::TcpListener;

use super::connection::accept_connection;
use crate::config::AppState;
use crate::logger;

/// Accept loop
///
/// Runs until `state.shutdown_signal` fires. Connections already being served
/// keep running on their own local tasks.
#[allow(clippy::ignored_unit_patterns)]
pub async fn start_server_loop(
    listener: TcpListener,
    state: Arc<AppState>,
    active_connections: Arc<AtomicUsize>,
) {
    let shutdown = Arc::clone(&state.shutdown_signal);

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer_addr)) => {
                        accept_connection(stream, peer_addr, &state, &active_connections);
                    }
                    Err(e) => {
                        logger::log_error(&format!("Failed to accept connection: {e}"));
                    }
                }
            }

            _ = shutdown.notified() => {
                logger::log_server_stop();
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::server::create_reusable_listener;
    use crate::store::{DocumentStore, MemoryStore};
    use http_body_util::{BodyExt, Full};
    use hyper::body::Bytes;
    use hyper::Request;
    use hyper_util::rt::TokioIo;
    use std::sync::atomic::Ordering;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn test_state_with(adjust: impl FnOnce(&mut Config)) -> Arc<AppState> {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = Config::load_from(dir.path().join("none").to_str().unwrap()).unwrap();
        cfg.logging.access_log = false;
        adjust(&mut cfg);
        Arc::new(AppState::new(&cfg, Arc::new(MemoryStore::new("parcels"))))
    }

    fn test_state() -> Arc<AppState> {
        test_state_with(|_| {})
    }

    /// Send `body` with chunked transfer encoding and return the raw response
    async fn post_chunked(addr: std::net::SocketAddr, path: &str, body: &str) -> String {
        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let request = format!(
            "POST {path} HTTP/1.1\r\nHost: {addr}\r\nContent-Type: application/json\r\n\
             Transfer-Encoding: chunked\r\nConnection: close\r\n\r\n\
             {:x}\r\n{body}\r\n0\r\n\r\n",
            body.len()
        );
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        String::from_utf8(response).unwrap()
    }

    async fn post(addr: std::net::SocketAddr, path: &str, body: &str) -> (u16, String) {
        let stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .unwrap();
        tokio::task::spawn_local(conn);

        let req = Request::post(path)
            .header("Host", addr.to_string())
            .header("Content-Type", "application/json")
            .body(Full::new(Bytes::from(body.to_string())))
            .unwrap();
        let resp = sender.send_request(req).await.unwrap();
        let status = resp.status().as_u16();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_serves_parcel_routes_until_shutdown() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let listener = create_reusable_listener("127.0.0.1:0".parse().unwrap()).unwrap();
                let addr = listener.local_addr().unwrap();
                let state = test_state();
                let connections = Arc::new(AtomicUsize::new(0));

                let server = tokio::task::spawn_local(start_server_loop(
                    listener,
                    Arc::clone(&state),
                    Arc::clone(&connections),
                ));

                let (status, body) = post(addr, "/createParcel", r#"{"id":"p1","weight":5}"#).await;
                assert_eq!((status, body.as_str()), (200, "Parcel created"));

                let (status, body) = post(addr, "/loadParcel", r#"{"parcelId":"p1"}"#).await;
                assert_eq!(status, 200);
                let loaded: serde_json::Value = serde_json::from_str(&body).unwrap();
                assert_eq!(loaded, serde_json::json!({"id": "p1", "weight": 5}));

                let (status, body) = post(addr, "/loadParcel", "{}").await;
                assert_eq!((status, body.as_str()), (400, "Missing parcelId"));

                state.shutdown_signal.notify_one();
                server.await.unwrap();
                assert!(connections.load(Ordering::SeqCst) <= 3);
            })
            .await;
    }

    #[tokio::test]
    async fn test_chunked_body_over_limit_is_rejected() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let listener = create_reusable_listener("127.0.0.1:0".parse().unwrap()).unwrap();
                let addr = listener.local_addr().unwrap();
                let state = test_state_with(|cfg| {
                    cfg.http.max_body_size = 32;
                    cfg.http.enable_cors = true;
                });

                let server = tokio::task::spawn_local(start_server_loop(
                    listener,
                    Arc::clone(&state),
                    Arc::new(AtomicUsize::new(0)),
                ));

                let small = post_chunked(addr, "/createParcel", r#"{"id":"p1"}"#).await;
                assert!(small.starts_with("HTTP/1.1 200"), "{small}");
                assert!(
                    small.to_ascii_lowercase().contains("access-control-allow-origin: *"),
                    "{small}"
                );

                let large = format!(r#"{{"id":"p2","note":"{}"}}"#, "x".repeat(64));
                let resp = post_chunked(addr, "/createParcel", &large).await;
                assert!(resp.starts_with("HTTP/1.1 413"), "{resp}");
                assert!(state.store.get("p2").await.unwrap().is_none());
                assert!(state.store.get("p1").await.unwrap().is_some());

                state.shutdown_signal.notify_one();
                server.await.unwrap();
            })
            .await;
    }
}
