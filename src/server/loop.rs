// Server loop module
// Accepts connections until a shutdown signal arrives

use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

use super::connection::handle_connection;
use super::transaction::Kernel;
use crate::logger;

/// Accept connections on `listener` until `shutdown` resolves.
///
/// Connections already being served keep running on the runtime.
pub async fn start_server_loop<S>(listener: TcpListener, kernel: Arc<Kernel>, shutdown: S)
where
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer_addr)) => {
                        handle_connection(stream, peer_addr, Arc::clone(&kernel));
                    }
                    Err(e) => logger::log_error(&format!("Failed to accept connection: {e}")),
                }
            }

            () = &mut shutdown => {
                logger::log_debug("[Server] Shutdown requested, no longer accepting connections");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::container::Container;
    use crate::dispatch::closure;
    use crate::error::DispatchError;
    use crate::http::{MemorySessionStore, Request};
    use crate::routing::{RouteParams, Router};
    use crate::server::listener::create_listener;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn exchange(addr: std::net::SocketAddr, raw: &str) -> String {
        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream.write_all(raw.as_bytes()).await.unwrap();
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        String::from_utf8_lossy(&response).into_owned()
    }

    #[tokio::test]
    async fn test_serves_until_shutdown() {
        let mut config = Config::defaults().unwrap();
        config.logging.access_log = false;
        config.http.max_body_size = 8;

        let mut router = Router::new();
        router
            .post(
                "/artes/{id}",
                closure(|req: &Request, params: &RouteParams| {
                    Ok::<_, DispatchError>(format!("{} {}", req.intended_method(), params.int("id")?))
                }),
            )
            .unwrap();
        let kernel = Arc::new(Kernel::new(
            config,
            router,
            Arc::new(MemorySessionStore::new()),
            Container::new,
        ));

        let listener = create_listener("127.0.0.1:0".parse().unwrap(), 16).unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(start_server_loop(listener, kernel, async {
            let _ = stopped.await;
        }));

        let ok = exchange(
            addr,
            "POST /artes/3 HTTP/1.1\r\nHost: x\r\nConnection: close\r\nContent-Length: 0\r\n\r\n",
        )
        .await;
        assert!(ok.starts_with("HTTP/1.1 200"), "{ok}");
        assert!(ok.ends_with("POST 3"), "{ok}");

        let too_large = exchange(
            addr,
            "POST /artes/3 HTTP/1.1\r\nHost: x\r\nConnection: close\r\nContent-Length: 9\r\n\r\n123456789",
        )
        .await;
        assert!(too_large.starts_with("HTTP/1.1 413"), "{too_large}");

        stop.send(()).unwrap();
        server.await.unwrap();
    }
}
