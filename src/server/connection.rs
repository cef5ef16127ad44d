// Connection module
// Serves one accepted TCP connection with hyper's HTTP/1 implementation

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;

use super::transaction::{handle_request, Kernel};
use crate::logger;

/// Handle a single connection in a spawned task.
///
/// This function:
/// 1. Wraps the TCP stream in `TokioIo`
/// 2. Configures HTTP/1.1 keep-alive from the performance settings
/// 3. Serves every request on the connection through the kernel
/// 4. Drops the connection once `performance.request_timeout` elapses
pub fn handle_connection(stream: tokio::net::TcpStream, peer_addr: SocketAddr, kernel: Arc<Kernel>) {
    tokio::spawn(async move {
        let io = TokioIo::new(stream);
        let performance = &kernel.config().performance;
        let timeout = Duration::from_secs(performance.request_timeout);

        let mut builder = http1::Builder::new();
        builder.keep_alive(performance.keep_alive);

        let service_kernel = Arc::clone(&kernel);
        let conn = builder.serve_connection(
            io,
            service_fn(move |req| handle_request(req, peer_addr, Arc::clone(&service_kernel))),
        );

        match tokio::time::timeout(timeout, conn).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => logger::log_connection_error(&err),
            Err(_) => {
                logger::log_warning(&format!(
                    "Connection from {peer_addr} timed out after {} seconds",
                    timeout.as_secs()
                ));
            }
        }
    });
}
