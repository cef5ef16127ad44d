// Server module entry point
// Listener setup, connection serving and per-request transaction handling

pub mod connection;
pub mod listener;
pub mod transaction;

// Rust does not allow `loop` as a module name (keyword), use server_loop instead
#[path = "loop.rs"]
pub mod server_loop;

// Re-export commonly used types
pub use listener::create_listener;
pub use server_loop::start_server_loop;
pub use transaction::{handle_request, Kernel};
