//! Request-dispatch core for the Galeria art inventory
//!
//! An HTTP transaction flows through:
//! `Request` → [`Router::dispatch`](routing::Router::dispatch) → pattern match →
//! controller built by the [`Container`](container::Container) → handler →
//! [`Response`](http::Response) → `send`.

pub mod app;
pub mod config;
pub mod container;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod logger;
pub mod routing;
pub mod server;

pub use error::{ContainerError, DispatchError, FieldErrors, RouteError};
