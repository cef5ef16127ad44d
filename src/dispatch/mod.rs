//! Handler invocation
//!
//! Handler types, controller contracts and the boundary that turns handler
//! failures into responses.

mod boundary;
pub mod handler;

pub use boundary::{escape_html, invoke, render_error};
pub use handler::{action, closure, Handler, HandlerResult, Reply, ResourceController};
