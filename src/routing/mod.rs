//! Routing module
//!
//! Provides the application routing layer:
//! - Placeholder patterns compiled to anchored regular expressions
//! - First-match route lookup per verb, in registration order
//! - Route groups and resource controllers

mod matcher;
mod params;
mod pattern;
mod table;

pub use matcher::Route;
pub use params::{ParamValue, RouteParams};
pub use pattern::{join, normalize, CompiledPattern};
pub use table::Router;
