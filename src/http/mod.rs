//! HTTP abstraction module
//!
//! Request snapshot, response builder and the session contract they share,
//! independent of the hosting transport.

pub mod cookies;
pub mod multipart;
pub mod request;
pub mod response;
pub mod session;

// Re-export commonly used types
pub use multipart::UploadedFile;
pub use request::{Params, Request, RequestBuilder, METHOD_OVERRIDE_FIELD};
pub use response::{HttpResponse, Response, SendContext};
pub use session::{MemorySessionStore, Session, SessionMap, SessionRecord, SessionStore};
