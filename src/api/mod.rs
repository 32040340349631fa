//! API Layer for aerocursor
//!
//! Decodes JSON request lines and dispatches them to the `QueryEngine`.
//!
//! # Design Principles
//!
//! - One request, one response line
//! - Error codes passed through unchanged from the failing subsystem
//! - The principal is derived from the request itself
//!
//! # Supported Operations
//!
//! find, getMore, killCursors, killOp, currentOp, insert, remove, drop,
//! dropDatabase, createIndex, dropIndex, cursorInfo, explain, metrics

mod errors;
mod handler;
mod request;
mod response;

pub use errors::{ApiError, ApiErrorCode, ApiResult};
pub use handler::ApiHandler;
pub use request::Request;
pub use response::{ErrorResponse, Response, SuccessResponse};
