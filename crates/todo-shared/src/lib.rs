//! # Todo Shared
//!
//! Request/response types of the HTTP API, usable from clients as well as the server.

pub mod dto;
pub mod response;

pub use response::{ApiResponse, ErrorResponse};
