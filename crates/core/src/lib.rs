//! Shared domain types for the Meritum notification pipeline.
//!
//! - [`types`] -- identifier and timestamp aliases.
//! - [`completion`] -- the [`CompletionEvent`] wire payload published by
//!   document workers.
//! - [`job_request`] -- the [`JobRequest`] payload handed to workers.
//! - [`error`] -- the crate-wide [`CoreError`].

pub mod completion;
pub mod error;
pub mod job_request;
pub mod types;

pub use completion::CompletionEvent;
pub use error::CoreError;
pub use job_request::{DocumentType, JobRequest};
