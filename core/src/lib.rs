//! Fluent, callback-based HTTP client.
//!
//! # Overview
//! A [`WebRequest`] collects a method, URL, headers, form data or a
//! multipart upload, then `send`s them. The request runs on a worker pool;
//! its outcome is classified and handed to exactly one of two callbacks on a
//! completion context, never inside `send` itself.
//!
//! # Design
//! - Building, executing and classifying are separate steps. `RequestDescriptor`
//!   and `RawResponse` are plain data; `Transport` is the only piece that
//!   touches the network, and `classify` is a pure function.
//! - A `Dispatcher` owns the pool, transport and completion context. The
//!   process-wide one backs `WebRequest::get`/`post`; tests and embedders
//!   build their own with `Dispatcher::builder()`.
//! - Cancellation is cooperative and scoped to the builder that sent the
//!   request.
//! - The library logs through `tracing` and never installs a subscriber.

pub mod classify;
pub mod completion;
pub mod config;
pub mod dispatch;
pub mod encode;
pub mod error;
pub mod http;
pub mod pool;
pub mod request;
pub mod transport;

pub use classify::{classify, Outcome, ResponseBody};
pub use completion::{CompletionContext, CompletionQueue, CompletionThread, Inline};
pub use config::DispatcherConfig;
pub use dispatch::{on_failure, on_success, Dispatcher, DispatcherBuilder, FailureHandler, SuccessHandler};
pub use encode::{append_query, encode_form, FormData, FormValue, MultipartBody};
pub use error::{TransportError, TransportErrorKind, WebError};
pub use http::{Headers, HttpMethod, RawResponse, RequestDescriptor};
pub use pool::{CancellationToken, Priority, WorkerPool};
pub use request::WebRequest;
pub use transport::{Transport, UreqTransport};
