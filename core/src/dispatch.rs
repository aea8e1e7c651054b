//! Executing requests and routing outcomes to callbacks.
//!
//! # Design
//! A `Dispatcher` bundles the three collaborators a request needs after it
//! leaves the builder: the worker pool that runs the blocking call, the
//! transport that performs it, and the completion context that classifies
//! the result and invokes a callback. All three are injectable through
//! `DispatcherBuilder`; `Dispatcher::global()` wires the process-wide
//! defaults.
//!
//! Each `send` becomes exactly one pool job. The job checks its
//! cancellation token before the call, performs the call, and posts the
//! result to the completion context, which checks the token once more before
//! classifying. A cancelled dispatch therefore never reaches a callback.

use std::sync::{Arc, OnceLock};

use crate::classify::{classify, Outcome, ResponseBody};
use crate::completion::{CompletionContext, CompletionThread};
use crate::config::DispatcherConfig;
use crate::error::WebError;
use crate::http::{Headers, HttpMethod, RequestDescriptor};
use crate::pool::{CancellationToken, WorkerPool};
use crate::request::WebRequest;
use crate::transport::{Transport, UreqTransport};

const LOG_TARGET: &str = "webclient_core::dispatch";

/// Called with the decoded body and the HTTP status.
pub type SuccessHandler = Box<dyn FnOnce(ResponseBody, u16) + Send + 'static>;

/// Called with the error of a failed request.
pub type FailureHandler = Box<dyn FnOnce(WebError) + Send + 'static>;

/// Wrap a closure as a success callback for `send`.
pub fn on_success<F>(f: F) -> Option<SuccessHandler>
where
    F: FnOnce(ResponseBody, u16) + Send + 'static,
{
    Some(Box::new(f))
}

/// Wrap a closure as a failure callback for `send`.
pub fn on_failure<F>(f: F) -> Option<FailureHandler>
where
    F: FnOnce(WebError) + Send + 'static,
{
    Some(Box::new(f))
}

static GLOBAL: OnceLock<Dispatcher> = OnceLock::new();

struct DispatcherInner {
    config: DispatcherConfig,
    pool: Arc<WorkerPool>,
    completion: Arc<dyn CompletionContext>,
    transport: Arc<dyn Transport>,
}

/// Runs requests on a worker pool and delivers their outcomes.
///
/// Cheap to clone; clones share the pool, transport and completion context.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

impl Dispatcher {
    /// The process-wide dispatcher used by `WebRequest::get`/`post`.
    ///
    /// Built on first use from `DispatcherConfig::from_env()`, with a
    /// dedicated completion thread and the ureq transport.
    pub fn global() -> &'static Dispatcher {
        GLOBAL.get_or_init(|| {
            Dispatcher::new(DispatcherConfig::from_env())
                .expect("failed to start the default webclient dispatcher threads")
        })
    }

    /// A dispatcher with its own pool, completion thread and ureq transport.
    pub fn new(config: DispatcherConfig) -> std::io::Result<Self> {
        DispatcherBuilder::new().config(config).build()
    }

    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.inner.config
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.inner.pool
    }

    /// Start a GET builder bound to this dispatcher.
    pub fn get(&self, url: impl Into<String>) -> WebRequest {
        self.request(HttpMethod::Get, url)
    }

    /// Start a POST builder bound to this dispatcher.
    pub fn post(&self, url: impl Into<String>) -> WebRequest {
        self.request(HttpMethod::Post, url)
    }

    pub fn request(&self, method: HttpMethod, url: impl Into<String>) -> WebRequest {
        let mut descriptor = RequestDescriptor::new(method, url);
        descriptor.timeout = self.inner.config.default_timeout;
        descriptor.headers = self.inner.config.default_headers.clone();
        WebRequest::from_parts(self.clone(), descriptor)
    }

    /// Schedule one execution of `request`. Returns immediately.
    pub(crate) fn dispatch(
        &self,
        request: Arc<RequestDescriptor>,
        token: CancellationToken,
        success: Option<SuccessHandler>,
        failure: Option<FailureHandler>,
    ) {
        tracing::debug!(
            target: LOG_TARGET,
            method = %request.method,
            url = %request.url,
            priority = ?request.priority,
            "scheduling request"
        );
        let inner = Arc::clone(&self.inner);
        let priority = request.priority;
        let accepted = self.inner.pool.spawn(
            priority,
            Box::new(move || {
                if token.is_cancelled() {
                    tracing::debug!(target: LOG_TARGET, url = %request.url, "cancelled before start");
                    return;
                }
                let fetched = match request.parse_url() {
                    Ok(_) => inner.transport.execute(&request).map_err(WebError::from),
                    Err(err) => Err(err),
                };
                match &fetched {
                    Ok(response) => tracing::debug!(
                        target: LOG_TARGET,
                        url = %request.url,
                        status = response.status,
                        bytes = response.body.len(),
                        "request completed"
                    ),
                    Err(err) => tracing::debug!(
                        target: LOG_TARGET,
                        url = %request.url,
                        error = %err,
                        "request failed"
                    ),
                }
                if token.is_cancelled() {
                    tracing::debug!(target: LOG_TARGET, url = %request.url, "cancelled in flight; discarding result");
                    return;
                }
                let path = request.path();
                inner.completion.post(Box::new(move || {
                    if token.is_cancelled() {
                        tracing::trace!(target: LOG_TARGET, path = %path, "cancelled before delivery");
                        return;
                    }
                    deliver(classify(&path, fetched), success, failure);
                }));
            }),
        );
        if !accepted {
            tracing::warn!(target: LOG_TARGET, "worker pool is shut down; request dropped");
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.inner.config)
            .field("pool", &self.inner.pool)
            .finish_non_exhaustive()
    }
}

/// Hand an outcome to the matching callback. A missing callback drops it.
fn deliver(outcome: Outcome, success: Option<SuccessHandler>, failure: Option<FailureHandler>) {
    match outcome {
        Outcome::Success { body, status } => match success {
            Some(callback) => callback(body, status),
            None => tracing::trace!(target: LOG_TARGET, status, "no success handler"),
        },
        Outcome::Failure(err) => match failure {
            Some(callback) => callback(err),
            None => tracing::trace!(target: LOG_TARGET, error = %err, "no failure handler"),
        },
    }
}

/// Builder for a [`Dispatcher`] with explicit collaborators.
///
/// Anything left unset falls back to the default: a new pool sized from the
/// config, a new completion thread, and `UreqTransport`.
#[derive(Default)]
pub struct DispatcherBuilder {
    config: DispatcherConfig,
    pool: Option<Arc<WorkerPool>>,
    completion: Option<Arc<dyn CompletionContext>>,
    transport: Option<Arc<dyn Transport>>,
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    pub fn default_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.config.default_timeout = timeout;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = Some(user_agent.into());
        self
    }

    pub fn default_headers(mut self, headers: impl Into<Headers>) -> Self {
        self.config.default_headers.merge(headers.into());
        self
    }

    pub fn pool(mut self, pool: Arc<WorkerPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn completion(mut self, completion: Arc<dyn CompletionContext>) -> Self {
        self.completion = Some(completion);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Start any threads that were not supplied and assemble the dispatcher.
    pub fn build(self) -> std::io::Result<Dispatcher> {
        let pool = match self.pool {
            Some(pool) => pool,
            None => Arc::new(WorkerPool::new(
                self.config.workers,
                &self.config.worker_thread_name,
            )?),
        };
        let completion = match self.completion {
            Some(completion) => completion,
            None => Arc::new(CompletionThread::spawn("webclient-completion")?),
        };
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(UreqTransport::new(self.config.user_agent.as_deref())),
        };
        Ok(Dispatcher {
            inner: Arc::new(DispatcherInner {
                config: self.config,
                pool,
                completion,
                transport,
            }),
        })
    }
}
