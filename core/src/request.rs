//! The chainable request builder.

use std::sync::Arc;
use std::time::Duration;

use crate::dispatch::{Dispatcher, FailureHandler, SuccessHandler};
use crate::encode::{append_query, encode_form, FormData, MultipartBody};
use crate::http::{Headers, HttpMethod, RequestDescriptor, CONTENT_TYPE, FORM_URLENCODED};
use crate::pool::{CancelScope, Priority};

const LOG_TARGET: &str = "webclient_core::request";

/// A GET or POST request under construction.
///
/// Configuration methods consume and return the builder. `send` borrows it,
/// so one builder can be sent several times and cancelled later:
///
/// ```no_run
/// use webclient_core::{on_failure, on_success, WebRequest};
///
/// let request = WebRequest::get("https://api.example.com/items")
///     .header("Accept", "application/json")
///     .data([("page", 2)]);
/// request.send(
///     on_success(|body, status| println!("{status}: {body:?}")),
///     on_failure(|err| eprintln!("{err}")),
/// );
/// request.cancel();
/// ```
pub struct WebRequest {
    dispatcher: Dispatcher,
    descriptor: RequestDescriptor,
    scope: Arc<CancelScope>,
}

impl WebRequest {
    pub(crate) fn from_parts(dispatcher: Dispatcher, descriptor: RequestDescriptor) -> Self {
        Self {
            dispatcher,
            descriptor,
            scope: Arc::new(CancelScope::new()),
        }
    }

    /// A GET builder on the process-wide dispatcher.
    pub fn get(url: impl Into<String>) -> Self {
        Dispatcher::global().get(url)
    }

    /// A POST builder on the process-wide dispatcher.
    pub fn post(url: impl Into<String>) -> Self {
        Dispatcher::global().post(url)
    }

    /// GET `url` and send it straight away.
    pub fn get_and_send(
        url: impl Into<String>,
        success: Option<SuccessHandler>,
        failure: Option<FailureHandler>,
    ) -> Self {
        let request = Self::get(url);
        request.send(success, failure);
        request
    }

    /// POST to `url` and send it straight away.
    pub fn post_and_send(
        url: impl Into<String>,
        success: Option<SuccessHandler>,
        failure: Option<FailureHandler>,
    ) -> Self {
        let request = Self::post(url);
        request.send(success, failure);
        request
    }

    /// GET with optional form data and headers. Headers are applied first.
    pub fn get_with(url: impl Into<String>, data: Option<FormData>, headers: Option<Headers>) -> Self {
        Self::get(url).apply(data, headers)
    }

    /// POST with optional form data and headers. Headers are applied first.
    pub fn post_with(url: impl Into<String>, data: Option<FormData>, headers: Option<Headers>) -> Self {
        Self::post(url).apply(data, headers)
    }

    pub fn get_with_and_send(
        url: impl Into<String>,
        data: Option<FormData>,
        headers: Option<Headers>,
        success: Option<SuccessHandler>,
        failure: Option<FailureHandler>,
    ) -> Self {
        let request = Self::get_with(url, data, headers);
        request.send(success, failure);
        request
    }

    pub fn post_with_and_send(
        url: impl Into<String>,
        data: Option<FormData>,
        headers: Option<Headers>,
        success: Option<SuccessHandler>,
        failure: Option<FailureHandler>,
    ) -> Self {
        let request = Self::post_with(url, data, headers);
        request.send(success, failure);
        request
    }

    fn apply(mut self, data: Option<FormData>, headers: Option<Headers>) -> Self {
        if let Some(headers) = headers {
            self = self.headers(headers);
        }
        if let Some(data) = data {
            self = self.data(data);
        }
        self
    }

    /// Merge `headers` into the request, overwriting same-named entries.
    pub fn headers(mut self, headers: impl Into<Headers>) -> Self {
        self.descriptor.headers.merge(headers.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.descriptor.headers.insert(name, value);
        self
    }

    /// Attach url-encoded form data: appended to the query string for GET,
    /// used as the body for POST. Empty data is ignored.
    pub fn data(mut self, data: impl Into<FormData>) -> Self {
        let data = data.into();
        if data.is_empty() {
            return self;
        }
        let encoded = encode_form(&data);
        match self.descriptor.method {
            HttpMethod::Get => {
                self.descriptor.url = append_query(&self.descriptor.url, &encoded);
            }
            HttpMethod::Post => {
                self.descriptor.body = Some(encoded.into_bytes());
                if !self.descriptor.headers.contains(CONTENT_TYPE) {
                    self.descriptor.headers.insert(CONTENT_TYPE, FORM_URLENCODED);
                }
            }
        }
        self
    }

    /// Upload `bytes` as a JPEG file part named `field_name`, preceded by the
    /// text values of `extra`. Only applies to non-empty POST uploads.
    pub fn file(self, bytes: impl Into<Vec<u8>>, field_name: &str, extra: impl Into<FormData>) -> Self {
        let bytes = bytes.into();
        if self.descriptor.method != HttpMethod::Post || bytes.is_empty() {
            tracing::trace!(target: LOG_TARGET, method = %self.descriptor.method, "ignoring file upload");
            return self;
        }
        let body = MultipartBody::image_upload(bytes, field_name, &extra.into());
        self.multipart(body)
    }

    /// Use a prepared multipart body. Ignored for GET.
    pub fn multipart(mut self, body: MultipartBody) -> Self {
        if self.descriptor.method != HttpMethod::Post {
            return self;
        }
        self.descriptor.headers.insert(CONTENT_TYPE, body.content_type());
        self.descriptor.body = Some(body.into_bytes());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.descriptor.timeout = timeout;
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.descriptor.priority = priority;
        self
    }

    /// The request `send` would dispatch right now.
    pub fn descriptor(&self) -> &RequestDescriptor {
        &self.descriptor
    }

    pub fn url(&self) -> &str {
        &self.descriptor.url
    }

    pub fn method(&self) -> HttpMethod {
        self.descriptor.method
    }

    /// Dispatch the request. Returns immediately; the matching callback runs
    /// later on the dispatcher's completion context.
    pub fn send(&self, success: Option<SuccessHandler>, failure: Option<FailureHandler>) -> &Self {
        let token = self.scope.register();
        self.dispatcher.dispatch(
            Arc::new(self.descriptor.clone()),
            token,
            success,
            failure,
        );
        self
    }

    /// Cancel every dispatch started by this builder that has not delivered
    /// yet. Does nothing when none are pending.
    pub fn cancel(&self) {
        let cancelled = self.scope.cancel_all();
        if cancelled > 0 {
            tracing::debug!(target: LOG_TARGET, url = %self.descriptor.url, cancelled, "cancelled requests");
        }
    }

    /// Dispatches from this builder that have not finished.
    pub fn in_flight(&self) -> usize {
        self.scope.live()
    }
}

impl Clone for WebRequest {
    /// The clone shares the dispatcher but not the pending dispatches:
    /// cancelling one builder never affects the other.
    fn clone(&self) -> Self {
        Self::from_parts(self.dispatcher.clone(), self.descriptor.clone())
    }
}

impl std::fmt::Debug for WebRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebRequest")
            .field("descriptor", &self.descriptor)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::CompletionQueue;
    use crate::error::TransportError;
    use crate::http::RawResponse;
    use crate::transport::Transport;
    use crate::{on_success, WorkerPool};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Echo;

    impl Transport for Echo {
        fn execute(&self, _: &RequestDescriptor) -> Result<RawResponse, TransportError> {
            Ok(RawResponse {
                status: 200,
                headers: Headers::new(),
                body: b"ok".to_vec(),
            })
        }
    }

    fn dispatcher() -> Dispatcher {
        Dispatcher::builder()
            .workers(1)
            .transport(Arc::new(Echo))
            .completion(Arc::new(CompletionQueue::new()))
            .build()
            .unwrap()
    }

    #[test]
    fn get_data_becomes_query() {
        let request = dispatcher().get("http://x/").data([("a", "b"), ("c", "d")]);
        assert_eq!(request.url(), "http://x/?a=b&c=d");
        assert!(request.descriptor().body.is_none());
    }

    #[test]
    fn get_data_merges_existing_query() {
        let request = dispatcher().get("http://x/s?q=1#top").data([("page", 2)]);
        assert_eq!(request.url(), "http://x/s?q=1&page=2#top");
    }

    #[test]
    fn empty_data_and_headers_are_noops() {
        let request = dispatcher()
            .get("http://x/")
            .data(FormData::new())
            .headers(Headers::new());
        assert_eq!(request.url(), "http://x/");
        assert!(request.descriptor().headers.is_empty());
    }

    #[test]
    fn post_data_becomes_form_body() {
        let request = dispatcher().post("http://x/").data([("name", "a b"), ("x", "&")]);
        let descriptor = request.descriptor();
        assert_eq!(descriptor.body.as_deref(), Some(&b"name=a%20b&x=%26"[..]));
        assert_eq!(descriptor.headers.get("content-type"), Some(FORM_URLENCODED));
        assert_eq!(request.url(), "http://x/");
    }

    #[test]
    fn post_data_keeps_caller_content_type() {
        let request = dispatcher()
            .post("http://x/")
            .header("content-type", "text/plain")
            .data([("a", "b")]);
        assert_eq!(request.descriptor().headers.get(CONTENT_TYPE), Some("text/plain"));
    }

    #[test]
    fn headers_merge_and_overwrite() {
        let request = dispatcher()
            .get("http://x/")
            .headers([("Accept", "text/html"), ("X-Trace", "1")])
            .headers([("accept", "application/json")]);
        let headers = &request.descriptor().headers;
        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get("Accept"), Some("application/json"));
    }

    #[test]
    fn file_upload_sets_multipart_body() {
        let request = dispatcher()
            .post("http://x/upload")
            .header("Content-Type", "text/plain")
            .file(vec![7u8; 10], "file", [("title", "t")]);
        let descriptor = request.descriptor();
        let content_type = descriptor.headers.get(CONTENT_TYPE).unwrap();
        assert!(content_type.starts_with("multipart/form-data; boundary=----WebKitFormBoundary"));
        let boundary = content_type.split("boundary=").nth(1).unwrap();
        let body = String::from_utf8_lossy(descriptor.body.as_ref().unwrap()).into_owned();
        assert!(body.contains("name=\"title\"\r\n\r\nt\r\n"));
        assert!(body.contains("name=\"file\"; filename=\""));
        assert!(body.ends_with(&format!("--{boundary}--\r\n")));
    }

    #[test]
    fn file_upload_ignored_for_get_or_empty_bytes() {
        let get = dispatcher().get("http://x/").file(vec![1u8], "file", FormData::new());
        assert!(get.descriptor().body.is_none());
        let empty = dispatcher().post("http://x/").file(Vec::new(), "file", FormData::new());
        assert!(empty.descriptor().body.is_none());
        assert!(!empty.descriptor().headers.contains(CONTENT_TYPE));
    }

    #[test]
    fn timeout_and_priority() {
        let request = dispatcher()
            .get("http://x/")
            .timeout(Duration::from_secs(3))
            .priority(Priority::High);
        assert_eq!(request.descriptor().timeout, Duration::from_secs(3));
        assert_eq!(request.descriptor().priority, Priority::High);
    }

    #[test]
    fn cancel_before_start_suppresses_callbacks() {
        // A busy single-worker pool keeps the request queued while we cancel.
        let pool = Arc::new(WorkerPool::new(1, "request-test").unwrap());
        let (gate_tx, gate_rx) = crossbeam_channel::bounded::<()>(0);
        let (started_tx, started_rx) = crossbeam_channel::bounded::<()>(1);
        pool.spawn(
            Priority::High,
            Box::new(move || {
                let _ = started_tx.send(());
                let _ = gate_rx.recv();
            }),
        );
        started_rx.recv().unwrap();

        let queue = Arc::new(CompletionQueue::new());
        let dispatcher = Dispatcher::builder()
            .pool(pool)
            .transport(Arc::new(Echo))
            .completion(queue.clone())
            .build()
            .unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let request = dispatcher.get("http://x/");
        request.send(
            on_success(move |_, _| {
                h.fetch_add(1, Ordering::SeqCst);
            }),
            None,
        );
        assert_eq!(request.in_flight(), 1);
        request.cancel();
        assert_eq!(request.in_flight(), 0);
        drop(gate_tx);

        queue.run_for(Duration::from_millis(200));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn each_send_dispatches_once() {
        let queue = Arc::new(CompletionQueue::new());
        let dispatcher = Dispatcher::builder()
            .workers(2)
            .transport(Arc::new(Echo))
            .completion(queue.clone())
            .build()
            .unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let request = dispatcher.get("http://x/");
        for _ in 0..3 {
            let h = Arc::clone(&hits);
            request.send(
                on_success(move |_, _| {
                    h.fetch_add(1, Ordering::SeqCst);
                }),
                None,
            );
        }
        assert!(queue.run_until(Duration::from_secs(5), || hits.load(Ordering::SeqCst) == 3));
    }

    #[test]
    fn clone_has_independent_cancellation() {
        let original = dispatcher().get("http://x/").header("A", "1");
        let copy = original.clone();
        assert_eq!(copy.descriptor(), original.descriptor());
        assert_eq!(copy.in_flight(), 0);
    }
}
