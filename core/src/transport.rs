//! The network call itself.
//!
//! # Design
//! `Transport` is the seam between request building and classification: it
//! takes a descriptor, blocks until the server answers (or the timeout
//! elapses), and returns the status, headers and body as plain data. Status
//! codes are never treated as errors here; that is classification's job.
//!
//! `UreqTransport` is the default implementation. Tests and hosts with their
//! own HTTP stack can inject any other `Transport` through
//! `DispatcherBuilder::transport`.

use std::io;

use crate::error::{TransportError, TransportErrorKind};
use crate::http::{Headers, HttpMethod, RawResponse, RequestDescriptor};

/// Executes a request and returns the raw response.
pub trait Transport: Send + Sync {
    fn execute(&self, request: &RequestDescriptor) -> Result<RawResponse, TransportError>;
}

/// Blocking transport backed by a `ureq::Agent`.
#[derive(Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl std::fmt::Debug for UreqTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UreqTransport").finish_non_exhaustive()
    }
}

impl UreqTransport {
    pub fn new(user_agent: Option<&str>) -> Self {
        let mut config = ureq::Agent::config_builder().http_status_as_error(false);
        if let Some(user_agent) = user_agent {
            config = config.user_agent(user_agent);
        }
        Self {
            agent: config.build().new_agent(),
        }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Transport for UreqTransport {
    fn execute(&self, request: &RequestDescriptor) -> Result<RawResponse, TransportError> {
        let result = match request.method {
            HttpMethod::Get => {
                let mut builder = self.agent.get(&request.url);
                for (name, value) in request.headers.iter() {
                    builder = builder.header(name, value);
                }
                builder
                    .config()
                    .timeout_global(Some(request.timeout))
                    .build()
                    .call()
            }
            HttpMethod::Post => {
                let mut builder = self.agent.post(&request.url);
                for (name, value) in request.headers.iter() {
                    builder = builder.header(name, value);
                }
                let builder = builder
                    .config()
                    .timeout_global(Some(request.timeout))
                    .build();
                match &request.body {
                    Some(body) => builder.send(body.as_slice()),
                    None => builder.send_empty(),
                }
            }
        };

        let mut response = result?;
        let status = response.status().as_u16();
        let headers: Headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = response.body_mut().read_to_vec()?;

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}

impl From<ureq::Error> for TransportError {
    fn from(err: ureq::Error) -> Self {
        let kind = match &err {
            ureq::Error::Timeout(_) => TransportErrorKind::Timeout,
            ureq::Error::HostNotFound => TransportErrorKind::Dns,
            ureq::Error::ConnectionFailed => TransportErrorKind::Connection,
            ureq::Error::Io(io_err) => io_kind(io_err),
            _ => TransportErrorKind::Other,
        };
        TransportError::new(kind, err.to_string())
    }
}

fn io_kind(err: &io::Error) -> TransportErrorKind {
    match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TransportErrorKind::Timeout,
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::NotConnected
        | io::ErrorKind::AddrNotAvailable => TransportErrorKind::Connection,
        _ => TransportErrorKind::Io,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_map_to_kinds() {
        let refused = io::Error::from(io::ErrorKind::ConnectionRefused);
        assert_eq!(io_kind(&refused), TransportErrorKind::Connection);
        let timed_out = io::Error::from(io::ErrorKind::TimedOut);
        assert_eq!(io_kind(&timed_out), TransportErrorKind::Timeout);
        let other = io::Error::from(io::ErrorKind::UnexpectedEof);
        assert_eq!(io_kind(&other), TransportErrorKind::Io);
    }

    #[test]
    fn ureq_errors_map_to_kinds() {
        let err = TransportError::from(ureq::Error::HostNotFound);
        assert_eq!(err.kind, TransportErrorKind::Dns);
        let err = TransportError::from(ureq::Error::Io(io::Error::from(
            io::ErrorKind::ConnectionRefused,
        )));
        assert_eq!(err.kind, TransportErrorKind::Connection);
    }

    #[test]
    fn refused_connection_is_transport_error() {
        // Bind then drop to get a local port with nothing listening.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let transport = UreqTransport::default();
        let request = RequestDescriptor::new(HttpMethod::Get, format!("http://127.0.0.1:{port}/"));
        let err = transport.execute(&request).unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::Connection);
    }
}
