//! Response buffering.
//!
//! # Responsibilities
//! - Capture status, headers and body of one backend attempt
//! - Keep every byte away from the client until the walk is decided
//! - Commit the final attempt to the client exactly once
//!
//! # Design Decisions
//! - Two phases: write into a [`ResponseSink`], then [`BufferedResponse::commit`]
//! - Status defaults to 200 when an attempt only writes a body
//! - `commit` consumes the buffer, so a second commit does not type-check
//! - A body past the memory threshold is passed through: the held prefix and
//!   the unread remainder are streamed on commit, or dropped with the buffer

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use futures_util::{future, stream, StreamExt};

/// Where a proxy attempt writes its response.
pub trait ResponseSink {
    /// Set the response status.
    fn set_status(&mut self, status: StatusCode);

    /// Response headers, for the attempt to fill in.
    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Append body bytes.
    fn write_body(&mut self, chunk: &[u8]);

    /// Hand over the unread remainder of a body too large to hold.
    fn pass_through(&mut self, rest: Body);
}

/// In-memory capture of a single backend attempt.
#[derive(Debug, Default)]
pub struct BufferedResponse {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: Vec<u8>,
    rest: Option<Body>,
}

impl BufferedResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Captured status, or 200 if the attempt never set one.
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    /// True iff the captured status is exactly 200.
    pub fn is_success(&self) -> bool {
        self.status() == StatusCode::OK
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Bytes held in memory. Only a prefix when [`is_passed_through`](Self::is_passed_through).
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn is_passed_through(&self) -> bool {
        self.rest.is_some()
    }

    /// Write status, headers and body to the real client response.
    pub fn commit(self) -> Response {
        let status = self.status();
        let body = match self.rest {
            Some(rest) => {
                let held = stream::once(future::ready(Ok::<_, axum::Error>(Bytes::from(
                    self.body,
                ))));
                Body::from_stream(held.chain(rest.into_data_stream()))
            }
            None => Body::from(self.body),
        };
        let mut response = Response::new(body);
        *response.status_mut() = status;
        *response.headers_mut() = self.headers;
        response
    }
}

impl ResponseSink for BufferedResponse {
    fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_body(&mut self, chunk: &[u8]) {
        self.body.extend_from_slice(chunk);
    }

    fn pass_through(&mut self, rest: Body) {
        self.rest = Some(rest);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header;

    #[test]
    fn defaults_to_ok() {
        let mut buf = BufferedResponse::new();
        buf.write_body(b"hello");
        assert_eq!(buf.status(), StatusCode::OK);
        assert!(buf.is_success());
    }

    #[test]
    fn captures_status_and_appends_body() {
        let mut buf = BufferedResponse::new();
        buf.set_status(StatusCode::SERVICE_UNAVAILABLE);
        buf.write_body(b"try ");
        buf.write_body(b"later");
        assert!(!buf.is_success());
        assert_eq!(buf.body(), b"try later");
    }

    #[test]
    fn other_2xx_is_not_success() {
        let mut buf = BufferedResponse::new();
        buf.set_status(StatusCode::NO_CONTENT);
        assert!(!buf.is_success());
    }

    #[tokio::test]
    async fn commit_writes_everything() {
        let mut buf = BufferedResponse::new();
        buf.set_status(StatusCode::CREATED);
        buf.headers_mut()
            .insert(header::CONTENT_TYPE, "text/plain".parse().unwrap());
        buf.write_body(b"done");

        let response = buf.commit();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"done");
    }

    #[tokio::test]
    async fn commit_streams_passed_through_remainder() {
        let mut buf = BufferedResponse::new();
        buf.write_body(b"head-");
        buf.pass_through(Body::from("tail"));
        assert!(buf.is_passed_through());
        assert_eq!(buf.body(), b"head-");

        let response = buf.commit();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"head-tail");
    }
}
