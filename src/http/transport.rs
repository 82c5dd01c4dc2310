//! Reverse-proxy transport.
//!
//! Forwards one buffered request to one backend origin and writes whatever
//! comes back into a [`ResponseSink`]. Transport failures are reported the way
//! a reverse proxy reports them to its client: as a 502 (or 504 on timeout)
//! written into the sink.
//!
//! Bodies up to the configured threshold are read into the sink. Past it, the
//! read prefix stays in the sink and the remainder is handed over unread, so
//! a large but otherwise valid response is relayed rather than failed.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::StatusCode;
use futures_util::StreamExt;
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::time;
use url::Url;

use crate::http::headers::strip_hop_by_hop;
use crate::http::request::ForwardRequest;
use crate::http::response::ResponseSink;

/// The proxy primitive used by the dispatcher for each attempt.
pub trait Transport: Send + Sync + 'static {
    fn forward<S>(
        &self,
        origin: &Url,
        request: &ForwardRequest,
        sink: &mut S,
    ) -> impl Future<Output = ()> + Send
    where
        S: ResponseSink + Send;
}

impl<T: Transport> Transport for Arc<T> {
    fn forward<S>(
        &self,
        origin: &Url,
        request: &ForwardRequest,
        sink: &mut S,
    ) -> impl Future<Output = ()> + Send
    where
        S: ResponseSink + Send,
    {
        (**self).forward(origin, request, sink)
    }
}

/// hyper-util backed transport with per-attempt timeout.
#[derive(Clone)]
pub struct HyperTransport {
    client: Client<HttpConnector, Body>,
    attempt_timeout: Duration,
    max_response_bytes: usize,
}

impl HyperTransport {
    pub fn new(
        connect_timeout: Duration,
        attempt_timeout: Duration,
        max_response_bytes: usize,
    ) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(connect_timeout));
        connector.set_nodelay(true);
        let client = Client::builder(TokioExecutor::new()).build(connector);
        Self {
            client,
            attempt_timeout,
            max_response_bytes,
        }
    }
}

impl Transport for HyperTransport {
    async fn forward<S>(&self, origin: &Url, request: &ForwardRequest, sink: &mut S)
    where
        S: ResponseSink + Send,
    {
        let outgoing = match request.to_backend_request(origin) {
            Ok(req) => req,
            Err(e) => {
                tracing::error!(backend = %origin, error = %e, "Failed to build upstream request");
                sink.set_status(StatusCode::BAD_GATEWAY);
                return;
            }
        };

        let exchange = async {
            let response: hyper::Response<Incoming> =
                self.client.request(outgoing).await.map_err(|e| e.to_string())?;
            let (parts, body) = response.into_parts();

            let mut data = Body::new(body).into_data_stream();
            let mut held = Vec::new();
            while let Some(chunk) = data.next().await {
                held.extend_from_slice(&chunk.map_err(|e| e.to_string())?);
                if held.len() > self.max_response_bytes {
                    return Ok((parts, held, Some(data)));
                }
            }
            Ok::<_, String>((parts, held, None))
        };

        match time::timeout(self.attempt_timeout, exchange).await {
            Ok(Ok((parts, held, rest))) => {
                sink.set_status(parts.status);
                let headers = sink.headers_mut();
                *headers = parts.headers;
                strip_hop_by_hop(headers);
                sink.write_body(&held);
                if let Some(rest) = rest {
                    tracing::debug!(
                        backend = %origin,
                        held = held.len(),
                        "Response exceeds buffer threshold, passing body through"
                    );
                    sink.pass_through(Body::from_stream(rest));
                }
            }
            Ok(Err(e)) => {
                tracing::warn!(backend = %origin, error = %e, "Upstream error");
                sink.set_status(StatusCode::BAD_GATEWAY);
            }
            Err(_) => {
                tracing::warn!(backend = %origin, timeout = ?self.attempt_timeout, "Upstream timed out");
                sink.set_status(StatusCode::GATEWAY_TIMEOUT);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::response::BufferedResponse;
    use axum::body::Bytes;
    use axum::http::{HeaderMap, Method, Uri, Version};
    use axum::routing::get;
    use axum::Router;
    use tokio::net::TcpListener;

    async fn origin(status: StatusCode, body_len: usize) -> Url {
        let app = Router::new().route(
            "/big",
            get(move || async move { (status, vec![b'x'; body_len]) }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Url::parse(&format!("http://{}", addr)).unwrap()
    }

    fn request() -> ForwardRequest {
        ForwardRequest {
            method: Method::GET,
            uri: Uri::from_static("/big"),
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    fn transport(max_response_bytes: usize) -> HyperTransport {
        HyperTransport::new(
            Duration::from_secs(1),
            Duration::from_secs(5),
            max_response_bytes,
        )
    }

    #[tokio::test]
    async fn small_body_is_held_in_memory() {
        let url = origin(StatusCode::OK, 512).await;
        let mut buf = BufferedResponse::new();
        transport(1024).forward(&url, &request(), &mut buf).await;

        assert!(buf.is_success());
        assert!(!buf.is_passed_through());
        assert_eq!(buf.body().len(), 512);
    }

    #[tokio::test]
    async fn oversized_ok_body_is_relayed_not_failed() {
        let url = origin(StatusCode::OK, 64 * 1024).await;
        let mut buf = BufferedResponse::new();
        transport(1024).forward(&url, &request(), &mut buf).await;

        assert!(buf.is_success());
        assert!(buf.is_passed_through());

        let response = buf.commit();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body.len(), 64 * 1024);
        assert!(body.iter().all(|b| *b == b'x'));
    }

    #[tokio::test]
    async fn oversized_error_body_keeps_backend_status() {
        let url = origin(StatusCode::SERVICE_UNAVAILABLE, 8 * 1024).await;
        let mut buf = BufferedResponse::new();
        transport(1024).forward(&url, &request(), &mut buf).await;

        assert_eq!(buf.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = axum::body::to_bytes(buf.commit().into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(body.len(), 8 * 1024);
    }

    #[tokio::test]
    async fn refused_connection_is_bad_gateway() {
        let url = Url::parse("http://127.0.0.1:1").unwrap();
        let mut buf = BufferedResponse::new();
        transport(1024).forward(&url, &request(), &mut buf).await;

        assert_eq!(buf.status(), StatusCode::BAD_GATEWAY);
        assert!(buf.body().is_empty());
    }
}
