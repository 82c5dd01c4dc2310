//! Request handling and transformation.
//!
//! # Responsibilities
//! - Generate unique request ID (UUID v4) on ingress
//! - Buffer the inbound body so it can be replayed per attempt
//! - Prepare the request for forwarding to a backend origin
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - Body size limit enforced while buffering
//! - Inbound request is converted once; each attempt rebuilds from the copy

use std::net::SocketAddr;

use axum::body::{Body, Bytes};
use axum::extract::ConnectInfo;
use axum::http::{
    header, request::Parts, HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode, Uri,
    Version,
};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use url::Url;
use uuid::Uuid;

use crate::http::headers::{add_forwarded, strip_hop_by_hop};

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Generates UUID v4 request IDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Layer that stamps `x-request-id` on requests that lack one.
pub fn set_request_id_layer() -> SetRequestIdLayer<UuidRequestId> {
    SetRequestIdLayer::new(X_REQUEST_ID, UuidRequestId)
}

/// Layer that copies `x-request-id` onto the response.
pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::new(X_REQUEST_ID)
}

/// Read the request ID header, or "unknown".
pub fn request_id(headers: &HeaderMap) -> &str {
    headers
        .get(&X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}

/// Why an inbound request could not be prepared for forwarding.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("request body exceeds {0} bytes")]
    TooLarge(usize),

    #[error("failed to read request body: {0}")]
    Body(axum::Error),
}

impl RequestError {
    pub fn status(&self) -> StatusCode {
        match self {
            RequestError::TooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            RequestError::Body(_) => StatusCode::BAD_REQUEST,
        }
    }
}

/// A fully buffered inbound request, replayable against any backend.
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    pub method: Method,
    pub uri: Uri,
    pub version: Version,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ForwardRequest {
    /// Buffer an inbound request, enforcing `max_body_bytes`.
    pub async fn from_request(
        request: Request<Body>,
        max_body_bytes: usize,
    ) -> Result<Self, RequestError> {
        let (parts, body) = request.into_parts();
        let body = Limited::new(body, max_body_bytes)
            .collect()
            .await
            .map_err(|e| match e.downcast::<LengthLimitError>() {
                Ok(_) => RequestError::TooLarge(max_body_bytes),
                Err(e) => RequestError::Body(axum::Error::new(e)),
            })?
            .to_bytes();
        Ok(Self::from_parts(parts, body))
    }

    /// Assemble from already-split parts, preparing headers for forwarding.
    pub fn from_parts(parts: Parts, body: Bytes) -> Self {
        let client = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());

        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);
        add_forwarded(&mut headers, client);
        // The outgoing Host is derived from the backend authority.
        headers.remove(header::HOST);

        Self {
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers,
            body,
        }
    }

    /// Target URI on `origin`: the origin's base path joined with the
    /// inbound path, query preserved.
    pub fn target_uri(&self, origin: &Url) -> Result<Uri, axum::http::Error> {
        let base = origin.path().trim_end_matches('/');
        let path = self.uri.path();
        let path_and_query = match self.uri.query() {
            Some(q) => format!("{}{}?{}", base, path, q),
            None => format!("{}{}", base, path),
        };
        let authority = match origin.port() {
            Some(port) => format!("{}:{}", origin.host_str().unwrap_or_default(), port),
            None => origin.host_str().unwrap_or_default().to_string(),
        };

        Uri::builder()
            .scheme(origin.scheme())
            .authority(authority)
            .path_and_query(path_and_query)
            .build()
    }

    /// Build the outgoing request for `origin`.
    pub fn to_backend_request(&self, origin: &Url) -> Result<Request<Body>, axum::http::Error> {
        // The backend hop is always HTTP/1.1, whatever the client spoke.
        let mut builder = Request::builder()
            .method(self.method.clone())
            .version(Version::HTTP_11)
            .uri(self.target_uri(origin)?);
        if let Some(headers) = builder.headers_mut() {
            headers.extend(self.headers.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        builder.body(Body::from(self.body.clone()))
    }
}
