//! HTTP transport: headers, verb tunneling, payload codecs, and error translation.
//!
//! # Design
//!
//! - Every request carries the content type, API key, request id, and optional network credentials.
//! - `PUT` and `DELETE` are tunneled as `POST` with an override header; [`Operation::wire`] is the
//!   single policy table for that mapping.
//! - Non-success responses become [`ClientError::Api`] with the server's diagnostic text attached;
//!   failures without any response become [`ClientError::Connectivity`].

use std::sync::Arc;

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, LOCATION};
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error, warn};
use url::Url;

use crate::codec::{Codec, JsonCodec};
use crate::config::{ClientConfig, NetworkCredentials};
use crate::error::{ClientError, ClientResult};

/// Header carrying the API key.
pub const HEADER_API_KEY: &str = "x-octopus-apikey";
/// Header naming the real verb of a tunneled request.
pub const HEADER_METHOD_OVERRIDE: &str = "x-http-method-override";
/// Header the server uses for a human-readable error summary.
pub const HEADER_ERROR: &str = "x-error";
/// Correlation header sent on every request.
pub const HEADER_REQUEST_ID: &str = "x-request-id";

/// Logical operation performed against a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Fetch a resource.
    Read,
    /// Create a resource.
    Create,
    /// Replace a resource.
    Update,
    /// Remove a resource.
    Delete,
}

impl Operation {
    /// Verb the server ultimately acts on.
    #[must_use]
    pub const fn verb(self) -> &'static str {
        match self {
            Self::Read => "GET",
            Self::Create => "POST",
            Self::Update => "PUT",
            Self::Delete => "DELETE",
        }
    }

    /// Method sent on the wire and the override header value, if the verb is tunneled.
    ///
    /// | operation | wire   | `X-HTTP-Method-Override` |
    /// |-----------|--------|--------------------------|
    /// | Read      | GET    | -                        |
    /// | Create    | POST   | -                        |
    /// | Update    | POST   | PUT                      |
    /// | Delete    | POST   | DELETE                   |
    #[must_use]
    pub fn wire(self) -> (Method, Option<&'static str>) {
        match self {
            Self::Read => (Method::GET, None),
            Self::Create => (Method::POST, None),
            Self::Update => (Method::POST, Some("PUT")),
            Self::Delete => (Method::POST, Some("DELETE")),
        }
    }
}

/// Successful response as received from the server.
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// Status code (always 2xx).
    pub status: StatusCode,
    /// `Location` header, when present.
    pub location: Option<String>,
    /// Response body bytes.
    pub body: Vec<u8>,
}

impl RawResponse {
    /// Body decoded lossily as text.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ServerErrorBody {
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    errors: Vec<String>,
}

/// Issues requests against absolute URIs.
pub struct Transport<C: Codec = JsonCodec> {
    client: Client,
    api_key: String,
    credentials: Option<NetworkCredentials>,
    debug: bool,
    codec: C,
}

impl Transport<JsonCodec> {
    /// Build a JSON transport from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Usage`] when the request id is not a valid header value or the
    /// HTTP client cannot be built.
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        Self::with_codec(config, JsonCodec::default())
    }
}

impl<C: Codec> Transport<C> {
    /// Build a transport using a custom codec.
    ///
    /// # Errors
    ///
    /// See [`Transport::new`].
    pub fn with_codec(config: &ClientConfig, codec: C) -> ClientResult<Self> {
        let mut default_headers = HeaderMap::new();
        let request_id = HeaderValue::from_str(&config.request_id)
            .map_err(|_| ClientError::usage("request identifier contains invalid characters"))?;
        default_headers.insert(HeaderName::from_static(HEADER_REQUEST_ID), request_id);

        let client = Client::builder()
            .timeout(config.request_timeout)
            .default_headers(default_headers)
            .build()
            .map_err(|err| ClientError::usage(format!("failed to build HTTP client: {err}")))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            credentials: config.credentials.clone(),
            debug: config.debug,
            codec,
        })
    }

    /// Codec used for payloads.
    pub const fn codec(&self) -> &C {
        &self.codec
    }

    /// Send one request and return the successful response.
    ///
    /// Operations other than [`Operation::Read`] always send a body; a missing body is sent
    /// as zero-length.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Connectivity`] when no response arrives and
    /// [`ClientError::Api`] for non-success statuses.
    pub async fn send(
        &self,
        operation: Operation,
        uri: &Url,
        body: Option<Vec<u8>>,
    ) -> ClientResult<RawResponse> {
        let (method, override_verb) = operation.wire();
        if self.debug {
            debug!(method = operation.verb(), uri = %uri, "{} {}", operation.verb(), uri);
        }

        let mut request = self
            .client
            .request(method, uri.clone())
            .header(CONTENT_TYPE, self.codec.content_type())
            .header(HEADER_API_KEY, self.api_key.as_str());
        if let Some(verb) = override_verb {
            request = request.header(HEADER_METHOD_OVERRIDE, verb);
        }
        if let Some(credentials) = &self.credentials {
            request = request.basic_auth(&credentials.username, credentials.password.as_deref());
        }
        match body {
            Some(body) => request = request.body(body),
            None if operation != Operation::Read => request = request.body(Vec::new()),
            None => {}
        }

        let connectivity = |source| ClientError::Connectivity {
            method: operation.verb().to_string(),
            uri: uri.clone(),
            source: Arc::new(source),
        };

        let response = request.send().await.map_err(connectivity)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(connectivity)?.to_vec();

        if !status.is_success() {
            return Err(self.api_error(operation, uri, status, &headers, &body));
        }

        Ok(RawResponse {
            status,
            location: header_text(&headers, LOCATION.as_str()),
            body,
        })
    }

    /// `GET` a resource and decode it.
    ///
    /// # Errors
    ///
    /// Transport errors from [`Transport::send`], or [`ClientError::Decode`] when the body does
    /// not match `T`; the raw payload is logged before the error is returned.
    pub async fn get<T: DeserializeOwned>(&self, uri: &Url) -> ClientResult<T> {
        let response = self.send(Operation::Read, uri, None).await?;
        self.decode(uri, &response.body)
    }

    /// `POST` a new resource and return the `Location` the server assigned.
    ///
    /// # Errors
    ///
    /// Transport errors, [`ClientError::Encode`], or [`ClientError::MissingLocation`] when the
    /// server does not report where the resource was created.
    pub async fn post<T: Serialize + ?Sized>(&self, uri: &Url, resource: &T) -> ClientResult<String> {
        let body = self.encode(uri, resource)?;
        let response = self.send(Operation::Create, uri, Some(body)).await?;
        match response.location {
            Some(location) if !location.trim().is_empty() => Ok(location),
            _ => Err(ClientError::MissingLocation {
                uri: uri.clone(),
                body: response.text(),
            }),
        }
    }

    /// Tunneled `PUT` of a resource. The response body is ignored.
    ///
    /// # Errors
    ///
    /// Transport errors or [`ClientError::Encode`].
    pub async fn put<T: Serialize + ?Sized>(&self, uri: &Url, resource: &T) -> ClientResult<()> {
        let body = self.encode(uri, resource)?;
        self.send(Operation::Update, uri, Some(body)).await?;
        Ok(())
    }

    /// Tunneled `DELETE` with a zero-length body.
    ///
    /// # Errors
    ///
    /// Transport errors from [`Transport::send`].
    pub async fn delete(&self, uri: &Url) -> ClientResult<()> {
        self.send(Operation::Delete, uri, None).await?;
        Ok(())
    }

    fn encode<T: Serialize + ?Sized>(&self, uri: &Url, resource: &T) -> ClientResult<Vec<u8>> {
        self.codec
            .encode(resource)
            .map_err(|source| ClientError::Encode {
                uri: uri.clone(),
                source,
            })
    }

    fn decode<T: DeserializeOwned>(&self, uri: &Url, body: &[u8]) -> ClientResult<T> {
        self.codec.decode(body).map_err(|source| {
            let body = String::from_utf8_lossy(body).into_owned();
            error!(uri = %uri, error = %source, "unable to parse HTTP response from server");
            warn!("{body}");
            ClientError::Decode {
                uri: uri.clone(),
                body,
                source,
            }
        })
    }

    fn api_error(
        &self,
        operation: Operation,
        uri: &Url,
        status: StatusCode,
        headers: &HeaderMap,
        body: &[u8],
    ) -> ClientError {
        let raw = String::from_utf8_lossy(body).trim().to_string();
        let message = header_text(headers, HEADER_ERROR)
            .filter(|text| !text.trim().is_empty())
            .or_else(|| self.structured_message(body))
            .unwrap_or_else(|| {
                if raw.is_empty() {
                    status
                        .canonical_reason()
                        .unwrap_or("request failed")
                        .to_string()
                } else {
                    raw.clone()
                }
            });

        let target = uri
            .query()
            .map_or_else(|| uri.path().to_string(), |query| format!("{}?{query}", uri.path()));

        ClientError::Api {
            status: status.as_u16(),
            method: operation.verb().to_string(),
            target,
            uri: uri.clone(),
            message,
            body: raw,
        }
    }

    fn structured_message(&self, body: &[u8]) -> Option<String> {
        let parsed: ServerErrorBody = self.codec.decode(body).ok()?;
        let message = parsed
            .error_message
            .filter(|message| !message.trim().is_empty())?;
        if parsed.errors.is_empty() {
            Some(message)
        } else {
            Some(format!("{message} {}", parsed.errors.join("; ")))
        }
    }
}

fn header_text(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tunneling_policy_matches_protocol() {
        assert_eq!(Operation::Read.wire(), (Method::GET, None));
        assert_eq!(Operation::Create.wire(), (Method::POST, None));
        assert_eq!(Operation::Update.wire(), (Method::POST, Some("PUT")));
        assert_eq!(Operation::Delete.wire(), (Method::POST, Some("DELETE")));
        assert_eq!(Operation::Update.verb(), "PUT");
    }

    #[test]
    fn header_text_ignores_missing_and_binary_values() {
        let mut headers = HeaderMap::new();
        headers.insert(HEADER_ERROR, HeaderValue::from_static("Project not found"));
        headers.insert(
            HEADER_REQUEST_ID,
            HeaderValue::from_bytes(&[0xFF, 0xFE]).expect("opaque header"),
        );
        assert_eq!(
            header_text(&headers, HEADER_ERROR).as_deref(),
            Some("Project not found")
        );
        assert_eq!(header_text(&headers, HEADER_REQUEST_ID), None);
        assert_eq!(header_text(&headers, "location"), None);
    }

    #[test]
    fn api_error_prefers_header_then_structured_body_then_raw_text() {
        let config = ClientConfig::new("http://localhost/".parse().expect("url"), "key");
        let transport = Transport::new(&config).expect("transport");
        let uri: Url = "http://localhost/api/projects/X?skip=1".parse().expect("url");

        let mut headers = HeaderMap::new();
        headers.insert(HEADER_ERROR, HeaderValue::from_static("Project not found"));
        let body = br#"{"ErrorMessage":"ignored"}"#;
        let err = transport.api_error(Operation::Read, &uri, StatusCode::NOT_FOUND, &headers, body);
        match &err {
            ClientError::Api {
                message, target, ..
            } => {
                assert_eq!(message, "Project not found");
                assert_eq!(target, "/api/projects/X?skip=1");
            }
            other => panic!("unexpected error {other:?}"),
        }

        let body = br#"{"ErrorMessage":"Validation failed","Errors":["Name is required"]}"#;
        let err = transport.api_error(
            Operation::Create,
            &uri,
            StatusCode::BAD_REQUEST,
            &HeaderMap::new(),
            body,
        );
        assert!(err.to_string().contains("Validation failed Name is required"));

        let err = transport.api_error(
            Operation::Delete,
            &uri,
            StatusCode::INTERNAL_SERVER_ERROR,
            &HeaderMap::new(),
            b"  kaboom \n",
        );
        assert!(err.to_string().contains("HTTP 500: kaboom"));
        assert!(err.to_string().contains("DELETE /api/projects/X?skip=1"));

        let err = transport.api_error(
            Operation::Read,
            &uri,
            StatusCode::SERVICE_UNAVAILABLE,
            &HeaderMap::new(),
            b"",
        );
        assert!(err.to_string().contains("Service Unavailable"));
    }
}
