use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use reqwest::header::{self, HeaderMap, HeaderValue, IntoHeaderName};
use reqwest::Method;
use serde::Serialize;

use crate::{QueueError, Result};

/// Identifier of a queued request: `<unix millis>-<9 char random suffix>`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(String);

impl RequestId {
    pub(crate) fn generate() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis())
            .unwrap_or_default();
        let random = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("{millis}-{}", &random[..9]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RequestId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Transport options needed to replay a request verbatim.
#[derive(Clone, Debug, Default)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl RequestOptions {
    /// Builds options for an arbitrary method.
    pub fn method(method: Method) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    pub fn get() -> Self {
        Self::method(Method::GET)
    }

    pub fn post() -> Self {
        Self::method(Method::POST)
    }

    pub fn put() -> Self {
        Self::method(Method::PUT)
    }

    pub fn patch() -> Self {
        Self::method(Method::PATCH)
    }

    pub fn delete() -> Self {
        Self::method(Method::DELETE)
    }

    /// Sets a header, replacing any previous value for the same name.
    pub fn header<K: IntoHeaderName>(mut self, name: K, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets a raw request body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Encodes `value` as the JSON body and sets `content-type`.
    pub fn json<T: Serialize + ?Sized>(self, value: &T) -> Result<Self> {
        let encoded = serde_json::to_vec(value)
            .map_err(|err| QueueError::Encode(format!("invalid JSON body: {err}")))?;
        Ok(self
            .header(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            )
            .body(encoded))
    }
}

/// Destination and options of a queued request.
#[derive(Clone, Debug)]
pub struct RequestTarget {
    pub url: String,
    pub options: RequestOptions,
}

/// A buffered request awaiting replay.
#[derive(Clone, Debug)]
pub struct QueuedRequest {
    pub id: RequestId,
    pub target: RequestTarget,
    /// Time of first enqueue; not updated on retry.
    pub enqueued_at: SystemTime,
    /// Failed replay attempts so far.
    pub retry_count: u32,
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
    use reqwest::Method;
    use serde_json::json;

    use super::{RequestId, RequestOptions};

    #[test]
    fn generated_ids_are_time_prefixed_and_unique() {
        let ids: HashSet<RequestId> = (0..500).map(|_| RequestId::generate()).collect();
        assert_eq!(ids.len(), 500);

        let id = RequestId::generate();
        let (millis, suffix) = id
            .as_str()
            .split_once('-')
            .expect("id must contain a separator");
        assert!(millis.parse::<u128>().is_ok());
        assert_eq!(suffix.len(), 9);
        assert!(suffix.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn json_sets_body_and_content_type() {
        let options = RequestOptions::post()
            .header(AUTHORIZATION, HeaderValue::from_static("Bearer mock"))
            .json(&json!({"title": "Harvest supper"}))
            .expect("json must encode");

        assert_eq!(options.method, Method::POST);
        assert_eq!(
            options.headers.get(CONTENT_TYPE),
            Some(&HeaderValue::from_static("application/json"))
        );
        assert_eq!(
            options.body.as_deref(),
            Some(br#"{"title":"Harvest supper"}"#.as_slice())
        );
    }

    #[test]
    fn default_options_are_a_bodyless_get() {
        let options = RequestOptions::default();
        assert_eq!(options.method, Method::GET);
        assert!(options.headers.is_empty());
        assert!(options.body.is_none());
    }
}
