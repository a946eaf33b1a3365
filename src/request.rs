//! The per-request view the binder and resolver read from.

use bytes::Bytes;
use http::HeaderMap;
use http::header::{ACCEPT, CONTENT_TYPE};
use http_body_util::BodyExt;
use hyper::body::Body;
use tokio_util::sync::CancellationToken;
use url::form_urlencoded;

use crate::auth::Principal;

/// A matched request: route values, query pairs, headers, the collected body
/// and the caller, if any.
#[derive(Debug)]
pub struct RequestContext {
    pub(crate) path: String,
    pub(crate) headers: HeaderMap,
    pub(crate) params: Vec<(String, String)>,
    pub(crate) query: Vec<(String, String)>,
    pub(crate) body: Bytes,
    pub(crate) principal: Option<Principal>,
    pub(crate) cancellation: CancellationToken,
}

impl RequestContext {
    pub(crate) fn new(
        path: String,
        raw_query: Option<&str>,
        headers: HeaderMap,
        params: Vec<(String, String)>,
        cancellation: CancellationToken,
    ) -> Self {
        let query = raw_query
            .map(|q| form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default();
        Self {
            path,
            headers,
            params,
            query,
            body: Bytes::new(),
            principal: None,
            cancellation,
        }
    }

    pub fn path(&self) -> &str { &self.path }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn params(&self) -> &[(String, String)] { &self.params }
    pub fn body(&self) -> &Bytes { &self.body }
    pub fn principal(&self) -> Option<&Principal> { self.principal.as_ref() }
    pub fn cancellation(&self) -> &CancellationToken { &self.cancellation }

    /// Header value as text. Non-UTF-8 values read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    pub fn accept(&self) -> Option<&str> {
        self.headers.get(ACCEPT).and_then(|v| v.to_str().ok())
    }

    /// Route value by name, ignoring ASCII case.
    ///
    /// For a template `/users/{id}`, `param("ID")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, name: &str) -> Option<&str> {
        first(&self.params, name)
    }

    /// First query value for `name`, ignoring ASCII case.
    pub fn query(&self, name: &str) -> Option<&str> {
        first(&self.query, name)
    }
}

fn first<'a>(pairs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum BodyError {
    #[error("request cancelled while reading the body")]
    Cancelled,

    #[error("reading request body: {0}")]
    Read(String),
}

/// Collects a request body, giving up as soon as `cancellation` fires.
pub(crate) async fn collect_body<B>(body: B, cancellation: &CancellationToken) -> Result<Bytes, BodyError>
where
    B: Body<Data = Bytes>,
    B::Error: std::fmt::Display,
{
    tokio::select! {
        biased;
        () = cancellation.cancelled() => Err(BodyError::Cancelled),
        collected = body.collect() => collected
            .map(|c| c.to_bytes())
            .map_err(|e| BodyError::Read(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use http_body_util::Full;

    use super::*;

    fn context(query: Option<&str>) -> RequestContext {
        RequestContext::new(
            "/g/1/get".to_owned(),
            query,
            HeaderMap::new(),
            vec![("grainId".to_owned(), "1".to_owned())],
            CancellationToken::new(),
        )
    }

    #[test]
    fn lookups_ignore_case() {
        let ctx = context(Some("Name=Bob&name=Alice"));
        assert_eq!(ctx.param("GRAINID"), Some("1"));
        assert_eq!(ctx.query("name"), Some("Bob"));
        assert_eq!(ctx.query("missing"), None);
    }

    #[test]
    fn query_values_are_decoded() {
        let ctx = context(Some("q=hello%20world&plus=a+b"));
        assert_eq!(ctx.query("q"), Some("hello world"));
        assert_eq!(ctx.query("plus"), Some("a b"));
    }

    #[tokio::test]
    async fn body_collection_stops_on_cancellation() {
        let token = CancellationToken::new();
        token.cancel();
        let result = collect_body(Full::new(Bytes::from_static(b"{}")), &token).await;
        assert!(matches!(result, Err(BodyError::Cancelled)));
    }

    #[tokio::test]
    async fn body_is_collected() {
        let bytes = collect_body(Full::new(Bytes::from_static(b"{}")), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(bytes, Bytes::from_static(b"{}"));
    }
}
