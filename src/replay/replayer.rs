//! Selects the recorded exchange that answers a live request.

use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use http::header::{
    HeaderName, CONTENT_TYPE, SERVER, X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS, X_XSS_PROTECTION,
};
use http::{HeaderMap, Method, StatusCode, Uri};
use thiserror::Error;

use super::index::{is_mutating, ReplayIndex, StoredExchange};
use super::matcher::{body_equal, query_equal, IgnoreNothing, QueryFilter, QueryParams};

/// Response headers copied from the recording; everything else is dropped.
pub const REPLAYED_HEADERS: [HeaderName; 5] = [
    CONTENT_TYPE,
    SERVER,
    X_CONTENT_TYPE_OPTIONS,
    X_FRAME_OPTIONS,
    X_XSS_PROTECTION,
];

/// Why a live request could not be answered from the recordings.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("404 page not found: no recorded exchange for path {path}")]
    NotFound { path: String },

    #[error("404 url query is not matched: no query-matching exchange for {path}?{query}")]
    NoQueryMatch { path: String, query: QueryParams },

    #[error("request body is not the same for {method} {path}")]
    BodyMismatch { method: Method, path: String },

    #[error("not implemented")]
    NotConfigured,
}

impl ReplayError {
    pub fn status(&self) -> StatusCode {
        match self {
            ReplayError::NotFound { .. } | ReplayError::NoQueryMatch { .. } => StatusCode::NOT_FOUND,
            ReplayError::BodyMismatch { .. } => StatusCode::BAD_REQUEST,
            ReplayError::NotConfigured => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ReplayError::NotFound { .. } => "path_not_found",
            ReplayError::NoQueryMatch { .. } => "query_mismatch",
            ReplayError::BodyMismatch { .. } => "body_mismatch",
            ReplayError::NotConfigured => "not_configured",
        }
    }
}

impl IntoResponse for ReplayError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

/// What gets written back for a matched recording.
#[derive(Debug, Clone)]
pub struct ReplayedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl IntoResponse for ReplayedResponse {
    fn into_response(self) -> Response {
        (self.status, self.headers, self.body).into_response()
    }
}

/// Answers live requests from a [`ReplayIndex`].
pub struct Replayer {
    index: ReplayIndex,
    filter: Box<dyn QueryFilter>,
}

impl Replayer {
    pub fn new(index: ReplayIndex) -> Self {
        Self {
            index,
            filter: Box::new(IgnoreNothing),
        }
    }

    /// Replace the hook deciding which unrecorded live query keys are ignored.
    pub fn with_filter(mut self, filter: impl QueryFilter + 'static) -> Self {
        self.filter = Box::new(filter);
        self
    }

    pub fn index(&self) -> &ReplayIndex {
        &self.index
    }

    /// First recording for the path whose query and (for POST/PUT) body match.
    ///
    /// A body mismatch on the first query match is final: later recordings are
    /// not consulted.
    pub fn find(
        &self,
        method: &Method,
        uri: &Uri,
        body: &[u8],
    ) -> Result<&StoredExchange, ReplayError> {
        let path = uri.path();
        let candidates = self.index.candidates(path);
        if candidates.is_empty() {
            return Err(ReplayError::NotFound {
                path: path.to_string(),
            });
        }

        let query = QueryParams::from_uri(uri);
        for candidate in candidates {
            if !query_equal(&query, candidate.query(), self.filter.as_ref()) {
                continue;
            }
            if is_mutating(method) && !body_equal(body, candidate.request_body()) {
                return Err(ReplayError::BodyMismatch {
                    method: method.clone(),
                    path: path.to_string(),
                });
            }
            return Ok(candidate);
        }

        tracing::warn!(
            path = %path,
            query = %query,
            recorded = ?candidates.iter().map(|c| c.query().to_string()).collect::<Vec<_>>(),
            "No recorded query matches"
        );
        Err(ReplayError::NoQueryMatch {
            path: path.to_string(),
            query,
        })
    }

    /// Stored status, allow-listed headers, and stored body for the match.
    pub fn replay(
        &self,
        method: &Method,
        uri: &Uri,
        body: &[u8],
    ) -> Result<ReplayedResponse, ReplayError> {
        let exchange = self.find(method, uri, body)?;
        let recorded = exchange.response();

        let mut headers = HeaderMap::new();
        for name in &REPLAYED_HEADERS {
            for value in recorded.headers().get_all(name) {
                headers.append(name.clone(), value.clone());
            }
        }

        Ok(ReplayedResponse {
            status: recorded.status(),
            headers,
            body: exchange.response_body().clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::matcher::IgnoreKeys;

    const GET_DUMP: &str = "GET /api/vx?page=1&size=10 HTTP/1.1\r\nHost: www.abc.com\r\n\r\n\
        HTTP/1.1 200 OK\r\nContent-Type: application/json;charset=utf-8\r\n\
        X-Xss-Protection: 1; mode=block\r\nX-Request-Id: 123\r\nSet-Cookie: a=b\r\n\r\n{\"items\":[]}";
    const GET_PAGE_2: &str = "GET /api/vx?page=2 HTTP/1.1\r\n\r\nHTTP/1.1 200 OK\r\n\r\n{\"items\":[2]}";
    const POST_DUMP: &str = "POST /rest/?op=save HTTP/1.1\r\n\r\n{\"id\":1}\r\n\
        HTTP/1.1 201 Created\r\nServer: nginx\r\n\r\n{\"status_code\":200}";
    const POST_OTHER: &str = "POST /rest/?op=save HTTP/1.1\r\n\r\n{\"id\":2}\r\n\
        HTTP/1.1 201 Created\r\n\r\n{\"status_code\":201}";

    fn replayer(dumps: &[&str]) -> Replayer {
        let exchanges = dumps
            .iter()
            .map(|raw| StoredExchange::from_dump(raw.as_bytes()).unwrap());
        Replayer::new(ReplayIndex::from_exchanges(exchanges))
    }

    fn uri(s: &str) -> Uri {
        s.parse().unwrap()
    }

    #[test]
    fn test_replays_status_filtered_headers_and_body() {
        let replayer = replayer(&[GET_DUMP]);
        let replayed = replayer
            .replay(&Method::GET, &uri("/api/vx?page=1"), b"")
            .unwrap();

        assert_eq!(replayed.status, StatusCode::OK);
        assert_eq!(replayed.body.as_ref(), b"{\"items\":[]}");
        assert_eq!(
            replayed.headers[CONTENT_TYPE],
            "application/json;charset=utf-8"
        );
        assert_eq!(replayed.headers[X_XSS_PROTECTION], "1; mode=block");
        assert!(replayed.headers.get("x-request-id").is_none());
        assert!(replayed.headers.get("set-cookie").is_none());
        assert_eq!(replayed.headers.len(), 2);
    }

    #[test]
    fn test_unrecorded_path_is_not_found() {
        let replayer = replayer(&[GET_DUMP]);
        let err = replayer.find(&Method::GET, &uri("/api/other"), b"").unwrap_err();

        assert!(matches!(err, ReplayError::NotFound { ref path } if path == "/api/other"));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert!(replayer.index().candidates("/api/other").is_empty());
    }

    #[test]
    fn test_query_selects_candidate_in_order() {
        let replayer = replayer(&[GET_DUMP, GET_PAGE_2]);

        let second = replayer.find(&Method::GET, &uri("/api/vx?page=2"), b"").unwrap();
        assert_eq!(second.response_body().as_ref(), b"{\"items\":[2]}");

        // No live query: the first recording wins.
        let first = replayer.find(&Method::GET, &uri("/api/vx"), b"").unwrap();
        assert_eq!(first.response_body().as_ref(), b"{\"items\":[]}");
    }

    #[test]
    fn test_unmatched_query_is_not_found() {
        let replayer = replayer(&[GET_DUMP, GET_PAGE_2]);
        let err = replayer
            .find(&Method::GET, &uri("/api/vx?page=3"), b"")
            .unwrap_err();

        match &err {
            ReplayError::NoQueryMatch { path, query } => {
                assert_eq!(path, "/api/vx");
                assert_eq!(query.get("page"), Some(&["3".to_string()][..]));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_ignored_query_keys() {
        let replayer = replayer(&[GET_PAGE_2]).with_filter(IgnoreKeys::new(["_"]));
        assert!(replayer
            .find(&Method::GET, &uri("/api/vx?page=2&_=1700000000"), b"")
            .is_ok());
    }

    #[test]
    fn test_post_body_equality() {
        let replayer = replayer(&[POST_DUMP, POST_OTHER]);

        let matched = replayer
            .replay(&Method::POST, &uri("/rest/?op=save"), b"  { \"id\" : 1 }\n")
            .unwrap();
        assert_eq!(matched.status, StatusCode::CREATED);
        assert_eq!(matched.headers[SERVER], "nginx");
    }

    #[test]
    fn test_post_body_mismatch_is_conclusive() {
        // The second recording would match, but the first query match decides.
        let replayer = replayer(&[POST_DUMP, POST_OTHER]);
        let err = replayer
            .find(&Method::POST, &uri("/rest/?op=save"), b"{\"id\":2}")
            .unwrap_err();

        assert!(matches!(err, ReplayError::BodyMismatch { .. }));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "request body is not the same for POST /rest/");
    }

    #[test]
    fn test_get_ignores_body() {
        let replayer = replayer(&[GET_DUMP]);
        assert!(replayer
            .find(&Method::GET, &uri("/api/vx"), b"anything")
            .is_ok());
    }

    #[test]
    fn test_matching_is_deterministic() {
        let replayer = replayer(&[GET_DUMP, GET_PAGE_2, POST_DUMP]);
        let live = uri("/api/vx?page=2");

        let first = replayer.find(&Method::GET, &live, b"").unwrap() as *const StoredExchange;
        for _ in 0..10 {
            let again = replayer.find(&Method::GET, &live, b"").unwrap() as *const StoredExchange;
            assert_eq!(first, again);
        }
    }
}
