//! Request description and wire preparation.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use url::form_urlencoded;

use crate::transport::TransportConfig;

/// Common HTTP headers.
pub mod headers {
    pub const ACCEPT: &str = "Accept";
    pub const USER_AGENT: &str = "User-Agent";
    pub const CONTENT_TYPE: &str = "Content-Type";
    pub const ACCEPT_ANY: &str = "*/*";
    pub const CONTENT_TYPE_FORM: &str = "application/x-www-form-urlencoded";
}

/// Characters left untouched when quoting a path: unreserved plus `/`.
const PATH_SAFE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Host prefix of the central web frontend.
const FRONTEND_PREFIX: &str = "cmsweb";
const FRONTEND_DOMAIN: &str = ".cern.ch";
const FRONTEND_PORT: u16 = 8443;

/// HTTP verb of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    Head,
    Post,
    Put,
    Delete,
}

impl Verb {
    pub fn as_str(self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Head => "HEAD",
            Verb::Post => "POST",
            Verb::Put => "PUT",
            Verb::Delete => "DELETE",
        }
    }

    /// GET and HEAD carry their payload in the query string.
    pub fn sends_query(self) -> bool {
        matches!(self, Verb::Get | Verb::Head)
    }
}

impl std::fmt::Display for Verb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Verb> for reqwest::Method {
    fn from(verb: Verb) -> Self {
        match verb {
            Verb::Get => reqwest::Method::GET,
            Verb::Head => reqwest::Method::HEAD,
            Verb::Post => reqwest::Method::POST,
            Verb::Put => reqwest::Method::PUT,
            Verb::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Request payload, either pre-encoded or as form pairs.
///
/// Repeated keys are kept, so list values are expressed by pushing the
/// same key several times (see [`Payload::list`]).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Payload {
    #[default]
    Empty,
    Encoded(String),
    Form(Vec<(String, String)>),
}

impl Payload {
    /// Start an empty form payload.
    pub fn form() -> Self {
        Payload::Form(Vec::new())
    }

    /// Append one key/value pair.
    pub fn pair(self, key: impl Into<String>, value: impl ToString) -> Self {
        let mut pairs = self.into_pairs();
        pairs.push((key.into(), value.to_string()));
        Payload::Form(pairs)
    }

    /// Append one pair per value under the same key.
    pub fn list<I, V>(self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: ToString,
    {
        let key = key.into();
        let mut pairs = self.into_pairs();
        pairs.extend(values.into_iter().map(|v| (key.clone(), v.to_string())));
        Payload::Form(pairs)
    }

    fn into_pairs(self) -> Vec<(String, String)> {
        match self {
            Payload::Form(pairs) => pairs,
            Payload::Empty => Vec::new(),
            Payload::Encoded(encoded) => form_urlencoded::parse(encoded.as_bytes())
                .into_owned()
                .collect(),
        }
    }

    /// URL-form-encode the payload.
    pub fn encode(&self) -> String {
        match self {
            Payload::Empty => String::new(),
            Payload::Encoded(s) => s.clone(),
            Payload::Form(pairs) => form_urlencoded::Serializer::new(String::new())
                .extend_pairs(pairs.iter())
                .finish(),
        }
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Payload::Encoded(s.to_string())
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Payload::Encoded(s)
    }
}

impl<K: Into<String>, V: ToString> From<Vec<(K, V)>> for Payload {
    fn from(pairs: Vec<(K, V)>) -> Self {
        Payload::Form(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.to_string()))
                .collect(),
        )
    }
}

impl From<Option<Payload>> for Payload {
    fn from(payload: Option<Payload>) -> Self {
        payload.unwrap_or_default()
    }
}

/// One logical request: verb, service path and encoded body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSpec {
    pub verb: Verb,
    pub path: String,
    pub body: String,
}

impl RequestSpec {
    pub fn new(verb: Verb, path: impl Into<String>, payload: impl Into<Payload>) -> Self {
        Self {
            verb,
            path: path.into(),
            body: payload.into().encode(),
        }
    }
}

/// A request ready for the wire.
///
/// Built from a [`RequestSpec`] and a [`TransportConfig`]; transports only
/// ever see this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedRequest {
    pub method: Verb,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl PreparedRequest {
    pub fn new(spec: &RequestSpec, config: &TransportConfig) -> Self {
        let mut url = format!("https://{}{}", normalize_host(&config.host), quote_path(&spec.path));

        let mut headers = vec![
            (headers::USER_AGENT.to_string(), config.user_agent()),
            (headers::ACCEPT.to_string(), headers::ACCEPT_ANY.to_string()),
        ];

        let body = if spec.verb.sends_query() {
            if !spec.body.is_empty() {
                url.push('?');
                url.push_str(&spec.body);
            }
            None
        } else {
            headers.push((
                headers::CONTENT_TYPE.to_string(),
                headers::CONTENT_TYPE_FORM.to_string(),
            ));
            Some(spec.body.clone())
        };

        Self {
            method: spec.verb,
            url,
            headers,
            body,
        }
    }

    /// Value of a header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Percent-encode a service path, keeping `/` separators.
pub fn quote_path(path: &str) -> String {
    utf8_percent_encode(path, PATH_SAFE).to_string()
}

/// Normalise a configured host name into `host[:port]`.
///
/// Strips an `https://` prefix and trailing slashes. Frontend hosts without
/// an explicit port get the frontend port inserted after the domain.
pub fn normalize_host(host: &str) -> String {
    let host = host.trim();
    let host = host.strip_prefix("https://").unwrap_or(host);
    let host = host.trim_end_matches('/');

    if host.starts_with(FRONTEND_PREFIX) && !host.contains(':') {
        if let Some(idx) = host.find(FRONTEND_DOMAIN) {
            let end = idx + FRONTEND_DOMAIN.len();
            return format!("{}:{}{}", &host[..end], FRONTEND_PORT, &host[end..]);
        }
    }

    host.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportConfig;
    use test_case::test_case;

    fn config(host: &str) -> TransportConfig {
        TransportConfig::builder(host)
            .user_agent("crab-client", "3.3.2")
            .build()
    }

    #[test]
    fn test_get_puts_payload_in_query() {
        let spec = RequestSpec::new(
            Verb::Get,
            "/crabserver/prod/task",
            Payload::form().pair("subresource", "search").pair("workflow", "abc_def"),
        );
        let req = PreparedRequest::new(&spec, &config("localhost"));

        assert_eq!(req.method, Verb::Get);
        assert_eq!(
            req.url,
            "https://localhost/crabserver/prod/task?subresource=search&workflow=abc_def"
        );
        assert!(req.body.is_none());
        assert!(req.header("content-type").is_none());
    }

    #[test]
    fn test_head_behaves_like_get() {
        let spec = RequestSpec::new(Verb::Head, "/crabserver/prod/info", "a=1");
        let req = PreparedRequest::new(&spec, &config("localhost"));
        assert_eq!(req.url, "https://localhost/crabserver/prod/info?a=1");
        assert!(req.body.is_none());
    }

    #[test]
    fn test_get_without_payload_has_no_query() {
        let spec = RequestSpec::new(Verb::Get, "/crabserver/prod/info", Payload::Empty);
        let req = PreparedRequest::new(&spec, &config("localhost"));
        assert_eq!(req.url, "https://localhost/crabserver/prod/info");
    }

    #[test_case(Verb::Post ; "post")]
    #[test_case(Verb::Put ; "put")]
    #[test_case(Verb::Delete ; "delete")]
    fn test_body_verbs_send_payload_as_body(verb: Verb) {
        let spec = RequestSpec::new(
            verb,
            "/crabserver/prod/workflow",
            Payload::form().pair("workflow", "a b"),
        );
        let req = PreparedRequest::new(&spec, &config("localhost"));

        assert_eq!(req.url, "https://localhost/crabserver/prod/workflow");
        assert_eq!(req.body.as_deref(), Some("workflow=a+b"));
        assert_eq!(req.header("Content-Type"), Some(headers::CONTENT_TYPE_FORM));
    }

    #[test]
    fn test_standard_headers() {
        let spec = RequestSpec::new(Verb::Get, "/x", Payload::Empty);
        let req = PreparedRequest::new(&spec, &config("localhost"));
        assert_eq!(req.header("user-agent"), Some("crab-client/3.3.2"));
        assert_eq!(req.header("accept"), Some("*/*"));
    }

    #[test]
    fn test_path_with_spaces_is_quoted() {
        let spec = RequestSpec::new(
            Verb::Get,
            "/crabserver/prod/task name with spaces",
            Payload::Empty,
        );
        let req = PreparedRequest::new(&spec, &config("localhost"));
        assert_eq!(
            req.url,
            "https://localhost/crabserver/prod/task%20name%20with%20spaces"
        );
    }

    #[test_case("/a/b", "/a/b" ; "plain path")]
    #[test_case("/a b", "/a%20b" ; "space")]
    #[test_case("/x?y#z", "/x%3Fy%23z" ; "reserved characters")]
    #[test_case("/v1.0/my_task-~", "/v1.0/my_task-~" ; "unreserved kept")]
    #[test_case("/ü", "/%C3%BC" ; "utf8")]
    fn test_quote_path(input: &str, expected: &str) {
        assert_eq!(quote_path(input), expected);
    }

    #[test_case("cmsweb.cern.ch", "cmsweb.cern.ch:8443" ; "frontend gets port")]
    #[test_case("cmsweb-testbed.cern.ch", "cmsweb-testbed.cern.ch:8443" ; "testbed gets port")]
    #[test_case("https://cmsweb.cern.ch", "cmsweb.cern.ch:8443" ; "scheme stripped")]
    #[test_case("cmsweb.cern.ch:8443", "cmsweb.cern.ch:8443" ; "already on port")]
    #[test_case("cmsweb.cern.ch:443", "cmsweb.cern.ch:443" ; "explicit port trusted")]
    #[test_case("my-vm.cern.ch", "my-vm.cern.ch" ; "private host untouched")]
    #[test_case("localhost:8443/", "localhost:8443" ; "trailing slash")]
    fn test_normalize_host(input: &str, expected: &str) {
        assert_eq!(normalize_host(input), expected);
    }

    #[test]
    fn test_payload_encoding() {
        assert_eq!(Payload::Empty.encode(), "");
        assert_eq!(Payload::from("already=encoded").encode(), "already=encoded");
        assert_eq!(
            Payload::from(vec![("a", 1), ("b", 2)]).encode(),
            "a=1&b=2"
        );
        assert_eq!(
            Payload::form()
                .pair("workflow", "x&y")
                .list("jobids", [1, 2])
                .encode(),
            "workflow=x%26y&jobids=1&jobids=2"
        );
    }

    #[test]
    fn test_pair_on_encoded_payload_keeps_existing_pairs() {
        let payload = Payload::from("a=1").pair("b", "two words");
        assert_eq!(payload.encode(), "a=1&b=two+words");
    }
}
