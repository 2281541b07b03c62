use url::Url;

/// Methods the server accepts.
///
/// ONVIF only needs two verbs. Anything else is answered with
/// `405 Method Not Allowed` and an `Allow` header listing [`ALLOWED_METHODS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET - Retrieve a resource
    GET,
    /// POST - Submit a SOAP envelope
    POST,
}

/// Value of the `Allow` header sent with every 405.
pub const ALLOWED_METHODS: &str = "GET, POST";

impl Method {
    /// Parses an HTTP method from a string.
    ///
    /// Method names are case-sensitive.
    ///
    /// # Example
    ///
    /// ```
    /// # use onvif_server::http::request::Method;
    /// assert_eq!(Method::from_str("GET"), Some(Method::GET));
    /// assert_eq!(Method::from_str("get"), None);
    /// assert_eq!(Method::from_str("PUT"), None);
    /// ```
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "GET" => Some(Method::GET),
            "POST" => Some(Method::POST),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
        }
    }
}

/// Protocol version from the request line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    Http10,
    Http11,
}

impl Version {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "HTTP/1.0" => Some(Version::Http10),
            "HTTP/1.1" => Some(Version::Http11),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Version::Http10 => "HTTP/1.0",
            Version::Http11 => "HTTP/1.1",
        }
    }
}

/// The three request-target forms the server understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestTarget {
    /// `/path?query`
    Origin(String),
    /// `http://host/path`, kept verbatim next to the parsed URL
    Absolute { raw: String, url: Url },
    /// `*`
    Asterisk,
}

impl RequestTarget {
    /// Classifies a raw request-target.
    ///
    /// Returns `None` when the target matches none of the accepted forms.
    /// Whether `*` is acceptable for a given method is decided by the parser.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.is_empty() || raw.bytes().any(|b| b <= b' ' || b == 0x7f) {
            return None;
        }

        if raw == "*" {
            return Some(RequestTarget::Asterisk);
        }

        if raw.starts_with('/') {
            if raw.starts_with("//") {
                return None;
            }
            return Some(RequestTarget::Origin(raw.to_string()));
        }

        let url = Url::parse(raw).ok()?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return None;
        }
        Some(RequestTarget::Absolute {
            raw: raw.to_string(),
            url,
        })
    }

    /// Path component without the query string.
    pub fn path(&self) -> &str {
        match self {
            RequestTarget::Origin(raw) => raw.split('?').next().unwrap_or(raw),
            RequestTarget::Absolute { url, .. } => url.path(),
            RequestTarget::Asterisk => "*",
        }
    }

    /// The target exactly as it appeared on the request line.
    pub fn as_str(&self) -> &str {
        match self {
            RequestTarget::Origin(raw) => raw,
            RequestTarget::Absolute { raw, .. } => raw,
            RequestTarget::Asterisk => "*",
        }
    }
}

/// Ordered header collection.
///
/// Names keep their original case; lookups are case-insensitive. Duplicates
/// are preserved so the parser can validate them (e.g. a repeated `Host`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: Vec<(String, String)>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// First value for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.get_all(name).next()
    }

    pub fn get_all<'a, 'n>(
        &'a self,
        name: &'n str,
    ) -> impl Iterator<Item = &'a str> + use<'a, 'n> {
        self.entries
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn count(&self, name: &str) -> usize {
        self.get_all(name).count()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Represents a parsed HTTP request from a client.
///
/// Built fresh for every request by the parser and owned by the connection
/// until the response has been written.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub target: RequestTarget,
    pub version: Version,
    /// Request headers in arrival order
    pub headers: HeaderMap,
    /// Trailer fields that followed a chunked body
    pub trailers: HeaderMap,
    /// Decoded body (chunked bodies are reassembled)
    pub body: Vec<u8>,
    /// Declared `Content-Length`, if the request carried one
    pub content_length: Option<usize>,
}

/// Builder for constructing Request objects.
pub struct RequestBuilder {
    method: Option<Method>,
    target: Option<String>,
    version: Version,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self {
            method: None,
            target: None,
            version: Version::Http11,
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(key, value);
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn build(self) -> Result<Request, &'static str> {
        let raw = self.target.ok_or("target missing")?;
        let target = RequestTarget::parse(&raw).ok_or("invalid target")?;
        let content_length = (!self.body.is_empty()).then_some(self.body.len());
        Ok(Request {
            method: self.method.ok_or("method missing")?,
            target,
            version: self.version,
            headers: self.headers,
            trailers: HeaderMap::new(),
            body: self.body,
            content_length,
        })
    }
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Request {
    /// Looks a header up by name. Trailers are never consulted.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key)
    }

    /// Looks a chunked trailer field up by name.
    pub fn trailer(&self, key: &str) -> Option<&str> {
        self.trailers.get(key)
    }

    /// Path of the request-target, without query.
    pub fn path(&self) -> &str {
        self.target.path()
    }

    /// Media type of the body with parameters stripped, lower-cased.
    pub fn media_type(&self) -> Option<String> {
        self.header("Content-Type").map(|v| {
            v.split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase()
        })
    }

    /// Determines whether the connection should remain open after the response.
    ///
    /// HTTP/1.1 is persistent unless `Connection: close` is present. HTTP/1.0
    /// closes unless the client asked for `keep-alive`.
    pub fn keep_alive(&self) -> bool {
        let mut close = false;
        let mut keep = false;
        for value in self.headers.get_all("Connection") {
            for token in value.split(',').map(str::trim) {
                if token.eq_ignore_ascii_case("close") {
                    close = true;
                } else if token.eq_ignore_ascii_case("keep-alive") {
                    keep = true;
                }
            }
        }

        if close {
            return false;
        }
        match self.version {
            Version::Http11 => true,
            Version::Http10 => keep,
        }
    }
}
