//! Immutable per-resolver fetch configuration
//!
//! A [`FetchConfig`] describes one upstream address authority: how to reach
//! it (method, base URL, query/body templates, headers) and how to read its
//! answers (address and TTL extraction programs). It is built once at
//! configuration time, validated up front, and shared read-only across
//! concurrent lookups; the core never re-validates it.

use reqwest::Method;

use crate::error::ConfigError;

/// Configuration for one upstream HTTP address backend.
///
/// Query and body templates substitute the lookup key at every `{key}`
/// placeholder (see [`crate::request`]). Headers are raw `"Name: Value"`
/// strings parsed at request-build time.
///
/// # Examples
///
/// ```
/// use fetchdns::config::FetchConfig;
///
/// let config = FetchConfig::new("https://svc/ip/")
///     .unwrap()
///     .with_query_template("name={key}")
///     .with_header("X-Token: abc")
///     .with_address_extractor("fromJSON(body).ip_address")
///     .with_ttl_extractor("fromJSON(body).ttl");
/// assert_eq!(config.base_url, "https://svc/ip/");
/// ```
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// HTTP method for the outbound request (GET by default).
    pub method: Method,
    /// Endpoint base URL (required).
    pub base_url: String,
    /// Query-string template appended to the base URL on each lookup.
    pub query_template: Option<String>,
    /// Request body template; `None` sends no body.
    pub body_template: Option<String>,
    /// Raw `"Name: Value"` header specs, applied in order.
    pub headers: Vec<String>,
    /// Program extracting the address from the response body; `None` uses the
    /// body verbatim.
    pub address_extractor: Option<String>,
    /// Program extracting the TTL in seconds; `None` uses the default TTL.
    pub ttl_extractor: Option<String>,
}

impl FetchConfig {
    /// Creates a GET configuration for `base_url` with no templates, headers,
    /// or extractors.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ConfigError> {
        let base_url = base_url.into();
        if base_url.is_empty() {
            return Err(ConfigError::MissingUrl);
        }
        Ok(Self {
            method: Method::GET,
            base_url,
            query_template: None,
            body_template: None,
            headers: Vec::new(),
            address_extractor: None,
            ttl_extractor: None,
        })
    }

    /// Builds a configuration from `(option, value)` pairs using the
    /// recognized option set: `url`, `method`, `query`, `body`, `header`
    /// (repeatable), `analyze_ip`, `analyze_ttl`.
    ///
    /// This is the seam for line-oriented configuration front ends: they
    /// tokenize their own grammar and hand the recognized pairs here, so the
    /// core sees only a validated, immutable value.
    pub fn from_options<'a, I>(options: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut url = None;
        let mut method = Method::GET;
        let mut query = None;
        let mut body = None;
        let mut headers = Vec::new();
        let mut analyze_ip = None;
        let mut analyze_ttl = None;

        for (name, value) in options {
            match name {
                "url" => url = Some(value.to_string()),
                "method" => method = parse_method(value)?,
                "query" => query = Some(value.to_string()),
                "body" => body = Some(value.to_string()),
                "header" => headers.push(value.to_string()),
                "analyze_ip" => analyze_ip = Some(value.to_string()),
                "analyze_ttl" => analyze_ttl = Some(value.to_string()),
                other => return Err(ConfigError::UnknownOption(other.to_string())),
            }
        }

        let mut config = Self::new(url.ok_or(ConfigError::MissingUrl)?)?;
        config.method = method;
        config.query_template = query;
        config.body_template = body;
        config.headers = headers;
        config.address_extractor = analyze_ip;
        config.ttl_extractor = analyze_ttl;
        Ok(config)
    }

    /// Sets the HTTP method.
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Sets the query-string template.
    pub fn with_query_template(mut self, template: impl Into<String>) -> Self {
        self.query_template = Some(template.into());
        self
    }

    /// Sets the request body template.
    pub fn with_body_template(mut self, template: impl Into<String>) -> Self {
        self.body_template = Some(template.into());
        self
    }

    /// Appends a `"Name: Value"` header spec.
    pub fn with_header(mut self, spec: impl Into<String>) -> Self {
        self.headers.push(spec.into());
        self
    }

    /// Sets the address extraction program.
    pub fn with_address_extractor(mut self, source: impl Into<String>) -> Self {
        self.address_extractor = Some(source.into());
        self
    }

    /// Sets the TTL extraction program.
    pub fn with_ttl_extractor(mut self, source: impl Into<String>) -> Self {
        self.ttl_extractor = Some(source.into());
        self
    }
}

/// Parses an HTTP method name, case-insensitively.
pub fn parse_method(name: &str) -> Result<Method, ConfigError> {
    Method::from_bytes(name.to_uppercase().as_bytes())
        .map_err(|_| ConfigError::InvalidMethod(name.to_string()))
}
