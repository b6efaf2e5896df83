use std::fmt;

/// HTTP methods used against the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-call options for [`RequestClient::call`](crate::client::RequestClient::call).
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Query parameters appended after the defaults.
    pub params: Vec<(String, String)>,
    /// JSON body, sent for POST.
    pub body: Option<serde_json::Value>,
    /// Extra headers (not signed).
    pub headers: Vec<(String, String)>,
    /// Skip the identity-derived default query parameters.
    pub no_default_params: bool,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn json(body: serde_json::Value) -> Self {
        Self {
            body: Some(body),
            ..Self::default()
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn without_default_params(mut self) -> Self {
        self.no_default_params = true;
        self
    }
}

/// A fully signed request ready for a [`Transport`](crate::traits::Transport).
#[derive(Debug, Clone)]
pub struct OutgoingRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl OutgoingRequest {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Raw response handed back by a transport, before envelope checking.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn ok_json(value: &serde_json::Value) -> Self {
        Self::new(200, value.to_string())
    }

    /// First 500 characters of the body, for log lines.
    pub fn summary(&self) -> &str {
        match self.body.char_indices().nth(500) {
            Some((idx, _)) => &self.body[..idx],
            None => &self.body,
        }
    }
}
