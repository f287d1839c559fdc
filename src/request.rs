//! Incoming HTTP request type.

use std::collections::HashMap;

use cookie::Cookie;
use url::form_urlencoded;

use crate::method::Method;

/// An incoming HTTP request, already read off the wire by the transport.
///
/// The body is fully buffered; size limits belong to the reverse proxy.
#[derive(Clone, Debug)]
pub struct Request {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) query: Option<String>,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) body: Vec<u8>,
    pub(crate) params: HashMap<String, String>,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: None,
            headers: Vec::new(),
            body: Vec::new(),
            params: HashMap::new(),
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets an `application/x-www-form-urlencoded` body and content type.
    pub fn with_form(self, fields: &[(&str, &str)]) -> Self {
        let encoded = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields)
            .finish();
        self.with_header("content-type", "application/x-www-form-urlencoded")
            .with_body(encoded)
    }

    /// Adds a `cookie` header carrying a single `name=value` pair.
    pub fn with_cookie(self, name: &str, value: &str) -> Self {
        let cookie = Cookie::new(name, value).to_string();
        self.with_header("cookie", &cookie)
    }

    pub fn method(&self) -> Method { self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn query(&self) -> Option<&str> { self.query.as_deref() }
    pub fn headers(&self) -> &[(String, String)] { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/positions/update/{id:digits}`, `req.param("id")` on
    /// `/positions/update/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Looks up a cookie by name across every `cookie` header.
    ///
    /// A value wrapped in double quotes is returned without them.
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.headers.iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case("cookie"))
            .flat_map(|(_, v)| Cookie::split_parse(v.as_str()))
            .filter_map(Result::ok)
            .find(|c| c.name() == name)
            .map(|c| c.value_trimmed().to_owned())
    }

    /// Returns the first value of a form field from a urlencoded body.
    ///
    /// Bodies with any other content type yield `None`.
    pub fn form(&self, field: &str) -> Option<String> {
        let is_form = self.header("content-type")
            .map(|ct| ct.starts_with("application/x-www-form-urlencoded"))
            .unwrap_or(false);
        if !is_form {
            return None;
        }
        form_urlencoded::parse(&self.body)
            .find(|(k, _)| k == field)
            .map(|(_, v)| v.into_owned())
    }

    pub(crate) fn set_params(&mut self, params: HashMap<String, String>) {
        self.params = params;
    }
}
