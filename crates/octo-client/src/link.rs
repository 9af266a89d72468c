//! Link resolution against the configured server base address.
//!
//! # Design
//!
//! - Pure: the resolver owns only its base URI and never touches the network.
//! - Links may carry URI-template expressions; [`expand_link`] fills them and the resolver
//!   drops any left unexpanded.
//! - Query merging is last-writer-wins per key, so repeated resolution never duplicates a
//!   parameter.

use url::Url;
use url::form_urlencoded::byte_serialize;

use crate::error::{ClientError, ClientResult};

/// Ordered query parameters where each key appears at most once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryString {
    pairs: Vec<(String, String)>,
}

impl QueryString {
    /// Empty query string.
    #[must_use]
    pub const fn new() -> Self {
        Self { pairs: Vec::new() }
    }

    /// Builder-style [`QueryString::set`].
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.set(key, value);
        self
    }

    /// Set `key` to `value`, replacing any existing value for the same key.
    pub fn set(&mut self, key: impl Into<String>, value: impl ToString) {
        let key = key.into();
        let value = value.to_string();
        if let Some(position) = self.pairs.iter().position(|(existing, _)| *existing == key) {
            self.pairs[position].1 = value;
            let mut index = position + 1;
            while index < self.pairs.len() {
                if self.pairs[index].0 == key {
                    self.pairs.remove(index);
                } else {
                    index += 1;
                }
            }
        } else {
            self.pairs.push((key, value));
        }
    }

    /// Value for `key`, if present.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value.as_str())
    }

    /// Whether no parameters are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Iterate over `(key, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    fn from_url(url: &Url) -> Self {
        let mut query = Self::new();
        for (key, value) in url.query_pairs() {
            query.set(key.into_owned(), value);
        }
        query
    }
}

/// Maps relative or templated resource paths to absolute request URIs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkResolver {
    base: Url,
}

impl LinkResolver {
    /// Build a resolver for a server address.
    ///
    /// A trailing `/api` segment is stripped so both `http://host/` and `http://host/api`
    /// address the same server; any virtual directory prefix is kept.
    #[must_use]
    pub fn new(server: &Url) -> Self {
        let mut base = server.clone();
        base.set_query(None);
        base.set_fragment(None);

        let trimmed = base.path().trim_end_matches('/');
        let trimmed = trimmed.strip_suffix("/api").unwrap_or(trimmed);
        let path = format!("{trimmed}/");
        base.set_path(&path);

        Self { base }
    }

    /// Base URI every relative link is resolved against.
    #[must_use]
    pub const fn base(&self) -> &Url {
        &self.base
    }

    /// Resolve `path` to an absolute URI.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Usage`] for an empty path and [`ClientError::InvalidUri`] when
    /// the path cannot be joined to the base.
    pub fn resolve(&self, path: &str) -> ClientResult<Url> {
        let link = expand_link(path.trim(), &[]);
        if link.is_empty() {
            return Err(ClientError::usage("a resource path is required"));
        }

        let invalid = |source| ClientError::InvalidUri {
            value: path.to_string(),
            source,
        };

        if let Ok(absolute) = Url::parse(&link) {
            return Ok(absolute);
        }

        if let Some(relative) = link.strip_prefix("~/") {
            return self.base.join(relative).map_err(invalid);
        }

        let prefix = self.base.path();
        if link.starts_with('/') && prefix != "/" && !link.starts_with(prefix) {
            return self
                .base
                .join(link.trim_start_matches('/'))
                .map_err(invalid);
        }

        self.base.join(&link).map_err(invalid)
    }

    /// Resolve `path` and merge `query` into whatever query it already carries.
    ///
    /// Supplied values override existing values with the same key.
    ///
    /// # Errors
    ///
    /// See [`LinkResolver::resolve`].
    pub fn resolve_with_query(&self, path: &str, query: &QueryString) -> ClientResult<Url> {
        let mut uri = self.resolve(path)?;
        if query.is_empty() {
            return Ok(uri);
        }

        let mut merged = QueryString::from_url(&uri);
        for (key, value) in query.iter() {
            merged.set(key, value);
        }
        uri.query_pairs_mut().clear().extend_pairs(merged.iter());
        Ok(uri)
    }

    /// Browser URL for a path on the server's web interface.
    ///
    /// # Errors
    ///
    /// See [`LinkResolver::resolve`].
    pub fn web_link(&self, path: &str) -> ClientResult<Url> {
        let relative = path.trim().trim_start_matches('/');
        let relative = if relative.is_empty() { "app" } else { relative };
        self.base
            .join(relative)
            .map_err(|source| ClientError::InvalidUri {
                value: path.to_string(),
                source,
            })
    }
}

/// Expand URI-template expressions in a server link.
///
/// Supports `{name}`, `{/name}`, `{?a,b}` and `{&a}`; variables without a value
/// are omitted, so `expand_link(template, &[])` strips every expression.
#[must_use]
pub fn expand_link(template: &str, values: &[(&str, &str)]) -> String {
    let lookup = |name: &str| {
        values
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| *value)
    };

    let mut output = String::with_capacity(template.len());
    let mut rest = template;
    let mut has_query = template.split('{').next().is_some_and(|head| head.contains('?'));

    while let Some(open) = rest.find('{') {
        output.push_str(&rest[..open]);
        let Some(close) = rest[open..].find('}') else {
            output.push_str(&rest[open..]);
            return output;
        };
        let expression = &rest[open + 1..open + close];
        rest = &rest[open + close + 1..];

        let (operator, names) = match expression.chars().next() {
            Some(op @ ('/' | '?' | '&')) => (Some(op), &expression[1..]),
            _ => (None, expression),
        };

        for name in names.split(',').map(str::trim).filter(|name| !name.is_empty()) {
            let Some(value) = lookup(name) else {
                continue;
            };
            let encoded: String = byte_serialize(value.as_bytes()).collect();
            match operator {
                Some('/') => {
                    output.push('/');
                    output.push_str(&encoded);
                }
                Some('?' | '&') => {
                    output.push(if has_query { '&' } else { '?' });
                    has_query = true;
                    output.push_str(name);
                    output.push('=');
                    output.push_str(&encoded);
                }
                _ => output.push_str(&encoded),
            }
        }
    }
    output.push_str(rest);
    output
}
