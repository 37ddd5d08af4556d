//! Address: the backend-tagged string that names a stash.
//!
//! Three wire shapes exist:
//!
//! ```text
//! <scheme>://<namespace>/<name>.<32-hex-digest>   content-addressed (mem, s3)
//! <scheme>://<namespace>/<name>?data=<base64>     inline (payload embedded)
//! https://<host>/<path>[?query]                   url (read-only fetch)
//! ```
//!
//! `namespace` and `name` of the first two shapes must match
//! `[A-Za-z0-9][A-Za-z0-9_-]{0,39}`. Formatting is the exact inverse of a
//! successful parse; addresses get printed and passed around, so the bytes
//! must be reproducible.

use std::fmt;
use std::sync::OnceLock;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use regex::Regex;
use url::form_urlencoded;
use url::Url;

use crate::digest::Digest;
use crate::error::{StashError, StashResult};

/// Longest namespace or name segment.
pub const IDENTIFIER_MAX_LEN: usize = 40;

/// Query key that carries the inline payload.
pub const INLINE_DATA_KEY: &str = "data";

const SCHEME_SEPARATOR: &str = "://";

fn identifier_regex() -> &'static Regex {
    static IDENTIFIER: OnceLock<Regex> = OnceLock::new();
    IDENTIFIER.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]{0,39}$").expect("identifier regex is valid")
    })
}

/// Whether `s` is a valid namespace or name segment.
pub fn is_identifier(s: &str) -> bool {
    identifier_regex().is_match(s)
}

fn check_identifier(address: &str, what: &str, segment: &str) -> StashResult<()> {
    if is_identifier(segment) {
        Ok(())
    } else {
        Err(StashError::invalid_address(
            address,
            format!(
                "{} '{}' must be 1-{} characters of [A-Za-z0-9_-] starting with a letter or digit",
                what, segment, IDENTIFIER_MAX_LEN
            ),
        ))
    }
}

/// Extract the scheme without validating the rest of the address.
///
/// Used to pick a backend before that backend does the full parse. Fails if
/// there is no `://` separator or the scheme is not alphanumeric.
pub fn scheme_of(address: &str) -> StashResult<&str> {
    let (scheme, _) = address
        .split_once(SCHEME_SEPARATOR)
        .ok_or_else(|| StashError::invalid_address(address, "missing scheme separator '://'"))?;
    if scheme.is_empty() || !scheme.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(StashError::invalid_address(address, "missing or malformed scheme"));
    }
    Ok(scheme)
}

/// The grammar a backend uses for its addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressShape {
    /// `<scheme>://<namespace>/<name>.<digest>`
    ContentAddressed,
    /// `<scheme>://<namespace>/<name>?data=<base64>`
    Inline,
    /// `<scheme>://<host>/<path>[?query]`
    Url,
}

/// A parsed, validated address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    scheme: String,
    namespace: String,
    name: String,
    digest: Option<Digest>,
    extra: Vec<(String, String)>,
    /// Query exactly as written; only url addresses carry one.
    query: Option<String>,
}

impl Address {
    /// Build a content-addressed address, validating both identifiers.
    pub fn content_addressed(
        scheme: &str,
        namespace: &str,
        name: &str,
        digest: Digest,
    ) -> StashResult<Self> {
        let address = Self {
            scheme: scheme.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
            digest: Some(digest),
            extra: Vec::new(),
            query: None,
        };
        address.validate_identifiers()?;
        Ok(address)
    }

    /// Build an inline address carrying `payload` as base64.
    pub fn inline(scheme: &str, namespace: &str, name: &str, payload: &[u8]) -> StashResult<Self> {
        let address = Self {
            scheme: scheme.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
            digest: None,
            extra: vec![(INLINE_DATA_KEY.to_string(), BASE64.encode(payload))],
            query: None,
        };
        address.validate_identifiers()?;
        Ok(address)
    }

    /// Parse `address` with the grammar of `shape`, requiring `scheme`.
    pub fn parse(address: &str, scheme: &str, shape: AddressShape) -> StashResult<Self> {
        match shape {
            AddressShape::ContentAddressed => Self::parse_content_addressed(address, scheme),
            AddressShape::Inline => Self::parse_inline(address, scheme),
            AddressShape::Url => Self::parse_url(address, scheme),
        }
    }

    fn strip_scheme<'a>(address: &'a str, scheme: &str) -> StashResult<&'a str> {
        let found = scheme_of(address)?;
        if found != scheme {
            return Err(StashError::invalid_address(
                address,
                format!("expected scheme '{}', found '{}'", scheme, found),
            ));
        }
        Ok(&address[scheme.len() + SCHEME_SEPARATOR.len()..])
    }

    fn parse_content_addressed(address: &str, scheme: &str) -> StashResult<Self> {
        let rest = Self::strip_scheme(address, scheme)?;
        let (namespace, path) = rest
            .split_once('/')
            .ok_or_else(|| StashError::invalid_address(address, "missing name segment"))?;
        check_identifier(address, "namespace", namespace)?;

        let (name, digest) = path
            .rsplit_once('.')
            .ok_or_else(|| StashError::invalid_address(address, "missing '.<digest>' suffix"))?;
        check_identifier(address, "name", name)?;
        let digest = Digest::from_str_checked(digest)
            .map_err(|e| StashError::invalid_address(address, e.to_string()))?;

        Ok(Self {
            scheme: scheme.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
            digest: Some(digest),
            extra: Vec::new(),
            query: None,
        })
    }

    fn parse_inline(address: &str, scheme: &str) -> StashResult<Self> {
        let rest = Self::strip_scheme(address, scheme)?;
        let (path, query) = rest
            .split_once('?')
            .ok_or_else(|| StashError::invalid_address(address, "missing '?data=' payload"))?;
        let (namespace, name) = path
            .split_once('/')
            .ok_or_else(|| StashError::invalid_address(address, "missing name segment"))?;
        check_identifier(address, "namespace", namespace)?;
        check_identifier(address, "name", name)?;

        let extra: Vec<(String, String)> = form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();
        match extra.as_slice() {
            [(key, payload)] if key == INLINE_DATA_KEY => {
                let decoded = BASE64
                    .decode(payload)
                    .map_err(|e| StashError::invalid_address(address, format!("bad base64: {}", e)))?;
                if decoded.is_empty() {
                    return Err(StashError::invalid_address(address, "empty inline payload"));
                }
            }
            _ => {
                return Err(StashError::invalid_address(
                    address,
                    "query must be exactly 'data=<base64>'",
                ))
            }
        }

        let parsed = Self {
            scheme: scheme.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
            digest: None,
            extra,
            query: None,
        };
        if parsed.to_string() != address {
            return Err(StashError::invalid_address(
                address,
                "payload is not canonically encoded",
            ));
        }
        Ok(parsed)
    }

    /// Url addresses are validated with `url` but kept as written: the
    /// authority, path and query are sliced out of the input so the address
    /// formats back to the exact bytes the caller gave (signed query strings
    /// stay valid).
    fn parse_url(address: &str, scheme: &str) -> StashResult<Self> {
        let rest = Self::strip_scheme(address, scheme)?;
        if address.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(StashError::invalid_address(
                address,
                "whitespace and control characters are not allowed",
            ));
        }
        let url = Url::parse(address)
            .map_err(|e| StashError::invalid_address(address, e.to_string()))?;

        if !url.username().is_empty() || url.password().is_some() {
            return Err(StashError::invalid_address(address, "credentials are not allowed"));
        }
        if url.fragment().is_some() {
            return Err(StashError::invalid_address(address, "fragments are not allowed"));
        }
        if url.host_str().is_none() {
            return Err(StashError::invalid_address(address, "missing host"));
        }

        let (before_query, query) = match rest.split_once('?') {
            Some((before, query)) => (before, Some(query)),
            None => (rest, None),
        };
        let (authority, name) = before_query
            .split_once('/')
            .ok_or_else(|| StashError::invalid_address(address, "missing path"))?;
        if authority.is_empty() {
            return Err(StashError::invalid_address(address, "missing host"));
        }
        if name.is_empty() {
            return Err(StashError::invalid_address(address, "missing path"));
        }

        Ok(Self {
            scheme: scheme.to_string(),
            namespace: authority.to_string(),
            name: name.to_string(),
            digest: None,
            extra: url.query_pairs().into_owned().collect(),
            query: query.map(str::to_string),
        })
    }

    fn validate_identifiers(&self) -> StashResult<()> {
        let rendered = self.to_string();
        check_identifier(&rendered, "namespace", &self.namespace)?;
        check_identifier(&rendered, "name", &self.name)
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Content digest, present only on content-addressed addresses.
    pub fn digest(&self) -> Option<&Digest> {
        self.digest.as_ref()
    }

    pub fn extra(&self) -> &[(String, String)] {
        &self.extra
    }

    /// First value stored under `key` in the extra pairs.
    pub fn extra_value(&self, key: &str) -> Option<&str> {
        self.extra
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Raw query string of a url address.
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Decoded inline payload, if this address carries one.
    pub fn inline_payload(&self) -> StashResult<Option<Vec<u8>>> {
        match self.extra_value(INLINE_DATA_KEY) {
            Some(payload) => BASE64
                .decode(payload)
                .map(Some)
                .map_err(|e| StashError::invalid_address(self.to_string(), format!("bad base64: {}", e))),
            None => Ok(None),
        }
    }

    /// Path segment after the namespace: `name` or `name.digest`.
    pub fn key(&self) -> String {
        match &self.digest {
            Some(digest) => format!("{}.{}", self.name, digest),
            None => self.name.clone(),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}/{}", self.scheme, self.namespace, self.key())?;
        if let Some(query) = &self.query {
            write!(f, "?{}", query)?;
        } else if !self.extra.is_empty() {
            let query = form_urlencoded::Serializer::new(String::new())
                .extend_pairs(self.extra.iter())
                .finish();
            write!(f, "?{}", query)?;
        }
        Ok(())
    }
}
