//! URL path composition: a `/`-overloading segment builder plus the
//! `scheme://host[:port]path?query` assembly step run by the Network Task.

use std::collections::BTreeMap;
use std::ops::Div;

use crate::error::Error;

/// A sequence of path segments, built by chaining `/`.
///
/// `UrlPath::new("v1") / "users" / id` concatenates losslessly; each segment
/// is percent-encoded independently so a segment containing `/` doesn't
/// silently introduce a new path component.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlPath {
    segments: Vec<String>,
}

impl UrlPath {
    pub fn new(first: impl Into<String>) -> Self {
        Self {
            segments: vec![first.into()],
        }
    }

    pub fn root() -> Self {
        Self { segments: Vec::new() }
    }

    fn rendered(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            out.push('/');
            out.push_str(&url::form_urlencoded::byte_serialize(segment.as_bytes()).collect::<String>());
        }
        if out.is_empty() {
            out.push('/');
        }
        out
    }
}

impl<S: Into<String>> Div<S> for UrlPath {
    type Output = UrlPath;

    fn div(mut self, segment: S) -> UrlPath {
        self.segments.push(segment.into());
        self
    }
}

/// Assembles `scheme://host[:port]{path}?{query}` and parses it with the
/// `url` crate so malformed hosts/paths fail here rather than at the
/// transport layer.
pub fn compose(
    scheme: &str,
    host: &str,
    port: Option<u16>,
    path: &UrlPath,
    query: Option<&BTreeMap<String, String>>,
) -> Result<url::Url, Error> {
    let authority = match port {
        Some(p) => format!("{host}:{p}"),
        None => host.to_string(),
    };
    let raw = format!("{scheme}://{authority}{}", path.rendered());
    let mut url = url::Url::parse(&raw).map_err(|e| Error::InvalidUrl(e.to_string()))?;

    if let Some(query) = query {
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in query {
                pairs.append_pair(k, v);
            }
        }
    }

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segments_concatenate_losslessly() {
        let path = UrlPath::new("v1") / "users" / "42";
        assert_eq!(path.rendered(), "/v1/users/42");
    }

    #[test]
    fn root_renders_as_single_slash() {
        assert_eq!(UrlPath::root().rendered(), "/");
    }

    #[test]
    fn compose_with_query() {
        let mut query = BTreeMap::new();
        query.insert("a".to_string(), "1".to_string());
        query.insert("b".to_string(), "two words".to_string());
        let url = compose("https", "example.com", None, &(UrlPath::new("ping")), Some(&query)).unwrap();
        assert_eq!(url.host_str(), Some("example.com"));
        assert_eq!(url.path(), "/ping");
        let pairs: Vec<_> = url.query_pairs().collect();
        assert!(pairs.iter().any(|(k, v)| k == "a" && v == "1"));
        assert!(pairs.iter().any(|(k, v)| k == "b" && v == "two words"));
    }

    #[test]
    fn compose_with_port() {
        let url = compose("http", "localhost", Some(8080), &UrlPath::new("health"), None).unwrap();
        assert_eq!(url.port(), Some(8080));
    }

    #[test]
    fn invalid_host_fails() {
        let err = compose("https", "", None, &UrlPath::root(), None);
        assert!(err.is_err());
    }
}
