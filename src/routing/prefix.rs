//! URL prefix patterns.
//!
//! # Responsibilities
//! - Parse and normalize `scheme://host[:port]/path/` prefixes
//! - Match inbound request URLs against a prefix
//! - Rank overlapping prefixes (longest path, then host class)
//!
//! # Design Decisions
//! - Host matching is case-insensitive, path matching is case-sensitive
//! - Port is always explicit after parsing (scheme default when omitted)
//! - No regex: matching is a scheme/port compare plus a string prefix test

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};
use url::Url;

use crate::error::{QueueError, QueueResult};

/// URL scheme accepted in prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }
}

/// Host part of a prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HostPattern {
    /// `+`: matches every host and takes precedence over named hosts.
    Strong,
    /// `*`: matches every host not claimed by a more specific registration.
    Weak,
    /// Explicit host name or address, lowercased.
    Named(String),
}

impl HostPattern {
    fn parse(raw: &str, input: &str) -> QueueResult<Self> {
        match raw {
            "" => Err(QueueError::invalid_prefix(input, "empty host")),
            "+" => Ok(HostPattern::Strong),
            "*" => Ok(HostPattern::Weak),
            _ => {
                let valid = if let Some(inner) = raw.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
                    !inner.is_empty() && inner.chars().all(|c| c.is_ascii_hexdigit() || c == ':' || c == '.')
                } else {
                    raw.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
                };
                if !valid {
                    return Err(QueueError::invalid_prefix(input, format!("invalid host '{}'", raw)));
                }
                Ok(HostPattern::Named(raw.to_ascii_lowercase()))
            }
        }
    }

    /// Returns true if a request for `host` is covered by this pattern.
    pub fn matches(&self, host: &str) -> bool {
        match self {
            HostPattern::Strong | HostPattern::Weak => true,
            HostPattern::Named(expected) => host.eq_ignore_ascii_case(expected),
        }
    }

    /// Precedence among patterns with equal path length (higher wins).
    pub fn rank(&self) -> u8 {
        match self {
            HostPattern::Strong => 3,
            HostPattern::Named(_) => 2,
            HostPattern::Weak => 1,
        }
    }

    /// True if every host matched by `other` is also matched by `self`.
    pub fn covers(&self, other: &HostPattern) -> bool {
        match (self, other) {
            (HostPattern::Strong | HostPattern::Weak, _) => true,
            (HostPattern::Named(a), HostPattern::Named(b)) => a == b,
            (HostPattern::Named(_), _) => false,
        }
    }
}

impl fmt::Display for HostPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostPattern::Strong => f.write_str("+"),
            HostPattern::Weak => f.write_str("*"),
            HostPattern::Named(host) => f.write_str(host),
        }
    }
}

/// A normalized URL prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UrlPrefix {
    scheme: Scheme,
    host: HostPattern,
    port: u16,
    path: String,
}

impl UrlPrefix {
    /// Parse and normalize a prefix string.
    ///
    /// The path always ends with `/` after normalization, so `http://+:80/api` and
    /// `http://+:80/api/` are the same prefix.
    pub fn parse(input: &str) -> QueueResult<Self> {
        if input.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(QueueError::invalid_prefix(input, "contains whitespace"));
        }

        let (scheme, rest) = input
            .split_once("://")
            .ok_or_else(|| QueueError::invalid_prefix(input, "missing '://'"))?;
        let scheme = match scheme.to_ascii_lowercase().as_str() {
            "http" => Scheme::Http,
            "https" => Scheme::Https,
            other => {
                return Err(QueueError::invalid_prefix(input, format!("unsupported scheme '{}'", other)))
            }
        };

        if rest.contains('?') || rest.contains('#') {
            return Err(QueueError::invalid_prefix(input, "query or fragment not allowed"));
        }

        let (authority, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, "/"),
        };

        let (host_raw, port_raw) = if authority.starts_with('[') {
            let close = authority
                .find(']')
                .ok_or_else(|| QueueError::invalid_prefix(input, "unterminated IPv6 host"))?;
            let after = &authority[close + 1..];
            let port = match after {
                "" => None,
                p => Some(
                    p.strip_prefix(':')
                        .ok_or_else(|| QueueError::invalid_prefix(input, "garbage after IPv6 host"))?,
                ),
            };
            (&authority[..=close], port)
        } else {
            match authority.rsplit_once(':') {
                Some((h, p)) => (h, Some(p)),
                None => (authority, None),
            }
        };

        let host = HostPattern::parse(host_raw, input)?;
        let port = match port_raw {
            None => scheme.default_port(),
            Some(p) => match p.parse::<u16>() {
                Ok(0) | Err(_) => {
                    return Err(QueueError::invalid_prefix(input, format!("invalid port '{}'", p)))
                }
                Ok(port) => port,
            },
        };

        let mut path = path.to_string();
        if !path.ends_with('/') {
            path.push('/');
        }
        let segments: Vec<&str> = path.split('/').collect();
        let inner = &segments[1..segments.len() - 1];
        if inner.iter().any(|s| s.is_empty() || *s == "." || *s == "..") {
            return Err(QueueError::invalid_prefix(input, "path has empty or relative segments"));
        }

        Ok(Self {
            scheme,
            host,
            port,
            path,
        })
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn host(&self) -> &HostPattern {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns true if the request URL falls under this prefix.
    ///
    /// A request for `/api` matches the prefix `/api/`.
    pub fn matches(&self, url: &Url) -> bool {
        if url.scheme() != self.scheme.as_str() {
            return false;
        }
        if url.port_or_known_default() != Some(self.port) {
            return false;
        }
        match url.host_str() {
            Some(host) if self.host.matches(host) => {}
            _ => return false,
        }
        let path = url.path();
        path.starts_with(&self.path)
            || (self.path.len() == path.len() + 1 && self.path.starts_with(path))
    }

    /// True if `other` is this prefix or a narrower one underneath it.
    pub fn contains(&self, other: &UrlPrefix) -> bool {
        self.scheme == other.scheme
            && self.port == other.port
            && self.host.covers(&other.host)
            && other.path.starts_with(&self.path)
    }

    /// Ordering key for longest-match selection.
    pub fn specificity(&self) -> (usize, u8) {
        (self.path.len(), self.host.rank())
    }
}

impl fmt::Display for UrlPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}{}", self.scheme.as_str(), self.host, self.port, self.path)
    }
}

impl FromStr for UrlPrefix {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for UrlPrefix {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_parse_normalizes() {
        let p = UrlPrefix::parse("HTTP://Example.COM/api").unwrap();
        assert_eq!(p.scheme(), Scheme::Http);
        assert_eq!(p.host(), &HostPattern::Named("example.com".into()));
        assert_eq!(p.port(), 80);
        assert_eq!(p.path(), "/api/");
        assert_eq!(p.to_string(), "http://example.com:80/api/");

        assert_eq!(
            UrlPrefix::parse("http://+:8080/").unwrap(),
            UrlPrefix::parse("http://+:8080").unwrap()
        );
        assert_eq!(UrlPrefix::parse("https://*/").unwrap().port(), 443);
        assert_eq!(UrlPrefix::parse("http://[::1]:9000/x/").unwrap().port(), 9000);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in [
            "ftp://+:21/",
            "+:80/",
            "http://:80/",
            "http://+:0/",
            "http://+:99999/",
            "http://+:abc/",
            "http://+:80/a//b/",
            "http://+:80/a/../b/",
            "http://+:80/a?b=c",
            "http://ho st:80/",
            "http://[::1/",
        ] {
            assert!(
                matches!(UrlPrefix::parse(bad), Err(QueueError::InvalidPrefix { .. })),
                "expected InvalidPrefix for {}",
                bad
            );
        }
    }

    #[test]
    fn test_matches() {
        let p = UrlPrefix::parse("http://+:8080/api/").unwrap();
        assert!(p.matches(&url("http://anything:8080/api/v1")));
        assert!(p.matches(&url("http://anything:8080/api")));
        assert!(!p.matches(&url("http://anything:8080/apis")));
        assert!(!p.matches(&url("http://anything:8081/api/")));
        assert!(!p.matches(&url("https://anything:8080/api/")));

        let named = UrlPrefix::parse("http://example.com/").unwrap();
        assert!(named.matches(&url("http://EXAMPLE.com/x")));
        assert!(!named.matches(&url("http://other.com/x")));
    }

    #[test]
    fn test_path_is_case_sensitive() {
        let p = UrlPrefix::parse("http://+:80/Api/").unwrap();
        assert!(!p.matches(&url("http://h/api/")));
    }

    #[test]
    fn test_contains() {
        let root = UrlPrefix::parse("http://+:8080/").unwrap();
        let api = UrlPrefix::parse("http://example.com:8080/api/").unwrap();
        assert!(root.contains(&api));
        assert!(!api.contains(&root));
        assert!(!root.contains(&UrlPrefix::parse("http://+:9090/api/").unwrap()));
        assert!(root.contains(&root));
    }

    #[test]
    fn test_specificity() {
        let strong = UrlPrefix::parse("http://+:80/").unwrap();
        let named = UrlPrefix::parse("http://h:80/").unwrap();
        let weak = UrlPrefix::parse("http://*:80/").unwrap();
        let deep = UrlPrefix::parse("http://*:80/a/").unwrap();
        assert!(strong.specificity() > named.specificity());
        assert!(named.specificity() > weak.specificity());
        assert!(deep.specificity() > strong.specificity());
    }
}
