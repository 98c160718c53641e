//! Login URI matching against a page URL.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use url::Url;

/// How a saved login URI is compared with the page being filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum UriMatchType {
    /// Same base domain (or an equivalent domain).
    #[default]
    Domain = 0,
    /// Same host and port.
    Host = 1,
    StartsWith = 2,
    Exact = 3,
    RegularExpression = 4,
    Never = 5,
}

wire_code_enum!(UriMatchType, "uri match type", {
    Domain = 0,
    Host = 1,
    StartsWith = 2,
    Exact = 3,
    RegularExpression = 4,
    Never = 5,
});

/// Parses a user-entered URI, assuming `http://` when no scheme is given.
pub fn parse_uri(uri: &str) -> Option<Url> {
    let trimmed = uri.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.contains("://") {
        Url::parse(trimmed).ok()
    } else {
        Url::parse(&format!("http://{trimmed}")).ok()
    }
}

/// Registrable part of a host: the last two labels, or the host itself for
/// IP addresses and single-label hosts.
pub fn base_domain(uri: &str) -> Option<String> {
    let url = parse_uri(uri)?;
    let host = url.host()?;
    match host {
        url::Host::Domain(name) => {
            let labels: Vec<&str> = name.split('.').filter(|l| !l.is_empty()).collect();
            if labels.len() <= 2 {
                Some(labels.join("."))
            } else {
                Some(labels[labels.len() - 2..].join("."))
            }
        }
        other => Some(other.to_string()),
    }
}

/// Host including an explicit port, e.g. `example.com:8443`.
pub fn host_with_port(uri: &str) -> Option<String> {
    let url = parse_uri(uri)?;
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// Whether `login_uri` matches `page_url` under `match_type`.
///
/// `equivalent_domains` lists base domains the account treats as the same
/// site as the page (e.g. `google.com` and `youtube.com`).
pub fn uri_matches(
    login_uri: &str,
    match_type: UriMatchType,
    page_url: &str,
    equivalent_domains: &HashSet<String>,
) -> bool {
    match match_type {
        UriMatchType::Domain => {
            let (Some(login), Some(page)) = (base_domain(login_uri), base_domain(page_url)) else {
                return false;
            };
            login == page || equivalent_domains.contains(&login)
        }
        UriMatchType::Host => match (host_with_port(login_uri), host_with_port(page_url)) {
            (Some(login), Some(page)) => login == page,
            _ => false,
        },
        UriMatchType::StartsWith => page_url.starts_with(login_uri),
        UriMatchType::Exact => page_url == login_uri,
        UriMatchType::RegularExpression => Regex::new(login_uri)
            .map(|re| re.is_match(page_url))
            .unwrap_or(false),
        UriMatchType::Never => false,
    }
}
