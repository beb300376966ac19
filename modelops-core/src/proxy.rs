//! HTTP proxy hygiene for talking to the tracking server.
//!
//! Corporate proxies commonly intercept plain-HTTP traffic to private
//! addresses. The tracking host is therefore always exempted, and proxies can
//! be switched off altogether.

use url::Url;

/// How the HTTP client should treat proxies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyPolicy {
    /// Ignore all proxy settings.
    Disabled,
    /// Use the proxy from the environment, bypassing it for `no_proxy` hosts.
    FromEnv {
        proxy_url: Option<String>,
        no_proxy: String,
    },
}

impl ProxyPolicy {
    /// Build the policy for `tracking_uri` from an environment lookup.
    pub fn resolve<F>(tracking_uri: &Url, disable_proxies: bool, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if disable_proxies {
            return Self::Disabled;
        }
        let scheme_specific = if tracking_uri.scheme() == "https" {
            ["HTTPS_PROXY", "https_proxy"]
        } else {
            ["HTTP_PROXY", "http_proxy"]
        };
        let proxy_url = scheme_specific
            .iter()
            .chain(["ALL_PROXY", "all_proxy"].iter())
            .find_map(|var| lookup(var).filter(|v| !v.trim().is_empty()));
        let existing = lookup("NO_PROXY")
            .or_else(|| lookup("no_proxy"))
            .unwrap_or_default();
        Self::FromEnv {
            proxy_url,
            no_proxy: no_proxy_entries(tracking_uri, &existing).join(","),
        }
    }
}

/// Merge the tracking host into an existing comma-separated NO_PROXY list.
///
/// Existing entries keep their order; `host`, `host:port`, `127.0.0.1` and
/// `localhost` are appended when missing.
pub fn no_proxy_entries(tracking_uri: &Url, existing: &str) -> Vec<String> {
    let host = tracking_uri.host_str().unwrap_or("localhost");
    let port = tracking_uri
        .port_or_known_default()
        .unwrap_or(if tracking_uri.scheme() == "https" { 443 } else { 80 });

    let additions = [
        host.to_string(),
        format!("{host}:{port}"),
        "127.0.0.1".to_string(),
        "localhost".to_string(),
    ];

    let mut merged: Vec<String> = Vec::new();
    for entry in existing
        .split(',')
        .map(str::trim)
        .map(str::to_string)
        .chain(additions)
    {
        if !entry.is_empty() && !merged.contains(&entry) {
            merged.push(entry);
        }
    }
    merged
}
