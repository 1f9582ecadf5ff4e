//! Execution-context classification
//!
//! Classifies the current execution context as local or hosted from
//! network-origin signals. Strategy selection in [`crate::source`] uses this
//! to decide between the snapshot and tabular-API sources.

use url::Url;

/// Execution context classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Development context: localhost, private-range address, `.local`
    /// suffix, or a local-file scheme
    Local,
    /// Anything else
    Hosted,
}

impl Environment {
    /// Classify an origin string (e.g. `https://portal.example.com`)
    ///
    /// Pure and infallible: an origin that does not parse as a URL
    /// classifies as `Hosted`, which never enables the local snapshot path
    /// by accident.
    pub fn classify(origin: &str) -> Self {
        let Ok(url) = Url::parse(origin) else {
            return Self::Hosted;
        };

        if url.scheme() == "file" {
            return Self::Local;
        }

        match url.host_str() {
            Some(host) if is_local_host(host) => Self::Local,
            _ => Self::Hosted,
        }
    }

    /// Whether this context is local
    pub fn is_local(self) -> bool {
        matches!(self, Self::Local)
    }
}

/// Host-based locality check
///
/// Matches loopback names, the RFC 1918 `10.*` and `192.168.*` ranges, and
/// mDNS-style `.local` suffixes.
fn is_local_host(host: &str) -> bool {
    let host = host.to_ascii_lowercase();
    host == "localhost"
        || host == "127.0.0.1"
        || host.starts_with("192.168.")
        || host.starts_with("10.")
        || host.ends_with(".local")
}
