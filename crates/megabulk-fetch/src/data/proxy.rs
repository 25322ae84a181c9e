use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyScheme {
    Http,
    Https,
    Socks4,
    Socks5,
}

impl ProxyScheme {
    pub fn as_str(self) -> &'static str {
        match self {
            ProxyScheme::Http => "http",
            ProxyScheme::Https => "https",
            ProxyScheme::Socks4 => "socks4",
            ProxyScheme::Socks5 => "socks5",
        }
    }
}

impl FromStr for ProxyScheme {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(ProxyScheme::Http),
            "https" => Ok(ProxyScheme::Https),
            "socks4" => Ok(ProxyScheme::Socks4),
            "socks5" => Ok(ProxyScheme::Socks5),
            other => Err(Error::InvalidProxy(format!("unknown scheme {other:?}"))),
        }
    }
}

/// `scheme://host:port` of a proxy; also its identity inside the pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProxyAddress {
    scheme: ProxyScheme,
    host: String,
    port: u16,
}

impl ProxyAddress {
    pub fn new(scheme: ProxyScheme, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme,
            host: host.into(),
            port,
        }
    }

    pub fn scheme(&self) -> ProxyScheme {
        self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for ProxyAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme.as_str(), self.host, self.port)
    }
}

impl FromStr for ProxyAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (scheme, rest) = s
            .split_once("://")
            .ok_or_else(|| Error::InvalidProxy(format!("{s:?} has no scheme")))?;
        let scheme: ProxyScheme = scheme.parse()?;

        let rest = rest.trim_end_matches('/');
        let (host, port) = rest
            .rsplit_once(':')
            .ok_or_else(|| Error::InvalidProxy(format!("{s:?} has no port")))?;
        if host.is_empty() || host.contains(['/', '@', ' ']) {
            return Err(Error::InvalidProxy(format!("{s:?} has a bad host")));
        }
        let port = port
            .parse()
            .map_err(|_| Error::InvalidProxy(format!("{s:?} has a bad port")))?;

        Ok(Self::new(scheme, host, port))
    }
}

/// Quality tier of a proxy. Every known proxy is in exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Untested or recently failed.
    Base,
    /// Recently successful.
    Working,
    /// Failure budget exhausted or hard failure.
    Broken,
}

/// Number of proxies per tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolCounts {
    pub base: usize,
    pub working: usize,
    pub broken: usize,
    /// Proxies currently lent out, whatever their tier.
    pub leased: usize,
}

impl PoolCounts {
    pub fn total(&self) -> usize {
        self.base + self.working + self.broken
    }
}
