use std::future::Future;

use tracing::{debug, trace};

use crate::data::{ProxyAddress, ProxyScheme};
use crate::effects::http::HttpClient;

/// Supplier of candidate proxies.
pub trait ProxySource: Send + Sync + 'static {
    /// Fetch the current candidate list. Failures of individual lists are absorbed; an empty
    /// result means nothing could be fetched.
    fn fetch(&self) -> impl Future<Output = Vec<ProxyAddress>> + Send;
}

/// One remote newline-delimited list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyList {
    pub url: String,
    /// Scheme prefixed to bare `host:port` lines; `None` when lines carry their own.
    pub scheme: Option<ProxyScheme>,
}

impl ProxyList {
    pub fn new(url: impl Into<String>, scheme: Option<ProxyScheme>) -> Self {
        Self {
            url: url.into(),
            scheme,
        }
    }
}

/// The public lists fetched by default.
pub fn default_lists() -> Vec<ProxyList> {
    vec![
        ProxyList::new(
            "https://raw.githubusercontent.com/proxifly/free-proxy-list/refs/heads/main/proxies/all/data.txt",
            None,
        ),
        ProxyList::new(
            "https://raw.githubusercontent.com/TheSpeedX/SOCKS-List/master/socks5.txt",
            Some(ProxyScheme::Socks5),
        ),
        ProxyList::new(
            "https://raw.githubusercontent.com/TheSpeedX/SOCKS-List/master/socks4.txt",
            Some(ProxyScheme::Socks4),
        ),
        ProxyList::new(
            "https://raw.githubusercontent.com/TheSpeedX/SOCKS-List/master/http.txt",
            Some(ProxyScheme::Http),
        ),
    ]
}

/// Parse one list body. Blank and unparsable lines are dropped.
pub fn parse_list(body: &str, scheme: Option<ProxyScheme>) -> Vec<ProxyAddress> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let candidate = match scheme {
                Some(scheme) if !line.contains("://") => format!("{}://{line}", scheme.as_str()),
                _ => line.to_string(),
            };
            match candidate.parse() {
                Ok(address) => Some(address),
                Err(e) => {
                    trace!(line, error = %e, "skipping proxy list entry");
                    None
                }
            }
        })
        .collect()
}

/// Fetches a set of remote lists over a direct client.
pub struct RemoteProxyLists<H> {
    client: H,
    lists: Vec<ProxyList>,
}

impl<H: HttpClient> RemoteProxyLists<H> {
    pub fn new(client: H) -> Self {
        Self::with_lists(client, default_lists())
    }

    pub fn with_lists(client: H, lists: Vec<ProxyList>) -> Self {
        Self { client, lists }
    }
}

impl<H: HttpClient> ProxySource for RemoteProxyLists<H> {
    async fn fetch(&self) -> Vec<ProxyAddress> {
        let mut found = Vec::new();
        for list in &self.lists {
            match self.client.get_text(&list.url).await {
                Ok(body) => {
                    let parsed = parse_list(&body, list.scheme);
                    debug!(url = %list.url, count = parsed.len(), "fetched proxy list");
                    found.extend(parsed);
                }
                Err(e) => debug!(url = %list.url, error = %e, "proxy list unavailable"),
            }
        }
        found
    }
}
