/// Host suffix of the provider's storage nodes, which take the range in the URL path.
const STORAGE_HOST_SUFFIX: &str = "userstorage.mega.co.nz";

/// A ranged GET, shaped for the URL it targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangedRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

/// Build a request for bytes `start..=end` of the resource at `url`.
///
/// Storage node URLs get a `/<start>-<end>` path suffix; anything else gets a `Range` header.
pub fn ranged_request(url: &str, start: u64, end: u64) -> RangedRequest {
    if takes_path_range(url) {
        RangedRequest {
            url: format!("{}/{start}-{end}", url.trim_end_matches('/')),
            headers: Vec::new(),
        }
    } else {
        RangedRequest {
            url: url.to_string(),
            headers: vec![("Range".to_string(), format!("bytes={start}-{end}"))],
        }
    }
}

fn takes_path_range(url: &str) -> bool {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let (authority, path) = rest.split_once('/').map_or((rest, ""), |(a, p)| (a, p));
    let host = authority.rsplit('@').next().unwrap_or(authority);
    let host = host.split(':').next().unwrap_or(host);

    host.ends_with(STORAGE_HOST_SUFFIX) || path.starts_with("dl/")
}
