//! User-Agent strings for media requests.

/// Project URL carried in the default User-Agent.
const PROJECT_UA_URL: &str = "https://github.com/fierce/ads-downloader";

/// Browser User-Agent used by the direct-link fallback.
///
/// CDNs that reject tool traffic usually accept a request that looks like the
/// page's own media fetch.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Default User-Agent for content fetches (identifies the tool).
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("ads-downloader/{version} (+{PROJECT_UA_URL})")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_user_agent_names_tool_and_version() {
        let ua = default_user_agent();
        assert!(ua.starts_with("ads-downloader/"));
        assert!(ua.contains(env!("CARGO_PKG_VERSION")));
        assert!(ua.contains(PROJECT_UA_URL));
    }

    #[test]
    fn test_browser_user_agent_looks_like_a_browser() {
        assert!(BROWSER_USER_AGENT.starts_with("Mozilla/5.0"));
        assert!(!BROWSER_USER_AGENT.contains("ads-downloader"));
    }
}
