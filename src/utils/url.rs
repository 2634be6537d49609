//! Endpoint URL joining.

/// Strip trailing slashes from a base URL.
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Join `endpoint` onto `base_url` with exactly one slash between them.
///
/// ```
/// use agent_chat::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("https://api.anthropic.com/", "/v1/messages"),
///     "https://api.anthropic.com/v1/messages"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let base = normalize_base_url(base_url);
    let endpoint = endpoint.trim_start_matches('/');
    format!("{base}/{endpoint}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_urls_lose_trailing_slashes() {
        assert_eq!(
            normalize_base_url("https://api.anthropic.com///"),
            "https://api.anthropic.com"
        );
        assert_eq!(
            normalize_base_url("http://localhost:8080"),
            "http://localhost:8080"
        );
    }

    #[test]
    fn endpoints_join_with_a_single_slash() {
        for base in ["https://proxy.internal/anthropic", "https://proxy.internal/anthropic/"] {
            for endpoint in ["v1/messages", "/v1/messages"] {
                assert_eq!(
                    construct_api_url(base, endpoint),
                    "https://proxy.internal/anthropic/v1/messages"
                );
            }
        }
    }
}
