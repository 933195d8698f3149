use m3_common::error::{M3Error, Result};
use url::Url;

/// Validates a download URL. Only http and https are accepted; anything else
/// cannot be handed to the transfer engine.
pub fn validate_url(url_str: &str) -> Result<()> {
    let url = Url::parse(url_str)
        .map_err(|e| M3Error::ValidationError(format!("Failed to parse URL '{url_str}': {e}")))?;
    match url.scheme() {
        "https" | "http" => Ok(()),
        other => Err(M3Error::ValidationError(format!(
            "Invalid URL scheme for '{url_str}': must be http or https, but got '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_web_urls_only() {
        assert!(validate_url("https://example.org/a.jar").is_ok());
        assert!(validate_url("http://example.org/a.jar").is_ok());
        assert!(validate_url("ftp://example.org/a.jar").is_err());
        assert!(validate_url("not a url").is_err());
    }
}
