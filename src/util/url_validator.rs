use std::net::IpAddr;
use thiserror::Error;
use url::Url;

/// Errors that can occur during URL validation.
///
/// Parsing failures apply to every request. The host checks only apply when
/// the private-host guard is enabled.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed as an absolute URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL has no host component.
    #[error("URL has no host")]
    MissingHost,
    /// The URL points to a private/internal IP address.
    #[error("Private IP address not allowed: {0}")]
    PrivateIp(String),
    /// The URL points to localhost.
    #[error("Localhost not allowed")]
    Localhost,
}

/// Validates a feed URL before it is handed to the HTTP client.
///
/// Always requires an absolute `http`/`https` URL with a host. When
/// `deny_private_hosts` is set, additionally rejects:
/// - Localhost addresses (`localhost`, `127.0.0.1`, `::1`)
/// - Private IP ranges (RFC 1918, link-local, unique local IPv6)
/// - The unspecified address (`0.0.0.0`, `::`)
///
/// Only IP literals are checked; hostnames are not resolved here.
///
/// # Examples
///
/// ```
/// use feedbridge::util::validate_url;
///
/// let url = validate_url("https://example.com/feed.xml", true).unwrap();
/// assert_eq!(url.host_str(), Some("example.com"));
///
/// // Relative URLs and non-HTTP schemes are always rejected
/// assert!(validate_url("/feed.xml", false).is_err());
/// assert!(validate_url("file:///etc/passwd", false).is_err());
///
/// // Private hosts only with the guard enabled
/// assert!(validate_url("http://192.168.1.1/feed", false).is_ok());
/// assert!(validate_url("http://192.168.1.1/feed", true).is_err());
/// ```
pub fn validate_url(url_str: &str, deny_private_hosts: bool) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str.trim())?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    let host = url.host_str().ok_or(UrlValidationError::MissingHost)?;

    if !deny_private_hosts {
        return Ok(url);
    }

    if host.eq_ignore_ascii_case("localhost") {
        return Err(UrlValidationError::Localhost);
    }

    // Strip brackets from IPv6 addresses for parsing
    let host_for_parse = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);

    if let Ok(ip) = host_for_parse.parse::<IpAddr>() {
        if ip.is_loopback() {
            return Err(UrlValidationError::Localhost);
        }
        if is_private_ip(&ip) {
            return Err(UrlValidationError::PrivateIp(ip.to_string()));
        }
    }

    Ok(url)
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => {
            ipv4.is_private() || ipv4.is_loopback() || ipv4.is_link_local() || ipv4.is_unspecified()
        }
        IpAddr::V6(ipv6) => {
            if ipv6.is_loopback() || ipv6.is_unspecified() {
                return true;
            }
            let segments = ipv6.segments();
            // Unique Local (fc00::/7)
            let is_unique_local = (segments[0] & 0xfe00) == 0xfc00;
            // Link-Local (fe80::/10)
            let is_link_local = (segments[0] & 0xffc0) == 0xfe80;
            is_unique_local || is_link_local
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_urls() {
        assert!(validate_url("https://example.com/feed.xml", true).is_ok());
        assert!(validate_url("http://news.example.org", true).is_ok());
        assert!(validate_url("https://example.com:443/feed.xml?format=rss", true).is_ok());
    }

    #[test]
    fn test_surrounding_whitespace_trimmed() {
        let url = validate_url("  https://example.com/rss \n", false).unwrap();
        assert_eq!(url.as_str(), "https://example.com/rss");
    }

    #[test]
    fn test_relative_url_rejected() {
        let result = validate_url("/feed.xml", false);
        assert!(matches!(result, Err(UrlValidationError::InvalidUrl(_))));

        let result = validate_url("example.com/feed.xml", false);
        assert!(matches!(result, Err(UrlValidationError::InvalidUrl(_))));
    }

    #[test]
    fn test_invalid_schemes() {
        assert!(matches!(
            validate_url("file:///etc/passwd", false),
            Err(UrlValidationError::UnsupportedScheme(s)) if s == "file"
        ));
        assert!(validate_url("ftp://example.com", false).is_err());
        assert!(validate_url("mailto:someone@example.com", false).is_err());
    }

    #[test]
    fn test_private_hosts_allowed_without_guard() {
        assert!(validate_url("http://localhost/feed", false).is_ok());
        assert!(validate_url("http://127.0.0.1:8080/feed", false).is_ok());
        assert!(validate_url("http://10.0.0.1/feed", false).is_ok());
    }

    #[test]
    fn test_localhost_rejected() {
        assert!(matches!(
            validate_url("http://localhost/feed", true),
            Err(UrlValidationError::Localhost)
        ));
        assert!(validate_url("http://LOCALHOST/feed", true).is_err());
        assert!(validate_url("http://127.0.0.1/feed", true).is_err());
    }

    #[test]
    fn test_private_ips_rejected() {
        assert!(validate_url("http://192.168.1.1/feed", true).is_err());
        assert!(validate_url("http://10.0.0.1/feed", true).is_err());
        assert!(validate_url("http://172.16.0.1/feed", true).is_err());
    }

    #[test]
    fn test_ipv6_loopback_rejected() {
        let result = validate_url("http://[::1]/feed", true);
        assert!(result.is_err());
    }

    #[test]
    fn test_link_local_rejected() {
        assert!(validate_url("http://169.254.1.1/feed", true).is_err());
        assert!(validate_url("http://[fe80::1]/feed", true).is_err());
    }

    #[test]
    fn test_zero_address_rejected() {
        let result = validate_url("http://0.0.0.0/feed", true);
        assert!(result.is_err());
    }

    #[test]
    fn test_url_with_port_on_private_ip() {
        assert!(validate_url("http://192.168.1.1:8080/feed", true).is_err());
        assert!(validate_url("http://10.0.0.1:3000/feed", true).is_err());
    }
}
