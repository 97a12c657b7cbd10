//! URL safety guard to prevent SSRF (Server-Side Request Forgery)
//!
//! Pure, synchronous validation applied to any externally supplied URL before
//! it is dereferenced or stored as an upstream target. Hostnames are not
//! resolved, so a public name that later resolves to a private address passes;
//! DNS rebinding is a documented limitation of this check.

use std::net::{Ipv4Addr, Ipv6Addr};
use thiserror::Error;
use url::{Host, Url};

/// Why a URL was rejected by the safety policy
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UrlPolicyViolation {
    #[error("Invalid URL format")]
    BadFormat,

    #[error("Scheme \"{0}\" is not allowed. Only http and https are supported.")]
    DisallowedScheme(String),

    #[error("URL has no host")]
    MissingHost,

    #[error("Requests to localhost are not allowed")]
    Localhost,

    #[error("Requests to private IP addresses are not allowed")]
    PrivateAddress,
}

/// Validate an externally supplied URL against the SSRF policy
pub fn validate_url(raw: &str) -> Result<(), UrlPolicyViolation> {
    let parsed = Url::parse(raw).map_err(|_| UrlPolicyViolation::BadFormat)?;

    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(UrlPolicyViolation::DisallowedScheme(other.to_string())),
    }

    match parsed.host().ok_or(UrlPolicyViolation::MissingHost)? {
        Host::Domain(name) => {
            let name = name.to_ascii_lowercase();
            if name == "localhost" || name.ends_with(".localhost") {
                return Err(UrlPolicyViolation::Localhost);
            }
        }
        Host::Ipv4(addr) => {
            if is_special_ipv4(addr) {
                return Err(UrlPolicyViolation::PrivateAddress);
            }
        }
        Host::Ipv6(addr) => {
            if addr.is_loopback() {
                return Err(UrlPolicyViolation::Localhost);
            }
            if is_special_ipv6(addr) {
                return Err(UrlPolicyViolation::PrivateAddress);
            }
        }
    }

    Ok(())
}

/// Private and special-use IPv4 ranges that must never be dereferenced
fn is_special_ipv4(addr: Ipv4Addr) -> bool {
    addr.is_loopback()                // 127.0.0.0/8
        || addr.is_private()          // 10/8, 172.16/12, 192.168/16
        || addr.is_link_local()       // 169.254.0.0/16
        || addr.octets()[0] == 0      // 0.0.0.0/8 "current network"
        || addr.is_multicast()        // 224.0.0.0/4
        || addr.octets()[0] >= 240    // 240.0.0.0/4 reserved, incl. broadcast
}

/// Private and special-use IPv6 addresses
fn is_special_ipv6(addr: Ipv6Addr) -> bool {
    if addr.is_unspecified() || addr.to_ipv4_mapped().is_some() {
        return true;
    }

    let first = addr.segments()[0];
    (first & 0xffc0) == 0xfe80        // fe80::/10 link-local
        || (first & 0xfe00) == 0xfc00 // fc00::/7 unique local
        || (first & 0xff00) == 0xff00 // ff00::/8 multicast
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_urls_are_valid() {
        assert!(validate_url("https://api.example.com").is_ok());
        assert!(validate_url("http://example.com:8080/webhook?x=1").is_ok());
        assert!(validate_url("https://8.8.8.8/dns-query").is_ok());
    }

    #[test]
    fn test_bad_format() {
        assert_eq!(validate_url("not a url"), Err(UrlPolicyViolation::BadFormat));
        assert_eq!(validate_url(""), Err(UrlPolicyViolation::BadFormat));
        // Relative URLs are not absolute URLs
        assert_eq!(
            validate_url("/path/only"),
            Err(UrlPolicyViolation::BadFormat)
        );
    }

    #[test]
    fn test_disallowed_schemes() {
        assert_eq!(
            validate_url("ftp://example.com"),
            Err(UrlPolicyViolation::DisallowedScheme("ftp".to_string()))
        );
        assert_eq!(
            validate_url("file:///etc/passwd"),
            Err(UrlPolicyViolation::DisallowedScheme("file".to_string()))
        );
        assert_eq!(
            validate_url("gopher://example.com"),
            Err(UrlPolicyViolation::DisallowedScheme("gopher".to_string()))
        );
    }

    #[test]
    fn test_localhost_rejected() {
        assert_eq!(
            validate_url("http://localhost:8080"),
            Err(UrlPolicyViolation::Localhost)
        );
        assert_eq!(
            validate_url("https://LOCALHOST"),
            Err(UrlPolicyViolation::Localhost)
        );
        assert_eq!(
            validate_url("http://app.localhost"),
            Err(UrlPolicyViolation::Localhost)
        );
        assert_eq!(
            validate_url("http://[::1]"),
            Err(UrlPolicyViolation::Localhost)
        );
    }

    #[test]
    fn test_private_ipv4_rejected() {
        for url in [
            "http://127.0.0.1",
            "http://127.255.255.254",
            "http://10.0.0.1",
            "http://172.16.0.1",
            "http://172.31.255.255",
            "http://192.168.1.1",
            "http://169.254.169.254",
            "http://0.0.0.0",
            "http://224.0.0.1",
            "http://240.0.0.1",
            "http://255.255.255.255",
        ] {
            assert_eq!(
                validate_url(url),
                Err(UrlPolicyViolation::PrivateAddress),
                "{} should be rejected",
                url
            );
        }
    }

    #[test]
    fn test_borderline_ipv4_allowed() {
        // Just outside 172.16.0.0/12
        assert!(validate_url("http://172.15.0.1").is_ok());
        assert!(validate_url("http://172.32.0.1").is_ok());
        // Just outside 240.0.0.0/4
        assert!(validate_url("http://239.255.255.255").is_err()); // still multicast
        assert!(validate_url("http://223.255.255.255").is_ok());
    }

    #[test]
    fn test_private_ipv6_rejected() {
        for url in [
            "http://[::]",
            "http://[::ffff:127.0.0.1]",
            "http://[::ffff:8.8.8.8]",
            "http://[fe80::1]",
            "http://[fc00::1]",
            "http://[fd12:3456::1]",
            "http://[ff02::1]",
        ] {
            assert_eq!(
                validate_url(url),
                Err(UrlPolicyViolation::PrivateAddress),
                "{} should be rejected",
                url
            );
        }
    }

    #[test]
    fn test_public_ipv6_allowed() {
        assert!(validate_url("http://[2001:db8::1]").is_ok());
        assert!(validate_url("https://[2606:4700::6810:84e5]").is_ok());
    }

    #[test]
    fn test_hostname_resolution_not_performed() {
        // A public hostname that may resolve to a private address still passes;
        // DNS rebinding is out of scope for this synchronous check.
        assert!(validate_url("https://internal.example.com").is_ok());
    }
}
