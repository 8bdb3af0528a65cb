//! Safe header insertion helpers.
//!
//! Compile-time header names and values for pact-proxy's custom headers, so
//! call sites never parse header strings at runtime.

use hyper::header::{HeaderName, HeaderValue};
use hyper::Response;

/// Comma-separated descriptions of the interactions a forwarded request matched.
pub static X_PACT_PROXY_INTERACTION: HeaderName =
    HeaderName::from_static("x-pact-proxy-interaction");
/// Set when a modifier rewrote the response.
pub static X_PACT_PROXY_MODIFIED: HeaderName = HeaderName::from_static("x-pact-proxy-modified");
/// Set on requests rejected before reaching the target.
pub static X_PACT_PROXY_REJECTED: HeaderName = HeaderName::from_static("x-pact-proxy-rejected");
/// Set when the target could not be reached.
pub static X_PACT_PROXY_FORWARD_ERROR: HeaderName =
    HeaderName::from_static("x-pact-proxy-forward-error");
/// Request header carrying an alias on interaction registration.
pub static X_PACT_PROXY_ALIAS: HeaderName = HeaderName::from_static("x-pact-proxy-alias");

pub static VALUE_TRUE: HeaderValue = HeaderValue::from_static("true");
pub static VALUE_JSON: HeaderValue = HeaderValue::from_static("application/json");

/// Extension trait for inserting pact-proxy headers into responses.
pub trait ProxyHeadersExt {
    /// Insert a header with a static name and value.
    fn set_header(&mut self, name: &HeaderName, value: &HeaderValue);

    /// Insert a header with a dynamic string value.
    /// Returns false if the value is not a valid header value.
    fn set_header_value(&mut self, name: &HeaderName, value: &str) -> bool;
}

impl<B> ProxyHeadersExt for Response<B> {
    fn set_header(&mut self, name: &HeaderName, value: &HeaderValue) {
        self.headers_mut().insert(name.clone(), value.clone());
    }

    fn set_header_value(&mut self, name: &HeaderName, value: &str) -> bool {
        match HeaderValue::from_str(value) {
            Ok(header_value) => {
                self.headers_mut().insert(name.clone(), header_value);
                true
            }
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::Full;
    use hyper::body::Bytes;

    #[test]
    fn test_static_header_names() {
        assert_eq!(X_PACT_PROXY_INTERACTION.as_str(), "x-pact-proxy-interaction");
        assert_eq!(X_PACT_PROXY_REJECTED.as_str(), "x-pact-proxy-rejected");
        assert_eq!(X_PACT_PROXY_ALIAS.as_str(), "x-pact-proxy-alias");
    }

    #[test]
    fn test_set_header_static() {
        let mut response = Response::new(Full::new(Bytes::new()));
        response.set_header(&X_PACT_PROXY_MODIFIED, &VALUE_TRUE);
        assert_eq!(response.headers().get(&X_PACT_PROXY_MODIFIED).unwrap(), "true");
    }

    #[test]
    fn test_set_header_value() {
        let mut response = Response::new(Full::new(Bytes::new()));
        assert!(response.set_header_value(&X_PACT_PROXY_INTERACTION, "create user, list users"));
        assert_eq!(
            response.headers().get(&X_PACT_PROXY_INTERACTION).unwrap(),
            "create user, list users"
        );
        assert!(!response.set_header_value(&X_PACT_PROXY_INTERACTION, "bad\nvalue"));
    }
}
