use axum::http::{header, HeaderMap};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};

const FINGERPRINT_DELIMITER: &str = "|";

pub(crate) const PLATFORM_HEADER: &str = "sec-ch-ua-platform";
pub(crate) const CANVAS_FP_HEADER: &str = "x-canvas-fp";
pub(crate) const WEBGL_FP_HEADER: &str = "x-webgl-fp";
pub(crate) const FONTS_FP_HEADER: &str = "x-fonts-fp";

/// Request-scoped signals used to bind an exam token to a browser.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ClientInfo {
    pub(crate) ip: String,
    pub(crate) user_agent: String,
    pub(crate) accept: String,
    pub(crate) accept_language: String,
    pub(crate) platform: String,
    pub(crate) canvas_fp: String,
    pub(crate) webgl_fp: String,
    pub(crate) fonts_fp: String,
}

impl ClientInfo {
    pub(crate) fn from_headers(headers: &HeaderMap, peer_ip: Option<&str>) -> Self {
        Self {
            ip: client_ip(headers, peer_ip),
            user_agent: header_str(headers, header::USER_AGENT.as_str()),
            accept: header_str(headers, header::ACCEPT.as_str()),
            accept_language: header_str(headers, header::ACCEPT_LANGUAGE.as_str()),
            platform: header_str(headers, PLATFORM_HEADER),
            canvas_fp: header_str(headers, CANVAS_FP_HEADER),
            webgl_fp: header_str(headers, WEBGL_FP_HEADER),
            fonts_fp: header_str(headers, FONTS_FP_HEADER),
        }
    }

    /// SHA-256 over the ordered browser signals, base64url without padding.
    ///
    /// The four transport fields are always present (possibly empty); the
    /// client-computed fragments are appended only when supplied. The IP is
    /// not part of the fingerprint.
    pub(crate) fn fingerprint(&self) -> String {
        let mut material = [
            self.user_agent.as_str(),
            self.accept.as_str(),
            self.accept_language.as_str(),
            self.platform.as_str(),
        ]
        .join(FINGERPRINT_DELIMITER);

        for fragment in [&self.canvas_fp, &self.webgl_fp, &self.fonts_fp] {
            if !fragment.is_empty() {
                material.push_str(FINGERPRINT_DELIMITER);
                material.push_str(fragment);
            }
        }

        let digest = Sha256::digest(material.as_bytes());
        URL_SAFE_NO_PAD.encode(digest)
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .unwrap_or_default()
}

fn client_ip(headers: &HeaderMap, peer_ip: Option<&str>) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|value| value.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').map(str::trim).find(|item| !item.is_empty()) {
            return first.to_string();
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip").and_then(|value| value.to_str().ok()) {
        let trimmed = real_ip.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    peer_ip.unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn sample() -> ClientInfo {
        ClientInfo {
            ip: "10.0.0.1".to_string(),
            user_agent: "Mozilla/5.0".to_string(),
            accept: "application/json".to_string(),
            accept_language: "en-US".to_string(),
            platform: "\"Linux\"".to_string(),
            ..ClientInfo::default()
        }
    }

    #[test]
    fn fingerprint_is_stable_and_ignores_ip() {
        let first = sample();
        let mut second = sample();
        second.ip = "192.168.1.20".to_string();

        assert_eq!(first.fingerprint(), second.fingerprint());
        assert_eq!(first.fingerprint().len(), 43);
    }

    #[test]
    fn fingerprint_matches_delimited_digest() {
        let info = sample();
        let expected =
            URL_SAFE_NO_PAD.encode(Sha256::digest(b"Mozilla/5.0|application/json|en-US|\"Linux\""));
        assert_eq!(info.fingerprint(), expected);
    }

    #[test]
    fn optional_fragments_change_fingerprint_only_when_present() {
        let base = sample();
        let mut with_canvas = sample();
        with_canvas.canvas_fp = "canvas-hash".to_string();

        assert_ne!(base.fingerprint(), with_canvas.fingerprint());

        let expected = URL_SAFE_NO_PAD
            .encode(Sha256::digest(b"Mozilla/5.0|application/json|en-US|\"Linux\"|canvas-hash"));
        assert_eq!(with_canvas.fingerprint(), expected);
    }

    #[test]
    fn from_headers_reads_signals_and_forwarded_ip() {
        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, HeaderValue::from_static("Mozilla/5.0"));
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static("en-US"));
        headers.insert(PLATFORM_HEADER, HeaderValue::from_static("\"Linux\""));
        headers.insert(WEBGL_FP_HEADER, HeaderValue::from_static("webgl"));
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));

        let info = ClientInfo::from_headers(&headers, Some("127.0.0.1"));
        assert_eq!(info.ip, "203.0.113.7");
        assert_eq!(info.user_agent, "Mozilla/5.0");
        assert_eq!(info.platform, "\"Linux\"");
        assert_eq!(info.webgl_fp, "webgl");
        assert!(info.canvas_fp.is_empty());
    }

    #[test]
    fn client_ip_falls_back_to_real_ip_then_peer() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers, Some("127.0.0.1")), "127.0.0.1");

        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.4"));
        assert_eq!(client_ip(&headers, Some("127.0.0.1")), "198.51.100.4");
    }
}
