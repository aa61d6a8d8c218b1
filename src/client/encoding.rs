//! Response character-encoding inspection

use encoding_rs::Encoding;
use http::header::CONTENT_TYPE;
use http::HeaderMap;

use crate::error::{OutboundError, Result};
use crate::models::HttpResponse;

/// Charset assumed when a response does not declare one
pub const DEFAULT_CHARSET: &str = "utf-8";

/// Canonical lowercase name of the charset a response declares
pub fn deduce_charset(response: Option<&HttpResponse>) -> Result<String> {
    let response = response.ok_or(OutboundError::NilResponse)?;
    deduce_charset_from_headers(response.headers())
}

pub fn deduce_charset_from_headers(headers: &HeaderMap) -> Result<String> {
    let Some(content_type) = headers.get(CONTENT_TYPE) else {
        return Ok(DEFAULT_CHARSET.to_string());
    };

    let content_type = content_type
        .to_str()
        .map_err(|_| OutboundError::InvalidContentType)?;
    if content_type.trim().is_empty() {
        return Ok(DEFAULT_CHARSET.to_string());
    }

    let media_type: mime::Mime = content_type
        .parse()
        .map_err(|_| OutboundError::InvalidContentType)?;

    let Some(label) = media_type.get_param(mime::CHARSET) else {
        return Ok(DEFAULT_CHARSET.to_string());
    };

    Encoding::for_label(label.as_str().trim().as_bytes())
        .map(|encoding| encoding.name().to_ascii_lowercase())
        .ok_or_else(|| OutboundError::UnknownEncoding(label.as_str().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderValue, StatusCode};

    fn response(content_type: Option<&'static str>) -> HttpResponse {
        let mut headers = HeaderMap::new();
        if let Some(value) = content_type {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(value));
        }
        HttpResponse::new(StatusCode::OK, headers, "")
    }

    #[test]
    fn test_nil_response() {
        assert!(matches!(
            deduce_charset(None),
            Err(OutboundError::NilResponse)
        ));
    }

    #[test]
    fn test_missing_content_type_defaults() {
        assert_eq!(deduce_charset(Some(&response(None))).unwrap(), "utf-8");
    }

    #[test]
    fn test_missing_charset_defaults() {
        assert_eq!(
            deduce_charset(Some(&response(Some("text/html")))).unwrap(),
            "utf-8"
        );
    }

    #[test]
    fn test_charset_is_case_insensitive() {
        assert_eq!(
            deduce_charset(Some(&response(Some("text/html; charset=UTF-8")))).unwrap(),
            "utf-8"
        );
        assert_eq!(
            deduce_charset(Some(&response(Some("text/html; charset=utf-8")))).unwrap(),
            "utf-8"
        );
    }

    #[test]
    fn test_known_non_default_charsets() {
        assert_eq!(
            deduce_charset(Some(&response(Some("text/html; charset=ISO-8859-1")))).unwrap(),
            "windows-1252"
        );
        assert_eq!(
            deduce_charset(Some(&response(Some("text/plain; charset=Shift_JIS")))).unwrap(),
            "shift_jis"
        );
    }

    #[test]
    fn test_unknown_charset() {
        let err = deduce_charset(Some(&response(Some("text/html; charset=unknown")))).unwrap_err();
        assert!(matches!(err, OutboundError::UnknownEncoding(ref name) if name == "unknown"));
    }

    #[test]
    fn test_invalid_content_type() {
        let err = deduce_charset(Some(&response(Some("not a media type;;")))).unwrap_err();
        assert!(matches!(err, OutboundError::InvalidContentType));
    }

    #[test]
    fn test_deduce_is_idempotent() {
        let response = response(Some("text/html; charset=windows-1251"));
        let first = deduce_charset(Some(&response)).unwrap();
        let second = deduce_charset(Some(&response)).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, "windows-1251");
    }
}
