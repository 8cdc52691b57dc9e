// rest/auth.rs — Bearer-token checks for the operator surface.
//
// Two independent credentials guard the API: `api_token` for operator
// endpoints and `cycle_secret` for the external scheduler trigger. A
// credential left unset disables its check (local/dev mode).

use axum::http::{header, HeaderMap, StatusCode};
use axum::Json;
use serde_json::{json, Value};

/// Validate a `Bearer <token>` authorization string against the expected token.
/// Returns `true` if the header value is exactly `"Bearer {expected_token}"`.
pub fn validate_bearer(header_value: &str, expected_token: &str) -> bool {
    header_value
        .strip_prefix("Bearer ")
        .map(|t| t == expected_token)
        .unwrap_or(false)
}

/// Enforce a bearer credential on a request. `None` means the credential is
/// not configured and the check is skipped.
pub fn require_bearer(
    headers: &HeaderMap,
    expected: Option<&str>,
) -> Result<(), (StatusCode, Json<Value>)> {
    let Some(expected) = expected else {
        return Ok(());
    };
    let ok = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| validate_bearer(v, expected))
        .unwrap_or(false);
    if ok {
        Ok(())
    } else {
        Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "unauthorized" })),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_validation() {
        assert!(validate_bearer("Bearer secret", "secret"));
        assert!(!validate_bearer("Bearer wrong", "secret"));
        assert!(!validate_bearer("secret", "secret"));
        assert!(!validate_bearer("bearer secret", "secret"));
    }

    #[test]
    fn unset_credential_disables_check() {
        let headers = HeaderMap::new();
        assert!(require_bearer(&headers, None).is_ok());
        assert!(require_bearer(&headers, Some("secret")).is_err());
    }

    #[test]
    fn header_round_trip() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer secret".parse().unwrap());
        assert!(require_bearer(&headers, Some("secret")).is_ok());
        assert!(require_bearer(&headers, Some("other")).is_err());
    }
}
