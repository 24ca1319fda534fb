use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use tracing::debug;

use super::types::ProvisioningApiError;
use super::ProvisioningApiState;

fn bearer_token_from_headers(headers: &HeaderMap) -> Option<&str> {
    let raw = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = raw.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        return None;
    }
    Some(token)
}

pub(super) fn authorize_provisioning_request(
    state: &ProvisioningApiState,
    headers: &HeaderMap,
) -> Result<(), ProvisioningApiError> {
    match bearer_token_from_headers(headers) {
        Some(token) if token == state.shared_secret => Ok(()),
        _ => {
            debug!("rejected provisioning request with missing or invalid token");
            Err(ProvisioningApiError::unauthorized())
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn unit_bearer_token_requires_scheme_and_value() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token_from_headers(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer s3cret"));
        assert_eq!(bearer_token_from_headers(&headers), Some("s3cret"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic s3cret"));
        assert_eq!(bearer_token_from_headers(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer   "));
        assert_eq!(bearer_token_from_headers(&headers), None);
    }
}
