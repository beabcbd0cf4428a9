use routecore::{BackendError, GatewayError};
use serde::de::DeserializeOwned;
use std::time::Duration;

const MAX_ERROR_BODY: usize = 512;

pub(crate) fn classify(err: reqwest::Error) -> BackendError {
    if err.is_timeout() {
        BackendError::Timeout
    } else if err.is_connect() || err.is_request() {
        BackendError::Transient(format!("HTTP request failed: {}", err))
    } else {
        BackendError::Fatal(format!("HTTP request failed: {}", err))
    }
}

/// Send `request` and return the body of a 2xx response
pub(crate) async fn send_text(request: reqwest::RequestBuilder) -> Result<String, BackendError> {
    let response = request.send().await.map_err(classify)?;
    let status = response.status();
    let body = response.text().await.map_err(classify)?;

    if !status.is_success() {
        let mut body = body;
        if body.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        return Err(BackendError::from_status(status.as_u16(), body));
    }
    Ok(body)
}

pub(crate) async fn send_json<T: DeserializeOwned>(
    request: reqwest::RequestBuilder,
) -> Result<T, BackendError> {
    let body = send_text(request).await?;
    serde_json::from_str(&body)
        .map_err(|e| BackendError::Fatal(format!("Failed to parse response: {}", e)))
}

/// Embedding calls report through the gateway taxonomy
pub(crate) fn to_gateway_error(err: BackendError, timeout: Duration) -> GatewayError {
    match err {
        BackendError::Transient(msg) => GatewayError::Unavailable(msg),
        BackendError::Timeout => GatewayError::Timeout {
            ms: timeout.as_millis() as u64,
        },
        BackendError::Fatal(msg) => GatewayError::Rejected(msg),
    }
}
