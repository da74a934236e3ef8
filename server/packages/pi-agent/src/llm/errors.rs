//! Upstream failure text.
//!
//! Provider failures never surface as errors to the caller. They are turned
//! into a readable message that becomes the generation result.

const EMPTY_BODY: &str = "The response body was empty.";
const UNREADABLE_BODY: &str = "Failed to read the response body.";

pub fn classify_api_error(status: u16, body: &str) -> String {
    match status {
        401 | 403 => format!("Permission error ({status}): check the API key or its permissions."),
        429 => format!("Quota/rate limit error ({status}): check your usage limits."),
        404 => format!("Model not supported or wrong endpoint ({status}): check the model name."),
        500.. => format!("Server error ({status}): try again shortly."),
        _ => format!("Request failed ({status}): {body}"),
    }
}

pub(crate) async fn read_error_body(response: reqwest::Response) -> String {
    match response.text().await {
        Ok(text) if text.is_empty() => EMPTY_BODY.to_string(),
        Ok(text) => text,
        Err(err) => {
            tracing::debug!(error = %err, "failed to read upstream error body");
            UNREADABLE_BODY.to_string()
        }
    }
}

pub(crate) fn call_failed(label: &str, reason: &str) -> String {
    format!("{label} call failed: {reason}")
}

pub(crate) fn transport_failed(label: &str, err: &dyn std::fmt::Display) -> String {
    call_failed(label, &format!("could not reach the API ({err})"))
}

pub(crate) fn missing_api_key(label: &str) -> String {
    format!("{label} API key is required.")
}
