use serde::Deserialize;

/// The JSON body servers attach to failed responses.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
}

/// Extracts the human readable reason from a failed response body.
pub fn error_detail(body: &str) -> Option<String> {
    let body: ErrorBody = serde_json::from_str(body).ok()?;
    body.error
        .or(body.message)
        .filter(|detail| !detail.trim().is_empty())
}
