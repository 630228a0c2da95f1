use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode, Url};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SendError {
    #[error("не удалось создать HTTP-клиент: {0}")]
    Client(#[source] reqwest::Error),
    #[error("ошибка запроса к вебхуку: {0}")]
    Request(#[source] reqwest::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Rejected { status: StatusCode },
}

pub fn build_client(timeout: Duration) -> Result<Client, SendError> {
    Client::builder()
        .user_agent(concat!("sysreport/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()
        .map_err(SendError::Client)
}

/// Posts `{"text": report}` once. Only HTTP 200 counts as delivered; any
/// other status is returned as-is and never retried.
pub async fn send_report(
    client: &Client,
    url: &Url,
    report: &str,
) -> Result<DeliveryOutcome, SendError> {
    let response = client
        .post(url.clone())
        .header(CONTENT_TYPE, "application/json")
        .json(&json!({ "text": report }))
        .send()
        .await
        // Strip the URL from the error, it carries the webhook secret.
        .map_err(|err| SendError::Request(err.without_url()))?;

    match response.status() {
        StatusCode::OK => Ok(DeliveryOutcome::Delivered),
        status => Ok(DeliveryOutcome::Rejected { status }),
    }
}
