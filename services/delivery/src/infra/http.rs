use std::time::{Duration, Instant};

use anyhow::Context as _;
use reqwest::Client;
use serde::Deserialize;

use crate::domain::repository::{MailProvider, WebhookTransport};
use crate::domain::types::{
    DeliveryRequest, DeliveryResponse, OutboundEmail, RESPONSE_BODY_MAX_CHARS, truncate_chars,
};
use crate::error::DeliveryServiceError;

pub const WEBHOOK_USER_AGENT: &str = concat!("courier-webhooks/", env!("CARGO_PKG_VERSION"));

/// Client used for webhook deliveries: bounded timeout, redirects not followed.
pub fn webhook_client(timeout: Duration) -> Result<Client, DeliveryServiceError> {
    let client = Client::builder()
        .timeout(timeout)
        .user_agent(WEBHOOK_USER_AGENT)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .context("build webhook http client")?;
    Ok(client)
}

#[derive(Clone)]
pub struct HttpWebhookTransport {
    pub client: Client,
}

impl WebhookTransport for HttpWebhookTransport {
    async fn send(&self, request: &DeliveryRequest) -> DeliveryResponse {
        let mut builder = self
            .client
            .post(&request.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(request.body.clone());
        for (name, value) in &request.headers {
            builder = builder.header(*name, value);
        }

        let start = Instant::now();
        let result = builder.send().await;

        match result {
            Ok(response) => {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                DeliveryResponse {
                    status: Some(status),
                    body: Some(truncate_chars(&body, RESPONSE_BODY_MAX_CHARS)),
                    elapsed_ms: start.elapsed().as_millis() as i64,
                    error: (!(200..300).contains(&status)).then(|| format!("HTTP {status}")),
                }
            }
            Err(e) => {
                let error = if e.is_timeout() {
                    "request timed out".to_owned()
                } else if e.is_connect() {
                    format!("connection failed: {e}")
                } else {
                    format!("request error: {e}")
                };
                DeliveryResponse {
                    status: None,
                    body: None,
                    elapsed_ms: start.elapsed().as_millis() as i64,
                    error: Some(error),
                }
            }
        }
    }
}

/// Mail provider reached over HTTP with a bearer token.
#[derive(Clone)]
pub struct HttpMailProvider {
    pub client: Client,
    pub url: String,
    pub token: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProviderSendResponse {
    message_id: String,
}

impl MailProvider for HttpMailProvider {
    async fn send(&self, email: &OutboundEmail) -> Result<String, DeliveryServiceError> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(email)
            .send()
            .await
            .context("call mail provider")
            .map_err(DeliveryServiceError::MailProvider)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryServiceError::MailProvider(anyhow::anyhow!(
                "mail provider returned {status}: {}",
                truncate_chars(&body, 512)
            )));
        }

        let parsed: ProviderSendResponse = response
            .json()
            .await
            .context("decode mail provider response")?;
        Ok(parsed.message_id)
    }
}
