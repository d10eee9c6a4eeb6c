//! HTTP client of the billing source.
//!
//! The daily summary of an interface is read from
//! `GET {base_url}/summary/by-day?interface_id=..&start=..&end=..`, with the
//! bounds in RFC 3339 and HTTP basic authentication.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use chrono::DateTime;
use chrono_tz::Tz;
use engine::{Billing, CollaboratorError, DailySummary};
use reqwest::{Client, header};

use crate::settings;

#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("missing billing base url")]
    MissingBaseUrl,
    #[error("invalid auth header value: {0}")]
    InvalidHeader(#[from] header::InvalidHeaderValue),
    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),
}

pub struct BillingClient {
    base_url: String,
    client: Client,
}

impl BillingClient {
    pub fn new(settings: &settings::Billing) -> Result<Self, BillingError> {
        let base_url = settings.base_url.trim().trim_end_matches('/');
        if base_url.is_empty() {
            return Err(BillingError::MissingBaseUrl);
        }

        // Basic authorization is in the form "Basic `secret`" where `secret` is
        // the base64 of the string "username:password".
        let secret = format!("{}:{}", settings.username, settings.password);
        let secret = format!("Basic {}", base64::prelude::BASE64_STANDARD.encode(secret));

        let mut auth = header::HeaderValue::try_from(secret)?;
        auth.set_sensitive(true);

        let mut headers = header::HeaderMap::new();
        headers.insert(header::AUTHORIZATION, auth);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(settings.timeout_secs.max(1)))
            .build()?;

        Ok(Self {
            base_url: base_url.to_string(),
            client,
        })
    }

    fn summary_url(&self) -> String {
        format!("{}/summary/by-day", self.base_url)
    }
}

#[async_trait]
impl Billing for BillingClient {
    async fn daily_summary(
        &self,
        interface_id: &str,
        start: DateTime<Tz>,
        end: DateTime<Tz>,
    ) -> Result<DailySummary, CollaboratorError> {
        let response = self
            .client
            .get(self.summary_url())
            .query(&[
                ("interface_id", interface_id.to_string()),
                ("start", start.to_rfc3339()),
                ("end", end.to_rfc3339()),
            ])
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(CollaboratorError::Failed(format!(
                "billing returned {status} for interface {interface_id}"
            )));
        }
        response.json::<DailySummary>().await.map_err(request_error)
    }
}

fn request_error(err: reqwest::Error) -> CollaboratorError {
    if err.is_timeout() {
        CollaboratorError::Timeout
    } else {
        CollaboratorError::Failed(err.to_string())
    }
}
