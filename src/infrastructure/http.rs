use crate::domain::amount::Amount;
use crate::domain::payment::{
    Fiat, PaymentLink, PaymentLinkStatus, PaymentMode, PaymentRequest, PaymentStatus,
};
use crate::domain::ports::PaymentApi;
use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Access tokens are renewed this long before they actually expire.
const TOKEN_RENEWAL_MARGIN_MINUTES: i64 = 10;

#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub url: String,
    pub version: String,
    pub address: String,
    pub signature: String,
    /// Sent as `Device-Id` with every call.
    pub device_id: String,
    /// Tries per call, the first one included.
    pub attempts: u32,
    pub retry_delay: Duration,
    /// Interval between status checks while waiting for a payment.
    pub poll_interval: Duration,
}

struct AccessToken {
    value: String,
    renew_at: DateTime<Utc>,
}

/// Client of the hosted payment-link service.
pub struct HttpPaymentApi {
    client: Client,
    settings: ApiSettings,
    token: Mutex<Option<AccessToken>>,
    fiats: Mutex<Option<Vec<Fiat>>>,
}

#[derive(Serialize)]
struct AuthRequest<'a> {
    address: &'a str,
    signature: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct Claims {
    exp: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreatePaymentLinkDto<'a> {
    external_id: &'a str,
}

#[derive(Serialize)]
struct UpdatePaymentLinkDto {
    status: PaymentLinkStatus,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreatePaymentDto {
    mode: PaymentMode,
    amount: Amount,
    #[serde(skip_serializing_if = "Option::is_none")]
    external_id: Option<String>,
    currency: Fiat,
    #[serde(skip_serializing_if = "Option::is_none")]
    expiry_date: Option<DateTime<Utc>>,
}

impl HttpPaymentApi {
    pub fn new(settings: ApiSettings) -> Self {
        Self {
            client: Client::new(),
            settings,
            token: Mutex::new(None),
            fiats: Mutex::new(None),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.settings.url.trim_end_matches('/'),
            self.settings.version,
            path
        )
    }

    async fn access_token(&self) -> Result<String> {
        let mut token = self.token.lock().await;
        if let Some(current) = token.as_ref()
            && current.renew_at > Utc::now()
        {
            return Ok(current.value.clone());
        }

        debug!("renewing access token");
        let response = self
            .client
            .post(self.endpoint("auth"))
            .json(&AuthRequest {
                address: &self.settings.address,
                signature: &self.settings.signature,
            })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(BridgeError::AuthError(format!(
                "sign-in rejected with status {}",
                response.status()
            )));
        }

        let auth: AuthResponse = response.json().await?;
        let expires = token_expiry(&auth.access_token)?;
        *token = Some(AccessToken {
            value: auth.access_token.clone(),
            renew_at: expires - chrono::Duration::minutes(TOKEN_RENEWAL_MARGIN_MINUTES),
        });
        Ok(auth.access_token)
    }

    /// Performs one API call, retrying transient failures.
    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        link_id: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> Result<T> {
        let mut attempt = 1;
        loop {
            match self.send(method.clone(), path, link_id, body.as_ref()).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.settings.attempts && is_transient(&e) => {
                    warn!(%method, %path, attempt, error = %e, "API call failed, retrying");
                    tokio::time::sleep(self.settings.retry_delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        link_id: Option<&str>,
        body: Option<&serde_json::Value>,
    ) -> Result<T> {
        let token = self.access_token().await?;
        let mut request = self
            .client
            .request(method, self.endpoint(path))
            .bearer_auth(token)
            .header("Device-Id", &self.settings.device_id);
        if let Some(link_id) = link_id {
            request = request.query(&[("externalId", link_id)]);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }
        if status == StatusCode::UNAUTHORIZED {
            *self.token.lock().await = None;
        }
        let message = response.text().await.unwrap_or_default();
        Err(BridgeError::ApiError {
            status: status.as_u16(),
            message,
        })
    }

    async fn fiat(&self, currency: &str) -> Result<Fiat> {
        let mut fiats = self.fiats.lock().await;
        if fiats.is_none() {
            *fiats = Some(self.call(Method::GET, "fiat", None, None).await?);
        }
        fiats
            .iter()
            .flatten()
            .find(|fiat| fiat.name == currency)
            .cloned()
            .ok_or_else(|| BridgeError::InvalidCurrency(currency.to_string()))
    }
}

fn is_transient(error: &BridgeError) -> bool {
    match error {
        BridgeError::HttpError(_) => true,
        BridgeError::ApiError { status, .. } => {
            *status >= 500 || *status == StatusCode::UNAUTHORIZED.as_u16()
        }
        _ => false,
    }
}

/// Reads the `exp` claim of a JWT without verifying it.
fn token_expiry(token: &str) -> Result<DateTime<Utc>> {
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| BridgeError::AuthError("malformed access token".to_string()))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| BridgeError::AuthError(e.to_string()))?;
    let claims: Claims = serde_json::from_slice(&bytes)?;
    DateTime::from_timestamp(claims.exp, 0)
        .ok_or_else(|| BridgeError::AuthError(format!("invalid expiry {}", claims.exp)))
}

fn pending_marker(link: &PaymentLink) -> Option<u64> {
    link.payment
        .as_ref()
        .filter(|p| p.status == PaymentStatus::Pending)
        .map(|p| p.id)
}

#[async_trait]
impl PaymentApi for HttpPaymentApi {
    async fn get_payment_link(&self, link_id: &str) -> Result<PaymentLink> {
        self.call(Method::GET, "paymentLink", Some(link_id), None)
            .await
    }

    async fn create_payment_link(&self, link_id: &str) -> Result<PaymentLink> {
        let body = serde_json::to_value(CreatePaymentLinkDto {
            external_id: link_id,
        })?;
        self.call(Method::POST, "paymentLink", None, Some(body))
            .await
    }

    async fn update_payment_link(
        &self,
        link_id: &str,
        status: PaymentLinkStatus,
    ) -> Result<PaymentLink> {
        let body = serde_json::to_value(UpdatePaymentLinkDto { status })?;
        self.call(Method::PUT, "paymentLink", Some(link_id), Some(body))
            .await
    }

    async fn create_payment(&self, link_id: &str, request: PaymentRequest) -> Result<PaymentLink> {
        let currency = self.fiat(&request.currency).await?;
        let body = serde_json::to_value(CreatePaymentDto {
            mode: request.mode,
            amount: request.amount,
            external_id: request.external_id,
            currency,
            expiry_date: request.expiry,
        })?;
        self.call(Method::POST, "paymentLink/payment", Some(link_id), Some(body))
            .await
    }

    async fn cancel_payment(&self, link_id: &str) -> Result<PaymentLink> {
        self.call(Method::DELETE, "paymentLink/payment", Some(link_id), None)
            .await
    }

    async fn wait_for_payment(&self, link_id: &str, payment_id: u64) -> Result<PaymentLink> {
        loop {
            let link = self.get_payment_link(link_id).await?;
            if pending_marker(&link) != Some(payment_id) {
                return Ok(link);
            }
            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }
}
