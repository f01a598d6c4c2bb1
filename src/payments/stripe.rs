use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use super::{
    CreateCustomer, HostedSession, PaymentProvider, ProviderError, ProviderSubscription,
    SessionMetadata, SessionParams, WebhookEvent,
};

type HmacSha256 = Hmac<Sha256>;

/// Webhook timestamps older (or newer) than this are rejected to limit replay.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

const API_BASE: &str = "https://api.stripe.com/v1";

/// Verifies a `t=<unix>,v1=<hex>` signature header against the shared secret.
/// The signed payload is `<timestamp>.<raw body bytes>`.
pub fn verify_signature(
    payload: &[u8],
    signature_header: &str,
    secret: &str,
    now: i64,
) -> Result<(), ProviderError> {
    let mut timestamp: Option<i64> = None;
    let mut candidates: Vec<Vec<u8>> = Vec::new();

    for part in signature_header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => {
                timestamp = value.parse::<i64>().ok();
            }
            Some(("v1", value)) => {
                if let Ok(bytes) = hex::decode(value) {
                    candidates.push(bytes);
                }
            }
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(ProviderError::InvalidSignature)?;
    if candidates.is_empty() {
        return Err(ProviderError::InvalidSignature);
    }
    if (now - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(ProviderError::InvalidSignature);
    }

    for candidate in &candidates {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| ProviderError::InvalidSignature)?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        if mac.verify_slice(candidate).is_ok() {
            return Ok(());
        }
    }
    Err(ProviderError::InvalidSignature)
}

#[derive(Deserialize)]
struct EventEnvelope {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    data: EventData,
}

#[derive(Deserialize)]
struct EventData {
    object: serde_json::Value,
}

/// Decodes the event envelope from an already-authenticated payload.
pub fn parse_event(payload: &[u8]) -> Result<WebhookEvent, ProviderError> {
    let envelope: EventEnvelope =
        serde_json::from_slice(payload).map_err(|e| ProviderError::Malformed(e.to_string()))?;
    Ok(WebhookEvent {
        id: envelope.id,
        kind: envelope.kind,
        object: envelope.data.object,
    })
}

pub struct StripeClient {
    http: reqwest::Client,
    api_base: String,
    secret_key: String,
    webhook_secret: String,
}

#[derive(Deserialize)]
struct CustomerResponse {
    id: String,
}

#[derive(Deserialize)]
struct PriceResponse {
    id: String,
}

#[derive(Deserialize)]
struct SessionResponse {
    id: String,
    url: Option<String>,
}

#[derive(Deserialize)]
struct SubscriptionResponse {
    id: String,
    status: String,
    current_period_start: Option<i64>,
    current_period_end: Option<i64>,
    #[serde(default)]
    items: SubscriptionItems,
}

#[derive(Deserialize, Default)]
struct SubscriptionItems {
    #[serde(default)]
    data: Vec<SubscriptionItem>,
}

#[derive(Deserialize)]
struct SubscriptionItem {
    price: PriceResponse,
}

impl StripeClient {
    pub fn new(secret_key: String, webhook_secret: String) -> Self {
        StripeClient {
            http: reqwest::Client::new(),
            api_base: API_BASE.to_string(),
            secret_key,
            webhook_secret,
        }
    }

    async fn post_form<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> Result<T, ProviderError> {
        let resp = self
            .http
            .post(format!("{}{}", self.api_base, path))
            .bearer_auth(&self.secret_key)
            .form(params)
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }
        resp.json::<T>()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, ProviderError> {
        let resp = self
            .http
            .get(format!("{}{}", self.api_base, path))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }
        resp.json::<T>()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))
    }
}

fn push_metadata(params: &mut Vec<(String, String)>, prefix: &str, metadata: &SessionMetadata) {
    for (key, value) in metadata.to_map() {
        params.push((format!("{}[{}]", prefix, key), value));
    }
}

#[async_trait]
impl PaymentProvider for StripeClient {
    async fn create_customer(&self, req: &CreateCustomer) -> Result<String, ProviderError> {
        let mut params: Vec<(String, String)> = vec![
            ("email".to_string(), req.email.clone()),
            ("metadata[donor_id]".to_string(), req.donor_id.clone()),
        ];
        if let Some(name) = &req.name {
            params.push(("name".to_string(), name.clone()));
        }
        if let Some(phone) = &req.phone {
            params.push(("phone".to_string(), phone.clone()));
        }
        if let Some(address) = &req.address {
            params.push(("address[line1]".to_string(), address.line1.clone()));
            if let Some(line2) = &address.line2 {
                params.push(("address[line2]".to_string(), line2.clone()));
            }
            params.push(("address[city]".to_string(), address.city.clone()));
            params.push((
                "address[postal_code]".to_string(),
                address.postal_code.clone(),
            ));
            params.push(("address[country]".to_string(), address.country.clone()));
        }
        let customer: CustomerResponse = self.post_form("/customers", &params).await?;
        Ok(customer.id)
    }

    async fn create_one_time_session(
        &self,
        p: &SessionParams,
    ) -> Result<HostedSession, ProviderError> {
        let mut params: Vec<(String, String)> = vec![
            ("customer".to_string(), p.customer_id.clone()),
            ("mode".to_string(), "payment".to_string()),
            ("payment_method_types[0]".to_string(), "card".to_string()),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            (
                "line_items[0][price_data][currency]".to_string(),
                p.currency.clone(),
            ),
            (
                "line_items[0][price_data][unit_amount]".to_string(),
                p.amount.to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]".to_string(),
                format!("Donation - {}", p.fund_label),
            ),
            ("success_url".to_string(), p.success_url.clone()),
            ("cancel_url".to_string(), p.cancel_url.clone()),
            (
                "billing_address_collection".to_string(),
                if p.collect_billing_address { "required" } else { "auto" }.to_string(),
            ),
        ];
        if let Some(description) = &p.description {
            params.push((
                "line_items[0][price_data][product_data][description]".to_string(),
                description.clone(),
            ));
        }
        push_metadata(&mut params, "metadata", &p.metadata);
        push_metadata(&mut params, "payment_intent_data[metadata]", &p.metadata);

        let session: SessionResponse = self.post_form("/checkout/sessions", &params).await?;
        let url = session
            .url
            .ok_or_else(|| ProviderError::Malformed("session has no redirect url".to_string()))?;
        Ok(HostedSession {
            id: session.id,
            url,
        })
    }

    async fn create_subscription_session(
        &self,
        p: &SessionParams,
    ) -> Result<HostedSession, ProviderError> {
        // A dedicated monthly price for this amount and fund, then a
        // subscription-mode session referencing it.
        let price_params: Vec<(String, String)> = vec![
            ("unit_amount".to_string(), p.amount.to_string()),
            ("currency".to_string(), p.currency.clone()),
            ("recurring[interval]".to_string(), "month".to_string()),
            (
                "product_data[name]".to_string(),
                format!("Monthly Donation - {}", p.fund_label),
            ),
            (
                "product_data[metadata][fund_type]".to_string(),
                p.metadata.fund_type.as_str().to_string(),
            ),
        ];
        let price: PriceResponse = self.post_form("/prices", &price_params).await?;

        let mut params: Vec<(String, String)> = vec![
            ("customer".to_string(), p.customer_id.clone()),
            ("mode".to_string(), "subscription".to_string()),
            ("payment_method_types[0]".to_string(), "card".to_string()),
            ("line_items[0][price]".to_string(), price.id),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            ("success_url".to_string(), p.success_url.clone()),
            ("cancel_url".to_string(), p.cancel_url.clone()),
            (
                "billing_address_collection".to_string(),
                if p.collect_billing_address { "required" } else { "auto" }.to_string(),
            ),
        ];
        push_metadata(&mut params, "metadata", &p.metadata);
        push_metadata(&mut params, "subscription_data[metadata]", &p.metadata);

        let session: SessionResponse = self.post_form("/checkout/sessions", &params).await?;
        let url = session
            .url
            .ok_or_else(|| ProviderError::Malformed("session has no redirect url".to_string()))?;
        Ok(HostedSession {
            id: session.id,
            url,
        })
    }

    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<ProviderSubscription, ProviderError> {
        let sub: SubscriptionResponse = self
            .get(&format!("/subscriptions/{}", subscription_id))
            .await?;
        Ok(ProviderSubscription {
            id: sub.id,
            price_id: sub.items.data.first().map(|item| item.price.id.clone()),
            status: sub.status,
            current_period_start: super::timestamp_to_datetime(sub.current_period_start),
            current_period_end: super::timestamp_to_datetime(sub.current_period_end),
        })
    }

    fn verify_event(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<WebhookEvent, ProviderError> {
        verify_signature(
            payload,
            signature_header,
            &self.webhook_secret,
            Utc::now().timestamp(),
        )?;
        parse_event(payload)
    }
}
