//! Payment-provider seam.
//!
//! The checkout and webhook code only talk to the narrow [`PaymentProvider`]
//! trait, so the reconciliation logic is testable against a fake without
//! contacting Stripe.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;

use crate::funds::FundType;

pub mod stripe;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("invalid webhook signature")]
    InvalidSignature,

    #[error("malformed provider payload: {0}")]
    Malformed(String),

    #[error("provider request failed: {0}")]
    Request(String),

    #[error("provider API error ({status}): {message}")]
    Api { status: u16, message: String },
}

impl From<ProviderError> for crate::error::AppError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::InvalidSignature => crate::error::AppError::InvalidSignature,
            other => crate::error::AppError::Provider(other.to_string()),
        }
    }
}

/// The metadata bag attached to checkout sessions, payment intents and
/// subscriptions at creation time. It is the only channel through which the
/// webhook handler recovers business context, since the provider knows
/// nothing of the domain model.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionMetadata {
    pub donor_id: String,
    pub fund_type: FundType,
    pub campaign_id: Option<String>,
    pub is_recurring: bool,
    pub gift_aid: bool,
    pub gift_aid_amount: i64,
}

impl SessionMetadata {
    /// Flattens into the string map the provider stores verbatim.
    pub fn to_map(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("donor_id".to_string(), self.donor_id.clone());
        map.insert("fund_type".to_string(), self.fund_type.as_str().to_string());
        map.insert(
            "campaign_id".to_string(),
            self.campaign_id.clone().unwrap_or_default(),
        );
        map.insert("is_recurring".to_string(), self.is_recurring.to_string());
        map.insert("gift_aid".to_string(), self.gift_aid.to_string());
        map.insert(
            "gift_aid_amount".to_string(),
            self.gift_aid_amount.to_string(),
        );
        map
    }

    /// Strict parse of the provider's string-keyed metadata back into the
    /// closed struct. Events whose metadata does not parse are treated as
    /// malformed at the webhook boundary.
    pub fn from_map(map: &HashMap<String, String>) -> Result<SessionMetadata, ProviderError> {
        let get = |key: &str| {
            map.get(key)
                .ok_or_else(|| ProviderError::Malformed(format!("metadata missing {}", key)))
        };
        let donor_id = get("donor_id")?.clone();
        let fund_raw = get("fund_type")?;
        let fund_type = FundType::parse(fund_raw)
            .ok_or_else(|| ProviderError::Malformed(format!("unknown fund_type: {}", fund_raw)))?;
        let campaign_id = map
            .get("campaign_id")
            .filter(|v| !v.is_empty())
            .cloned();
        let is_recurring = get("is_recurring")?
            .parse::<bool>()
            .map_err(|_| ProviderError::Malformed("is_recurring is not a bool".to_string()))?;
        let gift_aid = get("gift_aid")?
            .parse::<bool>()
            .map_err(|_| ProviderError::Malformed("gift_aid is not a bool".to_string()))?;
        let gift_aid_amount = get("gift_aid_amount")?
            .parse::<i64>()
            .map_err(|_| ProviderError::Malformed("gift_aid_amount is not an integer".to_string()))?;
        Ok(SessionMetadata {
            donor_id,
            fund_type,
            campaign_id,
            is_recurring,
            gift_aid,
            gift_aid_amount,
        })
    }
}

#[derive(Debug, Clone)]
pub struct CustomerAddress {
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

#[derive(Debug, Clone)]
pub struct CreateCustomer {
    pub email: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<CustomerAddress>,
    pub donor_id: String,
}

#[derive(Debug, Clone)]
pub struct SessionParams {
    pub customer_id: String,
    pub amount: i64,
    pub currency: String,
    pub fund_label: String,
    pub description: Option<String>,
    pub metadata: SessionMetadata,
    pub success_url: String,
    pub cancel_url: String,
    /// Gift Aid requires a full billing address at the provider level.
    pub collect_billing_address: bool,
}

/// Provider-hosted checkout flow the donor's browser is redirected to.
#[derive(Debug, Clone)]
pub struct HostedSession {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct ProviderSubscription {
    pub id: String,
    pub price_id: Option<String>,
    pub status: String,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
}

/// An authenticated, envelope-parsed webhook event. The `object` payload is
/// decoded per event kind by the reconciler.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub id: String,
    pub kind: String,
    pub object: serde_json::Value,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Creates a provider customer, returning its external reference.
    async fn create_customer(&self, req: &CreateCustomer) -> Result<String, ProviderError>;

    /// One-time donation: payment-mode session with an inline price.
    async fn create_one_time_session(
        &self,
        params: &SessionParams,
    ) -> Result<HostedSession, ProviderError>;

    /// Recurring donation: monthly price plus subscription-mode session.
    async fn create_subscription_session(
        &self,
        params: &SessionParams,
    ) -> Result<HostedSession, ProviderError>;

    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<ProviderSubscription, ProviderError>;

    /// Verifies the raw payload against the signature header and parses the
    /// event envelope. Must be called on the unparsed body.
    fn verify_event(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<WebhookEvent, ProviderError>;
}

// Wire shapes of the event objects the reconciler dispatches on.

#[derive(Debug, Deserialize)]
pub struct CheckoutSessionObject {
    pub id: String,
    pub payment_intent: Option<String>,
    pub subscription: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct InvoiceObject {
    pub id: String,
    pub subscription: Option<String>,
    pub billing_reason: Option<String>,
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub amount_paid: i64,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionObject {
    pub id: String,
    pub status: String,
    pub current_period_start: Option<i64>,
    pub current_period_end: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct PaymentIntentObject {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct ChargeObject {
    pub payment_intent: Option<String>,
}

pub fn timestamp_to_datetime(secs: Option<i64>) -> Option<DateTime<Utc>> {
    secs.and_then(|s| DateTime::<Utc>::from_timestamp(s, 0))
}
