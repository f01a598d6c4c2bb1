use axum::extract::{Json, State};
use axum::http::{header, HeaderMap};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use uuid::Uuid;

use crate::db;
use crate::error::AppError;
use crate::funds::FundType;
use crate::payments::{CreateCustomer, CustomerAddress, SessionMetadata, SessionParams};
use crate::AppState;

pub const MIN_AMOUNT: i64 = 100; // £1.00
pub const MAX_AMOUNT: i64 = 5_000_000; // £50,000.00
pub const CURRENCY: &str = "gbp";

pub const DECLARATION_VERSION: &str = "2024-01";
pub const DECLARATION_TEXT: &str = "I am a UK taxpayer and understand that if I pay less Income Tax and/or Capital Gains Tax in the current tax year than the amount of Gift Aid claimed on all my donations it is my responsibility to pay any difference. I want Masjid Al-Madina to reclaim 25p of tax on every £1 that I have given.";

/// Gift Aid uplift in minor units: round(amount * 0.25). Informational only —
/// the tax reclaim goes to HMRC, the donor is never charged this.
pub fn gift_aid_uplift(amount: i64) -> i64 {
    (amount * 25 + 50) / 100
}

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex"))
}

fn uk_postcode_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^[A-Z]{1,2}[0-9][A-Z0-9]?\s?[0-9][A-Z]{2}$").expect("postcode regex")
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonorInfo {
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address_line1: Option<String>,
    pub address_line2: Option<String>,
    pub city: Option<String>,
    pub postcode: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCheckoutRequest {
    pub amount: i64,
    pub fund_type: String,
    pub is_recurring: bool,
    pub gift_aid: bool,
    pub donor: DonorInfo,
    pub campaign_id: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCheckoutResponse {
    pub session_id: String,
    pub url: String,
}

/// Rejects a bad request before any side effect is performed.
pub fn validate(req: &CreateCheckoutRequest) -> Result<FundType, AppError> {
    if req.amount < MIN_AMOUNT {
        return Err(AppError::InvalidRequest(format!(
            "Minimum donation is {} pence",
            MIN_AMOUNT
        )));
    }
    if req.amount > MAX_AMOUNT {
        return Err(AppError::InvalidRequest(format!(
            "Maximum donation is {} pence",
            MAX_AMOUNT
        )));
    }
    let fund = FundType::parse(&req.fund_type)
        .ok_or_else(|| AppError::InvalidRequest(format!("Unknown fund type: {}", req.fund_type)))?;

    if !email_re().is_match(req.donor.email.trim()) {
        return Err(AppError::InvalidRequest("A valid email is required".to_string()));
    }

    if req.gift_aid {
        if req.donor.full_name.trim().is_empty() {
            return Err(AppError::InvalidRequest(
                "Full name is required for Gift Aid".to_string(),
            ));
        }
        let line1 = req.donor.address_line1.as_deref().unwrap_or("").trim();
        if line1.is_empty() {
            return Err(AppError::InvalidRequest(
                "Address line 1 is required for Gift Aid".to_string(),
            ));
        }
        let city = req.donor.city.as_deref().unwrap_or("").trim();
        if city.is_empty() {
            return Err(AppError::InvalidRequest(
                "City is required for Gift Aid".to_string(),
            ));
        }
        let postcode = req.donor.postcode.as_deref().unwrap_or("").trim();
        if !uk_postcode_re().is_match(postcode) {
            return Err(AppError::InvalidRequest(
                "A valid UK postcode is required for Gift Aid".to_string(),
            ));
        }
    }
    Ok(fund)
}

fn non_empty(s: &str) -> Option<&str> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

/// Orchestrates checkout-session creation. Steps run in order with no partial
/// rollback; any failure aborts the call and the donor resubmits. A crash
/// between the provider call and the local insert leaves an orphaned provider
/// session, which later reconciliation can repair by session reference.
pub async fn create_checkout_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateCheckoutRequest>,
) -> Result<Json<CreateCheckoutResponse>, AppError> {
    let fund = validate(&req)?;

    // Step 1: donor upsert, keyed by email.
    let fields = db::DonorFields {
        full_name: non_empty(&req.donor.full_name),
        phone: req.donor.phone.as_deref().and_then(non_empty),
        address_line1: req.donor.address_line1.as_deref().and_then(non_empty),
        address_line2: req.donor.address_line2.as_deref().and_then(non_empty),
        city: req.donor.city.as_deref().and_then(non_empty),
        postcode: req.donor.postcode.as_deref().and_then(non_empty),
        gift_aid_eligible: req.gift_aid,
    };
    let donor_id = db::upsert_donor(&state.db, &req.donor.email, &fields).await?;

    // Step 2: append the Gift Aid attestation, once per donation.
    if req.gift_aid {
        let ip_address = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .map(str::to_string);
        let user_agent = headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        db::insert_gift_aid_declaration(
            &state.db,
            &db::NewDeclaration {
                donor_id: &donor_id,
                declaration_text: DECLARATION_TEXT,
                declaration_version: DECLARATION_VERSION,
                full_name: req.donor.full_name.trim(),
                address_line1: req.donor.address_line1.as_deref().unwrap_or("").trim(),
                address_line2: req.donor.address_line2.as_deref().and_then(non_empty),
                city: req.donor.city.as_deref().unwrap_or("").trim(),
                postcode: req.donor.postcode.as_deref().unwrap_or("").trim(),
                ip_address: ip_address.as_deref(),
                user_agent: user_agent.as_deref(),
            },
        )
        .await?;
    }

    // Step 3: reuse or create the provider customer.
    let donor = db::get_donor(&state.db, &donor_id)
        .await?
        .ok_or_else(|| AppError::StoreUnavailable("donor row vanished after upsert".to_string()))?;
    let customer_id = match donor.stripe_customer_id {
        Some(id) => id,
        None => {
            let address = if req.gift_aid {
                Some(CustomerAddress {
                    line1: req.donor.address_line1.clone().unwrap_or_default(),
                    line2: req.donor.address_line2.clone(),
                    city: req.donor.city.clone().unwrap_or_default(),
                    postal_code: req.donor.postcode.clone().unwrap_or_default(),
                    country: "GB".to_string(),
                })
            } else {
                None
            };
            let customer_id = state
                .provider
                .create_customer(&CreateCustomer {
                    email: req.donor.email.trim().to_lowercase(),
                    name: non_empty(&req.donor.full_name).map(str::to_string),
                    phone: req.donor.phone.clone(),
                    address,
                    donor_id: donor_id.clone(),
                })
                .await?;
            db::set_donor_customer_id(&state.db, &donor_id, &customer_id).await?;
            customer_id
        }
    };

    // Step 4: informational uplift only; the charged amount is unaffected.
    let gift_aid_amount = if req.gift_aid {
        gift_aid_uplift(req.amount)
    } else {
        0
    };

    // Step 5: provider session, carrying the metadata bag the webhook
    // handler later recovers business context from.
    let metadata = SessionMetadata {
        donor_id: donor_id.clone(),
        fund_type: fund,
        campaign_id: req.campaign_id.clone(),
        is_recurring: req.is_recurring,
        gift_aid: req.gift_aid,
        gift_aid_amount,
    };
    let description = if req.is_recurring {
        None
    } else if req.gift_aid {
        Some(format!(
            "Your donation of £{:.2} + £{:.2} Gift Aid",
            req.amount as f64 / 100.0,
            gift_aid_amount as f64 / 100.0
        ))
    } else {
        Some(format!("One-time donation to {}", fund.label()))
    };
    let params = SessionParams {
        customer_id,
        amount: req.amount,
        currency: CURRENCY.to_string(),
        fund_label: fund.label().to_string(),
        description,
        metadata: metadata.clone(),
        success_url: req.success_url.clone(),
        cancel_url: req.cancel_url.clone(),
        collect_billing_address: req.gift_aid,
    };
    let session = if req.is_recurring {
        state.provider.create_subscription_session(&params).await?
    } else {
        state.provider.create_one_time_session(&params).await?
    };

    // Step 6: the pending donation row, keyed by the session reference.
    let metadata_json = serde_json::to_string(&metadata.to_map())
        .map_err(|e| AppError::StoreUnavailable(e.to_string()))?;
    let donation_id = Uuid::new_v4().to_string();
    let inserted = db::insert_donation(
        &state.db,
        &db::NewDonation {
            id: &donation_id,
            donor_id: Some(&donor_id),
            stripe_checkout_session_id: Some(&session.id),
            stripe_payment_intent_id: None,
            stripe_invoice_id: None,
            stripe_subscription_id: None,
            amount: req.amount,
            currency: CURRENCY,
            fund_type: fund.as_str(),
            campaign_id: req.campaign_id.as_deref(),
            is_recurring: req.is_recurring,
            recurring_interval: if req.is_recurring { Some("month") } else { None },
            gift_aid_claimed: req.gift_aid,
            gift_aid_amount,
            status: db::models::DonationStatus::Pending,
            metadata: Some(&metadata_json),
            completed_at: None,
        },
    )
    .await?;
    if !inserted {
        return Err(AppError::StoreUnavailable(format!(
            "donation already exists for session {}",
            session.id
        )));
    }

    tracing::info!(
        "Created checkout session {} for donor {} ({} {} pence)",
        session.id,
        donor_id,
        fund,
        req.amount
    );

    Ok(Json(CreateCheckoutResponse {
        session_id: session.id,
        url: session.url,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_request() -> CreateCheckoutRequest {
        CreateCheckoutRequest {
            amount: 5000,
            fund_type: "general".to_string(),
            is_recurring: false,
            gift_aid: false,
            donor: DonorInfo {
                full_name: "Aisha Khan".to_string(),
                email: "aisha@example.com".to_string(),
                phone: None,
                address_line1: None,
                address_line2: None,
                city: None,
                postcode: None,
            },
            campaign_id: None,
            success_url: "https://example.org/donate/success".to_string(),
            cancel_url: "https://example.org/donate/cancelled".to_string(),
        }
    }

    #[test]
    fn accepts_a_plain_donation() {
        assert_eq!(validate(&base_request()).ok(), Some(FundType::General));
    }

    #[test]
    fn rejects_amount_below_minimum() {
        let mut req = base_request();
        req.amount = 99;
        assert!(validate(&req).is_err());
    }

    #[test]
    fn rejects_amount_above_ceiling() {
        let mut req = base_request();
        req.amount = 60_000_000;
        assert!(validate(&req).is_err());
    }

    #[test]
    fn accepts_boundary_amounts() {
        let mut req = base_request();
        req.amount = MIN_AMOUNT;
        assert!(validate(&req).is_ok());
        req.amount = MAX_AMOUNT;
        assert!(validate(&req).is_ok());
    }

    #[test]
    fn rejects_unknown_fund_type() {
        let mut req = base_request();
        req.fund_type = "lottery".to_string();
        assert!(validate(&req).is_err());
    }

    #[test]
    fn rejects_bad_email() {
        let mut req = base_request();
        req.donor.email = "not-an-email".to_string();
        assert!(validate(&req).is_err());
    }

    #[test]
    fn gift_aid_requires_postcode() {
        let mut req = base_request();
        req.gift_aid = true;
        req.donor.address_line1 = Some("12 High Street".to_string());
        req.donor.city = Some("Birmingham".to_string());
        assert!(validate(&req).is_err());

        req.donor.postcode = Some("B12 9QR".to_string());
        assert!(validate(&req).is_ok());
    }

    #[test]
    fn gift_aid_rejects_non_uk_postcode() {
        let mut req = base_request();
        req.gift_aid = true;
        req.donor.address_line1 = Some("12 High Street".to_string());
        req.donor.city = Some("Birmingham".to_string());
        req.donor.postcode = Some("90210".to_string());
        assert!(validate(&req).is_err());
    }

    #[test]
    fn gift_aid_requires_address_fields() {
        let mut req = base_request();
        req.gift_aid = true;
        req.donor.postcode = Some("SW1A 1AA".to_string());
        // missing line1 and city
        assert!(validate(&req).is_err());
    }

    #[test]
    fn uplift_is_a_quarter_rounded() {
        assert_eq!(gift_aid_uplift(100), 25);
        assert_eq!(gift_aid_uplift(150), 38); // 37.5 rounds up
        assert_eq!(gift_aid_uplift(5000), 1250);
        assert_eq!(gift_aid_uplift(999), 250); // 249.75 rounds up
        assert_eq!(gift_aid_uplift(1), 0); // 0.25 rounds down
    }
}
