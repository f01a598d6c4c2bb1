use axum::body::Bytes;
use axum::extract::{Json, State};
use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde_json::json;

use crate::db;
use crate::db::models::DonationStatus;
use crate::error::AppError;
use crate::payments::{
    self, ChargeObject, CheckoutSessionObject, InvoiceObject, PaymentIntentObject,
    SessionMetadata, SubscriptionObject, WebhookEvent,
};
use crate::routes::checkout::gift_aid_uplift;
use crate::AppState;

const RECEIPT_PREFIX: &str = "MAM";

/// Donor-facing receipt number: fixed prefix, compact date, zero-padded
/// random suffix. Uniqueness is ultimately enforced by the store.
pub fn receipt_number(now: DateTime<Utc>) -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..10_000);
    format!("{}-{}-{:04}", RECEIPT_PREFIX, now.format("%Y%m%d"), suffix)
}

/// Webhook delivery endpoint. The body must stay unparsed until the
/// signature check has passed.
///
/// Error policy: signature failures are rejected outright; malformed-but-
/// authentic payloads and unknown references are logged and acknowledged so
/// redelivery storms stop; transient store errors return 500 so the provider
/// redelivers.
pub async fn handle_stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, AppError> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::InvalidSignature)?;

    let event = state
        .provider
        .verify_event(&body, signature)
        .map_err(AppError::from)?;

    match event.kind.as_str() {
        "checkout.session.completed" => handle_checkout_completed(&state, &event).await?,
        "invoice.payment_succeeded" => handle_invoice_paid(&state, &event).await?,
        "customer.subscription.updated" => handle_subscription_updated(&state, &event).await?,
        "customer.subscription.deleted" => handle_subscription_deleted(&state, &event).await?,
        "payment_intent.payment_failed" => handle_payment_failed(&state, &event).await?,
        "charge.refunded" => handle_charge_refunded(&state, &event).await?,
        other => {
            // Forward compatibility with the provider's evolving event catalog.
            tracing::debug!("Ignoring unhandled event kind: {}", other);
        }
    }

    Ok(Json(json!({ "received": true })))
}

fn decode_object<T: serde::de::DeserializeOwned>(event: &WebhookEvent) -> Option<T> {
    match serde_json::from_value(event.object.clone()) {
        Ok(obj) => Some(obj),
        Err(e) => {
            tracing::error!("Malformed {} payload in {}: {}", event.kind, event.id, e);
            None
        }
    }
}

async fn handle_checkout_completed(state: &AppState, event: &WebhookEvent) -> Result<(), AppError> {
    let Some(session) = decode_object::<CheckoutSessionObject>(event) else {
        return Ok(());
    };

    let Some(existing) = db::find_donation_by_session(&state.db, &session.id).await? else {
        tracing::warn!("No donation recorded for checkout session {}", session.id);
        return Ok(());
    };

    let metadata = match SessionMetadata::from_map(&session.metadata) {
        Ok(md) => md,
        Err(e) => {
            tracing::error!("Rejecting event {} with bad metadata: {}", event.id, e);
            return Ok(());
        }
    };

    // Idempotency guard: only a pending row transitions. A redelivered event
    // still falls through to the receipt/subscription inserts below, where
    // uniqueness constraints make the writes no-ops.
    let donation = if existing.status == DonationStatus::Pending {
        match db::complete_donation(
            &state.db,
            &session.id,
            session.payment_intent.as_deref(),
            session.subscription.as_deref(),
            Utc::now(),
        )
        .await?
        {
            Some(d) => d,
            // Lost a race with a concurrent delivery of the same event.
            None => {
                tracing::info!("Donation already processed: {}", session.id);
                db::find_donation_by_session(&state.db, &session.id)
                    .await?
                    .unwrap_or(existing)
            }
        }
    } else {
        tracing::info!(
            "Donation for session {} already in state {:?}",
            session.id,
            existing.status
        );
        existing
    };

    let number = receipt_number(Utc::now());
    if db::insert_receipt(&state.db, &donation.id, &number).await? {
        // Downstream email/receipt delivery hooks in here; the receipt row
        // is guaranteed to exist by this point.
        tracing::info!("Donation completed: {} receipt {}", donation.id, number);
    }

    if let Some(sub_id) = &session.subscription {
        ensure_subscription(state, sub_id, &donation, &metadata).await?;
    }

    Ok(())
}

async fn ensure_subscription(
    state: &AppState,
    sub_id: &str,
    donation: &db::models::Donation,
    metadata: &SessionMetadata,
) -> Result<(), AppError> {
    // Skip the provider round trip when the row already exists (replay).
    if db::get_subscription(&state.db, sub_id).await?.is_some() {
        return Ok(());
    }

    let provider_sub = state
        .provider
        .retrieve_subscription(sub_id)
        .await
        .map_err(AppError::from)?;

    let inserted = db::insert_subscription(
        &state.db,
        &db::NewSubscription {
            donor_id: donation.donor_id.as_deref(),
            stripe_subscription_id: sub_id,
            stripe_price_id: provider_sub.price_id.as_deref(),
            amount: donation.amount,
            currency: &donation.currency,
            fund_type: &donation.fund_type,
            interval: "month",
            status: &provider_sub.status,
            gift_aid_eligible: metadata.gift_aid,
            current_period_start: provider_sub.current_period_start,
            current_period_end: provider_sub.current_period_end,
        },
    )
    .await?;
    if inserted {
        tracing::info!("Recorded subscription {} for donation {}", sub_id, donation.id);
    }
    Ok(())
}

/// Billing-cycle renewals only; the first invoice of a subscription is
/// already covered by the checkout-completed branch.
async fn handle_invoice_paid(state: &AppState, event: &WebhookEvent) -> Result<(), AppError> {
    let Some(invoice) = decode_object::<InvoiceObject>(event) else {
        return Ok(());
    };
    let Some(sub_id) = invoice.subscription.as_deref() else {
        return Ok(());
    };
    if invoice.billing_reason.as_deref() != Some("subscription_cycle") {
        return Ok(());
    }

    let Some(subscription) = db::get_subscription(&state.db, sub_id).await? else {
        tracing::warn!("Renewal invoice for unknown subscription {}", sub_id);
        return Ok(());
    };

    // Eligibility was fixed at subscription creation; no donor or
    // declaration writes happen on renewals.
    let gift_aid_amount = if subscription.gift_aid_eligible {
        gift_aid_uplift(invoice.amount_paid)
    } else {
        0
    };

    let donation_id = uuid::Uuid::new_v4().to_string();
    // The invoice reference is the dedupe key; payment_intent can be null
    // (credit-balance and out-of-band payments) and must not be relied on.
    let inserted = db::insert_donation(
        &state.db,
        &db::NewDonation {
            id: &donation_id,
            donor_id: subscription.donor_id.as_deref(),
            stripe_checkout_session_id: None,
            stripe_payment_intent_id: invoice.payment_intent.as_deref(),
            stripe_invoice_id: Some(&invoice.id),
            stripe_subscription_id: Some(sub_id),
            amount: invoice.amount_paid,
            currency: &subscription.currency,
            fund_type: &subscription.fund_type,
            campaign_id: None,
            is_recurring: true,
            recurring_interval: Some("month"),
            gift_aid_claimed: subscription.gift_aid_eligible,
            gift_aid_amount,
            status: DonationStatus::Completed,
            metadata: None,
            completed_at: Some(Utc::now()),
        },
    )
    .await?;
    if inserted {
        tracing::info!("Recorded renewal donation for subscription {}", sub_id);
    } else {
        tracing::info!("Renewal already recorded for subscription {}", sub_id);
    }
    Ok(())
}

async fn handle_subscription_updated(state: &AppState, event: &WebhookEvent) -> Result<(), AppError> {
    let Some(sub) = decode_object::<SubscriptionObject>(event) else {
        return Ok(());
    };
    let found = db::update_subscription_period(
        &state.db,
        &sub.id,
        &sub.status,
        payments::timestamp_to_datetime(sub.current_period_start),
        payments::timestamp_to_datetime(sub.current_period_end),
    )
    .await?;
    if !found {
        tracing::warn!("Update for unknown subscription {}", sub.id);
    }
    Ok(())
}

async fn handle_subscription_deleted(state: &AppState, event: &WebhookEvent) -> Result<(), AppError> {
    let Some(sub) = decode_object::<SubscriptionObject>(event) else {
        return Ok(());
    };
    let found = db::cancel_subscription(&state.db, &sub.id, Utc::now()).await?;
    if !found {
        tracing::warn!("Cancellation for unknown subscription {}", sub.id);
    }
    Ok(())
}

async fn handle_payment_failed(state: &AppState, event: &WebhookEvent) -> Result<(), AppError> {
    let Some(intent) = decode_object::<PaymentIntentObject>(event) else {
        return Ok(());
    };
    if !db::mark_donation_failed(&state.db, &intent.id).await? {
        tracing::warn!("Payment failure for unmatched intent {}", intent.id);
    }
    Ok(())
}

async fn handle_charge_refunded(state: &AppState, event: &WebhookEvent) -> Result<(), AppError> {
    let Some(charge) = decode_object::<ChargeObject>(event) else {
        return Ok(());
    };
    let Some(intent_id) = charge.payment_intent.as_deref() else {
        return Ok(());
    };
    if !db::mark_donation_refunded(&state.db, intent_id).await? {
        tracing::warn!("Refund for unmatched intent {}", intent_id);
    }
    Ok(())
}
