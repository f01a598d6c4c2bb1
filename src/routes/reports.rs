use axum::extract::{Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json as AxumJson, Response};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

use crate::db;
use crate::db::models::DonationStatus;
use crate::AppState;

fn csv_escape(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        let escaped = s.replace('"', "\"\"");
        format!("\"{}\"", escaped)
    } else {
        s.to_string()
    }
}

#[derive(serde::Deserialize)]
pub struct ListParams {
    pub status: Option<String>,
    pub fund_type: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

fn parse_date(value: &Option<String>) -> Option<DateTime<Utc>> {
    value
        .as_ref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn build_filter(params: &ListParams) -> db::DonationFilter {
    db::DonationFilter {
        status: params.status.as_deref().and_then(DonationStatus::parse),
        fund_type: params.fund_type.clone(),
        start_date: parse_date(&params.start_date),
        end_date: parse_date(&params.end_date),
        limit: params.limit,
        offset: params.offset,
    }
}

pub async fn list_donations(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> impl IntoResponse {
    match db::list_donations(&state.db, &build_filter(&params)).await {
        Ok((donations, total)) => AxumJson(serde_json::json!({
            "donations": donations,
            "total": total,
        }))
        .into_response(),
        Err(e) => {
            tracing::error!("DB Query Error: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Database Error").into_response()
        }
    }
}

#[derive(serde::Deserialize)]
pub struct StatsParams {
    pub period: Option<String>,
}

#[derive(serde::Serialize)]
pub struct StatsResponse {
    pub total_amount: i64,
    pub total_donations: i64,
    pub average_donation: i64,
    pub recurring_amount: i64,
    pub gift_aid_amount: i64,
    pub by_fund_type: HashMap<String, i64>,
}

pub async fn donation_stats(
    State(state): State<AppState>,
    Query(params): Query<StatsParams>,
) -> impl IntoResponse {
    let since = match params.period.as_deref() {
        Some("week") => Utc::now() - Duration::days(7),
        Some("month") => Utc::now() - Duration::days(30),
        Some("year") => Utc::now() - Duration::days(365),
        _ => DateTime::<Utc>::UNIX_EPOCH,
    };

    match db::completed_donations_since(&state.db, since).await {
        Ok(donations) => {
            let total_amount: i64 = donations.iter().map(|d| d.amount).sum();
            let recurring_amount: i64 = donations
                .iter()
                .filter(|d| d.is_recurring)
                .map(|d| d.amount)
                .sum();
            let gift_aid_amount: i64 = donations.iter().map(|d| d.gift_aid_amount).sum();
            let mut by_fund_type: HashMap<String, i64> = HashMap::new();
            for d in &donations {
                *by_fund_type.entry(d.fund_type.clone()).or_insert(0) += d.amount;
            }
            let total_donations = donations.len() as i64;
            let average_donation = if total_donations > 0 {
                (total_amount as f64 / total_donations as f64).round() as i64
            } else {
                0
            };
            AxumJson(StatsResponse {
                total_amount,
                total_donations,
                average_donation,
                recurring_amount,
                gift_aid_amount,
                by_fund_type,
            })
            .into_response()
        }
        Err(e) => {
            tracing::error!("DB Query Error: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Database Error").into_response()
        }
    }
}

pub async fn export_csv(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> impl IntoResponse {
    let mut filter = build_filter(&params);
    filter.limit = Some(filter.limit.unwrap_or(1000));
    match db::list_donations(&state.db, &filter).await {
        Ok((donations, _)) => {
            let mut w = String::new();
            w.push_str(
                "id,created_at,completed_at,status,fund_type,amount,currency,recurring,gift_aid,gift_aid_amount,donor_id\n",
            );
            for d in donations {
                let created = d.created_at.to_rfc3339();
                let completed = d.completed_at.map(|t| t.to_rfc3339()).unwrap_or_default();
                let donor = d.donor_id.unwrap_or_default();
                w.push_str(&format!(
                    "{},{},{},{},{},{},{},{},{},{},{}\n",
                    csv_escape(&d.id),
                    csv_escape(&created),
                    csv_escape(&completed),
                    csv_escape(d.status.as_str()),
                    csv_escape(&d.fund_type),
                    d.amount,
                    csv_escape(&d.currency),
                    d.is_recurring,
                    d.gift_aid_claimed,
                    d.gift_aid_amount,
                    csv_escape(&donor),
                ));
            }

            let mut resp = Response::new(w.into());
            let headers = resp.headers_mut();
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/csv; charset=utf-8"),
            );
            headers.insert(
                header::CONTENT_DISPOSITION,
                HeaderValue::from_static("attachment; filename=donations.csv"),
            );
            resp
        }
        Err(e) => {
            tracing::error!("DB Query Error: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Database Error").into_response()
        }
    }
}

#[derive(serde::Deserialize)]
pub struct SubscriptionParams {
    pub status: Option<String>,
}

pub async fn list_subscriptions(
    State(state): State<AppState>,
    Query(params): Query<SubscriptionParams>,
) -> impl IntoResponse {
    match db::list_subscriptions(&state.db, params.status.as_deref()).await {
        Ok(subscriptions) => {
            AxumJson(serde_json::json!({ "subscriptions": subscriptions })).into_response()
        }
        Err(e) => {
            tracing::error!("DB Query Error: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Database Error").into_response()
        }
    }
}
