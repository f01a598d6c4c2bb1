use chrono::{DateTime, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use std::env;
use std::path::Path;

use crate::error::StoreError;

pub mod models;

use models::{Donation, DonationReceipt, DonationStatus, Donor, GiftAidDeclaration, Subscription};

pub type DbPool = Pool<SqliteConnectionManager>;

pub async fn init_pool() -> anyhow::Result<DbPool> {
    let path = env::var("DATABASE_PATH").unwrap_or_else(|_| "data/donations.db".to_string());
    init_pool_at(&path)
}

/// Builds a pool for an explicit database path and applies the schema.
/// Tests point this at a throwaway file.
pub fn init_pool_at(path: &str) -> anyhow::Result<DbPool> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let manager = SqliteConnectionManager::file(path).with_init(|conn| {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))
    });
    let pool = Pool::builder()
        .max_size(10)
        .connection_timeout(std::time::Duration::from_secs(60))
        .build(manager)
        .map_err(|e| anyhow::anyhow!("Failed to create DB pool: {}", e))?;

    init_schema(&pool)?;
    Ok(pool)
}

fn init_schema(pool: &DbPool) -> anyhow::Result<()> {
    let conn = pool.get()?;
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS donors (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE COLLATE NOCASE,
            full_name TEXT,
            phone TEXT,
            address_line1 TEXT,
            address_line2 TEXT,
            city TEXT,
            postcode TEXT,
            gift_aid_eligible INTEGER NOT NULL DEFAULT 0,
            stripe_customer_id TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS donations (
            id TEXT PRIMARY KEY,
            donor_id TEXT REFERENCES donors(id),
            stripe_checkout_session_id TEXT UNIQUE,
            stripe_payment_intent_id TEXT,
            stripe_invoice_id TEXT,
            stripe_subscription_id TEXT,
            amount INTEGER NOT NULL,
            currency TEXT NOT NULL,
            fund_type TEXT NOT NULL,
            campaign_id TEXT,
            is_recurring INTEGER NOT NULL DEFAULT 0,
            recurring_interval TEXT,
            gift_aid_claimed INTEGER NOT NULL DEFAULT 0,
            gift_aid_amount INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL,
            metadata TEXT,
            completed_at TEXT,
            created_at TEXT NOT NULL
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_donations_payment_intent
            ON donations(stripe_payment_intent_id)
            WHERE stripe_payment_intent_id IS NOT NULL;

        CREATE UNIQUE INDEX IF NOT EXISTS idx_donations_invoice
            ON donations(stripe_invoice_id)
            WHERE stripe_invoice_id IS NOT NULL;

        CREATE TABLE IF NOT EXISTS subscriptions (
            id TEXT PRIMARY KEY,
            donor_id TEXT REFERENCES donors(id),
            stripe_subscription_id TEXT NOT NULL UNIQUE,
            stripe_price_id TEXT,
            amount INTEGER NOT NULL,
            currency TEXT NOT NULL,
            fund_type TEXT NOT NULL,
            interval TEXT NOT NULL,
            status TEXT NOT NULL,
            gift_aid_eligible INTEGER NOT NULL DEFAULT 0,
            current_period_start TEXT,
            current_period_end TEXT,
            cancelled_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS gift_aid_declarations (
            id TEXT PRIMARY KEY,
            donor_id TEXT NOT NULL REFERENCES donors(id),
            declaration_text TEXT NOT NULL,
            declaration_version TEXT NOT NULL,
            full_name TEXT NOT NULL,
            address_line1 TEXT NOT NULL,
            address_line2 TEXT,
            city TEXT NOT NULL,
            postcode TEXT NOT NULL,
            ip_address TEXT,
            user_agent TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS donation_receipts (
            id TEXT PRIMARY KEY,
            donation_id TEXT NOT NULL UNIQUE REFERENCES donations(id),
            receipt_number TEXT NOT NULL UNIQUE,
            sent_at TEXT,
            created_at TEXT NOT NULL
        );
        "#,
    )?;
    Ok(())
}

pub struct DonorFields<'a> {
    pub full_name: Option<&'a str>,
    pub phone: Option<&'a str>,
    pub address_line1: Option<&'a str>,
    pub address_line2: Option<&'a str>,
    pub city: Option<&'a str>,
    pub postcode: Option<&'a str>,
    pub gift_aid_eligible: bool,
}

/// Looks up a donor by email (case-insensitive) and merges the supplied
/// fields, or inserts a new row. The `ON CONFLICT` clause makes concurrent
/// first-time submissions from the same email collapse into one row.
/// Only non-null supplied contact fields overwrite existing values.
pub async fn upsert_donor(
    pool: &DbPool,
    email: &str,
    fields: &DonorFields<'_>,
) -> Result<String, StoreError> {
    let conn = pool.get()?;
    let now = Utc::now();
    let id = uuid::Uuid::new_v4().to_string();
    let email = email.trim().to_lowercase();

    conn.execute(
        r#"
        INSERT INTO donors (id, email, full_name, phone, address_line1, address_line2,
                            city, postcode, gift_aid_eligible, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
        ON CONFLICT(email) DO UPDATE SET
            full_name = COALESCE(excluded.full_name, donors.full_name),
            phone = COALESCE(excluded.phone, donors.phone),
            address_line1 = COALESCE(excluded.address_line1, donors.address_line1),
            address_line2 = COALESCE(excluded.address_line2, donors.address_line2),
            city = COALESCE(excluded.city, donors.city),
            postcode = COALESCE(excluded.postcode, donors.postcode),
            gift_aid_eligible = excluded.gift_aid_eligible,
            updated_at = excluded.updated_at
        "#,
        rusqlite::params![
            id,
            email,
            fields.full_name,
            fields.phone,
            fields.address_line1,
            fields.address_line2,
            fields.city,
            fields.postcode,
            fields.gift_aid_eligible,
            now,
        ],
    )?;

    let donor_id: String = conn.query_row(
        "SELECT id FROM donors WHERE email = ?1",
        rusqlite::params![email],
        |row| row.get(0),
    )?;
    Ok(donor_id)
}

pub async fn get_donor(pool: &DbPool, donor_id: &str) -> Result<Option<Donor>, StoreError> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare("SELECT * FROM donors WHERE id = ?1")?;
    let mut rows = stmt.query_map(rusqlite::params![donor_id], donor_from_row)?;
    match rows.next() {
        Some(row) => Ok(Some(row?)),
        None => Ok(None),
    }
}

pub async fn get_donor_by_email(pool: &DbPool, email: &str) -> Result<Option<Donor>, StoreError> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare("SELECT * FROM donors WHERE email = ?1")?;
    let mut rows = stmt.query_map(rusqlite::params![email.trim().to_lowercase()], donor_from_row)?;
    match rows.next() {
        Some(row) => Ok(Some(row?)),
        None => Ok(None),
    }
}

pub async fn set_donor_customer_id(
    pool: &DbPool,
    donor_id: &str,
    customer_id: &str,
) -> Result<(), StoreError> {
    let conn = pool.get()?;
    conn.execute(
        "UPDATE donors SET stripe_customer_id = ?1, updated_at = ?2 WHERE id = ?3",
        rusqlite::params![customer_id, Utc::now(), donor_id],
    )?;
    Ok(())
}

pub struct NewDeclaration<'a> {
    pub donor_id: &'a str,
    pub declaration_text: &'a str,
    pub declaration_version: &'a str,
    pub full_name: &'a str,
    pub address_line1: &'a str,
    pub address_line2: Option<&'a str>,
    pub city: &'a str,
    pub postcode: &'a str,
    pub ip_address: Option<&'a str>,
    pub user_agent: Option<&'a str>,
}

pub async fn insert_gift_aid_declaration(
    pool: &DbPool,
    decl: &NewDeclaration<'_>,
) -> Result<String, StoreError> {
    let conn = pool.get()?;
    let id = uuid::Uuid::new_v4().to_string();
    conn.execute(
        r#"
        INSERT INTO gift_aid_declarations
            (id, donor_id, declaration_text, declaration_version, full_name,
             address_line1, address_line2, city, postcode, ip_address, user_agent, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        "#,
        rusqlite::params![
            id,
            decl.donor_id,
            decl.declaration_text,
            decl.declaration_version,
            decl.full_name,
            decl.address_line1,
            decl.address_line2,
            decl.city,
            decl.postcode,
            decl.ip_address,
            decl.user_agent,
            Utc::now(),
        ],
    )?;
    Ok(id)
}

pub async fn list_declarations_for_donor(
    pool: &DbPool,
    donor_id: &str,
) -> Result<Vec<GiftAidDeclaration>, StoreError> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(
        "SELECT * FROM gift_aid_declarations WHERE donor_id = ?1 ORDER BY created_at",
    )?;
    let rows = stmt.query_map(rusqlite::params![donor_id], declaration_from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub struct NewDonation<'a> {
    pub id: &'a str,
    pub donor_id: Option<&'a str>,
    pub stripe_checkout_session_id: Option<&'a str>,
    pub stripe_payment_intent_id: Option<&'a str>,
    pub stripe_invoice_id: Option<&'a str>,
    pub stripe_subscription_id: Option<&'a str>,
    pub amount: i64,
    pub currency: &'a str,
    pub fund_type: &'a str,
    pub campaign_id: Option<&'a str>,
    pub is_recurring: bool,
    pub recurring_interval: Option<&'a str>,
    pub gift_aid_claimed: bool,
    pub gift_aid_amount: i64,
    pub status: DonationStatus,
    pub metadata: Option<&'a str>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Inserts a donation row. Returns `Ok(false)` when a uniqueness constraint
/// (checkout session, payment intent or invoice) fired, i.e. the row already
/// exists.
pub async fn insert_donation(pool: &DbPool, d: &NewDonation<'_>) -> Result<bool, StoreError> {
    let conn = pool.get()?;
    let result = conn.execute(
        r#"
        INSERT INTO donations
            (id, donor_id, stripe_checkout_session_id, stripe_payment_intent_id,
             stripe_invoice_id, stripe_subscription_id, amount, currency, fund_type,
             campaign_id, is_recurring, recurring_interval, gift_aid_claimed,
             gift_aid_amount, status, metadata, completed_at, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
        "#,
        rusqlite::params![
            d.id,
            d.donor_id,
            d.stripe_checkout_session_id,
            d.stripe_payment_intent_id,
            d.stripe_invoice_id,
            d.stripe_subscription_id,
            d.amount,
            d.currency,
            d.fund_type,
            d.campaign_id,
            d.is_recurring,
            d.recurring_interval,
            d.gift_aid_claimed,
            d.gift_aid_amount,
            d.status.as_str(),
            d.metadata,
            d.completed_at,
            Utc::now(),
        ],
    );
    match result {
        Ok(_) => Ok(true),
        Err(e) => match StoreError::from(e) {
            StoreError::Conflict => Ok(false),
            other => Err(other),
        },
    }
}

pub async fn find_donation_by_session(
    pool: &DbPool,
    session_id: &str,
) -> Result<Option<Donation>, StoreError> {
    let conn = pool.get()?;
    let mut stmt =
        conn.prepare("SELECT * FROM donations WHERE stripe_checkout_session_id = ?1")?;
    let mut rows = stmt.query_map(rusqlite::params![session_id], donation_from_row)?;
    match rows.next() {
        Some(row) => Ok(Some(row?)),
        None => Ok(None),
    }
}

pub async fn find_donation_by_payment_intent(
    pool: &DbPool,
    payment_intent_id: &str,
) -> Result<Option<Donation>, StoreError> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare("SELECT * FROM donations WHERE stripe_payment_intent_id = ?1")?;
    let mut rows = stmt.query_map(rusqlite::params![payment_intent_id], donation_from_row)?;
    match rows.next() {
        Some(row) => Ok(Some(row?)),
        None => Ok(None),
    }
}

/// pending -> completed transition, keyed by checkout session. The status
/// predicate in the WHERE clause is what makes replays a no-op; returns the
/// updated row, or `None` when no pending donation matched.
pub async fn complete_donation(
    pool: &DbPool,
    session_id: &str,
    payment_intent_id: Option<&str>,
    subscription_id: Option<&str>,
    completed_at: DateTime<Utc>,
) -> Result<Option<Donation>, StoreError> {
    let conn = pool.get()?;
    let updated = conn.execute(
        r#"
        UPDATE donations
        SET status = 'completed',
            stripe_payment_intent_id = ?1,
            stripe_subscription_id = ?2,
            completed_at = ?3
        WHERE stripe_checkout_session_id = ?4 AND status = 'pending'
        "#,
        rusqlite::params![payment_intent_id, subscription_id, completed_at, session_id],
    )?;
    if updated == 0 {
        return Ok(None);
    }
    drop(conn);
    find_donation_by_session(pool, session_id).await
}

/// pending -> failed, keyed by payment intent. Terminal states never match.
pub async fn mark_donation_failed(
    pool: &DbPool,
    payment_intent_id: &str,
) -> Result<bool, StoreError> {
    let conn = pool.get()?;
    let updated = conn.execute(
        "UPDATE donations SET status = 'failed'
         WHERE stripe_payment_intent_id = ?1 AND status = 'pending'",
        rusqlite::params![payment_intent_id],
    )?;
    Ok(updated > 0)
}

/// completed -> refunded, keyed by payment intent. One-way.
pub async fn mark_donation_refunded(
    pool: &DbPool,
    payment_intent_id: &str,
) -> Result<bool, StoreError> {
    let conn = pool.get()?;
    let updated = conn.execute(
        "UPDATE donations SET status = 'refunded'
         WHERE stripe_payment_intent_id = ?1 AND status = 'completed'",
        rusqlite::params![payment_intent_id],
    )?;
    Ok(updated > 0)
}

/// Returns `Ok(false)` when a receipt already exists for the donation.
pub async fn insert_receipt(
    pool: &DbPool,
    donation_id: &str,
    receipt_number: &str,
) -> Result<bool, StoreError> {
    let conn = pool.get()?;
    let result = conn.execute(
        "INSERT INTO donation_receipts (id, donation_id, receipt_number, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![
            uuid::Uuid::new_v4().to_string(),
            donation_id,
            receipt_number,
            Utc::now(),
        ],
    );
    match result {
        Ok(_) => Ok(true),
        Err(e) => match StoreError::from(e) {
            StoreError::Conflict => Ok(false),
            other => Err(other),
        },
    }
}

pub async fn get_receipt_for_donation(
    pool: &DbPool,
    donation_id: &str,
) -> Result<Option<DonationReceipt>, StoreError> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare("SELECT * FROM donation_receipts WHERE donation_id = ?1")?;
    let mut rows = stmt.query_map(rusqlite::params![donation_id], receipt_from_row)?;
    match rows.next() {
        Some(row) => Ok(Some(row?)),
        None => Ok(None),
    }
}

pub struct NewSubscription<'a> {
    pub donor_id: Option<&'a str>,
    pub stripe_subscription_id: &'a str,
    pub stripe_price_id: Option<&'a str>,
    pub amount: i64,
    pub currency: &'a str,
    pub fund_type: &'a str,
    pub interval: &'a str,
    pub status: &'a str,
    pub gift_aid_eligible: bool,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
}

/// Returns `Ok(false)` when the external subscription reference is already recorded.
pub async fn insert_subscription(
    pool: &DbPool,
    s: &NewSubscription<'_>,
) -> Result<bool, StoreError> {
    let conn = pool.get()?;
    let now = Utc::now();
    let result = conn.execute(
        r#"
        INSERT INTO subscriptions
            (id, donor_id, stripe_subscription_id, stripe_price_id, amount, currency,
             fund_type, interval, status, gift_aid_eligible,
             current_period_start, current_period_end, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)
        "#,
        rusqlite::params![
            uuid::Uuid::new_v4().to_string(),
            s.donor_id,
            s.stripe_subscription_id,
            s.stripe_price_id,
            s.amount,
            s.currency,
            s.fund_type,
            s.interval,
            s.status,
            s.gift_aid_eligible,
            s.current_period_start,
            s.current_period_end,
            now,
        ],
    );
    match result {
        Ok(_) => Ok(true),
        Err(e) => match StoreError::from(e) {
            StoreError::Conflict => Ok(false),
            other => Err(other),
        },
    }
}

pub async fn get_subscription(
    pool: &DbPool,
    stripe_subscription_id: &str,
) -> Result<Option<Subscription>, StoreError> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare("SELECT * FROM subscriptions WHERE stripe_subscription_id = ?1")?;
    let mut rows = stmt.query_map(rusqlite::params![stripe_subscription_id], subscription_from_row)?;
    match rows.next() {
        Some(row) => Ok(Some(row?)),
        None => Ok(None),
    }
}

pub async fn update_subscription_period(
    pool: &DbPool,
    stripe_subscription_id: &str,
    status: &str,
    period_start: Option<DateTime<Utc>>,
    period_end: Option<DateTime<Utc>>,
) -> Result<bool, StoreError> {
    let conn = pool.get()?;
    let updated = conn.execute(
        r#"
        UPDATE subscriptions
        SET status = ?1, current_period_start = ?2, current_period_end = ?3, updated_at = ?4
        WHERE stripe_subscription_id = ?5
        "#,
        rusqlite::params![status, period_start, period_end, Utc::now(), stripe_subscription_id],
    )?;
    Ok(updated > 0)
}

pub async fn cancel_subscription(
    pool: &DbPool,
    stripe_subscription_id: &str,
    cancelled_at: DateTime<Utc>,
) -> Result<bool, StoreError> {
    let conn = pool.get()?;
    let updated = conn.execute(
        r#"
        UPDATE subscriptions
        SET status = 'cancelled', cancelled_at = ?1, updated_at = ?2
        WHERE stripe_subscription_id = ?3
        "#,
        rusqlite::params![cancelled_at, Utc::now(), stripe_subscription_id],
    )?;
    Ok(updated > 0)
}

#[derive(Default)]
pub struct DonationFilter {
    pub status: Option<DonationStatus>,
    pub fund_type: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn list_donations(
    pool: &DbPool,
    filter: &DonationFilter,
) -> Result<(Vec<Donation>, i64), StoreError> {
    let conn = pool.get()?;

    let mut clauses: Vec<&str> = Vec::new();
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
    if let Some(status) = filter.status {
        clauses.push("status = ?");
        params.push(Box::new(status.as_str().to_string()));
    }
    if let Some(fund) = &filter.fund_type {
        clauses.push("fund_type = ?");
        params.push(Box::new(fund.clone()));
    }
    if let Some(start) = filter.start_date {
        clauses.push("created_at >= ?");
        params.push(Box::new(start));
    }
    if let Some(end) = filter.end_date {
        clauses.push("created_at <= ?");
        params.push(Box::new(end));
    }
    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM donations{}", where_sql),
        rusqlite::params_from_iter(params.iter().map(|p| p.as_ref())),
        |row| row.get(0),
    )?;

    let limit = filter.limit.unwrap_or(100).clamp(1, 1000);
    let offset = filter.offset.unwrap_or(0).max(0);
    let sql = format!(
        "SELECT * FROM donations{} ORDER BY created_at DESC LIMIT {} OFFSET {}",
        where_sql, limit, offset
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        rusqlite::params_from_iter(params.iter().map(|p| p.as_ref())),
        donation_from_row,
    )?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok((out, total))
}

/// Completed donations created on or after `since`, used by the stats endpoint.
pub async fn completed_donations_since(
    pool: &DbPool,
    since: DateTime<Utc>,
) -> Result<Vec<Donation>, StoreError> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(
        "SELECT * FROM donations WHERE status = 'completed' AND created_at >= ?1",
    )?;
    let rows = stmt.query_map(rusqlite::params![since], donation_from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub async fn list_subscriptions(
    pool: &DbPool,
    status: Option<&str>,
) -> Result<Vec<Subscription>, StoreError> {
    let conn = pool.get()?;
    let mut out = Vec::new();
    match status {
        Some(status) => {
            let mut stmt = conn.prepare(
                "SELECT * FROM subscriptions WHERE status = ?1 ORDER BY created_at DESC",
            )?;
            let rows = stmt.query_map(rusqlite::params![status], subscription_from_row)?;
            for row in rows {
                out.push(row?);
            }
        }
        None => {
            let mut stmt =
                conn.prepare("SELECT * FROM subscriptions ORDER BY created_at DESC")?;
            let rows = stmt.query_map([], subscription_from_row)?;
            for row in rows {
                out.push(row?);
            }
        }
    }
    Ok(out)
}

fn donor_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Donor> {
    Ok(Donor {
        id: row.get("id")?,
        email: row.get("email")?,
        full_name: row.get("full_name")?,
        phone: row.get("phone")?,
        address_line1: row.get("address_line1")?,
        address_line2: row.get("address_line2")?,
        city: row.get("city")?,
        postcode: row.get("postcode")?,
        gift_aid_eligible: row.get("gift_aid_eligible")?,
        stripe_customer_id: row.get("stripe_customer_id")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn donation_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Donation> {
    let status_str: String = row.get("status")?;
    let status = DonationStatus::parse(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("unknown donation status: {}", status_str).into(),
        )
    })?;
    Ok(Donation {
        id: row.get("id")?,
        donor_id: row.get("donor_id")?,
        stripe_checkout_session_id: row.get("stripe_checkout_session_id")?,
        stripe_payment_intent_id: row.get("stripe_payment_intent_id")?,
        stripe_invoice_id: row.get("stripe_invoice_id")?,
        stripe_subscription_id: row.get("stripe_subscription_id")?,
        amount: row.get("amount")?,
        currency: row.get("currency")?,
        fund_type: row.get("fund_type")?,
        campaign_id: row.get("campaign_id")?,
        is_recurring: row.get("is_recurring")?,
        recurring_interval: row.get("recurring_interval")?,
        gift_aid_claimed: row.get("gift_aid_claimed")?,
        gift_aid_amount: row.get("gift_aid_amount")?,
        status,
        metadata: row.get("metadata")?,
        completed_at: row.get("completed_at")?,
        created_at: row.get("created_at")?,
    })
}

fn subscription_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Subscription> {
    Ok(Subscription {
        id: row.get("id")?,
        donor_id: row.get("donor_id")?,
        stripe_subscription_id: row.get("stripe_subscription_id")?,
        stripe_price_id: row.get("stripe_price_id")?,
        amount: row.get("amount")?,
        currency: row.get("currency")?,
        fund_type: row.get("fund_type")?,
        interval: row.get("interval")?,
        status: row.get("status")?,
        gift_aid_eligible: row.get("gift_aid_eligible")?,
        current_period_start: row.get("current_period_start")?,
        current_period_end: row.get("current_period_end")?,
        cancelled_at: row.get("cancelled_at")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn declaration_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<GiftAidDeclaration> {
    Ok(GiftAidDeclaration {
        id: row.get("id")?,
        donor_id: row.get("donor_id")?,
        declaration_text: row.get("declaration_text")?,
        declaration_version: row.get("declaration_version")?,
        full_name: row.get("full_name")?,
        address_line1: row.get("address_line1")?,
        address_line2: row.get("address_line2")?,
        city: row.get("city")?,
        postcode: row.get("postcode")?,
        ip_address: row.get("ip_address")?,
        user_agent: row.get("user_agent")?,
        created_at: row.get("created_at")?,
    })
}

fn receipt_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DonationReceipt> {
    Ok(DonationReceipt {
        id: row.get("id")?,
        donation_id: row.get("donation_id")?,
        receipt_number: row.get("receipt_number")?,
        sent_at: row.get("sent_at")?,
        created_at: row.get("created_at")?,
    })
}
