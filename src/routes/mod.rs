pub mod checkout;
pub mod reports;
pub mod webhook;
