//! Configuration module for finance-service.

use service_core::config::{self as core_config, env_or, env_required};
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone)]
pub struct FinanceConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub billing: BillingSettings,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// Knobs that change ledger behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillingSettings {
    /// Day of the billing month used as due date for generated invoices.
    pub invoice_due_day: u32,
    /// Overdue notices become URGENT once an invoice is this many days late.
    pub overdue_urgent_after_days: i64,
}

impl Default for BillingSettings {
    fn default() -> Self {
        Self {
            invoice_due_day: 10,
            overdue_urgent_after_days: 30,
        }
    }
}

impl BillingSettings {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            invoice_due_day: env_or("INVOICE_DUE_DAY", defaults.invoice_due_day).clamp(1, 28),
            overdue_urgent_after_days: env_or(
                "OVERDUE_URGENT_AFTER_DAYS",
                defaults.overdue_urgent_after_days,
            )
            .max(1),
        }
    }
}

impl FinanceConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "finance-service".to_string()),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok(),
            database: DatabaseConfig {
                url: env_required("DATABASE_URL")?,
                max_connections: env_or("DATABASE_MAX_CONNECTIONS", 10),
                min_connections: env_or("DATABASE_MIN_CONNECTIONS", 2),
            },
            billing: BillingSettings::from_env(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn due_day_is_clamped_into_every_month() {
        env::set_var("INVOICE_DUE_DAY", "31");
        assert_eq!(BillingSettings::from_env().invoice_due_day, 28);
        env::set_var("INVOICE_DUE_DAY", "0");
        assert_eq!(BillingSettings::from_env().invoice_due_day, 1);
        env::remove_var("INVOICE_DUE_DAY");
        assert_eq!(BillingSettings::from_env().invoice_due_day, 10);
    }

    #[test]
    #[serial]
    fn database_url_is_required() {
        env::remove_var("DATABASE_URL");
        assert!(matches!(
            FinanceConfig::from_env(),
            Err(AppError::ConfigError(_))
        ));
    }
}
