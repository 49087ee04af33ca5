use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use service_core::error::AppError;
use validator::Validate;

use crate::models::{DateRange, Period};
use crate::services::finance::ReportWindow;
use crate::utils::validation::non_negative;

/// Either `period=YYYY-MM`, or `from` and `to` together, or nothing for all time.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct ReportQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub period: Option<Period>,
}

impl ReportQuery {
    pub fn window(&self) -> Result<ReportWindow, AppError> {
        match (self.period, self.from, self.to) {
            (None, None, None) => Ok(ReportWindow::AllTime),
            (Some(period), None, None) => Ok(ReportWindow::Period(period)),
            (None, Some(from), Some(to)) => Ok(ReportWindow::Range(DateRange::new(from, to)?)),
            (Some(_), _, _) => Err(AppError::BadRequest(anyhow::anyhow!(
                "Use either period or from/to, not both"
            ))),
            _ => Err(AppError::BadRequest(anyhow::anyhow!(
                "Both from and to are required for a date range"
            ))),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateExpenseRequest {
    #[validate(length(min = 1, max = 100, message = "Category is required"))]
    pub category: String,
    #[validate(length(max = 500, message = "Description is too long"))]
    pub description: Option<String>,
    #[validate(custom(function = "non_negative"))]
    pub amount: Decimal,
    pub expense_date: NaiveDate,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateDonationRequest {
    #[validate(length(min = 1, max = 200, message = "Donor name is required"))]
    pub donor_name: String,
    #[validate(custom(function = "non_negative"))]
    pub amount: Decimal,
    pub donation_date: NaiveDate,
    #[validate(length(max = 500, message = "Note is too long"))]
    pub note: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn empty_query_means_all_time() {
        assert_eq!(ReportQuery::default().window().unwrap(), ReportWindow::AllTime);
    }

    #[test]
    fn half_open_range_is_rejected() {
        let query = ReportQuery {
            from: Some(date(2026, 1, 1)),
            ..Default::default()
        };
        assert!(matches!(query.window(), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn period_and_range_are_exclusive() {
        let query = ReportQuery {
            from: Some(date(2026, 1, 1)),
            to: Some(date(2026, 1, 31)),
            period: Some("2026-01".parse().unwrap()),
        };
        assert!(matches!(query.window(), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn range_bounds_are_checked() {
        let query = ReportQuery {
            from: Some(date(2026, 2, 1)),
            to: Some(date(2026, 1, 1)),
            period: None,
        };
        assert!(query.window().is_err());
    }
}
