//! # Issuance Statistics
//!
//! Certificates issued and revoked per institute over an inclusive range
//! of calendar days (UTC). `startDate` and `endDate` are `YYYY-MM-DD`; the
//! window runs from `startDate` 00:00:00 to `endDate` 23:59:59.

use chrono::{DateTime, NaiveDate, Utc};
use dcert_store::{InstituteStats, StatsQuery};
use serde::Serialize;

use crate::caller::CallerIdentity;
use crate::error::IssuanceError;
use crate::service::IssuanceService;

/// Counts for one date range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsReport {
    pub start_date: String,
    pub end_date: String,
    pub institutes: Vec<InstituteStats>,
}

impl IssuanceService {
    /// Issuance statistics visible to `caller`: all institutes for admins,
    /// the caller's own institute otherwise.
    pub async fn issuance_stats(
        &self,
        caller: &CallerIdentity,
        start_date: &str,
        end_date: &str,
    ) -> Result<StatsReport, IssuanceError> {
        let (from, to) = parse_window(start_date, end_date)?;
        let institute_id = if caller.is_admin() {
            None
        } else {
            Some(caller.institute_id.ok_or_else(|| {
                IssuanceError::Forbidden("caller is not bound to an institute".into())
            })?)
        };
        let institutes = self
            .store
            .issuance_stats(&StatsQuery {
                from,
                to,
                institute_id,
            })
            .await?;
        Ok(StatsReport {
            start_date: start_date.to_string(),
            end_date: end_date.to_string(),
            institutes,
        })
    }
}

/// Parse an inclusive `YYYY-MM-DD` day range into a UTC instant window.
pub fn parse_window(
    start_date: &str,
    end_date: &str,
) -> Result<(DateTime<Utc>, DateTime<Utc>), IssuanceError> {
    let start = parse_day(start_date, "startDate")?;
    let end = parse_day(end_date, "endDate")?;
    if end < start {
        return Err(IssuanceError::InvalidInput(
            "endDate is before startDate".into(),
        ));
    }
    let from = start.and_hms_opt(0, 0, 0);
    let to = end.and_hms_opt(23, 59, 59);
    match (from, to) {
        (Some(from), Some(to)) => Ok((from.and_utc(), to.and_utc())),
        _ => Err(IssuanceError::InvalidInput("date out of range".into())),
    }
}

fn parse_day(s: &str, field: &str) -> Result<NaiveDate, IssuanceError> {
    let invalid = || IssuanceError::InvalidInput(format!("{field} must be YYYY-MM-DD, got {s:?}"));
    if s.len() != 10 {
        return Err(invalid());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| invalid())
}
