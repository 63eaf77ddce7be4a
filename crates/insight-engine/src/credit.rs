use chrono::{Duration, NaiveDate};
use insight_core::{CreditGapPoint, CreditStats, CreditStress};

/// Look-back for the change statistic
const CHANGE_LOOKBACK_DAYS: i64 = 30;

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.get(..10).unwrap_or(s), "%Y-%m-%d").ok()
}

/// Summarize credit-gap rows given newest first.
///
/// The change compares the latest gap against the first row at least 30
/// days older, falling back to the oldest row. History is returned in
/// chronological order.
pub fn credit_stress(mut newest_first: Vec<CreditGapPoint>) -> CreditStress {
    let Some(latest) = newest_first.first() else {
        return CreditStress {
            stats: None,
            history: Vec::new(),
        };
    };

    let target = parse_date(&latest.obs_date).map(|d| d - Duration::days(CHANGE_LOOKBACK_DAYS));
    let previous = target
        .and_then(|target| {
            newest_first
                .iter()
                .find(|p| parse_date(&p.obs_date).is_some_and(|d| d <= target))
        })
        .or_else(|| newest_first.last())
        .unwrap_or(latest);

    let stats = CreditStats {
        as_of: latest.obs_date.clone(),
        gap_bps: latest.gap_bps,
        hy_oas_pct: latest.hy_oas_pct,
        ig_oas_pct: latest.ig_oas_pct,
        change_30d_bps: latest.gap_bps - previous.gap_bps,
    };

    newest_first.reverse();
    CreditStress {
        stats: Some(stats),
        history: newest_first,
    }
}
