use crate::models::Severity;

pub const HIGH_SEVERITY_DROP_PCT: f64 = 25.0;

/// Only drawdowns that already passed the scan threshold get here, so there
/// is no tier below medium.
pub fn classify(drop_pct: f64) -> Severity {
    if drop_pct >= HIGH_SEVERITY_DROP_PCT {
        Severity::High
    } else {
        Severity::Medium
    }
}
