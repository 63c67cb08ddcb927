//! Content-based staleness of cached license information

use chrono::{DateTime, TimeDelta, Utc};

use crate::record::BibjsonRecord;

/// Most recent parseable provenance date, taken from the latest entry of
/// each provenance category
pub fn most_recent_date(record: &BibjsonRecord) -> Option<DateTime<Utc>> {
    record
        .latest_by_category()
        .into_iter()
        .filter_map(|license| license.provenance.parsed_date())
        .max()
}

/// Whether `record` is too old to trust, measured against the current time
pub fn is_stale(record: &BibjsonRecord, stale_window: TimeDelta) -> bool {
    is_stale_at(record, stale_window, Utc::now())
}

/// Whether `record` is too old to trust at `now`
///
/// A record without a license field, or whose license dates all fail to
/// parse, is stale. Otherwise it is stale once the newest date plus the
/// window lies before `now`.
pub fn is_stale_at(record: &BibjsonRecord, stale_window: TimeDelta, now: DateTime<Utc>) -> bool {
    if record.license.is_none() {
        return true;
    }

    let Some(most_recent) = most_recent_date(record) else {
        return true;
    };

    match most_recent.checked_add_signed(stale_window) {
        Some(stale_date) => stale_date < now,
        None => false,
    }
}
