use crate::paths::sanitize_token;

pub const REPORT_EXTENSION: &str = "pdf";

/// Builds the output filename for one render call.
///
/// The name is keyed by booking id for the humans reading the reports folder,
/// but uniqueness comes from the timestamp plus fresh entropy: a retried
/// submission must never overwrite a report that is still being emailed.
#[must_use]
pub fn report_file_name(booking_id: &str, unix_ts: i64) -> String {
    let slug = sanitize_token(booking_id, 40);
    let entropy = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "inspection_{slug}_{unix_ts}_{}.{REPORT_EXTENSION}",
        &entropy[..8]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_names_are_unique_per_call() {
        let a = report_file_name("BK-42", 1_700_000_000);
        let b = report_file_name("BK-42", 1_700_000_000);
        assert_ne!(a, b);
        assert!(a.starts_with("inspection_BK-42_1700000000_"));
        assert!(a.ends_with(".pdf"));
    }

    #[test]
    fn hostile_booking_ids_cannot_escape_the_reports_dir() {
        let name = report_file_name("../../x", 0);
        assert!(!name.contains('/'));
        assert!(!name.contains(".."));
    }
}
