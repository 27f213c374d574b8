//! `LedgerRecord` - Represents rows of the ledger table

use chrono::NaiveDateTime;

/// One applied migration, as stored in the ledger table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerRecord {
    /// Migration version (primary key)
    pub version: String,

    /// Stored description, e.g. `init.up.sql`
    pub description: String,

    /// When the migration was applied (server time)
    pub applied_at: NaiveDateTime,
}

impl LedgerRecord {
    #[must_use]
    pub fn new(
        version: impl Into<String>,
        description: impl Into<String>,
        applied_at: NaiveDateTime,
    ) -> Self {
        Self {
            version: version.into(),
            description: description.into(),
            applied_at,
        }
    }

    /// Build a record from the `(id, action, run_at)` text columns of a row.
    ///
    /// # Errors
    ///
    /// Returns the offending text if `run_at` is not a recognizable timestamp.
    pub fn from_columns(
        version: String,
        description: String,
        applied_at: &str,
    ) -> Result<Self, String> {
        Ok(Self {
            version,
            description,
            applied_at: parse_timestamp(applied_at)?,
        })
    }

    /// `<version> <description>`, the line printed by `log`.
    pub fn log_line(&self) -> String {
        format!("{} {}", self.version, self.description)
    }
}

fn parse_timestamp(value: &str) -> Result<NaiveDateTime, String> {
    const FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
    ];

    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .ok_or_else(|| format!("Failed to parse timestamp '{value}': unrecognized format"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_columns_accepts_server_formats() {
        for ts in [
            "2024-01-01 10:20:30",
            "2024-01-01 10:20:30.250",
            "2024-01-01T10:20:30",
        ] {
            let record =
                LedgerRecord::from_columns("20240101-000000".into(), "init.up.sql".into(), ts)
                    .unwrap();
            assert_eq!(record.applied_at.format("%H:%M:%S").to_string(), "10:20:30");
        }
    }

    #[test]
    fn test_from_columns_rejects_garbage() {
        let err = LedgerRecord::from_columns("v".into(), "d".into(), "yesterday").unwrap_err();
        assert!(err.contains("yesterday"));
    }

    #[test]
    fn test_log_line() {
        let record = LedgerRecord::from_columns(
            "20240101-000000".into(),
            "init.up.sql".into(),
            "2024-01-01 00:00:01",
        )
        .unwrap();
        assert_eq!(record.log_line(), "20240101-000000 init.up.sql");
    }
}
