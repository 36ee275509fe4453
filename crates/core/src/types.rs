/// Row identifiers are opaque strings (Supabase UUIDs, or local placeholder ids).
pub type RecordId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
