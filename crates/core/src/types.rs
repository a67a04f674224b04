/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Identifier of an event observer (a WebSocket connection id).
pub type ObserverId = String;
