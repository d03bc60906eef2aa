pub mod attendance_records;
pub mod outbox_events;
pub mod qr_scans;
pub mod qr_sessions;
