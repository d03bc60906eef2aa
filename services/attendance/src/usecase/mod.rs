pub mod record;
pub mod scan;
pub mod session;
pub mod sweep;
