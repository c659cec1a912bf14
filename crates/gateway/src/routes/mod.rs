pub mod diagnostics;
pub mod health;
pub mod metrics;
pub mod notify;
pub mod ws;
