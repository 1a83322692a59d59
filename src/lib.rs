pub mod cache;
pub mod client;
pub mod config;
pub mod plot;
pub mod prompt;
pub mod stats;
pub mod timestamps;

// Re-export commonly used types
pub use client::{FetchError, ImapAccount};
pub use config::{Config, ImapSecurity};
pub use stats::Summary;
pub use timestamps::TimeTable;
