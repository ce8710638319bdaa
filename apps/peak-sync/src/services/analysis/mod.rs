pub mod episodes;
pub mod peaks;
pub mod reports;
pub mod signal;
pub mod stats;
pub mod synchrony;
pub mod types;
