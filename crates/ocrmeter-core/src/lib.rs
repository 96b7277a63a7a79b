pub mod chart;
pub mod client;
pub mod error;
pub mod history;
pub mod metrics;
pub mod report;
pub mod session;

pub use error::OcrmeterError;
