pub mod analyzer;
pub mod clip;
pub mod compute;
pub mod rank;
pub mod source;

pub use analyzer::VelocityAnalyzer;
pub use source::SnapshotSource;
