pub mod ingest;
pub mod models;
pub mod store;

pub use ingest::ingest_lines;
pub use store::SampleStore;
