pub mod claude;
pub mod client;
pub mod guardrails;
pub mod schema;
pub mod service;

pub use claude::ClaudeClient;
pub use client::{IdeaModelClient, StubModelClient};
pub use schema::{IdeaRequest, IdeaResponse};
pub use service::create_ideas;
