pub mod agent;
pub mod client;
pub mod limiter;
pub mod search;

pub use agent::{LookupAgent, LookupError};
pub use client::{ClientFailure, GeminiClient, LlmClient, LookupContext, MockLlmClient, StructuredResult};
pub use limiter::{Acquire, Denial, DenialScope, RateLimiter};
pub use search::{SnippetSource, SourceSnippet, StaticSnippetSource, WebSnippetSource};
