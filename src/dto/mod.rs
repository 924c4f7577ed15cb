//! Wire payloads exchanged over HTTP, Slack webhooks and SSE.

pub mod health;
pub mod public;
pub mod slack;
pub mod sse;
pub mod validation;
