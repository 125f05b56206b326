// The infra module contains implementations of core traits.
// Each feature implementation goes in its own submodule.

#[path = "config/mod.rs"]
pub mod config;

#[path = "moderation/mod.rs"]
pub mod moderation;

#[path = "queue/mod.rs"]
pub mod queue;
