//! Read-through cache service with TTL expiry and webhook-driven invalidation.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
