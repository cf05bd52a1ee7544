//! Application services sitting between HTTP handlers and persistence.

pub mod articles;
pub mod error;
pub mod inform;
pub mod pages;
pub mod repos;
