// src/core/mod.rs
pub mod engine;
pub mod proximity;
pub mod quote_cache;
pub mod registry;
pub mod scheduler;
