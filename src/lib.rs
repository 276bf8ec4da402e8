// src/lib.rs
//! Price alert engine: tracks how close live prices are to user targets and
//! notifies external channels when a target is crossed.

pub mod config;
pub mod core;
pub mod error;
pub mod feed;
pub mod logging;
pub mod notify;
pub mod storage;
pub mod types;
