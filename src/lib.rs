//! Feedboard — dashboard refresh engine.

pub mod config;
pub mod dashboard;
pub mod error;
pub mod http;
pub mod pool;
pub mod refresh;
pub mod widgets;
