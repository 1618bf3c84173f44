pub mod algorithm;
pub mod common;
pub mod config;
pub mod error;
pub mod map;
pub mod scenario;
pub mod stat;
pub mod strategy;
pub mod system;
