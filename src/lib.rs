pub mod apis;
pub mod collector;
pub mod common;
pub mod config;
pub mod domain;
pub mod health;
pub mod logging;
pub mod metrics;
pub mod search;
pub mod server;
pub mod storage;
