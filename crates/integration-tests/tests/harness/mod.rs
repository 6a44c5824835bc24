//! Shared fixtures for end-to-end tests
#![allow(dead_code)]

pub mod config;
pub mod mock_analytics;
pub mod mock_generator;
pub mod server;
