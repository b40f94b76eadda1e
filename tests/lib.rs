//! Shared fixtures for the LANLINK integration tests.

pub mod fixtures;
