//! Integration tests for the harvester
//!
//! These tests use wiremock to create mock HTTP servers and run discovery,
//! the manifest walk and complete harvests end-to-end.

mod common;

mod concurrency_tests;
mod discovery_tests;
mod harvest_tests;
