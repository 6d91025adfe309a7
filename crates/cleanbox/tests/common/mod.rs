//! Shared test utilities for cleanbox integration tests.
//!
//! This module provides:
//! - `TestHarness` wiring an in-memory database to fake Gmail and OpenAI
//!   backends
//! - Builders for stored package events and fetched messages

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::{FakeExtractor, FakeMailProvider, ListFailure, TestHarness};
