//! convq - single-slot media conversion queue
//!
//! This library crate exposes the CLI-side helpers for integration testing.

pub mod config;
