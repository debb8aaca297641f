//! Route handlers for the HTTP API.

pub mod conversions;
pub mod events;
pub mod health;
pub mod status;
