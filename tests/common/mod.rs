//! Integration test common infrastructure.
//!
//! Provides an in-process ServerQuery endpoint speaking the real line
//! protocol over TCP, and helpers to point a poller at it.

#[allow(dead_code)]
pub mod server;

#[allow(unused_imports)]
pub use server::{ClientFixture, MockServerQuery, ServerFixture, World};
