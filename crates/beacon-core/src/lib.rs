//! Core types and trait definitions for the Beacon emergency workflow.
//!
//! This crate has no runtime or database dependencies.
//! The session controller and storage backends depend on it; it depends on
//! nothing platform-specific.

// Native `async fn` in traits (stable since Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod contact;
pub mod error;
pub mod incident;
pub mod location;
pub mod notify;
pub mod store;

pub use error::{Error, Result};
