//! Shared error types for Mediphant.
//!
//! This crate has no internal Mediphant dependencies (dependency level 0).
//!
//! # Modules
//!
//! - [`error`]: Error types and Result alias

#![doc = include_str!("../README.md")]

pub mod error;

pub use error::{Error, Result};
