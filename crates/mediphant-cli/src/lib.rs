//! The `mediphant` command-line application.
//!
//! - [`cli`]: clap argument types
//! - [`config`]: [`MediphantConfig`], loaded with `confyg`
//! - [`app`]: logging setup and command dispatch
//! - [`handlers`]: `index` and `ask`
//! - [`config_handlers`]: `config {path,get,set,init,export}`
//! - [`providers`]: build embedders, stores, and models from configuration

#![doc = include_str!("../README.md")]

pub mod app;
pub mod cli;
pub mod config;
pub mod config_handlers;
pub mod handlers;
pub mod providers;

pub use app::MediphantApp;
pub use cli::{CliArgs, Command, ConfigAction, ConfigCommand};
pub use config::MediphantConfig;
