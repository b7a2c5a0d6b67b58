//! # Knowledge Base Service
//!
//! HTTP front end and configuration for `kbase-core`. The binary in
//! `main.rs` wires these together behind a clap CLI.

pub mod api;
pub mod config;
