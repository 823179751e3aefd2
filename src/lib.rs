//! # logos-test - Logos plugin test harness
//!
//! Drives the external Logos plugin-hosting core (`liblogos_core`) through a
//! fixed script:
//! - **host**: the core's C API, loaded at runtime, plus an in-process core
//! - **client**: synchronous calls into hosted plugins
//! - **reflection**: method/property/enum reports for loaded plugins
//! - **harness**: load plugins, talk to the messaging module, run the event loop
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use logos_test::config::HarnessConfig;
//! use logos_test::harness::Harness;
//! use logos_test::host::InMemoryCore;
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let core = Arc::new(InMemoryCore::simulated());
//!     let harness = Harness::new(core, HarnessConfig::default(), PathBuf::from("modules"));
//!     let summary = harness.run().await.unwrap();
//!     println!("Loaded: {:?}", summary.loaded);
//! }
//! ```

pub mod cli;
pub mod client;
pub mod config;
pub mod core;
pub mod harness;
pub mod host;
pub mod logging;
pub mod paths;
pub mod reflection;

pub use crate::core::error::{Error, Result};
