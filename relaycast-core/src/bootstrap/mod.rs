//! Bootstrap module for starting the relaycast server
//!
//! This module handles:
//! - Configuration loading and validation
//! - Preparation of the capture and output directories

pub mod config;
pub mod storage;

pub use config::load_config;
pub use storage::prepare_directories;
