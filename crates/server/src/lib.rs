//! The pieces of the Stellite binary that are worth testing in isolation:
//! CLI parsing, config merging, TLS file loading and process state. `main.rs`
//! is a thin wiring layer over this crate; see it for the startup sequence.

pub mod cli;
pub mod config;
pub mod daemon;
pub mod logging;
pub mod tls;
