//! Loads the JSON config file (if any) and merges it over CLI-derived
//! defaults, JSON winning where both are set (see §6).

use std::path::Path;

use stellite_core::Result;
use stellite_core::config::{PartialServerConfig, ServerConfig};

use crate::cli::Cli;

/// Build the effective [`ServerConfig`] for one process invocation.
pub fn load(cli: &Cli) -> Result<ServerConfig> {
    let base = ServerConfig::default().merge_over(cli.as_partial_config());
    match &cli.config {
        Some(path) => merge_json_file(base, path),
        None => Ok(base),
    }
}

/// Merge the JSON config file over `base`. The file is parsed straight into
/// a [`PartialServerConfig`] — same as the CLI flags are — so a field the
/// file omits stays `None` and does not clobber what the CLI (or an
/// explicit default) already set; only fields the file actually names win.
fn merge_json_file(base: ServerConfig, path: &Path) -> Result<ServerConfig> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| stellite_core::Error::other(format!("reading {}: {e}", path.display())))?;
    let from_file: PartialServerConfig = serde_json::from_str(&text)?;
    Ok(base.merge_over(from_file))
}
