//! JSON-over-CLI config merge, exercised as an external caller of the crate
//! (see §6; the finer-grained cases live alongside `load` in `src/config.rs`).

use clap::Parser;
use stellite_server::{cli::Cli, config};

#[test]
fn json_overrides_cli_only_for_fields_it_names() {
    let path = std::env::temp_dir().join("stellite-test-config-external.json");
    std::fs::write(&path, r#"{"worker_count": 4}"#).expect("write temp config");

    let cli = Cli::parse_from([
        "stellite",
        "--quic-port",
        "7000",
        "--config",
        path.to_str().expect("utf8 path"),
    ]);
    let loaded = config::load(&cli).expect("config loads");

    assert_eq!(loaded.quic_port, 7000, "CLI flags the file never mentions must survive");
    assert_eq!(loaded.worker_count, 4, "the field the file does name must win");

    let _ = std::fs::remove_file(&path);
}
