use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// `tfc` with its config directory pointed into `home`.
fn tfc(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("tfc").unwrap();
    cmd.env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path().join(".config"))
        .env("TFC_LIBRARY", home.path().join("missing-libtensorflow.so"));
    cmd
}

#[test]
fn test_help_lists_subcommands() {
    let home = TempDir::new().unwrap();
    tfc(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("load-graph"))
        .stdout(predicate::str::contains("graph-info"))
        .stdout(predicate::str::contains("create-tensor"))
        .stdout(predicate::str::contains("predict"));
}

#[test]
fn test_predict_heatmap_requires_image_mode() {
    let home = TempDir::new().unwrap();
    tfc(&home)
        .args(["predict", "--heatmap", "out.png", "image.png"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--as-image"));

    tfc(&home)
        .args(["predict", "--channel-order", "hsv", "image.png"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unknown channel order"));
}

#[test]
fn test_load_graph_missing_file_exits_1() {
    let home = TempDir::new().unwrap();
    tfc(&home)
        .args(["load-graph", "/nonexistent/graph.pb"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("can't read buffer from file"));
}

#[test]
fn test_load_graph_empty_file_exits_1() {
    let home = TempDir::new().unwrap();
    let graph = home.path().join("graph.pb");
    fs::write(&graph, b"").unwrap();

    tfc(&home)
        .arg("load-graph")
        .arg(&graph)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("empty"));
}

#[test]
fn test_missing_runtime_exits_100() {
    let home = TempDir::new().unwrap();
    let graph = home.path().join("graph.pb");
    fs::write(&graph, b"\x0a\x00").unwrap();

    tfc(&home)
        .arg("load-graph")
        .arg(&graph)
        .assert()
        .code(100);
    tfc(&home).arg("version").assert().code(100);
}

#[test]
fn test_library_flag_beats_environment() {
    let home = TempDir::new().unwrap();
    let flag_library = home.path().join("flag-libtensorflow.so");

    tfc(&home)
        .arg("--library")
        .arg(&flag_library)
        .arg("version")
        .assert()
        .code(100)
        .stderr(predicate::str::contains("flag-libtensorflow.so"))
        .stderr(predicate::str::contains("missing-libtensorflow.so").not());
}

#[test]
fn test_invalid_config_exits_8() {
    let home = TempDir::new().unwrap();
    let config = home.path().join("config.json");
    fs::write(&config, "{ not json").unwrap();

    tfc(&home)
        .arg("--config")
        .arg(&config)
        .arg("create-tensor")
        .assert()
        .code(8);
}

#[test]
fn test_config_init_writes_file() {
    let home = TempDir::new().unwrap();
    let output = home.path().join("tfc.json");

    tfc(&home)
        .args(["config", "init", "--output"])
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("Created configuration file"));

    let content = fs::read_to_string(&output).unwrap();
    assert!(content.contains("\"input_op\": \"input_4\""));

    tfc(&home)
        .args(["config", "init", "--output"])
        .arg(&output)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("--force"));
}

#[test]
fn test_config_set_then_get() {
    let home = TempDir::new().unwrap();
    let config = home.path().join("config.json");

    tfc(&home)
        .arg("--config")
        .arg(&config)
        .args(["config", "set", "graph.output_op", "softmax"])
        .assert()
        .success();

    tfc(&home)
        .arg("--config")
        .arg(&config)
        .args(["config", "get", "graph.output_op"])
        .assert()
        .success()
        .stdout(predicate::str::contains("softmax"));
}
