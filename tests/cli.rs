//! Startup behaviour of the binary
use std::io::Write;
use std::net::TcpListener;
use std::process::Command;

fn run_binary(args: &[&str]) -> (Option<i32>, String) {
    let output = Command::new(env!("CARGO_BIN_EXE_rs_term_proxy"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap();
    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    (output.status.code(), combined)
}

#[test]
fn bind_failure_exits_one_and_the_reason_reaches_the_log() {
    let taken = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = taken.local_addr().unwrap().port().to_string();

    let mut config = tempfile::NamedTempFile::new().unwrap();
    writeln!(config, "[server]\nhost = \"127.0.0.1\"").unwrap();
    let config_path = config.path().to_str().unwrap().to_string();

    let (code, output) = run_binary(&["--config", &config_path, "--port", &port]);
    assert_eq!(code, Some(1), "output: {output}");
    assert!(output.contains("Failed to bind"), "output: {output}");
    assert!(output.contains("Configuration loaded"), "output: {output}");
}

#[test]
fn missing_config_file_exits_one() {
    let (code, output) = run_binary(&["--config", "/definitely/not/here.toml"]);
    assert_eq!(code, Some(1));
    assert!(output.contains("Failed to load configuration"), "output: {output}");
}
