//! Run the `rubisco-var` binary and check what it prints.

use std::path::Path;
use std::process::{Command, Output};

// ── Helpers ───────────────────────────────────────────────────────────────────

fn run(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_rubisco-var"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to spawn rubisco-var")
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

fn write(dir: &Path, name: &str, text: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, text).expect("write config");
    path.display().to_string()
}

// ── Templates ─────────────────────────────────────────────────────────────────

#[test]
fn renders_templates_one_per_line() {
    let out = run(&["-D", "name=demo", "hello ${{name}}", "${{missing: none}}"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "hello demo\nnone\n");
}

#[test]
fn non_string_values_print_as_json() {
    let out = run(&["-D", "deps=[\"a\", 2]", "-Djobs=4", "${{deps}}", "$&{{jobs * 2}}"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "[\"a\",2]\n8\n");
}

#[test]
fn builtin_variables_are_available() {
    let out = run(&["${{rubisco.version}}", "${{host.system}}"]);
    assert!(out.status.success());
    assert_eq!(
        stdout(&out),
        format!("{}\n{}\n", env!("CARGO_PKG_VERSION"), std::env::consts::OS)
    );
}

#[test]
fn environment_variables_resolve() {
    let out = Command::new(env!("CARGO_BIN_EXE_rubisco-var"))
        .arg("${{env.RUBISCO_CLI_TEST}}")
        .env("RUBISCO_CLI_TEST", "from-env")
        .output()
        .expect("failed to spawn rubisco-var");
    assert_eq!(stdout(&out), "from-env\n");
}

#[test]
fn simple_mode_falls_back_to_full_formatter() {
    let out = run(&["-s", "-D", "a=1", "${{a}}", "${{b: two}}"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "1\ntwo\n");
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[test]
fn undefined_variable_fails_with_hint() {
    let out = run(&["${{never_bound}}"]);
    assert_eq!(out.status.code(), Some(1));
    let err = stderr(&out);
    assert!(err.contains("rubisco-var: undefined variable: never_bound"), "{err}");
    assert!(err.contains("hint:"), "{err}");
}

#[test]
fn simple_mode_reports_undefined_variable() {
    // Only a construct the fast path cannot handle sends it to the full one.
    let out = run(&["-ds", "${{never_bound}}"]);
    assert_eq!(out.status.code(), Some(1));
    let err = stderr(&out);
    assert!(err.contains("rubisco-var: undefined variable: never_bound"), "{err}");
    assert!(!err.contains("fast path declined"), "{err}");

    let out = run(&["-ds", "${{never_bound: x}}"]);
    assert!(out.status.success());
    assert!(stderr(&out).contains("fast path declined"));
}

#[test]
fn disallowed_code_fails() {
    let out = run(&["$&{{open('x')}}"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("disallowed"));
}

#[test]
fn bad_arguments_print_usage() {
    let out = run(&["-z"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("Usage: rubisco-var"));
}

// ── Configuration ─────────────────────────────────────────────────────────────

#[test]
fn prints_configuration_keys() {
    let dir = tempfile::tempdir().unwrap();
    let config = write(
        dir.path(),
        "repo.toml",
        "name = \"${{prefix}}-core\"\n[deps]\nzlib = \"1.3\"\n",
    );
    let out = run(&["-D", "prefix=app", "-f", &config, "-k", "name", "-k", "deps/zlib"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "app-core\n1.3\n");
}

#[test]
fn missing_key_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = write(dir.path(), "repo.json", "{\"name\": \"x\"}");
    let out = run(&["-f", &config, "-k", "nope"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("key not found"));
}
