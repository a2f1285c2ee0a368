//! Command-line argument parsing.
//!
//! Usage:
//!   rubisco-var [-ds] [-f <config>] [-k <key/path>]... [-D name=value]... [<template>...]

use std::path::PathBuf;

use crate::script::Value;

// ── Public types ──────────────────────────────────────────────────────────────

/// Parsed command-line arguments.
#[derive(Debug, Default, PartialEq)]
pub struct CliArgs {
    /// Debug logging (`-d`).
    pub debug: bool,
    /// Try the fast formatter first (`-s`).
    pub simple: bool,
    /// Configuration file to load (`-f <file>`).
    pub config: Option<PathBuf>,
    /// Key paths to print from the configuration (`-k <a/b/c>`).
    pub keys: Vec<Vec<String>>,
    /// Variables bound before rendering (`-D name=value`).
    pub defines: Vec<(String, Value)>,
    /// Templates to render, one result per line.
    pub templates: Vec<String>,
}

pub const USAGE: &str =
    "Usage: rubisco-var [-ds] [-f <config>] [-k <key/path>]... [-D name=value]... [<template>...]";

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parse `std::env::args()` and return [`CliArgs`] or an error message.
pub fn parse_args() -> Result<CliArgs, String> {
    let raw: Vec<String> = std::env::args().collect();
    parse_argv(raw.get(1..).unwrap_or_default())
}

/// Parse a slice of argument strings (exposed for testing).
pub fn parse_argv(argv: &[String]) -> Result<CliArgs, String> {
    let mut args = CliArgs::default();
    let mut i = 0;

    while i < argv.len() {
        let arg = argv[i].as_str();

        // `--` ends flag processing.
        if arg == "--" {
            args.templates.extend(argv[i + 1..].iter().cloned());
            break;
        }

        // Non-flag argument.
        if !arg.starts_with('-') || arg == "-" {
            args.templates.push(arg.to_owned());
            i += 1;
            continue;
        }

        // Flag argument: iterate over characters after the leading `-`.
        let chars: Vec<char> = arg[1..].chars().collect();
        let mut j = 0;
        while j < chars.len() {
            match chars[j] {
                'd' => args.debug = true,
                's' => args.simple = true,

                // Options taking a value: -f<file> or -f <file>.
                c @ ('f' | 'k' | 'D') => {
                    let value = if j + 1 < chars.len() {
                        let s: String = chars[j + 1..].iter().collect();
                        j = chars.len();
                        s
                    } else if i + 1 < argv.len() {
                        i += 1;
                        argv[i].clone()
                    } else {
                        return Err(format!("-{c} requires an argument"));
                    };
                    match c {
                        'f' => args.config = Some(PathBuf::from(value)),
                        'k' => args.keys.push(parse_key_path(&value)?),
                        _ => args.defines.push(parse_define(&value)?),
                    }
                }

                c => return Err(format!("unknown option: -{c}")),
            }
            j += 1;
        }
        i += 1;
    }

    if !args.keys.is_empty() && args.config.is_none() {
        return Err("-k requires a configuration (-f)".to_owned());
    }

    Ok(args)
}

/// Split `a/b/c` into its components. Empty components are rejected.
fn parse_key_path(text: &str) -> Result<Vec<String>, String> {
    let parts: Vec<String> = text.split('/').map(str::to_owned).collect();
    if parts.iter().any(String::is_empty) {
        return Err(format!("invalid key path: {text:?}"));
    }
    Ok(parts)
}

/// `name=value`; the value is read as JSON when it parses, else as a string.
fn parse_define(text: &str) -> Result<(String, Value), String> {
    let (name, raw) = text
        .split_once('=')
        .ok_or_else(|| format!("-D expects name=value, got {text:?}"))?;
    if !crate::script::lexer::is_valid_name(name) {
        return Err(format!("invalid variable name: {name:?}"));
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::Str(raw.to_owned()));
    Ok((name.to_owned(), value))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
