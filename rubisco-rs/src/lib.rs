//! Variable substitution and expression engine for the rubisco build tool.
//!
//! Strings in project files, CLI messages and workflow steps are templates:
//! `${{name}}` references a variable, `${{name: fallback}}` supplies a
//! default and `$&{{code}}` evaluates a sandboxed expression. Variables
//! live in a [`VarStore`] of shadowing stacks; [`AutoFormatMap`] and
//! [`AutoFormatList`] resolve their templates whenever they are read.

pub mod builtin_vars;
pub mod cli;
pub mod config;
pub mod container;
pub mod error;
pub mod script;
pub mod var;

pub use config::{ConfigError, Configuration};
pub use container::{AutoFormatList, AutoFormatMap, Node, Query, Resolved};
pub use error::{Error, Result};
pub use script::{fast_format, fast_format_with, format, format_with, TypeSpec, Value};
pub use var::{Scope, VarStore};
