//! Template language: `${{name}}` references with optional fallbacks and
//! `$&{{code}}` inline expressions.
//!
//! The full path tokenises the template ([`lexer`]), builds a tree
//! ([`ast`]) and walks it ([`interp`]), sending inline code to the
//! [`expr`] sandbox. The [`fast`] path handles plain references only.
//!
//! # Quick start
//!
//! ```rust
//! use rubisco::{format, Value, VarStore};
//!
//! let mut store = VarStore::new();
//! store.push("jobs", 4);
//! assert_eq!(format(&mut store, "${{jobs}}").unwrap(), Value::Int(4));
//! assert_eq!(format(&mut store, "-j${{jobs}}").unwrap(), Value::from("-j4"));
//! assert_eq!(format(&mut store, "${{cc: gcc}}").unwrap(), Value::from("gcc"));
//! ```

pub mod ast;
pub mod builtins;
pub mod expr;
pub mod fast;
pub mod interp;
pub mod lexer;
pub mod typecheck;
pub mod value;

pub use ast::Expr;
pub use expr::EvalContext;
pub use fast::{fast_format, fast_format_with};
pub use interp::Interpreter;
pub use typecheck::TypeSpec;
pub use value::Value;

use crate::error::Result;
use crate::var::VarStore;

/// Tokenise and parse `template` without evaluating it.
pub fn compile(template: &str) -> Result<Expr> {
    Ok(ast::build(&lexer::tokenize(template)?))
}

/// Evaluate `template` against `store`.
///
/// A template that is a single reference or a single inline expression
/// returns that value as-is; anything longer is concatenated into a string.
pub fn format(store: &mut VarStore, template: &str) -> Result<Value> {
    if !template.contains('$') {
        return Ok(Value::Str(template.to_string()));
    }
    let expr = compile(template)?;
    Interpreter::new(store).eval(&expr)
}

/// [`format`] with `overlay` pushed for the duration of the call.
pub fn format_with<I, K, V>(store: &mut VarStore, template: &str, overlay: I) -> Result<Value>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    let mut scope = store.scope(overlay);
    format(&mut scope, template)
}
