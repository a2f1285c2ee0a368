//! Tree-walking evaluator for parsed templates.

use super::ast::Expr;
use super::expr;
use super::value::Value;
use crate::error::{Error, Result};
use crate::var::VarStore;

/// Evaluates [`Expr`] trees against a variable store.
pub struct Interpreter<'s> {
    store: &'s mut VarStore,
}

impl<'s> Interpreter<'s> {
    pub fn new(store: &'s mut VarStore) -> Self {
        Interpreter { store }
    }

    pub fn eval(&mut self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Root(children) => match children.as_slice() {
                [] => Ok(Value::Str(String::new())),
                [only] => self.eval(only),
                many => {
                    let mut out = String::new();
                    for child in many {
                        out.push_str(&self.eval(child)?.to_string());
                    }
                    Ok(Value::Str(out))
                }
            },
            Expr::Literal(text) => Ok(Value::Str(text.clone())),
            Expr::Var { name, fallback } => match self.store.resolve(name) {
                Some(value) => Ok(value),
                None => match fallback {
                    Some(fallback) => self.eval(fallback),
                    None => Err(Error::undefined(name.as_str())),
                },
            },
            Expr::Code(code) if code.trim().is_empty() => Ok(Value::Str(String::new())),
            Expr::Code(code) => expr::eval_inline(code, self.store),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
