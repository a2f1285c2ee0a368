//! Expression tree built from the lexer's token stream.

use super::lexer::{Token, TokenKind};

/// A parsed template.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Sequence of parts. One child passes its value through unchanged;
    /// several are stringified and concatenated.
    Root(Vec<Expr>),
    Literal(String),
    Var {
        name: String,
        /// Evaluated only when `name` is unresolved.
        fallback: Option<Box<Expr>>,
    },
    /// Inline code, possibly empty.
    Code(String),
}

impl Expr {
    /// Returns `true` if the tree contains no references or inline code.
    pub fn is_constant(&self) -> bool {
        match self {
            Expr::Root(children) => children.iter().all(Expr::is_constant),
            Expr::Literal(_) => true,
            Expr::Var { .. } | Expr::Code(_) => false,
        }
    }
}

/// Build a tree from a token stream produced by [`tokenize`].
///
/// [`tokenize`]: super::lexer::tokenize
pub fn build(tokens: &[Token]) -> Expr {
    let (root, consumed) = build_root(tokens, false);
    debug_assert_eq!(consumed, tokens.len());
    root
}

/// Parse children until the end of input or, inside a fallback, until the
/// closing token of the enclosing reference. Returns the root and the number
/// of tokens consumed (including that closing token).
fn build_root(tokens: &[Token], in_fallback: bool) -> (Expr, usize) {
    let mut children = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        let tok = &tokens[i];
        match tok.kind {
            TokenKind::Literal => {
                children.push(Expr::Literal(tok.text.clone()));
                i += 1;
            }
            TokenKind::VarOpen => {
                let (var, used) = build_var(&tokens[i + 1..]);
                children.push(var);
                i += 1 + used;
            }
            TokenKind::CodeOpen => {
                let (code, used) = build_code(&tokens[i + 1..]);
                children.push(code);
                i += 1 + used;
            }
            TokenKind::VarClose if in_fallback => {
                return (Expr::Root(children), i + 1);
            }
            kind => unreachable!("token {kind:?} cannot start a template part"),
        }
    }
    (Expr::Root(children), i)
}

/// Tokens after `VarOpen`: name, then close or fallback.
fn build_var(tokens: &[Token]) -> (Expr, usize) {
    let name = match tokens.first() {
        Some(t) if t.kind == TokenKind::VarName => t.text.clone(),
        other => unreachable!("expected variable name, got {other:?}"),
    };
    match tokens.get(1).map(|t| t.kind) {
        Some(TokenKind::VarClose) => (Expr::Var { name, fallback: None }, 2),
        Some(TokenKind::VarFallback) => {
            let (fallback, used) = build_root(&tokens[2..], true);
            let var = Expr::Var {
                name,
                fallback: Some(Box::new(fallback)),
            };
            (var, 2 + used)
        }
        other => unreachable!("expected close or fallback, got {other:?}"),
    }
}

/// Tokens after `CodeOpen`: optional text, then close.
fn build_code(tokens: &[Token]) -> (Expr, usize) {
    match (tokens.first().map(|t| t.kind), tokens.get(1).map(|t| t.kind)) {
        (Some(TokenKind::CodeClose), _) => (Expr::Code(String::new()), 1),
        (Some(TokenKind::CodeText), Some(TokenKind::CodeClose)) => {
            (Expr::Code(tokens[0].text.clone()), 2)
        }
        other => unreachable!("malformed inline code tokens {other:?}"),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
