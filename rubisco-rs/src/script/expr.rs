//! Inline-code lexer, AST, parser, and evaluator.
//!
//! `$&{{ ... }}` blocks are written in a small expression language with
//! integer/float arithmetic, string and list operations, comparisons, glob
//! (`=~`) and regex (`=/`) matching, membership tests, and function calls.
//!
//! Operator precedence (lowest → highest):
//!   ternary  →  or  →  and  →  not  →  relational  →  bitor  →  bitxor  →
//!   bitand  →  shift  →  additive  →  multiplicative  →  unary  →
//!   postfix  →  primary
//!
//! Every evaluation runs against a fresh namespace: the general-purpose
//! builtins, a snapshot of the variable store, the `get`/`has` helpers, and
//! finally a deny-list of capabilities that are rebound to failing stubs.
//! This protects against accidents in trusted configuration, not against a
//! hostile author.

use std::collections::HashMap;
use std::fmt;

use super::builtins;
use super::value::Value;
use crate::error::Error;
use crate::var::VarStore;

/// Capabilities that inline code must never reach.
pub const DENIED: &[&str] = &[
    "__import__", "import", "open", "exec", "eval", "compile", "exit", "quit",
];

// ── Fault ─────────────────────────────────────────────────────────────────────

/// Why an inline expression failed.
#[derive(Debug, Clone, PartialEq)]
pub enum Fault {
    /// A denied capability was referenced or called.
    Disallowed(String),
    Syntax(String),
    Name(String),
    Runtime(String),
}

impl Fault {
    fn kind(&self) -> &'static str {
        match self {
            Fault::Disallowed(_) => "disallowed",
            Fault::Syntax(_) => "syntax error",
            Fault::Name(_) => "name error",
            Fault::Runtime(_) => "runtime error",
        }
    }

    fn message(&self) -> &str {
        match self {
            Fault::Disallowed(m) | Fault::Syntax(m) | Fault::Name(m) | Fault::Runtime(m) => m,
        }
    }

    /// Attach the offending expression and convert to the crate error.
    pub fn into_error(self, expression: &str) -> Error {
        match self {
            Fault::Disallowed(capability) => Error::CapabilityDisallowed { capability },
            other => Error::Eval {
                expression: expression.to_string(),
                message: other.message().to_string(),
                hint: other.to_string(),
            },
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind(), self.message())
    }
}

impl From<String> for Fault {
    fn from(message: String) -> Self {
        Fault::Runtime(message)
    }
}

// ── EvalContext ───────────────────────────────────────────────────────────────

/// Dependency-injection interface used by the expression evaluator.
///
/// [`Sandbox`] implements this over a [`VarStore`]; tests use a plain map.
pub trait EvalContext {
    /// Look up a bare identifier.
    fn get_var(&self, name: &str) -> Result<Value, Fault>;

    /// Invoke a function by name.
    fn call_fn(&mut self, name: &str, args: Vec<Value>) -> Result<Value, Fault>;
}

// ── Token ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    SlashSlash,
    Percent,
    Bang,
    Tilde,
    Ampersand,
    Pipe,
    Caret,
    ShiftLeft,
    ShiftRight,

    // Comparison
    Eq, // ==
    Ne, // !=
    Lt,
    Le,
    Gt,
    Ge,
    GlobMatch,     // =~
    RegexMatch,    // =/
    NotGlobMatch,  // !~
    NotRegexMatch, // !/

    // Logical
    And, // &&
    Or,  // ||

    // Misc
    Question,
    Colon,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
    /// Unrecognised input character, reported by the parser.
    Unknown(char),
    Eof,
}

// ── Lexer ─────────────────────────────────────────────────────────────────────

struct Lexer {
    src: Vec<char>,
    pos: usize,
}

impl Lexer {
    fn new(src: &str) -> Self {
        Lexer {
            src: src.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.src.get(self.pos).copied()
    }

    fn peek2(&self) -> Option<char> {
        self.src.get(self.pos + 1).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn eat(&mut self, ch: char) -> bool {
        if self.peek() == Some(ch) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    /// Consume characters while `pred` holds, appending them to `s`.
    fn take_while(&mut self, s: &mut String, pred: impl Fn(char) -> bool) {
        while let Some(c) = self.peek().filter(|&c| pred(c)) {
            s.push(c);
            self.pos += 1;
        }
    }

    fn read_number(&mut self, first: char) -> Result<Token, Fault> {
        let mut s = String::new();
        s.push(first);
        let mut is_float = false;

        // Hex literal
        if first == '0' && matches!(self.peek(), Some('x' | 'X')) {
            self.pos += 1;
            let mut hex = String::new();
            self.take_while(&mut hex, |c| c.is_ascii_hexdigit());
            return i64::from_str_radix(&hex, 16)
                .map(Token::Int)
                .map_err(|_| Fault::Syntax(format!("invalid hex literal '0x{hex}'")));
        }

        self.take_while(&mut s, |c| c.is_ascii_digit() || c == '_');
        if self.peek() == Some('.') && self.peek2().is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            s.push('.');
            self.pos += 1;
            self.take_while(&mut s, |c| c.is_ascii_digit());
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            is_float = true;
            s.push('e');
            self.pos += 1;
            if let Some(sign @ ('+' | '-')) = self.peek() {
                s.push(sign);
                self.pos += 1;
            }
            self.take_while(&mut s, |c| c.is_ascii_digit());
        }

        let s = s.replace('_', "");
        if is_float {
            s.parse()
                .map(Token::Float)
                .map_err(|_| Fault::Syntax(format!("invalid number '{s}'")))
        } else {
            s.parse()
                .map(Token::Int)
                .map_err(|_| Fault::Syntax(format!("integer literal '{s}' out of range")))
        }
    }

    fn read_string(&mut self, quote: char) -> Result<Token, Fault> {
        let mut s = String::new();
        loop {
            match self.advance() {
                None => return Err(Fault::Syntax("unterminated string literal".into())),
                Some('\\') => match self.advance() {
                    Some('n') => s.push('\n'),
                    Some('t') => s.push('\t'),
                    Some('r') => s.push('\r'),
                    Some('0') => s.push('\0'),
                    Some(c) => s.push(c),
                    None => return Err(Fault::Syntax("unterminated string literal".into())),
                },
                Some(c) if c == quote => break,
                Some(c) => s.push(c),
            }
        }
        Ok(Token::Str(s))
    }

    fn read_ident(&mut self, first: char) -> Token {
        let mut s = String::new();
        s.push(first);
        self.take_while(&mut s, |c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
        Token::Ident(s)
    }

    fn next_token(&mut self) -> Result<Token, Fault> {
        self.skip_ws();
        let ch = match self.advance() {
            None => return Ok(Token::Eof),
            Some(c) => c,
        };

        Ok(match ch {
            '0'..='9' => return self.read_number(ch),
            '"' | '\'' => return self.read_string(ch),
            'a'..='z' | 'A'..='Z' | '_' => self.read_ident(ch),
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => {
                if self.eat('/') {
                    Token::SlashSlash
                } else {
                    Token::Slash
                }
            }
            '%' => Token::Percent,
            '!' => {
                if self.eat('=') {
                    Token::Ne
                } else if self.eat('~') {
                    Token::NotGlobMatch
                } else if self.eat('/') {
                    Token::NotRegexMatch
                } else {
                    Token::Bang
                }
            }
            '~' => Token::Tilde,
            '^' => Token::Caret,
            '&' => {
                if self.eat('&') {
                    Token::And
                } else {
                    Token::Ampersand
                }
            }
            '|' => {
                if self.eat('|') {
                    Token::Or
                } else {
                    Token::Pipe
                }
            }
            '<' => {
                if self.eat('<') {
                    Token::ShiftLeft
                } else if self.eat('=') {
                    Token::Le
                } else {
                    Token::Lt
                }
            }
            '>' => {
                if self.eat('>') {
                    Token::ShiftRight
                } else if self.eat('=') {
                    Token::Ge
                } else {
                    Token::Gt
                }
            }
            '=' => {
                if self.eat('=') {
                    Token::Eq
                } else if self.eat('~') {
                    Token::GlobMatch
                } else if self.eat('/') {
                    Token::RegexMatch
                } else {
                    Token::Unknown('=')
                }
            }
            '?' => Token::Question,
            ':' => Token::Colon,
            ',' => Token::Comma,
            '(' => Token::LParen,
            ')' => Token::RParen,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            c => Token::Unknown(c),
        })
    }

    fn tokenize(mut self) -> Result<Vec<Token>, Fault> {
        let mut tokens = Vec::new();
        loop {
            let t = self.next_token()?;
            let done = matches!(t, Token::Eof);
            tokens.push(t);
            if done {
                break;
            }
        }
        Ok(tokens)
    }
}

// ── AST ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    GlobMatch,
    RegexMatch,
    NotGlobMatch,
    NotRegexMatch,
    In,
    NotIn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Var(String),
    List(Vec<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
    Index(Box<Expr>, Box<Expr>),
}

// ── Parser ────────────────────────────────────────────────────────────────────

/// Deepest nesting of parentheses, brackets and prefix operators accepted.
pub const MAX_DEPTH: usize = 64;

/// Longest token stream accepted; bounds left-leaning operator chains.
pub const MAX_TOKENS: usize = 1024;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

fn is_keyword(tok: &Token, kw: &str) -> bool {
    matches!(tok, Token::Ident(s) if s == kw)
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Parser { tokens, pos: 0, depth: 0 }
    }

    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, Fault>) -> Result<T, Fault> {
        if self.depth >= MAX_DEPTH {
            return Err(Fault::Syntax("expression nested too deeply".to_string()));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens.get(self.pos + offset).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) -> Token {
        let t = self.tokens.get(self.pos).cloned().unwrap_or(Token::Eof);
        self.pos += 1;
        t
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == expected {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if is_keyword(self.peek(), kw) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token, what: &str) -> Result<(), Fault> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(Fault::Syntax(format!("expected {what}, found {}", describe(self.peek()))))
        }
    }

    // ── Grammar ───────────────────────────────────────────────────────────────

    fn parse_expr(&mut self) -> Result<Expr, Fault> {
        self.nested(Self::parse_ternary)
    }

    fn parse_ternary(&mut self) -> Result<Expr, Fault> {
        let cond = self.parse_or()?;
        if self.eat(&Token::Question) {
            let then = self.parse_or()?;
            self.expect(&Token::Colon, "':' in ternary")?;
            let else_ = self.nested(Self::parse_ternary)?;
            Ok(Expr::Ternary(Box::new(cond), Box::new(then), Box::new(else_)))
        } else {
            Ok(cond)
        }
    }

    fn parse_or(&mut self) -> Result<Expr, Fault> {
        let mut lhs = self.parse_and()?;
        while self.eat(&Token::Or) || self.eat_keyword("or") {
            let rhs = self.parse_and()?;
            lhs = Expr::Binary(BinOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, Fault> {
        let mut lhs = self.parse_not()?;
        while self.eat(&Token::And) || self.eat_keyword("and") {
            let rhs = self.parse_not()?;
            lhs = Expr::Binary(BinOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expr, Fault> {
        if self.eat_keyword("not") {
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(self.nested(Self::parse_not)?)));
        }
        self.parse_relational()
    }

    fn parse_relational(&mut self) -> Result<Expr, Fault> {
        let mut lhs = self.parse_bitor()?;
        loop {
            let not_in = is_keyword(self.peek(), "not") && is_keyword(self.peek_at(1), "in");
            let op = match self.peek() {
                Token::Eq => BinOp::Eq,
                Token::Ne => BinOp::Ne,
                Token::Lt => BinOp::Lt,
                Token::Le => BinOp::Le,
                Token::Gt => BinOp::Gt,
                Token::Ge => BinOp::Ge,
                Token::GlobMatch => BinOp::GlobMatch,
                Token::RegexMatch => BinOp::RegexMatch,
                Token::NotGlobMatch => BinOp::NotGlobMatch,
                Token::NotRegexMatch => BinOp::NotRegexMatch,
                t if is_keyword(t, "in") => BinOp::In,
                _ if not_in => BinOp::NotIn,
                _ => break,
            };
            self.pos += if not_in { 2 } else { 1 };
            let rhs = self.parse_bitor()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_bitor(&mut self) -> Result<Expr, Fault> {
        let mut lhs = self.parse_bitxor()?;
        while self.eat(&Token::Pipe) {
            let rhs = self.parse_bitxor()?;
            lhs = Expr::Binary(BinOp::BitOr, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_bitxor(&mut self) -> Result<Expr, Fault> {
        let mut lhs = self.parse_bitand()?;
        while self.eat(&Token::Caret) {
            let rhs = self.parse_bitand()?;
            lhs = Expr::Binary(BinOp::BitXor, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_bitand(&mut self) -> Result<Expr, Fault> {
        let mut lhs = self.parse_shift()?;
        while self.eat(&Token::Ampersand) {
            let rhs = self.parse_shift()?;
            lhs = Expr::Binary(BinOp::BitAnd, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_shift(&mut self) -> Result<Expr, Fault> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Token::ShiftLeft => BinOp::Shl,
                Token::ShiftRight => BinOp::Shr,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_additive()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Expr, Fault> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, Fault> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                Token::SlashSlash => BinOp::FloorDiv,
                Token::Percent => BinOp::Rem,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, Fault> {
        let op = match self.peek() {
            Token::Minus => UnaryOp::Neg,
            Token::Bang => UnaryOp::Not,
            Token::Tilde => UnaryOp::BitNot,
            _ => return self.parse_postfix(),
        };
        self.pos += 1;
        Ok(Expr::Unary(op, Box::new(self.nested(Self::parse_unary)?)))
    }

    fn parse_postfix(&mut self) -> Result<Expr, Fault> {
        let mut expr = self.parse_primary()?;
        while self.eat(&Token::LBracket) {
            let index = self.parse_expr()?;
            self.expect(&Token::RBracket, "']'")?;
            expr = Expr::Index(Box::new(expr), Box::new(index));
        }
        Ok(expr)
    }

    /// Comma-separated expressions up to `close`.
    fn parse_list(&mut self, close: &Token, what: &str) -> Result<Vec<Expr>, Fault> {
        let mut items = Vec::new();
        if !self.eat(close) {
            items.push(self.parse_expr()?);
            while self.eat(&Token::Comma) {
                if self.peek() == close {
                    break;
                }
                items.push(self.parse_expr()?);
            }
            self.expect(close, what)?;
        }
        Ok(items)
    }

    fn parse_primary(&mut self) -> Result<Expr, Fault> {
        let tok = self.advance();
        match tok {
            Token::Int(n) => Ok(Expr::Literal(Value::Int(n))),
            Token::Float(x) => Ok(Expr::Literal(Value::Float(x))),
            Token::Str(s) => Ok(Expr::Literal(Value::Str(s))),
            Token::Ident(name) => match name.as_str() {
                "true" | "True" => Ok(Expr::Literal(Value::Bool(true))),
                "false" | "False" => Ok(Expr::Literal(Value::Bool(false))),
                "null" | "None" => Ok(Expr::Literal(Value::Null)),
                _ if self.eat(&Token::LParen) => {
                    let what = format!("')' after arguments to {name}");
                    let args = self.parse_list(&Token::RParen, &what)?;
                    Ok(Expr::Call(name, args))
                }
                _ => Ok(Expr::Var(name)),
            },
            Token::LParen => {
                let inner = self.parse_expr()?;
                self.expect(&Token::RParen, "')'")?;
                Ok(inner)
            }
            Token::LBracket => Ok(Expr::List(self.parse_list(&Token::RBracket, "']'")?)),
            other => Err(Fault::Syntax(format!("unexpected {}", describe(&other)))),
        }
    }
}

fn describe(tok: &Token) -> String {
    match tok {
        Token::Eof => "end of expression".to_string(),
        Token::Unknown(c) => format!("character {c:?}"),
        Token::Ident(name) => format!("identifier '{name}'"),
        other => format!("token {other:?}"),
    }
}

/// Parse an inline expression into an AST.
pub fn parse_expr(src: &str) -> Result<Expr, Fault> {
    let tokens = Lexer::new(src).tokenize()?;
    if tokens.len() > MAX_TOKENS {
        return Err(Fault::Syntax(format!("expression longer than {MAX_TOKENS} tokens")));
    }
    let mut parser = Parser::new(tokens);
    let expr = parser.parse_expr()?;
    if parser.peek() != &Token::Eof {
        return Err(Fault::Syntax(format!("unexpected {}", describe(parser.peek()))));
    }
    Ok(expr)
}

// ── Evaluator ─────────────────────────────────────────────────────────────────

/// Evaluate an [`Expr`] AST node against the given context.
pub fn eval_expr(expr: &Expr, ctx: &mut dyn EvalContext) -> Result<Value, Fault> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),

        Expr::Var(name) => ctx.get_var(name),

        Expr::List(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(eval_expr(item, ctx)?);
            }
            Ok(Value::List(out))
        }

        Expr::Unary(op, inner) => {
            let v = eval_expr(inner, ctx)?;
            Ok(match op {
                UnaryOp::Neg => v.arith_neg()?,
                UnaryOp::Not => Value::Bool(!v.as_bool()),
                UnaryOp::BitNot => Value::Int(!int_operand(&v, "~")?),
            })
        }

        Expr::Binary(op, lhs, rhs) => {
            // `and`/`or` short-circuit and yield an operand, not a bool.
            match op {
                BinOp::And => {
                    let l = eval_expr(lhs, ctx)?;
                    return if l.as_bool() { eval_expr(rhs, ctx) } else { Ok(l) };
                }
                BinOp::Or => {
                    let l = eval_expr(lhs, ctx)?;
                    return if l.as_bool() { Ok(l) } else { eval_expr(rhs, ctx) };
                }
                _ => {}
            }
            let l = eval_expr(lhs, ctx)?;
            let r = eval_expr(rhs, ctx)?;
            eval_binop(*op, l, r)
        }

        Expr::Ternary(cond, then, else_) => {
            let c = eval_expr(cond, ctx)?;
            if c.as_bool() {
                eval_expr(then, ctx)
            } else {
                eval_expr(else_, ctx)
            }
        }

        Expr::Call(name, arg_exprs) => {
            let mut args = Vec::with_capacity(arg_exprs.len());
            for ae in arg_exprs {
                args.push(eval_expr(ae, ctx)?);
            }
            ctx.call_fn(name, args)
        }

        Expr::Index(target, index) => {
            let target = eval_expr(target, ctx)?;
            let index = eval_expr(index, ctx)?;
            eval_index(target, &index)
        }
    }
}

fn int_operand(v: &Value, op: &str) -> Result<i64, Fault> {
    v.as_int().ok_or_else(|| {
        Fault::Runtime(format!("unsupported operand type for {op}: '{}'", v.type_name()))
    })
}

fn eval_binop(op: BinOp, l: Value, r: Value) -> Result<Value, Fault> {
    Ok(match op {
        BinOp::Add => l.arith_add(&r)?,
        BinOp::Sub => l.arith_sub(&r)?,
        BinOp::Mul => l.arith_mul(&r)?,
        BinOp::Div => l.arith_div(&r)?,
        BinOp::FloorDiv => l.arith_floor_div(&r)?,
        BinOp::Rem => l.arith_rem(&r)?,

        BinOp::Eq => Value::Bool(l.loose_eq(&r)),
        BinOp::Ne => Value::Bool(!l.loose_eq(&r)),
        BinOp::Lt => Value::Bool(l.cmp_value(&r)?.is_lt()),
        BinOp::Le => Value::Bool(l.cmp_value(&r)?.is_le()),
        BinOp::Gt => Value::Bool(l.cmp_value(&r)?.is_gt()),
        BinOp::Ge => Value::Bool(l.cmp_value(&r)?.is_ge()),

        BinOp::BitAnd => Value::Int(int_operand(&l, "&")? & int_operand(&r, "&")?),
        BinOp::BitOr => Value::Int(int_operand(&l, "|")? | int_operand(&r, "|")?),
        BinOp::BitXor => Value::Int(int_operand(&l, "^")? ^ int_operand(&r, "^")?),
        BinOp::Shl | BinOp::Shr => {
            let a = int_operand(&l, "shift")?;
            let n = u32::try_from(int_operand(&r, "shift")?)
                .ok()
                .filter(|n| *n < 64)
                .ok_or_else(|| Fault::Runtime("shift count out of range".into()))?;
            Value::Int(if op == BinOp::Shl { a << n } else { a >> n })
        }

        BinOp::GlobMatch => Value::Bool(glob_match(&r.to_string(), &l.to_string())),
        BinOp::NotGlobMatch => Value::Bool(!glob_match(&r.to_string(), &l.to_string())),
        BinOp::RegexMatch => Value::Bool(regex_match(&r.to_string(), &l.to_string())?),
        BinOp::NotRegexMatch => Value::Bool(!regex_match(&r.to_string(), &l.to_string())?),

        BinOp::In => Value::Bool(contains(&r, &l)?),
        BinOp::NotIn => Value::Bool(!contains(&r, &l)?),

        BinOp::And | BinOp::Or => unreachable!("handled above"),
    })
}

/// `needle in haystack`
fn contains(haystack: &Value, needle: &Value) -> Result<bool, Fault> {
    match (haystack, needle) {
        (Value::List(items), _) => Ok(items.iter().any(|v| v.loose_eq(needle))),
        (Value::Map(map), Value::Str(key)) => Ok(map.contains_key(key)),
        (Value::Map(_), _) => Ok(false),
        (Value::Str(s), Value::Str(sub)) => Ok(s.contains(sub.as_str())),
        (Value::Str(_), other) => Err(Fault::Runtime(format!(
            "'in <str>' requires str as left operand, not '{}'",
            other.type_name()
        ))),
        (other, _) => Err(Fault::Runtime(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

/// Resolve a possibly negative index against a sequence length.
fn seq_index(index: &Value, len: usize) -> Result<usize, Fault> {
    let i = int_operand(index, "[]")?;
    let resolved = if i < 0 { len as i64 + i } else { i };
    usize::try_from(resolved)
        .ok()
        .filter(|&i| i < len)
        .ok_or_else(|| Fault::Runtime(format!("index {i} out of range")))
}

fn eval_index(target: Value, index: &Value) -> Result<Value, Fault> {
    match target {
        Value::List(mut items) => {
            let i = seq_index(index, items.len())?;
            Ok(items.swap_remove(i))
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let i = seq_index(index, chars.len())?;
            Ok(Value::Str(chars[i].to_string()))
        }
        Value::Map(mut map) => {
            let key = index.to_string();
            map.swap_remove(&key)
                .ok_or_else(|| Fault::Runtime(format!("key {key:?} not found")))
        }
        other => Err(Fault::Runtime(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

// ── Pattern matching ──────────────────────────────────────────────────────────

fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    glob_match_inner(&p, &t)
}

fn glob_match_inner(p: &[char], t: &[char]) -> bool {
    match (p.first(), t.first()) {
        (None, None) => true,
        (Some('*'), _) => {
            // Skip consecutive stars
            let rest_p = p
                .iter()
                .position(|&c| c != '*')
                .map(|i| &p[i..])
                .unwrap_or(&[]);
            (0..=t.len()).any(|i| glob_match_inner(rest_p, &t[i..]))
        }
        (Some('?'), Some(_)) => glob_match_inner(&p[1..], &t[1..]),
        (Some(pc), Some(tc)) if pc == tc => glob_match_inner(&p[1..], &t[1..]),
        _ => false,
    }
}

fn regex_match(pattern: &str, text: &str) -> Result<bool, Fault> {
    regex::Regex::new(pattern)
        .map(|re| re.is_match(text))
        .map_err(|e| Fault::Runtime(format!("invalid regex {pattern:?}: {e}")))
}

/// Convenience: parse and evaluate an expression string.
pub fn eval_str(src: &str, ctx: &mut dyn EvalContext) -> Result<Value, Fault> {
    let expr = parse_expr(src)?;
    eval_expr(&expr, ctx)
}

// ── Sandbox ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Binding {
    Value(Value),
    Builtin,
    /// `get_variable(name[, default])`
    Get,
    /// `has_variable(name)`
    Has,
    Denied,
}

/// Evaluation namespace built fresh for every inline expression.
pub struct Sandbox<'s> {
    store: &'s mut VarStore,
    names: HashMap<String, Binding>,
}

impl<'s> Sandbox<'s> {
    pub fn new(store: &'s mut VarStore) -> Self {
        let mut names: HashMap<String, Binding> = builtins::NAMES
            .iter()
            .map(|name| (name.to_string(), Binding::Builtin))
            .collect();
        for (name, value) in store.iter() {
            names.insert(name.to_string(), Binding::Value(value.clone()));
        }
        for name in ["get_variable", "get", "g"] {
            names.insert(name.to_string(), Binding::Get);
        }
        for name in ["has_variable", "has", "h"] {
            names.insert(name.to_string(), Binding::Has);
        }
        // Rebound last so nothing above can shadow them.
        for name in DENIED {
            names.insert(name.to_string(), Binding::Denied);
        }
        Sandbox { store, names }
    }

    fn helper_name<'a>(args: &'a [Value], helper: &str) -> Result<&'a str, Fault> {
        args.first().and_then(Value::as_str).ok_or_else(|| {
            Fault::Runtime(format!("{helper}() expects a variable name string"))
        })
    }
}

impl EvalContext for Sandbox<'_> {
    fn get_var(&self, name: &str) -> Result<Value, Fault> {
        match self.names.get(name) {
            Some(Binding::Value(v)) => Ok(v.clone()),
            Some(Binding::Denied) => Err(Fault::Disallowed(name.to_string())),
            Some(_) => Err(Fault::Runtime(format!(
                "'{name}' is a function; call it as {name}(...)"
            ))),
            None => Err(Fault::Name(format!("name '{name}' is not defined"))),
        }
    }

    fn call_fn(&mut self, name: &str, args: Vec<Value>) -> Result<Value, Fault> {
        match self.names.get(name) {
            Some(Binding::Builtin) => match builtins::call_builtin(name, args) {
                Some(result) => result.map_err(Fault::Runtime),
                None => Err(Fault::Name(format!("name '{name}' is not defined"))),
            },
            Some(Binding::Get) => {
                let var = Self::helper_name(&args, name)?;
                match (self.store.resolve(var), args.get(1)) {
                    (Some(v), _) => Ok(v),
                    (None, Some(default)) => Ok(default.clone()),
                    (None, None) => Err(Fault::Name(format!("undefined variable '{var}'"))),
                }
            }
            Some(Binding::Has) => {
                let var = Self::helper_name(&args, name)?;
                Ok(Value::Bool(self.store.has(var)))
            }
            Some(Binding::Denied) => Err(Fault::Disallowed(name.to_string())),
            Some(Binding::Value(v)) => Err(Fault::Runtime(format!(
                "'{}' object is not callable",
                v.type_name()
            ))),
            None => Err(Fault::Name(format!("name '{name}' is not defined"))),
        }
    }
}

/// Evaluate inline code against `store`.
pub fn eval_inline(code: &str, store: &mut VarStore) -> crate::Result<Value> {
    log::debug!("evaluating inline expression: {code}");
    let mut sandbox = Sandbox::new(store);
    eval_str(code, &mut sandbox).map_err(|fault| fault.into_error(code))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
