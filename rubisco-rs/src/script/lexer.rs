//! Template tokeniser.
//!
//! Splits a template into literal runs and the pieces of `${{name}}`,
//! `${{name: fallback}}` and `$&{{code}}` constructs. The lexer keeps a
//! stack of states so a fallback can itself contain references and inline
//! code.

use crate::error::{Error, Result};

pub(crate) const VAR_OPEN: &str = "${{";
pub(crate) const CODE_OPEN: &str = "$&{{";
const CLOSE: &str = "}}";

/// Deepest chain of constructs opened inside fallbacks.
pub const MAX_NESTING: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Literal,
    VarOpen,
    VarName,
    VarFallback,
    VarClose,
    CodeOpen,
    CodeText,
    CodeClose,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
}

impl Token {
    fn new(kind: TokenKind, text: impl Into<String>) -> Self {
        Token { kind, text: text.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Literal,
    VarName,
    Fallback,
    Code,
}

/// Returns `true` if `name` is a legal variable name.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-'))
}

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    stack: Vec<State>,
    tokens: Vec<Token>,
    /// Pending literal text in the current literal or fallback state.
    buf: String,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Lexer {
            src,
            pos: 0,
            stack: vec![State::Literal],
            tokens: Vec::new(),
            buf: String::new(),
        }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn state(&self) -> State {
        self.stack.last().copied().unwrap_or(State::Literal)
    }

    fn flush_literal(&mut self) {
        if !self.buf.is_empty() {
            let text = std::mem::take(&mut self.buf);
            self.tokens.push(Token::new(TokenKind::Literal, text));
        }
    }

    fn emit(&mut self, kind: TokenKind, text: &str) {
        self.tokens.push(Token::new(kind, text));
    }

    /// Consume an opener if one starts here. Shared by literal and fallback
    /// states.
    fn try_open(&mut self) -> Result<bool> {
        let rest = self.rest();
        let (kind, opener, state) = if rest.starts_with(VAR_OPEN) {
            (TokenKind::VarOpen, VAR_OPEN, State::VarName)
        } else if rest.starts_with(CODE_OPEN) {
            (TokenKind::CodeOpen, CODE_OPEN, State::Code)
        } else {
            return Ok(false);
        };
        // The bottom of the stack is the top-level literal state.
        if self.stack.len() > MAX_NESTING {
            return Err(Error::malformed(
                format!("template nested more than {MAX_NESTING} levels deep"),
                Some("split the fallback chain across several variables"),
            ));
        }
        self.flush_literal();
        self.emit(kind, opener);
        self.pos += opener.len();
        self.stack.push(state);
        Ok(true)
    }

    fn take_char(&mut self) {
        if let Some(c) = self.rest().chars().next() {
            self.buf.push(c);
            self.pos += c.len_utf8();
        }
    }

    fn lex_literal(&mut self) -> Result<()> {
        if !self.try_open()? {
            self.take_char();
        }
        Ok(())
    }

    fn lex_var_name(&mut self) -> Result<()> {
        let rest = self.rest();
        let end = rest.find([':', '}']).unwrap_or(rest.len());
        if end == rest.len() {
            return Err(unterminated("variable reference", self.src));
        }
        let raw = &rest[..end];
        let name = raw.trim();
        if !is_valid_name(name) {
            return Err(Error::malformed(
                format!("invalid variable name {name:?}"),
                Some("names may only contain letters, digits, '_', '.' and '-'"),
            ));
        }
        self.emit(TokenKind::VarName, name);
        self.pos += end;

        let rest = self.rest();
        if rest.starts_with(':') {
            self.pos += 1;
            self.emit(TokenKind::VarFallback, ":");
            let skipped = self.rest().len() - self.rest().trim_start().len();
            self.pos += skipped;
            let rest = self.rest();
            if rest.is_empty() {
                return Err(unterminated("fallback", self.src));
            }
            if rest.starts_with(':') || rest.starts_with('}') {
                return Err(Error::malformed(
                    format!("empty fallback for variable {name:?}"),
                    Some("remove the ':' or give a default after it"),
                ));
            }
            self.stack.pop();
            self.stack.push(State::Fallback);
        } else if rest.starts_with(CLOSE) {
            self.pos += CLOSE.len();
            self.emit(TokenKind::VarClose, CLOSE);
            self.stack.pop();
        } else {
            return Err(Error::malformed(
                format!("expected '}}}}' after variable name {name:?}"),
                None,
            ));
        }
        Ok(())
    }

    fn lex_fallback(&mut self) -> Result<()> {
        if self.try_open()? {
            return Ok(());
        }
        let rest = self.rest();
        if rest.starts_with(CLOSE) {
            self.flush_literal();
            self.pos += CLOSE.len();
            self.emit(TokenKind::VarClose, CLOSE);
            self.stack.pop();
        } else if rest.starts_with('}') {
            return Err(Error::malformed(
                "unmatched '}' inside fallback",
                Some("close the reference with '}}'"),
            ));
        } else {
            self.take_char();
        }
        Ok(())
    }

    fn lex_code(&mut self) -> Result<()> {
        let rest = self.rest();
        let Some(end) = rest.find(CLOSE) else {
            return Err(unterminated("inline code", self.src));
        };
        if end > 0 {
            self.emit(TokenKind::CodeText, &rest[..end]);
        }
        self.pos += end + CLOSE.len();
        self.emit(TokenKind::CodeClose, CLOSE);
        self.stack.pop();
        Ok(())
    }

    fn run(mut self) -> Result<Vec<Token>> {
        while self.pos < self.src.len() {
            match self.state() {
                State::Literal => self.lex_literal()?,
                State::VarName => self.lex_var_name()?,
                State::Fallback => self.lex_fallback()?,
                State::Code => self.lex_code()?,
            }
        }
        match self.state() {
            State::Literal if self.stack.len() == 1 => {}
            State::Code => return Err(unterminated("inline code", self.src)),
            State::Fallback => return Err(unterminated("fallback", self.src)),
            _ => return Err(unterminated("variable reference", self.src)),
        }
        self.flush_literal();
        log::trace!("lexed {} tokens from {:?}", self.tokens.len(), self.src);
        Ok(self.tokens)
    }
}

fn unterminated(what: &str, src: &str) -> Error {
    Error::malformed(
        format!("unterminated {what} in {src:?}"),
        Some("every '${{' or '$&{{' needs a matching '}}'"),
    )
}

/// Tokenise `src`. Either every token is returned or the whole call fails.
pub fn tokenize(src: &str) -> Result<Vec<Token>> {
    Lexer::new(src).run()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::TokenKind::*;
    use super::*;

    fn kinds(src: &str) -> Vec<(TokenKind, String)> {
        tokenize(src)
            .unwrap()
            .into_iter()
            .map(|t| (t.kind, t.text))
            .collect()
    }

    fn tok(kind: TokenKind, text: &str) -> (TokenKind, String) {
        (kind, text.to_string())
    }

    #[test]
    fn plain_text() {
        assert_eq!(kinds("just text"), vec![tok(Literal, "just text")]);
        assert!(tokenize("").unwrap().is_empty());
    }

    #[test]
    fn simple_reference() {
        assert_eq!(
            kinds("srt ${{ hello }} end"),
            vec![
                tok(Literal, "srt "),
                tok(VarOpen, "${{"),
                tok(VarName, "hello"),
                tok(VarClose, "}}"),
                tok(Literal, " end"),
            ]
        );
    }

    #[test]
    fn stray_close_is_literal() {
        assert_eq!(
            kinds("srt ${{hello }}}} end"),
            vec![
                tok(Literal, "srt "),
                tok(VarOpen, "${{"),
                tok(VarName, "hello"),
                tok(VarClose, "}}"),
                tok(Literal, "}} end"),
            ]
        );
    }

    #[test]
    fn fallback_with_nested_code() {
        assert_eq!(
            kinds("${{var:$&{{1+1}}}}"),
            vec![
                tok(VarOpen, "${{"),
                tok(VarName, "var"),
                tok(VarFallback, ":"),
                tok(CodeOpen, "$&{{"),
                tok(CodeText, "1+1"),
                tok(CodeClose, "}}"),
                tok(VarClose, "}}"),
            ]
        );
    }

    #[test]
    fn whitespace_after_colon_skipped() {
        assert_eq!(
            kinds("${{u: fallback}}"),
            vec![
                tok(VarOpen, "${{"),
                tok(VarName, "u"),
                tok(VarFallback, ":"),
                tok(Literal, "fallback"),
                tok(VarClose, "}}"),
            ]
        );
    }

    #[test]
    fn empty_code() {
        assert_eq!(kinds("$&{{}}"), vec![tok(CodeOpen, "$&{{"), tok(CodeClose, "}}")]);
    }

    #[test]
    fn unicode_literal() {
        assert_eq!(kinds("héllo ✓"), vec![tok(Literal, "héllo ✓")]);
    }

    #[test]
    fn malformed_inputs() {
        for src in [
            "${{",
            "${{name",
            "${{bad name}}",
            "${{}}",
            "${{a:}}",
            "${{a::b}}",
            "${{a:b}",
            "${{a:b} c}}",
            "${{a:b",
            "$&{{1+1",
            "${{a}",
        ] {
            assert!(
                matches!(tokenize(src), Err(Error::MalformedExpression { .. })),
                "expected failure for {src:?}"
            );
        }
    }

    #[test]
    fn nesting_depth_is_bounded() {
        let nested = |depth: usize| {
            format!("{}end{}", "${{a: ".repeat(depth), "}}".repeat(depth))
        };
        assert!(tokenize(&nested(MAX_NESTING)).is_ok());
        let err = tokenize(&nested(MAX_NESTING + 1)).unwrap_err();
        assert!(matches!(err, Error::MalformedExpression { .. }));
        assert!(err.to_string().contains("levels deep"), "{err}");
        assert!(tokenize(&nested(10_000)).is_err());
    }

    #[test]
    fn name_grammar() {
        assert!(is_valid_name("host.os"));
        assert!(is_valid_name("a-b_9"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("a b"));
        assert!(!is_valid_name("a$"));
    }
}
