//! Token cursor for navigating the lexer's output.

use snex_diagnostic::{CompileError, CompileResult};
use snex_ir::{Name, Span, Token, TokenKind, TokenList, TokenRange};

/// Position-tracked view over a [`TokenList`].
///
/// The list is always EOF-terminated, so `current()` never runs off the
/// end; consuming EOF is a no-op.
pub struct TokenCursor<'a> {
    tokens: &'a TokenList,
    pos: usize,
}

impl<'a> TokenCursor<'a> {
    pub fn new(tokens: &'a TokenList) -> Self {
        TokenCursor { tokens, pos: 0 }
    }

    /// Start at a token offset, used for lazily-parsed function bodies.
    pub fn at(tokens: &'a TokenList, pos: usize) -> Self {
        debug_assert!(pos < tokens.len(), "cursor start out of bounds");
        TokenCursor { tokens, pos }
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Reposition the cursor, used when re-parsing captured token ranges.
    pub fn set_position(&mut self, pos: usize) {
        debug_assert!(pos < self.tokens.len(), "cursor position out of bounds");
        self.pos = pos;
    }

    #[inline]
    pub fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    #[inline]
    pub fn kind(&self) -> TokenKind {
        self.current().kind
    }

    #[inline]
    pub fn span(&self) -> Span {
        self.current().span
    }

    pub fn previous_span(&self) -> Span {
        if self.pos > 0 {
            self.tokens[self.pos - 1].span
        } else {
            Span::DUMMY
        }
    }

    /// Lookahead without consuming; `peek(0)` is the current token.
    pub fn peek(&self, offset: usize) -> TokenKind {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        self.tokens[idx].kind
    }

    /// Consume and return the current token.
    pub fn bump(&mut self) -> Token {
        let token = *self.current();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    #[inline]
    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind() == kind
    }

    /// Consume the current token if it matches `kind`.
    pub fn eat(&mut self, kind: TokenKind) -> bool {
        if self.is(kind) {
            self.bump();
            return true;
        }
        false
    }

    /// Consume a token of the given kind or fail with its description.
    pub fn expect(&mut self, kind: TokenKind) -> CompileResult<Token> {
        if self.is(kind) {
            return Ok(self.bump());
        }
        Err(CompileError::UnexpectedToken {
            expected: kind.describe().to_owned(),
            found: self.kind().describe().to_owned(),
            span: self.span(),
        })
    }

    /// Consume an identifier token and return its interned name.
    pub fn expect_ident(&mut self) -> CompileResult<(Name, Span)> {
        match self.kind() {
            TokenKind::Ident(name) => {
                let span = self.span();
                self.bump();
                Ok((name, span))
            }
            found => Err(CompileError::UnexpectedToken {
                expected: "identifier".to_owned(),
                found: found.describe().to_owned(),
                span: self.span(),
            }),
        }
    }

    /// Capture a brace-delimited body as a token range, including both
    /// braces, without parsing it. The cursor must sit on `{`.
    pub fn capture_braced(&mut self) -> CompileResult<TokenRange> {
        let start = self.pos as u32;
        self.expect(TokenKind::LBrace)?;
        let mut depth = 1u32;
        while depth > 0 {
            match self.kind() {
                TokenKind::LBrace => depth += 1,
                TokenKind::RBrace => depth -= 1,
                TokenKind::Eof => {
                    return Err(CompileError::UnexpectedToken {
                        expected: "'}'".to_owned(),
                        found: "end of file".to_owned(),
                        span: self.span(),
                    });
                }
                _ => {}
            }
            self.bump();
        }
        Ok(TokenRange {
            start,
            end: self.pos as u32,
        })
    }

    /// Doc comment attached to the current token, if the lexer captured one.
    pub fn doc_comment(&self) -> Option<&'a str> {
        self.tokens.doc_comment(self.pos as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snex_ir::StringInterner;

    fn tokens(src: &str) -> (TokenList, StringInterner) {
        let mut interner = StringInterner::new();
        let list = snex_lexer::lex(src, &mut interner).expect("lex");
        (list, interner)
    }

    #[test]
    fn bump_stops_at_eof() {
        let (list, _) = tokens("a");
        let mut c = TokenCursor::new(&list);
        c.bump();
        assert_eq!(c.kind(), TokenKind::Eof);
        c.bump();
        assert_eq!(c.kind(), TokenKind::Eof);
    }

    #[test]
    fn capture_matches_nested_braces() {
        let (list, _) = tokens("{ if (x) { y; } } int");
        let mut c = TokenCursor::new(&list);
        let range = c.capture_braced().expect("capture");
        assert_eq!(range.start, 0);
        assert_eq!(c.kind(), TokenKind::Int);
        assert_eq!(list[range.end as usize - 1].kind, TokenKind::RBrace);
    }

    #[test]
    fn expect_reports_found_token() {
        let (list, _) = tokens("+");
        let mut c = TokenCursor::new(&list);
        let err = c.expect(TokenKind::Semicolon).unwrap_err();
        assert_eq!(err.to_string(), "expected ';', found '+'");
    }
}
