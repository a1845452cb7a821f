//! Pull scanner classifying one lexeme at a time.
//!
//! Main dispatch covers the leading byte of every lexeme. Fixed tokens use
//! longest-match (`++` and `+=` before `+`, `::` before `:`), keywords are
//! resolved through the closed keyword table, and malformed input raises a
//! location-tagged [`CompileError`].

use snex_diagnostic::{CompileError, CompileResult};
use snex_ir::{Span, StringInterner, Token, TokenKind};

use crate::cursor::Cursor;

pub struct Scanner<'a> {
    cursor: Cursor<'a>,
    interner: &'a mut StringInterner,
    /// Doc comment text collected since the last token, attached to the
    /// next declaration token by the integration layer.
    pending_doc: Option<String>,
}

impl<'a> Scanner<'a> {
    pub fn new(buf: &'a [u8], interner: &'a mut StringInterner) -> Self {
        Scanner {
            cursor: Cursor::new(buf),
            interner,
            pending_doc: None,
        }
    }

    /// Doc comment captured ahead of the token about to be produced.
    pub fn take_pending_doc(&mut self) -> Option<String> {
        self.pending_doc.take()
    }

    /// Produce the next token, skipping whitespace and comments.
    ///
    /// Returns `TokenKind::Eof` once the source is exhausted; subsequent
    /// calls keep returning it.
    pub fn next_token(&mut self) -> CompileResult<Token> {
        loop {
            self.cursor.eat_while(|b| b.is_ascii_whitespace());
            if self.cursor.is_eof() {
                let pos = self.cursor.pos();
                return Ok(Token::new(TokenKind::Eof, Span::point(pos)));
            }
            let start = self.cursor.pos();
            match self.cursor.current() {
                b'/' if self.cursor.peek() == b'/' => self.line_comment(),
                b'/' if self.cursor.peek() == b'*' => self.block_comment(start)?,
                _ => break,
            }
        }

        let start = self.cursor.pos();
        match self.cursor.current() {
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => Ok(self.identifier(start)),
            b'0'..=b'9' => self.number(start),
            b'"' => self.string(start),
            _ => self.fixed_token(start),
        }
    }

    // --- Comments ---------------------------------------------------------

    fn line_comment(&mut self) {
        let start = self.cursor.pos();
        self.cursor.skip_to_line_end();
        let text = self.cursor.slice(start, self.cursor.pos());
        // `///` comments document the following declaration.
        if let Some(doc) = text.strip_prefix(b"///") {
            self.append_doc(doc);
        }
    }

    fn block_comment(&mut self, start: u32) -> CompileResult<()> {
        self.cursor.advance(); // '/'
        self.cursor.advance(); // '*'
        let is_doc = self.cursor.current() == b'*' && self.cursor.peek() != b'/';
        loop {
            match self.cursor.find(b'*') {
                Some(pos) => {
                    self.cursor.seek(pos + 1);
                    if self.cursor.current() == b'/' {
                        self.cursor.advance();
                        break;
                    }
                }
                None => {
                    return Err(CompileError::UnterminatedComment {
                        span: Span::new(start, self.cursor.pos()),
                    });
                }
            }
        }
        if is_doc {
            let body = self.cursor.slice(start + 3, self.cursor.pos().saturating_sub(2));
            self.append_doc(body);
        }
        Ok(())
    }

    fn append_doc(&mut self, raw: &[u8]) {
        let text = String::from_utf8_lossy(raw);
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        match &mut self.pending_doc {
            Some(doc) => {
                doc.push('\n');
                doc.push_str(text);
            }
            None => self.pending_doc = Some(text.to_owned()),
        }
    }

    // --- Identifiers & keywords ------------------------------------------

    fn identifier(&mut self, start: u32) -> Token {
        self.cursor
            .eat_while(|b| b.is_ascii_alphanumeric() || b == b'_');
        let span = Span::new(start, self.cursor.pos());
        let text = self.cursor.slice(span.start, span.end);
        let text = std::str::from_utf8(text).unwrap_or_default();
        let kind = match TokenKind::keyword(text) {
            Some(kw) => kw,
            None => TokenKind::Ident(self.interner.intern(text)),
        };
        Token::new(kind, span)
    }

    // --- Literals ---------------------------------------------------------

    fn number(&mut self, start: u32) -> CompileResult<Token> {
        // Hex: 0x...
        if self.cursor.current() == b'0' && matches!(self.cursor.peek(), b'x' | b'X') {
            self.cursor.advance();
            self.cursor.advance();
            self.cursor.eat_while(|b| b.is_ascii_hexdigit());
            return self.finish_int(start, 16, 2);
        }

        self.cursor.eat_while(|b| b.is_ascii_digit());

        let mut is_float = false;
        if self.cursor.current() == b'.' && self.cursor.peek().is_ascii_digit() {
            is_float = true;
            self.cursor.advance();
            self.cursor.eat_while(|b| b.is_ascii_digit());
        }
        if matches!(self.cursor.current(), b'e' | b'E') {
            is_float = true;
            self.cursor.advance();
            if matches!(self.cursor.current(), b'+' | b'-') {
                self.cursor.advance();
            }
            self.cursor.eat_while(|b| b.is_ascii_digit());
        }

        let digits_end = self.cursor.pos();
        let mut has_f_suffix = false;
        if matches!(self.cursor.current(), b'f' | b'F') {
            has_f_suffix = true;
            self.cursor.advance();
        }

        // A literal running into identifier characters is malformed (12ab).
        if self.cursor.current().is_ascii_alphanumeric() || self.cursor.current() == b'.' {
            self.cursor
                .eat_while(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'_');
            return Err(self.malformed(start));
        }

        let span = Span::new(start, self.cursor.pos());
        let text = String::from_utf8_lossy(self.cursor.slice(start, digits_end)).into_owned();

        if is_float || has_f_suffix {
            if has_f_suffix {
                let value: f32 = text.parse().map_err(|_| self.malformed(start))?;
                Ok(Token::new(TokenKind::FloatLit(value), span))
            } else {
                let value: f64 = text.parse().map_err(|_| self.malformed(start))?;
                Ok(Token::new(TokenKind::DoubleLit(value), span))
            }
        } else if text.len() > 1 && text.starts_with('0') {
            // Leading zero means octal.
            let value =
                i64::from_str_radix(&text[1..], 8).map_err(|_| self.malformed(start))?;
            Ok(Token::new(TokenKind::IntLit(value), span))
        } else {
            let value: i64 = text.parse().map_err(|_| self.malformed(start))?;
            Ok(Token::new(TokenKind::IntLit(value), span))
        }
    }

    fn finish_int(&mut self, start: u32, radix: u32, prefix_len: u32) -> CompileResult<Token> {
        let span = Span::new(start, self.cursor.pos());
        let text = self.cursor.slice(start + prefix_len, span.end);
        let text = std::str::from_utf8(text).unwrap_or_default();
        if text.is_empty() {
            return Err(self.malformed(start));
        }
        let value = i64::from_str_radix(text, radix).map_err(|_| self.malformed(start))?;
        Ok(Token::new(TokenKind::IntLit(value), span))
    }

    fn malformed(&self, start: u32) -> CompileError {
        let span = Span::new(start, self.cursor.pos());
        CompileError::MalformedLiteral {
            literal: String::from_utf8_lossy(self.cursor.slice(span.start, span.end)).into_owned(),
            span,
        }
    }

    fn string(&mut self, start: u32) -> CompileResult<Token> {
        self.cursor.advance(); // opening quote
        let mut value = String::new();
        loop {
            if self.cursor.is_eof() || self.cursor.current() == b'\n' {
                return Err(CompileError::UnterminatedString {
                    span: Span::new(start, self.cursor.pos()),
                });
            }
            match self.cursor.current() {
                b'"' => {
                    self.cursor.advance();
                    break;
                }
                b'\\' => {
                    self.cursor.advance();
                    let escaped = match self.cursor.current() {
                        b'n' => '\n',
                        b't' => '\t',
                        b'\\' => '\\',
                        b'"' => '"',
                        other => other as char,
                    };
                    value.push(escaped);
                    self.cursor.advance();
                }
                other => {
                    value.push(other as char);
                    self.cursor.advance();
                }
            }
        }
        let span = Span::new(start, self.cursor.pos());
        Ok(Token::new(
            TokenKind::StringLit(self.interner.intern(&value)),
            span,
        ))
    }

    // --- Fixed tokens -----------------------------------------------------

    /// Longest-match against the closed operator/punctuation table.
    fn fixed_token(&mut self, start: u32) -> CompileResult<Token> {
        let current = self.cursor.current();
        let next = self.cursor.peek();
        let (kind, len) = match (current, next) {
            (b'+', b'+') => (TokenKind::Inc, 2),
            (b'+', b'=') => (TokenKind::PlusAssign, 2),
            (b'+', _) => (TokenKind::Plus, 1),
            (b'-', b'-') => (TokenKind::Dec, 2),
            (b'-', b'=') => (TokenKind::MinusAssign, 2),
            (b'-', _) => (TokenKind::Minus, 1),
            (b'*', b'=') => (TokenKind::StarAssign, 2),
            (b'*', _) => (TokenKind::Star, 1),
            (b'/', b'=') => (TokenKind::SlashAssign, 2),
            (b'/', _) => (TokenKind::Slash, 1),
            (b'%', b'=') => (TokenKind::PercentAssign, 2),
            (b'%', _) => (TokenKind::Percent, 1),
            (b'=', b'=') => (TokenKind::EqEq, 2),
            (b'=', _) => (TokenKind::Assign, 1),
            (b'!', b'=') => (TokenKind::NotEq, 2),
            (b'!', _) => (TokenKind::Bang, 1),
            (b'<', b'=') => (TokenKind::LtEq, 2),
            (b'<', _) => (TokenKind::Lt, 1),
            (b'>', b'=') => (TokenKind::GtEq, 2),
            (b'>', _) => (TokenKind::Gt, 1),
            (b'&', b'&') => (TokenKind::AndAnd, 2),
            (b'|', b'|') => (TokenKind::OrOr, 2),
            (b':', b':') => (TokenKind::ColonColon, 2),
            (b':', _) => (TokenKind::Colon, 1),
            (b'?', _) => (TokenKind::Question, 1),
            (b',', _) => (TokenKind::Comma, 1),
            (b';', _) => (TokenKind::Semicolon, 1),
            (b'.', _) => (TokenKind::Dot, 1),
            (b'(', _) => (TokenKind::LParen, 1),
            (b')', _) => (TokenKind::RParen, 1),
            (b'{', _) => (TokenKind::LBrace, 1),
            (b'}', _) => (TokenKind::RBrace, 1),
            (b'[', _) => (TokenKind::LBracket, 1),
            (b']', _) => (TokenKind::RBracket, 1),
            _ => {
                return Err(CompileError::UnexpectedCharacter {
                    found: current as char,
                    span: Span::new(start, start + 1),
                });
            }
        };
        for _ in 0..len {
            self.cursor.advance();
        }
        Ok(Token::new(kind, Span::new(start, self.cursor.pos())))
    }
}
