//! Hand-written pull lexer for SNEX source text.
//!
//! [`lex`] turns a source string into an EOF-terminated [`TokenList`],
//! interning identifiers into the compilation's [`StringInterner`] and
//! capturing `///` and `/** */` comments as doc text for the following
//! declaration.

mod cursor;
mod scanner;

use rustc_hash::FxHashMap;
use snex_diagnostic::CompileResult;
use snex_ir::{StringInterner, TokenKind, TokenList};

pub use cursor::Cursor;
pub use scanner::Scanner;

/// Tokenize `source` completely.
///
/// Stops at the first lexical error; no partial token list is returned.
pub fn lex(source: &str, interner: &mut StringInterner) -> CompileResult<TokenList> {
    let mut buf = source.as_bytes().to_vec();
    buf.push(cursor::SENTINEL);

    let mut scanner = Scanner::new(&buf, interner);
    let mut tokens = Vec::new();
    let mut docs = FxHashMap::default();

    loop {
        let token = scanner.next_token()?;
        if let Some(doc) = scanner.take_pending_doc() {
            docs.insert(tokens.len() as u32, doc);
        }
        let at_eof = token.kind == TokenKind::Eof;
        tokens.push(token);
        if at_eof {
            break;
        }
    }

    Ok(TokenList::new(tokens, docs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use snex_ir::{Span, TokenKind};

    fn kinds(source: &str) -> Vec<TokenKind> {
        let mut interner = StringInterner::new();
        lex(source, &mut interner)
            .expect("lex failed")
            .tokens()
            .iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn scans_a_function_header() {
        let mut interner = StringInterner::new();
        let list = lex("int test(int input)", &mut interner).expect("lex failed");
        let input = interner.intern("input");
        let test = interner.intern("test");
        assert_eq!(
            list.tokens().iter().map(|t| t.kind).collect::<Vec<_>>(),
            vec![
                TokenKind::Int,
                TokenKind::Ident(test),
                TokenKind::LParen,
                TokenKind::Int,
                TokenKind::Ident(input),
                TokenKind::RParen,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn longest_match_operators() {
        assert_eq!(
            kinds("++ += + :: : == = && -- -="),
            vec![
                TokenKind::Inc,
                TokenKind::PlusAssign,
                TokenKind::Plus,
                TokenKind::ColonColon,
                TokenKind::Colon,
                TokenKind::EqEq,
                TokenKind::Assign,
                TokenKind::AndAnd,
                TokenKind::Dec,
                TokenKind::MinusAssign,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn number_literals() {
        assert_eq!(
            kinds("42 0x2A 052 2.5 2.5f 1e3 3f"),
            vec![
                TokenKind::IntLit(42),
                TokenKind::IntLit(42),
                TokenKind::IntLit(42),
                TokenKind::DoubleLit(2.5),
                TokenKind::FloatLit(2.5),
                TokenKind::DoubleLit(1000.0),
                TokenKind::FloatLit(3.0),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn malformed_literal_reports_line() {
        let mut interner = StringInterner::new();
        let err = lex("int x = 1;\nint y = 12ab;", &mut interner).unwrap_err();
        let diag = err.into_diagnostic("int x = 1;\nint y = 12ab;");
        assert_eq!(diag.line, 2);
    }

    #[test]
    fn unexpected_character() {
        let mut interner = StringInterner::new();
        let err = lex("int x = $;", &mut interner).unwrap_err();
        assert!(err.to_string().contains('$'));
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(
            kinds("1 // line\n/* block */ 2"),
            vec![TokenKind::IntLit(1), TokenKind::IntLit(2), TokenKind::Eof]
        );
    }

    #[test]
    fn unterminated_block_comment() {
        let mut interner = StringInterner::new();
        let err = lex("/* never closed", &mut interner).unwrap_err();
        assert!(err.to_string().contains("unterminated block comment"));
    }

    #[test]
    fn doc_comment_attaches_to_next_token() {
        let mut interner = StringInterner::new();
        let list = lex("/// the gain value\nfloat gain = 1.0f;", &mut interner)
            .expect("lex failed");
        assert_eq!(list.doc_comment(0), Some("the gain value"));
        assert_eq!(list.doc_comment(1), None);
    }

    #[test]
    fn keywords_and_spans() {
        let mut interner = StringInterner::new();
        let list = lex("return", &mut interner).expect("lex failed");
        assert_eq!(list[0].kind, TokenKind::Return);
        assert_eq!(list[0].span, Span::new(0, 6));
    }

    #[test]
    fn string_literal_with_escapes() {
        let mut interner = StringInterner::new();
        let list = lex("\"a\\nb\"", &mut interner).expect("lex failed");
        let TokenKind::StringLit(name) = list[0].kind else {
            panic!("expected string literal");
        };
        assert_eq!(interner.resolve(name), "a\nb");
    }
}
