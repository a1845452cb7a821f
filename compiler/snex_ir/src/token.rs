//! Token kinds and the token list produced by the lexer.

use crate::interner::Name;
use crate::span::Span;
use rustc_hash::FxHashMap;
use std::fmt;

/// Classified lexeme.
///
/// Literal tokens carry their parsed value; identifier tokens carry the
/// interned name. Keywords are separate variants so the parser never
/// compares strings.
#[derive(Copy, Clone, PartialEq, Debug)]
pub enum TokenKind {
    // Literals
    IntLit(i64),
    FloatLit(f32),
    DoubleLit(f64),
    StringLit(Name),

    Ident(Name),

    // Type keywords
    Int,
    Float,
    Double,
    Void,
    Bool,
    BlockTy,
    EventTy,
    Auto,
    SpanTy,
    DynTy,

    // Declaration keywords
    Struct,
    Class,
    Enum,
    Namespace,
    Using,
    Template,
    Typename,
    Public,
    Private,
    Protected,
    Const,
    Static,

    // Statement keywords
    If,
    Else,
    Return,
    LoopBlock,
    LoopSpan,
    True,
    False,

    // Operators and punctuation
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PercentAssign,
    EqEq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    AndAnd,
    OrOr,
    Bang,
    Inc,
    Dec,
    Question,
    Colon,
    ColonColon,
    Comma,
    Semicolon,
    Dot,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,

    Eof,
}

impl TokenKind {
    /// Keyword lookup for a scanned identifier lexeme.
    pub fn keyword(lexeme: &str) -> Option<TokenKind> {
        Some(match lexeme {
            "int" => TokenKind::Int,
            "float" => TokenKind::Float,
            "double" => TokenKind::Double,
            "void" => TokenKind::Void,
            "bool" => TokenKind::Bool,
            "block" => TokenKind::BlockTy,
            "event" => TokenKind::EventTy,
            "auto" => TokenKind::Auto,
            "span" => TokenKind::SpanTy,
            "dyn" => TokenKind::DynTy,
            "struct" => TokenKind::Struct,
            "class" => TokenKind::Class,
            "enum" => TokenKind::Enum,
            "namespace" => TokenKind::Namespace,
            "using" => TokenKind::Using,
            "template" => TokenKind::Template,
            "typename" => TokenKind::Typename,
            "public" => TokenKind::Public,
            "private" => TokenKind::Private,
            "protected" => TokenKind::Protected,
            "const" => TokenKind::Const,
            "static" => TokenKind::Static,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "return" => TokenKind::Return,
            "loop_block" => TokenKind::LoopBlock,
            "loop_span" => TokenKind::LoopSpan,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            _ => return None,
        })
    }

    /// Spelling used in "expected X, found Y" diagnostics.
    pub fn describe(&self) -> &'static str {
        match self {
            TokenKind::IntLit(_) => "integer literal",
            TokenKind::FloatLit(_) => "float literal",
            TokenKind::DoubleLit(_) => "double literal",
            TokenKind::StringLit(_) => "string literal",
            TokenKind::Ident(_) => "identifier",
            TokenKind::Int => "'int'",
            TokenKind::Float => "'float'",
            TokenKind::Double => "'double'",
            TokenKind::Void => "'void'",
            TokenKind::Bool => "'bool'",
            TokenKind::BlockTy => "'block'",
            TokenKind::EventTy => "'event'",
            TokenKind::Auto => "'auto'",
            TokenKind::SpanTy => "'span'",
            TokenKind::DynTy => "'dyn'",
            TokenKind::Struct => "'struct'",
            TokenKind::Class => "'class'",
            TokenKind::Enum => "'enum'",
            TokenKind::Namespace => "'namespace'",
            TokenKind::Using => "'using'",
            TokenKind::Template => "'template'",
            TokenKind::Typename => "'typename'",
            TokenKind::Public => "'public'",
            TokenKind::Private => "'private'",
            TokenKind::Protected => "'protected'",
            TokenKind::Const => "'const'",
            TokenKind::Static => "'static'",
            TokenKind::If => "'if'",
            TokenKind::Else => "'else'",
            TokenKind::Return => "'return'",
            TokenKind::LoopBlock => "'loop_block'",
            TokenKind::LoopSpan => "'loop_span'",
            TokenKind::True => "'true'",
            TokenKind::False => "'false'",
            TokenKind::Plus => "'+'",
            TokenKind::Minus => "'-'",
            TokenKind::Star => "'*'",
            TokenKind::Slash => "'/'",
            TokenKind::Percent => "'%'",
            TokenKind::Assign => "'='",
            TokenKind::PlusAssign => "'+='",
            TokenKind::MinusAssign => "'-='",
            TokenKind::StarAssign => "'*='",
            TokenKind::SlashAssign => "'/='",
            TokenKind::PercentAssign => "'%='",
            TokenKind::EqEq => "'=='",
            TokenKind::NotEq => "'!='",
            TokenKind::Lt => "'<'",
            TokenKind::LtEq => "'<='",
            TokenKind::Gt => "'>'",
            TokenKind::GtEq => "'>='",
            TokenKind::AndAnd => "'&&'",
            TokenKind::OrOr => "'||'",
            TokenKind::Bang => "'!'",
            TokenKind::Inc => "'++'",
            TokenKind::Dec => "'--'",
            TokenKind::Question => "'?'",
            TokenKind::Colon => "':'",
            TokenKind::ColonColon => "'::'",
            TokenKind::Comma => "','",
            TokenKind::Semicolon => "';'",
            TokenKind::Dot => "'.'",
            TokenKind::LParen => "'('",
            TokenKind::RParen => "')'",
            TokenKind::LBrace => "'{'",
            TokenKind::RBrace => "'}'",
            TokenKind::LBracket => "'['",
            TokenKind::RBracket => "']'",
            TokenKind::Eof => "end of file",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// One token with its source span.
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Token { kind, span }
    }
}

/// The lexer's output: a dense token vector, always EOF-terminated, plus
/// the doc comments captured ahead of declarations (keyed by the index of
/// the token they precede).
#[derive(Debug, Default)]
pub struct TokenList {
    tokens: Vec<Token>,
    doc_comments: FxHashMap<u32, String>,
}

impl TokenList {
    pub fn new(tokens: Vec<Token>, doc_comments: FxHashMap<u32, String>) -> Self {
        debug_assert!(
            matches!(tokens.last(), Some(t) if t.kind == TokenKind::Eof),
            "token list must be EOF-terminated"
        );
        TokenList {
            tokens,
            doc_comments,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    #[inline]
    pub fn get(&self, idx: usize) -> Option<&Token> {
        self.tokens.get(idx)
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Doc comment captured immediately before token `idx`, if any.
    pub fn doc_comment(&self, idx: u32) -> Option<&str> {
        self.doc_comments.get(&idx).map(String::as_str)
    }
}

impl std::ops::Index<usize> for TokenList {
    type Output = Token;

    fn index(&self, idx: usize) -> &Token {
        &self.tokens[idx]
    }
}
