use std::fmt;

/// Error codes for all compiler diagnostics.
///
/// Format: E#### where the first digit indicates the phase:
/// - E0xxx: Lexer errors
/// - E1xxx: Parser errors
/// - E2xxx: Resolution errors
/// - E3xxx: Type errors
/// - E9xxx: Internal compiler errors
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum ErrorCode {
    // Lexer Errors (E0xxx)
    /// Invalid character in source
    E0001,
    /// Malformed number literal
    E0002,
    /// Unterminated string literal
    E0003,
    /// Unterminated block comment
    E0004,

    // Parser Errors (E1xxx)
    /// Unexpected token
    E1001,
    /// Expected expression
    E1002,
    /// Expected identifier
    E1003,
    /// Expected type
    E1004,
    /// Control path without return in a non-void function
    E1005,
    /// Illegal statement at this position
    E1006,

    // Resolution Errors (E2xxx)
    /// Use of an undeclared symbol
    E2001,
    /// Illegal redeclaration
    E2002,
    /// Symbol not accessible from this scope (visibility)
    E2003,
    /// No matching function overload
    E2004,
    /// Ambiguous function overload
    E2005,
    /// Template instantiation failure
    E2006,

    // Type Errors (E3xxx)
    /// Operand type mismatch with no legal implicit cast
    E3001,
    /// Assignment to a const target
    E3002,
    /// Wrong argument count or type for a call
    E3003,
    /// Wrong return type
    E3004,
    /// Non-integer loop index or subscript
    E3005,
    /// Division by a constant zero
    E3006,
    /// Unresolved `auto` type
    E3007,

    // Warnings (W0xxx)
    /// Local declaration shadows an outer symbol
    W0001,

    // Internal Errors (E9xxx)
    /// Invariant violation reaching code generation
    E9001,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorCode::E0001 => "E0001",
            ErrorCode::E0002 => "E0002",
            ErrorCode::E0003 => "E0003",
            ErrorCode::E0004 => "E0004",
            ErrorCode::E1001 => "E1001",
            ErrorCode::E1002 => "E1002",
            ErrorCode::E1003 => "E1003",
            ErrorCode::E1004 => "E1004",
            ErrorCode::E1005 => "E1005",
            ErrorCode::E1006 => "E1006",
            ErrorCode::E2001 => "E2001",
            ErrorCode::E2002 => "E2002",
            ErrorCode::E2003 => "E2003",
            ErrorCode::E2004 => "E2004",
            ErrorCode::E2005 => "E2005",
            ErrorCode::E2006 => "E2006",
            ErrorCode::E3001 => "E3001",
            ErrorCode::E3002 => "E3002",
            ErrorCode::E3003 => "E3003",
            ErrorCode::E3004 => "E3004",
            ErrorCode::E3005 => "E3005",
            ErrorCode::E3006 => "E3006",
            ErrorCode::E3007 => "E3007",
            ErrorCode::W0001 => "W0001",
            ErrorCode::E9001 => "E9001",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_variant() {
        assert_eq!(ErrorCode::E3006.to_string(), "E3006");
        assert_eq!(ErrorCode::W0001.to_string(), "W0001");
    }
}
