//! Shared vocabulary types for the SNEX compiler.
//!
//! Everything the compiler crates exchange lives here: source spans,
//! tokens, the runtime value model, symbols, and the arena syntax tree.
//! This crate has no dependency on any other `snex_*` crate.

mod interner;
mod span;
mod symbol;
mod token;
mod tree;
mod types;
mod value;

pub use interner::{Name, StringInterner};
pub use span::Span;
pub use symbol::{DisplayId, NamespacedIdentifier, Symbol, SymbolFlags};
pub use token::{Token, TokenKind, TokenList};
pub use tree::{
    AssignOp, BinaryOp, CompareOp, FunctionInfo, LogicalOp, LoopKind, Node, NodeId, NodeKind,
    ScopeId, SyntaxTree, TokenRange, TreeWalk,
};
pub use types::{ComplexTypeId, TypeInfo, Types};
pub use value::{Block, Event, EventType, VariableStorage, FLOAT_COMPARE_EPSILON};
