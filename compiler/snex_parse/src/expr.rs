//! Expression grammar, one method per precedence level.
//!
//! Precedence, loosest to tightest: assignment, ternary, `||`, `&&`,
//! equality, relational, additive, multiplicative, unary, postfix.
//! Assignment and ternary are right-associative, the binary levels left.

use smallvec::SmallVec;
use snex_diagnostic::{CompileError, CompileResult};
use snex_ir::{
    AssignOp, BinaryOp, CompareOp, LogicalOp, NamespacedIdentifier, NodeId, NodeKind, Symbol,
    TokenKind, TypeInfo, Types, VariableStorage,
};
use snex_types::TemplateArg;

use crate::parser::Parser;

impl Parser<'_> {
    pub(crate) fn parse_expression(&mut self) -> CompileResult<NodeId> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> CompileResult<NodeId> {
        let start = self.cursor.span();
        let target = self.parse_ternary()?;
        let op = match self.cursor.kind() {
            TokenKind::Assign => AssignOp::Plain,
            TokenKind::PlusAssign => AssignOp::Add,
            TokenKind::MinusAssign => AssignOp::Sub,
            TokenKind::StarAssign => AssignOp::Mul,
            TokenKind::SlashAssign => AssignOp::Div,
            TokenKind::PercentAssign => AssignOp::Mod,
            _ => return Ok(target),
        };
        let op_span = self.cursor.span();
        self.cursor.bump();
        if !self.is_lvalue(target) {
            return Err(CompileError::UnexpectedToken {
                expected: "an assignable expression".to_owned(),
                found: "a value".to_owned(),
                span: op_span,
            });
        }
        let value = self.parse_assignment()?;
        let span = start.merge(self.cursor.previous_span());
        Ok(self.add(
            NodeKind::Assignment {
                op,
                target,
                value,
                is_first: false,
            },
            span,
        ))
    }

    fn is_lvalue(&self, node: NodeId) -> bool {
        matches!(
            self.tree.kind(node),
            NodeKind::VariableReference { .. }
                | NodeKind::Subscript { .. }
                | NodeKind::DotOperator { .. }
        )
    }

    fn parse_ternary(&mut self) -> CompileResult<NodeId> {
        let start = self.cursor.span();
        let cond = self.parse_logical_or()?;
        if !self.cursor.eat(TokenKind::Question) {
            return Ok(cond);
        }
        let if_true = self.parse_expression()?;
        self.cursor.expect(TokenKind::Colon)?;
        let if_false = self.parse_ternary()?;
        let span = start.merge(self.cursor.previous_span());
        Ok(self.add(
            NodeKind::TernaryOp {
                cond,
                if_true,
                if_false,
            },
            span,
        ))
    }

    fn parse_logical_or(&mut self) -> CompileResult<NodeId> {
        let start = self.cursor.span();
        let mut lhs = self.parse_logical_and()?;
        while self.cursor.eat(TokenKind::OrOr) {
            let rhs = self.parse_logical_and()?;
            let span = start.merge(self.cursor.previous_span());
            lhs = self.add(
                NodeKind::Logical {
                    op: LogicalOp::Or,
                    lhs,
                    rhs,
                },
                span,
            );
        }
        Ok(lhs)
    }

    fn parse_logical_and(&mut self) -> CompileResult<NodeId> {
        let start = self.cursor.span();
        let mut lhs = self.parse_equality()?;
        while self.cursor.eat(TokenKind::AndAnd) {
            let rhs = self.parse_equality()?;
            let span = start.merge(self.cursor.previous_span());
            lhs = self.add(
                NodeKind::Logical {
                    op: LogicalOp::And,
                    lhs,
                    rhs,
                },
                span,
            );
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> CompileResult<NodeId> {
        let start = self.cursor.span();
        let mut lhs = self.parse_relational()?;
        loop {
            let op = match self.cursor.kind() {
                TokenKind::EqEq => CompareOp::Eq,
                TokenKind::NotEq => CompareOp::Neq,
                _ => return Ok(lhs),
            };
            self.cursor.bump();
            let rhs = self.parse_relational()?;
            let span = start.merge(self.cursor.previous_span());
            lhs = self.add(NodeKind::Compare { op, lhs, rhs }, span);
        }
    }

    fn parse_relational(&mut self) -> CompileResult<NodeId> {
        let start = self.cursor.span();
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.cursor.kind() {
                TokenKind::Lt => CompareOp::Lt,
                TokenKind::LtEq => CompareOp::Le,
                TokenKind::Gt => CompareOp::Gt,
                TokenKind::GtEq => CompareOp::Ge,
                _ => return Ok(lhs),
            };
            self.cursor.bump();
            let rhs = self.parse_additive()?;
            let span = start.merge(self.cursor.previous_span());
            lhs = self.add(NodeKind::Compare { op, lhs, rhs }, span);
        }
    }

    fn parse_additive(&mut self) -> CompileResult<NodeId> {
        let start = self.cursor.span();
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.cursor.kind() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.cursor.bump();
            let rhs = self.parse_multiplicative()?;
            let span = start.merge(self.cursor.previous_span());
            lhs = self.add(NodeKind::BinaryOp { op, lhs, rhs }, span);
        }
    }

    fn parse_multiplicative(&mut self) -> CompileResult<NodeId> {
        let start = self.cursor.span();
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.cursor.kind() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => return Ok(lhs),
            };
            self.cursor.bump();
            let rhs = self.parse_unary()?;
            let span = start.merge(self.cursor.previous_span());
            lhs = self.add(NodeKind::BinaryOp { op, lhs, rhs }, span);
        }
    }

    fn parse_unary(&mut self) -> CompileResult<NodeId> {
        let start = self.cursor.span();
        match self.cursor.kind() {
            TokenKind::Minus => {
                self.cursor.bump();
                let expr = self.parse_unary()?;
                let span = start.merge(self.cursor.previous_span());
                Ok(self.add(NodeKind::Negation { expr }, span))
            }
            TokenKind::Bang => {
                self.cursor.bump();
                let expr = self.parse_unary()?;
                let span = start.merge(self.cursor.previous_span());
                Ok(self.add(NodeKind::LogicalNot { expr }, span))
            }
            TokenKind::Inc | TokenKind::Dec => {
                let decrement = self.cursor.kind() == TokenKind::Dec;
                self.cursor.bump();
                let target = self.parse_unary()?;
                let span = start.merge(self.cursor.previous_span());
                Ok(self.add(
                    NodeKind::Increment {
                        target,
                        pre: true,
                        decrement,
                    },
                    span,
                ))
            }
            // C-style cast: `(int) expr` with a primitive type.
            TokenKind::LParen if self.at_cast() => {
                self.cursor.bump();
                let target = match self.cursor.bump().kind {
                    TokenKind::Int => Types::Integer,
                    TokenKind::Float => Types::Float,
                    _ => Types::Double,
                };
                self.cursor.expect(TokenKind::RParen)?;
                let expr = self.parse_unary()?;
                let span = start.merge(self.cursor.previous_span());
                Ok(self.add(NodeKind::Cast { target, expr }, span))
            }
            _ => self.parse_postfix(),
        }
    }

    fn at_cast(&self) -> bool {
        matches!(
            self.cursor.peek(1),
            TokenKind::Int | TokenKind::Float | TokenKind::Double
        ) && self.cursor.peek(2) == TokenKind::RParen
    }

    fn parse_postfix(&mut self) -> CompileResult<NodeId> {
        let start = self.cursor.span();
        let mut node = self.parse_primary()?;
        loop {
            match self.cursor.kind() {
                TokenKind::Inc | TokenKind::Dec => {
                    let decrement = self.cursor.kind() == TokenKind::Dec;
                    self.cursor.bump();
                    let span = start.merge(self.cursor.previous_span());
                    node = self.add(
                        NodeKind::Increment {
                            target: node,
                            pre: false,
                            decrement,
                        },
                        span,
                    );
                }
                TokenKind::LBracket => {
                    self.cursor.bump();
                    let index = self.parse_expression()?;
                    self.cursor.expect(TokenKind::RBracket)?;
                    let span = start.merge(self.cursor.previous_span());
                    node = self.add(
                        NodeKind::Subscript {
                            parent: node,
                            index,
                        },
                        span,
                    );
                }
                TokenKind::Dot => {
                    self.cursor.bump();
                    let (member, _) = self.cursor.expect_ident()?;
                    if self.cursor.is(TokenKind::LParen) {
                        let args = self.parse_call_args()?;
                        let span = start.merge(self.cursor.previous_span());
                        node = self.add(
                            NodeKind::FunctionCall {
                                name: NamespacedIdentifier::new(member),
                                object: Some(node),
                                args,
                            },
                            span,
                        );
                    } else {
                        let span = start.merge(self.cursor.previous_span());
                        node = self.add(
                            NodeKind::DotOperator {
                                parent: node,
                                member,
                                resolved_offset: None,
                            },
                            span,
                        );
                    }
                }
                _ => return Ok(node),
            }
        }
    }

    fn parse_primary(&mut self) -> CompileResult<NodeId> {
        let span = self.cursor.span();
        match self.cursor.kind() {
            TokenKind::IntLit(v) => {
                self.cursor.bump();
                Ok(self.add(NodeKind::Immediate(VariableStorage::Int(v)), span))
            }
            TokenKind::FloatLit(v) => {
                self.cursor.bump();
                Ok(self.add(NodeKind::Immediate(VariableStorage::Float(v)), span))
            }
            TokenKind::DoubleLit(v) => {
                self.cursor.bump();
                Ok(self.add(NodeKind::Immediate(VariableStorage::Double(v)), span))
            }
            TokenKind::True => {
                self.cursor.bump();
                Ok(self.add(NodeKind::Immediate(VariableStorage::Int(1)), span))
            }
            TokenKind::False => {
                self.cursor.bump();
                Ok(self.add(NodeKind::Immediate(VariableStorage::Int(0)), span))
            }
            TokenKind::LParen => {
                self.cursor.bump();
                let inner = self.parse_expression()?;
                self.cursor.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::Ident(first) => {
                // A bound template constant reads as an immediate.
                if let Some(&TemplateArg::Constant(v)) = self.bindings.get(&first) {
                    self.cursor.bump();
                    return Ok(self.add(NodeKind::Immediate(VariableStorage::Int(v)), span));
                }
                self.cursor.bump();
                let mut id = NamespacedIdentifier::new(first);
                while self.cursor.eat(TokenKind::ColonColon) {
                    let (seg, _) = self.cursor.expect_ident()?;
                    id = id.child(seg);
                }
                if self.templates.is_template(&id) && self.cursor.is(TokenKind::Lt) {
                    id = self.instantiate_function_template(&id, span)?;
                }
                if self.cursor.is(TokenKind::LParen) {
                    let args = self.parse_call_args()?;
                    let full = span.merge(self.cursor.previous_span());
                    return Ok(self.add(
                        NodeKind::FunctionCall {
                            name: id,
                            object: None,
                            args,
                        },
                        full,
                    ));
                }
                let full = span.merge(self.cursor.previous_span());
                Ok(self.add(
                    NodeKind::VariableReference {
                        symbol: Symbol::new(id, TypeInfo::DYNAMIC),
                    },
                    full,
                ))
            }
            _ => Err(self.expected_expression()),
        }
    }

    fn parse_call_args(&mut self) -> CompileResult<SmallVec<[NodeId; 4]>> {
        self.cursor.expect(TokenKind::LParen)?;
        let mut args = SmallVec::new();
        if !self.cursor.is(TokenKind::RParen) {
            loop {
                args.push(self.parse_expression()?);
                if !self.cursor.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.cursor.expect(TokenKind::RParen)?;
        Ok(args)
    }
}
