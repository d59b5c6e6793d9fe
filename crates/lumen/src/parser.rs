//! Recursive-descent parser.
//!
//! Expression-oriented: blocks are expressions, and a block whose final
//! statement omits its `;` carries that statement as its result. Statement
//! assignment (`lhs = rhs ;`) is encoded by attaching the right-hand side to
//! the target node. Three entry points: file parsing (through
//! `Context::parse_file`), [`parse_source`], and [`parse_source_expression`]
//! (used by the `@embed` intrinsic to splice compile-time bytes back into the
//! grammar).

use std::str::FromStr;

use crate::{
    arena::Arena,
    ast::{
        BinaryOp, FunctionParam, GenericParam, InternalKind, Node, NodeId, NodeKind, NumberValue, OperatorOverload,
        ReturnKind, SourceLoc, StructureMember, StructureValue, SwitchCase,
    },
    error::{CompileError, CompileResult, ErrorKind},
    intern::{Interns, NameId, UNDERSCORE},
    lexer::{Lexer, Token, TokenKind},
};

/// Maximum expression nesting depth before the parser gives up.
///
/// Prevents stack overflow from pathological inputs like `((((…))))`.
const MAX_NESTING_DEPTH: u16 = 200;

/// Parses a whole source buffer into a module node wrapping the file block.
pub(crate) fn parse_source(
    nodes: &mut Arena<Node>,
    interns: &mut Interns,
    path: &str,
    path_ref: u32,
    source: &str,
) -> CompileResult<NodeId> {
    let mut parser = Parser::new(nodes, interns, path, path_ref, source);
    parser.parse_module_root()
}

/// Parses a single expression (the `@embed` splice entry point).
pub(crate) fn parse_source_expression(
    nodes: &mut Arena<Node>,
    interns: &mut Interns,
    path: &str,
    path_ref: u32,
    source: &str,
) -> CompileResult<NodeId> {
    let mut parser = Parser::new(nodes, interns, path, path_ref, source);
    let expression = parser.parse_expression()?;
    parser.expect(TokenKind::Eof)?;
    Ok(expression)
}

struct Parser<'a, 'src> {
    lexer: Lexer<'src>,
    nodes: &'a mut Arena<Node>,
    interns: &'a mut Interns,
    path_ref: u32,
    depth: u16,
    /// Inside a `<…>` generic list, a bare `>` closes the list instead of
    /// acting as a comparison.
    in_generics: bool,
}

impl<'a, 'src> Parser<'a, 'src> {
    fn new(nodes: &'a mut Arena<Node>, interns: &'a mut Interns, path: &'src str, path_ref: u32, source: &'src str) -> Self {
        Self {
            lexer: Lexer::new(path, path_ref, source),
            nodes,
            interns,
            path_ref,
            depth: 0,
            in_generics: false,
        }
    }

    fn node(&mut self, loc: SourceLoc, kind: NodeKind) -> NodeId {
        self.nodes.alloc(Node { loc, kind })
    }

    fn unexpected(&self, token: Token<'_>, expected: TokenKind) -> CompileError {
        CompileError::new(
            self.lexer.path(),
            token.loc,
            ErrorKind::Parse,
            format!("Unexpected token '{}', expected '{expected}'", token.kind),
        )
    }

    fn unexpected_no_expected(&self, token: Token<'_>) -> CompileError {
        CompileError::new(
            self.lexer.path(),
            token.loc,
            ErrorKind::Parse,
            format!("Unexpected token '{}'", token.kind),
        )
    }

    fn expect(&mut self, kind: TokenKind) -> CompileResult<Token<'src>> {
        let token = self.lexer.next()?;
        if token.kind != kind {
            return Err(self.unexpected(token, kind));
        }
        Ok(token)
    }

    fn eat(&mut self, kind: TokenKind) -> CompileResult<bool> {
        if self.lexer.peek()?.kind == kind {
            self.lexer.next()?;
            return Ok(true);
        }
        Ok(false)
    }

    fn expect_name(&mut self) -> CompileResult<(NameId, SourceLoc)> {
        let token = self.expect(TokenKind::Identifier)?;
        Ok((self.interns.intern(token.text()), token.loc))
    }

    /// File root: `;`-terminated statements wrapped as `mod { … }`.
    fn parse_module_root(&mut self) -> CompileResult<NodeId> {
        let loc = SourceLoc {
            path_ref: self.path_ref,
            row: 1,
            column: 1,
        };
        let mut statements = Vec::new();
        while self.lexer.peek()?.kind != TokenKind::Eof {
            statements.push(self.parse_statement()?);
            self.expect(TokenKind::Semicolon)?;
        }
        let block = self.node(
            loc,
            NodeKind::Block {
                statements,
                has_result: false,
            },
        );
        Ok(self.node(loc, NodeKind::Module { body: block }))
    }

    /// One statement expression, with `lhs = rhs` folded onto the target.
    fn parse_statement(&mut self) -> CompileResult<NodeId> {
        let expression = self.parse_expression()?;
        if !self.eat(TokenKind::Equals)? {
            return Ok(expression);
        }
        let value = self.parse_expression()?;
        let loc = self.nodes.get(expression).loc;
        match &mut self.nodes.get_mut(expression).kind {
            NodeKind::Identifier { assign_value, .. }
            | NodeKind::StructureAccess { assign_value, .. }
            | NodeKind::ArrayAccess { assign_value, .. }
            | NodeKind::Dereference { assign_value, .. }
            | NodeKind::Deoptional { assign_value, .. } => *assign_value = Some(value),
            _ => {
                return Err(CompileError::new(
                    self.lexer.path(),
                    loc,
                    ErrorKind::Parse,
                    "Invalid assignment target".to_owned(),
                ));
            }
        }
        Ok(expression)
    }

    fn parse_expression(&mut self) -> CompileResult<NodeId> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            let token = self.lexer.peek()?;
            return Err(CompileError::new(
                self.lexer.path(),
                token.loc,
                ErrorKind::Parse,
                "Expression nesting too deep".to_owned(),
            ));
        }
        let result = self.parse_range();
        self.depth -= 1;
        result
    }

    /// True when the next token cannot begin an expression, so an optional
    /// operand (range end, `break` value, `return` value) is absent.
    fn at_expression_end(&mut self) -> CompileResult<bool> {
        Ok(matches!(
            self.lexer.peek()?.kind,
            TokenKind::Semicolon
                | TokenKind::Comma
                | TokenKind::ParenClose
                | TokenKind::BracketClose
                | TokenKind::CurlyClose
                | TokenKind::Eof
        ))
    }

    fn parse_expression_or_nothing(&mut self) -> CompileResult<Option<NodeId>> {
        if self.at_expression_end()? {
            return Ok(None);
        }
        Ok(Some(self.parse_expression()?))
    }

    fn parse_range(&mut self) -> CompileResult<NodeId> {
        let start = self.parse_or()?;
        if self.lexer.peek()?.kind != TokenKind::PeriodPeriod {
            return Ok(start);
        }
        let token = self.lexer.next()?;
        let end = if self.at_expression_end()? {
            None
        } else {
            Some(self.parse_or()?)
        };
        Ok(self.node(token.loc, NodeKind::Range { start, end }))
    }

    fn parse_or(&mut self) -> CompileResult<NodeId> {
        let mut left = self.parse_and()?;
        while self.lexer.peek()?.kind == TokenKind::KwOr {
            let token = self.lexer.next()?;
            let right = self.parse_and()?;
            left = self.node(
                token.loc,
                NodeKind::BinaryOp {
                    left,
                    right,
                    op: BinaryOp::Or,
                },
            );
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> CompileResult<NodeId> {
        let mut left = self.parse_comparison()?;
        while self.lexer.peek()?.kind == TokenKind::KwAnd {
            let token = self.lexer.next()?;
            let right = self.parse_comparison()?;
            left = self.node(
                token.loc,
                NodeKind::BinaryOp {
                    left,
                    right,
                    op: BinaryOp::And,
                },
            );
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> CompileResult<NodeId> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.lexer.peek()?.kind {
                TokenKind::EqualsEquals => BinaryOp::Equals,
                TokenKind::ExclamationEquals => BinaryOp::NotEquals,
                TokenKind::Less => BinaryOp::Less,
                TokenKind::LessEquals => BinaryOp::LessEquals,
                TokenKind::Greater if !self.in_generics => BinaryOp::Greater,
                TokenKind::GreaterEquals if !self.in_generics => BinaryOp::GreaterEquals,
                _ => return Ok(left),
            };
            let token = self.lexer.next()?;
            let right = self.parse_additive()?;
            left = self.node(token.loc, NodeKind::BinaryOp { left, right, op });
        }
    }

    fn parse_additive(&mut self) -> CompileResult<NodeId> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.lexer.peek()?.kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Subtract,
                _ => return Ok(left),
            };
            let token = self.lexer.next()?;
            let right = self.parse_multiplicative()?;
            left = self.node(token.loc, NodeKind::BinaryOp { left, right, op });
        }
    }

    fn parse_multiplicative(&mut self) -> CompileResult<NodeId> {
        let mut left = self.parse_prefix()?;
        loop {
            let op = match self.lexer.peek()?.kind {
                TokenKind::Asterisk => BinaryOp::Multiply,
                TokenKind::Slash => BinaryOp::Divide,
                TokenKind::Percent => BinaryOp::Modulus,
                _ => return Ok(left),
            };
            let token = self.lexer.next()?;
            let right = self.parse_prefix()?;
            left = self.node(token.loc, NodeKind::BinaryOp { left, right, op });
        }
    }

    fn parse_prefix(&mut self) -> CompileResult<NodeId> {
        let token = self.lexer.peek()?;
        match token.kind {
            TokenKind::Caret => {
                self.lexer.next()?;
                let inner = self.parse_prefix()?;
                Ok(self.node(token.loc, NodeKind::PointerType { inner }))
            }
            TokenKind::Question => {
                self.lexer.next()?;
                let inner = self.parse_prefix()?;
                Ok(self.node(token.loc, NodeKind::OptionalType { inner }))
            }
            TokenKind::Exclamation => {
                self.lexer.next()?;
                let error = self.parse_prefix()?;
                Ok(self.node(token.loc, NodeKind::ResultType { value: None, error }))
            }
            TokenKind::Ampersand => {
                self.lexer.next()?;
                let value = self.parse_prefix()?;
                Ok(self.node(token.loc, NodeKind::Reference { value }))
            }
            TokenKind::BracketOpen => {
                self.lexer.next()?;
                if self.eat(TokenKind::BracketClose)? {
                    let inner = self.parse_prefix()?;
                    return Ok(self.node(token.loc, NodeKind::ArrayViewType { inner }));
                }
                let size_expr = self.parse_expression()?;
                self.expect(TokenKind::BracketClose)?;
                // `[_]T` leaves the size to be inferred from the literal.
                let size = match &self.nodes.get(size_expr).kind {
                    NodeKind::Identifier {
                        module: None,
                        name,
                        assign_value: None,
                    } if *name == UNDERSCORE => None,
                    _ => Some(size_expr),
                };
                let inner = self.parse_prefix()?;
                Ok(self.node(token.loc, NodeKind::ArrayType { inner, size }))
            }
            _ => self.parse_result_type(),
        }
    }

    /// Infix `T!E` forms a result type between postfix expressions.
    fn parse_result_type(&mut self) -> CompileResult<NodeId> {
        let value = self.parse_postfix()?;
        if self.lexer.peek()?.kind != TokenKind::Exclamation {
            return Ok(value);
        }
        let token = self.lexer.next()?;
        let error = self.parse_postfix()?;
        Ok(self.node(
            token.loc,
            NodeKind::ResultType {
                value: Some(value),
                error,
            },
        ))
    }

    fn parse_postfix(&mut self) -> CompileResult<NodeId> {
        let mut result = self.parse_primary()?;
        loop {
            match self.lexer.peek()?.kind {
                TokenKind::ParenOpen
                | TokenKind::Period
                | TokenKind::PeriodCurlyOpen
                | TokenKind::BracketOpen
                | TokenKind::ColonColon
                | TokenKind::KwIs
                | TokenKind::KwCatch => result = self.parse_postfix_suffix(result)?,
                _ => return Ok(result),
            }
        }
    }

    fn parse_call_arguments(&mut self) -> CompileResult<Vec<NodeId>> {
        let mut arguments = Vec::new();
        while self.lexer.peek()?.kind != TokenKind::ParenClose {
            arguments.push(self.parse_expression()?);
            let token = self.lexer.peek()?;
            match token.kind {
                TokenKind::Comma => {
                    self.lexer.next()?;
                }
                TokenKind::ParenClose => {}
                _ => return Err(self.unexpected_no_expected(token)),
            }
        }
        self.expect(TokenKind::ParenClose)?;
        Ok(arguments)
    }

    fn parse_structure_values(&mut self) -> CompileResult<Vec<StructureValue>> {
        let mut values = Vec::new();
        while self.lexer.peek()?.kind != TokenKind::CurlyClose {
            // `name = expr` names a union or tagged-union item; positional
            // entries cover structs, tuples, and arrays. Distinguishing the
            // two needs two tokens, so snapshot the lexer and back off when
            // the `=` does not follow.
            let token = self.lexer.peek()?;
            let mut name = None;
            if token.kind == TokenKind::Identifier {
                let snapshot = self.lexer.clone();
                let ident = self.lexer.next()?;
                if self.lexer.peek()?.kind == TokenKind::Equals {
                    self.lexer.next()?;
                    name = Some(self.interns.intern(ident.text()));
                } else {
                    self.lexer = snapshot;
                }
            }
            let value = self.parse_expression()?;
            values.push(StructureValue { name, value });
            let token = self.lexer.peek()?;
            match token.kind {
                TokenKind::Comma => {
                    self.lexer.next()?;
                }
                TokenKind::CurlyClose => {}
                _ => return Err(self.unexpected_no_expected(token)),
            }
        }
        self.expect(TokenKind::CurlyClose)?;
        Ok(values)
    }

    /// One postfix suffix applied to `result`; the caller loops.
    fn parse_postfix_suffix(&mut self, result: NodeId) -> CompileResult<NodeId> {
        let token = self.lexer.peek()?;
        match token.kind {
            TokenKind::ParenOpen => {
                self.lexer.next()?;
                let arguments = self.parse_call_arguments()?;
                Ok(self.node(
                    token.loc,
                    NodeKind::Call {
                        function: result,
                        arguments,
                    },
                ))
            }
            TokenKind::Period => {
                self.lexer.next()?;
                let after = self.lexer.peek()?;
                match after.kind {
                    TokenKind::Question => {
                        self.lexer.next()?;
                        Ok(self.node(
                            token.loc,
                            NodeKind::Deoptional {
                                value: result,
                                assign_value: None,
                            },
                        ))
                    }
                    TokenKind::Asterisk => {
                        self.lexer.next()?;
                        Ok(self.node(
                            token.loc,
                            NodeKind::Dereference {
                                value: result,
                                assign_value: None,
                            },
                        ))
                    }
                    TokenKind::Identifier => {
                        let (name, _) = self.expect_name()?;
                        if self.lexer.peek()?.kind == TokenKind::ParenOpen {
                            self.lexer.next()?;
                            let arguments = self.parse_call_arguments()?;
                            Ok(self.node(
                                token.loc,
                                NodeKind::CallMethod {
                                    receiver: result,
                                    method: name,
                                    arguments,
                                },
                            ))
                        } else {
                            Ok(self.node(
                                token.loc,
                                NodeKind::StructureAccess {
                                    parent: result,
                                    name,
                                    assign_value: None,
                                },
                            ))
                        }
                    }
                    _ => Err(self.unexpected_no_expected(after)),
                }
            }
            TokenKind::PeriodCurlyOpen => {
                self.lexer.next()?;
                let values = self.parse_structure_values()?;
                Ok(self.node(
                    token.loc,
                    NodeKind::Structure {
                        ty: Some(result),
                        values,
                    },
                ))
            }
            TokenKind::BracketOpen => {
                self.lexer.next()?;
                let index = self.parse_expression()?;
                self.expect(TokenKind::BracketClose)?;
                Ok(match self.nodes.get(index).kind {
                    NodeKind::Range { start, end } => self.node(
                        token.loc,
                        NodeKind::Slice {
                            parent: result,
                            start,
                            end,
                        },
                    ),
                    _ => self.node(
                        token.loc,
                        NodeKind::ArrayAccess {
                            parent: result,
                            index,
                            assign_value: None,
                        },
                    ),
                })
            }
            TokenKind::ColonColon => {
                self.lexer.next()?;
                let (name, _) = self.expect_name()?;
                Ok(self.node(
                    token.loc,
                    NodeKind::Identifier {
                        module: Some(result),
                        name,
                        assign_value: None,
                    },
                ))
            }
            TokenKind::KwIs => {
                self.lexer.next()?;
                let check = self.parse_postfix()?;
                Ok(self.node(token.loc, NodeKind::Is { value: result, check }))
            }
            TokenKind::KwCatch => {
                self.lexer.next()?;
                let binding = if self.eat(TokenKind::ParenOpen)? {
                    let (name, _) = self.expect_name()?;
                    self.expect(TokenKind::ParenClose)?;
                    Some(name)
                } else {
                    None
                };
                let error = self.parse_expression()?;
                Ok(self.node(
                    token.loc,
                    NodeKind::Catch {
                        value: result,
                        binding,
                        error,
                    },
                ))
            }
            _ => Err(self.unexpected_no_expected(token)),
        }
    }

    fn parse_primary(&mut self) -> CompileResult<NodeId> {
        let token = self.lexer.peek()?;
        match token.kind {
            TokenKind::Integer => {
                let token = self.lexer.next()?;
                let crate::lexer::TokenPayload::Integer(value) = token.payload else {
                    unreachable!("integer token without payload")
                };
                Ok(self.node(
                    token.loc,
                    NodeKind::Number {
                        value: NumberValue::Integer(value),
                    },
                ))
            }
            TokenKind::Decimal => {
                let token = self.lexer.next()?;
                let crate::lexer::TokenPayload::Decimal(value) = token.payload else {
                    unreachable!("decimal token without payload")
                };
                Ok(self.node(
                    token.loc,
                    NodeKind::Number {
                        value: NumberValue::Decimal(value),
                    },
                ))
            }
            TokenKind::String => {
                let token = self.lexer.next()?;
                let text = self.interns.intern(token.text());
                Ok(self.node(token.loc, NodeKind::String { text }))
            }
            TokenKind::Character => {
                let token = self.lexer.next()?;
                let text = self.interns.intern(token.text());
                Ok(self.node(token.loc, NodeKind::Character { text }))
            }
            TokenKind::KwTrue | TokenKind::KwFalse => {
                let token = self.lexer.next()?;
                Ok(self.node(
                    token.loc,
                    NodeKind::Boolean {
                        value: token.kind == TokenKind::KwTrue,
                    },
                ))
            }
            TokenKind::KwNull => {
                let token = self.lexer.next()?;
                Ok(self.node(token.loc, NodeKind::Null))
            }
            TokenKind::Identifier => {
                let token = self.lexer.next()?;
                let name = self.interns.intern(token.text());
                Ok(self.node(
                    token.loc,
                    NodeKind::Identifier {
                        module: None,
                        name,
                        assign_value: None,
                    },
                ))
            }
            TokenKind::ParenOpen => {
                self.lexer.next()?;
                // Parentheses restore the full operator set inside a generic
                // list, so `(a > b)` works as a constraint.
                let saved_in_generics = self.in_generics;
                self.in_generics = false;
                let inner = self.parse_expression();
                self.in_generics = saved_in_generics;
                let inner = inner?;
                self.expect(TokenKind::ParenClose)?;
                Ok(inner)
            }
            TokenKind::CurlyOpen => self.parse_block(),
            TokenKind::PeriodCurlyOpen => {
                let token = self.lexer.next()?;
                let values = self.parse_structure_values()?;
                Ok(self.node(token.loc, NodeKind::Structure { ty: None, values }))
            }
            TokenKind::At => self.parse_internal(),
            TokenKind::KwFn => self.parse_function_or_function_type(),
            TokenKind::KwDef => self.parse_define(),
            TokenKind::KwVar => self.parse_variable(),
            TokenKind::KwGlobal => self.parse_global(),
            TokenKind::KwIf => self.parse_if(),
            TokenKind::KwWhile => self.parse_while(),
            TokenKind::KwFor => self.parse_for(),
            TokenKind::KwSwitch => self.parse_switch(),
            TokenKind::KwStruct => self.parse_struct_type(),
            TokenKind::KwUnion => {
                let token = self.lexer.next()?;
                let members = self.parse_member_list()?;
                Ok(self.node(token.loc, NodeKind::UnionType { members }))
            }
            TokenKind::KwTaggedUnion => {
                let token = self.lexer.next()?;
                let members = self.parse_member_list()?;
                Ok(self.node(token.loc, NodeKind::TaggedUnionType { members }))
            }
            TokenKind::KwEnum => self.parse_enum_type(),
            TokenKind::KwMod => {
                let token = self.lexer.next()?;
                let body = self.parse_expression()?;
                Ok(self.node(token.loc, NodeKind::Module { body }))
            }
            TokenKind::KwBreak => {
                let token = self.lexer.next()?;
                let value = self.parse_expression_or_nothing()?;
                Ok(self.node(token.loc, NodeKind::Break { value }))
            }
            TokenKind::KwReturn => self.parse_return(),
            TokenKind::KwDefer => {
                let token = self.lexer.next()?;
                let body = self.parse_expression()?;
                Ok(self.node(token.loc, NodeKind::Defer { body }))
            }
            TokenKind::KwRun => {
                let token = self.lexer.next()?;
                let value = self.parse_expression()?;
                Ok(self.node(token.loc, NodeKind::Run { value }))
            }
            TokenKind::KwCast => self.parse_cast(),
            _ => Err(self.unexpected_no_expected(token)),
        }
    }

    fn parse_block(&mut self) -> CompileResult<NodeId> {
        let open = self.expect(TokenKind::CurlyOpen)?;
        let mut statements = Vec::new();
        let mut has_result = false;
        while self.lexer.peek()?.kind != TokenKind::CurlyClose {
            statements.push(self.parse_statement()?);
            if self.eat(TokenKind::Semicolon)? {
                continue;
            }
            // The final statement may omit its `;`, making it the result.
            let token = self.lexer.peek()?;
            if token.kind == TokenKind::CurlyClose {
                has_result = true;
                break;
            }
            return Err(self.unexpected(token, TokenKind::Semicolon));
        }
        self.expect(TokenKind::CurlyClose)?;
        Ok(self.node(open.loc, NodeKind::Block { statements, has_result }))
    }

    fn parse_internal(&mut self) -> CompileResult<NodeId> {
        let token = self.expect(TokenKind::At)?;
        let name = self.expect(TokenKind::Identifier)?;
        let Ok(kind) = InternalKind::from_str(name.text()) else {
            return Err(CompileError::new(
                self.lexer.path(),
                name.loc,
                ErrorKind::Parse,
                format!("Unknown intrinsic '{}'", name.text()),
            ));
        };
        let inputs = if self.eat(TokenKind::ParenOpen)? {
            self.parse_call_arguments()?
        } else {
            Vec::new()
        };
        Ok(self.node(token.loc, NodeKind::Internal { kind, inputs }))
    }

    fn parse_function_or_function_type(&mut self) -> CompileResult<NodeId> {
        let token = self.expect(TokenKind::KwFn)?;
        let extern_name = if self.eat(TokenKind::KwExtern)? {
            let name = self.expect(TokenKind::String)?;
            Some(self.interns.intern(name.text()))
        } else {
            None
        };

        // Inferred parameters lead the declared list and are never passed.
        let mut parameters = Vec::new();
        if self.eat(TokenKind::Less)? {
            let saved_in_generics = self.in_generics;
            self.in_generics = true;
            while self.lexer.peek()?.kind != TokenKind::Greater {
                let (name, _) = self.expect_name()?;
                self.expect(TokenKind::Colon)?;
                let ty = self.parse_expression()?;
                let default_value = if self.eat(TokenKind::Equals)? {
                    Some(self.parse_expression()?)
                } else {
                    None
                };
                parameters.push(FunctionParam {
                    name,
                    ty: Some(ty),
                    is_static: true,
                    inferred: true,
                    default_value,
                });
                let next = self.lexer.peek()?;
                match next.kind {
                    TokenKind::Comma => {
                        self.lexer.next()?;
                    }
                    TokenKind::Greater => {}
                    _ => return Err(self.unexpected_no_expected(next)),
                }
            }
            self.in_generics = saved_in_generics;
            self.expect(TokenKind::Greater)?;
        }

        self.expect(TokenKind::ParenOpen)?;
        let mut variadic = false;
        while self.lexer.peek()?.kind != TokenKind::ParenClose {
            if self.eat(TokenKind::PeriodPeriod)? {
                variadic = true;
            } else {
                let is_static = self.eat(TokenKind::KwStatic)?;
                let (name, _) = self.expect_name()?;
                self.expect(TokenKind::Colon)?;
                let ty = self.parse_expression()?;
                parameters.push(FunctionParam {
                    name,
                    ty: Some(ty),
                    is_static,
                    inferred: false,
                    default_value: None,
                });
            }
            let next = self.lexer.peek()?;
            match next.kind {
                TokenKind::Comma => {
                    self.lexer.next()?;
                }
                TokenKind::ParenClose => {}
                _ => return Err(self.unexpected_no_expected(next)),
            }
        }
        self.expect(TokenKind::ParenClose)?;

        let return_type = if self.eat(TokenKind::Colon)? {
            Some(self.parse_expression()?)
        } else {
            None
        };

        let function_type = self.node(
            token.loc,
            NodeKind::FunctionType {
                parameters,
                return_type,
                variadic,
            },
        );

        if self.eat(TokenKind::MinusGreater)? {
            let body = self.parse_expression_or_nothing()?;
            Ok(self.node(
                token.loc,
                NodeKind::Function {
                    function_type,
                    body,
                    extern_name,
                },
            ))
        } else if extern_name.is_some() {
            Ok(self.node(
                token.loc,
                NodeKind::Function {
                    function_type,
                    body: None,
                    extern_name,
                },
            ))
        } else {
            Ok(function_type)
        }
    }

    fn parse_define(&mut self) -> CompileResult<NodeId> {
        let token = self.expect(TokenKind::KwDef)?;
        let (name, _) = self.expect_name()?;

        let mut generics = Vec::new();
        let mut constraint = None;
        if self.eat(TokenKind::Less)? {
            let saved_in_generics = self.in_generics;
            self.in_generics = true;
            while self.lexer.peek()?.kind != TokenKind::Greater {
                let (generic_name, _) = self.expect_name()?;
                self.expect(TokenKind::Colon)?;
                let ty = self.parse_expression()?;
                generics.push(GenericParam { name: generic_name, ty });
                let next = self.lexer.peek()?;
                match next.kind {
                    TokenKind::Comma => {
                        self.lexer.next()?;
                    }
                    TokenKind::Greater => {}
                    // A `;` introduces the where-constraint expression.
                    TokenKind::Semicolon => {
                        self.lexer.next()?;
                        constraint = Some(self.parse_expression()?);
                    }
                    _ => return Err(self.unexpected_no_expected(next)),
                }
            }
            self.in_generics = saved_in_generics;
            self.expect(TokenKind::Greater)?;
        }

        let ty = if self.eat(TokenKind::Colon)? {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.expect(TokenKind::Equals)?;
        let expression = self.parse_expression()?;
        Ok(self.node(
            token.loc,
            NodeKind::Define {
                name,
                ty,
                expression,
                generics,
                constraint,
            },
        ))
    }

    fn parse_variable(&mut self) -> CompileResult<NodeId> {
        let token = self.expect(TokenKind::KwVar)?;
        let is_static = self.eat(TokenKind::KwStatic)?;
        let (name, _) = self.expect_name()?;
        let ty = if self.eat(TokenKind::Colon)? {
            Some(self.parse_expression()?)
        } else {
            None
        };
        let value = if self.eat(TokenKind::Equals)? {
            Some(self.parse_expression()?)
        } else {
            None
        };
        Ok(self.node(
            token.loc,
            NodeKind::Variable {
                name,
                ty,
                value,
                is_static,
            },
        ))
    }

    fn parse_global(&mut self) -> CompileResult<NodeId> {
        let token = self.expect(TokenKind::KwGlobal)?;
        let extern_name = if self.eat(TokenKind::KwExtern)? {
            let name = self.expect(TokenKind::String)?;
            Some(self.interns.intern(name.text()))
        } else {
            None
        };
        let (name, _) = self.expect_name()?;
        self.expect(TokenKind::Colon)?;
        let ty = self.parse_expression()?;
        let value = if self.eat(TokenKind::Equals)? {
            Some(self.parse_expression()?)
        } else {
            None
        };
        Ok(self.node(
            token.loc,
            NodeKind::Global {
                name,
                ty,
                value,
                extern_name,
            },
        ))
    }

    fn parse_if(&mut self) -> CompileResult<NodeId> {
        let token = self.expect(TokenKind::KwIf)?;
        let is_static = self.eat(TokenKind::KwStatic)?;
        let condition = self.parse_expression()?;
        let binding = if self.eat(TokenKind::EqualsGreater)? {
            let (name, _) = self.expect_name()?;
            Some(name)
        } else {
            None
        };
        let then_body = self.parse_expression()?;
        let else_body = if self.eat(TokenKind::KwElse)? {
            self.parse_expression_or_nothing()?
        } else {
            None
        };
        Ok(self.node(
            token.loc,
            NodeKind::If {
                condition,
                then_body,
                else_body,
                is_static,
                binding,
            },
        ))
    }

    fn parse_while(&mut self) -> CompileResult<NodeId> {
        let token = self.expect(TokenKind::KwWhile)?;
        let condition = self.parse_expression()?;
        let body = self.parse_expression()?;
        let else_body = if self.eat(TokenKind::KwElse)? {
            Some(self.parse_expression()?)
        } else {
            None
        };
        Ok(self.node(
            token.loc,
            NodeKind::While {
                condition,
                body,
                else_body,
            },
        ))
    }

    fn parse_for(&mut self) -> CompileResult<NodeId> {
        let token = self.expect(TokenKind::KwFor)?;
        let is_static = self.eat(TokenKind::KwStatic)?;
        let mut items = vec![self.parse_expression()?];
        while self.eat(TokenKind::Comma)? {
            items.push(self.parse_expression()?);
        }
        let mut bindings = Vec::new();
        if self.eat(TokenKind::EqualsGreater)? {
            loop {
                let (name, _) = self.expect_name()?;
                bindings.push(name);
                if !self.eat(TokenKind::Comma)? {
                    break;
                }
            }
        }
        let body = self.parse_expression()?;
        Ok(self.node(
            token.loc,
            NodeKind::For {
                items,
                bindings,
                body,
                is_static,
            },
        ))
    }

    fn parse_switch(&mut self) -> CompileResult<NodeId> {
        let token = self.expect(TokenKind::KwSwitch)?;
        let is_static = self.eat(TokenKind::KwStatic)?;
        let condition = self.parse_expression()?;
        self.expect(TokenKind::CurlyOpen)?;
        let mut cases = Vec::new();
        while self.lexer.peek()?.kind != TokenKind::CurlyClose {
            self.expect(TokenKind::KwCase)?;
            let mut value = None;
            let mut binding = None;
            if self.lexer.peek()?.kind != TokenKind::Colon {
                value = Some(self.parse_expression()?);
                if self.eat(TokenKind::EqualsGreater)? {
                    let (name, _) = self.expect_name()?;
                    binding = Some(name);
                }
            }
            self.expect(TokenKind::Colon)?;
            let body = self.parse_expression()?;
            self.expect(TokenKind::Semicolon)?;
            cases.push(SwitchCase { value, binding, body });
        }
        self.expect(TokenKind::CurlyClose)?;
        Ok(self.node(
            token.loc,
            NodeKind::Switch {
                condition,
                cases,
                is_static,
            },
        ))
    }

    fn parse_return(&mut self) -> CompileResult<NodeId> {
        let token = self.expect(TokenKind::KwReturn)?;
        // `ok` and `err` are contextual markers projecting into a result
        // return type.
        let mut kind = ReturnKind::Plain;
        let peeked = self.lexer.peek()?;
        if peeked.kind == TokenKind::Identifier {
            match peeked.text() {
                "ok" => {
                    self.lexer.next()?;
                    kind = ReturnKind::Ok;
                }
                "err" => {
                    self.lexer.next()?;
                    kind = ReturnKind::Err;
                }
                _ => {}
            }
        }
        let value = self.parse_expression_or_nothing()?;
        Ok(self.node(token.loc, NodeKind::Return { value, kind }))
    }

    fn parse_cast(&mut self) -> CompileResult<NodeId> {
        let token = self.expect(TokenKind::KwCast)?;
        self.expect(TokenKind::ParenOpen)?;
        let ty = if self.lexer.peek()?.kind == TokenKind::ParenClose {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(TokenKind::ParenClose)?;
        let value = self.parse_prefix()?;
        Ok(self.node(token.loc, NodeKind::Cast { value, ty }))
    }

    fn parse_struct_type(&mut self) -> CompileResult<NodeId> {
        let token = self.expect(TokenKind::KwStruct)?;
        self.expect(TokenKind::CurlyOpen)?;
        let mut members = Vec::new();
        let mut operators = Vec::new();
        while self.lexer.peek()?.kind != TokenKind::CurlyClose {
            if self.eat(TokenKind::KwOp)? {
                let name = if self.eat(TokenKind::BracketOpen)? {
                    self.expect(TokenKind::BracketClose)?;
                    self.interns.intern("[]")
                } else {
                    self.expect_name()?.0
                };
                self.expect(TokenKind::Equals)?;
                let function = self.parse_expression()?;
                operators.push(OperatorOverload { name, function });
            } else {
                let (name, _) = self.expect_name()?;
                self.expect(TokenKind::Colon)?;
                let ty = self.parse_expression()?;
                members.push(StructureMember { name, ty });
            }
            let next = self.lexer.peek()?;
            match next.kind {
                TokenKind::Comma => {
                    self.lexer.next()?;
                }
                TokenKind::CurlyClose => {}
                _ => return Err(self.unexpected_no_expected(next)),
            }
        }
        self.expect(TokenKind::CurlyClose)?;
        Ok(self.node(token.loc, NodeKind::StructType { members, operators }))
    }

    fn parse_member_list(&mut self) -> CompileResult<Vec<StructureMember>> {
        self.expect(TokenKind::CurlyOpen)?;
        let mut members = Vec::new();
        while self.lexer.peek()?.kind != TokenKind::CurlyClose {
            let (name, _) = self.expect_name()?;
            self.expect(TokenKind::Colon)?;
            let ty = self.parse_expression()?;
            members.push(StructureMember { name, ty });
            let next = self.lexer.peek()?;
            match next.kind {
                TokenKind::Comma => {
                    self.lexer.next()?;
                }
                TokenKind::CurlyClose => {}
                _ => return Err(self.unexpected_no_expected(next)),
            }
        }
        self.expect(TokenKind::CurlyClose)?;
        Ok(members)
    }

    fn parse_enum_type(&mut self) -> CompileResult<NodeId> {
        let token = self.expect(TokenKind::KwEnum)?;
        self.expect(TokenKind::CurlyOpen)?;
        let mut items = Vec::new();
        while self.lexer.peek()?.kind != TokenKind::CurlyClose {
            let (name, _) = self.expect_name()?;
            items.push(name);
            let next = self.lexer.peek()?;
            match next.kind {
                TokenKind::Comma => {
                    self.lexer.next()?;
                }
                TokenKind::CurlyClose => {}
                _ => return Err(self.unexpected_no_expected(next)),
            }
        }
        self.expect(TokenKind::CurlyClose)?;
        Ok(self.node(token.loc, NodeKind::EnumType { items }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> (Arena<Node>, Interns, NodeId) {
        let mut nodes = Arena::new();
        let mut interns = Interns::new();
        let root = parse_source(&mut nodes, &mut interns, "test.lang", 0, source).expect("parse failed");
        (nodes, interns, root)
    }

    fn root_statements(nodes: &Arena<Node>, root: NodeId) -> Vec<NodeId> {
        let NodeKind::Module { body } = nodes.get(root).kind else {
            panic!("root is not a module");
        };
        let NodeKind::Block { statements, .. } = &nodes.get(body).kind else {
            panic!("module body is not a block");
        };
        statements.clone()
    }

    #[test]
    fn file_root_is_a_module_of_statements() {
        let (nodes, _, root) = parse("def x = 3; def y = true;");
        assert_eq!(root_statements(&nodes, root).len(), 2);
    }

    #[test]
    fn assignment_attaches_to_the_target_node() {
        let (nodes, _, root) = parse("var v: x = 0; v = 5;");
        let statements = root_statements(&nodes, root);
        let NodeKind::Identifier { assign_value, .. } = nodes.get(statements[1]).kind else {
            panic!("second statement should stay an identifier");
        };
        assert!(assign_value.is_some(), "assignment must attach the right-hand side");
    }

    #[test]
    fn postfix_chain_binds_left_to_right() {
        let (nodes, _, root) = parse("def t = a.b[0].*;");
        let statements = root_statements(&nodes, root);
        let NodeKind::Define { expression, .. } = nodes.get(statements[0]).kind else {
            panic!("expected define");
        };
        let NodeKind::Dereference { value, .. } = nodes.get(expression).kind else {
            panic!("outermost postfix should be the dereference");
        };
        let NodeKind::ArrayAccess { parent, .. } = nodes.get(value).kind else {
            panic!("then the array access");
        };
        assert!(matches!(nodes.get(parent).kind, NodeKind::StructureAccess { .. }));
    }

    #[test]
    fn slice_index_is_recognized_by_its_range() {
        let (nodes, _, root) = parse("def s = xs[1..3];");
        let statements = root_statements(&nodes, root);
        let NodeKind::Define { expression, .. } = nodes.get(statements[0]).kind else {
            panic!("expected define");
        };
        assert!(matches!(nodes.get(expression).kind, NodeKind::Slice { .. }));
    }

    #[test]
    fn function_with_inferred_and_static_parameters() {
        let (nodes, _, root) = parse("def id = fn<T: type>(x: T): T -> x;");
        let statements = root_statements(&nodes, root);
        let NodeKind::Define { expression, .. } = nodes.get(statements[0]).kind else {
            panic!("expected define");
        };
        let NodeKind::Function { function_type, .. } = nodes.get(expression).kind else {
            panic!("expected function literal");
        };
        let NodeKind::FunctionType { parameters, .. } = &nodes.get(function_type).kind else {
            panic!("expected function type");
        };
        assert_eq!(parameters.len(), 2);
        assert!(parameters[0].inferred && parameters[0].is_static);
        assert!(!parameters[1].inferred);
    }

    #[test]
    fn block_result_flag_tracks_the_missing_semicolon() {
        let (nodes, _, root) = parse("def f = fn(): x -> { var a = 1; a };");
        let statements = root_statements(&nodes, root);
        let NodeKind::Define { expression, .. } = nodes.get(statements[0]).kind else {
            panic!("expected define");
        };
        let NodeKind::Function { body: Some(body), .. } = nodes.get(expression).kind else {
            panic!("expected function with body");
        };
        let NodeKind::Block { has_result, .. } = nodes.get(body).kind else {
            panic!("expected block body");
        };
        assert!(has_result);
    }

    #[test]
    fn array_type_with_inferred_size() {
        let (nodes, _, root) = parse("def a = [_]byte.{1, 2};");
        let statements = root_statements(&nodes, root);
        let NodeKind::Define { expression, .. } = nodes.get(statements[0]).kind else {
            panic!("expected define");
        };
        let NodeKind::Structure { ty: Some(ty), values } = &nodes.get(expression).kind else {
            panic!("expected typed structure literal");
        };
        assert_eq!(values.len(), 2);
        let NodeKind::ArrayType { size, .. } = nodes.get(*ty).kind else {
            panic!("expected array type prefix");
        };
        assert!(size.is_none(), "[_] must leave the size to inference");
    }

    #[test]
    fn unexpected_token_diagnostic_matches_the_contract() {
        let mut nodes = Arena::new();
        let mut interns = Interns::new();
        let err = parse_source(&mut nodes, &mut interns, "test.lang", 0, "def = 3;").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Parse);
        assert_eq!(
            err.to_string(),
            "test.lang:1:5: Unexpected token '=', expected 'Identifier'"
        );
    }

    #[test]
    fn intrinsics_parse_by_name() {
        let (nodes, _, root) = parse("def u = @uint; def s = @size_of(u);");
        let statements = root_statements(&nodes, root);
        let NodeKind::Define { expression, .. } = nodes.get(statements[0]).kind else {
            panic!("expected define");
        };
        assert!(matches!(
            nodes.get(expression).kind,
            NodeKind::Internal {
                kind: InternalKind::Uint,
                ..
            }
        ));
    }

    #[test]
    fn unknown_intrinsic_is_a_parse_error() {
        let mut nodes = Arena::new();
        let mut interns = Interns::new();
        let err = parse_source(&mut nodes, &mut interns, "test.lang", 0, "def u = @bogus;").unwrap_err();
        assert!(err.message.contains("Unknown intrinsic"));
    }

    #[test]
    fn switch_cases_with_bindings() {
        let (nodes, _, root) = parse("def s = switch u { case a => x: 1; case: 2; };");
        let statements = root_statements(&nodes, root);
        let NodeKind::Define { expression, .. } = nodes.get(statements[0]).kind else {
            panic!("expected define");
        };
        let NodeKind::Switch { cases, .. } = &nodes.get(expression).kind else {
            panic!("expected switch");
        };
        assert_eq!(cases.len(), 2);
        assert!(cases[0].value.is_some() && cases[0].binding.is_some());
        assert!(cases[1].value.is_none() && cases[1].binding.is_none());
    }
}
