//! Recursive-descent parser over the indentation-layered token stream.
//!
//! Every node is allocated from the shared [`NodeArena`]; the parser
//! returns the root compound's handle. Statement position allows
//! whitespace-argument calls (`print y 2`); expression position requires
//! parentheses (`print(y)`), which keeps a bare identifier in an
//! expression a plain variable reference.

use crate::arena::{NodeArena, NodeId};
use crate::ast::{BinaryOp, Node, Span, UnaryOp};
use crate::lexer::Token;

#[derive(Debug, thiserror::Error)]
#[error("Parse error at token {position}: {message}")]
pub struct ParseError {
    pub position: usize,
    pub span: Span,
    pub message: String,
}

type Result<T> = std::result::Result<T, ParseError>;

/// Parse a token stream into the arena. Returns the root compound node.
pub fn parse(tokens: Vec<(Token, Span)>, arena: &NodeArena) -> Result<NodeId> {
    Parser::new(tokens, arena).parse_program()
}

struct Parser<'a> {
    tokens: Vec<(Token, Span)>,
    pos: usize,
    arena: &'a NodeArena,
    eof: Token,
}

impl<'a> Parser<'a> {
    fn new(tokens: Vec<(Token, Span)>, arena: &'a NodeArena) -> Self {
        Parser {
            tokens,
            pos: 0,
            arena,
            eof: Token::Eof,
        }
    }

    // ---- Token helpers ----

    fn peek(&self) -> &Token {
        self.tokens
            .get(self.pos)
            .map(|(t, _)| t)
            .unwrap_or(&self.eof)
    }

    fn peek_span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .map(|(_, s)| *s)
            .unwrap_or(Span::UNKNOWN)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == token {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<()> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.error(format!("expected {:?}, got {:?}", expected, self.peek())))
        }
    }

    fn expect_ident(&mut self) -> Result<String> {
        match self.peek().clone() {
            Token::Ident(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(self.error(format!("expected identifier, got {:?}", other))),
        }
    }

    fn error(&self, message: String) -> ParseError {
        ParseError {
            position: self.pos,
            span: self.peek_span(),
            message,
        }
    }

    fn alloc(&self, node: Node) -> Result<NodeId> {
        self.arena
            .acquire(node)
            .ok_or_else(|| self.error("node allocation failed".to_string()))
    }

    /// A statement ends at a newline, a dedent, or the end of input.
    fn at_statement_end(&self) -> bool {
        matches!(self.peek(), Token::Newline | Token::Dedent | Token::Eof)
    }

    fn end_statement(&mut self) -> Result<()> {
        if self.eat(&Token::Newline) || matches!(self.peek(), Token::Dedent | Token::Eof) {
            Ok(())
        } else {
            Err(self.error(format!("expected end of statement, got {:?}", self.peek())))
        }
    }

    // ---- Program and blocks ----

    fn parse_program(&mut self) -> Result<NodeId> {
        let statements = self.parse_statements(|token| matches!(token, Token::Eof))?;
        self.alloc(Node::Compound { statements })
    }

    fn parse_statements(&mut self, stop: impl Fn(&Token) -> bool) -> Result<Vec<NodeId>> {
        let mut statements = Vec::new();
        loop {
            while self.eat(&Token::Newline) {}
            if stop(self.peek()) {
                break;
            }
            statements.push(self.parse_statement()?);
        }
        Ok(statements)
    }

    /// `NEWLINE INDENT statements DEDENT` — the body of every block form.
    fn parse_block(&mut self) -> Result<NodeId> {
        self.expect(&Token::Newline)?;
        self.expect(&Token::Indent)?;
        let statements = self.parse_statements(|token| matches!(token, Token::Dedent | Token::Eof))?;
        self.expect(&Token::Dedent)?;
        self.alloc(Node::Compound { statements })
    }

    // ---- Statements ----

    fn parse_statement(&mut self) -> Result<NodeId> {
        match self.peek() {
            Token::Set => self.parse_variable_definition(),
            Token::Function => self.parse_function_definition(),
            Token::If => self.parse_if_statement(),
            Token::While => self.parse_while_loop(),
            Token::For => self.parse_for_loop(),
            Token::Return => self.parse_return_statement(),
            Token::Break => {
                self.advance();
                let node = self.alloc(Node::Break)?;
                self.end_statement()?;
                Ok(node)
            }
            Token::Continue => {
                self.advance();
                let node = self.alloc(Node::Continue)?;
                self.end_statement()?;
                Ok(node)
            }
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_variable_definition(&mut self) -> Result<NodeId> {
        self.expect(&Token::Set)?;
        let name = self.expect_ident()?;
        let value = self.parse_expr()?;
        let node = self.alloc(Node::VariableDefinition { name, value })?;
        self.end_statement()?;
        Ok(node)
    }

    fn parse_function_definition(&mut self) -> Result<NodeId> {
        self.expect(&Token::Function)?;
        let name = self.expect_ident()?;
        let mut params = Vec::new();
        while let Token::Ident(_) = self.peek() {
            params.push(self.expect_ident()?);
        }
        let body = self.parse_block()?;
        self.alloc(Node::FunctionDefinition { name, params, body })
    }

    fn parse_if_statement(&mut self) -> Result<NodeId> {
        self.expect(&Token::If)?;
        self.parse_if_tail()
    }

    /// Condition, then-block, and the else position. An `elif` chain is a
    /// nested if in the else position.
    fn parse_if_tail(&mut self) -> Result<NodeId> {
        let condition = self.parse_expr()?;
        let then_branch = self.parse_block()?;

        let else_branch = if self.eat(&Token::Elif) {
            Some(self.parse_if_tail()?)
        } else if self.eat(&Token::Else) {
            Some(self.parse_block()?)
        } else {
            None
        };

        self.alloc(Node::If {
            condition,
            then_branch,
            else_branch,
        })
    }

    fn parse_while_loop(&mut self) -> Result<NodeId> {
        self.expect(&Token::While)?;
        let condition = self.parse_expr()?;
        let body = self.parse_block()?;
        self.alloc(Node::While { condition, body })
    }

    fn parse_for_loop(&mut self) -> Result<NodeId> {
        self.expect(&Token::For)?;
        let iterator_variable = self.expect_ident()?;
        self.expect(&Token::In)?;
        let iterable = self.parse_expr()?;
        let for_body = self.parse_block()?;
        self.alloc(Node::For {
            iterator_variable,
            iterable,
            for_body,
        })
    }

    fn parse_return_statement(&mut self) -> Result<NodeId> {
        self.expect(&Token::Return)?;
        let value = if self.at_statement_end() {
            None
        } else {
            Some(self.parse_expr()?)
        };
        let node = self.alloc(Node::Return { value })?;
        self.end_statement()?;
        Ok(node)
    }

    /// Expression statement. A leading identifier followed by the start
    /// of another expression is a whitespace-argument call.
    fn parse_expression_statement(&mut self) -> Result<NodeId> {
        let node = if let Token::Ident(name) = self.peek().clone() {
            if self.starts_whitespace_argument(1) {
                self.advance();
                let mut arguments = Vec::new();
                while !self.at_statement_end() {
                    arguments.push(self.parse_expr()?);
                }
                self.alloc(Node::Call { name, arguments })?
            } else {
                self.parse_expr()?
            }
        } else {
            self.parse_expr()?
        };
        self.end_statement()?;
        Ok(node)
    }

    /// Does the token at `offset` from the cursor open a whitespace call
    /// argument? Index brackets and operators keep the identifier an
    /// ordinary expression head.
    fn starts_whitespace_argument(&self, offset: usize) -> bool {
        matches!(
            self.tokens.get(self.pos + offset).map(|(t, _)| t),
            Some(
                Token::Ident(_)
                    | Token::Number(_)
                    | Token::Str(_)
                    | Token::True
                    | Token::False
                    | Token::Null
                    | Token::LBrace
                    | Token::Not
            )
        )
    }

    // ---- Expressions ----

    fn parse_expr(&mut self) -> Result<NodeId> {
        self.parse_binary_expr(0)
    }

    fn parse_binary_expr(&mut self, min_precedence: u8) -> Result<NodeId> {
        let mut left = self.parse_unary_expr()?;
        while let Some((op, precedence)) = binary_op(self.peek()) {
            if precedence < min_precedence {
                break;
            }
            self.advance();
            let right = self.parse_binary_expr(precedence + 1)?;
            left = self.alloc(Node::Binary { op, left, right })?;
        }
        Ok(left)
    }

    fn parse_unary_expr(&mut self) -> Result<NodeId> {
        let op = match self.peek() {
            Token::Not => Some(UnaryOp::Not),
            Token::Minus => Some(UnaryOp::Negate),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.parse_unary_expr()?;
            return self.alloc(Node::Unary { op, operand });
        }
        self.parse_postfix_expr()
    }

    fn parse_postfix_expr(&mut self) -> Result<NodeId> {
        let mut expr = self.parse_primary_expr()?;
        loop {
            if self.eat(&Token::Dot) {
                let property = self.expect_ident()?;
                expr = self.alloc(Node::PropertyAccess {
                    object: expr,
                    property,
                })?;
            } else if self.eat(&Token::LBracket) {
                let index = self.parse_expr()?;
                self.expect(&Token::RBracket)?;
                expr = self.alloc(Node::Index {
                    object: expr,
                    index,
                })?;
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_primary_expr(&mut self) -> Result<NodeId> {
        match self.peek().clone() {
            Token::Number(n) => {
                self.advance();
                self.alloc(Node::Number(n))
            }
            Token::Str(s) => {
                self.advance();
                self.alloc(Node::String(s))
            }
            Token::True => {
                self.advance();
                self.alloc(Node::Boolean(true))
            }
            Token::False => {
                self.advance();
                self.alloc(Node::Boolean(false))
            }
            Token::Null => {
                self.advance();
                self.alloc(Node::Null)
            }
            Token::LParen => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(&Token::RParen)?;
                Ok(expr)
            }
            Token::LBracket => self.parse_array_literal(),
            Token::LBrace => self.parse_object_literal(),
            Token::Ident(name) => {
                self.advance();
                if self.eat(&Token::LParen) {
                    let mut arguments = Vec::new();
                    if self.peek() != &Token::RParen {
                        loop {
                            arguments.push(self.parse_expr()?);
                            if !self.eat(&Token::Comma) {
                                break;
                            }
                        }
                    }
                    self.expect(&Token::RParen)?;
                    self.alloc(Node::Call { name, arguments })
                } else {
                    self.alloc(Node::Variable { name })
                }
            }
            other => Err(self.error(format!("expected expression, got {:?}", other))),
        }
    }

    fn parse_array_literal(&mut self) -> Result<NodeId> {
        self.expect(&Token::LBracket)?;
        let mut elements = Vec::new();
        if self.peek() != &Token::RBracket {
            loop {
                elements.push(self.parse_expr()?);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(&Token::RBracket)?;
        self.alloc(Node::Array { elements })
    }

    fn parse_object_literal(&mut self) -> Result<NodeId> {
        self.expect(&Token::LBrace)?;
        let mut entries = Vec::new();
        if self.peek() != &Token::RBrace {
            loop {
                let key = match self.peek().clone() {
                    Token::Ident(name) => {
                        self.advance();
                        name
                    }
                    Token::Str(s) => {
                        self.advance();
                        s
                    }
                    other => {
                        return Err(self.error(format!("expected object key, got {:?}", other)));
                    }
                };
                self.expect(&Token::Colon)?;
                let value = self.parse_expr()?;
                entries.push((key, value));
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(&Token::RBrace)?;
        self.alloc(Node::Object { entries })
    }
}

fn binary_op(token: &Token) -> Option<(BinaryOp, u8)> {
    let pair = match token {
        Token::Or => (BinaryOp::Or, 1),
        Token::And => (BinaryOp::And, 2),
        Token::EqualsEquals => (BinaryOp::Equals, 3),
        Token::NotEquals => (BinaryOp::NotEquals, 3),
        Token::Less => (BinaryOp::LessThan, 4),
        Token::Greater => (BinaryOp::GreaterThan, 4),
        Token::LessEquals => (BinaryOp::LessOrEqual, 4),
        Token::GreaterEquals => (BinaryOp::GreaterOrEqual, 4),
        Token::Plus => (BinaryOp::Add, 5),
        Token::Minus => (BinaryOp::Subtract, 5),
        Token::Star => (BinaryOp::Multiply, 6),
        Token::Slash => (BinaryOp::Divide, 6),
        Token::Percent => (BinaryOp::Modulo, 6),
        _ => return None,
    };
    Some(pair)
}
