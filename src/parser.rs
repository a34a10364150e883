use crate::Span;
use crate::ast::{BinaryOp, FunctionDecl, LogicalOp, Node, NodeKind, UnaryOp};
use crate::lexer::{LexError, Lexer, Token, TokenKind};
use crate::stack::ensure_sufficient_stack;
use std::rc::Rc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("expected {expected}, found '{found}' at {span}")]
    UnexpectedToken {
        expected: String,
        found: TokenKind,
        span: Span,
    },
    #[error("expected an expression, found '{found}' at {span}")]
    ExpectedExpression { found: TokenKind, span: Span },
    #[error("expected an identifier, found '{found}' at {span}")]
    ExpectedIdentifier { found: TokenKind, span: Span },
    #[error("invalid assignment target at {span}")]
    InvalidAssignmentTarget { span: Span },
    #[error("'{keyword}' outside of a loop at {span}")]
    ControlOutsideLoop { keyword: TokenKind, span: Span },
    // Propagate lexer errors, the parser pulls tokens lazily
    #[error(transparent)]
    Lex(#[from] LexError),
}

impl ParseError {
    pub fn span(&self) -> Span {
        match self {
            ParseError::UnexpectedToken { span, .. }
            | ParseError::ExpectedExpression { span, .. }
            | ParseError::ExpectedIdentifier { span, .. }
            | ParseError::InvalidAssignmentTarget { span }
            | ParseError::ControlOutsideLoop { span, .. } => *span,
            ParseError::Lex(lex_err) => lex_err.span(),
        }
    }
}

// Result type alias for convenience
type ParseResult<T> = Result<T, ParseError>;

// Binary operators handled by precedence climbing. Logical operators share the
// table so `||` and `&&` sit below equality.
#[derive(Clone, Copy)]
enum Infix {
    Binary(BinaryOp),
    Logical(LogicalOp),
}

fn infix_operator(kind: &TokenKind) -> Option<(u8, Infix)> {
    let entry = match kind {
        TokenKind::OrOr => (1, Infix::Logical(LogicalOp::Or)),
        TokenKind::AndAnd => (2, Infix::Logical(LogicalOp::And)),
        TokenKind::EqualEqual => (3, Infix::Binary(BinaryOp::Equal)),
        TokenKind::BangEqual => (3, Infix::Binary(BinaryOp::NotEqual)),
        TokenKind::Less => (4, Infix::Binary(BinaryOp::Less)),
        TokenKind::LessEqual => (4, Infix::Binary(BinaryOp::LessEqual)),
        TokenKind::Greater => (4, Infix::Binary(BinaryOp::Greater)),
        TokenKind::GreaterEqual => (4, Infix::Binary(BinaryOp::GreaterEqual)),
        TokenKind::Plus => (5, Infix::Binary(BinaryOp::Add)),
        TokenKind::Minus => (5, Infix::Binary(BinaryOp::Subtract)),
        TokenKind::Star => (6, Infix::Binary(BinaryOp::Multiply)),
        TokenKind::Slash => (6, Infix::Binary(BinaryOp::Divide)),
        TokenKind::Percent => (6, Infix::Binary(BinaryOp::Modulo)),
        _ => return None,
    };
    Some(entry)
}

const LOWEST_BINARY_PRECEDENCE: u8 = 1;

pub struct Parser<'src> {
    // Tokens are pulled from the lexer one at a time.
    lexer: Lexer<'src>,
    current: Token,
    // Number of loops enclosing the current statement within the current function.
    loop_depth: usize,
}

impl<'src> Parser<'src> {
    pub fn new(source: &'src str) -> ParseResult<Self> {
        let mut lexer = Lexer::new(source);
        let current = Self::pull(&mut lexer, source.len())?;
        Ok(Parser {
            lexer,
            current,
            loop_depth: 0,
        })
    }

    fn pull(lexer: &mut Lexer<'src>, source_len: usize) -> ParseResult<Token> {
        match lexer.next() {
            Some(token) => Ok(token?),
            // The lexer is fused after Eof; keep handing out Eof.
            None => Ok(Token {
                kind: TokenKind::Eof,
                lexeme: String::new(),
                span: Span::point(source_len),
            }),
        }
    }

    // Consumes the current token, returning it.
    fn advance(&mut self) -> ParseResult<Token> {
        let source_len = self.current.span.end;
        let next = if self.current.kind == TokenKind::Eof {
            self.current.clone()
        } else {
            Self::pull(&mut self.lexer, source_len)?
        };
        Ok(std::mem::replace(&mut self.current, next))
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.current.kind == kind
    }

    fn unexpected<T>(&self, expected: &str) -> ParseResult<T> {
        Err(ParseError::UnexpectedToken {
            expected: expected.to_string(),
            found: self.current.kind.clone(),
            span: self.current.span,
        })
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> ParseResult<Token> {
        if self.check(&kind) {
            self.advance()
        } else {
            self.unexpected(expected)
        }
    }

    fn expect_identifier(&mut self) -> ParseResult<(String, Span)> {
        match &self.current.kind {
            TokenKind::Identifier(name) => {
                let name = name.clone();
                let token = self.advance()?;
                Ok((name, token.span))
            }
            other => Err(ParseError::ExpectedIdentifier {
                found: other.clone(),
                span: self.current.span,
            }),
        }
    }

    /// Parses the whole source into a `Program` node.
    pub fn parse(mut self) -> ParseResult<Node> {
        let mut statements = Vec::new();
        while !self.check(&TokenKind::Eof) {
            statements.push(self.parse_statement()?);
        }
        Ok(Node::new(
            NodeKind::Program(statements),
            Span::new(0, self.current.span.end),
        ))
    }

    pub fn parse_statement(&mut self) -> ParseResult<Node> {
        // Blocks, branches and loop bodies all recurse through here.
        ensure_sufficient_stack(|| self.parse_statement_kind())
    }

    fn parse_statement_kind(&mut self) -> ParseResult<Node> {
        match self.current.kind {
            TokenKind::Let => self.parse_let(),
            TokenKind::Fn => self.parse_function(),
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::For => self.parse_for(),
            TokenKind::Return => self.parse_return(),
            TokenKind::Break | TokenKind::Continue => self.parse_loop_control(),
            TokenKind::LBrace => {
                let (statements, span) = self.parse_block_statements()?;
                Ok(Node::new(NodeKind::Block(statements), span))
            }
            _ => self.parse_expression_statement(),
        }
    }

    /// `let NAME = expr ;`
    fn parse_let(&mut self) -> ParseResult<Node> {
        let let_token = self.advance()?;
        let (name, _) = self.expect_identifier()?;
        self.expect(TokenKind::Equal, "'=' after variable name")?;
        let value = self.parse_expression()?;
        let semicolon = self.expect(TokenKind::Semicolon, "';' after let statement")?;
        Ok(Node::new(
            NodeKind::Let {
                name,
                value: Box::new(value),
            },
            let_token.span.merge(semicolon.span),
        ))
    }

    /// `fn NAME ( params ) { body }`
    fn parse_function(&mut self) -> ParseResult<Node> {
        let fn_token = self.advance()?;
        let (name, _) = self.expect_identifier()?;
        self.expect(TokenKind::LParen, "'(' after function name")?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                let (param, _) = self.expect_identifier()?;
                params.push(param);
                if self.check(&TokenKind::Comma) {
                    self.advance()?;
                } else {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "')' after parameters")?;

        // Loops around the definition do not extend into its body.
        let enclosing_loops = std::mem::replace(&mut self.loop_depth, 0);
        let body = self.parse_block_statements();
        self.loop_depth = enclosing_loops;
        let (body, body_span) = body?;

        let span = fn_token.span.merge(body_span);
        Ok(Node::new(
            NodeKind::FunctionDef(Rc::new(FunctionDecl {
                name,
                params,
                body,
                span,
            })),
            span,
        ))
    }

    /// `{ stmt* }`, returning the statements and the span including both braces.
    fn parse_block_statements(&mut self) -> ParseResult<(Vec<Node>, Span)> {
        let lbrace = self.expect(TokenKind::LBrace, "'{'")?;
        let mut statements = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.check(&TokenKind::Eof) {
            statements.push(self.parse_statement()?);
        }
        let rbrace = self.expect(TokenKind::RBrace, "'}' after block")?;
        Ok((statements, lbrace.span.merge(rbrace.span)))
    }

    fn parse_condition(&mut self, keyword: &str) -> ParseResult<Node> {
        self.expect(TokenKind::LParen, &format!("'(' after '{}'", keyword))?;
        let condition = self.parse_expression()?;
        self.expect(TokenKind::RParen, "')' after condition")?;
        Ok(condition)
    }

    /// `if ( expr ) stmt [else stmt]`
    fn parse_if(&mut self) -> ParseResult<Node> {
        let if_token = self.advance()?;
        let condition = self.parse_condition("if")?;
        let then_branch = self.parse_statement()?;
        let else_branch = if self.check(&TokenKind::Else) {
            self.advance()?;
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        let end = else_branch
            .as_ref()
            .map_or(then_branch.span, |branch| branch.span);
        Ok(Node::new(
            NodeKind::If {
                condition: Box::new(condition),
                then_branch: Box::new(then_branch),
                else_branch,
            },
            if_token.span.merge(end),
        ))
    }

    fn parse_loop_body(&mut self) -> ParseResult<Node> {
        self.loop_depth += 1;
        let body = self.parse_statement();
        self.loop_depth -= 1;
        body
    }

    /// `while ( expr ) stmt`
    fn parse_while(&mut self) -> ParseResult<Node> {
        let while_token = self.advance()?;
        let condition = self.parse_condition("while")?;
        let body = self.parse_loop_body()?;
        let span = while_token.span.merge(body.span);
        Ok(Node::new(
            NodeKind::While {
                condition: Box::new(condition),
                body: Box::new(body),
                increment: None,
            },
            span,
        ))
    }

    /// `for ( init ; cond ; incr ) stmt`, desugared into
    /// `{ init; while ( cond ) body }` with `incr` attached as the loop increment.
    fn parse_for(&mut self) -> ParseResult<Node> {
        let for_token = self.advance()?;
        self.expect(TokenKind::LParen, "'(' after 'for'")?;

        let initializer = match self.current.kind {
            TokenKind::Semicolon => {
                self.advance()?;
                None
            }
            TokenKind::Let => Some(self.parse_let()?),
            _ => {
                let expression = self.parse_expression()?;
                self.expect(TokenKind::Semicolon, "';' after loop initializer")?;
                Some(expression)
            }
        };

        let condition = if self.check(&TokenKind::Semicolon) {
            // A missing condition loops forever.
            Node::new(NodeKind::BooleanLiteral(true), Span::point(self.current.span.start))
        } else {
            self.parse_expression()?
        };
        self.expect(TokenKind::Semicolon, "';' after loop condition")?;

        let increment = if self.check(&TokenKind::RParen) {
            None
        } else {
            Some(Box::new(self.parse_expression()?))
        };
        self.expect(TokenKind::RParen, "')' after for clauses")?;

        let body = self.parse_loop_body()?;
        let span = for_token.span.merge(body.span);

        let while_loop = Node::new(
            NodeKind::While {
                condition: Box::new(condition),
                body: Box::new(body),
                increment,
            },
            span,
        );
        let statements = match initializer {
            Some(initializer) => vec![initializer, while_loop],
            None => vec![while_loop],
        };
        Ok(Node::new(NodeKind::Block(statements), span))
    }

    /// `return [expr] ;`
    fn parse_return(&mut self) -> ParseResult<Node> {
        let return_token = self.advance()?;
        let value = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(Box::new(self.parse_expression()?))
        };
        let semicolon = self.expect(TokenKind::Semicolon, "';' after return value")?;
        Ok(Node::new(
            NodeKind::Return(value),
            return_token.span.merge(semicolon.span),
        ))
    }

    /// `break ;` and `continue ;`
    fn parse_loop_control(&mut self) -> ParseResult<Node> {
        if self.loop_depth == 0 {
            return Err(ParseError::ControlOutsideLoop {
                keyword: self.current.kind.clone(),
                span: self.current.span,
            });
        }
        let keyword = self.advance()?;
        let kind = if keyword.kind == TokenKind::Break {
            NodeKind::Break
        } else {
            NodeKind::Continue
        };
        let semicolon = self.expect(TokenKind::Semicolon, &format!("';' after '{}'", keyword.kind))?;
        Ok(Node::new(kind, keyword.span.merge(semicolon.span)))
    }

    // The final statement of a program may omit its ';' so that `x` or `f(1)`
    // can be typed as the last line.
    fn parse_expression_statement(&mut self) -> ParseResult<Node> {
        let expression = self.parse_expression()?;
        if !self.check(&TokenKind::Eof) {
            self.expect(TokenKind::Semicolon, "';' after expression")?;
        }
        Ok(expression)
    }

    pub fn parse_expression(&mut self) -> ParseResult<Node> {
        ensure_sufficient_stack(|| self.parse_assignment())
    }

    // Assignment is right-associative and binds loosest.
    fn parse_assignment(&mut self) -> ParseResult<Node> {
        let target = self.parse_binary(LOWEST_BINARY_PRECEDENCE)?;
        if !self.check(&TokenKind::Equal) {
            return Ok(target);
        }
        self.advance()?;
        let value = self.parse_assignment()?;
        match &target.kind {
            NodeKind::Identifier(name) => {
                let span = target.span.merge(value.span);
                Ok(Node::new(
                    NodeKind::Assign {
                        name: name.clone(),
                        value: Box::new(value),
                    },
                    span,
                ))
            }
            _ => Err(ParseError::InvalidAssignmentTarget { span: target.span }),
        }
    }

    // Precedence climbing over the infix operator table; every level is
    // left-associative.
    fn parse_binary(&mut self, min_precedence: u8) -> ParseResult<Node> {
        let mut left = self.parse_unary()?;
        while let Some((precedence, operator)) = infix_operator(&self.current.kind) {
            if precedence < min_precedence {
                break;
            }
            self.advance()?;
            let right = ensure_sufficient_stack(|| self.parse_binary(precedence + 1))?;
            let span = left.span.merge(right.span);
            let (left_node, right_node) = (Box::new(left), Box::new(right));
            let kind = match operator {
                Infix::Binary(op) => NodeKind::Binary {
                    op,
                    left: left_node,
                    right: right_node,
                },
                Infix::Logical(op) => NodeKind::Logical {
                    op,
                    left: left_node,
                    right: right_node,
                },
            };
            left = Node::new(kind, span);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> ParseResult<Node> {
        let op = match self.current.kind {
            TokenKind::Bang => UnaryOp::Not,
            TokenKind::Minus => UnaryOp::Negate,
            _ => return self.parse_call(),
        };
        let op_token = self.advance()?;
        let operand = ensure_sufficient_stack(|| self.parse_unary())?;
        let span = op_token.span.merge(operand.span);
        Ok(Node::new(
            NodeKind::Unary {
                op,
                operand: Box::new(operand),
            },
            span,
        ))
    }

    fn parse_call(&mut self) -> ParseResult<Node> {
        let mut callee = self.parse_primary()?;
        while self.check(&TokenKind::LParen) {
            self.advance()?;
            let mut args = Vec::new();
            if !self.check(&TokenKind::RParen) {
                loop {
                    args.push(self.parse_expression()?);
                    if self.check(&TokenKind::Comma) {
                        self.advance()?;
                    } else {
                        break;
                    }
                }
            }
            let rparen = self.expect(TokenKind::RParen, "')' after arguments")?;
            let span = callee.span.merge(rparen.span);
            callee = Node::new(
                NodeKind::Call {
                    callee: Box::new(callee),
                    args,
                },
                span,
            );
        }
        Ok(callee)
    }

    fn parse_primary(&mut self) -> ParseResult<Node> {
        let kind = match &self.current.kind {
            TokenKind::Number(n) => NodeKind::NumberLiteral(*n),
            TokenKind::String(s) => NodeKind::StringLiteral(s.clone()),
            TokenKind::True => NodeKind::BooleanLiteral(true),
            TokenKind::False => NodeKind::BooleanLiteral(false),
            TokenKind::Nil => NodeKind::NilLiteral,
            TokenKind::Identifier(name) => NodeKind::Identifier(name.clone()),
            TokenKind::LParen => {
                let lparen = self.advance()?;
                let mut inner = self.parse_expression()?;
                let rparen = self.expect(TokenKind::RParen, "')' after expression")?;
                inner.span = lparen.span.merge(rparen.span);
                return Ok(inner);
            }
            other => {
                return Err(ParseError::ExpectedExpression {
                    found: other.clone(),
                    span: self.current.span,
                });
            }
        };
        let token = self.advance()?;
        Ok(Node::new(kind, token.span))
    }
}

// Helper function to lex and parse a string directly (useful for tests and REPL)
pub fn parse_program(input: &str) -> ParseResult<Node> {
    Parser::new(input)?.parse()
}
