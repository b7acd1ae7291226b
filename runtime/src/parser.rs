//! Parser: token stream to AST.
//!
//! The grammar is a deliberately small C-family subset: top-level `func`
//! declarations whose bodies contain `let`, `return`, `if`/`else`, and
//! expression statements over string/int/float/bool literals, identifiers,
//! calls, and the `+`/`==` binary operators.  Call-site argument labels and
//! parameter labels/type annotations are accepted and discarded.
//!
//! Top-level forms other than `func` do not produce AST nodes and do not
//! fail; each skipped region is reported through a `tracing` warning so an
//! embedder can surface them.  Inside a function body every construct
//! outside the subset is a compile error.

use tracing::warn;

use crate::error::{CompileError, CompileErrorKind};
use crate::lexer::{Token, TokenKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Eq,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Ident(String),
    Call { name: String, args: Vec<Expr> },
    Binary {
        lhs: Box<Expr>,
        op: BinaryOp,
        rhs: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Let {
        name: String,
        expr: Expr,
        line: u32,
    },
    Expr {
        expr: Expr,
        line: u32,
    },
    Return {
        expr: Option<Expr>,
        line: u32,
    },
    If {
        cond: Expr,
        then_body: Vec<Stmt>,
        else_body: Option<Vec<Stmt>>,
        line: u32,
    },
}

/// A parsed top-level function declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
    pub line: u32,
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(mut tokens: Vec<Token>) -> Self {
        if tokens.is_empty() {
            tokens.push(Token {
                kind: TokenKind::Eof,
                line: 1,
            });
        }
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].kind
    }

    fn peek_next(&self) -> &TokenKind {
        &self.tokens[(self.pos + 1).min(self.tokens.len() - 1)].kind
    }

    fn line(&self) -> u32 {
        self.tokens[self.pos.min(self.tokens.len() - 1)].line
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Parse the whole file: `func` declarations interleaved with skippable
    /// top-level forms.
    pub fn parse_file(&mut self) -> Result<Vec<FunctionDecl>, CompileError> {
        let mut functions = Vec::new();
        while *self.peek() != TokenKind::Eof {
            if *self.peek() == TokenKind::Func {
                functions.push(self.parse_function()?);
            } else {
                self.skip_top_level_form();
            }
        }
        Ok(functions)
    }

    /// Consume tokens until the next top-level `func` or end of input,
    /// tracking brace depth so a `func` nested inside a skipped block is not
    /// mistaken for a declaration.
    fn skip_top_level_form(&mut self) {
        let start = self.line();
        let mut depth: u32 = 0;
        loop {
            match self.peek() {
                TokenKind::Eof => break,
                TokenKind::Func if depth == 0 => break,
                TokenKind::LBrace => {
                    depth += 1;
                    self.advance();
                }
                TokenKind::RBrace => {
                    depth = depth.saturating_sub(1);
                    self.advance();
                }
                _ => {
                    self.advance();
                }
            }
        }
        warn!(line = start, "ignoring unsupported top-level form");
    }

    fn parse_function(&mut self) -> Result<FunctionDecl, CompileError> {
        let line = self.line();
        self.advance(); // func
        let name = match self.advance().kind {
            TokenKind::Ident(name) => name,
            other => {
                return Err(CompileError::unsupported(
                    format!("malformed function declaration: expected name, found {}", describe(&other)),
                    line,
                ))
            }
        };
        if !self.eat(&TokenKind::LParen) {
            return Err(CompileError::unsupported(
                format!("malformed function declaration for '{name}': expected '('"),
                line,
            ));
        }
        let params = self.parse_params(&name, line)?;
        if !self.eat(&TokenKind::LBrace) {
            return Err(CompileError::unsupported(
                format!("malformed function declaration for '{name}': expected '{{'"),
                self.line(),
            ));
        }
        let body = self.parse_statements_until_rbrace()?;
        Ok(FunctionDecl {
            name,
            params,
            body,
            line,
        })
    }

    /// Parse a parameter list.  Each parameter is `[label] name [: Type]`;
    /// the binding name is the last identifier before the annotation, so
    /// both `name: Int` and `_ name: Int` bind `name`.
    fn parse_params(&mut self, func: &str, line: u32) -> Result<Vec<String>, CompileError> {
        let mut params = Vec::new();
        if self.eat(&TokenKind::RParen) {
            return Ok(params);
        }
        loop {
            let mut binding: Option<String> = None;
            while let TokenKind::Ident(name) = self.peek() {
                binding = Some(name.clone());
                self.advance();
            }
            let binding = binding.ok_or_else(|| {
                CompileError::unsupported(
                    format!("malformed parameter list for '{func}'"),
                    self.line(),
                )
            })?;
            if self.eat(&TokenKind::Colon) {
                self.skip_type_annotation();
            }
            params.push(binding);
            if self.eat(&TokenKind::Comma) {
                continue;
            }
            if self.eat(&TokenKind::RParen) {
                return Ok(params);
            }
            return Err(CompileError::unsupported(
                format!("malformed parameter list for '{func}': expected ',' or ')'"),
                line,
            ));
        }
    }

    /// Discard a type annotation: everything up to the next ',' or ')' at
    /// the current nesting level.
    fn skip_type_annotation(&mut self) {
        let mut depth: u32 = 0;
        loop {
            match self.peek() {
                TokenKind::Eof => break,
                TokenKind::Comma if depth == 0 => break,
                TokenKind::RParen if depth == 0 => break,
                TokenKind::LParen => {
                    depth += 1;
                    self.advance();
                }
                TokenKind::RParen => {
                    depth -= 1;
                    self.advance();
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    fn parse_statements_until_rbrace(&mut self) -> Result<Vec<Stmt>, CompileError> {
        let mut statements = Vec::new();
        loop {
            match self.peek() {
                TokenKind::Semicolon => {
                    self.advance();
                }
                TokenKind::RBrace => {
                    self.advance();
                    return Ok(statements);
                }
                TokenKind::Eof => {
                    return Err(CompileError::unsupported(
                        "unexpected end of input in function body",
                        self.line(),
                    ))
                }
                _ => statements.push(self.parse_stmt()?),
            }
        }
    }

    fn parse_stmt(&mut self) -> Result<Stmt, CompileError> {
        let line = self.line();
        match self.peek() {
            TokenKind::Let => self.parse_let(),
            TokenKind::Return => self.parse_return(),
            TokenKind::If => self.parse_if(),
            TokenKind::Func => Err(CompileError::unsupported(
                "Unsupported nested function declaration",
                line,
            )),
            _ => {
                let expr = self.parse_expr()?;
                Ok(Stmt::Expr { expr, line })
            }
        }
    }

    fn parse_let(&mut self) -> Result<Stmt, CompileError> {
        let line = self.line();
        self.advance(); // let
        let name = match self.advance().kind {
            TokenKind::Ident(name) => name,
            other => {
                return Err(CompileError::new(
                    CompileErrorKind::InvalidLet,
                    format!("let requires a binding name, found {}", describe(&other)),
                    Some(line),
                ))
            }
        };
        if !self.eat(&TokenKind::Equal) {
            return Err(CompileError::new(
                CompileErrorKind::InvalidLet,
                format!("let binding '{name}' requires '='"),
                Some(line),
            ));
        }
        let expr = self.parse_expr()?;
        Ok(Stmt::Let { name, expr, line })
    }

    fn parse_return(&mut self) -> Result<Stmt, CompileError> {
        let line = self.line();
        self.advance(); // return
        // A value belongs to this return only when it starts on the same
        // line; `return` followed by a new line or ';' is a bare return.
        let expr = if matches!(self.peek(), TokenKind::RBrace | TokenKind::Semicolon)
            || self.line() != line
        {
            None
        } else {
            Some(self.parse_expr()?)
        };
        Ok(Stmt::Return { expr, line })
    }

    fn parse_if(&mut self) -> Result<Stmt, CompileError> {
        let line = self.line();
        self.advance(); // if
        let cond = self.parse_expr()?;
        if !self.eat(&TokenKind::LBrace) {
            return Err(CompileError::new(
                CompileErrorKind::MalformedIf,
                "if requires a braced body",
                Some(line),
            ));
        }
        let then_body = self.parse_statements_until_rbrace()?;
        let else_body = if self.eat(&TokenKind::Else) {
            if *self.peek() == TokenKind::If {
                // `else if` is sugar for a nested if in the else arm.
                Some(vec![self.parse_if()?])
            } else if self.eat(&TokenKind::LBrace) {
                Some(self.parse_statements_until_rbrace()?)
            } else {
                return Err(CompileError::new(
                    CompileErrorKind::MalformedIf,
                    "else requires a braced body",
                    Some(self.line()),
                ));
            }
        } else {
            None
        };
        Ok(Stmt::If {
            cond,
            then_body,
            else_body,
            line,
        })
    }

    pub fn parse_expr(&mut self) -> Result<Expr, CompileError> {
        self.parse_equality()
    }

    fn parse_equality(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.parse_additive()?;
        while self.eat(&TokenKind::EqEq) {
            let rhs = self.parse_additive()?;
            lhs = Expr::Binary {
                lhs: Box::new(lhs),
                op: BinaryOp::Eq,
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.parse_primary()?;
        loop {
            match self.peek() {
                TokenKind::Plus => {
                    self.advance();
                    let rhs = self.parse_primary()?;
                    lhs = Expr::Binary {
                        lhs: Box::new(lhs),
                        op: BinaryOp::Add,
                        rhs: Box::new(rhs),
                    };
                }
                TokenKind::Unknown(c) if is_operator_char(*c) => {
                    return Err(CompileError::new(
                        CompileErrorKind::UnsupportedOperator,
                        format!("Unsupported operator '{c}'"),
                        Some(self.line()),
                    ))
                }
                _ => return Ok(lhs),
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, CompileError> {
        let line = self.line();
        let token = self.advance();
        match token.kind {
            TokenKind::Int(value) => Ok(Expr::Int(value)),
            TokenKind::Float(value) => Ok(Expr::Float(value)),
            TokenKind::Str(value) => Ok(Expr::Str(value)),
            TokenKind::True => Ok(Expr::Bool(true)),
            TokenKind::False => Ok(Expr::Bool(false)),
            TokenKind::Ident(name) => {
                if *self.peek() == TokenKind::LParen {
                    self.advance();
                    let args = self.parse_call_args(&name)?;
                    Ok(Expr::Call { name, args })
                } else {
                    Ok(Expr::Ident(name))
                }
            }
            TokenKind::LParen => {
                let expr = self.parse_expr()?;
                if !self.eat(&TokenKind::RParen) {
                    return Err(CompileError::unsupported(
                        "expected ')' to close grouping",
                        self.line(),
                    ));
                }
                Ok(expr)
            }
            TokenKind::Unknown(c) if is_operator_char(c) => Err(CompileError::new(
                CompileErrorKind::UnsupportedOperator,
                format!("Unsupported operator '{c}'"),
                Some(line),
            )),
            other => Err(CompileError::unsupported(
                format!("Unsupported expression at {}", describe(&other)),
                line,
            )),
        }
    }

    /// Parse call arguments, stripping `label:` prefixes.
    fn parse_call_args(&mut self, func: &str) -> Result<Vec<Expr>, CompileError> {
        let mut args = Vec::new();
        if self.eat(&TokenKind::RParen) {
            return Ok(args);
        }
        loop {
            if matches!(self.peek(), TokenKind::Ident(_)) && *self.peek_next() == TokenKind::Colon {
                self.advance();
                self.advance();
            }
            args.push(self.parse_expr()?);
            if self.eat(&TokenKind::Comma) {
                continue;
            }
            if self.eat(&TokenKind::RParen) {
                return Ok(args);
            }
            return Err(CompileError::unsupported(
                format!("expected ',' or ')' in arguments of '{func}'"),
                self.line(),
            ));
        }
    }
}

fn is_operator_char(c: char) -> bool {
    matches!(
        c,
        '-' | '*' | '/' | '%' | '<' | '>' | '!' | '&' | '|' | '^' | '.' | '?'
    )
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Ident(name) => format!("'{name}'"),
        TokenKind::Int(value) => format!("'{value}'"),
        TokenKind::Float(value) => format!("'{value}'"),
        TokenKind::Str(_) => "string literal".to_string(),
        TokenKind::Unknown(c) => format!("'{c}'"),
        TokenKind::Eof => "end of input".to_string(),
        other => format!("{other:?}"),
    }
}
