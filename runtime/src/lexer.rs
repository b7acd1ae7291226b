//! Lexer: converts script source into a token stream with 1-based lines.
//!
//! The scanner is total over almost any input: characters that do not belong
//! to the surface grammar become [`TokenKind::Unknown`] tokens instead of
//! failing, so files may carry unsupported constructs between function
//! declarations.  The parser decides whether an unknown token is skippable
//! (top level) or an error (inside a function body).

use crate::error::CompileError;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Keywords
    Func,
    Let,
    Return,
    If,
    Else,
    True,
    False,
    // Literals and names
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    // Punctuation
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Semicolon,
    Equal,
    EqEq,
    Plus,
    /// Any character outside the surface grammar.
    Unknown(char),
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: u32,
}

/// Streaming character scanner.
pub struct Lexer {
    src: Vec<char>,
    pos: usize,
    line: u32,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self {
            src: input.chars().collect(),
            pos: 0,
            line: 1,
        }
    }

    fn peek(&self) -> Option<char> {
        self.src.get(self.pos).copied()
    }

    fn peek_next(&self) -> Option<char> {
        self.src.get(self.pos + 1).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.src.get(self.pos).copied();
        if let Some(c) = ch {
            self.pos += 1;
            if c == '\n' {
                self.line += 1;
            }
        }
        ch
    }

    fn skip_whitespace_and_comments(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.advance();
            } else if c == '/' && self.peek_next() == Some('/') {
                while let Some(c2) = self.peek() {
                    if c2 == '\n' {
                        break;
                    }
                    self.advance();
                }
            } else {
                break;
            }
        }
    }

    fn read_number(&mut self) -> Result<Token, CompileError> {
        let line = self.line;
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }
        let is_float = self.peek() == Some('.')
            && self.peek_next().map(|c| c.is_ascii_digit()).unwrap_or(false);
        if is_float {
            text.push('.');
            self.advance();
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    text.push(c);
                    self.advance();
                } else {
                    break;
                }
            }
            let value: f64 = text
                .parse()
                .map_err(|_| CompileError::unsupported(format!("Unsupported number '{text}'"), line))?;
            return Ok(Token {
                kind: TokenKind::Float(value),
                line,
            });
        }
        let value: i64 = text.parse().map_err(|_| {
            CompileError::unsupported(format!("integer literal '{text}' out of range"), line)
        })?;
        Ok(Token {
            kind: TokenKind::Int(value),
            line,
        })
    }

    fn read_ident_or_keyword(&mut self) -> Token {
        let line = self.line;
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }
        let kind = match text.as_str() {
            "func" => TokenKind::Func,
            "let" => TokenKind::Let,
            "return" => TokenKind::Return,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            _ => TokenKind::Ident(text),
        };
        Token { kind, line }
    }

    fn read_string(&mut self) -> Result<Token, CompileError> {
        let line = self.line;
        let mut text = String::new();
        while let Some(c) = self.advance() {
            match c {
                '"' => {
                    return Ok(Token {
                        kind: TokenKind::Str(text),
                        line,
                    })
                }
                '\\' => match self.advance() {
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some('r') => text.push('\r'),
                    Some('\\') => text.push('\\'),
                    Some('"') => text.push('"'),
                    Some(other) => text.push(other),
                    None => {
                        return Err(CompileError::unsupported("unterminated string literal", line))
                    }
                },
                other => text.push(other),
            }
        }
        Err(CompileError::unsupported("unterminated string literal", line))
    }

    /// Tokenize the entire input, ending with an `Eof` token.
    pub fn tokenize(mut self) -> Result<Vec<Token>, CompileError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace_and_comments();
            let line = self.line;
            let token = match self.peek() {
                None => {
                    tokens.push(Token {
                        kind: TokenKind::Eof,
                        line,
                    });
                    break;
                }
                Some('(') => {
                    self.advance();
                    Token {
                        kind: TokenKind::LParen,
                        line,
                    }
                }
                Some(')') => {
                    self.advance();
                    Token {
                        kind: TokenKind::RParen,
                        line,
                    }
                }
                Some('{') => {
                    self.advance();
                    Token {
                        kind: TokenKind::LBrace,
                        line,
                    }
                }
                Some('}') => {
                    self.advance();
                    Token {
                        kind: TokenKind::RBrace,
                        line,
                    }
                }
                Some(',') => {
                    self.advance();
                    Token {
                        kind: TokenKind::Comma,
                        line,
                    }
                }
                Some(':') => {
                    self.advance();
                    Token {
                        kind: TokenKind::Colon,
                        line,
                    }
                }
                Some(';') => {
                    self.advance();
                    Token {
                        kind: TokenKind::Semicolon,
                        line,
                    }
                }
                Some('+') => {
                    self.advance();
                    Token {
                        kind: TokenKind::Plus,
                        line,
                    }
                }
                Some('=') => {
                    if self.peek_next() == Some('=') {
                        self.advance();
                        self.advance();
                        Token {
                            kind: TokenKind::EqEq,
                            line,
                        }
                    } else {
                        self.advance();
                        Token {
                            kind: TokenKind::Equal,
                            line,
                        }
                    }
                }
                Some('"') => {
                    self.advance();
                    self.read_string()?
                }
                Some(c) if c.is_ascii_digit() => self.read_number()?,
                Some(c) if c.is_ascii_alphabetic() || c == '_' => self.read_ident_or_keyword(),
                Some(other) => {
                    self.advance();
                    Token {
                        kind: TokenKind::Unknown(other),
                        line,
                    }
                }
            };
            tokens.push(token);
        }
        Ok(tokens)
    }
}
