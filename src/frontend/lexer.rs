use std::{
    collections::{BTreeMap, VecDeque},
    str::Chars,
};

use itertools::{PeekNth, peek_nth};
use once_cell::sync::Lazy;
use strum::EnumString;

use super::{SourceFile, SyntaxError};

#[derive(Debug)]
pub struct Lexer<'source> {
    source: &'source SourceFile,
    position: usize,
    chars: PeekNth<Chars<'source>>,
    peek_buffer: VecDeque<Token>,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /* Words */
    Keyword(Keyword), // let
    Identifier,       // counter

    /* Literals */
    IntegerLiteral, // 1
    FloatLiteral,   // 1.0

    /* Delimiters */
    OpenParen,  // (
    CloseParen, // )
    OpenBrace,  // {
    CloseBrace, // }
    Semicolon,  // ;
    Comma,      // ,

    /* Unary Ops */
    Bang, // !

    /* Binary Ops */
    Plus,                 // +
    Minus,                // -
    Asterisk,             // *
    Divide,               // /
    LogicalAnd,           // &&
    LogicalOr,            // ||
    DoubleEquals,         // ==
    NotEquals,            // !=
    LessThan,             // <
    LessThanOrEqualTo,    // <=
    GreaterThan,          // >
    GreaterThanOrEqualTo, // >=

    /* Assignment */
    Equals, // =
}

impl TokenKind {
    pub fn is_comparison_operator(&self) -> bool {
        matches!(
            self,
            Self::NotEquals
                | Self::DoubleEquals
                | Self::LessThan
                | Self::LessThanOrEqualTo
                | Self::GreaterThan
                | Self::GreaterThanOrEqualTo
        )
    }

    pub fn is_term_operator(&self) -> bool {
        matches!(self, Self::Plus | Self::Minus)
    }

    pub fn is_factor_operator(&self) -> bool {
        matches!(self, Self::Asterisk | Self::Divide)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Keyword {
    Let,
    Output,
    If,
    Else,
    While,
    For,
    To,
    Function,
    Return,
    Try,
    Catch,
    True,
    False,
}

/// Table of single char tokens (matched after longer sequences are checked for)
static SINGLE_TOKENS: Lazy<BTreeMap<char, TokenKind>> = Lazy::new(|| {
    BTreeMap::from([
        ('(', TokenKind::OpenParen),
        (')', TokenKind::CloseParen),
        ('{', TokenKind::OpenBrace),
        ('}', TokenKind::CloseBrace),
        (';', TokenKind::Semicolon),
        (',', TokenKind::Comma),
        ('!', TokenKind::Bang),
        ('*', TokenKind::Asterisk),
        ('-', TokenKind::Minus),
        ('=', TokenKind::Equals),
        ('+', TokenKind::Plus),
        ('/', TokenKind::Divide),
        ('<', TokenKind::LessThan),
        ('>', TokenKind::GreaterThan),
    ])
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

impl<'source> Lexer<'source> {
    pub fn new(source: &'source SourceFile) -> Self {
        Self {
            source,
            chars: peek_nth(source.contents.chars()),
            position: 0,
            peek_buffer: VecDeque::new(),
        }
    }

    pub fn source(&self) -> &'source SourceFile {
        self.source
    }

    /// Span of the end of input, used to locate "unexpected end of file"
    pub fn eof_span(&self) -> Span {
        Span::new(self.source.contents.len(), self.source.contents.len())
    }

    fn ignore_whitespace(&mut self) {
        while let Some(c) = self.chars.peek().copied() {
            if !c.is_ascii_whitespace() {
                break;
            }

            self.chars.next();
            self.position += 1;
        }
    }

    fn ignore_line(&mut self) {
        while let Some(c) = self.chars.peek().copied() {
            if c == '\n' {
                break;
            }

            self.chars.next();
            self.position += 1;
        }
    }

    // Keyword or identifier
    fn read_word(&mut self) -> Token {
        let start_position = self.position;

        while let Some(c) = self.chars.peek().copied() {
            if !(c.is_ascii_alphanumeric() || c == '_') {
                break;
            }

            self.chars.next();
            self.position += 1;
        }

        let span = self.new_span(start_position);
        let value = self.source.value_of_span(span);

        let kind = match value.parse() {
            Ok(keyword) => TokenKind::Keyword(keyword),
            Err(_) => TokenKind::Identifier,
        };

        Token { kind, span }
    }

    fn read_number(&mut self) -> Token {
        let start_position = self.position;
        let mut kind = TokenKind::IntegerLiteral;

        while let Some(c) = self.chars.peek().copied() {
            if c == '.' {
                kind = TokenKind::FloatLiteral;
                self.read_decimal_part();
                break;
            }

            if !c.is_ascii_digit() {
                break;
            }

            self.chars.next();
            self.position += 1;
        }

        Token {
            kind,
            span: self.new_span(start_position),
        }
    }

    fn read_decimal_part(&mut self) -> Token {
        let start_position = self.position;

        // Consume the dot
        self.chars.next();
        self.position += 1;

        while let Some(c) = self.chars.peek().copied() {
            if !c.is_ascii_digit() {
                break;
            }

            self.chars.next();
            self.position += 1;
        }

        Token {
            kind: TokenKind::FloatLiteral,
            span: self.new_span(start_position),
        }
    }

    fn read_single(&mut self, kind: TokenKind) -> Token {
        let start_position = self.position;

        self.chars.next();
        self.position += 1;

        Token {
            kind,
            span: self.new_span(start_position),
        }
    }

    fn read_double(&mut self, kind: TokenKind) -> Token {
        let start_position = self.position;

        self.chars.next();
        self.chars.next();

        self.position += 2;

        Token {
            kind,
            span: self.new_span(start_position),
        }
    }

    fn new_span(&self, start: usize) -> Span {
        Span {
            start,
            end: self.position,
        }
    }

    fn next_is(&mut self, n: usize, expected: char) -> bool {
        self.chars.peek_nth(n).is_some_and(|c| *c == expected)
    }

    pub fn peek(&mut self) -> Result<Option<Token>, SyntaxError> {
        if let Some(token) = self.peek_buffer.front() {
            return Ok(Some(token.clone()));
        }

        if let Some(token) = self.next()? {
            self.peek_buffer.push_back(token);
        }

        Ok(self.peek_buffer.front().cloned())
    }

    pub fn next(&mut self) -> Result<Option<Token>, SyntaxError> {
        if let Some(token) = self.peek_buffer.pop_front() {
            return Ok(Some(token));
        }

        while let Some(c) = self.chars.peek().copied() {
            if !c.is_ascii() {
                return Err(SyntaxError::new(
                    Span::new(self.position, self.position + c.len_utf8()),
                    format!("Unexpected non-ascii character in stream: `{c}`"),
                ));
            }

            let token = match c {
                // Ignore whitespace
                c if c.is_ascii_whitespace() => {
                    self.ignore_whitespace();
                    continue;
                }
                // Ignore comments
                '/' if self.next_is(1, '/') => {
                    self.ignore_line();
                    continue;
                }

                // Integer and float literals
                n if n.is_ascii_digit() => self.read_number(),
                '.' if self.chars.peek_nth(1).is_some_and(|c| c.is_ascii_digit()) => {
                    self.read_decimal_part()
                }

                // Identifiers and keywords
                a if a.is_ascii_alphabetic() || a == '_' => self.read_word(),

                // Double Equals (==)
                '=' if self.next_is(1, '=') => self.read_double(TokenKind::DoubleEquals),
                // Not Equals (!=)
                '!' if self.next_is(1, '=') => self.read_double(TokenKind::NotEquals),
                // Less than or equal (<=)
                '<' if self.next_is(1, '=') => self.read_double(TokenKind::LessThanOrEqualTo),
                // Greater than or equal (>=)
                '>' if self.next_is(1, '=') => {
                    self.read_double(TokenKind::GreaterThanOrEqualTo)
                }
                // Logical And (&&)
                '&' if self.next_is(1, '&') => self.read_double(TokenKind::LogicalAnd),
                // Logical Or (||)
                '|' if self.next_is(1, '|') => self.read_double(TokenKind::LogicalOr),

                s => match SINGLE_TOKENS.get(&s) {
                    Some(kind) => self.read_single(*kind),
                    None => {
                        return Err(SyntaxError::new(
                            Span::new(self.position, self.position + 1),
                            format!("Unexpected character in stream: `{s}`"),
                        ));
                    }
                },
            };

            return Ok(Some(token));
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let source = SourceFile::from_memory(source);
        let mut lexer = Lexer::new(&source);
        let mut kinds = Vec::new();

        while let Some(token) = lexer.next().unwrap() {
            kinds.push(token.kind);
        }

        kinds
    }

    #[test]
    fn lexes_keywords_and_identifiers() {
        assert_eq!(
            kinds("let output_count = 1;"),
            vec![
                TokenKind::Keyword(Keyword::Let),
                TokenKind::Identifier,
                TokenKind::Equals,
                TokenKind::IntegerLiteral,
                TokenKind::Semicolon,
            ]
        );
    }

    #[test]
    fn prefers_double_character_operators() {
        assert_eq!(
            kinds("a <= b != c && d || !e == f"),
            vec![
                TokenKind::Identifier,
                TokenKind::LessThanOrEqualTo,
                TokenKind::Identifier,
                TokenKind::NotEquals,
                TokenKind::Identifier,
                TokenKind::LogicalAnd,
                TokenKind::Identifier,
                TokenKind::LogicalOr,
                TokenKind::Bang,
                TokenKind::Identifier,
                TokenKind::DoubleEquals,
                TokenKind::Identifier,
            ]
        );
    }

    #[test]
    fn lexes_float_literals() {
        assert_eq!(
            kinds("1.5 .25 3."),
            vec![
                TokenKind::FloatLiteral,
                TokenKind::FloatLiteral,
                TokenKind::FloatLiteral,
            ]
        );
    }

    #[test]
    fn skips_line_comments() {
        assert_eq!(
            kinds("// nothing here\noutput 1; // trailing"),
            vec![
                TokenKind::Keyword(Keyword::Output),
                TokenKind::IntegerLiteral,
                TokenKind::Semicolon,
            ]
        );
    }

    #[test]
    fn rejects_lone_ampersand() {
        let source = SourceFile::from_memory("a & b");
        let mut lexer = Lexer::new(&source);

        assert_eq!(lexer.next().unwrap().unwrap().kind, TokenKind::Identifier);

        let error = lexer.next().unwrap_err();
        assert_eq!(error.span, Span::new(2, 3));
    }
}
