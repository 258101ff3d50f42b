use crate::frontend::{
    SourceFile, SyntaxError,
    ast::{BinaryOperatorKind, Block, Expression, Program, Statement, UnaryOperatorKind},
    lexer::{Keyword, Lexer, Span, Token, TokenKind},
};

type ParseResult<T> = Result<T, SyntaxError>;

#[derive(Debug)]
pub struct Parser<'source> {
    lexer: Lexer<'source>,
}

impl<'source> Parser<'source> {
    pub fn parse_program(source_file: &'source SourceFile) -> ParseResult<Program> {
        let mut parser = Self {
            lexer: Lexer::new(source_file),
        };

        let mut statements = Vec::new();

        while parser.lexer.peek()?.is_some() {
            statements.push(parser.parse_statement()?);
        }

        Ok(Program { statements })
    }

    fn source(&self) -> &'source SourceFile {
        self.lexer.source()
    }

    fn expect_peek(&mut self, expecting: &str) -> ParseResult<Token> {
        match self.lexer.peek()? {
            Some(token) => Ok(token),
            None => Err(SyntaxError::new(
                self.lexer.eof_span(),
                format!("Expected {expecting} but reached end of file"),
            )),
        }
    }

    fn expect_next(&mut self, expecting: &str) -> ParseResult<Token> {
        match self.lexer.next()? {
            Some(token) => Ok(token),
            None => Err(SyntaxError::new(
                self.lexer.eof_span(),
                format!("Expected {expecting} but reached end of file"),
            )),
        }
    }

    fn expect_next_to_be(&mut self, kind: TokenKind) -> ParseResult<Token> {
        let token = self.expect_next(&format!("{kind:?}"))?;

        if token.kind != kind {
            return Err(SyntaxError::new(
                token.span,
                format!(
                    "Expected {:?} but found {:?} ({})",
                    kind,
                    token.kind,
                    self.source().value_of_span(token.span)
                ),
            ));
        }

        Ok(token)
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> ParseResult<Token> {
        self.expect_next_to_be(TokenKind::Keyword(keyword))
    }

    fn next_is(&mut self, kind: TokenKind) -> ParseResult<bool> {
        Ok(self.lexer.peek()?.is_some_and(|t| t.kind == kind))
    }

    fn unexpected(&self, token: &Token, expecting: &str) -> SyntaxError {
        SyntaxError::new(
            token.span,
            format!(
                "Expected {expecting} but found: {} ({:?})",
                self.source().value_of_span(token.span),
                token.kind
            ),
        )
    }

    fn parse_identifier(&mut self) -> ParseResult<String> {
        let token = self.expect_next_to_be(TokenKind::Identifier)?;

        Ok(self.source().value_of_span(token.span).to_owned())
    }

    // "{" ( statement )* "}"
    fn parse_block(&mut self) -> ParseResult<Block> {
        let mut statements = Vec::new();

        self.expect_next_to_be(TokenKind::OpenBrace)?;

        while self.expect_peek("statement or closing brace")?.kind != TokenKind::CloseBrace {
            statements.push(self.parse_statement()?);
        }

        self.expect_next_to_be(TokenKind::CloseBrace)?;

        Ok(statements)
    }

    fn parse_statement(&mut self) -> ParseResult<Statement> {
        let peeked = self.expect_peek("statement")?;

        match peeked.kind {
            TokenKind::Keyword(Keyword::Let) => {
                self.expect_keyword(Keyword::Let)?;
                let name = self.parse_identifier()?;
                self.expect_next_to_be(TokenKind::Equals)?;
                let value = self.parse_expression()?;
                self.expect_next_to_be(TokenKind::Semicolon)?;

                Ok(Statement::Let { name, value })
            }
            TokenKind::Identifier => {
                let name = self.parse_identifier()?;
                self.expect_next_to_be(TokenKind::Equals)?;
                let value = self.parse_expression()?;
                self.expect_next_to_be(TokenKind::Semicolon)?;

                Ok(Statement::Assign { name, value })
            }
            TokenKind::Keyword(Keyword::Output) => {
                self.expect_keyword(Keyword::Output)?;
                let value = self.parse_expression()?;
                self.expect_next_to_be(TokenKind::Semicolon)?;

                Ok(Statement::Output(value))
            }
            TokenKind::Keyword(Keyword::If) => self.parse_if_statement(),
            TokenKind::Keyword(Keyword::While) => {
                self.expect_keyword(Keyword::While)?;
                let condition = self.parse_expression()?;
                let body = self.parse_block()?;

                Ok(Statement::While { condition, body })
            }
            TokenKind::Keyword(Keyword::For) => self.parse_for_statement(),
            TokenKind::Keyword(Keyword::Function) => self.parse_function_declaration(),
            TokenKind::Keyword(Keyword::Return) => {
                self.expect_keyword(Keyword::Return)?;
                let value = self.parse_expression()?;
                self.expect_next_to_be(TokenKind::Semicolon)?;

                Ok(Statement::Return(value))
            }
            TokenKind::Keyword(Keyword::Try) => {
                self.expect_keyword(Keyword::Try)?;
                let body = self.parse_block()?;
                self.expect_keyword(Keyword::Catch)?;
                let handler = self.parse_block()?;

                Ok(Statement::TryCatch { body, handler })
            }
            _ => Err(self.unexpected(&peeked, "statement")),
        }
    }

    // "if" expression block ( "else" ( block | if ) )?
    fn parse_if_statement(&mut self) -> ParseResult<Statement> {
        self.expect_keyword(Keyword::If)?;

        let condition = self.parse_expression()?;
        let positive = self.parse_block()?;

        let negative = if self.next_is(TokenKind::Keyword(Keyword::Else))? {
            self.expect_keyword(Keyword::Else)?;

            // `else if` nests the chained conditional inside the else block
            if self.next_is(TokenKind::Keyword(Keyword::If))? {
                vec![self.parse_if_statement()?]
            } else {
                self.parse_block()?
            }
        } else {
            Vec::new()
        };

        Ok(Statement::If {
            condition,
            positive,
            negative,
        })
    }

    // "for" IDENT "=" integer "to" integer block
    fn parse_for_statement(&mut self) -> ParseResult<Statement> {
        self.expect_keyword(Keyword::For)?;

        let variable = self.parse_identifier()?;
        self.expect_next_to_be(TokenKind::Equals)?;
        let start = self.parse_integer_bound()?;
        self.expect_keyword(Keyword::To)?;
        let end = self.parse_integer_bound()?;
        let body = self.parse_block()?;

        Ok(Statement::For {
            variable,
            start,
            end,
            body,
        })
    }

    // "-"? INTEGER
    fn parse_integer_bound(&mut self) -> ParseResult<i32> {
        let negative = self.next_is(TokenKind::Minus)?;
        let minus = if negative {
            Some(self.expect_next_to_be(TokenKind::Minus)?)
        } else {
            None
        };

        let token = self.expect_next("integer loop bound")?;
        if token.kind != TokenKind::IntegerLiteral {
            return Err(self.unexpected(&token, "integer loop bound"));
        }

        let start = minus.map_or(token.span.start, |m| m.span.start);
        let span = Span::new(start, token.span.end);
        self.parse_integer(span, negative, token.span)
    }

    fn parse_integer(&self, span: Span, negative: bool, digits: Span) -> ParseResult<i32> {
        let digits = self.source().value_of_span(digits);

        let value = if negative {
            format!("-{digits}").parse::<i32>()
        } else {
            digits.parse::<i32>()
        };

        value.map_err(|_| SyntaxError::new(span, "Integer literal does not fit in 32 bits"))
    }

    fn parse_float(&self, span: Span, negative: bool, digits: Span) -> ParseResult<f32> {
        let digits = self.source().value_of_span(digits);

        // `3.` and `.5` are valid chainlang floats, Rust wants digits on both
        // sides of the dot
        let normalized = format!(
            "{}0{}0",
            if negative { "-" } else { "" },
            digits
        );

        normalized
            .parse::<f32>()
            .map_err(|_| SyntaxError::new(span, "Malformed float literal"))
    }

    // "function" IDENT "(" ( IDENT ( "," IDENT )* )? ")" block
    fn parse_function_declaration(&mut self) -> ParseResult<Statement> {
        self.expect_keyword(Keyword::Function)?;

        let name = self.parse_identifier()?;
        let mut parameters = Vec::new();

        self.expect_next_to_be(TokenKind::OpenParen)?;

        if self.expect_peek("parameter or closing paren")?.kind != TokenKind::CloseParen {
            parameters.push(self.parse_identifier()?);

            while self.next_is(TokenKind::Comma)? {
                self.expect_next_to_be(TokenKind::Comma)?;
                parameters.push(self.parse_identifier()?);
            }
        }

        self.expect_next_to_be(TokenKind::CloseParen)?;

        let body = self.parse_block()?;

        Ok(Statement::FunctionDeclaration {
            name,
            parameters,
            body,
        })
    }

    /// expression     -> logical_or
    /// logical_or     -> logical_and ( "||" logical_and )*
    /// logical_and    -> comparison ( "&&" comparison )*
    /// comparison     -> term ( ( "!=" | "==" | "<" | "<=" | ">" | ">=" ) term )*
    /// term           -> factor ( ( "-" | "+" ) factor )*
    /// factor         -> unary ( ( "/" | "*" ) unary )*
    /// unary          -> "!" unary
    ///                   | function_call
    /// function_call  -> IDENT "(" ( expression ( "," expression )* )? ")"
    ///                   | atom
    /// atom           -> IDENT | NUMBER | "-" NUMBER | "true" | "false"
    ///                   | "(" expression ")"
    fn parse_expression(&mut self) -> ParseResult<Expression> {
        self.parse_logical_or_expression()
    }

    fn parse_logical_or_expression(&mut self) -> ParseResult<Expression> {
        let mut expression = self.parse_logical_and_expression()?;

        while self.next_is(TokenKind::LogicalOr)? {
            self.expect_next_to_be(TokenKind::LogicalOr)?;
            let rhs = self.parse_logical_and_expression()?;

            expression = Expression::binary(expression, BinaryOperatorKind::LogicalOr, rhs);
        }

        Ok(expression)
    }

    fn parse_logical_and_expression(&mut self) -> ParseResult<Expression> {
        let mut expression = self.parse_comparison_expression()?;

        while self.next_is(TokenKind::LogicalAnd)? {
            self.expect_next_to_be(TokenKind::LogicalAnd)?;
            let rhs = self.parse_comparison_expression()?;

            expression = Expression::binary(expression, BinaryOperatorKind::LogicalAnd, rhs);
        }

        Ok(expression)
    }

    fn parse_comparison_expression(&mut self) -> ParseResult<Expression> {
        let mut expression = self.parse_term_expression()?;

        while self
            .lexer
            .peek()?
            .is_some_and(|t| t.kind.is_comparison_operator())
        {
            let operator = match self.expect_next("comparison operator")?.kind {
                TokenKind::NotEquals => BinaryOperatorKind::NotEquals,
                TokenKind::DoubleEquals => BinaryOperatorKind::Equals,
                TokenKind::LessThan => BinaryOperatorKind::LessThan,
                TokenKind::LessThanOrEqualTo => BinaryOperatorKind::LessThanOrEqualTo,
                TokenKind::GreaterThan => BinaryOperatorKind::GreaterThan,
                TokenKind::GreaterThanOrEqualTo => BinaryOperatorKind::GreaterThanOrEqualTo,
                _ => unreachable!(),
            };
            let rhs = self.parse_term_expression()?;

            expression = Expression::binary(expression, operator, rhs);
        }

        Ok(expression)
    }

    fn parse_term_expression(&mut self) -> ParseResult<Expression> {
        let mut expression = self.parse_factor_expression()?;

        while self.lexer.peek()?.is_some_and(|t| t.kind.is_term_operator()) {
            let operator = match self.expect_next("term operator")?.kind {
                TokenKind::Plus => BinaryOperatorKind::Add,
                TokenKind::Minus => BinaryOperatorKind::Subtract,
                _ => unreachable!(),
            };
            let rhs = self.parse_factor_expression()?;

            expression = Expression::binary(expression, operator, rhs);
        }

        Ok(expression)
    }

    fn parse_factor_expression(&mut self) -> ParseResult<Expression> {
        let mut expression = self.parse_unary_expression()?;

        while self
            .lexer
            .peek()?
            .is_some_and(|t| t.kind.is_factor_operator())
        {
            let operator = match self.expect_next("factor operator")?.kind {
                TokenKind::Asterisk => BinaryOperatorKind::Multiply,
                TokenKind::Divide => BinaryOperatorKind::Divide,
                _ => unreachable!(),
            };
            let rhs = self.parse_unary_expression()?;

            expression = Expression::binary(expression, operator, rhs);
        }

        Ok(expression)
    }

    fn parse_unary_expression(&mut self) -> ParseResult<Expression> {
        if self.next_is(TokenKind::Bang)? {
            self.expect_next_to_be(TokenKind::Bang)?;
            let operand = self.parse_unary_expression()?;

            return Ok(Expression::Unary {
                operator: UnaryOperatorKind::LogicalNot,
                operand: Box::new(operand),
            });
        }

        self.parse_atom()
    }

    fn parse_atom(&mut self) -> ParseResult<Expression> {
        let token = self.expect_next("expression")?;

        match token.kind {
            TokenKind::IntegerLiteral => self
                .parse_integer(token.span, false, token.span)
                .map(Expression::IntLiteral),
            TokenKind::FloatLiteral => self
                .parse_float(token.span, false, token.span)
                .map(Expression::FloatLiteral),
            // Negative number literals
            TokenKind::Minus => {
                let number = self.expect_next("number after minus sign")?;
                let span = Span::new(token.span.start, number.span.end);

                match number.kind {
                    TokenKind::IntegerLiteral => self
                        .parse_integer(span, true, number.span)
                        .map(Expression::IntLiteral),
                    TokenKind::FloatLiteral => self
                        .parse_float(span, true, number.span)
                        .map(Expression::FloatLiteral),
                    _ => Err(self.unexpected(&number, "number after minus sign")),
                }
            }
            TokenKind::Keyword(Keyword::True) => Ok(Expression::IntLiteral(1)),
            TokenKind::Keyword(Keyword::False) => Ok(Expression::IntLiteral(0)),
            TokenKind::Identifier => {
                let name = self.source().value_of_span(token.span).to_owned();

                if !self.next_is(TokenKind::OpenParen)? {
                    return Ok(Expression::Variable(name));
                }

                self.expect_next_to_be(TokenKind::OpenParen)?;

                let mut arguments = Vec::new();

                if self.expect_peek("argument or closing paren")?.kind != TokenKind::CloseParen {
                    arguments.push(self.parse_expression()?);

                    while self.next_is(TokenKind::Comma)? {
                        self.expect_next_to_be(TokenKind::Comma)?;
                        arguments.push(self.parse_expression()?);
                    }
                }

                self.expect_next_to_be(TokenKind::CloseParen)?;

                Ok(Expression::FunctionCall { name, arguments })
            }
            TokenKind::OpenParen => {
                let expression = self.parse_expression()?;
                self.expect_next_to_be(TokenKind::CloseParen)?;

                Ok(expression)
            }
            _ => Err(self.unexpected(&token, "expression")),
        }
    }
}
