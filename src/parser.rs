use crate::ast::{
    ArrayElement, DeclKind, Expr, IncDecOp, InfixOp, LogicalOp, Param, PrefixOp, Program, Stmt,
    SwitchCase,
};
use crate::error::{SableError, Span};
use crate::token::{Token, TokenType};

/// Operator ranks, loosest to tightest. The discriminant order is the
/// precedence table; `parse_precedence` keeps consuming infix operators while
/// the next token outranks the minimum.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
enum Precedence {
    Lowest,
    Assign,
    Ternary,
    Or,
    And,
    Equality,
    Comparison,
    Range,
    Sum,
    Product,
    Prefix,
    Call,
    Index,
    Dot,
}

fn token_precedence(token_type: &TokenType) -> Precedence {
    match token_type {
        TokenType::Equal
        | TokenType::PlusEqual
        | TokenType::MinusEqual
        | TokenType::StarEqual
        | TokenType::SlashEqual
        | TokenType::PercentEqual => Precedence::Assign,
        TokenType::Question => Precedence::Ternary,
        TokenType::Or | TokenType::PipePipe => Precedence::Or,
        TokenType::And | TokenType::AmpAmp => Precedence::And,
        TokenType::EqualEqual | TokenType::BangEqual => Precedence::Equality,
        TokenType::Less | TokenType::LessEqual | TokenType::Greater | TokenType::GreaterEqual => {
            Precedence::Comparison
        }
        TokenType::DotDot => Precedence::Range,
        TokenType::Plus | TokenType::Minus => Precedence::Sum,
        TokenType::Star | TokenType::Slash | TokenType::Percent => Precedence::Product,
        TokenType::LeftParen | TokenType::PlusPlus | TokenType::MinusMinus => Precedence::Call,
        TokenType::LeftBracket => Precedence::Index,
        TokenType::Dot => Precedence::Dot,
        _ => Precedence::Lowest,
    }
}

pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    errors: Vec<SableError>,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            current: 0,
            errors: Vec::new(),
        }
    }

    /// Parses the whole token stream. A failed construct is recorded and
    /// skipped, and parsing resumes at the next statement boundary, so one
    /// pass can surface several independent syntax errors.
    pub fn parse(&mut self) -> (Program, Vec<SableError>) {
        let mut statements = Vec::new();

        while !self.is_at_end() {
            match self.statement() {
                Ok(stmt) => statements.push(stmt),
                Err(err) => {
                    self.errors.push(err);
                    self.synchronize();
                }
            }
        }

        (Program { statements }, std::mem::take(&mut self.errors))
    }

    /// Skips to the most likely start of the next statement after an error.
    fn synchronize(&mut self) {
        while !self.is_at_end() {
            if self.previous_is(&TokenType::Semicolon) {
                return;
            }
            match self.peek().token_type {
                TokenType::Let
                | TokenType::Const
                | TokenType::Make
                | TokenType::Return
                | TokenType::Include
                | TokenType::Struct
                | TokenType::Enum
                | TokenType::Define
                | TokenType::If
                | TokenType::While
                | TokenType::For
                | TokenType::Switch
                | TokenType::Try => return,
                _ => {}
            }
            self.advance();
        }
    }

    fn previous_is(&self, token_type: &TokenType) -> bool {
        self.current > 0 && &self.tokens[self.current - 1].token_type == token_type
    }

    // ---- statements ----

    fn statement(&mut self) -> Result<Stmt, SableError> {
        if self.match_types(&[TokenType::Let]) {
            self.declaration(DeclKind::Let)
        } else if self.match_types(&[TokenType::Const]) {
            self.declaration(DeclKind::Const)
        } else if self.match_types(&[TokenType::Make]) {
            self.declaration(DeclKind::Make)
        } else if self.match_types(&[TokenType::Return]) {
            self.return_statement()
        } else if self.match_types(&[TokenType::Include]) {
            self.include_statement()
        } else if self.match_types(&[TokenType::Struct]) {
            self.struct_definition()
        } else if self.match_types(&[TokenType::Enum]) {
            self.enum_definition()
        } else if self.check(&TokenType::Define) && self.check_next(&TokenType::Identifier) {
            // `define name(...)` or `define Type.name(...)`; a bare
            // `define (...)` is an anonymous function expression instead.
            self.advance();
            self.define_statement()
        } else if self.check(&TokenType::LeftBrace) && !self.brace_starts_map() {
            self.advance();
            self.block_statement()
        } else {
            self.expression_statement()
        }
    }

    fn declaration(&mut self, kind: DeclKind) -> Result<Stmt, SableError> {
        let start = self.previous().span.clone();
        let name = self
            .consume(TokenType::Identifier, "Expected variable name")?
            .lexeme
            .clone();

        let ty = if self.match_types(&[TokenType::Colon]) {
            Some(
                self.consume(TokenType::Identifier, "Expected type name after ':'")?
                    .lexeme
                    .clone(),
            )
        } else {
            None
        };

        self.consume_with_help(
            TokenType::Equal,
            "Expected '=' in declaration",
            "Declarations require an initial value. Example: let x = 5".to_string(),
        )?;
        let value = self.expression()?;
        self.optional_semicolon();

        let span = start.to(&self.previous().span);
        Ok(Stmt::Declaration {
            kind,
            name,
            ty,
            value,
            span,
        })
    }

    fn return_statement(&mut self) -> Result<Stmt, SableError> {
        let start = self.previous().span.clone();

        let value = if self.check(&TokenType::Semicolon)
            || self.check(&TokenType::RightBrace)
            || self.is_at_end()
        {
            None
        } else {
            Some(self.expression()?)
        };
        self.optional_semicolon();

        let span = start.to(&self.previous().span);
        Ok(Stmt::Return { value, span })
    }

    fn include_statement(&mut self) -> Result<Stmt, SableError> {
        let start = self.previous().span.clone();
        let path = self
            .consume_with_help(
                TokenType::String,
                "Expected module name after 'include'",
                "Include takes a quoted module or file name. Example: include \"math\"".to_string(),
            )?
            .lexeme
            .clone();
        self.optional_semicolon();

        let span = start.to(&self.previous().span);
        Ok(Stmt::Include { path, span })
    }

    fn struct_definition(&mut self) -> Result<Stmt, SableError> {
        let start = self.previous().span.clone();
        let name = self
            .consume(TokenType::Identifier, "Expected struct name")?
            .lexeme
            .clone();
        self.consume(TokenType::LeftBrace, "Expected '{' after struct name")?;

        let mut fields = Vec::new();
        while !self.check(&TokenType::RightBrace) && !self.is_at_end() {
            let field = self
                .consume(TokenType::Identifier, "Expected field name")?
                .lexeme
                .clone();
            fields.push(field);
            if !self.match_types(&[TokenType::Comma]) {
                break;
            }
        }
        self.consume(TokenType::RightBrace, "Expected '}' after struct fields")?;

        let span = start.to(&self.previous().span);
        Ok(Stmt::StructDef { name, fields, span })
    }

    fn enum_definition(&mut self) -> Result<Stmt, SableError> {
        let start = self.previous().span.clone();
        let name = self
            .consume(TokenType::Identifier, "Expected enum name")?
            .lexeme
            .clone();
        self.consume(TokenType::LeftBrace, "Expected '{' after enum name")?;

        let mut variants = Vec::new();
        while !self.check(&TokenType::RightBrace) && !self.is_at_end() {
            let variant = self
                .consume(TokenType::Identifier, "Expected variant name")?
                .lexeme
                .clone();
            variants.push(variant);
            if !self.match_types(&[TokenType::Comma]) {
                break;
            }
        }
        self.consume(TokenType::RightBrace, "Expected '}' after enum variants")?;

        let span = start.to(&self.previous().span);
        Ok(Stmt::EnumDef {
            name,
            variants,
            span,
        })
    }

    /// Called with `define` consumed and an identifier up next. A dot after
    /// the identifier makes this a method bound to a struct type name; plain
    /// `define name(...)` desugars to a let-binding of a function literal.
    fn define_statement(&mut self) -> Result<Stmt, SableError> {
        let start = self.previous().span.clone();
        let name = self
            .consume(TokenType::Identifier, "Expected function name")?
            .lexeme
            .clone();

        if self.match_types(&[TokenType::Dot]) {
            let method = self
                .consume(TokenType::Identifier, "Expected method name after '.'")?
                .lexeme
                .clone();
            let function = self.function_literal(start.clone())?;
            let span = start.to(function.span());
            return Ok(Stmt::MethodDef {
                type_name: name,
                name: method,
                function,
                span,
            });
        }

        let function = self.function_literal(start.clone())?;
        let span = start.to(function.span());
        Ok(Stmt::Declaration {
            kind: DeclKind::Let,
            name,
            ty: None,
            value: function,
            span,
        })
    }

    /// Parameter list, optional return type, block body. The caller has
    /// consumed everything up to the '('.
    fn function_literal(&mut self, start: Span) -> Result<Expr, SableError> {
        self.consume(TokenType::LeftParen, "Expected '(' before parameters")?;
        let params = self.parameter_list()?;

        let ret = if self.match_types(&[TokenType::Colon]) {
            Some(
                self.consume(TokenType::Identifier, "Expected return type after ':'")?
                    .lexeme
                    .clone(),
            )
        } else {
            None
        };

        self.consume(TokenType::LeftBrace, "Expected '{' before function body")?;
        let body = self.block_statement()?;
        let span = start.to(body.span());

        Ok(Expr::FunctionLit {
            params,
            ret,
            body: Box::new(body),
            span,
        })
    }

    fn parameter_list(&mut self) -> Result<Vec<Param>, SableError> {
        let mut params = Vec::new();

        if !self.check(&TokenType::RightParen) {
            loop {
                let name_token = self
                    .consume(TokenType::Identifier, "Expected parameter name")?
                    .clone();
                let ty = if self.match_types(&[TokenType::Colon]) {
                    Some(
                        self.consume(TokenType::Identifier, "Expected type name after ':'")?
                            .lexeme
                            .clone(),
                    )
                } else {
                    None
                };
                params.push(Param {
                    name: name_token.lexeme,
                    ty,
                    span: name_token.span,
                });

                if !self.match_types(&[TokenType::Comma]) {
                    break;
                }
            }
        }

        self.consume(TokenType::RightParen, "Expected ')' after parameters")?;
        Ok(params)
    }

    /// Called with the '{' already consumed.
    fn block_statement(&mut self) -> Result<Stmt, SableError> {
        let start = self.previous().span.clone();
        let mut statements = Vec::new();

        while !self.check(&TokenType::RightBrace) && !self.is_at_end() {
            statements.push(self.statement()?);
        }

        self.consume_with_help(
            TokenType::RightBrace,
            "Expected '}' after block",
            "Blocks must be closed with '}' after the opening '{'.".to_string(),
        )?;

        let span = start.to(&self.previous().span);
        Ok(Stmt::Block { statements, span })
    }

    fn expression_statement(&mut self) -> Result<Stmt, SableError> {
        let start = self.peek().span.clone();
        let expr = self.expression()?;
        self.optional_semicolon();

        let span = start.to(&self.previous().span);
        Ok(Stmt::Expression { expr, span })
    }

    fn optional_semicolon(&mut self) {
        if self.check(&TokenType::Semicolon) {
            self.advance();
        }
    }

    // ---- expressions ----

    fn expression(&mut self) -> Result<Expr, SableError> {
        self.parse_precedence(Precedence::Lowest)
    }

    fn parse_precedence(&mut self, min: Precedence) -> Result<Expr, SableError> {
        let mut left = self.parse_prefix()?;

        while !self.is_at_end() && min < token_precedence(&self.peek().token_type) {
            left = self.parse_infix(left)?;
        }

        Ok(left)
    }

    fn parse_prefix(&mut self) -> Result<Expr, SableError> {
        if self.is_at_end() {
            return Err(SableError::parse_error_with_help(
                self.peek().span.clone(),
                "Unexpected end of input".to_string(),
                "Expected an expression here. Check for unmatched delimiters or an incomplete statement.".to_string(),
            ));
        }

        let token = self.advance().clone();

        match token.token_type {
            TokenType::Integer => {
                let value = token.lexeme.parse::<i64>().map_err(|_| {
                    SableError::parse_error(token.span.clone(), "Invalid integer".to_string())
                })?;
                Ok(Expr::IntegerLit {
                    value,
                    span: token.span,
                })
            }
            TokenType::Float => {
                let value = token.lexeme.parse::<f64>().map_err(|_| {
                    SableError::parse_error(token.span.clone(), "Invalid float".to_string())
                })?;
                Ok(Expr::FloatLit {
                    value,
                    span: token.span,
                })
            }
            TokenType::String => Ok(Expr::StringLit {
                value: token.lexeme,
                span: token.span,
            }),
            TokenType::Char => Ok(Expr::CharLit {
                value: token.lexeme.chars().next().unwrap_or('\0'),
                span: token.span,
            }),
            TokenType::True => Ok(Expr::BoolLit {
                value: true,
                span: token.span,
            }),
            TokenType::False => Ok(Expr::BoolLit {
                value: false,
                span: token.span,
            }),
            TokenType::Null => Ok(Expr::NullLit { span: token.span }),
            TokenType::Identifier => {
                if self.check(&TokenType::LeftBrace) && self.struct_literal_ahead(&token.lexeme) {
                    self.struct_literal(token)
                } else {
                    Ok(Expr::Identifier {
                        name: token.lexeme,
                        span: token.span,
                    })
                }
            }
            TokenType::Minus => self.prefix_expr(PrefixOp::Negate, token.span),
            TokenType::Bang | TokenType::Not => self.prefix_expr(PrefixOp::Not, token.span),
            TokenType::PlusPlus => self.prefix_expr(PrefixOp::Increment, token.span),
            TokenType::MinusMinus => self.prefix_expr(PrefixOp::Decrement, token.span),
            TokenType::LeftParen => {
                if self.arrow_function_ahead() {
                    self.arrow_function(token.span)
                } else {
                    let expr = self.expression()?;
                    self.consume_with_help(
                        TokenType::RightParen,
                        "Expected ')' after expression",
                        "Every opening parenthesis '(' must have a matching ')'.".to_string(),
                    )?;
                    Ok(expr)
                }
            }
            TokenType::LeftBracket => self.array_literal(token.span),
            TokenType::LeftBrace => self.map_literal(token.span),
            TokenType::Define => self.function_literal(token.span),
            TokenType::If => self.if_expression(token.span),
            TokenType::While => self.while_expression(token.span),
            TokenType::For => self.for_expression(token.span),
            TokenType::Switch => self.switch_expression(token.span),
            TokenType::Try => self.try_expression(token.span),
            TokenType::Break => Ok(Expr::Break { span: token.span }),
            TokenType::Continue => Ok(Expr::Continue { span: token.span }),
            _ => {
                let help = match token.token_type {
                    TokenType::RightParen => "Found ')' without a matching '('.",
                    TokenType::RightBrace => "Found '}' without a matching '{'.",
                    TokenType::RightBracket => "Found ']' without a matching '['.",
                    TokenType::Eof => "Reached end of input while expecting an expression.",
                    _ => "Expected a literal, identifier, or parenthesized expression here.",
                };
                Err(SableError::parse_error_with_help(
                    token.span,
                    format!(
                        "Expected expression, found {}",
                        token.token_type.describe()
                    ),
                    help.to_string(),
                ))
            }
        }
    }

    fn prefix_expr(&mut self, op: PrefixOp, start: Span) -> Result<Expr, SableError> {
        let operand = self.parse_precedence(Precedence::Prefix)?;
        let span = start.to(operand.span());
        Ok(Expr::Prefix {
            op,
            operand: Box::new(operand),
            span,
        })
    }

    fn parse_infix(&mut self, left: Expr) -> Result<Expr, SableError> {
        let token = self.advance().clone();

        match token.token_type {
            TokenType::Plus => self.binary(left, InfixOp::Add),
            TokenType::Minus => self.binary(left, InfixOp::Subtract),
            TokenType::Star => self.binary(left, InfixOp::Multiply),
            TokenType::Slash => self.binary(left, InfixOp::Divide),
            TokenType::Percent => self.binary(left, InfixOp::Modulo),
            TokenType::EqualEqual => self.binary(left, InfixOp::Equal),
            TokenType::BangEqual => self.binary(left, InfixOp::NotEqual),
            TokenType::Less => self.binary(left, InfixOp::Less),
            TokenType::LessEqual => self.binary(left, InfixOp::LessEqual),
            TokenType::Greater => self.binary(left, InfixOp::Greater),
            TokenType::GreaterEqual => self.binary(left, InfixOp::GreaterEqual),
            TokenType::And | TokenType::AmpAmp => self.logical(left, LogicalOp::And),
            TokenType::Or | TokenType::PipePipe => self.logical(left, LogicalOp::Or),
            TokenType::Equal => self.assignment(left, &token, None),
            TokenType::PlusEqual => self.assignment(left, &token, Some(InfixOp::Add)),
            TokenType::MinusEqual => self.assignment(left, &token, Some(InfixOp::Subtract)),
            TokenType::StarEqual => self.assignment(left, &token, Some(InfixOp::Multiply)),
            TokenType::SlashEqual => self.assignment(left, &token, Some(InfixOp::Divide)),
            TokenType::PercentEqual => self.assignment(left, &token, Some(InfixOp::Modulo)),
            TokenType::Question => self.ternary(left),
            TokenType::DotDot => {
                let end = self.parse_precedence(Precedence::Range)?;
                let span = left.span().to(end.span());
                Ok(Expr::Range {
                    start: Box::new(left),
                    end: Box::new(end),
                    span,
                })
            }
            TokenType::LeftParen => self.finish_call(left),
            TokenType::LeftBracket => self.index_or_slice(left),
            TokenType::Dot => {
                let property = self
                    .consume(TokenType::Identifier, "Expected property name after '.'")?
                    .clone();
                let span = left.span().to(&property.span);
                Ok(Expr::Dot {
                    object: Box::new(left),
                    property: property.lexeme,
                    span,
                })
            }
            TokenType::PlusPlus => {
                let span = left.span().to(&token.span);
                Ok(Expr::Postfix {
                    op: IncDecOp::Increment,
                    operand: Box::new(left),
                    span,
                })
            }
            TokenType::MinusMinus => {
                let span = left.span().to(&token.span);
                Ok(Expr::Postfix {
                    op: IncDecOp::Decrement,
                    operand: Box::new(left),
                    span,
                })
            }
            _ => Err(SableError::parse_error(
                token.span,
                format!("Unexpected operator {}", token.token_type.describe()),
            )),
        }
    }

    fn binary(&mut self, left: Expr, op: InfixOp) -> Result<Expr, SableError> {
        let prec = token_precedence(&self.previous().token_type);
        let right = self.parse_precedence(prec)?;
        let span = left.span().to(right.span());
        Ok(Expr::Infix {
            left: Box::new(left),
            op,
            right: Box::new(right),
            span,
        })
    }

    fn logical(&mut self, left: Expr, op: LogicalOp) -> Result<Expr, SableError> {
        let prec = token_precedence(&self.previous().token_type);
        let right = self.parse_precedence(prec)?;
        let span = left.span().to(right.span());
        Ok(Expr::Logical {
            left: Box::new(left),
            op,
            right: Box::new(right),
            span,
        })
    }

    /// `=` and compound assignment. Right-associative, and the target must be
    /// a bare identifier.
    fn assignment(
        &mut self,
        target: Expr,
        equals: &Token,
        op: Option<InfixOp>,
    ) -> Result<Expr, SableError> {
        let name = match target {
            Expr::Identifier { ref name, .. } => name.clone(),
            _ => {
                return Err(SableError::parse_error_with_help(
                    equals.span.clone(),
                    "Invalid assignment target".to_string(),
                    "Only variables can be assigned to. Example: x = 10".to_string(),
                ));
            }
        };

        let value = self.parse_precedence(Precedence::Lowest)?;
        let span = target.span().to(value.span());

        match op {
            None => Ok(Expr::Assign {
                name,
                value: Box::new(value),
                span,
            }),
            Some(op) => Ok(Expr::CompoundAssign {
                name,
                op,
                value: Box::new(value),
                span,
            }),
        }
    }

    fn ternary(&mut self, condition: Expr) -> Result<Expr, SableError> {
        let then_expr = self.expression()?;
        self.consume_with_help(
            TokenType::Colon,
            "Expected ':' in ternary expression",
            "Ternary expressions have the form: condition ? then : else".to_string(),
        )?;
        let else_expr = self.expression()?;
        let span = condition.span().to(else_expr.span());
        Ok(Expr::Ternary {
            condition: Box::new(condition),
            then_expr: Box::new(then_expr),
            else_expr: Box::new(else_expr),
            span,
        })
    }

    fn finish_call(&mut self, callee: Expr) -> Result<Expr, SableError> {
        let mut args = Vec::new();

        if !self.check(&TokenType::RightParen) {
            loop {
                if self.is_at_end() {
                    return Err(SableError::parse_error_with_help(
                        self.peek().span.clone(),
                        "Unexpected end of input in function call".to_string(),
                        "Function calls must be closed with ')'. Example: f(a, b)".to_string(),
                    ));
                }
                args.push(self.expression()?);
                if !self.match_types(&[TokenType::Comma]) {
                    break;
                }
            }
        }

        let paren = self.consume_with_help(
            TokenType::RightParen,
            "Expected ')' after arguments",
            "Function calls must be closed with ')'. Example: f(a, b)".to_string(),
        )?;
        let span = callee.span().to(&paren.span.clone());
        Ok(Expr::Call {
            callee: Box::new(callee),
            args,
            span,
        })
    }

    /// A colon right after '[' or after the first sub-expression switches
    /// from plain indexing into slice parsing.
    fn index_or_slice(&mut self, object: Expr) -> Result<Expr, SableError> {
        if self.match_types(&[TokenType::Colon]) {
            let end = if self.check(&TokenType::RightBracket) {
                None
            } else {
                Some(Box::new(self.expression()?))
            };
            let bracket = self.consume(TokenType::RightBracket, "Expected ']' after slice")?;
            let span = object.span().to(&bracket.span.clone());
            return Ok(Expr::Slice {
                object: Box::new(object),
                start: None,
                end,
                span,
            });
        }

        let first = self.expression()?;

        if self.match_types(&[TokenType::Colon]) {
            let end = if self.check(&TokenType::RightBracket) {
                None
            } else {
                Some(Box::new(self.expression()?))
            };
            let bracket = self.consume(TokenType::RightBracket, "Expected ']' after slice")?;
            let span = object.span().to(&bracket.span.clone());
            return Ok(Expr::Slice {
                object: Box::new(object),
                start: Some(Box::new(first)),
                end,
                span,
            });
        }

        let bracket = self.consume(TokenType::RightBracket, "Expected ']' after index")?;
        let span = object.span().to(&bracket.span.clone());
        Ok(Expr::Index {
            object: Box::new(object),
            index: Box::new(first),
            span,
        })
    }

    fn array_literal(&mut self, start: Span) -> Result<Expr, SableError> {
        let mut elements = Vec::new();

        if !self.check(&TokenType::RightBracket) {
            loop {
                if self.match_types(&[TokenType::Ellipsis]) {
                    elements.push(ArrayElement::Spread(self.expression()?));
                } else {
                    elements.push(ArrayElement::Item(self.expression()?));
                }
                if !self.match_types(&[TokenType::Comma]) {
                    break;
                }
            }
        }

        let bracket = self.consume_with_help(
            TokenType::RightBracket,
            "Expected ']' after array elements",
            "Array literals must be closed with ']'. Example: [1, 2, 3]".to_string(),
        )?;
        let span = start.to(&bracket.span.clone());
        Ok(Expr::ArrayLit { elements, span })
    }

    fn map_literal(&mut self, start: Span) -> Result<Expr, SableError> {
        let mut pairs = Vec::new();

        if !self.check(&TokenType::RightBrace) {
            loop {
                let key = self.expression()?;
                self.consume_with_help(
                    TokenType::Colon,
                    "Expected ':' after map key",
                    "Map entries have the form key: value. Example: {\"a\": 1}".to_string(),
                )?;
                let value = self.expression()?;
                pairs.push((key, value));
                if !self.match_types(&[TokenType::Comma]) {
                    break;
                }
            }
        }

        let brace = self.consume_with_help(
            TokenType::RightBrace,
            "Expected '}' after map entries",
            "Map literals must be closed with '}'. Example: {\"a\": 1}".to_string(),
        )?;
        let span = start.to(&brace.span.clone());
        Ok(Expr::MapLit { pairs, span })
    }

    fn struct_literal(&mut self, name_token: Token) -> Result<Expr, SableError> {
        self.consume(TokenType::LeftBrace, "Expected '{' in struct literal")?;

        let mut fields = Vec::new();
        if !self.check(&TokenType::RightBrace) {
            loop {
                let field = self
                    .consume(TokenType::Identifier, "Expected field name")?
                    .lexeme
                    .clone();
                self.consume(TokenType::Colon, "Expected ':' after field name")?;
                let value = self.expression()?;
                fields.push((field, value));
                if !self.match_types(&[TokenType::Comma]) {
                    break;
                }
            }
        }

        let brace = self.consume(TokenType::RightBrace, "Expected '}' after struct fields")?;
        let span = name_token.span.to(&brace.span.clone());
        Ok(Expr::StructLit {
            name: name_token.lexeme,
            fields,
            span,
        })
    }

    fn if_expression(&mut self, start: Span) -> Result<Expr, SableError> {
        let condition = self.expression()?;
        self.consume_with_help(
            TokenType::LeftBrace,
            "Expected '{' after if condition",
            "If bodies are blocks. Example: if x > 0 { ... }".to_string(),
        )?;
        let then_branch = self.block_statement()?;

        let else_branch = if self.match_types(&[TokenType::Else]) {
            if self.match_types(&[TokenType::If]) {
                // `else if` re-parses another if-expression and wraps it in a
                // single-statement block; there is no dedicated chain node.
                let nested_start = self.previous().span.clone();
                let nested = self.if_expression(nested_start.clone())?;
                let span = nested.span().clone();
                Some(Box::new(Stmt::Block {
                    statements: vec![Stmt::Expression {
                        expr: nested,
                        span: span.clone(),
                    }],
                    span,
                }))
            } else {
                self.consume(TokenType::LeftBrace, "Expected '{' after 'else'")?;
                Some(Box::new(self.block_statement()?))
            }
        } else {
            None
        };

        let end = else_branch
            .as_ref()
            .map(|b| b.span().clone())
            .unwrap_or_else(|| then_branch.span().clone());
        let span = start.to(&end);
        Ok(Expr::If {
            condition: Box::new(condition),
            then_branch: Box::new(then_branch),
            else_branch,
            span,
        })
    }

    fn while_expression(&mut self, start: Span) -> Result<Expr, SableError> {
        let condition = self.expression()?;
        self.consume(TokenType::LeftBrace, "Expected '{' after while condition")?;
        let body = self.block_statement()?;
        let span = start.to(body.span());
        Ok(Expr::While {
            condition: Box::new(condition),
            body: Box::new(body),
            span,
        })
    }

    /// `for (` begins a C-style three-clause loop whose init and update are
    /// full statements; `for ident` begins a single- or double-binding
    /// iteration depending on whether a comma follows the first identifier.
    fn for_expression(&mut self, start: Span) -> Result<Expr, SableError> {
        if self.match_types(&[TokenType::LeftParen]) {
            let init = if self.match_types(&[TokenType::Semicolon]) {
                None
            } else {
                Some(Box::new(self.statement()?))
            };

            let condition = if self.check(&TokenType::Semicolon) {
                None
            } else {
                Some(Box::new(self.expression()?))
            };
            self.consume(TokenType::Semicolon, "Expected ';' after loop condition")?;

            let update = if self.check(&TokenType::RightParen) {
                None
            } else {
                Some(Box::new(self.statement()?))
            };
            self.consume(TokenType::RightParen, "Expected ')' after for clauses")?;

            self.consume(TokenType::LeftBrace, "Expected '{' after for clauses")?;
            let body = self.block_statement()?;
            let span = start.to(body.span());
            return Ok(Expr::ForC {
                init,
                condition,
                update,
                body: Box::new(body),
                span,
            });
        }

        let first = self
            .consume_with_help(
                TokenType::Identifier,
                "Expected loop variable after 'for'",
                "For loops are either 'for (init; cond; update) { }' or 'for x in iterable { }'."
                    .to_string(),
            )?
            .lexeme
            .clone();

        let (index, item) = if self.match_types(&[TokenType::Comma]) {
            let second = self
                .consume(TokenType::Identifier, "Expected second loop variable")?
                .lexeme
                .clone();
            (Some(first), second)
        } else {
            (None, first)
        };

        self.consume(TokenType::In, "Expected 'in' after loop variables")?;
        let iterable = self.expression()?;
        self.consume(TokenType::LeftBrace, "Expected '{' after iterable")?;
        let body = self.block_statement()?;

        let span = start.to(body.span());
        Ok(Expr::ForIn {
            index,
            item,
            iterable: Box::new(iterable),
            body: Box::new(body),
            span,
        })
    }

    fn switch_expression(&mut self, start: Span) -> Result<Expr, SableError> {
        let subject = self.expression()?;
        self.consume(TokenType::LeftBrace, "Expected '{' after switch subject")?;

        let mut cases = Vec::new();
        let mut default = None;

        while !self.check(&TokenType::RightBrace) && !self.is_at_end() {
            if self.match_types(&[TokenType::Case]) {
                let mut values = vec![self.expression()?];
                while self.match_types(&[TokenType::Comma]) {
                    values.push(self.expression()?);
                }
                self.consume(TokenType::Colon, "Expected ':' after case values")?;
                let body = self.statement()?;
                cases.push(SwitchCase { values, body });
            } else if self.match_types(&[TokenType::Default]) {
                self.consume(TokenType::Colon, "Expected ':' after 'default'")?;
                default = Some(Box::new(self.statement()?));
            } else {
                return Err(SableError::parse_error_with_help(
                    self.peek().span.clone(),
                    "Expected 'case' or 'default' in switch".to_string(),
                    "Switch bodies contain case and default arms. Example: switch x { case 1: { } default: { } }".to_string(),
                ));
            }
        }

        self.consume(TokenType::RightBrace, "Expected '}' after switch arms")?;
        let span = start.to(&self.previous().span);
        Ok(Expr::Switch {
            subject: Box::new(subject),
            cases,
            default,
            span,
        })
    }

    fn try_expression(&mut self, start: Span) -> Result<Expr, SableError> {
        self.consume(TokenType::LeftBrace, "Expected '{' after 'try'")?;
        let try_block = self.block_statement()?;
        self.consume_with_help(
            TokenType::Catch,
            "Expected 'catch' after try block",
            "Try expressions have the form: try { ... } catch err { ... }".to_string(),
        )?;
        let err_name = self
            .consume(TokenType::Identifier, "Expected error binding after 'catch'")?
            .lexeme
            .clone();
        self.consume(TokenType::LeftBrace, "Expected '{' after catch binding")?;
        let catch_block = self.block_statement()?;

        let span = start.to(catch_block.span());
        Ok(Expr::TryCatch {
            try_block: Box::new(try_block),
            err_name,
            catch_block: Box::new(catch_block),
            span,
        })
    }

    fn arrow_function(&mut self, start: Span) -> Result<Expr, SableError> {
        let params = self.parameter_list()?;
        self.consume(TokenType::Arrow, "Expected '=>' after arrow parameters")?;

        let body = if self.match_types(&[TokenType::LeftBrace]) {
            self.block_statement()?
        } else {
            let expr = self.expression()?;
            let span = expr.span().clone();
            Stmt::Expression { expr, span }
        };

        let span = start.to(body.span());
        Ok(Expr::ArrowFunction {
            params,
            body: Box::new(body),
            span,
        })
    }

    // ---- lookahead helpers ----

    /// Decides `Name { ... }` struct instantiation versus a plain identifier
    /// followed by a block. Struct type names are capitalized, and the brace
    /// must open a `field:` list (or be empty), so conditions like
    /// `if Done { quit() }` still parse as identifier-then-block.
    fn struct_literal_ahead(&self, name: &str) -> bool {
        if !name.chars().next().is_some_and(|c| c.is_uppercase()) {
            return false;
        }

        // current token is '{'
        match self.token_at(self.current + 1).map(|t| &t.token_type) {
            Some(TokenType::RightBrace) => true,
            Some(TokenType::Identifier) => matches!(
                self.token_at(self.current + 2).map(|t| &t.token_type),
                Some(TokenType::Colon)
            ),
            _ => false,
        }
    }

    /// Scans past a balanced '(' ... ')' group to see whether '=>' follows,
    /// which makes the group an arrow-function parameter list.
    fn arrow_function_ahead(&self) -> bool {
        let mut depth = 1;
        let mut pos = self.current;

        while let Some(token) = self.token_at(pos) {
            match token.token_type {
                TokenType::LeftParen => depth += 1,
                TokenType::RightParen => {
                    depth -= 1;
                    if depth == 0 {
                        return matches!(
                            self.token_at(pos + 1).map(|t| &t.token_type),
                            Some(TokenType::Arrow)
                        );
                    }
                }
                TokenType::Eof => return false,
                _ => {}
            }
            pos += 1;
        }

        false
    }

    /// A '{' at statement position is a block unless its contents look like
    /// `key: value` map entries.
    fn brace_starts_map(&self) -> bool {
        match self.token_at(self.current + 1).map(|t| &t.token_type) {
            Some(TokenType::RightBrace) => true,
            Some(TokenType::String) | Some(TokenType::Integer) | Some(TokenType::True)
            | Some(TokenType::False) => matches!(
                self.token_at(self.current + 2).map(|t| &t.token_type),
                Some(TokenType::Colon)
            ),
            _ => false,
        }
    }

    fn token_at(&self, pos: usize) -> Option<&Token> {
        self.tokens.get(pos)
    }

    // ---- token plumbing ----

    fn match_types(&mut self, types: &[TokenType]) -> bool {
        for token_type in types {
            if self.check(token_type) {
                self.advance();
                return true;
            }
        }
        false
    }

    fn check(&self, token_type: &TokenType) -> bool {
        if self.is_at_end() {
            false
        } else {
            &self.peek().token_type == token_type
        }
    }

    fn check_next(&self, token_type: &TokenType) -> bool {
        matches!(
            self.token_at(self.current + 1).map(|t| &t.token_type),
            Some(t) if t == token_type
        )
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }

    fn is_at_end(&self) -> bool {
        self.peek().token_type == TokenType::Eof
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current - 1]
    }

    fn consume(&mut self, token_type: TokenType, message: &str) -> Result<&Token, SableError> {
        if self.check(&token_type) {
            Ok(self.advance())
        } else {
            Err(SableError::parse_error(
                self.error_span(),
                format!(
                    "{}: expected {}, found {}",
                    message,
                    token_type.describe(),
                    self.peek().token_type.describe()
                ),
            ))
        }
    }

    fn consume_with_help(
        &mut self,
        token_type: TokenType,
        message: &str,
        help: String,
    ) -> Result<&Token, SableError> {
        if self.check(&token_type) {
            Ok(self.advance())
        } else {
            Err(SableError::parse_error_with_help(
                self.error_span(),
                format!(
                    "{}: expected {}, found {}",
                    message,
                    token_type.describe(),
                    self.peek().token_type.describe()
                ),
                help,
            ))
        }
    }

    /// Point at the current unexpected token, or just past the last real
    /// token when at EOF.
    fn error_span(&self) -> Span {
        if self.is_at_end() && self.current > 0 {
            let last = &self.tokens[self.current - 1];
            Span::new(
                last.span.end,
                last.span.end,
                last.span.line,
                last.span.end_column,
                last.span.end_column,
            )
        } else {
            self.peek().span.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn parse_ok(source: &str) -> Program {
        let tokens = Lexer::new(source).scan_tokens().unwrap();
        let (program, errors) = Parser::new(tokens).parse();
        assert!(errors.is_empty(), "unexpected parse errors: {:?}", errors);
        program
    }

    fn parse_errs(source: &str) -> Vec<SableError> {
        let tokens = Lexer::new(source).scan_tokens().unwrap();
        let (_, errors) = Parser::new(tokens).parse();
        errors
    }

    fn only_expr(program: &Program) -> &Expr {
        assert_eq!(program.statements.len(), 1);
        match &program.statements[0] {
            Stmt::Expression { expr, .. } => expr,
            other => panic!("expected expression statement, got {:?}", other),
        }
    }

    #[test]
    fn precedence_binds_product_tighter_than_sum() {
        let program = parse_ok("1 + 2 * 3");
        match only_expr(&program) {
            Expr::Infix { op, right, .. } => {
                assert_eq!(*op, InfixOp::Add);
                assert!(matches!(
                    right.as_ref(),
                    Expr::Infix {
                        op: InfixOp::Multiply,
                        ..
                    }
                ));
            }
            other => panic!("expected infix, got {:?}", other),
        }
    }

    #[test]
    fn grouping_overrides_precedence() {
        let program = parse_ok("(1 + 2) * 3");
        match only_expr(&program) {
            Expr::Infix { op, left, .. } => {
                assert_eq!(*op, InfixOp::Multiply);
                assert!(matches!(
                    left.as_ref(),
                    Expr::Infix {
                        op: InfixOp::Add,
                        ..
                    }
                ));
            }
            other => panic!("expected infix, got {:?}", other),
        }
    }

    #[test]
    fn chained_assignment_is_right_associative() {
        let program = parse_ok("a = b = 5");
        match only_expr(&program) {
            Expr::Assign { name, value, .. } => {
                assert_eq!(name, "a");
                assert!(matches!(value.as_ref(), Expr::Assign { .. }));
            }
            other => panic!("expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn capitalized_identifier_with_fields_is_struct_literal() {
        let program = parse_ok("Point { x: 1, y: 2 }");
        assert!(matches!(only_expr(&program), Expr::StructLit { .. }));
    }

    #[test]
    fn lowercase_identifier_before_brace_is_not_struct_literal() {
        let program = parse_ok("if ready { 1 }");
        assert!(matches!(only_expr(&program), Expr::If { .. }));
    }

    #[test]
    fn define_with_dot_is_method_definition() {
        let program = parse_ok("define Point.sum(a) { return a }");
        assert!(matches!(
            &program.statements[0],
            Stmt::MethodDef { type_name, name, .. }
                if type_name == "Point" && name == "sum"
        ));
    }

    #[test]
    fn named_define_desugars_to_let_of_function() {
        let program = parse_ok("define add(a, b) { return a + b }");
        match &program.statements[0] {
            Stmt::Declaration {
                kind, name, value, ..
            } => {
                assert_eq!(*kind, DeclKind::Let);
                assert_eq!(name, "add");
                assert!(matches!(value, Expr::FunctionLit { .. }));
            }
            other => panic!("expected declaration, got {:?}", other),
        }
    }

    #[test]
    fn for_paren_parses_c_style_with_statement_clauses() {
        let program = parse_ok("for (let i = 0; i < 3; i = i + 1) { i }");
        match only_expr(&program) {
            Expr::ForC { init, update, .. } => {
                assert!(matches!(
                    init.as_deref(),
                    Some(Stmt::Declaration { .. })
                ));
                assert!(matches!(update.as_deref(), Some(Stmt::Expression { .. })));
            }
            other => panic!("expected C-style for, got {:?}", other),
        }
    }

    #[test]
    fn for_identifier_parses_single_and_double_binding() {
        let program = parse_ok("for x in xs { x }");
        assert!(matches!(
            only_expr(&program),
            Expr::ForIn { index: None, .. }
        ));

        let program = parse_ok("for i, x in xs { x }");
        match only_expr(&program) {
            Expr::ForIn { index, item, .. } => {
                assert_eq!(index.as_deref(), Some("i"));
                assert_eq!(item, "x");
            }
            other => panic!("expected for-in, got {:?}", other),
        }
    }

    #[test]
    fn else_if_wraps_nested_if_in_block() {
        let program = parse_ok("if a { 1 } else if b { 2 } else { 3 }");
        match only_expr(&program) {
            Expr::If { else_branch, .. } => match else_branch.as_deref() {
                Some(Stmt::Block { statements, .. }) => {
                    assert_eq!(statements.len(), 1);
                    assert!(matches!(
                        &statements[0],
                        Stmt::Expression {
                            expr: Expr::If { .. },
                            ..
                        }
                    ));
                }
                other => panic!("expected block else branch, got {:?}", other),
            },
            other => panic!("expected if, got {:?}", other),
        }
    }

    #[test]
    fn leading_spread_in_array_literal() {
        let program = parse_ok("[...xs, 1]");
        match only_expr(&program) {
            Expr::ArrayLit { elements, .. } => {
                assert!(matches!(elements[0], ArrayElement::Spread(_)));
                assert!(matches!(elements[1], ArrayElement::Item(_)));
            }
            other => panic!("expected array literal, got {:?}", other),
        }
    }

    #[test]
    fn colon_in_brackets_switches_to_slice() {
        let program = parse_ok("a[1:2]");
        assert!(matches!(only_expr(&program), Expr::Slice { .. }));

        let program = parse_ok("a[:2]");
        assert!(matches!(
            only_expr(&program),
            Expr::Slice { start: None, .. }
        ));

        let program = parse_ok("a[1]");
        assert!(matches!(only_expr(&program), Expr::Index { .. }));
    }

    #[test]
    fn arrow_function_lookahead() {
        let program = parse_ok("(a, b) => a + b");
        assert!(matches!(only_expr(&program), Expr::ArrowFunction { .. }));
    }

    #[test]
    fn aggregates_multiple_errors_across_statements() {
        let errors = parse_errs("let = 1\nlet y = 2\nlet = 3");
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn error_in_one_statement_does_not_lose_later_ones() {
        let tokens = Lexer::new("let = 1\nlet ok = 2").scan_tokens().unwrap();
        let (program, errors) = Parser::new(tokens).parse();
        assert_eq!(errors.len(), 1);
        assert!(program
            .statements
            .iter()
            .any(|s| matches!(s, Stmt::Declaration { name, .. } if name == "ok")));
    }

    #[test]
    fn typed_declaration_and_params() {
        let program = parse_ok("let x: int = 5");
        assert!(matches!(
            &program.statements[0],
            Stmt::Declaration { ty: Some(t), .. } if t == "int"
        ));

        let program = parse_ok("define f(a: int, b): float { return 1.0 }");
        match &program.statements[0] {
            Stmt::Declaration { value, .. } => match value {
                Expr::FunctionLit { params, ret, .. } => {
                    assert_eq!(params[0].ty.as_deref(), Some("int"));
                    assert_eq!(params[1].ty, None);
                    assert_eq!(ret.as_deref(), Some("float"));
                }
                other => panic!("expected function literal, got {:?}", other),
            },
            other => panic!("expected declaration, got {:?}", other),
        }
    }
}
