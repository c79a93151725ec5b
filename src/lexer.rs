use crate::error::{SableError, Span};
use crate::token::{Token, TokenType};
use std::collections::HashMap;

pub struct Lexer {
    chars: Vec<char>,
    tokens: Vec<Token>,
    start: usize,
    current: usize,
    start_byte: usize,
    current_byte: usize,
    line: usize,
    column: usize,
    start_line: usize,
    start_column: usize,
    keywords: HashMap<&'static str, TokenType>,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        let mut keywords = HashMap::new();
        keywords.insert("and", TokenType::And);
        keywords.insert("break", TokenType::Break);
        keywords.insert("case", TokenType::Case);
        keywords.insert("catch", TokenType::Catch);
        keywords.insert("const", TokenType::Const);
        keywords.insert("continue", TokenType::Continue);
        keywords.insert("default", TokenType::Default);
        keywords.insert("define", TokenType::Define);
        keywords.insert("else", TokenType::Else);
        keywords.insert("enum", TokenType::Enum);
        keywords.insert("false", TokenType::False);
        keywords.insert("for", TokenType::For);
        keywords.insert("if", TokenType::If);
        keywords.insert("in", TokenType::In);
        keywords.insert("include", TokenType::Include);
        keywords.insert("let", TokenType::Let);
        keywords.insert("make", TokenType::Make);
        keywords.insert("not", TokenType::Not);
        keywords.insert("null", TokenType::Null);
        keywords.insert("or", TokenType::Or);
        keywords.insert("return", TokenType::Return);
        keywords.insert("struct", TokenType::Struct);
        keywords.insert("switch", TokenType::Switch);
        keywords.insert("true", TokenType::True);
        keywords.insert("try", TokenType::Try);
        keywords.insert("while", TokenType::While);

        Self {
            chars: source.chars().collect(),
            tokens: Vec::new(),
            start: 0,
            current: 0,
            start_byte: 0,
            current_byte: 0,
            line: 1,
            column: 1,
            start_line: 1,
            start_column: 1,
            keywords,
        }
    }

    pub fn scan_tokens(&mut self) -> Result<Vec<Token>, SableError> {
        while !self.is_at_end() {
            self.start = self.current;
            self.start_byte = self.current_byte;
            self.start_line = self.line;
            self.start_column = self.column;
            self.scan_token()?;
        }

        let eof_span = Span::new(
            self.current_byte,
            self.current_byte,
            self.line,
            self.column,
            self.column,
        );
        self.tokens
            .push(Token::new(TokenType::Eof, String::new(), eof_span));

        Ok(std::mem::take(&mut self.tokens))
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.chars.len()
    }

    fn scan_token(&mut self) -> Result<(), SableError> {
        let c = self.advance();

        match c {
            '(' => self.add_token(TokenType::LeftParen),
            ')' => self.add_token(TokenType::RightParen),
            '{' => self.add_token(TokenType::LeftBrace),
            '}' => self.add_token(TokenType::RightBrace),
            '[' => self.add_token(TokenType::LeftBracket),
            ']' => self.add_token(TokenType::RightBracket),
            ',' => self.add_token(TokenType::Comma),
            ':' => self.add_token(TokenType::Colon),
            ';' => self.add_token(TokenType::Semicolon),
            '?' => self.add_token(TokenType::Question),
            '.' => {
                if self.match_char('.') {
                    if self.match_char('.') {
                        self.add_token(TokenType::Ellipsis);
                    } else {
                        self.add_token(TokenType::DotDot);
                    }
                } else {
                    self.add_token(TokenType::Dot);
                }
            }
            '+' => {
                if self.match_char('+') {
                    self.add_token(TokenType::PlusPlus);
                } else if self.match_char('=') {
                    self.add_token(TokenType::PlusEqual);
                } else {
                    self.add_token(TokenType::Plus);
                }
            }
            '-' => {
                if self.match_char('-') {
                    self.add_token(TokenType::MinusMinus);
                } else if self.match_char('=') {
                    self.add_token(TokenType::MinusEqual);
                } else {
                    self.add_token(TokenType::Minus);
                }
            }
            '*' => {
                if self.match_char('=') {
                    self.add_token(TokenType::StarEqual);
                } else {
                    self.add_token(TokenType::Star);
                }
            }
            '%' => {
                if self.match_char('=') {
                    self.add_token(TokenType::PercentEqual);
                } else {
                    self.add_token(TokenType::Percent);
                }
            }
            '!' => {
                if self.match_char('=') {
                    self.add_token(TokenType::BangEqual);
                } else {
                    self.add_token(TokenType::Bang);
                }
            }
            '=' => {
                if self.match_char('=') {
                    self.add_token(TokenType::EqualEqual);
                } else if self.match_char('>') {
                    self.add_token(TokenType::Arrow);
                } else {
                    self.add_token(TokenType::Equal);
                }
            }
            '<' => {
                if self.match_char('=') {
                    self.add_token(TokenType::LessEqual);
                } else {
                    self.add_token(TokenType::Less);
                }
            }
            '>' => {
                if self.match_char('=') {
                    self.add_token(TokenType::GreaterEqual);
                } else {
                    self.add_token(TokenType::Greater);
                }
            }
            '&' => {
                if self.match_char('&') {
                    self.add_token(TokenType::AmpAmp);
                } else {
                    return Err(self.error("Unexpected character: '&'".to_string()));
                }
            }
            '|' => {
                if self.match_char('|') {
                    self.add_token(TokenType::PipePipe);
                } else {
                    return Err(self.error("Unexpected character: '|'".to_string()));
                }
            }
            '/' => {
                if self.match_char('/') {
                    // Comment goes until end of line
                    while self.peek() != '\n' && !self.is_at_end() {
                        self.advance();
                    }
                } else if self.match_char('=') {
                    self.add_token(TokenType::SlashEqual);
                } else {
                    self.add_token(TokenType::Slash);
                }
            }
            ' ' | '\r' | '\t' | '\n' => {
                // Whitespace; advance() already tracked line/column
            }
            '"' => self.string()?,
            '\'' => self.char_literal()?,
            c if c.is_ascii_digit() => self.number()?,
            c if c.is_alphabetic() || c == '_' => self.identifier(),
            _ => {
                return Err(self.error(format!("Unexpected character: '{}'", c)));
            }
        }

        Ok(())
    }

    fn advance(&mut self) -> char {
        let c = self.chars.get(self.current).copied().unwrap_or('\0');
        self.current += 1;
        self.current_byte += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        c
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.is_at_end() || self.peek() != expected {
            false
        } else {
            self.advance();
            true
        }
    }

    fn peek(&self) -> char {
        self.chars.get(self.current).copied().unwrap_or('\0')
    }

    fn peek_next(&self) -> char {
        self.chars.get(self.current + 1).copied().unwrap_or('\0')
    }

    /// String literal. The raw contents (escapes included) are kept as the
    /// lexeme; escape decoding and `${...}` interpolation happen at
    /// evaluation time.
    fn string(&mut self) -> Result<(), SableError> {
        while self.peek() != '"' && !self.is_at_end() {
            if self.peek() == '\\' && self.peek_next() != '\0' {
                self.advance();
            }
            self.advance();
        }

        if self.is_at_end() {
            return Err(self.error("Unterminated string".to_string()));
        }

        // Consume the closing "
        self.advance();

        let content: String = self.chars[self.start + 1..self.current - 1].iter().collect();
        self.add_token_with_content(TokenType::String, content);
        Ok(())
    }

    fn char_literal(&mut self) -> Result<(), SableError> {
        let c = if self.peek() == '\\' {
            self.advance();
            let esc = self.advance();
            match esc {
                'n' => '\n',
                't' => '\t',
                'r' => '\r',
                '0' => '\0',
                '\\' => '\\',
                '\'' => '\'',
                '"' => '"',
                other => {
                    return Err(self.error(format!("Unknown escape sequence: '\\{}'", other)));
                }
            }
        } else if self.peek() == '\'' || self.is_at_end() {
            return Err(self.error("Empty char literal".to_string()));
        } else {
            self.advance()
        };

        if !self.match_char('\'') {
            return Err(self.error("Unterminated char literal".to_string()));
        }

        self.add_token_with_content(TokenType::Char, c.to_string());
        Ok(())
    }

    fn number(&mut self) -> Result<(), SableError> {
        while self.peek().is_ascii_digit() {
            self.advance();
        }

        let mut is_float = false;

        // Fractional part; a bare '.' or '..' after the digits is not ours
        if self.peek() == '.' && self.peek_next().is_ascii_digit() {
            is_float = true;
            self.advance();
            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }

        let text: String = self.chars[self.start..self.current].iter().collect();

        if is_float {
            if text.parse::<f64>().is_err() {
                return Err(self.error(format!("Invalid float: {}", text)));
            }
            self.add_token_with_content(TokenType::Float, text);
        } else {
            if text.parse::<i64>().is_err() {
                return Err(self.error(format!("Invalid integer: {}", text)));
            }
            self.add_token_with_content(TokenType::Integer, text);
        }

        Ok(())
    }

    fn identifier(&mut self) {
        while self.peek().is_alphanumeric() || self.peek() == '_' {
            self.advance();
        }

        let text: String = self.chars[self.start..self.current].iter().collect();
        let token_type = self
            .keywords
            .get(text.as_str())
            .cloned()
            .unwrap_or(TokenType::Identifier);

        self.add_token_with_content(token_type, text);
    }

    fn add_token(&mut self, token_type: TokenType) {
        let text: String = self.chars[self.start..self.current].iter().collect();
        self.add_token_with_content(token_type, text);
    }

    fn add_token_with_content(&mut self, token_type: TokenType, lexeme: String) {
        let span = Span::new(
            self.start_byte,
            self.current_byte,
            self.start_line,
            self.start_column,
            self.column,
        );
        self.tokens.push(Token::new(token_type, lexeme, span));
    }

    fn error(&self, message: String) -> SableError {
        SableError::lex_error(
            Span::new(
                self.start_byte,
                self.current_byte,
                self.start_line,
                self.start_column,
                self.column,
            ),
            message,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenType> {
        Lexer::new(source)
            .scan_tokens()
            .unwrap()
            .into_iter()
            .map(|t| t.token_type)
            .collect()
    }

    #[test]
    fn scans_operators() {
        assert_eq!(
            kinds("+ += ++ == => = .. ... ."),
            vec![
                TokenType::Plus,
                TokenType::PlusEqual,
                TokenType::PlusPlus,
                TokenType::EqualEqual,
                TokenType::Arrow,
                TokenType::Equal,
                TokenType::DotDot,
                TokenType::Ellipsis,
                TokenType::Dot,
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn integer_before_range_stays_integer() {
        assert_eq!(
            kinds("0..10"),
            vec![
                TokenType::Integer,
                TokenType::DotDot,
                TokenType::Integer,
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn tracks_line_and_column() {
        let tokens = Lexer::new("let x\nlet y").scan_tokens().unwrap();
        let y = &tokens[3];
        assert_eq!(y.lexeme, "y");
        assert_eq!(y.span.line, 2);
        assert_eq!(y.span.column, 5);
    }

    #[test]
    fn string_keeps_raw_escapes() {
        let tokens = Lexer::new(r#""a\n${x}""#).scan_tokens().unwrap();
        assert_eq!(tokens[0].token_type, TokenType::String);
        assert_eq!(tokens[0].lexeme, r"a\n${x}");
    }

    #[test]
    fn rejects_unterminated_string() {
        assert!(Lexer::new("\"abc").scan_tokens().is_err());
    }
}
