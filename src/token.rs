use crate::error::Span;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenType {
    // Single-character tokens
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    Comma,
    Colon,
    Semicolon,
    Dot,
    Question,

    // Operators, one or more characters
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    Equal,
    PlusEqual,
    MinusEqual,
    StarEqual,
    SlashEqual,
    PercentEqual,
    EqualEqual,
    BangEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    PlusPlus,
    MinusMinus,
    AmpAmp,
    PipePipe,
    DotDot,
    Ellipsis,
    Arrow,

    // Literals
    Identifier,
    String,
    Char,
    Integer,
    Float,

    // Keywords
    And,
    Break,
    Case,
    Catch,
    Const,
    Continue,
    Default,
    Define,
    Else,
    Enum,
    False,
    For,
    If,
    In,
    Include,
    Let,
    Make,
    Not,
    Null,
    Or,
    Return,
    Struct,
    Switch,
    True,
    Try,
    While,

    // Special
    Eof,
}

impl TokenType {
    /// Human-readable name used in "expected X, found Y" parse errors.
    pub fn describe(&self) -> &'static str {
        match self {
            TokenType::LeftParen => "'('",
            TokenType::RightParen => "')'",
            TokenType::LeftBrace => "'{'",
            TokenType::RightBrace => "'}'",
            TokenType::LeftBracket => "'['",
            TokenType::RightBracket => "']'",
            TokenType::Comma => "','",
            TokenType::Colon => "':'",
            TokenType::Semicolon => "';'",
            TokenType::Dot => "'.'",
            TokenType::Question => "'?'",
            TokenType::Plus => "'+'",
            TokenType::Minus => "'-'",
            TokenType::Star => "'*'",
            TokenType::Slash => "'/'",
            TokenType::Percent => "'%'",
            TokenType::Bang => "'!'",
            TokenType::Equal => "'='",
            TokenType::PlusEqual => "'+='",
            TokenType::MinusEqual => "'-='",
            TokenType::StarEqual => "'*='",
            TokenType::SlashEqual => "'/='",
            TokenType::PercentEqual => "'%='",
            TokenType::EqualEqual => "'=='",
            TokenType::BangEqual => "'!='",
            TokenType::Less => "'<'",
            TokenType::LessEqual => "'<='",
            TokenType::Greater => "'>'",
            TokenType::GreaterEqual => "'>='",
            TokenType::PlusPlus => "'++'",
            TokenType::MinusMinus => "'--'",
            TokenType::AmpAmp => "'&&'",
            TokenType::PipePipe => "'||'",
            TokenType::DotDot => "'..'",
            TokenType::Ellipsis => "'...'",
            TokenType::Arrow => "'=>'",
            TokenType::Identifier => "identifier",
            TokenType::String => "string literal",
            TokenType::Char => "char literal",
            TokenType::Integer => "integer literal",
            TokenType::Float => "float literal",
            TokenType::And => "'and'",
            TokenType::Break => "'break'",
            TokenType::Case => "'case'",
            TokenType::Catch => "'catch'",
            TokenType::Const => "'const'",
            TokenType::Continue => "'continue'",
            TokenType::Default => "'default'",
            TokenType::Define => "'define'",
            TokenType::Else => "'else'",
            TokenType::Enum => "'enum'",
            TokenType::False => "'false'",
            TokenType::For => "'for'",
            TokenType::If => "'if'",
            TokenType::In => "'in'",
            TokenType::Include => "'include'",
            TokenType::Let => "'let'",
            TokenType::Make => "'make'",
            TokenType::Not => "'not'",
            TokenType::Null => "'null'",
            TokenType::Or => "'or'",
            TokenType::Return => "'return'",
            TokenType::Struct => "'struct'",
            TokenType::Switch => "'switch'",
            TokenType::True => "'true'",
            TokenType::Try => "'try'",
            TokenType::While => "'while'",
            TokenType::Eof => "end of input",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Token {
    pub token_type: TokenType,
    pub lexeme: String,
    pub span: Span,
}

impl Token {
    pub fn new(token_type: TokenType, lexeme: String, span: Span) -> Self {
        Self {
            token_type,
            lexeme,
            span,
        }
    }
}
