// Sable Language Interpreter Library
//
// Core library for the Sable language interpreter: a small dynamically typed
// scripting language with optional type annotations, closures, structs and
// enums, and location-aware error diagnostics.

pub mod ast;
pub mod builtins;
pub mod env;
pub mod error;
pub mod evaluator;
pub mod lexer;
pub mod parser;
pub mod repl;
pub mod runner;
pub mod token;
pub mod value;

// Re-export commonly used items
pub use ast::{Expr, Program, Stmt};
pub use env::Environment;
pub use error::{SableError, Span};
pub use evaluator::Evaluator;
pub use lexer::Lexer;
pub use parser::Parser;
pub use token::{Token, TokenType};
pub use value::Value;

// Re-export main entry points
pub use repl::start as start_repl;
pub use runner::run;
