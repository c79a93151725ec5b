use crate::error::SableError;
use crate::evaluator::Evaluator;
use crate::lexer::Lexer;
use crate::parser::Parser;
use crate::value::Value;
use std::path::{Path, PathBuf};

/// Runs a whole script: lex, parse (collecting every parse error before
/// giving up), evaluate. `filename` names the source in diagnostics and
/// anchors relative `include` paths.
pub fn run(source: &str, filename: Option<&str>) {
    let tokens = match Lexer::new(source).scan_tokens() {
        Ok(tokens) => tokens,
        Err(error) => {
            error.report(source, filename);
            return;
        }
    };

    let (program, errors) = Parser::new(tokens).parse();
    if !errors.is_empty() {
        for error in &errors {
            error.report(source, filename);
        }
        return;
    }

    let base_dir = filename
        .and_then(|f| Path::new(f).parent())
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let mut evaluator = Evaluator::with_base_dir(base_dir);
    if let Value::Error(err) = evaluator.evaluate_program(&program) {
        SableError::runtime_error(err.span, err.message).report(source, filename);
    }
}
