use crate::error::SableError;
use crate::evaluator::Evaluator;
use crate::lexer::Lexer;
use crate::parser::Parser;
use crate::value::Value;
use std::io::{self, Write};

/// Interactive loop with a persistent evaluator, so bindings survive from
/// one line to the next.
pub fn start() {
    println!("Sable {}", env!("CARGO_PKG_VERSION"));
    println!("Type 'exit' or press Ctrl+D to quit");
    println!();

    let mut evaluator = Evaluator::new();

    loop {
        print!("> ");
        if io::stdout().flush().is_err() {
            break;
        }

        let mut line = String::new();
        match io::stdin().read_line(&mut line) {
            Ok(0) => {
                println!();
                break;
            }
            Ok(_) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == "exit" || line == "quit" {
                    break;
                }
                run_line(line, &mut evaluator);
            }
            Err(error) => {
                eprintln!("error reading input: {}", error);
                break;
            }
        }
    }
}

fn run_line(source: &str, evaluator: &mut Evaluator) {
    let tokens = match Lexer::new(source).scan_tokens() {
        Ok(tokens) => tokens,
        Err(error) => {
            error.report(source, None);
            return;
        }
    };

    let (program, errors) = Parser::new(tokens).parse();
    if !errors.is_empty() {
        for error in &errors {
            error.report(source, None);
        }
        return;
    }

    match evaluator.evaluate_program(&program) {
        Value::Error(err) => {
            SableError::runtime_error(err.span, err.message).report(source, None);
        }
        // Declarations and other value-less statements stay quiet
        Value::Null => {}
        value => println!("{}", value),
    }
}
