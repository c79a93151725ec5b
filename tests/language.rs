use sable::{Evaluator, Lexer, Parser, Value};

fn eval(source: &str) -> Value {
    let tokens = Lexer::new(source).scan_tokens().expect("lex error");
    let (program, errors) = Parser::new(tokens).parse();
    assert!(errors.is_empty(), "parse errors: {:?}", errors);
    Evaluator::new().evaluate_program(&program)
}

fn eval_err(source: &str) -> String {
    match eval(source) {
        Value::Error(err) => err.message,
        other => panic!("expected runtime error, got {:?}", other),
    }
}

#[test]
fn operator_precedence_matches_the_table() {
    assert_eq!(eval("1 + 2 * 3"), Value::Integer(7));
    assert_eq!(eval("(1 + 2) * 3"), Value::Integer(9));
    assert_eq!(eval("2 * 3 + 4 * 5"), Value::Integer(26));
    assert_eq!(eval("1 + 2 < 2 + 2"), Value::Bool(true));
    assert_eq!(eval("1 < 2 == true"), Value::Bool(true));
    assert_eq!(eval("-2 * 3"), Value::Integer(-6));
    assert_eq!(eval("not true == false"), Value::Bool(true));
}

#[test]
fn division_and_modulo_by_zero_are_catchable_errors() {
    assert!(eval_err("10 / 0").contains("division by zero"));
    assert!(eval_err("10 % 0").contains("division by zero"));
    // and they never unwind past a try
    assert_eq!(
        eval("try { 10 / 0 } catch e { -1 }"),
        Value::Integer(-1)
    );
}

#[test]
fn typed_declarations_check_at_bind_time() {
    assert_eq!(eval("let n: int = 1 + 2; n"), Value::Integer(3));
    assert_eq!(
        eval("let s: string = \"a\" + \"b\"; s"),
        Value::String("ab".to_string())
    );
    let message = eval_err("let n: int = 1.5");
    assert!(message.contains("int") && message.contains("float"), "{}", message);
}

#[test]
fn const_bindings_reject_writes_through_every_path() {
    assert!(eval_err("const LIMIT = 10; LIMIT = 11").contains("constant"));
    assert!(eval_err("const LIMIT = 10; LIMIT += 1").contains("constant"));
    assert!(eval_err("const LIMIT = 10; LIMIT++").contains("constant"));
    assert!(eval_err("make RATE = 2; RATE = 3").contains("constant"));
    // inner scopes still see the const mark
    assert!(eval_err("const X = 1; { X = 2 }").contains("constant"));
}

#[test]
fn each_closure_owns_its_captured_state() {
    let source = "
        define counter() {
            let n = 0
            return () => { n += 1; return n }
        }
        let a = counter()
        let b = counter()
        a(); a(); a();
        [a(), b()]
    ";
    assert_eq!(
        eval(source),
        Value::Array(vec![Value::Integer(4), Value::Integer(1)])
    );
}

#[test]
fn nested_loops_scope_break_and_continue_to_the_innermost() {
    let source = "
        let log = []
        for (let i = 0; i < 3; i++) {
            for (let j = 0; j < 5; j++) {
                if j == 0 { continue }
                if j > 2 { break }
                log = push(log, i * 10 + j)
            }
        }
        log
    ";
    assert_eq!(
        eval(source),
        Value::Array(vec![
            Value::Integer(1),
            Value::Integer(2),
            Value::Integer(11),
            Value::Integer(12),
            Value::Integer(21),
            Value::Integer(22),
        ])
    );
}

#[test]
fn json_values_survive_a_round_trip() {
    let source = "
        include \"json\"
        let v = {\"name\": \"sable\", \"counts\": [1, 2, 3], \"live\": true, \"gone\": null, \"ratio\": 2.5}
        json.parse(json.stringify(v)) == v
    ";
    assert_eq!(eval(source), Value::Bool(true));
}

#[test]
fn interpolation_splices_evaluated_expressions() {
    assert_eq!(eval("\"${1 + 2}\""), Value::String("3".to_string()));
    assert_eq!(
        eval("let n = 6; \"${n} * 7 = ${n * 7}\""),
        Value::String("6 * 7 = 42".to_string())
    );
    // a dollar sign without a brace is literal text
    assert_eq!(eval("\"cost: 3$\""), Value::String("cost: 3$".to_string()));
    assert_eq!(eval("\"\\${not code}\""), Value::String("${not code}".to_string()));
}

#[test]
fn logical_operators_short_circuit_side_effects() {
    let source = "
        let calls = 0
        define bump() { calls += 1; return true }
        false and bump()
        true or bump()
        calls
    ";
    assert_eq!(eval(source), Value::Integer(0));
    let source = "
        let calls = 0
        define bump() { calls += 1; return true }
        true and bump()
        false or bump()
        calls
    ";
    assert_eq!(eval(source), Value::Integer(2));
}

#[test]
fn indexed_iteration_visits_elements_in_order() {
    let source = "
        let out = \"\"
        for i, c in \"abc\" {
            out += \"${i}${c}\"
        }
        out
    ";
    assert_eq!(eval(source), Value::String("0a1b2c".to_string()));
}

#[test]
fn structs_methods_and_enums_work_end_to_end() {
    let source = "
        enum Shape { Circle, Square }
        struct Box { kind, side }

        define Box.area() {
            if self.kind == Shape.Square {
                return self.side * self.side
            }
            return 0
        }

        define Box.grow(by) {
            return Box { kind: self.kind, side: self.side + by }
        }

        let b = Box { kind: Shape.Square, side: 3 };
        [b.area(), b.grow(2).area()]
    ";
    assert_eq!(
        eval(source),
        Value::Array(vec![Value::Integer(9), Value::Integer(25)])
    );
}

#[test]
fn include_merges_file_bindings_into_the_caller() {
    use std::fs;

    let dir = std::env::temp_dir().join(format!("sable-include-{}", std::process::id()));
    fs::create_dir_all(&dir).expect("create temp dir");
    fs::write(
        dir.join("geometry.sb"),
        "const TWO = 2\ndefine double(n) { return n * TWO }\n",
    )
    .expect("write module");

    let source = "include \"geometry\"\ndouble(21)";
    let tokens = Lexer::new(source).scan_tokens().expect("lex error");
    let (program, errors) = Parser::new(tokens).parse();
    assert!(errors.is_empty(), "parse errors: {:?}", errors);

    let mut evaluator = Evaluator::with_base_dir(dir.clone());
    assert_eq!(evaluator.evaluate_program(&program), Value::Integer(42));

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn missing_include_is_a_runtime_error() {
    assert!(eval_err("include \"no-such-module\"").contains("no-such-module"));
}

#[test]
fn math_module_covers_basic_numerics() {
    let source = "
        include \"math\"
        [math.abs(0 - 5), math.sqrt(9.0), math.pow(2, 10), math.min(3, 7), math.max(3, 7)]
    ";
    match eval(source) {
        Value::Array(items) => {
            assert_eq!(items[0], Value::Integer(5));
            assert_eq!(items[1], Value::Float(3.0));
            assert_eq!(items[2], Value::Integer(1024));
            assert_eq!(items[3], Value::Integer(3));
            assert_eq!(items[4], Value::Integer(7));
        }
        other => panic!("expected array, got {:?}", other),
    }
}

#[test]
fn pow_widens_to_float_instead_of_overflowing() {
    let source = "
        include \"math\"
        math.pow(2, 100)
    ";
    assert_eq!(eval(source), Value::Float(2f64.powf(100.0)));
}

#[test]
fn collection_builtins_compose() {
    let source = "
        let xs = [5, 3, 8, 1]
        let doubled = map(xs, (x) => x * 2)
        let big = filter(doubled, (x) => x > 5)
        reduce(big, 0, (acc, x) => acc + x)
    ";
    assert_eq!(eval(source), Value::Integer(10 + 6 + 16));
}

#[test]
fn switch_selects_by_equality_without_fallthrough() {
    let source = "
        let seen = []
        for x in [1, 2, 3] {
            switch x {
                case 1: { seen = push(seen, \"one\") }
                case 2, 3: { seen = push(seen, \"rest\") }
            }
        }
        seen
    ";
    assert_eq!(
        eval(source),
        Value::Array(vec![
            Value::String("one".to_string()),
            Value::String("rest".to_string()),
            Value::String("rest".to_string()),
        ])
    );
}

#[test]
fn ternary_and_while_compose_as_expressions() {
    assert_eq!(eval("let x = 5; x > 3 ? \"big\" : \"small\""), Value::String("big".to_string()));
    assert_eq!(
        eval("let n = 0; let last = while n < 4 { n += 1; n }; last"),
        Value::Integer(4)
    );
}

#[test]
fn runtime_errors_carry_a_source_position() {
    let source = "let x = 1\nx / 0";
    let tokens = Lexer::new(source).scan_tokens().expect("lex error");
    let (program, errors) = Parser::new(tokens).parse();
    assert!(errors.is_empty());
    match Evaluator::new().evaluate_program(&program) {
        Value::Error(err) => assert_eq!(err.span.line, 2),
        other => panic!("expected error, got {:?}", other),
    }
}

#[test]
fn parse_recovers_and_reports_multiple_errors() {
    let source = "let = 1\nlet ok = 2\nlet = 3";
    let tokens = Lexer::new(source).scan_tokens().expect("lex error");
    let (_, errors) = Parser::new(tokens).parse();
    assert_eq!(errors.len(), 2);
}
