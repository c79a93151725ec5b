use crate::ast::{
    ArrayElement, DeclKind, Expr, IncDecOp, InfixOp, LogicalOp, Program, Stmt, SwitchCase,
};
use crate::builtins;
use crate::env::Environment;
use crate::error::Span;
use crate::lexer::Lexer;
use crate::parser::Parser;
use crate::value::{EnumType, Function, HashKey, Instance, RuntimeError, StructType, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Tree-walking evaluator. Control flow (return/break/continue/error) rides
/// on `Value` sentinels checked at every aggregate boundary; nothing here
/// unwinds through the host.
pub struct Evaluator {
    globals: Rc<RefCell<Environment>>,
    base_dir: PathBuf,
}

impl Evaluator {
    pub fn new() -> Self {
        Self::with_base_dir(PathBuf::from("."))
    }

    /// `base_dir` anchors relative paths in `include` statements.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        let mut root = Environment::new();
        builtins::install(&mut root);
        Self {
            globals: root.shared(),
            base_dir,
        }
    }

    fn error(span: &Span, message: String) -> Value {
        Value::Error(RuntimeError {
            message,
            span: span.clone(),
        })
    }

    /// Evaluates a whole program against the persistent global scope and
    /// yields the last statement's value, or the first error.
    pub fn evaluate_program(&mut self, program: &Program) -> Value {
        let env = Rc::clone(&self.globals);
        let mut result = Value::Null;

        for stmt in &program.statements {
            result = self.eval_stmt(stmt, &env);
            if result.is_aborting() {
                return match result {
                    Value::Return(inner) => *inner,
                    Value::Break => Self::error(stmt.span(), "'break' outside of a loop".to_string()),
                    Value::Continue => {
                        Self::error(stmt.span(), "'continue' outside of a loop".to_string())
                    }
                    other => other,
                };
            }
        }

        result
    }

    // ---- statements ----

    fn eval_stmt(&mut self, stmt: &Stmt, env: &Rc<RefCell<Environment>>) -> Value {
        match stmt {
            Stmt::Declaration {
                kind,
                name,
                ty,
                value,
                span,
            } => {
                let val = self.eval_expr(value, env);
                if val.is_aborting() {
                    return val;
                }
                if let Some(declared) = ty {
                    if !type_matches(declared, &val) {
                        return Self::error(
                            span,
                            format!(
                                "type mismatch: '{}' declared as {}, got {}",
                                name,
                                declared,
                                val.type_name()
                            ),
                        );
                    }
                }
                match kind {
                    DeclKind::Let => env.borrow_mut().define(name, val),
                    DeclKind::Const | DeclKind::Make => env.borrow_mut().define_const(name, val),
                }
                Value::Null
            }
            Stmt::Return { value, .. } => {
                let val = match value {
                    Some(expr) => self.eval_expr(expr, env),
                    None => Value::Null,
                };
                if val.is_aborting() {
                    return val;
                }
                Value::Return(Box::new(val))
            }
            Stmt::Include { path, span } => self.eval_include(path, span, env),
            Stmt::StructDef { name, fields, .. } => {
                env.borrow_mut().define(
                    name,
                    Value::Struct(Rc::new(StructType {
                        name: name.clone(),
                        fields: fields.clone(),
                    })),
                );
                Value::Null
            }
            Stmt::MethodDef {
                type_name,
                name,
                function,
                ..
            } => {
                let func = self.eval_expr(function, env);
                if func.is_aborting() {
                    return func;
                }
                env.borrow_mut()
                    .define(&format!("{}.{}", type_name, name), func);
                Value::Null
            }
            Stmt::EnumDef { name, variants, .. } => {
                env.borrow_mut().define(
                    name,
                    Value::Enum(Rc::new(EnumType {
                        name: name.clone(),
                        variants: variants.clone(),
                    })),
                );
                Value::Null
            }
            Stmt::Expression { expr, .. } => self.eval_expr(expr, env),
            Stmt::Block { statements, .. } => {
                let scope = Environment::with(Rc::clone(env)).shared();
                self.eval_statements(statements, &scope)
            }
        }
    }

    /// A statement sequence yields the value of its last statement; any
    /// sentinel short-circuits and re-surfaces unchanged.
    fn eval_statements(&mut self, statements: &[Stmt], env: &Rc<RefCell<Environment>>) -> Value {
        let mut result = Value::Null;
        for stmt in statements {
            result = self.eval_stmt(stmt, env);
            if result.is_aborting() {
                return result;
            }
        }
        result
    }

    fn eval_include(&mut self, path: &str, span: &Span, env: &Rc<RefCell<Environment>>) -> Value {
        if let Some(module) = builtins::module(path) {
            env.borrow_mut().define(path, module);
            return Value::Null;
        }

        let mut file = self.base_dir.join(path);
        if !file.exists() {
            let with_ext = self.base_dir.join(format!("{}.sb", path));
            if with_ext.exists() {
                file = with_ext;
            }
        }

        let source = match fs::read_to_string(&file) {
            Ok(source) => source,
            Err(e) => return Self::error(span, format!("cannot include '{}': {}", path, e)),
        };

        let tokens = match Lexer::new(&source).scan_tokens() {
            Ok(tokens) => tokens,
            Err(e) => {
                return Self::error(span, format!("in included file '{}': {}", path, e.message))
            }
        };
        let (program, errors) = Parser::new(tokens).parse();
        if let Some(first) = errors.first() {
            return Self::error(
                span,
                format!("in included file '{}': {}", path, first.message),
            );
        }

        // File modules evaluate isolated from the including scope, then
        // their top-level bindings are merged in.
        let mut root = Environment::new();
        builtins::install(&mut root);
        let scope = Environment::with(root.shared()).shared();

        let parent = file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let saved = std::mem::replace(&mut self.base_dir, parent);
        let result = self.eval_statements(&program.statements, &scope);
        self.base_dir = saved;

        if result.is_error() {
            return result;
        }

        for (name, value, is_const) in scope.borrow().bindings() {
            if is_const {
                env.borrow_mut().define_const(&name, value);
            } else {
                env.borrow_mut().define(&name, value);
            }
        }
        Value::Null
    }

    // ---- expressions ----

    fn eval_expr(&mut self, expr: &Expr, env: &Rc<RefCell<Environment>>) -> Value {
        match expr {
            Expr::IntegerLit { value, .. } => Value::Integer(*value),
            Expr::FloatLit { value, .. } => Value::Float(*value),
            Expr::StringLit { value, span } => self.interpolate(value, span, env),
            Expr::CharLit { value, .. } => Value::Char(*value),
            Expr::BoolLit { value, .. } => Value::Bool(*value),
            Expr::NullLit { .. } => Value::Null,
            Expr::Identifier { name, span } => match env.borrow().get(name) {
                Some(value) => value,
                None => Self::error(span, format!("undefined identifier '{}'", name)),
            },
            Expr::Prefix { op, operand, span } => match op {
                crate::ast::PrefixOp::Negate => {
                    let value = self.eval_expr(operand, env);
                    if value.is_aborting() {
                        return value;
                    }
                    match value {
                        Value::Integer(n) => Value::Integer(-n),
                        Value::Float(f) => Value::Float(-f),
                        other => {
                            Self::error(span, format!("cannot negate {}", other.type_name()))
                        }
                    }
                }
                crate::ast::PrefixOp::Not => {
                    let value = self.eval_expr(operand, env);
                    if value.is_aborting() {
                        return value;
                    }
                    Value::Bool(!value.is_truthy())
                }
                crate::ast::PrefixOp::Increment => self.eval_inc_dec(operand, 1, false, span, env),
                crate::ast::PrefixOp::Decrement => self.eval_inc_dec(operand, -1, false, span, env),
            },
            Expr::Postfix { op, operand, span } => {
                let delta = match op {
                    IncDecOp::Increment => 1,
                    IncDecOp::Decrement => -1,
                };
                self.eval_inc_dec(operand, delta, true, span, env)
            }
            Expr::Infix {
                left,
                op,
                right,
                span,
            } => {
                let left_val = self.eval_expr(left, env);
                if left_val.is_aborting() {
                    return left_val;
                }
                let right_val = self.eval_expr(right, env);
                if right_val.is_aborting() {
                    return right_val;
                }
                eval_infix_op(*op, left_val, right_val, span)
            }
            Expr::Logical {
                left, op, right, ..
            } => {
                let left_val = self.eval_expr(left, env);
                if left_val.is_aborting() {
                    return left_val;
                }
                match op {
                    LogicalOp::Or => {
                        if left_val.is_truthy() {
                            left_val
                        } else {
                            self.eval_expr(right, env)
                        }
                    }
                    LogicalOp::And => {
                        if !left_val.is_truthy() {
                            left_val
                        } else {
                            self.eval_expr(right, env)
                        }
                    }
                }
            }
            Expr::Assign { name, value, span } => {
                let val = self.eval_expr(value, env);
                if val.is_aborting() {
                    return val;
                }
                self.assign_var(name, val, span, env)
            }
            Expr::CompoundAssign {
                name,
                op,
                value,
                span,
            } => {
                let current = match env.borrow().get(name) {
                    Some(value) => value,
                    None => {
                        return Self::error(span, format!("undefined identifier '{}'", name))
                    }
                };
                let rhs = self.eval_expr(value, env);
                if rhs.is_aborting() {
                    return rhs;
                }
                let combined = eval_infix_op(*op, current, rhs, span);
                if combined.is_aborting() {
                    return combined;
                }
                self.assign_var(name, combined, span, env)
            }
            Expr::Dot {
                object,
                property,
                span,
            } => {
                let object_val = self.eval_expr(object, env);
                if object_val.is_aborting() {
                    return object_val;
                }
                self.eval_dot(object_val, property, span, env)
            }
            Expr::Call { callee, args, span } => {
                let callee_val = self.eval_expr(callee, env);
                if callee_val.is_aborting() {
                    return callee_val;
                }
                let mut arg_vals = Vec::with_capacity(args.len());
                for arg in args {
                    let val = self.eval_expr(arg, env);
                    if val.is_aborting() {
                        return val;
                    }
                    arg_vals.push(val);
                }
                self.apply(&callee_val, arg_vals, span)
            }
            Expr::Index {
                object,
                index,
                span,
            } => {
                let object_val = self.eval_expr(object, env);
                if object_val.is_aborting() {
                    return object_val;
                }
                let index_val = self.eval_expr(index, env);
                if index_val.is_aborting() {
                    return index_val;
                }
                eval_index(object_val, index_val, span)
            }
            Expr::Slice {
                object,
                start,
                end,
                span,
            } => {
                let object_val = self.eval_expr(object, env);
                if object_val.is_aborting() {
                    return object_val;
                }
                let start_val = match start {
                    Some(expr) => {
                        let v = self.eval_expr(expr, env);
                        if v.is_aborting() {
                            return v;
                        }
                        Some(v)
                    }
                    None => None,
                };
                let end_val = match end {
                    Some(expr) => {
                        let v = self.eval_expr(expr, env);
                        if v.is_aborting() {
                            return v;
                        }
                        Some(v)
                    }
                    None => None,
                };
                eval_slice(object_val, start_val, end_val, span)
            }
            Expr::Range { start, end, span } => {
                let start_val = self.eval_expr(start, env);
                if start_val.is_aborting() {
                    return start_val;
                }
                let end_val = self.eval_expr(end, env);
                if end_val.is_aborting() {
                    return end_val;
                }
                match (start_val, end_val) {
                    (Value::Integer(s), Value::Integer(e)) => Value::Range(s, e),
                    (s, e) => Self::error(
                        span,
                        format!(
                            "range bounds must be integers, got {} and {}",
                            s.type_name(),
                            e.type_name()
                        ),
                    ),
                }
            }
            Expr::ArrayLit { elements, span } => {
                let mut items = Vec::new();
                for element in elements {
                    match element {
                        ArrayElement::Item(expr) => {
                            let val = self.eval_expr(expr, env);
                            if val.is_aborting() {
                                return val;
                            }
                            items.push(val);
                        }
                        ArrayElement::Spread(expr) => {
                            let val = self.eval_expr(expr, env);
                            if val.is_aborting() {
                                return val;
                            }
                            match val {
                                Value::Array(inner) => items.extend(inner),
                                other => {
                                    return Self::error(
                                        span,
                                        format!("cannot spread {}", other.type_name()),
                                    )
                                }
                            }
                        }
                    }
                }
                Value::Array(items)
            }
            Expr::MapLit { pairs, span } => {
                let mut map = HashMap::new();
                for (key_expr, value_expr) in pairs {
                    let key_val = self.eval_expr(key_expr, env);
                    if key_val.is_aborting() {
                        return key_val;
                    }
                    let key = match HashKey::from_value(&key_val) {
                        Some(key) => key,
                        None => {
                            return Self::error(
                                span,
                                format!("unusable as map key: {}", key_val.type_name()),
                            )
                        }
                    };
                    let value = self.eval_expr(value_expr, env);
                    if value.is_aborting() {
                        return value;
                    }
                    map.insert(key, value);
                }
                Value::Map(map)
            }
            Expr::StructLit { name, fields, span } => {
                let struct_type = match env.borrow().get(name) {
                    Some(Value::Struct(st)) => st,
                    Some(other) => {
                        return Self::error(
                            span,
                            format!("'{}' is not a struct type ({})", name, other.type_name()),
                        )
                    }
                    None => return Self::error(span, format!("unknown struct '{}'", name)),
                };

                let mut field_values = HashMap::new();
                for (field, expr) in fields {
                    if !struct_type.fields.contains(field) {
                        return Self::error(
                            span,
                            format!("struct {} has no field '{}'", name, field),
                        );
                    }
                    let value = self.eval_expr(expr, env);
                    if value.is_aborting() {
                        return value;
                    }
                    field_values.insert(field.clone(), value);
                }
                for field in &struct_type.fields {
                    field_values.entry(field.clone()).or_insert(Value::Null);
                }

                Value::Instance(Rc::new(RefCell::new(Instance {
                    struct_type,
                    fields: field_values,
                })))
            }
            Expr::FunctionLit {
                params, ret, body, ..
            } => Value::Function(Rc::new(Function {
                params: params.clone(),
                ret: ret.clone(),
                body: (**body).clone(),
                env: Rc::clone(env),
            })),
            Expr::ArrowFunction { params, body, .. } => Value::ArrowFunction(Rc::new(Function {
                params: params.clone(),
                ret: None,
                body: (**body).clone(),
                env: Rc::clone(env),
            })),
            Expr::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => {
                let cond = self.eval_expr(condition, env);
                if cond.is_aborting() {
                    return cond;
                }
                if cond.is_truthy() {
                    self.eval_stmt(then_branch, env)
                } else if let Some(else_branch) = else_branch {
                    self.eval_stmt(else_branch, env)
                } else {
                    Value::Null
                }
            }
            Expr::While {
                condition, body, ..
            } => {
                let mut last = Value::Null;
                loop {
                    let cond = self.eval_expr(condition, env);
                    if cond.is_aborting() {
                        return cond;
                    }
                    if !cond.is_truthy() {
                        break;
                    }
                    let result = self.eval_stmt(body, env);
                    match result {
                        Value::Break => break,
                        Value::Continue => continue,
                        Value::Error(_) | Value::Return(_) => return result,
                        other => last = other,
                    }
                }
                last
            }
            Expr::ForC {
                init,
                condition,
                update,
                body,
                ..
            } => {
                let scope = Environment::with(Rc::clone(env)).shared();
                if let Some(init) = init {
                    let result = self.eval_stmt(init, &scope);
                    if result.is_aborting() {
                        return result;
                    }
                }

                let mut last = Value::Null;
                loop {
                    if let Some(condition) = condition {
                        let cond = self.eval_expr(condition, &scope);
                        if cond.is_aborting() {
                            return cond;
                        }
                        if !cond.is_truthy() {
                            break;
                        }
                    }

                    let result = self.eval_stmt(body, &scope);
                    match result {
                        Value::Break => break,
                        // Continue still runs the update clause below
                        Value::Continue => {}
                        Value::Error(_) | Value::Return(_) => return result,
                        other => last = other,
                    }

                    if let Some(update) = update {
                        let result = self.eval_stmt(update, &scope);
                        if result.is_aborting() {
                            return result;
                        }
                    }
                }
                last
            }
            Expr::ForIn {
                index,
                item,
                iterable,
                body,
                span,
            } => {
                let iterable_val = self.eval_expr(iterable, env);
                if iterable_val.is_aborting() {
                    return iterable_val;
                }

                let entries: Vec<(Value, Value)> = match iterable_val {
                    Value::Array(items) => items
                        .into_iter()
                        .enumerate()
                        .map(|(i, v)| (Value::Integer(i as i64), v))
                        .collect(),
                    Value::Range(start, end) => (start..end)
                        .enumerate()
                        .map(|(i, n)| (Value::Integer(i as i64), Value::Integer(n)))
                        .collect(),
                    Value::String(s) => s
                        .chars()
                        .enumerate()
                        .map(|(i, c)| (Value::Integer(i as i64), Value::Char(c)))
                        .collect(),
                    Value::Map(pairs) => pairs
                        .into_iter()
                        .map(|(k, v)| (k.to_value(), v))
                        .collect(),
                    other => {
                        return Self::error(span, format!("not iterable: {}", other.type_name()))
                    }
                };

                let mut last = Value::Null;
                for (key, value) in entries {
                    // Fresh scope per iteration, so closures created in the
                    // body capture that iteration's binding
                    let scope = Environment::with(Rc::clone(env)).shared();
                    if let Some(index_name) = index {
                        scope.borrow_mut().define(index_name, key);
                    }
                    scope.borrow_mut().define(item, value);

                    let result = self.eval_stmt(body, &scope);
                    match result {
                        Value::Break => break,
                        Value::Continue => continue,
                        Value::Error(_) | Value::Return(_) => return result,
                        other => last = other,
                    }
                }
                last
            }
            Expr::Switch {
                subject,
                cases,
                default,
                ..
            } => self.eval_switch(subject, cases, default.as_deref(), env),
            Expr::Ternary {
                condition,
                then_expr,
                else_expr,
                ..
            } => {
                let cond = self.eval_expr(condition, env);
                if cond.is_aborting() {
                    return cond;
                }
                if cond.is_truthy() {
                    self.eval_expr(then_expr, env)
                } else {
                    self.eval_expr(else_expr, env)
                }
            }
            Expr::TryCatch {
                try_block,
                err_name,
                catch_block,
                ..
            } => {
                let result = self.eval_stmt(try_block, env);
                if let Value::Error(err) = result {
                    let scope = Environment::with(Rc::clone(env)).shared();
                    scope
                        .borrow_mut()
                        .define(err_name, Value::String(err.message));
                    self.eval_stmt(catch_block, &scope)
                } else {
                    result
                }
            }
            Expr::Break { .. } => Value::Break,
            Expr::Continue { .. } => Value::Continue,
        }
    }

    fn eval_switch(
        &mut self,
        subject: &Expr,
        cases: &[SwitchCase],
        default: Option<&Stmt>,
        env: &Rc<RefCell<Environment>>,
    ) -> Value {
        let subject_val = self.eval_expr(subject, env);
        if subject_val.is_aborting() {
            return subject_val;
        }

        for case in cases {
            for value_expr in &case.values {
                let value = self.eval_expr(value_expr, env);
                if value.is_aborting() {
                    return value;
                }
                if value == subject_val {
                    return self.eval_stmt(&case.body, env);
                }
            }
        }

        match default {
            Some(stmt) => self.eval_stmt(stmt, env),
            None => Value::Null,
        }
    }

    /// `++`/`--`. The new value comes back for the prefix form, the old one
    /// for the postfix form.
    fn eval_inc_dec(
        &mut self,
        operand: &Expr,
        delta: i64,
        postfix: bool,
        span: &Span,
        env: &Rc<RefCell<Environment>>,
    ) -> Value {
        let name = match operand {
            Expr::Identifier { name, .. } => name,
            _ => {
                return Self::error(
                    span,
                    "increment/decrement target must be an identifier".to_string(),
                )
            }
        };

        let current = match env.borrow().get(name) {
            Some(value) => value,
            None => return Self::error(span, format!("undefined identifier '{}'", name)),
        };

        let next = match &current {
            Value::Integer(n) => Value::Integer(n.wrapping_add(delta)),
            Value::Float(f) => Value::Float(f + delta as f64),
            other => {
                return Self::error(
                    span,
                    format!("cannot increment/decrement {}", other.type_name()),
                )
            }
        };

        let written = self.assign_var(name, next.clone(), span, env);
        if written.is_aborting() {
            return written;
        }

        if postfix {
            current
        } else {
            next
        }
    }

    /// Writes through the update path: const bindings reject the write, and
    /// assignment never creates a binding.
    fn assign_var(
        &mut self,
        name: &str,
        value: Value,
        span: &Span,
        env: &Rc<RefCell<Environment>>,
    ) -> Value {
        if env.borrow().is_const(name) {
            return Self::error(span, format!("cannot assign to constant '{}'", name));
        }
        if env.borrow_mut().assign(name, value.clone()) {
            value
        } else {
            Self::error(
                span,
                format!("cannot assign to undefined identifier '{}'", name),
            )
        }
    }

    fn eval_dot(
        &mut self,
        object: Value,
        property: &str,
        span: &Span,
        env: &Rc<RefCell<Environment>>,
    ) -> Value {
        match object {
            Value::Instance(instance) => {
                if let Some(value) = instance.borrow().fields.get(property) {
                    return value.clone();
                }

                let type_name = instance.borrow().struct_type.name.clone();
                let key = format!("{}.{}", type_name, property);
                match env.borrow().get(&key) {
                    Some(Value::Function(method)) => {
                        // Method binding is closure specialization: the
                        // method's defining scope extended with `self`
                        let bound = Environment::with(Rc::clone(&method.env)).shared();
                        bound
                            .borrow_mut()
                            .define("self", Value::Instance(Rc::clone(&instance)));
                        Value::Function(Rc::new(Function {
                            params: method.params.clone(),
                            ret: method.ret.clone(),
                            body: method.body.clone(),
                            env: bound,
                        }))
                    }
                    Some(other) => Self::error(
                        span,
                        format!("'{}' is not a method ({})", key, other.type_name()),
                    ),
                    None => Self::error(
                        span,
                        format!("unknown field or method '{}' on {}", property, type_name),
                    ),
                }
            }
            Value::Enum(enum_type) => {
                if enum_type.variants.iter().any(|v| v == property) {
                    Value::EnumValue {
                        enum_name: Rc::from(enum_type.name.as_str()),
                        variant: property.to_string(),
                    }
                } else {
                    Self::error(
                        span,
                        format!("enum {} has no variant '{}'", enum_type.name, property),
                    )
                }
            }
            Value::Map(pairs) => match pairs.get(&HashKey::String(property.to_string())) {
                Some(value) => value.clone(),
                None => Self::error(span, format!("map has no member '{}'", property)),
            },
            other => Self::error(
                span,
                format!("property access not supported for {}", other.type_name()),
            ),
        }
    }

    /// Uniform application path for every callable value.
    pub fn apply(&mut self, callee: &Value, args: Vec<Value>, span: &Span) -> Value {
        match callee {
            Value::Function(func) | Value::ArrowFunction(func) => {
                self.apply_function(func, args, span)
            }
            Value::Builtin(builtin) => (builtin.func)(self, &args, span),
            other => Self::error(span, format!("not callable: {}", other.type_name())),
        }
    }

    fn apply_function(&mut self, func: &Rc<Function>, args: Vec<Value>, span: &Span) -> Value {
        if args.len() != func.params.len() {
            return Self::error(
                span,
                format!(
                    "wrong number of arguments: expected {}, got {}",
                    func.params.len(),
                    args.len()
                ),
            );
        }

        // The call scope encloses the captured defining scope, not the
        // caller's
        let scope = Environment::with(Rc::clone(&func.env)).shared();
        for (param, arg) in func.params.iter().zip(args) {
            if let Some(declared) = &param.ty {
                if !type_matches(declared, &arg) {
                    return Self::error(
                        span,
                        format!(
                            "type mismatch for parameter '{}': declared {}, got {}",
                            param.name,
                            declared,
                            arg.type_name()
                        ),
                    );
                }
            }
            scope.borrow_mut().define(&param.name, arg);
        }

        let result = self.eval_stmt(&func.body, &scope);
        let result = match result {
            Value::Return(inner) => *inner,
            Value::Error(_) => return result,
            Value::Break => return Self::error(span, "'break' outside of a loop".to_string()),
            Value::Continue => {
                return Self::error(span, "'continue' outside of a loop".to_string())
            }
            other => other,
        };

        if let Some(declared) = &func.ret {
            if !type_matches(declared, &result) {
                return Self::error(
                    span,
                    format!(
                        "return type mismatch: declared {}, got {}",
                        declared,
                        result.type_name()
                    ),
                );
            }
        }
        result
    }

    // ---- string interpolation ----

    /// Decodes escapes, then evaluates each `${...}` span as a standalone
    /// expression in the current scope. Balanced braces delimit a span; a
    /// `$` not followed by `{` passes through unchanged.
    fn interpolate(&mut self, raw: &str, span: &Span, env: &Rc<RefCell<Environment>>) -> Value {
        let mut out = String::new();
        let mut chars = raw.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some('0') => out.push('\0'),
                    Some('\\') => out.push('\\'),
                    Some('"') => out.push('"'),
                    Some('\'') => out.push('\''),
                    Some('$') => out.push('$'),
                    Some(other) => {
                        out.push('\\');
                        out.push(other);
                    }
                    None => out.push('\\'),
                },
                '$' if chars.peek() == Some(&'{') => {
                    chars.next();
                    let mut depth = 1usize;
                    let mut snippet = String::new();
                    loop {
                        match chars.next() {
                            Some('{') => {
                                depth += 1;
                                snippet.push('{');
                            }
                            Some('}') => {
                                depth -= 1;
                                if depth == 0 {
                                    break;
                                }
                                snippet.push('}');
                            }
                            Some(c) => snippet.push(c),
                            None => {
                                return Self::error(
                                    span,
                                    "unterminated interpolation in string".to_string(),
                                )
                            }
                        }
                    }

                    let value = self.eval_embedded(&snippet, span, env);
                    if value.is_aborting() {
                        return value;
                    }
                    out.push_str(&value.to_string());
                }
                _ => out.push(c),
            }
        }

        Value::String(out)
    }

    /// Re-enters the lexer and parser for an interpolated expression. Parse
    /// failures surface through the runtime error channel.
    fn eval_embedded(&mut self, source: &str, span: &Span, env: &Rc<RefCell<Environment>>) -> Value {
        let tokens = match Lexer::new(source).scan_tokens() {
            Ok(tokens) => tokens,
            Err(e) => return Self::error(span, format!("in interpolation: {}", e.message)),
        };

        let (program, errors) = Parser::new(tokens).parse();
        if let Some(first) = errors.first() {
            return Self::error(span, format!("in interpolation: {}", first.message));
        }

        match program.statements.as_slice() {
            [Stmt::Expression { expr, .. }] => self.eval_expr(expr, env),
            _ => Self::error(
                span,
                "interpolation must contain a single expression".to_string(),
            ),
        }
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

// ---- operator semantics ----

fn type_matches(declared: &str, value: &Value) -> bool {
    match declared {
        "any" => true,
        "int" => matches!(value, Value::Integer(_)),
        "float" => matches!(value, Value::Float(_)),
        "string" => matches!(value, Value::String(_)),
        "bool" => matches!(value, Value::Bool(_)),
        "char" => matches!(value, Value::Char(_)),
        "array" => matches!(value, Value::Array(_)),
        "map" => matches!(value, Value::Map(_)),
        "range" => matches!(value, Value::Range(_, _)),
        "null" => matches!(value, Value::Null),
        "function" => matches!(
            value,
            Value::Function(_) | Value::ArrowFunction(_) | Value::Builtin(_)
        ),
        other => value.type_name() == other,
    }
}

fn mismatch(op: InfixOp, left: &Value, right: &Value, span: &Span) -> Value {
    Value::Error(RuntimeError {
        message: format!(
            "cannot apply '{}' to {} and {}",
            op.symbol(),
            left.type_name(),
            right.type_name()
        ),
        span: span.clone(),
    })
}

fn div_by_zero(span: &Span) -> Value {
    Value::Error(RuntimeError {
        message: "division by zero".to_string(),
        span: span.clone(),
    })
}

/// Integer/integer stays integer; mixed numeric promotes the integer side.
/// Equality falls back to identity when the types are otherwise
/// incomparable; every other mismatched combination is a type error.
fn eval_infix_op(op: InfixOp, left: Value, right: Value, span: &Span) -> Value {
    match op {
        InfixOp::Equal => Value::Bool(left == right),
        InfixOp::NotEqual => Value::Bool(left != right),
        InfixOp::Add => match (left, right) {
            (Value::Integer(l), Value::Integer(r)) => Value::Integer(l.wrapping_add(r)),
            (Value::Float(l), Value::Float(r)) => Value::Float(l + r),
            (Value::Integer(l), Value::Float(r)) => Value::Float(l as f64 + r),
            (Value::Float(l), Value::Integer(r)) => Value::Float(l + r as f64),
            (Value::String(l), Value::String(r)) => Value::String(l + &r),
            (l, r) => mismatch(op, &l, &r, span),
        },
        InfixOp::Subtract => match (left, right) {
            (Value::Integer(l), Value::Integer(r)) => Value::Integer(l.wrapping_sub(r)),
            (Value::Float(l), Value::Float(r)) => Value::Float(l - r),
            (Value::Integer(l), Value::Float(r)) => Value::Float(l as f64 - r),
            (Value::Float(l), Value::Integer(r)) => Value::Float(l - r as f64),
            (l, r) => mismatch(op, &l, &r, span),
        },
        InfixOp::Multiply => match (left, right) {
            (Value::Integer(l), Value::Integer(r)) => Value::Integer(l.wrapping_mul(r)),
            (Value::Float(l), Value::Float(r)) => Value::Float(l * r),
            (Value::Integer(l), Value::Float(r)) => Value::Float(l as f64 * r),
            (Value::Float(l), Value::Integer(r)) => Value::Float(l * r as f64),
            (l, r) => mismatch(op, &l, &r, span),
        },
        InfixOp::Divide => match (left, right) {
            (Value::Integer(_), Value::Integer(0)) => div_by_zero(span),
            (Value::Integer(l), Value::Integer(r)) => Value::Integer(l.wrapping_div(r)),
            (Value::Float(l), Value::Float(r)) => {
                if r == 0.0 {
                    div_by_zero(span)
                } else {
                    Value::Float(l / r)
                }
            }
            (Value::Integer(l), Value::Float(r)) => {
                if r == 0.0 {
                    div_by_zero(span)
                } else {
                    Value::Float(l as f64 / r)
                }
            }
            (Value::Float(l), Value::Integer(r)) => {
                if r == 0 {
                    div_by_zero(span)
                } else {
                    Value::Float(l / r as f64)
                }
            }
            (l, r) => mismatch(op, &l, &r, span),
        },
        InfixOp::Modulo => match (left, right) {
            (Value::Integer(_), Value::Integer(0)) => div_by_zero(span),
            (Value::Integer(l), Value::Integer(r)) => Value::Integer(l.wrapping_rem(r)),
            (Value::Float(l), Value::Float(r)) => {
                if r == 0.0 {
                    div_by_zero(span)
                } else {
                    Value::Float(l % r)
                }
            }
            (Value::Integer(l), Value::Float(r)) => {
                if r == 0.0 {
                    div_by_zero(span)
                } else {
                    Value::Float(l as f64 % r)
                }
            }
            (Value::Float(l), Value::Integer(r)) => {
                if r == 0 {
                    div_by_zero(span)
                } else {
                    Value::Float(l % r as f64)
                }
            }
            (l, r) => mismatch(op, &l, &r, span),
        },
        InfixOp::Less | InfixOp::LessEqual | InfixOp::Greater | InfixOp::GreaterEqual => {
            let ordering = match (&left, &right) {
                (Value::Integer(l), Value::Integer(r)) => l.partial_cmp(r),
                (Value::Float(l), Value::Float(r)) => l.partial_cmp(r),
                (Value::Integer(l), Value::Float(r)) => (*l as f64).partial_cmp(r),
                (Value::Float(l), Value::Integer(r)) => l.partial_cmp(&(*r as f64)),
                (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
                (Value::Char(l), Value::Char(r)) => Some(l.cmp(r)),
                _ => None,
            };
            match ordering {
                Some(ordering) => Value::Bool(match op {
                    InfixOp::Less => ordering.is_lt(),
                    InfixOp::LessEqual => ordering.is_le(),
                    InfixOp::Greater => ordering.is_gt(),
                    InfixOp::GreaterEqual => ordering.is_ge(),
                    _ => unreachable!(),
                }),
                None => mismatch(op, &left, &right, span),
            }
        }
    }
}

fn eval_index(object: Value, index: Value, span: &Span) -> Value {
    match (&object, &index) {
        (Value::Array(items), Value::Integer(i)) => {
            if *i < 0 || *i as usize >= items.len() {
                Value::Error(RuntimeError {
                    message: format!("index {} out of bounds (len {})", i, items.len()),
                    span: span.clone(),
                })
            } else {
                items[*i as usize].clone()
            }
        }
        (Value::String(s), Value::Integer(i)) => match s.chars().nth(*i as usize) {
            Some(c) if *i >= 0 => Value::Char(c),
            _ => Value::Error(RuntimeError {
                message: format!("index {} out of bounds (len {})", i, s.chars().count()),
                span: span.clone(),
            }),
        },
        (Value::Map(pairs), key) => match HashKey::from_value(key) {
            Some(key) => pairs.get(&key).cloned().unwrap_or(Value::Null),
            None => Value::Error(RuntimeError {
                message: format!("unusable as map key: {}", key.type_name()),
                span: span.clone(),
            }),
        },
        _ => Value::Error(RuntimeError {
            message: format!(
                "cannot index {} with {}",
                object.type_name(),
                index.type_name()
            ),
            span: span.clone(),
        }),
    }
}

/// Slice bounds clamp to the value's length; a reversed range is empty.
fn eval_slice(object: Value, start: Option<Value>, end: Option<Value>, span: &Span) -> Value {
    let as_bound = |bound: Option<Value>, default: usize| -> Result<usize, Value> {
        match bound {
            None => Ok(default),
            Some(Value::Integer(n)) => Ok(n.max(0) as usize),
            Some(other) => Err(Value::Error(RuntimeError {
                message: format!("slice bounds must be integers, got {}", other.type_name()),
                span: span.clone(),
            })),
        }
    };

    match object {
        Value::Array(items) => {
            let lo = match as_bound(start, 0) {
                Ok(n) => n.min(items.len()),
                Err(e) => return e,
            };
            let hi = match as_bound(end, items.len()) {
                Ok(n) => n.min(items.len()),
                Err(e) => return e,
            };
            if lo >= hi {
                Value::Array(Vec::new())
            } else {
                Value::Array(items[lo..hi].to_vec())
            }
        }
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            let lo = match as_bound(start, 0) {
                Ok(n) => n.min(chars.len()),
                Err(e) => return e,
            };
            let hi = match as_bound(end, chars.len()) {
                Ok(n) => n.min(chars.len()),
                Err(e) => return e,
            };
            if lo >= hi {
                Value::String(String::new())
            } else {
                Value::String(chars[lo..hi].iter().collect())
            }
        }
        other => Value::Error(RuntimeError {
            message: format!("cannot slice {}", other.type_name()),
            span: span.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval_source(source: &str) -> Value {
        let tokens = Lexer::new(source).scan_tokens().expect("lex error");
        let (program, errors) = Parser::new(tokens).parse();
        assert!(errors.is_empty(), "parse errors: {:?}", errors);
        Evaluator::new().evaluate_program(&program)
    }

    fn expect_error(source: &str) -> String {
        match eval_source(source) {
            Value::Error(err) => err.message,
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[test]
    fn block_yields_last_statement_value() {
        assert_eq!(eval_source("{ 1; 2; 3 }"), Value::Integer(3));
    }

    #[test]
    fn integer_division_stays_integer() {
        assert_eq!(eval_source("7 / 2"), Value::Integer(3));
    }

    #[test]
    fn mixed_arithmetic_promotes_to_float() {
        assert_eq!(eval_source("1 + 2.5"), Value::Float(3.5));
    }

    #[test]
    fn division_by_zero_is_an_error_value() {
        assert!(expect_error("1 / 0").contains("division by zero"));
        assert!(expect_error("1 % 0").contains("division by zero"));
        assert!(expect_error("1.0 / 0.0").contains("division by zero"));
    }

    #[test]
    fn zero_is_truthy() {
        assert_eq!(eval_source("0 ? 1 : 2"), Value::Integer(1));
        assert_eq!(eval_source("null ? 1 : 2"), Value::Integer(2));
        assert_eq!(eval_source("false ? 1 : 2"), Value::Integer(2));
    }

    #[test]
    fn equality_falls_back_to_identity_across_types() {
        assert_eq!(eval_source("1 == \"1\""), Value::Bool(false));
        assert_eq!(eval_source("1 != \"1\""), Value::Bool(true));
    }

    #[test]
    fn mismatched_operands_name_both_types() {
        let message = expect_error("1 + \"s\"");
        assert!(message.contains("int"), "message: {}", message);
        assert!(message.contains("string"), "message: {}", message);
    }

    #[test]
    fn assignment_to_undefined_is_an_error() {
        assert!(expect_error("x = 1").contains("undefined"));
    }

    #[test]
    fn assignment_updates_the_defining_scope() {
        assert_eq!(eval_source("let x = 1; { x = 2 } x"), Value::Integer(2));
    }

    #[test]
    fn chained_assignment_threads_the_value() {
        assert_eq!(
            eval_source("let a = 0; let b = 0; a = b = 5; a + b"),
            Value::Integer(10)
        );
    }

    #[test]
    fn const_rejects_every_assignment_operator() {
        assert!(expect_error("const X = 1; X = 2").contains("constant"));
        assert!(expect_error("const X = 1; X += 2").contains("constant"));
        assert!(expect_error("make X = 1; X = 2").contains("constant"));
    }

    #[test]
    fn typed_declaration_checks_runtime_variant() {
        assert_eq!(eval_source("let x: int = 5; x"), Value::Integer(5));
        let message = expect_error("let x: int = \"s\"");
        assert!(message.contains("int") && message.contains("string"));
    }

    #[test]
    fn function_unwraps_return_and_defaults_to_last_expression() {
        assert_eq!(
            eval_source("define f() { return 1; 2 } f()"),
            Value::Integer(1)
        );
        assert_eq!(eval_source("define f() { 41 + 1 } f()"), Value::Integer(42));
    }

    #[test]
    fn arity_mismatch_is_reported() {
        assert!(expect_error("define f(a) { a } f(1, 2)").contains("arguments"));
    }

    #[test]
    fn closures_capture_the_defining_scope_per_call() {
        let source = "
            define counter() {
                let n = 0
                return define() { n = n + 1; return n }
            }
            let a = counter()
            let b = counter()
            a(); a();
            [a(), b()]
        ";
        assert_eq!(
            eval_source(source),
            Value::Array(vec![Value::Integer(3), Value::Integer(1)])
        );
    }

    #[test]
    fn methods_bind_self_as_closure_specialization() {
        let source = "
            struct Point { x, y }
            define Point.sum() { return self.x + self.y }
            let p = Point { x: 3, y: 4 }
            p.sum()
        ";
        assert_eq!(eval_source(source), Value::Integer(7));
    }

    #[test]
    fn break_terminates_only_innermost_loop() {
        let source = "
            let hits = 0
            for (let i = 0; i < 3; i++) {
                for (let j = 0; j < 3; j++) {
                    if j == 1 { break }
                    hits += 1
                }
            }
            hits
        ";
        assert_eq!(eval_source(source), Value::Integer(3));
    }

    #[test]
    fn continue_still_runs_c_style_update_clause() {
        let source = "
            let sum = 0
            for (let i = 0; i < 5; i++) {
                if i % 2 == 0 { continue }
                sum += i
            }
            sum
        ";
        assert_eq!(eval_source(source), Value::Integer(4));
    }

    #[test]
    fn return_escapes_past_loop_boundaries() {
        let source = "
            define f() {
                while true { return 9 }
            }
            f()
        ";
        assert_eq!(eval_source(source), Value::Integer(9));
    }

    #[test]
    fn indexed_for_in_yields_pairs_in_order() {
        let source = "
            let out = []
            for i, x in [\"a\", \"b\", \"c\"] {
                out = push(out, str(i) + x)
            }
            out
        ";
        assert_eq!(
            eval_source(source),
            Value::Array(vec![
                Value::String("0a".to_string()),
                Value::String("1b".to_string()),
                Value::String("2c".to_string()),
            ])
        );
    }

    #[test]
    fn short_circuit_skips_the_right_operand() {
        assert_eq!(
            eval_source("let hit = false; false and (hit = true); hit"),
            Value::Bool(false)
        );
        assert_eq!(
            eval_source("let hit = false; true or (hit = true); hit"),
            Value::Bool(false)
        );
    }

    #[test]
    fn interpolation_evaluates_in_current_scope() {
        assert_eq!(
            eval_source("\"${1 + 2}\""),
            Value::String("3".to_string())
        );
        assert_eq!(
            eval_source("let who = \"sable\"; \"hi ${who}!\""),
            Value::String("hi sable!".to_string())
        );
        assert_eq!(
            eval_source("\"price: 5$ off\""),
            Value::String("price: 5$ off".to_string())
        );
    }

    #[test]
    fn malformed_interpolation_surfaces_as_error() {
        assert!(expect_error("\"${1 +}\"").contains("interpolation"));
    }

    #[test]
    fn try_catch_binds_the_message_and_recovers() {
        assert_eq!(
            eval_source("try { 1 / 0 } catch e { e }"),
            Value::String("division by zero".to_string())
        );
        assert_eq!(
            eval_source("try { 42 } catch e { 0 }"),
            Value::Integer(42)
        );
    }

    #[test]
    fn switch_matches_any_case_value_or_default() {
        let source = "
            define grade(n) {
                switch n {
                    case 1, 2: { return \"low\" }
                    case 3: { return \"mid\" }
                    default: { return \"high\" }
                }
            }
            [grade(2), grade(3), grade(9)]
        ";
        assert_eq!(
            eval_source(source),
            Value::Array(vec![
                Value::String("low".to_string()),
                Value::String("mid".to_string()),
                Value::String("high".to_string()),
            ])
        );
    }

    #[test]
    fn map_keys_restricted_to_hashable_subset() {
        assert!(expect_error("let m = {[1]: 2}").contains("map key"));
        assert_eq!(
            eval_source("let m = {\"a\": 1, 2: true, false: 0}; m[2]"),
            Value::Bool(true)
        );
    }

    #[test]
    fn missing_map_key_reads_null() {
        assert_eq!(eval_source("{\"a\": 1}[\"b\"]"), Value::Null);
    }

    #[test]
    fn spread_flattens_at_evaluation_time() {
        assert_eq!(
            eval_source("let xs = [2, 3]; [1, ...xs, 4]"),
            Value::Array(vec![
                Value::Integer(1),
                Value::Integer(2),
                Value::Integer(3),
                Value::Integer(4),
            ])
        );
    }

    #[test]
    fn slices_clamp_and_default_their_bounds() {
        assert_eq!(
            eval_source("[1, 2, 3, 4][1:3]"),
            Value::Array(vec![Value::Integer(2), Value::Integer(3)])
        );
        assert_eq!(
            eval_source("\"hello\"[:2]"),
            Value::String("he".to_string())
        );
        assert_eq!(
            eval_source("[1, 2][1:99]"),
            Value::Array(vec![Value::Integer(2)])
        );
    }

    #[test]
    fn postfix_yields_old_value_prefix_yields_new() {
        assert_eq!(eval_source("let i = 1; [i++, i]"), Value::Array(vec![
            Value::Integer(1),
            Value::Integer(2),
        ]));
        assert_eq!(eval_source("let i = 1; [++i, i]"), Value::Array(vec![
            Value::Integer(2),
            Value::Integer(2),
        ]));
    }

    #[test]
    fn increment_wraps_at_integer_bounds() {
        assert_eq!(
            eval_source("let x = 9223372036854775807; x++; x"),
            Value::Integer(i64::MIN)
        );
        assert_eq!(
            eval_source("let x = -9223372036854775807; x--; x--; x"),
            Value::Integer(i64::MAX)
        );
    }

    #[test]
    fn enum_values_compare_by_variant() {
        let source = "
            enum Color { Red, Green }
            let c = Color.Red
            c == Color.Red
        ";
        assert_eq!(eval_source(source), Value::Bool(true));
        assert!(expect_error("enum Color { Red } Color.Blue").contains("variant"));
    }

    #[test]
    fn higher_order_builtins_pass_index_by_arity() {
        assert_eq!(
            eval_source("map([10, 20], (x) => x + 1)"),
            Value::Array(vec![Value::Integer(11), Value::Integer(21)])
        );
        assert_eq!(
            eval_source("map([10, 20], (x, i) => x + i)"),
            Value::Array(vec![Value::Integer(10), Value::Integer(21)])
        );
        assert_eq!(
            eval_source("filter([1, 2, 3, 4], (x) => x % 2 == 0)"),
            Value::Array(vec![Value::Integer(2), Value::Integer(4)])
        );
        assert_eq!(
            eval_source("reduce([1, 2, 3], 0, (acc, x) => acc + x)"),
            Value::Integer(6)
        );
    }

    #[test]
    fn not_callable_and_not_iterable_name_the_type() {
        assert!(expect_error("let x = 1; x()").contains("not callable"));
        assert!(expect_error("for x in 5 { x }").contains("not iterable"));
    }

    #[test]
    fn typed_parameters_and_returns_are_checked() {
        assert_eq!(
            eval_source("define f(a: int): int { return a * 2 } f(4)"),
            Value::Integer(8)
        );
        assert!(expect_error("define f(a: int) { a } f(\"s\")").contains("parameter"));
        assert!(
            expect_error("define f(): int { return \"s\" } f()").contains("return type")
        );
    }

    #[test]
    fn range_iterates_half_open() {
        assert_eq!(
            eval_source("let out = []; for n in 0..3 { out = push(out, n) } out"),
            Value::Array(vec![
                Value::Integer(0),
                Value::Integer(1),
                Value::Integer(2),
            ])
        );
    }

    #[test]
    fn while_loop_yields_last_body_value() {
        assert_eq!(
            eval_source("let i = 0; while i < 3 { i = i + 1; i * 10 }"),
            Value::Integer(30)
        );
    }
}
