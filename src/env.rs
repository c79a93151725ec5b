use crate::value::Value;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// One link in the scope chain. Scopes reference their parent, never their
/// children, so closures keep a scope alive through the Rc without creating
/// cycles.
#[derive(Debug)]
pub struct Environment {
    enclosing: Option<Rc<RefCell<Environment>>>,
    values: HashMap<String, Value>,
    consts: HashSet<String>,
}

impl Environment {
    pub fn new() -> Self {
        Environment {
            enclosing: None,
            values: HashMap::new(),
            consts: HashSet::new(),
        }
    }

    pub fn with(enclosing: Rc<RefCell<Environment>>) -> Self {
        Environment {
            enclosing: Some(enclosing),
            values: HashMap::new(),
            consts: HashSet::new(),
        }
    }

    pub fn shared(self) -> Rc<RefCell<Environment>> {
        Rc::new(RefCell::new(self))
    }

    /// Defines `name` in this scope, shadowing any outer binding.
    pub fn define(&mut self, name: &str, value: Value) {
        self.values.insert(String::from(name), value);
        self.consts.remove(name);
    }

    pub fn define_const(&mut self, name: &str, value: Value) {
        self.values.insert(String::from(name), value);
        self.consts.insert(String::from(name));
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(val) = self.values.get(name) {
            Some(val.clone())
        } else if let Some(enclosing) = &self.enclosing {
            enclosing.borrow().get(name)
        } else {
            None
        }
    }

    /// Walks outward to the scope defining `name` and mutates it there.
    /// Never creates a binding; returns false when `name` is undefined
    /// anywhere in the chain.
    pub fn assign(&mut self, name: &str, value: Value) -> bool {
        if let Some(val) = self.values.get_mut(name) {
            *val = value;
            true
        } else if let Some(enclosing) = &self.enclosing {
            enclosing.borrow_mut().assign(name, value)
        } else {
            false
        }
    }

    /// Whether the binding that `name` resolves to was declared const.
    pub fn is_const(&self, name: &str) -> bool {
        if self.values.contains_key(name) {
            self.consts.contains(name)
        } else if let Some(enclosing) = &self.enclosing {
            enclosing.borrow().is_const(name)
        } else {
            false
        }
    }

    /// Top-level bindings of this scope, for merging an included file's
    /// definitions into the including scope.
    pub fn bindings(&self) -> Vec<(String, Value, bool)> {
        self.values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone(), self.consts.contains(k)))
            .collect()
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn define_and_get() {
        let mut env = Environment::new();
        env.define("foo", Value::String("bar".to_string()));
        env.define("baz", Value::Bool(false));

        assert_eq!(env.get("foo"), Some(Value::String("bar".to_string())));
        assert_eq!(env.get("baz"), Some(Value::Bool(false)));
    }

    #[test]
    fn assign_refuses_undefined() {
        let mut env = Environment::new();
        assert!(!env.assign("foo", Value::Integer(1)));
        assert_eq!(env.get("foo"), None);
    }

    #[test]
    fn assign_walks_to_defining_scope() {
        let outer = Environment::new().shared();
        outer.borrow_mut().define("n", Value::Integer(0));

        {
            let mut inner = Environment::with(Rc::clone(&outer));
            assert!(inner.assign("n", Value::Integer(5)));
        }

        assert_eq!(outer.borrow().get("n"), Some(Value::Integer(5)));
    }

    #[test]
    fn shadowing_does_not_touch_outer() {
        let outer = Environment::new().shared();
        outer.borrow_mut().define("x", Value::Integer(1));

        let mut inner = Environment::with(Rc::clone(&outer));
        inner.define("x", Value::Integer(2));
        assert_eq!(inner.get("x"), Some(Value::Integer(2)));
        assert_eq!(outer.borrow().get("x"), Some(Value::Integer(1)));
    }

    #[test]
    fn const_tracking_crosses_scopes() {
        let outer = Environment::new().shared();
        outer.borrow_mut().define_const("PI", Value::Float(3.14));

        let inner = Environment::with(Rc::clone(&outer));
        assert!(inner.is_const("PI"));
        assert!(!inner.is_const("missing"));
    }

    #[test]
    fn redefining_clears_const_mark() {
        let mut env = Environment::new();
        env.define_const("x", Value::Integer(1));
        assert!(env.is_const("x"));
        env.define("x", Value::Integer(2));
        assert!(!env.is_const("x"));
    }
}
