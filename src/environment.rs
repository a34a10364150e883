use crate::source::Span;
use crate::types::Value;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use thiserror::Error;

// --- Environment Error ---
// Converted into the matching RuntimeError variants by the evaluator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EnvError {
    #[error("undefined variable '{0}'")]
    UndefinedVariable(String, Span), // Name, span where lookup happened
    #[error("cannot assign to undefined variable '{0}'")]
    UndefinedAssignmentTarget(String, Span),
}

// --- Environment Definition ---

#[derive(Debug, Default)]
pub struct Environment {
    // Rc<RefCell<...>> gives shared ownership and interior mutability.
    // Needed for closures capturing environments and for assignment.
    outer: Option<Rc<RefCell<Environment>>>,
    bindings: HashMap<String, Value>,
}

impl Environment {
    /// Creates a new, top-level (global) environment.
    pub fn new() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Environment::default()))
    }

    /// Creates a new environment enclosed within an outer one.
    pub fn new_enclosed(outer_env: Rc<RefCell<Environment>>) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Environment {
            outer: Some(outer_env),
            bindings: HashMap::new(),
        }))
    }

    /// Defines a variable in the *current* environment frame.
    /// Replaces the value if the variable already exists in this frame.
    pub fn define(&mut self, name: String, value: Value) {
        self.bindings.insert(name, value);
    }

    /// Looks up a variable's value.
    /// Checks the current environment first, then walks up the outer environment chain.
    /// `lookup_span` is the location where the variable was referenced, used for error reporting.
    pub fn get(&self, name: &str, lookup_span: Span) -> Result<Value, EnvError> {
        if let Some(value) = self.bindings.get(name) {
            return Ok(value.clone());
        }
        match &self.outer {
            Some(outer_env_ptr) => outer_env_ptr.borrow().get(name, lookup_span),
            None => Err(EnvError::UndefinedVariable(name.to_string(), lookup_span)),
        }
    }

    /// Sets the value of an *existing* variable in the environment chain.
    /// Searches outward from the current environment and updates the first frame
    /// where the variable is found. Never creates a binding.
    pub fn assign(&mut self, name: &str, value: Value, assign_span: Span) -> Result<(), EnvError> {
        if let Some(slot) = self.bindings.get_mut(name) {
            *slot = value;
            return Ok(());
        }
        match &self.outer {
            Some(outer_env_ptr) => outer_env_ptr.borrow_mut().assign(name, value, assign_span),
            None => Err(EnvError::UndefinedAssignmentTarget(
                name.to_string(),
                assign_span,
            )),
        }
    }

    /// True if `name` is bound in this frame (ignoring outer frames).
    pub fn contains_local(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// Drops every binding in this frame. Closures stored here that captured
    /// this frame no longer keep it alive.
    pub fn clear(&mut self) {
        self.bindings.clear();
    }

    /// Gets all identifiers visible from the current environment
    pub fn identifiers(&self) -> HashSet<String> {
        let mut identifiers: HashSet<String> = self.bindings.keys().cloned().collect();
        if let Some(outer_env_ptr) = &self.outer {
            identifiers.extend(outer_env_ptr.borrow().identifiers());
        }
        identifiers
    }
}

// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::*;

    fn num(n: f64) -> Value {
        Value::Number(n)
    }

    #[test]
    fn test_define_and_get_global() {
        let env = Environment::new();
        env.borrow_mut().define("x".to_string(), num(10.0));

        let result = env.borrow().get("x", Span::default());
        assert_eq!(result, Ok(num(10.0)));
    }

    #[test]
    fn test_get_unbound_global() {
        let env = Environment::new();
        let result = env.borrow().get("y", Span::default());
        assert!(matches!(result, Err(EnvError::UndefinedVariable(s, _)) if s == "y"));
    }

    #[test]
    fn test_define_and_get_enclosed() {
        let global_env = Environment::new();
        global_env.borrow_mut().define("x".to_string(), num(10.0));

        let local_env = Environment::new_enclosed(global_env);
        local_env.borrow_mut().define("y".to_string(), num(20.0));

        assert_eq!(local_env.borrow().get("y", Span::default()), Ok(num(20.0)));
        assert_eq!(local_env.borrow().get("x", Span::default()), Ok(num(10.0)));
    }

    #[test]
    fn test_get_unbound_enclosed() {
        let global_env = Environment::new();
        let local_env = Environment::new_enclosed(global_env);

        let span = Span::new(11, 12);
        let result = local_env.borrow().get("z", span);
        assert_eq!(
            result,
            Err(EnvError::UndefinedVariable("z".to_string(), span))
        );
    }

    #[test]
    fn test_shadowing() {
        let global_env = Environment::new();
        global_env.borrow_mut().define("x".to_string(), num(10.0));

        let local_env = Environment::new_enclosed(global_env.clone());
        local_env.borrow_mut().define("x".to_string(), num(50.0)); // Shadow global x

        let inner_local_env = Environment::new_enclosed(local_env.clone());
        inner_local_env
            .borrow_mut()
            .define("y".to_string(), Value::String("y-value".to_string()));

        assert_eq!(
            inner_local_env.borrow().get("x", Span::default()),
            Ok(num(50.0))
        );
        assert_eq!(
            inner_local_env.borrow().get("y", Span::default()),
            Ok(Value::String("y-value".to_string()))
        );
        assert_eq!(global_env.borrow().get("x", Span::default()), Ok(num(10.0)));
    }

    #[test]
    fn test_define_overwrites_in_same_frame() {
        let env = Environment::new();
        env.borrow_mut().define("x".to_string(), num(1.0));
        env.borrow_mut().define("x".to_string(), Value::Nil);
        assert_eq!(env.borrow().get("x", Span::default()), Ok(Value::Nil));
    }

    #[test]
    fn test_assign_updates_defining_frame() {
        let global_env = Environment::new();
        global_env.borrow_mut().define("x".to_string(), num(1.0));
        let local_env = Environment::new_enclosed(global_env.clone());

        local_env
            .borrow_mut()
            .assign("x", num(2.0), Span::default())
            .unwrap();

        assert!(!local_env.borrow().contains_local("x"));
        assert_eq!(global_env.borrow().get("x", Span::default()), Ok(num(2.0)));
    }

    #[test]
    fn test_assign_hits_nearest_shadow() {
        let global_env = Environment::new();
        global_env.borrow_mut().define("x".to_string(), num(1.0));
        let local_env = Environment::new_enclosed(global_env.clone());
        local_env.borrow_mut().define("x".to_string(), num(5.0));

        local_env
            .borrow_mut()
            .assign("x", num(6.0), Span::default())
            .unwrap();

        assert_eq!(local_env.borrow().get("x", Span::default()), Ok(num(6.0)));
        assert_eq!(global_env.borrow().get("x", Span::default()), Ok(num(1.0)));
    }

    #[test]
    fn test_assign_unbound_does_not_create() {
        let global_env = Environment::new();
        let local_env = Environment::new_enclosed(global_env.clone());
        let span = Span::new(3, 4);

        let result = local_env.borrow_mut().assign("ghost", num(1.0), span);

        assert_eq!(
            result,
            Err(EnvError::UndefinedAssignmentTarget("ghost".to_string(), span))
        );
        assert!(!local_env.borrow().contains_local("ghost"));
        assert!(!global_env.borrow().contains_local("ghost"));
    }

    #[test]
    fn test_identifiers_include_outer_frames() {
        let global_env = Environment::new();
        global_env.borrow_mut().define("outer".to_string(), Value::Nil);
        let local_env = Environment::new_enclosed(global_env);
        local_env.borrow_mut().define("inner".to_string(), Value::Nil);

        let identifiers = local_env.borrow().identifiers();
        assert!(identifiers.contains("outer"));
        assert!(identifiers.contains("inner"));
        assert_eq!(identifiers.len(), 2);
    }

    #[test]
    fn test_clear_drops_bindings() {
        let env = Environment::new();
        env.borrow_mut().define("x".to_string(), num(1.0));
        env.borrow_mut().clear();
        assert!(env.borrow().get("x", Span::default()).is_err());
    }
}
