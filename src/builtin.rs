use std::fmt;
use std::fmt::Formatter;

use crate::evaluator::new_error;
use crate::object::Object;

pub type BuiltinFn = fn(args: Vec<Object>) -> Object;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltinFunction {
    name: &'static str,
    func: BuiltinFn,
}

impl fmt::Display for BuiltinFunction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl BuiltinFunction {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn call(&self, args: Vec<Object>) -> Object {
        (self.func)(args)
    }
}

// registry order is load-bearing: the index is the OpGetBuiltin operand
pub const BUILTINS: &[BuiltinFunction] = &[
    BuiltinFunction {
        name: "len",
        func: builtin_len,
    },
    BuiltinFunction {
        name: "puts",
        func: builtin_puts,
    },
];

pub fn look_up(name: &str) -> Option<BuiltinFunction> {
    BUILTINS.iter().find(|b| b.name == name).copied()
}

pub fn by_index(index: usize) -> Option<BuiltinFunction> {
    BUILTINS.get(index).copied()
}

fn builtin_len(args: Vec<Object>) -> Object {
    if args.len() != 1 {
        return new_error(format!("arguments len {} mismatch, want {}", args.len(), 1));
    }

    match &args[0] {
        Object::String(s) => Object::Integer(s.len() as i64),
        Object::Array(elements) => Object::Integer(elements.len() as i64),
        Object::Hash(pairs) => Object::Integer(pairs.len() as i64),
        other => new_error(format!("type mismatch: {}", other.type_name())),
    }
}

fn builtin_puts(args: Vec<Object>) -> Object {
    for arg in args {
        println!("{}", arg);
    }
    Object::Null
}

#[cfg(test)]
mod test {
    use crate::builtin::{by_index, look_up, BUILTINS};
    use crate::object::Object;

    #[test]
    fn test_registry_order() {
        assert_eq!(BUILTINS.len(), 2);
        assert_eq!(by_index(0).unwrap().to_string(), "len");
        assert_eq!(by_index(1).unwrap().to_string(), "puts");
        assert!(by_index(2).is_none());
    }

    #[test]
    fn test_len() {
        let len = look_up("len").unwrap();

        assert_eq!(
            len.call(vec![Object::String("hello".to_string())]),
            Object::Integer(5)
        );
        assert_eq!(
            len.call(vec![Object::Array(vec![
                Object::Integer(1),
                Object::Integer(2),
                Object::Integer(3),
            ])]),
            Object::Integer(3)
        );
        assert_eq!(
            len.call(vec![Object::Integer(1)]),
            Object::Error("type mismatch: INTEGER".to_string())
        );
        assert_eq!(
            len.call(vec![]),
            Object::Error("arguments len 0 mismatch, want 1".to_string())
        );
        assert_eq!(
            len.call(vec![Object::Null, Object::Null]),
            Object::Error("arguments len 2 mismatch, want 1".to_string())
        );
    }

    #[test]
    fn test_puts_returns_null() {
        let puts = look_up("puts").unwrap();
        assert_eq!(puts.call(vec![Object::Integer(1)]), Object::Null);
    }

    #[test]
    fn test_unknown_name() {
        assert!(look_up("first").is_none());
    }
}
