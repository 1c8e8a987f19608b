use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::ast::{Expression, Node, Program, Statement};
use crate::builtin;
use crate::environment::Environment;
use crate::object::Object;

pub struct Evaluator {
    env: Rc<RefCell<Environment>>,
}

impl Evaluator {
    pub fn new() -> Self {
        Self {
            env: Rc::new(RefCell::new(Environment::new())),
        }
    }

    fn from_env(env: Environment) -> Self {
        Self {
            env: Rc::new(RefCell::new(env)),
        }
    }

    fn get(&self, key: &str) -> Option<Object> {
        self.env.borrow().get(key)
    }

    fn set(&mut self, key: String, value: Object) {
        self.env.borrow_mut().set(key, value)
    }

    pub fn eval(&mut self, node: Node) -> Object {
        match node {
            Node::Program(program) => self.eval_program(program),
            Node::Statement(stmt) => match stmt {
                Statement::BlockStatement(block) => self.eval_block_statement(block),
                Statement::ExpressionStatement(exp) => self.eval(Node::Expression(exp)),
                Statement::ReturnStatement(value) => {
                    let value = self.eval(Node::Expression(value));
                    if value.is_error() {
                        return value;
                    }
                    Object::ReturnValue(Box::new(value))
                }
                Statement::LetStatement { identifier, value } => {
                    let value = self.eval(Node::Expression(value));
                    if value.is_error() {
                        return value;
                    }
                    if let Expression::Identifier(name) = identifier {
                        self.set(name, value);
                    }
                    Object::Null
                }
            },
            Node::Expression(exp) => match exp {
                Expression::Integer(i) => Object::Integer(i),
                Expression::String(s) => Object::String(s),
                Expression::Boolean(b) => Object::Boolean(b),
                Expression::PrefixExpression { operation, right } => {
                    let right = self.eval(Node::Expression(*right));
                    if right.is_error() {
                        return right;
                    }
                    eval_prefix_expression(&operation, right)
                }
                Expression::InfixExpression {
                    operation,
                    left,
                    right,
                } => {
                    let left = self.eval(Node::Expression(*left));
                    if left.is_error() {
                        return left;
                    }
                    let right = self.eval(Node::Expression(*right));
                    if right.is_error() {
                        return right;
                    }
                    eval_infix_expression(&operation, left, right)
                }
                Expression::IfExpression {
                    condition,
                    consequence,
                    alternative,
                } => self.eval_if_expression(*condition, *consequence, alternative),
                Expression::Identifier(name) => self.eval_identifier(name),
                Expression::Function { parameters, body } => Object::Function {
                    parameters,
                    body: *body,
                    env: Environment::new_enclosed(Rc::clone(&self.env)),
                },
                Expression::CallExpression {
                    function,
                    arguments,
                } => {
                    let function = self.eval(Node::Expression(*function));
                    if function.is_error() {
                        return function;
                    }
                    let args = match self.eval_expressions(arguments) {
                        Ok(args) => args,
                        Err(err) => return err,
                    };
                    apply_function(function, args)
                }
                Expression::Array(elements) => {
                    let elements = match self.eval_expressions(elements) {
                        Ok(elements) => elements,
                        Err(err) => return err,
                    };
                    Object::Array(elements)
                }
                Expression::IndexExpression { left, index } => {
                    let left = self.eval(Node::Expression(*left));
                    if left.is_error() {
                        return left;
                    }
                    let index = self.eval(Node::Expression(*index));
                    if index.is_error() {
                        return index;
                    }
                    eval_index_expression(left, index)
                }
                Expression::Hash(pairs) => self.eval_hash_literal(pairs),
            },
        }
    }

    fn eval_program(&mut self, program: Program) -> Object {
        let mut result = Object::Null;

        for stmt in program.statements {
            result = self.eval(Node::Statement(stmt));

            match result {
                Object::ReturnValue(value) => return *value,
                Object::Error(_) => return result,
                _ => {}
            }
        }
        result
    }

    // blocks leave ReturnValue wrapped so it unwinds to the function boundary
    fn eval_block_statement(&mut self, block: Vec<Statement>) -> Object {
        let mut result = Object::Null;

        for stmt in block {
            result = self.eval(Node::Statement(stmt));

            match result {
                Object::ReturnValue(_) | Object::Error(_) => return result,
                _ => {}
            }
        }
        result
    }

    fn eval_if_expression(
        &mut self,
        condition: Expression,
        consequence: Statement,
        alternative: Option<Box<Statement>>,
    ) -> Object {
        let condition = self.eval(Node::Expression(condition));
        if condition.is_error() {
            return condition;
        }

        if condition.is_truthy() {
            self.eval(Node::Statement(consequence))
        } else {
            match alternative {
                Some(alt) => self.eval(Node::Statement(*alt)),
                None => Object::Null,
            }
        }
    }

    fn eval_identifier(&mut self, name: String) -> Object {
        if let Some(obj) = self.get(&name) {
            return obj;
        }
        match builtin::look_up(&name) {
            Some(bf) => Object::Builtin(bf),
            None => new_error(format!("identifier not found: {}", name)),
        }
    }

    fn eval_expressions(&mut self, exps: Vec<Expression>) -> Result<Vec<Object>, Object> {
        let mut result = Vec::with_capacity(exps.len());

        for exp in exps {
            let evaluated = self.eval(Node::Expression(exp));
            if evaluated.is_error() {
                return Err(evaluated);
            }
            result.push(evaluated);
        }
        Ok(result)
    }

    fn eval_hash_literal(&mut self, pairs: Vec<(Expression, Expression)>) -> Object {
        let mut hash = BTreeMap::new();

        for (key_exp, value_exp) in pairs {
            let key = self.eval(Node::Expression(key_exp));
            if key.is_error() {
                return key;
            }
            let key = match key {
                Object::String(s) => s,
                other => return new_error(format!("type mismatch: {}", other.type_name())),
            };

            let value = self.eval(Node::Expression(value_exp));
            if value.is_error() {
                return value;
            }

            hash.insert(key, value);
        }
        Object::Hash(hash)
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

pub fn new_error(msg: String) -> Object {
    Object::Error(msg)
}

fn eval_prefix_expression(operation: &str, right: Object) -> Object {
    match operation {
        "!" => eval_bang_expression(right),
        "-" => eval_minus_prefix_expression(right),
        _ => new_error(format!("unknown operator {}", operation)),
    }
}

fn eval_bang_expression(right: Object) -> Object {
    Object::Boolean(!right.is_truthy())
}

fn eval_minus_prefix_expression(right: Object) -> Object {
    match right {
        Object::Integer(i) => Object::Integer(-i),
        other => new_error(format!("type mismatch: -{}", other.type_name())),
    }
}

fn eval_infix_expression(operation: &str, left: Object, right: Object) -> Object {
    match (&left, &right) {
        (Object::Integer(l), Object::Integer(r)) => {
            eval_integer_infix_expression(operation, *l, *r)
        }
        (Object::String(l), Object::String(r)) => eval_string_infix_expression(operation, l, r),
        _ => match operation {
            "==" => Object::Boolean(left.identity_eq(&right)),
            "!=" => Object::Boolean(!left.identity_eq(&right)),
            // the literal "+" regardless of the actual operator
            _ => new_error(format!(
                "type mismatch: {} + {}",
                left.type_name(),
                right.type_name()
            )),
        },
    }
}

fn eval_integer_infix_expression(operation: &str, left: i64, right: i64) -> Object {
    match operation {
        "+" => Object::Integer(left + right),
        "-" => Object::Integer(left - right),
        "*" => Object::Integer(left * right),
        "/" => Object::Integer(left / right),
        "<" => Object::Boolean(left < right),
        ">" => Object::Boolean(left > right),
        "==" => Object::Boolean(left == right),
        "!=" => Object::Boolean(left != right),
        _ => new_error(format!("unknown operator {}", operation)),
    }
}

fn eval_string_infix_expression(operation: &str, left: &str, right: &str) -> Object {
    match operation {
        "+" => Object::String(format!("{}{}", left, right)),
        "==" => Object::Boolean(left == right),
        "!=" => Object::Boolean(left != right),
        _ => new_error(format!("type mismatch: STRING {} STRING", operation)),
    }
}

fn apply_function(function: Object, args: Vec<Object>) -> Object {
    match function {
        Object::Function {
            parameters,
            body,
            env,
        } => {
            if args.len() != parameters.len() {
                return new_error(format!(
                    "arguments len {} mismatch, want {}",
                    args.len(),
                    parameters.len()
                ));
            }

            let mut eval = Evaluator::from_env(env);
            for (param, arg) in parameters.iter().zip(args) {
                if let Expression::Identifier(name) = param {
                    eval.set(name.clone(), arg);
                }
            }

            match eval.eval(Node::Statement(body)) {
                Object::ReturnValue(value) => *value,
                other => other,
            }
        }
        Object::Builtin(bf) => bf.call(args),
        _ => new_error("calling non-function".to_string()),
    }
}

fn eval_index_expression(left: Object, index: Object) -> Object {
    match (left, index) {
        (Object::Array(elements), Object::Integer(i)) => {
            if i < 0 || i >= elements.len() as i64 {
                new_error("out of index".to_string())
            } else {
                elements[i as usize].clone()
            }
        }
        (Object::Hash(pairs), Object::String(key)) => match pairs.get(&key) {
            Some(value) => value.clone(),
            None => Object::Null,
        },
        (Object::Hash(_), index) => {
            new_error(format!("type mismatch: {}", index.type_name()))
        }
        (left, _) => new_error(format!(
            "index operator not supported: {}",
            left.type_name()
        )),
    }
}

#[cfg(test)]
mod test {
    use crate::ast::Node;
    use crate::evaluator::Evaluator;
    use crate::lexer::Lexer;
    use crate::object::Object;
    use crate::parser::Parser;

    fn test_eval(input: &str) -> Object {
        let l = Lexer::new(input);
        let mut p = Parser::new(l);
        let program = p.parse_program();
        assert_eq!(p.errors().len(), 0, "parser errors: {:?}", p.errors());
        let mut eval = Evaluator::new();
        eval.eval(Node::Program(program))
    }

    fn test_integer(input: &str, expected: i64) {
        match test_eval(input) {
            Object::Integer(value) => assert_eq!(value, expected, "input: {}", input),
            other => panic!("not an integer for {}: {}", input, other),
        }
    }

    fn test_boolean(input: &str, expected: bool) {
        match test_eval(input) {
            Object::Boolean(value) => assert_eq!(value, expected, "input: {}", input),
            other => panic!("not a boolean for {}: {}", input, other),
        }
    }

    fn test_error(input: &str, expected: &str) {
        match test_eval(input) {
            Object::Error(msg) => assert_eq!(msg, expected, "input: {}", input),
            other => panic!("not an error for {}: {}", input, other),
        }
    }

    #[test]
    fn test_integer_expressions() {
        let tests = vec![
            ("5", 5),
            ("10", 10),
            ("-5", -5),
            ("-10", -10),
            ("5 + 5 + 5 + 5 - 10", 10),
            ("2 * 2 * 2 * 2 * 2", 32),
            ("-50 + 100 + -50", 0),
            ("5 * 2 + 10", 20),
            ("5 + 2 * 10", 25),
            ("20 + 2 * -10", 0),
            ("50 / 2 * 2 + 10", 60),
            ("2 * (5 + 10)", 30),
            ("3 * 3 * 3 + 10", 37),
            ("(5 + 10 * 2 + 15 / 3) * 2 + -10", 50),
            ("7 / 2", 3),
            ("-7 / 2", -3),
        ];

        for (input, expected) in tests {
            test_integer(input, expected);
        }
    }

    #[test]
    fn test_boolean_expressions() {
        let tests = vec![
            ("true", true),
            ("false", false),
            ("1 < 2", true),
            ("1 > 2", false),
            ("1 == 1", true),
            ("1 != 1", false),
            ("1 == 2", false),
            ("1 != 2", true),
            ("true == true", true),
            ("false == false", true),
            ("true == false", false),
            ("true != false", true),
            ("(1 < 2) == true", true),
            ("(1 > 2) == true", false),
            ("1 == true", false),
            ("1 != true", true),
            (r#""a" == 1"#, false),
        ];

        for (input, expected) in tests {
            test_boolean(input, expected);
        }
    }

    #[test]
    fn test_bang_operator() {
        let tests = vec![
            ("!true", false),
            ("!false", true),
            ("!5", false),
            ("!!true", true),
            ("!!false", false),
            ("!!5", true),
        ];

        for (input, expected) in tests {
            test_boolean(input, expected);
        }
    }

    #[test]
    fn test_if_else_expressions() {
        let tests = vec![
            ("if (true) { 10 }", Some(10)),
            ("if (false) { 10 }", None),
            ("if (1) { 10 }", Some(10)),
            ("if (1 < 2) { 10 }", Some(10)),
            ("if (1 > 2) { 10 }", None),
            ("if (1 > 2) { 10 } else { 20 }", Some(20)),
            ("if (1 < 2) { 10 } else { 20 }", Some(10)),
        ];

        for (input, expected) in tests {
            match (test_eval(input), expected) {
                (Object::Integer(value), Some(exp)) => assert_eq!(value, exp),
                (Object::Null, None) => {}
                (other, _) => panic!("unexpected result for {}: {}", input, other),
            }
        }
    }

    #[test]
    fn test_return_statements() {
        let tests = vec![
            ("return 10;", 10),
            ("return 10; 9;", 10),
            ("return 2 * 5; 9;", 10),
            ("9; return 2 * 5; 9;", 10),
            ("if (10 > 1) { return 10; }", 10),
            (
                r#"if (10 > 1) {
                    if (10 > 1) {
                        return 10;
                    }
                    return 1;
                }"#,
                10,
            ),
        ];

        for (input, expected) in tests {
            test_integer(input, expected);
        }
    }

    #[test]
    fn test_error_handling() {
        let tests = vec![
            ("5 + true;", "type mismatch: INTEGER + BOOLEAN"),
            ("5 + true; 5;", "type mismatch: INTEGER + BOOLEAN"),
            ("-true", "type mismatch: -BOOLEAN"),
            ("true + false;", "type mismatch: BOOLEAN + BOOLEAN"),
            ("5; true + false; 5", "type mismatch: BOOLEAN + BOOLEAN"),
            (
                "if (10 > 1) { true + false; }",
                "type mismatch: BOOLEAN + BOOLEAN",
            ),
            (
                r#"if (10 > 1) {
                    if (10 > 1) {
                        return true + false;
                    }
                    return 1;
                }"#,
                "type mismatch: BOOLEAN + BOOLEAN",
            ),
            // the mixed-type message carries "+" whatever the operator was
            ("5 < true", "type mismatch: INTEGER + BOOLEAN"),
            (r#""a" - "b""#, "type mismatch: STRING - STRING"),
            (r#""a" < "b""#, "type mismatch: STRING < STRING"),
            ("foobar", "identifier not found: foobar"),
            ("len(1)", "type mismatch: INTEGER"),
            (r#"len("one", "two")"#, "arguments len 2 mismatch, want 1"),
            ("[1, 2, 3][3]", "out of index"),
            ("[1, 2, 3][-1]", "out of index"),
            ("5[0]", "index operator not supported: INTEGER"),
            (r#"{"a": 1}[1]"#, "type mismatch: INTEGER"),
            ("{1: 2}", "type mismatch: INTEGER"),
            ("fn(x) { x; }(1, 2)", "arguments len 2 mismatch, want 1"),
            ("1(2)", "calling non-function"),
        ];

        for (input, expected) in tests {
            test_error(input, expected);
        }
    }

    #[test]
    fn test_let_statements() {
        let tests = vec![
            ("let a = 5; a;", 5),
            ("let a = 5 * 5; a;", 25),
            ("let a = 5; let b = a; b;", 5),
            ("let a = 5; let b = a; let c = a + b + 5; c;", 15),
            ("let a = 5; let b = a + 10; b;", 15),
        ];

        for (input, expected) in tests {
            test_integer(input, expected);
        }
    }

    #[test]
    fn test_let_statement_value_is_null() {
        assert_eq!(test_eval("let a = 5;"), Object::Null);
    }

    #[test]
    fn test_function_object() {
        match test_eval("fn(x) { x + 2; };") {
            Object::Function {
                parameters, body, ..
            } => {
                assert_eq!(parameters.len(), 1);
                assert_eq!(parameters[0].to_string(), "x");
                assert_eq!(body.to_string(), "(x + 2)");
            }
            other => panic!("not a function: {}", other),
        }
    }

    #[test]
    fn test_function_application() {
        let tests = vec![
            ("let identity = fn(x) { x; }; identity(5);", 5),
            ("let identity = fn(x) { return x; }; identity(5);", 5),
            ("let double = fn(x) { x * 2; }; double(5);", 10),
            ("let add = fn(x, y) { x + y; }; add(5, 5);", 10),
            ("let add = fn(x, y) { x + y; }; add(5 + 5, add(5, 5));", 20),
            ("fn(x) { x; }(5)", 5),
        ];

        for (input, expected) in tests {
            test_integer(input, expected);
        }
    }

    #[test]
    fn test_closures() {
        let tests = vec![
            (
                r#"let newAdder = fn(x) { fn(y) { x + y } };
                   let addTwo = newAdder(2);
                   addTwo(3);"#,
                5,
            ),
            (
                r#"let one = 1;
                   let func = fn(x) { x + one };
                   func(3)"#,
                4,
            ),
            (
                r#"let one = 1;
                   let two = 2;
                   let func = fn(x) { let two = 20; x + one + two };
                   func(3) + two"#,
                26,
            ),
        ];

        for (input, expected) in tests {
            test_integer(input, expected);
        }
    }

    #[test]
    fn test_string_expressions() {
        let tests = vec![
            (r#""hello" + " " + "world""#, "hello world"),
            (r#"let hi = "hello"; hi + " " + "world""#, "hello world"),
        ];

        for (input, expected) in tests {
            match test_eval(input) {
                Object::String(value) => assert_eq!(value, expected),
                other => panic!("not a string for {}: {}", input, other),
            }
        }
    }

    #[test]
    fn test_string_comparison() {
        test_boolean(r#""a" == "a""#, true);
        test_boolean(r#""a" == "b""#, false);
        test_boolean(r#""a" != "b""#, true);
    }

    #[test]
    fn test_array_literals() {
        match test_eval("[1, 2 * 2, 3 + 3]") {
            Object::Array(elements) => {
                assert_eq!(
                    elements,
                    vec![
                        Object::Integer(1),
                        Object::Integer(4),
                        Object::Integer(6),
                    ]
                );
            }
            other => panic!("not an array: {}", other),
        }
    }

    #[test]
    fn test_array_index_expressions() {
        let tests = vec![
            ("[1, 2, 3][0]", 1),
            ("[1, 2, 3][1]", 2),
            ("[1, 2, 3][2]", 3),
            ("let i = 0; [1][i];", 1),
            ("[1, 2, 3][1 + 1];", 3),
            ("let myArray = [1, 2, 3]; myArray[2];", 3),
            (
                "let myArray = [1, 2, 3]; myArray[0] + myArray[1] + myArray[2];",
                6,
            ),
            ("let a = [1, 2, 3]; a[0] + a[1] * a[2];", 7),
        ];

        for (input, expected) in tests {
            test_integer(input, expected);
        }
    }

    #[test]
    fn test_hash_literals() {
        let input = r#"let two = "two";
        {
            "one": 10 - 9,
            two: 1 + 1,
            "thr" + "ee": 6 / 2,
        }"#;

        match test_eval(input) {
            Object::Hash(pairs) => {
                assert_eq!(pairs.len(), 3);
                assert_eq!(pairs.get("one"), Some(&Object::Integer(1)));
                assert_eq!(pairs.get("two"), Some(&Object::Integer(2)));
                assert_eq!(pairs.get("three"), Some(&Object::Integer(3)));
            }
            other => panic!("not a hash: {}", other),
        }
    }

    #[test]
    fn test_hash_index_expressions() {
        let tests = vec![
            (r#"{"foo": 5}["foo"]"#, Some(5)),
            (r#"{"foo": 5}["bar"]"#, None),
            (r#"let key = "foo"; {"foo": 5}[key]"#, Some(5)),
            (r#"{}["foo"]"#, None),
        ];

        for (input, expected) in tests {
            match (test_eval(input), expected) {
                (Object::Integer(value), Some(exp)) => assert_eq!(value, exp),
                (Object::Null, None) => {}
                (other, _) => panic!("unexpected result for {}: {}", input, other),
            }
        }
    }

    #[test]
    fn test_builtin_functions() {
        let tests = vec![
            (r#"len("")"#, 0),
            (r#"len("four")"#, 4),
            (r#"len("hello world")"#, 11),
            ("len([1, 2, 3])", 3),
            ("len([])", 0),
            (r#"len({"a": 1, "b": 2})"#, 2),
            (r#"len("hello") + len([1, 2, 3])"#, 8),
        ];

        for (input, expected) in tests {
            test_integer(input, expected);
        }
    }

    #[test]
    fn test_puts_returns_null() {
        assert_eq!(test_eval(r#"puts("a", 1)"#), Object::Null);
        assert_eq!(test_eval(r#"let x = puts("a"); x"#), Object::Null);
    }
}
