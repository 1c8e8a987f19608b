use std::fmt;
use std::fmt::Formatter;

pub enum Node {
    Program(Program),
    Statement(Statement),
    Expression(Expression),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    pub statements: Vec<Statement>,
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for stmt in self.statements.iter() {
            write!(f, "{}", stmt)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    LetStatement { identifier: Expression, value: Expression },
    ReturnStatement(Expression),
    ExpressionStatement(Expression),
    BlockStatement(Vec<Statement>),
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Statement::LetStatement { identifier, value } => {
                write!(f, "let {} = {}", identifier, value)
            }
            Statement::ReturnStatement(value) => write!(f, "return {}", value),
            Statement::ExpressionStatement(exp) => write!(f, "{}", exp),
            Statement::BlockStatement(block) => {
                for stmt in block.iter() {
                    write!(f, "{}", stmt)?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    Identifier(String),
    Boolean(bool),
    Integer(i64),
    String(String),
    Array(Vec<Expression>),
    // pairs keep their source order; the compiler sorts before emission
    Hash(Vec<(Expression, Expression)>),
    PrefixExpression {
        operation: String,
        right: Box<Expression>,
    },
    InfixExpression {
        operation: String,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    IfExpression {
        condition: Box<Expression>,
        consequence: Box<Statement>,
        alternative: Option<Box<Statement>>,
    },
    Function {
        parameters: Vec<Expression>,
        body: Box<Statement>,
    },
    CallExpression {
        function: Box<Expression>,
        arguments: Vec<Expression>,
    },
    IndexExpression {
        left: Box<Expression>,
        index: Box<Expression>,
    },
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Identifier(ident) => write!(f, "{}", ident),
            Expression::Boolean(b) => write!(f, "{}", b),
            Expression::Integer(int) => write!(f, "{}", int),
            Expression::String(st) => write!(f, "{}", st),
            Expression::Array(elements) => {
                let joined = elements
                    .iter()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "[{}]", joined)
            }
            Expression::Hash(pairs) => {
                let joined = pairs
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k, v))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "{{{}}}", joined)
            }
            Expression::PrefixExpression { operation, right } => {
                write!(f, "({}{})", operation, right)
            }
            Expression::InfixExpression {
                operation,
                left,
                right,
            } => write!(f, "({} {} {})", left, operation, right),
            Expression::IfExpression {
                condition,
                consequence,
                alternative,
            } => {
                write!(f, "if {} {{{}}}", condition, consequence)?;
                if let Some(alt) = alternative {
                    write!(f, " else {{{}}}", alt)?;
                }
                Ok(())
            }
            Expression::Function { parameters, body } => {
                let params = parameters
                    .iter()
                    .map(|p| p.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "fn ({}) {{{}}}", params, body)
            }
            Expression::CallExpression {
                function,
                arguments,
            } => {
                let args = arguments
                    .iter()
                    .map(|a| a.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "{}({})", function, args)
            }
            Expression::IndexExpression { left, index } => {
                write!(f, "({}[{}])", left, index)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use crate::ast::{Expression, Program, Statement};

    #[test]
    fn test_let_statement_display() {
        let program = Program {
            statements: vec![Statement::LetStatement {
                identifier: Expression::Identifier("myVar".to_string()),
                value: Expression::Identifier("anotherVar".to_string()),
            }],
        };

        assert_eq!(program.to_string(), "let myVar = anotherVar");
    }

    #[test]
    fn test_hash_display_keeps_source_order() {
        let hash = Expression::Hash(vec![
            (
                Expression::String("two".to_string()),
                Expression::Integer(2),
            ),
            (
                Expression::String("one".to_string()),
                Expression::Integer(1),
            ),
        ]);

        assert_eq!(hash.to_string(), "{two: 2, one: 1}");
    }

    #[test]
    fn test_nested_expression_display() {
        let exp = Expression::InfixExpression {
            operation: "*".to_string(),
            left: Box::new(Expression::PrefixExpression {
                operation: "-".to_string(),
                right: Box::new(Expression::Identifier("a".to_string())),
            }),
            right: Box::new(Expression::Identifier("b".to_string())),
        };

        assert_eq!(exp.to_string(), "((-a) * b)");
    }
}
