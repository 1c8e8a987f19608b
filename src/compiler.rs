use std::rc::Rc;

use crate::ast::{Expression, Node, Statement};
use crate::builtin::BUILTINS;
use crate::code::{make, Instructions, Operation};
use crate::object::{CompiledFunction, Object};
use crate::symbol_table::{Symbol, SymbolScope, SymbolTable};

// placeholder operand for jumps that get patched once the target is known
const STUB_OPERAND: i32 = 9999;

#[derive(Debug, Clone, Copy)]
struct EmittedInstruction {
    opcode: Operation,
    position: usize,
}

#[derive(Default)]
struct CompilationScope {
    instructions: Instructions,
    last_instruction: Option<EmittedInstruction>,
    previous_instruction: Option<EmittedInstruction>,
}

pub struct Compiler {
    constants: Vec<Object>,
    symbol_table: SymbolTable,
    scopes: Vec<CompilationScope>,
}

impl Compiler {
    pub fn new() -> Self {
        let mut symbol_table = SymbolTable::new();
        for (index, builtin) in BUILTINS.iter().enumerate() {
            symbol_table.define_builtin(index, builtin.name());
        }

        Self {
            constants: Vec::new(),
            symbol_table,
            scopes: vec![CompilationScope::default()],
        }
    }

    pub fn compile(&mut self, node: Node) -> Result<(), String> {
        match node {
            Node::Program(program) => {
                for stmt in program.statements {
                    self.compile(Node::Statement(stmt))?;
                }
                Ok(())
            }
            Node::Statement(stmt) => match stmt {
                Statement::ExpressionStatement(exp) => {
                    self.compile(Node::Expression(exp))?;
                    self.emit(Operation::OpPop, &[]);
                    Ok(())
                }
                Statement::BlockStatement(block) => {
                    for stmt in block {
                        self.compile(Node::Statement(stmt))?;
                    }
                    Ok(())
                }
                Statement::LetStatement { identifier, value } => {
                    let name = match identifier {
                        Expression::Identifier(name) => name,
                        other => return Err(format!("invalid let target {}", other)),
                    };
                    // defined before the value so global recursion resolves
                    let symbol = self.symbol_table.define(&name);
                    self.compile(Node::Expression(value))?;
                    match symbol.scope {
                        SymbolScope::Global => {
                            self.emit(Operation::OpSetGlobal, &[symbol.index as i32]);
                        }
                        _ => {
                            self.emit(Operation::OpSetLocal, &[symbol.index as i32]);
                        }
                    }
                    Ok(())
                }
                Statement::ReturnStatement(value) => {
                    self.compile(Node::Expression(value))?;
                    self.emit(Operation::OpReturnValue, &[]);
                    Ok(())
                }
            },
            Node::Expression(exp) => match exp {
                Expression::InfixExpression {
                    operation,
                    left,
                    right,
                } => {
                    // there is no OpLessThan; swap the operands instead
                    if operation == "<" {
                        self.compile(Node::Expression(*right))?;
                        self.compile(Node::Expression(*left))?;
                        self.emit(Operation::OpGreaterThan, &[]);
                        return Ok(());
                    }

                    self.compile(Node::Expression(*left))?;
                    self.compile(Node::Expression(*right))?;

                    match operation.as_str() {
                        "+" => self.emit(Operation::OpAdd, &[]),
                        "-" => self.emit(Operation::OpSub, &[]),
                        "*" => self.emit(Operation::OpMul, &[]),
                        "/" => self.emit(Operation::OpDiv, &[]),
                        ">" => self.emit(Operation::OpGreaterThan, &[]),
                        "==" => self.emit(Operation::OpEqual, &[]),
                        "!=" => self.emit(Operation::OpNotEqual, &[]),
                        _ => return Err(format!("unknown operator {}", operation)),
                    };
                    Ok(())
                }
                Expression::PrefixExpression { operation, right } => {
                    self.compile(Node::Expression(*right))?;

                    match operation.as_str() {
                        "!" => self.emit(Operation::OpBang, &[]),
                        "-" => self.emit(Operation::OpMinus, &[]),
                        _ => return Err(format!("unknown operator {}", operation)),
                    };
                    Ok(())
                }
                Expression::Integer(value) => {
                    let pos = self.add_constant(Object::Integer(value));
                    self.emit(Operation::OpConstant, &[pos]);
                    Ok(())
                }
                Expression::String(value) => {
                    let pos = self.add_constant(Object::String(value));
                    self.emit(Operation::OpConstant, &[pos]);
                    Ok(())
                }
                Expression::Boolean(value) => {
                    if value {
                        self.emit(Operation::OpTrue, &[]);
                    } else {
                        self.emit(Operation::OpFalse, &[]);
                    }
                    Ok(())
                }
                Expression::Identifier(name) => match self.symbol_table.resolve(&name) {
                    Some(symbol) => {
                        self.load_symbol(&symbol);
                        Ok(())
                    }
                    None => Err(format!("undefined variable {}", name)),
                },
                Expression::IfExpression {
                    condition,
                    consequence,
                    alternative,
                } => {
                    self.compile(Node::Expression(*condition))?;

                    let jump_not_truthy_pos =
                        self.emit(Operation::OpJumpNotTruthy, &[STUB_OPERAND]);

                    self.compile(Node::Statement(*consequence))?;
                    if self.last_instruction_is(Operation::OpPop) {
                        self.remove_last_pop();
                    }

                    let jump_pos = self.emit(Operation::OpJump, &[STUB_OPERAND]);

                    let after_consequence = self.current_instructions().len();
                    self.change_operand(jump_not_truthy_pos, after_consequence as i32);

                    match alternative {
                        None => {
                            self.emit(Operation::OpNull, &[]);
                        }
                        Some(alt) => {
                            self.compile(Node::Statement(*alt))?;
                            if self.last_instruction_is(Operation::OpPop) {
                                self.remove_last_pop();
                            }
                        }
                    }

                    let after_alternative = self.current_instructions().len();
                    self.change_operand(jump_pos, after_alternative as i32);

                    Ok(())
                }
                Expression::Function { parameters, body } => {
                    self.enter_scope();

                    let num_parameters = parameters.len();
                    for param in &parameters {
                        if let Expression::Identifier(name) = param {
                            self.symbol_table.define(name);
                        }
                    }

                    self.compile(Node::Statement(*body))?;

                    // an expression body yields its value; an empty body yields null
                    if self.last_instruction_is(Operation::OpPop) {
                        self.replace_last_pop_with_return();
                    }
                    if !self.last_instruction_is(Operation::OpReturnValue) {
                        self.emit(Operation::OpReturn, &[]);
                    }

                    let free_symbols = self.symbol_table.free_symbols.clone();
                    let num_locals = self.symbol_table.num_definitions;
                    let instructions = self.leave_scope();

                    for free in &free_symbols {
                        self.load_symbol(free);
                    }

                    let fn_index = self.add_constant(Object::CompiledFunction(Rc::new(
                        CompiledFunction {
                            instructions,
                            num_locals,
                            num_parameters,
                        },
                    )));
                    self.emit(
                        Operation::OpClosure,
                        &[fn_index, free_symbols.len() as i32],
                    );
                    Ok(())
                }
                Expression::CallExpression {
                    function,
                    arguments,
                } => {
                    self.compile(Node::Expression(*function))?;

                    let num_args = arguments.len();
                    for arg in arguments {
                        self.compile(Node::Expression(arg))?;
                    }

                    self.emit(Operation::OpCall, &[num_args as i32]);
                    Ok(())
                }
                Expression::Array(elements) => {
                    let count = elements.len();
                    for element in elements {
                        self.compile(Node::Expression(element))?;
                    }
                    self.emit(Operation::OpArray, &[count as i32]);
                    Ok(())
                }
                Expression::Hash(mut pairs) => {
                    // sorted by the key's printed form so bytecode is reproducible
                    pairs.sort_by_key(|(key, _)| key.to_string());

                    let count = pairs.len();
                    for (key, value) in pairs {
                        self.compile(Node::Expression(key))?;
                        self.compile(Node::Expression(value))?;
                    }
                    self.emit(Operation::OpHash, &[(count * 2) as i32]);
                    Ok(())
                }
                Expression::IndexExpression { left, index } => {
                    self.compile(Node::Expression(*left))?;
                    self.compile(Node::Expression(*index))?;
                    self.emit(Operation::OpIndex, &[]);
                    Ok(())
                }
            },
        }
    }

    pub fn byte_code(mut self) -> ByteCode {
        let main_scope = self.scopes.swap_remove(0);
        ByteCode {
            instructions: main_scope.instructions,
            constants: self.constants,
        }
    }

    fn current_scope(&self) -> &CompilationScope {
        self.scopes.last().expect("compiler scope stack is empty")
    }

    fn current_scope_mut(&mut self) -> &mut CompilationScope {
        self.scopes
            .last_mut()
            .expect("compiler scope stack is empty")
    }

    fn current_instructions(&self) -> &Instructions {
        &self.current_scope().instructions
    }

    fn add_constant(&mut self, obj: Object) -> i32 {
        self.constants.push(obj);
        (self.constants.len() - 1) as i32
    }

    fn emit(&mut self, op: Operation, operands: &[i32]) -> usize {
        let instruction = make(op, operands);
        let pos = self.add_instruction(instruction);
        self.set_last_instruction(op, pos);
        pos
    }

    fn add_instruction(&mut self, mut instruction: Vec<u8>) -> usize {
        let scope = self.current_scope_mut();
        let pos = scope.instructions.len();
        scope.instructions.append_vec(&mut instruction);
        pos
    }

    fn set_last_instruction(&mut self, opcode: Operation, position: usize) {
        let scope = self.current_scope_mut();
        scope.previous_instruction = scope.last_instruction;
        scope.last_instruction = Some(EmittedInstruction { opcode, position });
    }

    fn last_instruction_is(&self, op: Operation) -> bool {
        matches!(self.current_scope().last_instruction, Some(last) if last.opcode == op)
    }

    fn remove_last_pop(&mut self) {
        let scope = self.current_scope_mut();
        if let Some(last) = scope.last_instruction {
            scope.instructions.truncate(last.position);
            scope.last_instruction = scope.previous_instruction;
            scope.previous_instruction = None;
        }
    }

    fn replace_last_pop_with_return(&mut self) {
        let scope = self.current_scope_mut();
        if let Some(last) = scope.last_instruction.as_mut() {
            scope
                .instructions
                .replace_at(last.position, &make(Operation::OpReturnValue, &[]));
            last.opcode = Operation::OpReturnValue;
        }
    }

    fn change_operand(&mut self, op_pos: usize, operand: i32) {
        let op = Operation::from_byte(self.current_instructions()[op_pos])
            .expect("patching an unknown opcode");
        let instruction = make(op, &[operand]);
        self.current_scope_mut()
            .instructions
            .replace_at(op_pos, &instruction);
    }

    fn load_symbol(&mut self, symbol: &Symbol) {
        match symbol.scope {
            SymbolScope::Global => self.emit(Operation::OpGetGlobal, &[symbol.index as i32]),
            SymbolScope::Local => self.emit(Operation::OpGetLocal, &[symbol.index as i32]),
            SymbolScope::Builtin => self.emit(Operation::OpGetBuiltin, &[symbol.index as i32]),
            SymbolScope::Free => self.emit(Operation::OpGetFree, &[symbol.index as i32]),
        };
    }

    fn enter_scope(&mut self) {
        self.scopes.push(CompilationScope::default());
        let table = std::mem::take(&mut self.symbol_table);
        self.symbol_table = SymbolTable::new_enclosed(table);
    }

    fn leave_scope(&mut self) -> Instructions {
        let scope = self.scopes.pop().expect("leaving the outermost scope");
        let table = std::mem::take(&mut self.symbol_table);
        self.symbol_table = table
            .into_outer()
            .expect("leaving a scope without an enclosing symbol table");
        scope.instructions
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ByteCode {
    pub instructions: Instructions,
    pub constants: Vec<Object>,
}
