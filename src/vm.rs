use std::collections::BTreeMap;
use std::rc::Rc;

use crate::builtin;
use crate::code::{read_u16, read_u8, Instructions, Operation};
use crate::compiler::ByteCode;
use crate::object::{Closure, CompiledFunction, Object};

const STACK_SIZE: usize = 2048;
const GLOBALS_SIZE: usize = 65536;
const MAX_FRAMES: usize = 1024;

struct Frame {
    closure: Rc<Closure>,
    // starts one before the first instruction; the run loop pre-increments
    ip: isize,
    base_pointer: usize,
}

impl Frame {
    fn new(closure: Rc<Closure>, base_pointer: usize) -> Self {
        Self {
            closure,
            ip: -1,
            base_pointer,
        }
    }

    fn instructions(&self) -> &Instructions {
        &self.closure.func.instructions
    }
}

pub struct VM {
    constants: Vec<Object>,
    globals: Vec<Object>,

    stack: Vec<Object>,
    sp: usize, // points one past the top of the stack

    frames: Vec<Frame>,
}

impl VM {
    pub fn new(byte_code: ByteCode) -> Self {
        let main_fn = Rc::new(CompiledFunction {
            instructions: byte_code.instructions,
            num_locals: 0,
            num_parameters: 0,
        });
        let main_closure = Rc::new(Closure {
            func: main_fn,
            free: Vec::new(),
        });

        let mut frames = Vec::with_capacity(MAX_FRAMES);
        frames.push(Frame::new(main_closure, 0));

        Self {
            constants: byte_code.constants,
            globals: vec![Object::Null; GLOBALS_SIZE],

            stack: vec![Object::Null; STACK_SIZE],
            sp: 0,

            frames,
        }
    }

    // the slot just vacated by the final OpPop
    pub fn last_popped_stack_elem(&self) -> Object {
        self.stack[self.sp].clone()
    }

    pub fn run(&mut self) -> Result<(), String> {
        while self.current_frame().ip < self.current_frame().instructions().len() as isize - 1 {
            self.current_frame_mut().ip += 1;

            let ip = self.current_frame().ip as usize;
            let byte = self.current_frame().instructions()[ip];
            let op = match Operation::from_byte(byte) {
                Some(op) => op,
                None => return Err(format!("invalid opcode appeared: pos {}, value {}", ip, byte)),
            };

            match op {
                Operation::OpConstant => {
                    let const_index = self.read_u16_operand(ip);
                    self.current_frame_mut().ip += 2;

                    let constant = match self.constants.get(const_index) {
                        Some(obj) => obj.clone(),
                        None => return Err(format!("constant {} does not exist", const_index)),
                    };
                    self.push(constant)?;
                }
                Operation::OpAdd | Operation::OpSub | Operation::OpMul | Operation::OpDiv => {
                    self.exec_binary_operation(op)?;
                }
                Operation::OpPop => {
                    self.pop()?;
                }
                Operation::OpTrue => self.push(Object::Boolean(true))?,
                Operation::OpFalse => self.push(Object::Boolean(false))?,
                Operation::OpNull => self.push(Object::Null)?,
                Operation::OpEqual | Operation::OpNotEqual | Operation::OpGreaterThan => {
                    self.exec_comparison(op)?;
                }
                Operation::OpMinus => {
                    let operand = self.pop()?;
                    match operand {
                        Object::Integer(value) => self.push(Object::Integer(-value))?,
                        other => {
                            return Err(format!("type mismatch: -{}", other.type_name()))
                        }
                    }
                }
                Operation::OpBang => {
                    let operand = self.pop()?;
                    self.push(Object::Boolean(!operand.is_truthy()))?;
                }
                Operation::OpJump => {
                    let target = self.read_u16_operand(ip);
                    // minus one, the loop increment lands on the target
                    self.current_frame_mut().ip = target as isize - 1;
                }
                Operation::OpJumpNotTruthy => {
                    let target = self.read_u16_operand(ip);
                    self.current_frame_mut().ip += 2;

                    let condition = self.pop()?;
                    if !condition.is_truthy() {
                        self.current_frame_mut().ip = target as isize - 1;
                    }
                }
                Operation::OpSetGlobal => {
                    let index = self.read_u16_operand(ip);
                    self.current_frame_mut().ip += 2;

                    let value = self.pop()?;
                    self.globals[index] = value;
                }
                Operation::OpGetGlobal => {
                    let index = self.read_u16_operand(ip);
                    self.current_frame_mut().ip += 2;
                    self.push(self.globals[index].clone())?;
                }
                Operation::OpSetLocal => {
                    let index = self.read_u8_operand(ip);
                    self.current_frame_mut().ip += 1;

                    let slot = self.current_frame().base_pointer + index;
                    let value = self.pop()?;
                    self.stack[slot] = value;
                }
                Operation::OpGetLocal => {
                    let index = self.read_u8_operand(ip);
                    self.current_frame_mut().ip += 1;

                    let slot = self.current_frame().base_pointer + index;
                    self.push(self.stack[slot].clone())?;
                }
                Operation::OpGetBuiltin => {
                    let index = self.read_u8_operand(ip);
                    self.current_frame_mut().ip += 1;

                    match builtin::by_index(index) {
                        Some(bf) => self.push(Object::Builtin(bf))?,
                        None => return Err(format!("builtin {} does not exist", index)),
                    }
                }
                Operation::OpGetFree => {
                    let index = self.read_u8_operand(ip);
                    self.current_frame_mut().ip += 1;

                    let free = self.current_frame().closure.free[index].clone();
                    self.push(free)?;
                }
                Operation::OpArray => {
                    let count = self.read_u16_operand(ip);
                    self.current_frame_mut().ip += 2;

                    let elements = self.stack[(self.sp - count)..self.sp].to_vec();
                    self.sp -= count;
                    self.push(Object::Array(elements))?;
                }
                Operation::OpHash => {
                    let count = self.read_u16_operand(ip);
                    self.current_frame_mut().ip += 2;

                    let hash = self.build_hash(self.sp - count, self.sp)?;
                    self.sp -= count;
                    self.push(hash)?;
                }
                Operation::OpIndex => {
                    let index = self.pop()?;
                    let left = self.pop()?;
                    self.exec_index_expression(left, index)?;
                }
                Operation::OpCall => {
                    let num_args = self.read_u8_operand(ip);
                    self.current_frame_mut().ip += 1;

                    self.call(num_args)?;
                }
                Operation::OpReturnValue => {
                    let return_value = self.pop()?;

                    // a return in the main scope halts the program; the value
                    // stays in the just-vacated slot for last_popped_stack_elem
                    if self.frames.len() == 1 {
                        return Ok(());
                    }

                    let frame = self.pop_frame()?;
                    self.sp = frame.base_pointer - 1;

                    self.push(return_value)?;
                }
                Operation::OpReturn => {
                    if self.frames.len() == 1 {
                        return Ok(());
                    }

                    let frame = self.pop_frame()?;
                    self.sp = frame.base_pointer - 1;

                    self.push(Object::Null)?;
                }
                Operation::OpClosure => {
                    let const_index = self.read_u16_operand(ip);
                    let num_free = read_u8(&self.current_frame().instructions()[(ip + 3)..(ip + 4)])
                        as usize;
                    self.current_frame_mut().ip += 3;

                    self.push_closure(const_index, num_free)?;
                }
            }
        }
        Ok(())
    }

    fn current_frame(&self) -> &Frame {
        self.frames.last().expect("frame stack is empty")
    }

    fn current_frame_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("frame stack is empty")
    }

    fn pop_frame(&mut self) -> Result<Frame, String> {
        self.frames.pop().ok_or_else(|| "frame underflow".to_string())
    }

    fn read_u16_operand(&self, ip: usize) -> usize {
        read_u16(&self.current_frame().instructions()[(ip + 1)..(ip + 3)]) as usize
    }

    fn read_u8_operand(&self, ip: usize) -> usize {
        read_u8(&self.current_frame().instructions()[(ip + 1)..(ip + 2)]) as usize
    }

    fn push(&mut self, object: Object) -> Result<(), String> {
        if self.sp >= STACK_SIZE {
            return Err("stack overflow occurred".to_string());
        }
        self.stack[self.sp] = object;
        self.sp += 1;
        Ok(())
    }

    fn pop(&mut self) -> Result<Object, String> {
        if self.sp == 0 {
            return Err("stack underflow".to_string());
        }
        self.sp -= 1;
        Ok(self.stack[self.sp].clone())
    }

    fn exec_binary_operation(&mut self, op: Operation) -> Result<(), String> {
        let right = self.pop()?;
        let left = self.pop()?;

        match (&left, &right) {
            (Object::Integer(l), Object::Integer(r)) => {
                let result = match op {
                    Operation::OpAdd => l + r,
                    Operation::OpSub => l - r,
                    Operation::OpMul => l * r,
                    Operation::OpDiv => l / r,
                    _ => return Err(format!("unknown integer operation {}", op)),
                };
                self.push(Object::Integer(result))
            }
            (Object::String(l), Object::String(r)) => match op {
                Operation::OpAdd => self.push(Object::String(format!("{}{}", l, r))),
                Operation::OpSub => Err("type mismatch: STRING - STRING".to_string()),
                Operation::OpMul => Err("type mismatch: STRING * STRING".to_string()),
                Operation::OpDiv => Err("type mismatch: STRING / STRING".to_string()),
                _ => Err(format!("unknown string operation {}", op)),
            },
            // the literal "+" regardless of the actual operator
            _ => Err(format!(
                "type mismatch: {} + {}",
                left.type_name(),
                right.type_name()
            )),
        }
    }

    fn exec_comparison(&mut self, op: Operation) -> Result<(), String> {
        let right = self.pop()?;
        let left = self.pop()?;

        match (&left, &right) {
            (Object::Integer(l), Object::Integer(r)) => {
                let result = match op {
                    Operation::OpEqual => l == r,
                    Operation::OpNotEqual => l != r,
                    Operation::OpGreaterThan => l > r,
                    _ => return Err(format!("unknown integer comparison {}", op)),
                };
                self.push(Object::Boolean(result))
            }
            (Object::String(l), Object::String(r)) => match op {
                Operation::OpEqual => self.push(Object::Boolean(l == r)),
                Operation::OpNotEqual => self.push(Object::Boolean(l != r)),
                _ => Err("type mismatch: STRING > STRING".to_string()),
            },
            _ => match op {
                Operation::OpEqual => self.push(Object::Boolean(left.identity_eq(&right))),
                Operation::OpNotEqual => self.push(Object::Boolean(!left.identity_eq(&right))),
                _ => Err(format!(
                    "type mismatch: {} + {}",
                    left.type_name(),
                    right.type_name()
                )),
            },
        }
    }

    fn build_hash(&self, start: usize, end: usize) -> Result<Object, String> {
        let mut hash = BTreeMap::new();

        let mut i = start;
        while i < end {
            let key = match &self.stack[i] {
                Object::String(key) => key.clone(),
                other => return Err(format!("type mismatch: {}", other.type_name())),
            };
            hash.insert(key, self.stack[i + 1].clone());
            i += 2;
        }
        Ok(Object::Hash(hash))
    }

    // array misses push null; the tree-walker raises instead
    fn exec_index_expression(&mut self, left: Object, index: Object) -> Result<(), String> {
        match (left, index) {
            (Object::Array(elements), Object::Integer(i)) => {
                if i < 0 || i >= elements.len() as i64 {
                    self.push(Object::Null)
                } else {
                    self.push(elements[i as usize].clone())
                }
            }
            (Object::Hash(pairs), Object::String(key)) => match pairs.get(&key) {
                Some(value) => self.push(value.clone()),
                None => self.push(Object::Null),
            },
            (Object::Hash(_), index) => {
                Err(format!("type mismatch: {}", index.type_name()))
            }
            (left, _) => Err(format!(
                "index operator not supported: {}",
                left.type_name()
            )),
        }
    }

    fn call(&mut self, num_args: usize) -> Result<(), String> {
        let callee = self.stack[self.sp - 1 - num_args].clone();
        match callee {
            Object::Closure(cl) => self.call_closure(cl, num_args),
            Object::Builtin(bf) => {
                let args = self.stack[(self.sp - num_args)..self.sp].to_vec();
                let result = bf.call(args);
                self.sp = self.sp - num_args - 1;
                self.push(result)
            }
            _ => Err("calling non-function".to_string()),
        }
    }

    fn call_closure(&mut self, cl: Rc<Closure>, num_args: usize) -> Result<(), String> {
        if num_args != cl.func.num_parameters {
            return Err(format!(
                "arguments len {} mismatch, want {}",
                num_args, cl.func.num_parameters
            ));
        }
        if self.frames.len() >= MAX_FRAMES {
            return Err("frame overflow occurred".to_string());
        }

        // the arguments already sit on the stack and become the first locals
        let base_pointer = self.sp - num_args;
        let num_locals = cl.func.num_locals;

        self.frames.push(Frame::new(cl, base_pointer));
        self.sp = base_pointer + num_locals;
        if self.sp > STACK_SIZE {
            return Err("stack overflow occurred".to_string());
        }
        Ok(())
    }

    fn push_closure(&mut self, const_index: usize, num_free: usize) -> Result<(), String> {
        let func = match self.constants.get(const_index) {
            Some(Object::CompiledFunction(func)) => Rc::clone(func),
            Some(other) => return Err(format!("not a function: {}", other)),
            None => return Err(format!("constant {} does not exist", const_index)),
        };

        let free = self.stack[(self.sp - num_free)..self.sp].to_vec();
        self.sp -= num_free;

        self.push(Object::Closure(Rc::new(Closure { func, free })))
    }
}
