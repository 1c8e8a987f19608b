use std::fmt::Write as _;
use std::ops::Range;
use std::{fmt, ops};

use byteorder::{BigEndian, ByteOrder};

#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct Instructions(Vec<u8>);

impl Instructions {
    pub fn new(bytes: Vec<u8>) -> Self {
        Instructions(bytes)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn append_vec(&mut self, other: &mut Vec<u8>) {
        self.0.append(other)
    }

    pub fn append(&mut self, other: &mut Self) {
        self.append_vec(&mut other.0);
    }

    pub fn to_vec(self) -> Vec<u8> {
        self.0
    }

    pub fn truncate(&mut self, len: usize) {
        self.0.truncate(len)
    }

    pub fn replace_at(&mut self, pos: usize, bytes: &[u8]) {
        self.0[pos..pos + bytes.len()].copy_from_slice(bytes)
    }

    fn format_instruction(def: &Definition, operands: &[i32]) -> Result<String, String> {
        let op_count = def.operand_width.len();

        if operands.len() != op_count {
            return Err(format!(
                "operand len {} does not match defined {}",
                operands.len(),
                op_count
            ));
        }

        match op_count {
            0 => Ok(def.name.to_string()),
            1 => Ok(format!("{} {}", def.name, operands[0])),
            2 => Ok(format!("{} {} {}", def.name, operands[0], operands[1])),
            _ => Err(format!("unhandled operand count for {}", def.name)),
        }
    }

    // disassembly: one "offset opname operands" line per instruction
    pub fn disassemble(&self) -> Result<String, String> {
        let mut out = String::new();

        let mut pos = 0;
        while pos < self.0.len() {
            let def = match Operation::from_byte(self.0[pos]) {
                None => {
                    return Err(format!(
                        "invalid opcode appeared: pos {}, value {}",
                        pos, self.0[pos]
                    ))
                }
                Some(op) => lookup(&op),
            };

            let (operands, read) = read_operands(def, &self.0[(pos + 1)..]);

            let _ = writeln!(
                out,
                "{:0>4} {}",
                pos,
                Self::format_instruction(def, &operands)?
            );
            pos += 1 + read;
        }
        Ok(out)
    }
}

impl ops::Index<usize> for Instructions {
    type Output = u8;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl ops::Index<Range<usize>> for Instructions {
    type Output = [u8];

    fn index(&self, index: Range<usize>) -> &Self::Output {
        &self.0[index]
    }
}

pub type Opcode = u8;

#[derive(Eq, PartialEq)]
pub struct Definition<'a> {
    name: &'a str,
    operand_width: &'a [usize],
}

pub const DEFINITIONS: &[Definition] = &[
    Definition { name: "OpConstant", operand_width: &[2] },
    Definition { name: "OpAdd", operand_width: &[] },
    Definition { name: "OpSub", operand_width: &[] },
    Definition { name: "OpMul", operand_width: &[] },
    Definition { name: "OpDiv", operand_width: &[] },
    Definition { name: "OpPop", operand_width: &[] },
    Definition { name: "OpTrue", operand_width: &[] },
    Definition { name: "OpFalse", operand_width: &[] },
    Definition { name: "OpNull", operand_width: &[] },
    Definition { name: "OpEqual", operand_width: &[] },
    Definition { name: "OpNotEqual", operand_width: &[] },
    Definition { name: "OpGreaterThan", operand_width: &[] },
    Definition { name: "OpMinus", operand_width: &[] },
    Definition { name: "OpBang", operand_width: &[] },
    Definition { name: "OpJump", operand_width: &[2] },
    Definition { name: "OpJumpNotTruthy", operand_width: &[2] },
    Definition { name: "OpSetGlobal", operand_width: &[2] },
    Definition { name: "OpGetGlobal", operand_width: &[2] },
    Definition { name: "OpSetLocal", operand_width: &[1] },
    Definition { name: "OpGetLocal", operand_width: &[1] },
    Definition { name: "OpGetBuiltin", operand_width: &[1] },
    Definition { name: "OpGetFree", operand_width: &[1] },
    Definition { name: "OpArray", operand_width: &[2] },
    Definition { name: "OpHash", operand_width: &[2] },
    Definition { name: "OpIndex", operand_width: &[] },
    Definition { name: "OpCall", operand_width: &[1] },
    Definition { name: "OpReturnValue", operand_width: &[] },
    Definition { name: "OpReturn", operand_width: &[] },
    Definition { name: "OpClosure", operand_width: &[2, 1] },
];

pub fn lookup(op: &Operation) -> &'static Definition<'static> {
    &DEFINITIONS[op.as_byte() as usize]
}

// byte values follow declaration order, starting at 0
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    OpConstant,
    OpAdd,
    OpSub,
    OpMul,
    OpDiv,
    OpPop,
    OpTrue,
    OpFalse,
    OpNull,
    OpEqual,
    OpNotEqual,
    OpGreaterThan,
    OpMinus,
    OpBang,
    OpJump,
    OpJumpNotTruthy,
    OpSetGlobal,
    OpGetGlobal,
    OpSetLocal,
    OpGetLocal,
    OpGetBuiltin,
    OpGetFree,
    OpArray,
    OpHash,
    OpIndex,
    OpCall,
    OpReturnValue,
    OpReturn,
    OpClosure,
}

impl Operation {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Operation::OpConstant),
            1 => Some(Operation::OpAdd),
            2 => Some(Operation::OpSub),
            3 => Some(Operation::OpMul),
            4 => Some(Operation::OpDiv),
            5 => Some(Operation::OpPop),
            6 => Some(Operation::OpTrue),
            7 => Some(Operation::OpFalse),
            8 => Some(Operation::OpNull),
            9 => Some(Operation::OpEqual),
            10 => Some(Operation::OpNotEqual),
            11 => Some(Operation::OpGreaterThan),
            12 => Some(Operation::OpMinus),
            13 => Some(Operation::OpBang),
            14 => Some(Operation::OpJump),
            15 => Some(Operation::OpJumpNotTruthy),
            16 => Some(Operation::OpSetGlobal),
            17 => Some(Operation::OpGetGlobal),
            18 => Some(Operation::OpSetLocal),
            19 => Some(Operation::OpGetLocal),
            20 => Some(Operation::OpGetBuiltin),
            21 => Some(Operation::OpGetFree),
            22 => Some(Operation::OpArray),
            23 => Some(Operation::OpHash),
            24 => Some(Operation::OpIndex),
            25 => Some(Operation::OpCall),
            26 => Some(Operation::OpReturnValue),
            27 => Some(Operation::OpReturn),
            28 => Some(Operation::OpClosure),
            _ => None,
        }
    }

    pub fn as_byte(&self) -> Opcode {
        *self as Opcode
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", lookup(self).name)
    }
}

pub fn make(op: Operation, operands: &[i32]) -> Vec<u8> {
    let def = lookup(&op);

    let mut instruction_len = 1;
    for w in def.operand_width {
        instruction_len += *w;
    }

    let mut instruction = Vec::with_capacity(instruction_len);
    instruction.push(op.as_byte());

    for (i, operand) in operands.iter().enumerate() {
        match def.operand_width[i] {
            2 => {
                let mut buf = [0u8; 2];
                BigEndian::write_u16(&mut buf, *operand as u16);
                instruction.extend_from_slice(&buf);
            }
            1 => instruction.push(*operand as u8),
            other => unreachable!("unsupported operand width {}", other),
        }
    }

    instruction
}

// returns the decoded operands and how many bytes they occupied
pub fn read_operands(def: &Definition, bytes: &[u8]) -> (Vec<i32>, usize) {
    let mut operands = Vec::with_capacity(def.operand_width.len());
    let mut offset = 0;

    for width in def.operand_width {
        match width {
            2 => operands.push(read_u16(&bytes[offset..]) as i32),
            1 => operands.push(read_u8(&bytes[offset..]) as i32),
            other => unreachable!("unsupported operand width {}", other),
        }
        offset += *width;
    }

    (operands, offset)
}

pub fn read_u16(bytes: &[u8]) -> u16 {
    BigEndian::read_u16(bytes)
}

pub fn read_u8(bytes: &[u8]) -> u8 {
    bytes[0]
}
