use std::io::{BufRead, BufReader, Read, Write};

use crate::ast::Node;
use crate::compiler::Compiler;
use crate::lexer::Lexer;
use crate::parser::Parser;
use crate::vm::VM;

const PROMPT: &str = ">> ";

// compile-and-run loop; each line gets a fresh compiler and machine
pub fn start<R: Read, W: Write>(reader: R, mut writer: W) -> std::io::Result<()> {
    let mut reader = BufReader::new(reader);
    loop {
        write!(writer, "{}", PROMPT)?;
        writer.flush()?;

        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Ok(());
        }

        let l = Lexer::new(&line);
        let mut p = Parser::new(l);
        let program = p.parse_program();
        if !p.errors().is_empty() {
            print_parser_errors(&mut writer, p.errors())?;
            continue;
        }

        let mut comp = Compiler::new();
        if let Err(msg) = comp.compile(Node::Program(program)) {
            write!(writer, "Woops! Compilation failed:\n {}\n", msg)?;
            continue;
        }

        let mut machine = VM::new(comp.byte_code());
        if let Err(msg) = machine.run() {
            write!(writer, "Woops! Executing bytecode failed:\n {}\n", msg)?;
            continue;
        }

        writeln!(writer, "{}", machine.last_popped_stack_elem())?;
    }
}

fn print_parser_errors<W: Write>(writer: &mut W, errors: Vec<String>) -> std::io::Result<()> {
    for msg in errors {
        writeln!(writer, "\t{}", msg)?;
    }
    writer.flush()
}
