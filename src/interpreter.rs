use std::io::{BufRead, BufReader, Read, Write};

use crate::ast::Node;
use crate::evaluator::Evaluator;
use crate::lexer::Lexer;
use crate::parser::Parser;

const PROMPT: &str = ">> ";

// tree-walking loop; the environment persists across lines
pub fn start<R: Read, W: Write>(reader: R, mut writer: W) -> std::io::Result<()> {
    let mut evaluator = Evaluator::new();
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

        let evaluated = evaluator.eval(Node::Program(program));
        writeln!(writer, "{}", evaluated)?;
    }
}

fn print_parser_errors<W: Write>(writer: &mut W, errors: Vec<String>) -> std::io::Result<()> {
    for msg in errors {
        writeln!(writer, "\t{}", msg)?;
    }
    writer.flush()
}
