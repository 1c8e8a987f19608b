use std::io::{stdin, stdout};

use monkey_lang::interpreter;

fn main() -> std::io::Result<()> {
    let reader = stdin();
    let writer = stdout();
    interpreter::start(reader, writer)
}
