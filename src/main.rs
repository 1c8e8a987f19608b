use std::io::{stdin, stdout};

use monkey_lang::repl;

fn main() -> std::io::Result<()> {
    let reader = stdin();
    let writer = stdout();
    repl::start(reader, writer)
}
