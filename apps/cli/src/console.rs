//! Console operator: prompts on stdout, answers from stdin.

use std::io::{self, BufRead, Write};

use unbrick_core::Operator;

pub struct ConsoleOperator;

impl Operator for ConsoleOperator {
    fn show(&self, text: &str) {
        println!("{text}");
    }

    fn confirm(&self, prompt: &str) -> io::Result<bool> {
        let answer = self.read_line(prompt)?;
        Ok(answer.trim().eq_ignore_ascii_case("y"))
    }

    fn read_line(&self, prompt: &str) -> io::Result<String> {
        print!("{prompt}");
        io::stdout().flush()?;
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "stdin closed"));
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(line)
    }

    fn acknowledge(&self, prompt: &str) -> io::Result<()> {
        self.read_line(prompt).map(|_| ())
    }
}
