use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use rustyline::{error::ReadlineError, DefaultEditor};
use venice_core::error::VncError;
use venice_core::reader::read_all;
use venice_core::{format_error, HostValue, RuntimeCtx, Value, Venice};

const HELP: &str = "\
:q, :quit        leave the REPL
:h, :help        show this help
:load FILE       load a script file
:ns              show the current namespace
:modules         list loaded modules";

/// Result of one REPL submission.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    Value(String),
    Error(Vec<String>),
    Info(String),
    Quit,
    Empty,
}

pub fn render(value: &HostValue) -> String {
    value.to_value().pr_str()
}

/// True once every form in `input` is closed, so the line editor knows
/// whether to ask for a continuation line.
pub fn is_complete(input: &str) -> bool {
    match read_all(input, Some("repl")) {
        Ok(_) => true,
        Err(VncError::Parse(data)) => !data.message.starts_with("EOF"),
        Err(_) => true,
    }
}

pub fn history_path() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| {
        let mut p = PathBuf::from(home);
        p.push(".venice_history");
        p
    })
}

/// REPL state over one interpreter. Unlike `Venice::eval`, namespace
/// switches persist between submissions.
pub struct Repl {
    venice: Venice,
}

impl Repl {
    pub fn new(venice: Venice) -> Self {
        Self { venice }
    }

    fn ctx(&self) -> &Arc<RuntimeCtx> {
        self.venice.runtime()
    }

    pub fn prompt(&self) -> String {
        format!("{}> ", self.ctx().current_ns_name())
    }

    fn eval_source(&self, src: &str) -> Result<Value, VncError> {
        self.ctx()
            .with_current_ctx(|ctx| ctx.eval_source(src, Some("repl")))
    }

    pub fn submit(&mut self, input: &str) -> Outcome {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Outcome::Empty;
        }
        if trimmed.starts_with(':') && (!trimmed.contains(char::is_whitespace) || trimmed.starts_with(":load ")) {
            if let Some(outcome) = self.meta_command(trimmed) {
                return outcome;
            }
        }
        match self.eval_source(trimmed) {
            Ok(value) => Outcome::Value(value.pr_str()),
            Err(err) => Outcome::Error(format_error(&err)),
        }
    }

    fn meta_command(&mut self, command: &str) -> Option<Outcome> {
        let (name, arg) = match command.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (command, ""),
        };
        Some(match name {
            ":q" | ":quit" => Outcome::Quit,
            ":h" | ":help" => Outcome::Info(HELP.to_string()),
            ":ns" => Outcome::Info(self.ctx().current_ns_name()),
            ":modules" => Outcome::Info(self.ctx().modules().loaded_modules().join(" ")),
            ":load" => {
                let call = format!("(load-file {} true)", Value::string(arg).pr_str());
                match self.eval_source(&call) {
                    Ok(value) => Outcome::Value(value.pr_str()),
                    Err(err) => Outcome::Error(format_error(&err)),
                }
            }
            // A keyword typed at the prompt evaluates to itself.
            _ => return None,
        })
    }
}

/// Line-editor loop. Runs on a thread sized like an evaluation thread so
/// deep recursion behaves as it does in scripts.
pub fn run_interactive(venice: Venice) -> Result<()> {
    let stack_size = venice.runtime().options().stack_size;
    let worker = std::thread::Builder::new()
        .name("venice-repl".to_string())
        .stack_size(stack_size)
        .spawn(move || interactive_loop(Repl::new(venice)))?;
    worker
        .join()
        .map_err(|_| anyhow!("REPL thread panicked"))?
}

fn interactive_loop(mut repl: Repl) -> Result<()> {
    let mut rl = DefaultEditor::new()?;
    let hist_path = history_path();
    if let Some(ref path) = hist_path {
        let _ = rl.load_history(path);
    }
    println!("Venice REPL {}. :h for help, :q to quit.", env!("CARGO_PKG_VERSION"));
    let mut pending = String::new();
    loop {
        let prompt = if pending.is_empty() {
            repl.prompt()
        } else {
            "   | ".to_string()
        };
        match rl.readline(&prompt) {
            Ok(line) => {
                if !pending.is_empty() {
                    pending.push('\n');
                }
                pending.push_str(&line);
                if !is_complete(&pending) {
                    continue;
                }
                let input = std::mem::take(&mut pending);
                let _ = rl.add_history_entry(input.as_str());
                match repl.submit(&input) {
                    Outcome::Value(text) => println!("=> {}", text),
                    Outcome::Info(text) => println!("{}", text),
                    Outcome::Error(lines) => {
                        for line in lines {
                            eprintln!("{}", line);
                        }
                    }
                    Outcome::Quit => break,
                    Outcome::Empty => {}
                }
            }
            Err(ReadlineError::Interrupted) => {
                pending.clear();
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => return Err(err.into()),
        }
    }
    if let Some(ref path) = hist_path {
        let _ = rl.save_history(path);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unclosed_forms_are_incomplete() {
        assert!(!is_complete("(defn f [x]"));
        assert!(!is_complete("\"abc"));
        assert!(is_complete("(+ 1 2)"));
        assert!(is_complete(")"));
    }
}
