use std::env;
use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use tracing::Level;
use venice_core::{AppBundle, AppRunner, HostValue, Parameters, Venice, VeniceOptions};

use crate::repl;

pub const LOG_ENV: &str = "VENICE_LOG";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mode {
    Eval(String),
    File(PathBuf),
    App(PathBuf),
    Repl,
    Help,
    Version,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CliArgs {
    pub mode: Mode,
    pub load_paths: Vec<PathBuf>,
    pub restricted: bool,
    /// Passed to the script as `*ARGV*`.
    pub script_args: Vec<String>,
}

pub fn usage() -> String {
    [
        "Usage: venice [-loadpath DIRS] [-restricted] [-e CODE | -file FILE | -app BUNDLE] [args...]",
        "",
        "Options:",
        "  -e CODE          Evaluate CODE, print the result and exit",
        "  -file FILE       Run a script file",
        "  -app BUNDLE      Run an app bundle (zip with MANIFEST.MF)",
        "  -loadpath DIRS   Directories for load-file/load-module, separated like PATH",
        "  -restricted      Only allow loading scripts from the load paths",
        "  -version         Show version",
        "  -h, -help        Show this help",
        "",
        "Without -e, -file or -app the REPL starts.",
        &format!("Set {}=debug|info|warn|error|trace to enable logging.", LOG_ENV),
    ]
    .join("\n")
}

fn set_mode(slot: &mut Option<Mode>, next: Mode) -> Result<()> {
    if slot.is_some() {
        bail!("only one of -e, -file and -app may be given");
    }
    *slot = Some(next);
    Ok(())
}

fn take_value(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String> {
    args.next().ok_or_else(|| anyhow!("{} expects a value", flag))
}

pub fn parse_args<I>(args: I) -> Result<CliArgs>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let mut mode = None;
    let mut load_paths = Vec::new();
    let mut restricted = false;
    let mut script_args = Vec::new();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-e" => set_mode(&mut mode, Mode::Eval(take_value(&mut args, "-e")?))?,
            "-file" => set_mode(&mut mode, Mode::File(take_value(&mut args, "-file")?.into()))?,
            "-app" => set_mode(&mut mode, Mode::App(take_value(&mut args, "-app")?.into()))?,
            "-loadpath" => {
                let raw = take_value(&mut args, "-loadpath")?;
                load_paths.extend(env::split_paths(&raw).filter(|p| !p.as_os_str().is_empty()));
            }
            "-restricted" => restricted = true,
            "-h" | "-help" | "--help" => return Ok(help_args(Mode::Help)),
            "-version" | "--version" => return Ok(help_args(Mode::Version)),
            "--" => {
                script_args.extend(args.by_ref());
            }
            other if other.starts_with('-') && mode.is_none() && script_args.is_empty() => {
                bail!("unknown option: {}", other)
            }
            _ => script_args.push(arg),
        }
    }
    Ok(CliArgs {
        mode: mode.unwrap_or(Mode::Repl),
        load_paths,
        restricted,
        script_args,
    })
}

fn help_args(mode: Mode) -> CliArgs {
    CliArgs {
        mode,
        load_paths: Vec::new(),
        restricted: false,
        script_args: Vec::new(),
    }
}

impl CliArgs {
    pub fn options(&self) -> VeniceOptions {
        let mut options = VeniceOptions::default();
        if !self.load_paths.is_empty() {
            options.load_paths = self.load_paths.clone();
        }
        options.unlimited_access = !self.restricted;
        options
    }

    fn parameters(&self) -> Parameters {
        let argv = HostValue::List(
            self.script_args
                .iter()
                .cloned()
                .map(HostValue::String)
                .collect(),
        );
        Parameters::from([("*ARGV*".to_string(), argv)])
    }
}

/// `VENICE_LOG` picks the level; logging is off when it is unset.
pub fn log_level_from_env() -> Option<Level> {
    let raw = env::var(LOG_ENV).ok()?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

/// Runs the selected mode. The returned value is the process exit code.
pub fn run(args: CliArgs) -> Result<i32> {
    match &args.mode {
        Mode::Help => {
            println!("{}", usage());
            Ok(0)
        }
        Mode::Version => {
            println!("venice {}", env!("CARGO_PKG_VERSION"));
            Ok(0)
        }
        Mode::Eval(code) => {
            let venice = Venice::with_options(args.options())?;
            let value = venice.eval_named("-e", code, &args.parameters());
            Ok(report(value, true))
        }
        Mode::File(path) => {
            let script = fs::read_to_string(path)
                .with_context(|| format!("cannot read {}", path.display()))?;
            let venice = Venice::with_options(args.options())?;
            let name = path.display().to_string();
            Ok(report(venice.eval_named(&name, &script, &args.parameters()), false))
        }
        Mode::App(path) => {
            let bundle = AppBundle::open(path)?;
            let result = AppRunner::new()
                .with_args(args.script_args.iter().cloned())
                .run(&bundle);
            Ok(report(result, false))
        }
        Mode::Repl => {
            let venice = Venice::with_options(args.options())?;
            repl::run_interactive(venice)?;
            Ok(0)
        }
    }
}

fn report(result: Result<HostValue, venice_core::VncError>, print_value: bool) -> i32 {
    match result {
        Ok(value) => {
            if print_value {
                println!("{}", repl::render(&value));
            }
            0
        }
        Err(err) => {
            for line in venice_core::format_error(&err) {
                eprintln!("{}", line);
            }
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<CliArgs> {
        parse_args(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn defaults_to_repl() {
        let args = parse(&[]).unwrap();
        assert_eq!(args.mode, Mode::Repl);
        assert!(args.options().unlimited_access);
    }

    #[test]
    fn script_arguments_follow_the_mode() {
        let args = parse(&["-file", "run.venice", "a", "-b"]).unwrap();
        assert_eq!(args.mode, Mode::File("run.venice".into()));
        assert_eq!(args.script_args, vec!["a", "-b"]);
    }

    #[test]
    fn conflicting_modes_are_rejected() {
        assert!(parse(&["-e", "1", "-app", "x.zip"]).is_err());
        assert!(parse(&["-e"]).is_err());
        assert!(parse(&["-bogus"]).is_err());
    }
}
