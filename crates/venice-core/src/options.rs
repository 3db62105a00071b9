use std::env;
use std::fmt;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

pub type SharedWriter = Arc<Mutex<dyn Write + Send>>;
pub type SharedReader = Arc<Mutex<dyn BufRead + Send>>;

pub const DEFAULT_MAX_CALL_DEPTH: usize = 10_000;
pub const DEFAULT_STACK_SIZE: usize = 256 * 1024 * 1024;

fn env_flag(name: &str) -> Option<bool> {
    let value = env::var(name).ok()?;
    Some(matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    ))
}

pub fn macroexpand_from_env() -> bool {
    env_flag("VENICE_MACROEXPAND").unwrap_or(true)
}

/// Directories listed in `VENICE_LOAD_PATH`, separated like `PATH`.
pub fn load_paths_from_env() -> Vec<PathBuf> {
    env::var_os("VENICE_LOAD_PATH")
        .map(|raw| env::split_paths(&raw).filter(|p| !p.as_os_str().is_empty()).collect())
        .unwrap_or_default()
}

#[derive(Clone)]
pub struct VeniceOptions {
    pub load_paths: Vec<PathBuf>,
    pub unlimited_access: bool,
    pub working_dir: Option<PathBuf>,
    pub macroexpand_on_load: bool,
    pub max_call_depth: usize,
    pub stack_size: usize,
    pub stdout: SharedWriter,
    pub stderr: SharedWriter,
    pub stdin: SharedReader,
}

impl Default for VeniceOptions {
    fn default() -> Self {
        Self {
            load_paths: load_paths_from_env(),
            unlimited_access: true,
            working_dir: None,
            macroexpand_on_load: macroexpand_from_env(),
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            stack_size: DEFAULT_STACK_SIZE,
            stdout: Arc::new(Mutex::new(io::stdout())),
            stderr: Arc::new(Mutex::new(io::stderr())),
            stdin: Arc::new(Mutex::new(BufReader::new(io::stdin()))),
        }
    }
}

impl VeniceOptions {
    /// Only the listed directories are readable by `load-file` and
    /// `load-module`.
    pub fn restricted(load_paths: Vec<PathBuf>) -> Self {
        Self {
            load_paths,
            unlimited_access: false,
            ..Self::default()
        }
    }

    pub fn working_dir(&self) -> PathBuf {
        self.working_dir
            .clone()
            .unwrap_or_else(|| env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }

    pub fn with_stdout(mut self, out: SharedWriter) -> Self {
        self.stdout = out;
        self
    }

    pub fn with_stderr(mut self, err: SharedWriter) -> Self {
        self.stderr = err;
        self
    }

    pub fn with_stdin_text(mut self, text: &str) -> Self {
        self.stdin = Arc::new(Mutex::new(io::Cursor::new(text.as_bytes().to_vec())));
        self
    }
}

impl fmt::Debug for VeniceOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VeniceOptions")
            .field("load_paths", &self.load_paths)
            .field("unlimited_access", &self.unlimited_access)
            .field("working_dir", &self.working_dir)
            .field("macroexpand_on_load", &self.macroexpand_on_load)
            .field("max_call_depth", &self.max_call_depth)
            .field("stack_size", &self.stack_size)
            .finish_non_exhaustive()
    }
}

/// In-memory sink for capturing script output.
#[derive(Clone, Default)]
pub struct OutputBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writer(&self) -> SharedWriter {
        Arc::new(Mutex::new(self.clone()))
    }

    pub fn contents(&self) -> String {
        let bytes = self.bytes.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Write for OutputBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_buffer_collects_writes() {
        let buffer = OutputBuffer::new();
        let writer = buffer.writer();
        write!(writer.lock().unwrap(), "hello {}", 42).unwrap();
        assert_eq!(buffer.contents(), "hello 42");
    }

    #[test]
    fn restricted_options_disable_unlimited_access() {
        let opts = VeniceOptions::restricted(vec![PathBuf::from("/tmp/scripts")]);
        assert!(!opts.unlimited_access);
        assert_eq!(opts.load_paths, vec![PathBuf::from("/tmp/scripts")]);
    }
}
