use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use once_cell::sync::Lazy;

use crate::ast::Value;
use crate::error::VncError;
use crate::options::VeniceOptions;
use crate::runtime::RuntimeCtx;

pub const SCRIPT_EXTENSION: &str = "venice";

/// Modules compiled into the library, resolved before any script source.
static EMBEDDED_MODULES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("test", include_str!("venice/modules/test.venice")),
        ("ansi", include_str!("venice/modules/ansi.venice")),
    ])
});

pub fn embedded_module_names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = EMBEDDED_MODULES.keys().copied().collect();
    names.sort_unstable();
    names
}

/// Where script text comes from: the filesystem or an in-memory bundle.
pub trait ScriptSource: Send + Sync {
    fn describe(&self) -> String;

    /// Text of the script at `relative`, `Ok(None)` if this source does not
    /// have it. A path the source refuses to serve is an error.
    fn read(&self, relative: &Path) -> Result<Option<String>, VncError>;
}

/// Which directories scripts may be loaded from.
#[derive(Clone, Debug)]
pub struct LoadPathPolicy {
    paths: Vec<PathBuf>,
    unlimited_access: bool,
    working_dir: PathBuf,
}

impl LoadPathPolicy {
    pub fn new(paths: Vec<PathBuf>, unlimited_access: bool, working_dir: PathBuf) -> Self {
        Self {
            paths,
            unlimited_access,
            working_dir,
        }
    }

    pub fn from_options(options: &VeniceOptions) -> Self {
        Self::new(
            options.load_paths.clone(),
            options.unlimited_access,
            options.working_dir(),
        )
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn unlimited_access(&self) -> bool {
        self.unlimited_access
    }

    fn is_within_load_paths(&self, candidate: &Path) -> bool {
        let candidate = normalize(candidate);
        self.paths
            .iter()
            .map(|root| normalize(&self.absolute(root)))
            .any(|root| candidate.starts_with(&root))
    }

    fn absolute(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.working_dir.join(path)
        }
    }

    /// Candidate files for `relative`, in lookup order. Paths that escape the
    /// load paths are rejected unless access is unlimited.
    pub fn candidates(&self, relative: &Path) -> Result<Vec<PathBuf>, VncError> {
        if relative.is_absolute() {
            if self.unlimited_access || self.is_within_load_paths(relative) {
                return Ok(vec![relative.to_path_buf()]);
            }
            return Err(access_denied(relative));
        }
        let mut out = Vec::new();
        for root in &self.paths {
            let root = normalize(&self.absolute(root));
            let joined = normalize(&root.join(relative));
            if joined.starts_with(&root) {
                out.push(joined);
            } else if !self.unlimited_access {
                return Err(access_denied(relative));
            }
        }
        if self.unlimited_access {
            out.push(normalize(&self.working_dir.join(relative)));
        }
        // With no load paths there is nothing to search, but a path that
        // climbs out of its start is still refused.
        if out.is_empty() && relative.components().any(|c| c == Component::ParentDir) {
            return Err(access_denied(relative));
        }
        Ok(out)
    }
}

fn access_denied(path: &Path) -> VncError {
    VncError::runtime(format!(
        "Access denied: '{}' is outside the configured load paths",
        path.display()
    ))
}

/// Lexical normalization; `..` never climbs above the root.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

pub struct FileSystemSource {
    policy: LoadPathPolicy,
}

impl FileSystemSource {
    pub fn new(policy: LoadPathPolicy) -> Self {
        Self { policy }
    }
}

impl ScriptSource for FileSystemSource {
    fn describe(&self) -> String {
        format!(
            "filesystem {:?} (unlimited: {})",
            self.policy.paths(),
            self.policy.unlimited_access()
        )
    }

    fn read(&self, relative: &Path) -> Result<Option<String>, VncError> {
        for candidate in self.policy.candidates(relative)? {
            if candidate.is_file() {
                tracing::debug!(path = %candidate.display(), "read script");
                return fs::read_to_string(&candidate).map(Some).map_err(VncError::from);
            }
        }
        Ok(None)
    }
}

/// Scripts held in memory, keyed by their path inside an app bundle.
pub struct BundleSource {
    name: String,
    files: HashMap<String, String>,
}

impl BundleSource {
    pub fn new(name: &str, files: HashMap<String, String>) -> Self {
        Self {
            name: name.to_string(),
            files,
        }
    }

    pub fn file_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.files.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl ScriptSource for BundleSource {
    fn describe(&self) -> String {
        format!("bundle {}", self.name)
    }

    fn read(&self, relative: &Path) -> Result<Option<String>, VncError> {
        let key = normalize(relative)
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => part.to_str(),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/");
        Ok(self.files.get(&key).cloned())
    }
}

#[derive(Default)]
struct LoadState {
    loaded_modules: Vec<String>,
    loaded_files: HashSet<String>,
    loading: HashSet<String>,
}

/// Per-interpreter record of loaded modules and files plus the script
/// sources they are read from.
pub struct ModuleRegistry {
    sources: RwLock<Vec<Arc<dyn ScriptSource>>>,
    state: Mutex<LoadState>,
}

/// Outcome of a load, reported to scripts as `:loaded` / `:already-loaded`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadStatus {
    Loaded,
    AlreadyLoaded,
}

impl LoadStatus {
    pub fn keyword(self) -> Value {
        match self {
            LoadStatus::Loaded => Value::keyword("loaded"),
            LoadStatus::AlreadyLoaded => Value::keyword("already-loaded"),
        }
    }
}

impl ModuleRegistry {
    pub fn new(options: &VeniceOptions) -> Self {
        let fs_source: Arc<dyn ScriptSource> =
            Arc::new(FileSystemSource::new(LoadPathPolicy::from_options(options)));
        Self {
            sources: RwLock::new(vec![fs_source]),
            state: Mutex::new(LoadState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, LoadState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sources added later take precedence over earlier ones.
    pub fn add_source(&self, source: Arc<dyn ScriptSource>) {
        tracing::debug!(source = source.describe().as_str(), "add script source");
        self.sources
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(0, source);
    }

    pub fn loaded_modules(&self) -> Vec<String> {
        self.state().loaded_modules.clone()
    }

    pub fn is_module_loaded(&self, name: &str) -> bool {
        self.state().loaded_modules.iter().any(|m| m == name)
    }

    fn read_script(&self, relative: &Path) -> Result<Option<String>, VncError> {
        let sources = self
            .sources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for source in sources {
            if let Some(text) = source.read(relative)? {
                return Ok(Some(text));
            }
        }
        Ok(None)
    }

    fn begin(&self, key: &str) -> Result<bool, VncError> {
        let mut state = self.state();
        if state.loaded_files.contains(key) {
            return Ok(false);
        }
        if !state.loading.insert(key.to_string()) {
            return Err(VncError::runtime(format!("Circular load detected for '{}'", key)));
        }
        Ok(true)
    }

    fn finish(&self, key: &str, module: Option<&str>, ok: bool) {
        let mut state = self.state();
        state.loading.remove(key);
        if ok {
            state.loaded_files.insert(key.to_string());
            if let Some(name) = module {
                state.loaded_modules.push(name.to_string());
            }
        }
    }

    /// `(load-module :name)`. Embedded modules win over script sources. The
    /// caller's namespace is current again afterwards.
    pub fn load_module(&self, ctx: &RuntimeCtx, name: &str) -> Result<LoadStatus, VncError> {
        let key = format!("module:{}", name);
        if !self.begin(&key)? {
            return Ok(LoadStatus::AlreadyLoaded);
        }
        let result = (|| {
            let source = match EMBEDDED_MODULES.get(name) {
                Some(text) => text.to_string(),
                None => self
                    .read_script(Path::new(&format!("{}.{}", name, SCRIPT_EXTENSION)))?
                    .ok_or_else(|| VncError::runtime(format!("Failed to load module '{}': not found", name)))?,
            };
            tracing::info!(module = name, "load module");
            let _restore = ctx.preserve_ns();
            ctx.eval_source(&source, Some(&format!("{}.{}", name, SCRIPT_EXTENSION)))
        })();
        self.finish(&key, Some(name), result.is_ok());
        result.map(|_| LoadStatus::Loaded)
    }

    /// `(load-file "path" force?)`. A missing extension defaults to `.venice`.
    pub fn load_file(&self, ctx: &RuntimeCtx, path: &str, force: bool) -> Result<LoadStatus, VncError> {
        let file = with_default_extension(path);
        let key = format!("file:{}", file);
        if force {
            self.state().loaded_files.remove(&key);
        }
        if !self.begin(&key)? {
            return Ok(LoadStatus::AlreadyLoaded);
        }
        let result = (|| {
            let source = self
                .read_script(Path::new(&file))?
                .ok_or_else(|| VncError::host("java.io.FileNotFoundException", format!("File '{}' not found", file)))?;
            tracing::info!(file = file.as_str(), "load file");
            let _restore = ctx.preserve_ns();
            ctx.eval_source(&source, Some(&file))
        })();
        self.finish(&key, None, result.is_ok());
        result.map(|_| LoadStatus::Loaded)
    }
}

fn with_default_extension(path: &str) -> String {
    if Path::new(path).extension().is_some() {
        path.to_string()
    } else {
        format!("{}.{}", path, SCRIPT_EXTENSION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_may_not_escape_load_paths() {
        let policy = LoadPathPolicy::new(vec![PathBuf::from("/srv/scripts")], false, PathBuf::from("/"));
        assert_eq!(
            policy.candidates(Path::new("lib/util.venice")).unwrap(),
            vec![PathBuf::from("/srv/scripts/lib/util.venice")]
        );
        assert!(policy.candidates(Path::new("../etc/passwd")).is_err());
        assert!(policy.candidates(Path::new("/etc/passwd")).is_err());
        assert!(policy.candidates(Path::new("/srv/scripts/a.venice")).is_ok());
    }

    #[test]
    fn unlimited_access_falls_back_to_working_dir() {
        let policy = LoadPathPolicy::new(Vec::new(), true, PathBuf::from("/work"));
        assert_eq!(
            policy.candidates(Path::new("a.venice")).unwrap(),
            vec![PathBuf::from("/work/a.venice")]
        );
    }

    #[test]
    fn restricted_policy_without_paths_searches_nothing() {
        let policy = LoadPathPolicy::new(Vec::new(), false, PathBuf::from("/work"));
        assert!(policy.candidates(Path::new("lib/a.venice")).unwrap().is_empty());
        assert!(policy.candidates(Path::new("../a.venice")).is_err());
    }

    #[test]
    fn bundle_source_normalizes_paths() {
        let files = HashMap::from([("lib/a.venice".to_string(), "(+ 1 2)".to_string())]);
        let source = BundleSource::new("demo", files);
        assert_eq!(
            source.read(Path::new("./lib/a.venice")).unwrap().as_deref(),
            Some("(+ 1 2)")
        );
        assert!(source.read(Path::new("missing.venice")).unwrap().is_none());
    }

    #[test]
    fn file_names_get_the_script_extension() {
        assert_eq!(with_default_extension("lib/a"), "lib/a.venice");
        assert_eq!(with_default_extension("b.txt"), "b.txt");
    }
}
