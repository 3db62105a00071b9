use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use zip::write::FileOptions;
use zip::ZipArchive;

use crate::error::VncError;
use crate::host_value::{HostValue, Parameters};
use crate::modules::{BundleSource, SCRIPT_EXTENSION};
use crate::options::{SharedReader, SharedWriter, VeniceOptions};
use crate::Venice;

pub const MANIFEST_ENTRY: &str = "MANIFEST.MF";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AppManifest {
    pub app_name: String,
    pub main_file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

fn bundle_error(message: impl Into<String>) -> VncError {
    VncError::host("java.io.IOException", message)
}

fn zip_error(err: zip::result::ZipError) -> VncError {
    bundle_error(format!("Invalid app bundle: {}", err))
}

/// A packaged application: manifest plus script files keyed by their path
/// inside the archive.
#[derive(Clone, Debug)]
pub struct AppBundle {
    manifest: AppManifest,
    files: HashMap<String, String>,
}

impl AppBundle {
    pub fn new(manifest: AppManifest, files: HashMap<String, String>) -> Self {
        Self { manifest, files }
    }

    pub fn open(path: &Path) -> Result<Self, VncError> {
        let file = File::open(path).map_err(|err| {
            bundle_error(format!("Cannot open app bundle '{}': {}", path.display(), err))
        })?;
        Self::from_reader(file)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, VncError> {
        Self::from_reader(std::io::Cursor::new(bytes))
    }

    pub fn from_reader<R: Read + Seek>(reader: R) -> Result<Self, VncError> {
        let mut archive = ZipArchive::new(reader).map_err(zip_error)?;
        let mut manifest = None;
        let mut files = HashMap::new();
        for index in 0..archive.len() {
            let mut entry = archive.by_index(index).map_err(zip_error)?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().trim_start_matches("./").to_string();
            let mut text = String::new();
            entry.read_to_string(&mut text).map_err(|err| {
                bundle_error(format!("Cannot read '{}' from app bundle: {}", name, err))
            })?;
            if name == MANIFEST_ENTRY {
                let parsed: AppManifest = serde_json::from_str(&text)
                    .map_err(|err| bundle_error(format!("Invalid {}: {}", MANIFEST_ENTRY, err)))?;
                manifest = Some(parsed);
            } else {
                files.insert(name, text);
            }
        }
        let manifest =
            manifest.ok_or_else(|| bundle_error(format!("App bundle has no {}", MANIFEST_ENTRY)))?;
        let bundle = Self { manifest, files };
        bundle.main_script()?;
        tracing::debug!(
            app = bundle.manifest.app_name.as_str(),
            files = bundle.files.len(),
            "app bundle opened"
        );
        Ok(bundle)
    }

    /// Writes the bundle as a zip archive readable by [`AppBundle::from_reader`].
    pub fn write_to<W: Write + Seek>(&self, writer: W) -> Result<(), VncError> {
        let mut zip = zip::ZipWriter::new(writer);
        let manifest = serde_json::to_string_pretty(&self.manifest)
            .map_err(|err| bundle_error(err.to_string()))?;
        let mut names: Vec<&String> = self.files.keys().collect();
        names.sort();
        let entries = std::iter::once((MANIFEST_ENTRY, manifest.as_str()))
            .chain(names.into_iter().map(|n| (n.as_str(), self.files[n].as_str())));
        for (name, text) in entries {
            zip.start_file(name, FileOptions::default()).map_err(zip_error)?;
            zip.write_all(text.as_bytes())?;
        }
        zip.finish().map_err(zip_error)?;
        Ok(())
    }

    pub fn manifest(&self) -> &AppManifest {
        &self.manifest
    }

    pub fn file_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.files.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Archive path of the entry script; the extension is optional in the
    /// manifest.
    pub fn main_path(&self) -> String {
        let main = self.manifest.main_file.trim_start_matches("./");
        if Path::new(main).extension().is_some() {
            main.to_string()
        } else {
            format!("{}.{}", main, SCRIPT_EXTENSION)
        }
    }

    fn main_script(&self) -> Result<&str, VncError> {
        let path = self.main_path();
        self.files.get(&path).map(String::as_str).ok_or_else(|| {
            bundle_error(format!(
                "Main file '{}' of app '{}' is missing from the bundle",
                path, self.manifest.app_name
            ))
        })
    }
}

/// Runs an [`AppBundle`] in a fresh interpreter. `load-file` resolves
/// against the bundle only; the host filesystem is not reachable.
pub struct AppRunner {
    options: VeniceOptions,
    args: Vec<String>,
}

impl Default for AppRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl AppRunner {
    pub fn new() -> Self {
        Self {
            options: VeniceOptions::restricted(Vec::new()),
            args: Vec::new(),
        }
    }

    pub fn with_stdout(mut self, out: SharedWriter) -> Self {
        self.options.stdout = out;
        self
    }

    pub fn with_stderr(mut self, err: SharedWriter) -> Self {
        self.options.stderr = err;
        self
    }

    pub fn with_stdin(mut self, input: SharedReader) -> Self {
        self.options.stdin = input;
        self
    }

    pub fn with_stdin_text(mut self, text: &str) -> Self {
        self.options = self.options.with_stdin_text(text);
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn run(&self, bundle: &AppBundle) -> Result<HostValue, VncError> {
        let script = bundle.main_script()?.to_string();
        let venice = Venice::with_options(self.options.clone())?;
        venice.add_script_source(Arc::new(BundleSource::new(
            &bundle.manifest.app_name,
            bundle.files.clone(),
        )));
        let mut params = Parameters::new();
        params.insert(
            "*ARGV*".to_string(),
            HostValue::List(self.args.iter().cloned().map(HostValue::String).collect()),
        );
        tracing::info!(app = bundle.manifest.app_name.as_str(), "run app bundle");
        venice.eval_named(&bundle.main_path(), &script, &params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(main: &str) -> AppManifest {
        AppManifest {
            app_name: "demo".to_string(),
            main_file: main.to_string(),
            version: None,
        }
    }

    #[test]
    fn manifest_uses_kebab_case_keys() {
        let parsed: AppManifest =
            serde_json::from_str(r#"{"app-name": "shop", "main-file": "main"}"#).unwrap();
        assert_eq!(parsed, AppManifest { app_name: "shop".into(), main_file: "main".into(), version: None });
    }

    #[test]
    fn main_path_defaults_extension() {
        let bundle = AppBundle::new(manifest("main"), HashMap::new());
        assert_eq!(bundle.main_path(), "main.venice");
        let bundle = AppBundle::new(manifest("./app/run.venice"), HashMap::new());
        assert_eq!(bundle.main_path(), "app/run.venice");
    }

    #[test]
    fn archive_round_trip_keeps_files() {
        let files = HashMap::from([("main.venice".to_string(), "(+ 1 2)".to_string())]);
        let bundle = AppBundle::new(manifest("main"), files);
        let mut cursor = std::io::Cursor::new(Vec::new());
        bundle.write_to(&mut cursor).unwrap();
        let reopened = AppBundle::from_bytes(cursor.get_ref()).unwrap();
        assert_eq!(reopened.manifest(), bundle.manifest());
        assert_eq!(reopened.file_names(), vec!["main.venice"]);
    }

    #[test]
    fn missing_main_file_is_rejected() {
        let bundle = AppBundle::new(manifest("main"), HashMap::new());
        let mut cursor = std::io::Cursor::new(Vec::new());
        bundle.write_to(&mut cursor).unwrap();
        let err = AppBundle::from_bytes(cursor.get_ref()).unwrap_err();
        assert!(err.message().contains("main.venice"));
    }
}
