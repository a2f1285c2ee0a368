//! Configuration file loader.
//!
//! Reads JSON, TOML or YAML documents into an [`AutoFormatMap`] so every
//! value is a template resolved on read. Two composition mechanisms are
//! supported:
//!
//! | Mechanism | Effect |
//! |-----------|--------|
//! | `includes = ["a.toml", …]` | each file, relative to the including one, is loaded and merged in order |
//! | `<file>.d/` directory | every file below it is loaded and merged after `<file>` |
//!
//! A file reached twice during one load is reported as a circular include
//! and contributes nothing.

use std::collections::HashSet;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

use thiserror::Error;
use walkdir::WalkDir;

use crate::container::AutoFormatMap;
use crate::script::{TypeSpec, Value};
use crate::var::VarStore;

/// Extensions tried, in order, when the given path is not a file.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["json", "toml", "cfg", "ini", "yml", "yaml"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid TOML in {}: {source}", .path.display())]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid YAML in {}: {source}", .path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("unknown configuration file type: {}", .path.display())]
    UnknownFileType { path: PathBuf },

    #[error("{} must contain a table at the top level", .path.display())]
    NotATable { path: PathBuf },

    #[error(transparent)]
    Engine(#[from] crate::Error),
}

/// Document syntax, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Json,
    Toml,
    Yaml,
}

impl FileFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "json" => Some(FileFormat::Json),
            "toml" | "cfg" | "ini" => Some(FileFormat::Toml),
            "yml" | "yaml" => Some(FileFormat::Yaml),
            _ => None,
        }
    }
}

/// Parse `text` as a configuration document. `path` is only used in errors.
pub fn parse_str(text: &str, format: FileFormat, path: &Path) -> Result<AutoFormatMap, ConfigError> {
    let value: Value = match format {
        FileFormat::Json => serde_json::from_str(text).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?,
        FileFormat::Toml => toml::from_str(text).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })?,
        FileFormat::Yaml => serde_yaml::from_str(text).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })?,
    };
    match value {
        // `~` or an empty YAML document.
        Value::Null => Ok(AutoFormatMap::new()),
        Value::Map(map) => Ok(map.into_iter().collect()),
        _ => Err(ConfigError::NotATable { path: path.to_path_buf() }),
    }
}

/// A loaded configuration. Dereferences to its [`AutoFormatMap`].
#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    path: PathBuf,
    data: AutoFormatMap,
}

impl Configuration {
    /// Load `path` with its includes and drop-in directory.
    ///
    /// If `path` is not a file, each of [`SUPPORTED_EXTENSIONS`] is tried in
    /// its place. `store` resolves the `includes` templates.
    pub fn load(path: &Path, store: &mut VarStore) -> Result<Self, ConfigError> {
        let path = with_known_extension(path);
        let mut loader = Loader { store, loaded: HashSet::new() };
        let data = loader.load_checked(&path)?;
        Ok(Configuration { path, data })
    }

    /// The file this configuration was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn into_inner(self) -> AutoFormatMap {
        self.data
    }
}

impl Deref for Configuration {
    type Target = AutoFormatMap;

    fn deref(&self) -> &AutoFormatMap {
        &self.data
    }
}

impl DerefMut for Configuration {
    fn deref_mut(&mut self) -> &mut AutoFormatMap {
        &mut self.data
    }
}

fn with_known_extension(path: &Path) -> PathBuf {
    if !path.is_file() {
        for ext in SUPPORTED_EXTENSIONS {
            let candidate = path.with_extension(ext);
            if candidate.is_file() {
                return candidate;
            }
        }
    }
    path.to_path_buf()
}

struct Loader<'s> {
    store: &'s mut VarStore,
    loaded: HashSet<PathBuf>,
}

impl Loader<'_> {
    /// Load `path` unless it was already loaded, then its `.d` directory.
    fn load_checked(&mut self, path: &Path) -> Result<AutoFormatMap, ConfigError> {
        let path = path.canonicalize().map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if self.loaded.contains(&path) {
            log::warn!("circular include detected: {}", path.display());
            return Ok(AutoFormatMap::new());
        }
        let mut data = self.load_file(&path)?;

        let mut dropin = path.clone().into_os_string();
        dropin.push(".d");
        let dropin = PathBuf::from(dropin);
        if dropin.is_dir() {
            let mut files: Vec<PathBuf> = WalkDir::new(&dropin)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.file_type().is_file())
                .map(|entry| entry.into_path())
                .collect();
            files.sort();
            for file in files {
                let extra = self.load_file(&file)?;
                data.merge(extra);
            }
        }
        Ok(data)
    }

    /// Parse one file and merge its includes into it.
    fn load_file(&mut self, path: &Path) -> Result<AutoFormatMap, ConfigError> {
        let format = FileFormat::from_path(path).ok_or_else(|| ConfigError::UnknownFileType {
            path: path.to_path_buf(),
        })?;
        log::debug!("loading configuration as {format:?}: {}", path.display());
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut data = parse_str(&text, format, path)?;
        self.loaded.insert(path.to_path_buf());

        let includes = data
            .query("includes")
            .default(Value::List(Vec::new()))
            .expect(TypeSpec::list_of(TypeSpec::Str))
            .fetch(self.store)?
            .into_value(self.store)?;
        let base = path.parent().unwrap_or(Path::new("."));
        if let Value::List(includes) = includes {
            for include in includes {
                if let Value::Str(file) = include {
                    let extra = self.load_checked(&base.join(file))?;
                    data.merge(extra);
                }
            }
        }
        Ok(data)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_from_extension() {
        assert_eq!(FileFormat::from_path(Path::new("a.json")), Some(FileFormat::Json));
        assert_eq!(FileFormat::from_path(Path::new("a.ini")), Some(FileFormat::Toml));
        assert_eq!(FileFormat::from_path(Path::new("a.yaml")), Some(FileFormat::Yaml));
        assert_eq!(FileFormat::from_path(Path::new("a.txt")), None);
        assert_eq!(FileFormat::from_path(Path::new("noext")), None);
    }

    #[test]
    fn parse_each_format() {
        let p = Path::new("x");
        let mut store = VarStore::new();
        for (text, format) in [
            (r#"{"name": "demo"}"#, FileFormat::Json),
            ("name = \"demo\"", FileFormat::Toml),
            ("name: demo", FileFormat::Yaml),
        ] {
            let map = parse_str(text, format, p).unwrap();
            assert_eq!(map.get_str("name", &mut store).unwrap(), "demo");
        }
    }

    #[test]
    fn top_level_must_be_table() {
        let err = parse_str("[1, 2]", FileFormat::Json, Path::new("x.json")).unwrap_err();
        assert!(matches!(err, ConfigError::NotATable { .. }));
        assert!(parse_str("~", FileFormat::Yaml, Path::new("x.yml")).unwrap().is_empty());
    }

    fn write(dir: &Path, name: &str, text: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn includes_merge_after_including_file() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "base.toml", "cc = \"gcc\"\nflags = [\"-O2\"]\n");
        let main = write(
            dir.path(),
            "project.json",
            r#"{"includes": ["base.toml"], "cc": "clang", "flags": ["-g"]}"#,
        );
        let mut store = VarStore::new();
        let config = Configuration::load(&main, &mut store).unwrap();
        assert_eq!(config.get_str("cc", &mut store).unwrap(), "gcc");
        assert_eq!(
            config.get("flags", &mut store).unwrap().into_value(&mut store).unwrap(),
            Value::from(vec!["-g", "-O2"])
        );
    }

    #[test]
    fn include_paths_are_templates() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "linux.yml", "target: linux\n");
        let main = write(dir.path(), "project.toml", "includes = [\"${{os}}.yml\"]\n");
        let mut store = VarStore::new();
        store.push("os", "linux");
        let config = Configuration::load(&main, &mut store).unwrap();
        assert_eq!(config.get_str("target", &mut store).unwrap(), "linux");
    }

    #[test]
    fn dropin_directory_is_merged() {
        let dir = tempfile::tempdir().unwrap();
        let main = write(dir.path(), "repo.json", r#"{"name": "a", "deps": {"x": 1}}"#);
        write(dir.path(), "repo.json.d/10-name.toml", "name = \"b\"\n");
        write(dir.path(), "repo.json.d/nested/20-deps.json", r#"{"deps": {"y": 2}}"#);
        let mut store = VarStore::new();
        let config = Configuration::load(&main, &mut store).unwrap();
        assert_eq!(config.get_str("name", &mut store).unwrap(), "b");
        assert_eq!(config.get_path(&["deps", "x"], &mut store).unwrap().as_value(), Some(&Value::Int(1)));
        assert_eq!(config.get_path(&["deps", "y"], &mut store).unwrap().as_value(), Some(&Value::Int(2)));
    }

    #[test]
    fn circular_include_contributes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.json", r#"{"includes": ["b.json"], "a": 1}"#);
        write(dir.path(), "b.json", r#"{"includes": ["a.json"], "b": 2}"#);
        let mut store = VarStore::new();
        let config = Configuration::load(&dir.path().join("a.json"), &mut store).unwrap();
        assert_eq!(config.get("a", &mut store).unwrap().as_value(), Some(&Value::Int(1)));
        assert_eq!(config.get("b", &mut store).unwrap().as_value(), Some(&Value::Int(2)));
    }

    #[test]
    fn missing_extension_is_filled_in() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "repo.yaml", "name: found\n");
        let mut store = VarStore::new();
        let config = Configuration::load(&dir.path().join("repo"), &mut store).unwrap();
        assert_eq!(config.path().extension().unwrap(), "yaml");
        assert_eq!(config.get_str("name", &mut store).unwrap(), "found");
    }

    #[test]
    fn bad_includes_type_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let main = write(dir.path(), "x.json", r#"{"includes": "one.json"}"#);
        let mut store = VarStore::new();
        let err = Configuration::load(&main, &mut store).unwrap_err();
        assert!(matches!(err, ConfigError::Engine(crate::Error::TypeMismatch { .. })));
    }

    #[test]
    fn unknown_suffix_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let txt = write(dir.path(), "notes.txt", "hi");
        let mut store = VarStore::new();
        assert!(matches!(
            Configuration::load(&txt, &mut store),
            Err(ConfigError::UnknownFileType { .. })
        ));
        assert!(matches!(
            Configuration::load(&dir.path().join("absent"), &mut store),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn parse_error_names_file() {
        let err = parse_str("{", FileFormat::Json, Path::new("broken.json")).unwrap_err();
        assert!(err.to_string().starts_with("invalid JSON in broken.json"));
    }
}
