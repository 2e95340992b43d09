//! Configuration for the OBS story editor tools.
//!
//! The `.obs-editor.toml` at the repository root and the one in the working
//! directory are read as layers, followed by the file passed with `--config`.
//! Later layers win key by key. Relative paths resolve against the directory of
//! the file that set them.

use std::env;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

const CONFIG_FILE_NAME: &str = ".obs-editor.toml";

const DEFAULT_DATABASE: &str = ".obs-editor/drafts.sqlite3";
const DEFAULT_SAVE_DELAY_MS: u64 = 3_000;
const DEFAULT_LANGUAGE: &str = "en";
const DEFAULT_IMAGE_ALT: &str = "OBS Image";
const DEFAULT_OUTPUT_DIR: &str = ".";

/// Settings after every layer has been applied and checked.
#[derive(Clone, Debug)]
pub struct Config {
    pub drafts: DraftSettings,
    pub export: ExportSettings,
    pub working_dir: PathBuf,
    /// Layers that contributed, lowest precedence first.
    pub layers: Vec<Layer>,
}

/// Where drafts live and how edits are coalesced before writing.
#[derive(Clone, Debug)]
pub struct DraftSettings {
    pub database: PathBuf,
    pub save_delay: Duration,
    pub default_language: String,
}

/// Settings for rendering and writing Markdown files.
#[derive(Clone, Debug)]
pub struct ExportSettings {
    pub image_alt: String,
    pub output_dir: PathBuf,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LayerKind {
    Builtin,
    Repository,
    Directory,
    Explicit,
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LayerKind::Builtin => "built-in defaults",
            LayerKind::Repository => "repository config",
            LayerKind::Directory => "directory config",
            LayerKind::Explicit => "--config file",
        })
    }
}

/// One source of settings and the directory its relative paths hang off.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Layer {
    pub kind: LayerKind,
    pub file: Option<PathBuf>,
    pub base_dir: PathBuf,
}

impl Layer {
    fn builtin(working_dir: &Path) -> Self {
        Layer {
            kind: LayerKind::Builtin,
            file: None,
            base_dir: working_dir.to_path_buf(),
        }
    }

    fn file(kind: LayerKind, file: PathBuf) -> Self {
        let base_dir = match file.parent() {
            Some(parent) => parent.to_path_buf(),
            None => PathBuf::from("."),
        };
        Layer {
            kind,
            file: Some(file),
            base_dir,
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{} {}", self.kind, file.display()),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// Where to look for configuration. Empty options mean the process working
/// directory and no explicit file.
#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub override_path: Option<PathBuf>,
    pub working_dir: Option<PathBuf>,
}

impl LoadOptions {
    pub fn with_override_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.override_path = Some(path.into());
        self
    }

    pub fn with_working_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(path.into());
        self
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot use {dir} as working directory: {source}")]
    WorkingDir { dir: PathBuf, source: io::Error },
    #[error("config file {path} does not exist")]
    MissingOverride { path: PathBuf },
    #[error("cannot read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("{path} is not valid: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid settings:\n{0}")]
    Invalid(Problems),
}

impl Config {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let working_dir = match options.working_dir {
            Some(dir) => {
                fs::canonicalize(&dir).map_err(|source| ConfigError::WorkingDir { dir, source })?
            }
            None => env::current_dir().map_err(|source| ConfigError::WorkingDir {
                dir: PathBuf::from("."),
                source,
            })?,
        };

        let explicit = options.override_path.map(|path| {
            if path.is_absolute() {
                path
            } else {
                working_dir.join(path)
            }
        });
        if let Some(path) = &explicit {
            if !path.is_file() {
                return Err(ConfigError::MissingOverride { path: path.clone() });
            }
        }

        let layers = discover(&working_dir, explicit);
        let mut merged = Overlay::default();
        for layer in &layers {
            let overlay = match &layer.file {
                Some(file) => read_overlay(file, layer)?,
                None => Overlay::builtin(layer),
            };
            merged.apply(overlay);
        }

        let (drafts, export) = merged.settle().map_err(ConfigError::Invalid)?;
        Ok(Config {
            drafts,
            export,
            working_dir,
            layers,
        })
    }
}

/// Builtin layer first, then the repository file, the working directory file
/// and the explicit file. A path never appears twice.
fn discover(working_dir: &Path, explicit: Option<PathBuf>) -> Vec<Layer> {
    let mut layers = vec![Layer::builtin(working_dir)];

    let repository = working_dir
        .ancestors()
        .find(|dir| dir.join(".git").exists())
        .map(|root| root.join(CONFIG_FILE_NAME));
    let candidates = [
        (LayerKind::Repository, repository),
        (LayerKind::Directory, Some(working_dir.join(CONFIG_FILE_NAME))),
    ];

    for (kind, path) in candidates {
        let Some(path) = path.filter(|path| path.is_file()) else {
            continue;
        };
        let claimed = explicit.as_ref() == Some(&path)
            || layers.iter().any(|layer| layer.file.as_ref() == Some(&path));
        if claimed {
            continue;
        }
        layers.push(Layer::file(kind, path));
    }

    if let Some(path) = explicit {
        layers.push(Layer::file(LayerKind::Explicit, path));
    }
    layers
}

fn read_overlay(path: &Path, layer: &Layer) -> Result<Overlay, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let file: FileConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(file.into_overlay(layer))
}

/// A value together with the layer that set it.
#[derive(Clone, Debug)]
struct Setting<T> {
    value: T,
    layer: Layer,
}

impl<T> Setting<T> {
    fn from(layer: &Layer, value: T) -> Self {
        Setting {
            value,
            layer: layer.clone(),
        }
    }
}

impl Setting<PathBuf> {
    fn resolve(&self) -> PathBuf {
        if self.value.is_absolute() {
            self.value.clone()
        } else {
            self.layer.base_dir.join(&self.value)
        }
    }
}

fn replace_if_set<T>(slot: &mut Option<T>, next: Option<T>) {
    if next.is_some() {
        *slot = next;
    }
}

#[derive(Clone, Debug, Default)]
struct Overlay {
    database: Option<Setting<PathBuf>>,
    save_delay_ms: Option<Setting<u64>>,
    default_language: Option<Setting<String>>,
    image_alt: Option<Setting<String>>,
    output_dir: Option<Setting<PathBuf>>,
}

impl Overlay {
    fn builtin(layer: &Layer) -> Self {
        Overlay {
            database: Some(Setting::from(layer, PathBuf::from(DEFAULT_DATABASE))),
            save_delay_ms: Some(Setting::from(layer, DEFAULT_SAVE_DELAY_MS)),
            default_language: Some(Setting::from(layer, DEFAULT_LANGUAGE.to_string())),
            image_alt: Some(Setting::from(layer, DEFAULT_IMAGE_ALT.to_string())),
            output_dir: Some(Setting::from(layer, PathBuf::from(DEFAULT_OUTPUT_DIR))),
        }
    }

    fn apply(&mut self, later: Overlay) {
        replace_if_set(&mut self.database, later.database);
        replace_if_set(&mut self.save_delay_ms, later.save_delay_ms);
        replace_if_set(&mut self.default_language, later.default_language);
        replace_if_set(&mut self.image_alt, later.image_alt);
        replace_if_set(&mut self.output_dir, later.output_dir);
    }

    /// Check every value and build the typed settings. All problems are
    /// reported at once.
    fn settle(self) -> Result<(DraftSettings, ExportSettings), Problems> {
        let fallback = Layer::builtin(Path::new("."));
        let database = self
            .database
            .unwrap_or_else(|| Setting::from(&fallback, PathBuf::from(DEFAULT_DATABASE)));
        let save_delay_ms = self
            .save_delay_ms
            .unwrap_or_else(|| Setting::from(&fallback, DEFAULT_SAVE_DELAY_MS));
        let default_language = self
            .default_language
            .unwrap_or_else(|| Setting::from(&fallback, DEFAULT_LANGUAGE.to_string()));
        let image_alt = self
            .image_alt
            .unwrap_or_else(|| Setting::from(&fallback, DEFAULT_IMAGE_ALT.to_string()));
        let output_dir = self
            .output_dir
            .unwrap_or_else(|| Setting::from(&fallback, PathBuf::from(DEFAULT_OUTPUT_DIR)));

        let mut problems = Vec::new();
        let mut complain = |layer: &Layer, message: String| {
            problems.push(Problem {
                layer: Some(layer.clone()),
                message,
            });
        };

        if save_delay_ms.value == 0 {
            complain(
                &save_delay_ms.layer,
                "drafts.save_delay_ms must be greater than zero".into(),
            );
        }

        let language = default_language.value.trim().to_string();
        if language.is_empty() {
            complain(
                &default_language.layer,
                "drafts.default_language must not be empty".into(),
            );
        } else if language.contains('_') {
            complain(
                &default_language.layer,
                format!("drafts.default_language '{language}' must not contain '_'"),
            );
        }

        if image_alt.value.contains(['[', ']', '\n']) {
            complain(
                &image_alt.layer,
                format!(
                    "export.image_alt '{}' must not contain brackets or line breaks",
                    image_alt.value
                ),
            );
        }

        if !problems.is_empty() {
            return Err(Problems(problems));
        }

        Ok((
            DraftSettings {
                database: database.resolve(),
                save_delay: Duration::from_millis(save_delay_ms.value),
                default_language: language,
            },
            ExportSettings {
                image_alt: image_alt.value,
                output_dir: output_dir.resolve(),
            },
        ))
    }
}

/// Every rejected setting, one per line.
#[derive(Debug)]
pub struct Problems(pub Vec<Problem>);

impl Problems {
    pub fn iter(&self) -> std::slice::Iter<'_, Problem> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Problems {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines: Vec<String> = self.0.iter().map(|problem| format!("  {problem}")).collect();
        f.write_str(&lines.join("\n"))
    }
}

#[derive(Clone, Debug)]
pub struct Problem {
    pub layer: Option<Layer>,
    pub message: String,
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.layer {
            Some(layer) => write!(f, "{} [{}]", self.message, layer),
            None => f.write_str(&self.message),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    drafts: FileDrafts,
    export: FileExport,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileDrafts {
    database: Option<PathBuf>,
    save_delay_ms: Option<u64>,
    default_language: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileExport {
    image_alt: Option<String>,
    output_dir: Option<PathBuf>,
}

impl FileConfig {
    fn into_overlay(self, layer: &Layer) -> Overlay {
        Overlay {
            database: self.drafts.database.map(|value| Setting::from(layer, value)),
            save_delay_ms: self.drafts.save_delay_ms.map(|value| Setting::from(layer, value)),
            default_language: self
                .drafts
                .default_language
                .map(|value| Setting::from(layer, value)),
            image_alt: self.export.image_alt.map(|value| Setting::from(layer, value)),
            output_dir: self.export.output_dir.map(|value| Setting::from(layer, value)),
        }
    }
}
