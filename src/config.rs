//! Build configuration.
//!
//! Every switch the pipeline honours lives in [`BuildConfig`], which is
//! handed to [`crate::Pipeline::new`]. Nothing inside the pipeline reads the
//! environment; the CLI resolves defaults, the optional TOML file,
//! environment variables and flags before constructing it.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CompactError;

/// Default archive budget in bytes (13 KiB).
pub const DEFAULT_SIZE_BUDGET: u64 = 13_312;

/// Highest optimization level Roadroller accepts for `-O<level>`.
pub const MAX_PACK_ROUNDS: u8 = 2;

// ---------------------------------------------------------------------------
// Upstream toggles
// ---------------------------------------------------------------------------

/// Type-checking / compilation front end feeding the upstream bundler.
///
/// Recorded and reported only; it affects the compile stage, which runs
/// before this crate sees any artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrontEnd {
    Tsc,
    #[default]
    Esbuild,
}

/// Minification engine used by the upstream bundler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsMinify {
    Esbuild,
    #[default]
    Terser,
    None,
}

impl FromStr for FrontEnd {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tsc" => Ok(FrontEnd::Tsc),
            "esbuild" => Ok(FrontEnd::Esbuild),
            other => Err(format!("unknown front end '{other}' (expected tsc or esbuild)")),
        }
    }
}

impl FromStr for JsMinify {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "esbuild" => Ok(JsMinify::Esbuild),
            "terser" => Ok(JsMinify::Terser),
            "none" | "false" | "off" => Ok(JsMinify::None),
            other => Err(format!(
                "unknown JS minifier '{other}' (expected esbuild, terser or none)"
            )),
        }
    }
}

impl fmt::Display for FrontEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FrontEnd::Tsc => "tsc",
            FrontEnd::Esbuild => "esbuild",
        })
    }
}

impl fmt::Display for JsMinify {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JsMinify::Esbuild => "esbuild",
            JsMinify::Terser => "terser",
            JsMinify::None => "none",
        })
    }
}

// ---------------------------------------------------------------------------
// External tools
// ---------------------------------------------------------------------------

/// How to invoke the Roadroller packer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackerConfig {
    /// Program plus leading arguments, e.g. `["npx", "roadroller"]`.
    pub command: Vec<String>,
}

impl Default for PackerConfig {
    fn default() -> Self {
        Self {
            command: vec!["npx".into(), "roadroller".into()],
        }
    }
}

/// How to invoke the archive tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiverConfig {
    pub program: String,
    /// Effort flag passed verbatim (ECT: `-<iterations><level>`).
    pub effort: String,
    /// Archive path. Relative paths resolve against the output directory.
    pub output: PathBuf,
}

impl Default for ArchiverConfig {
    fn default() -> Self {
        Self {
            program: "ect".into(),
            effort: "-10009".into(),
            output: PathBuf::from("index.zip"),
        }
    }
}

// ---------------------------------------------------------------------------
// BuildConfig
// ---------------------------------------------------------------------------

/// Describes HOW to compact a build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Name of the entry document inside the artifact set.
    pub entry: String,
    /// Output directory for the HTML file, siblings and archive.
    pub out_dir: PathBuf,
    pub front_end: FrontEnd,
    pub js_minify: JsMinify,
    /// Run the entropy-packing stage. When off, the script tag is left in
    /// place and the script is deployed as a separate file.
    pub packing: bool,
    /// Packer optimization level, `1..=MAX_PACK_ROUNDS`.
    pub pack_rounds: u8,
    /// Strict mode (default: true). A missing script slot or a dangling
    /// reference after the build aborts it.
    pub strict: bool,
    /// Whether to write output files to disk.
    pub write_to_disk: bool,
    /// Run the archive finalizer (requires `write_to_disk`).
    pub archive: bool,
    /// Archive byte budget.
    pub size_budget: Option<u64>,
    pub packer: PackerConfig,
    pub archiver: ArchiverConfig,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            entry: "index.html".into(),
            out_dir: PathBuf::from("dist"),
            front_end: FrontEnd::default(),
            js_minify: JsMinify::default(),
            packing: true,
            pack_rounds: 2,
            strict: true,
            write_to_disk: true,
            archive: true,
            size_budget: Some(DEFAULT_SIZE_BUDGET),
            packer: PackerConfig::default(),
            archiver: ArchiverConfig::default(),
        }
    }
}

impl BuildConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml(source: &str) -> Result<Self, CompactError> {
        toml::from_str(source).map_err(|e| CompactError::ConfigError(e.to_string()))
    }

    /// Load a TOML config file.
    pub fn load(path: &Path) -> Result<Self, CompactError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CompactError::ConfigError(format!("failed to read '{}': {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Archive path, resolved against `out_dir` when relative.
    pub fn archive_path(&self) -> PathBuf {
        if self.archiver.output.is_absolute() {
            self.archiver.output.clone()
        } else {
            self.out_dir.join(&self.archiver.output)
        }
    }

    /// Output path of the final HTML file.
    pub fn html_path(&self) -> PathBuf {
        let file_name = Path::new(&self.entry)
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| "index.html".into());
        self.out_dir.join(file_name)
    }

    pub fn validate(&self) -> Result<(), CompactError> {
        if self.entry.trim().is_empty() {
            return Err(CompactError::ConfigError("entry must be a non-empty file name".into()));
        }
        if self.packing && !(1..=MAX_PACK_ROUNDS).contains(&self.pack_rounds) {
            return Err(CompactError::ConfigError(format!(
                "pack_rounds must be between 1 and {MAX_PACK_ROUNDS}, got {}",
                self.pack_rounds
            )));
        }
        if self.packing && self.packer.command.is_empty() {
            return Err(CompactError::ConfigError("packer.command must not be empty".into()));
        }
        if self.archive && !self.write_to_disk {
            return Err(CompactError::ConfigError(
                "archive requires write_to_disk".into(),
            ));
        }
        Ok(())
    }
}
