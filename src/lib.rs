//! # htmlpack
//!
//! Compacts the output of a web build (one HTML entry, one JavaScript
//! bundle, optional CSS and static files) into a single self-unpacking HTML
//! document, then hands that document to an archive tool so its final size
//! can be tracked against a byte budget.
//!
//! The stages always run in this order:
//!
//! 1. classify the build artifacts ([`stage::classify`])
//! 2. inline the stylesheet ([`stage::css_inline`])
//! 3. embed the document into the script and pack it ([`stage::js_embed`])
//! 4. minify the remaining markup ([`stage::markup`])
//! 5. archive the written file ([`stage::archive`])
//!
//! Minification and compression themselves are delegated to external
//! components (`lightningcss`, `minify-html`, a packer process, an archive
//! tool). This crate owns their ordering and the invariants between them.

pub mod config;
pub mod packer;
pub mod pipeline;
pub mod stage;
pub mod utils;

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use config::BuildConfig;
pub use packer::{PackedPayload, Packer};
pub use pipeline::Pipeline;
pub use stage::archive::{Archiver, FinalArchive};

// ---------------------------------------------------------------------------
// Artifacts
// ---------------------------------------------------------------------------

/// Media kind of a build artifact, derived from its file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Document,
    Script,
    Stylesheet,
    Other,
}

impl ArtifactKind {
    /// Classify a file name by its suffix (case-insensitive).
    pub fn from_name(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".js") || lower.ends_with(".mjs") {
            ArtifactKind::Script
        } else if lower.ends_with(".css") {
            ArtifactKind::Stylesheet
        } else if lower.ends_with(".html") || lower.ends_with(".htm") {
            ArtifactKind::Document
        } else {
            ArtifactKind::Other
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactContent {
    Text(String),
    Binary(Vec<u8>),
}

/// One named output file of the upstream build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Relative, `/`-separated file name. Identity within an [`ArtifactSet`].
    pub name: String,
    pub kind: ArtifactKind,
    pub content: ArtifactContent,
}

impl Artifact {
    pub fn text(name: impl Into<String>, content: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            kind: ArtifactKind::from_name(&name),
            name,
            content: ArtifactContent::Text(content.into()),
        }
    }

    pub fn binary(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        let name = name.into();
        Self {
            kind: ArtifactKind::from_name(&name),
            name,
            content: ArtifactContent::Binary(bytes.into()),
        }
    }

    /// Text content, if the artifact is textual.
    pub fn as_text(&self) -> Option<&str> {
        match &self.content {
            ArtifactContent::Text(text) => Some(text),
            ArtifactContent::Binary(_) => None,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match &self.content {
            ArtifactContent::Text(text) => text.as_bytes(),
            ArtifactContent::Binary(bytes) => bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// All artifacts of one build, keyed by name.
///
/// Backed by a sorted map so that every traversal (and therefore every
/// selection the classifier makes) is independent of insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactSet {
    artifacts: BTreeMap<String, Artifact>,
}

impl ArtifactSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an artifact, returning the previous one with the same name.
    pub fn insert(&mut self, artifact: Artifact) -> Option<Artifact> {
        self.artifacts.insert(artifact.name.clone(), artifact)
    }

    pub fn get(&self, name: &str) -> Option<&Artifact> {
        self.artifacts.get(name)
    }

    /// Artifacts in file-name order.
    pub fn iter(&self) -> impl Iterator<Item = &Artifact> {
        self.artifacts.values()
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Load every file under `dir` (recursively) as an artifact.
    ///
    /// Names are relative to `dir` and always use `/` separators. Files that
    /// decode as UTF-8 become text artifacts, everything else binary.
    pub fn from_dir(dir: &Path) -> Result<Self, CompactError> {
        let mut set = Self::new();
        for entry in walkdir::WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(|e| CompactError::IoError(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry.path().strip_prefix(dir).unwrap_or(entry.path());
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let bytes = std::fs::read(entry.path())?;
            let artifact = match String::from_utf8(bytes) {
                Ok(text) => Artifact::text(name, text),
                Err(err) => Artifact::binary(name, err.into_bytes()),
            };
            set.insert(artifact);
        }
        Ok(set)
    }
}

impl FromIterator<Artifact> for ArtifactSet {
    fn from_iter<I: IntoIterator<Item = Artifact>>(iter: I) -> Self {
        let mut set = Self::new();
        for artifact in iter {
            set.insert(artifact);
        }
        set
    }
}

// ---------------------------------------------------------------------------
// Diagnostic
// ---------------------------------------------------------------------------

/// A structured diagnostic emitted during a build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub message: String,
    pub context: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticLevel {
    Error,
    Warning,
    Info,
}

impl Diagnostic {
    pub fn new(level: DiagnosticLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

// ---------------------------------------------------------------------------
// BuildResult
// ---------------------------------------------------------------------------

/// Everything one compaction run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildResult {
    /// The final, minified HTML document.
    pub html: String,
    /// Byte length of `html`.
    pub html_size: usize,
    /// Byte length of the bootstrap script, when the packer ran.
    pub packed_size: Option<usize>,
    /// Files that must be deployed next to the HTML (never inlined).
    pub external_files: Vec<String>,
    /// The archive, if the finalizer ran and succeeded.
    pub archive: Option<FinalArchive>,
    pub diagnostics: Vec<Diagnostic>,
}

impl BuildResult {
    /// Diagnostics at the given level.
    pub fn diagnostics_at(&self, level: DiagnosticLevel) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(move |d| d.level == level)
    }
}

// ---------------------------------------------------------------------------
// CompactError
// ---------------------------------------------------------------------------

/// Errors that abort the build.
#[derive(Debug, Error)]
pub enum CompactError {
    #[error("Entry document `{entry}` is not part of the build output")]
    MissingEntry { entry: String },

    #[error("Build output contains no JavaScript bundle")]
    MissingScript,

    #[error("Artifact `{name}` must be UTF-8 text to be inlined")]
    NotText { name: String },

    #[error("No <script src> referencing `{script}` found in the entry document")]
    ScriptSlotMissing { script: String },

    #[error("HTML rewrite failed: {0}")]
    RewriteError(#[from] lol_html::errors::RewritingError),

    #[error("Minified markup is not valid UTF-8: {0}")]
    EncodingError(#[from] std::string::FromUtf8Error),

    #[error("Validation failed: {0}")]
    ValidationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Compact one build into a single HTML file (and archive).
///
/// Shorthand for constructing a [`Pipeline`] and running it once.
pub async fn compact_build<P, A>(
    artifacts: &ArtifactSet,
    config: BuildConfig,
    packer: P,
    archiver: A,
) -> Result<BuildResult, CompactError>
where
    P: Packer,
    A: Archiver,
{
    Pipeline::new(config, packer, archiver).run(artifacts).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_from_name() {
        assert_eq!(ArtifactKind::from_name("assets/index-3f2a.js"), ArtifactKind::Script);
        assert_eq!(ArtifactKind::from_name("app.MJS"), ArtifactKind::Script);
        assert_eq!(ArtifactKind::from_name("style.css"), ArtifactKind::Stylesheet);
        assert_eq!(ArtifactKind::from_name("index.html"), ArtifactKind::Document);
        assert_eq!(ArtifactKind::from_name("i.png"), ArtifactKind::Other);
        assert_eq!(ArtifactKind::from_name("app.js.map"), ArtifactKind::Other);
    }

    #[test]
    fn set_iterates_in_name_order() {
        let set: ArtifactSet = vec![
            Artifact::text("b.js", ""),
            Artifact::text("a.css", ""),
            Artifact::binary("c.png", vec![0u8]),
        ]
        .into_iter()
        .collect();
        let names: Vec<_> = set.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["a.css", "b.js", "c.png"]);
    }

    #[test]
    fn load_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("assets")).unwrap();
        std::fs::write(dir.path().join("index.html"), "<p>hi</p>").unwrap();
        std::fs::write(dir.path().join("assets/app.js"), "x()").unwrap();
        std::fs::write(dir.path().join("i.png"), [0x89u8, 0x50, 0xff, 0xfe]).unwrap();

        let set = ArtifactSet::from_dir(dir.path()).unwrap();
        assert_eq!(set.len(), 3);
        assert_eq!(set.get("assets/app.js").unwrap().as_text(), Some("x()"));
        let icon = set.get("i.png").unwrap();
        assert!(icon.as_text().is_none());
        assert_eq!(icon.len(), 4);
    }
}
