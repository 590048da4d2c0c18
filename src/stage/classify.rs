//! Bundle classification.
//!
//! Picks the entry document, the one script and the (optional) one
//! stylesheet that get inlined. Everything else is "unhandled": it is
//! reported once by name and must be deployed next to the HTML.

use crate::stage::note;
use crate::{Artifact, ArtifactKind, ArtifactSet, CompactError, Diagnostic, DiagnosticLevel};

/// The artifacts a build is made of, by role.
#[derive(Debug, Clone)]
pub struct Classification<'a> {
    pub entry: &'a Artifact,
    pub script: &'a Artifact,
    pub stylesheet: Option<&'a Artifact>,
    /// Unhandled artifacts, in name order.
    pub others: Vec<&'a Artifact>,
}

impl Classification<'_> {
    /// Entry document text.
    pub fn entry_html(&self) -> Result<&str, CompactError> {
        text_of(self.entry)
    }

    /// Script code.
    pub fn script_code(&self) -> Result<&str, CompactError> {
        text_of(self.script)
    }
}

/// Classify `artifacts` for the entry named `entry`.
///
/// Fails fast when the entry document or the script is missing; the later
/// stages depend on both. Emits exactly one warning per unhandled artifact.
pub fn classify<'a>(
    artifacts: &'a ArtifactSet,
    entry: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<Classification<'a>, CompactError> {
    let entry_artifact = artifacts
        .get(entry)
        .ok_or_else(|| CompactError::MissingEntry {
            entry: entry.to_string(),
        })?;

    let mut script = None;
    let mut stylesheet = None;
    let mut others = Vec::new();

    // Name order: the first script / stylesheet wins, later ones are unhandled
    for artifact in artifacts.iter() {
        if artifact.name == entry_artifact.name {
            continue;
        }
        match artifact.kind {
            ArtifactKind::Script if script.is_none() => script = Some(artifact),
            ArtifactKind::Stylesheet if stylesheet.is_none() => stylesheet = Some(artifact),
            _ => others.push(artifact),
        }
    }

    let script = script.ok_or(CompactError::MissingScript)?;

    for other in &others {
        note(
            diagnostics,
            DiagnosticLevel::Warning,
            format!(
                "Unhandled asset `{}` ({} bytes) will not be inlined; deploy it as a separate file",
                other.name,
                other.len()
            ),
        );
    }

    tracing::debug!(
        entry = %entry_artifact.name,
        script = %script.name,
        stylesheet = stylesheet.map(|s| s.name.as_str()).unwrap_or("-"),
        unhandled = others.len(),
        "classified build output"
    );

    Ok(Classification {
        entry: entry_artifact,
        script,
        stylesheet,
        others,
    })
}

fn text_of(artifact: &Artifact) -> Result<&str, CompactError> {
    artifact.as_text().ok_or_else(|| CompactError::NotText {
        name: artifact.name.clone(),
    })
}
