//! Archive finalization.
//!
//! The finished HTML (plus any sibling files that could not be inlined) is
//! handed to an external recompressor. Archiving is never fatal: on any
//! failure the uncompressed output on disk is still the deliverable.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::Command;

use crate::config::ArchiverConfig;
use crate::stage::note;
use crate::utils::format_bytes;
use crate::{Diagnostic, DiagnosticLevel};

/// The pipeline's terminal artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalArchive {
    pub path: PathBuf,
    pub size: u64,
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive tool `{program}` is not available: {source}")]
    ToolUnavailable {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("archive tool exited with {status}: {output}")]
    ToolError { status: String, output: String },

    #[error("archive tool reported success but `{0}` was not written")]
    MissingOutput(PathBuf),

    #[error("archive IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Capability to compress the finished output into one archive.
pub trait Archiver {
    fn compress(
        &self,
        html: &Path,
        siblings: &[PathBuf],
        archive: &Path,
    ) -> impl Future<Output = Result<FinalArchive, ArchiveError>> + Send;
}

// ---------------------------------------------------------------------------
// ECT
// ---------------------------------------------------------------------------

/// Efficient Compression Tool: `ect -strip -zip <effort> <archive> <files…>`.
#[derive(Debug, Clone)]
pub struct EctArchiver {
    program: String,
    effort: String,
}

impl EctArchiver {
    pub fn new(program: impl Into<String>, effort: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            effort: effort.into(),
        }
    }

    pub fn from_config(config: &ArchiverConfig) -> Self {
        Self::new(config.program.clone(), config.effort.clone())
    }

    fn arguments(&self, html: &Path, siblings: &[PathBuf], archive: &Path) -> Vec<String> {
        let mut args = vec![
            "-strip".to_string(),
            "-zip".to_string(),
            self.effort.clone(),
            archive.display().to_string(),
            html.display().to_string(),
        ];
        args.extend(siblings.iter().map(|p| p.display().to_string()));
        args
    }
}

impl Default for EctArchiver {
    fn default() -> Self {
        Self::from_config(&ArchiverConfig::default())
    }
}

impl Archiver for EctArchiver {
    fn compress(
        &self,
        html: &Path,
        siblings: &[PathBuf],
        archive: &Path,
    ) -> impl Future<Output = Result<FinalArchive, ArchiveError>> + Send {
        let program = self.program.clone();
        let args = self.arguments(html, siblings, archive);
        let archive = archive.to_path_buf();

        async move {
            // ECT appends to an existing zip
            match tokio::fs::remove_file(&archive).await {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }

            let output = Command::new(&program)
                .args(&args)
                .stdin(Stdio::null())
                .output()
                .await
                .map_err(|source| ArchiveError::ToolUnavailable {
                    program: program.clone(),
                    source,
                })?;

            let report = format!(
                "{}{}",
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            );
            if !output.status.success() {
                return Err(ArchiveError::ToolError {
                    status: output.status.to_string(),
                    output: report.trim().to_string(),
                });
            }
            for line in report.lines().filter(|l| !l.trim().is_empty()) {
                tracing::info!(target: "htmlpack::archive", "{}: {line}", program);
            }

            let size = match tokio::fs::metadata(&archive).await {
                Ok(meta) => meta.len(),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    return Err(ArchiveError::MissingOutput(archive));
                }
                Err(err) => return Err(err.into()),
            };
            Ok(FinalArchive {
                path: archive,
                size,
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Finalize
// ---------------------------------------------------------------------------

/// Run `archiver` and report the result against `size_budget`.
///
/// Every failure is downgraded to a warning and yields `None`.
pub async fn finalize<A: Archiver>(
    archiver: &A,
    html: &Path,
    siblings: &[PathBuf],
    archive: &Path,
    size_budget: Option<u64>,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<FinalArchive> {
    let final_archive = match archiver.compress(html, siblings, archive).await {
        Ok(final_archive) => final_archive,
        Err(err) => {
            note(
                diagnostics,
                DiagnosticLevel::Warning,
                format!(
                    "Archiving failed, `{}` is still usable uncompressed: {err}",
                    html.display()
                ),
            );
            return None;
        }
    };

    note(
        diagnostics,
        DiagnosticLevel::Info,
        format!(
            "Archive {}: {}",
            final_archive.path.display(),
            format_bytes(final_archive.size)
        ),
    );

    if let Ok(meta) = tokio::fs::metadata(html).await {
        if final_archive.size > meta.len() {
            note(
                diagnostics,
                DiagnosticLevel::Warning,
                format!(
                    "Archive ({}) is larger than the uncompressed HTML ({})",
                    format_bytes(final_archive.size),
                    format_bytes(meta.len())
                ),
            );
        }
    }

    if let Some(budget) = size_budget {
        report_budget(final_archive.size, budget, diagnostics);
    }

    Some(final_archive)
}

/// Record how `size` compares to `budget`.
pub fn report_budget(size: u64, budget: u64, diagnostics: &mut Vec<Diagnostic>) {
    if size <= budget {
        note(
            diagnostics,
            DiagnosticLevel::Info,
            format!(
                "Within budget: {} of {} used, {} left",
                format_bytes(size),
                format_bytes(budget),
                format_bytes(budget - size)
            ),
        );
    } else {
        note(
            diagnostics,
            DiagnosticLevel::Warning,
            format!(
                "Over budget by {} ({} of {})",
                format_bytes(size - budget),
                format_bytes(size),
                format_bytes(budget)
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ect_arguments() {
        let ect = EctArchiver::default();
        let args = ect.arguments(
            Path::new("dist/index.html"),
            &[PathBuf::from("dist/i.png")],
            Path::new("dist/index.zip"),
        );
        assert_eq!(
            args,
            vec!["-strip", "-zip", "-10009", "dist/index.zip", "dist/index.html", "dist/i.png"]
        );
    }

    #[tokio::test]
    async fn missing_tool_is_non_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let html = dir.path().join("index.html");
        std::fs::write(&html, "<p>x").unwrap();

        let ect = EctArchiver::new("htmlpack-no-such-archiver-binary", "-9");
        let err = ect
            .compress(&html, &[], &dir.path().join("index.zip"))
            .await
            .unwrap_err();
        assert!(matches!(err, ArchiveError::ToolUnavailable { .. }));

        let mut diagnostics = Vec::new();
        let result = finalize(
            &ect,
            &html,
            &[],
            &dir.path().join("index.zip"),
            Some(13_312),
            &mut diagnostics,
        )
        .await;
        assert!(result.is_none());
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].level, DiagnosticLevel::Warning);
        assert!(diagnostics[0].message.contains("still usable"));
    }

    #[test]
    fn budget_report() {
        let mut diagnostics = Vec::new();
        report_budget(13_000, 13_312, &mut diagnostics);
        report_budget(14_000, 13_312, &mut diagnostics);

        assert_eq!(diagnostics[0].level, DiagnosticLevel::Info);
        assert!(diagnostics[0].message.contains("312 bytes left"));
        assert_eq!(diagnostics[1].level, DiagnosticLevel::Warning);
        assert!(diagnostics[1].message.contains("Over budget by 688 bytes"));
    }
}
