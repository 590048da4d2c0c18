//! Core compaction logic.
//!
//! This module orchestrates the full pipeline:
//! 1. Classify the build output
//! 2. Inline the stylesheet
//! 3. Embed the document into the script and pack it
//! 4. Minify the markup
//! 5. Validate, write to disk and archive
//!
//! **Stages never reorder.** Packing must see the document with CSS already
//! inlined, and markup minification must only ever see the packed shell.

use std::path::{Component, Path, PathBuf};

use crate::packer::{PackOptions, Packer};
use crate::stage::archive::{self, Archiver};
use crate::stage::{classify, css_inline, js_embed, markup, note};
use crate::utils;
use crate::{Artifact, ArtifactSet, BuildConfig, BuildResult, CompactError, DiagnosticLevel};

/// A configured compaction pipeline.
///
/// The packer and archiver are capabilities handed in by the caller, so the
/// orchestration can run against fakes in tests.
#[derive(Debug)]
pub struct Pipeline<P, A> {
    config: BuildConfig,
    packer: P,
    archiver: A,
}

impl<P: Packer, A: Archiver> Pipeline<P, A> {
    pub fn new(config: BuildConfig, packer: P, archiver: A) -> Self {
        Self {
            config,
            packer,
            archiver,
        }
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Run every stage once over `artifacts`.
    pub async fn run(&self, artifacts: &ArtifactSet) -> Result<BuildResult, CompactError> {
        let config = &self.config;
        config.validate()?;

        let mut diagnostics = Vec::new();
        note(
            &mut diagnostics,
            DiagnosticLevel::Info,
            format!(
                "Build started: {} artifacts, entry `{}` (front end: {}, bundler minify: {}, packing: {})",
                artifacts.len(),
                config.entry,
                config.front_end,
                config.js_minify,
                if config.packing { "on" } else { "off" }
            ),
        );

        // 1. Classify
        let classified = classify::classify(artifacts, &config.entry, &mut diagnostics)?;
        let mut html = classified.entry_html()?.to_string();

        // 2. Inline CSS
        html = css_inline::inline_stylesheet(&html, classified.stylesheet, &mut diagnostics)?;
        // Checked before packing hides the document inside the payload
        if config.strict {
            if let Some(stylesheet) = classified.stylesheet {
                utils::reject_dangling_references(&html, &[stylesheet.name.as_str()])?;
            }
        }

        // 3. Embed + pack
        let mut packed_size = None;
        let mut external: Vec<&Artifact> = classified.others.clone();
        if config.packing {
            let outcome = js_embed::embed_script(
                &html,
                classified.script,
                &self.packer,
                PackOptions {
                    rounds: config.pack_rounds,
                },
                config.strict,
                &mut diagnostics,
            )
            .await?;
            html = outcome.html;
            packed_size = outcome.packed_size;
        } else {
            note(
                &mut diagnostics,
                DiagnosticLevel::Info,
                format!(
                    "Packing disabled; `{}` stays an external script",
                    classified.script.name
                ),
            );
            external.push(classified.script);
            external.sort_by(|a, b| a.name.cmp(&b.name));
        }

        // 4. Minify
        html = markup::minify_markup(&html)?;

        // Post-build strict validation
        if config.strict {
            let mut managed: Vec<&str> = Vec::new();
            if let Some(stylesheet) = classified.stylesheet {
                managed.push(&stylesheet.name);
            }
            if config.packing {
                managed.push(&classified.script.name);
            }
            utils::reject_dangling_references(&html, &managed)?;
        }

        let external_files: Vec<String> = external.iter().map(|a| a.name.clone()).collect();

        // Resolve every destination before touching the disk
        let html_path = config.html_path();
        let archive_path = config.archive_path();
        let mut destinations = Vec::with_capacity(external.len());
        for artifact in &external {
            let path = output_path(&config.out_dir, &artifact.name)?;
            if path == html_path || (config.archive && path == archive_path) {
                return Err(CompactError::ConfigError(format!(
                    "artifact `{}` would overwrite {}",
                    artifact.name,
                    path.display()
                )));
            }
            destinations.push((*artifact, path));
        }

        // 5. Write to disk + archive
        let mut final_archive = None;
        if config.write_to_disk {
            tokio::fs::create_dir_all(&config.out_dir).await?;
            tokio::fs::write(&html_path, &html).await?;

            let mut siblings = Vec::with_capacity(destinations.len());
            for (artifact, path) in destinations {
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(&path, artifact.as_bytes()).await?;
                siblings.push(path);
            }

            note(
                &mut diagnostics,
                DiagnosticLevel::Info,
                format!(
                    "Written {} ({}) and {} sibling file(s) to {}",
                    html_path.display(),
                    utils::format_bytes(html.len() as u64),
                    siblings.len(),
                    config.out_dir.display()
                ),
            );

            if config.archive {
                final_archive = archive::finalize(
                    &self.archiver,
                    &html_path,
                    &siblings,
                    &archive_path,
                    config.size_budget,
                    &mut diagnostics,
                )
                .await;
            }
        }

        note(
            &mut diagnostics,
            DiagnosticLevel::Info,
            format!(
                "Build complete: {} HTML, {} external file(s){}",
                utils::format_bytes(html.len() as u64),
                external_files.len(),
                final_archive
                    .as_ref()
                    .map(|a| format!(", {} archive", utils::format_bytes(a.size)))
                    .unwrap_or_default()
            ),
        );

        Ok(BuildResult {
            html_size: html.len(),
            html,
            packed_size,
            external_files,
            archive: final_archive,
            diagnostics,
        })
    }
}

/// Resolve an artifact name under `out_dir`, refusing names that escape it.
fn output_path(out_dir: &Path, name: &str) -> Result<PathBuf, CompactError> {
    let relative = Path::new(name);
    let escapes = relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(CompactError::ConfigError(format!(
            "artifact name `{name}` must be a relative path inside the output directory"
        )));
    }
    Ok(out_dir.join(relative))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_path_stays_inside_out_dir() {
        let out = Path::new("dist");
        assert_eq!(
            output_path(out, "assets/i.png").unwrap(),
            PathBuf::from("dist/assets/i.png")
        );
        assert!(output_path(out, "../i.png").is_err());
        assert!(output_path(out, "/etc/passwd").is_err());
    }
}
