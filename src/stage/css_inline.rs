//! CSS inlining.
//!
//! Minifies the selected stylesheet with lightningcss and swaps the
//! `<link rel="stylesheet">` that references it for an inline `<style>`.

use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::Browsers;
use lol_html::html_content::ContentType;
use lol_html::{element, rewrite_str, RewriteStrSettings};

use crate::stage::note;
use crate::utils;
use crate::{Artifact, CompactError, Diagnostic, DiagnosticLevel};

/// Parse, minify and print a stylesheet.
///
/// Runs lightningcss' rule-level minifier (merges duplicate rules, drops
/// empty ones, shortens values), not just whitespace removal.
pub fn minify_css(source: &str, filename: &str) -> Result<String, String> {
    let mut stylesheet = StyleSheet::parse(
        source,
        ParserOptions {
            filename: filename.to_string(),
            ..ParserOptions::default()
        },
    )
    .map_err(|e| format!("CSS parse error: {e}"))?;

    stylesheet
        .minify(MinifyOptions {
            targets: Browsers::default().into(),
            ..Default::default()
        })
        .map_err(|e| format!("CSS minify error: {e}"))?;

    let result = stylesheet
        .to_css(PrinterOptions {
            minify: true,
            ..Default::default()
        })
        .map_err(|e| format!("CSS print error: {e}"))?;

    Ok(result.code)
}

/// Replace the stylesheet's `<link>` with an inline `<style>` element and
/// drop any `<link rel="preload">` of the same file.
///
/// A `None` stylesheet, or a document without a matching link, passes
/// through unchanged. At most one link is replaced.
pub fn inline_stylesheet(
    html: &str,
    stylesheet: Option<&Artifact>,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<String, CompactError> {
    let Some(stylesheet) = stylesheet else {
        tracing::debug!("no stylesheet selected, skipping CSS inlining");
        return Ok(html.to_string());
    };

    let raw = stylesheet.as_text().ok_or_else(|| CompactError::NotText {
        name: stylesheet.name.clone(),
    })?;

    let css = match minify_css(raw, &stylesheet.name) {
        Ok(css) => css,
        Err(message) => {
            note(
                diagnostics,
                DiagnosticLevel::Warning,
                format!("{message} in `{}`; inlining it unminified", stylesheet.name),
            );
            raw.trim().to_string()
        }
    };
    let style_element = format!("<style>{}</style>", utils::escape_end_tag(&css, "style"));

    let mut replaced = false;
    let output = rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!(r#"link[rel~="stylesheet" i][href]"#, |el| {
                    if replaced {
                        return Ok(());
                    }
                    let href = el.get_attribute("href").unwrap_or_default();
                    if utils::refers_to(&href, &stylesheet.name) {
                        el.replace(&style_element, ContentType::Html);
                        replaced = true;
                    }
                    Ok(())
                }),
                // The file is never deployed, so a preload of it would 404
                element!(r#"link[rel~="preload" i][href]"#, |el| {
                    let href = el.get_attribute("href").unwrap_or_default();
                    if utils::refers_to(&href, &stylesheet.name) {
                        el.remove();
                    }
                    Ok(())
                }),
            ],
            ..RewriteStrSettings::default()
        },
    )?;

    if !replaced {
        note(
            diagnostics,
            DiagnosticLevel::Info,
            format!(
                "No <link rel=\"stylesheet\"> references `{}`; document left unchanged",
                stylesheet.name
            ),
        );
        return Ok(html.to_string());
    }

    tracing::info!(
        stylesheet = %stylesheet.name,
        raw_bytes = raw.len(),
        inlined_bytes = css.len(),
        "inlined stylesheet"
    );
    Ok(output)
}
