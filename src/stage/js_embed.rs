//! Script embedding.
//!
//! Turns "HTML that loads a script" into "a script that writes the HTML":
//! the external `<script src>` is removed, the remaining document becomes a
//! `document.write` statement in front of the original code, and that
//! payload is packed into a self-decoding bootstrap. The returned document
//! is nothing but that bootstrap `<script>`.

use lol_html::{element, rewrite_str, RewriteStrSettings};

use crate::packer::{PackInput, PackOptions, Packer};
use crate::stage::note;
use crate::utils;
use crate::{Artifact, CompactError, Diagnostic, DiagnosticLevel};

/// Result of embedding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedOutcome {
    /// The new document: a single `<script>` element.
    pub html: String,
    /// Bootstrap length when packed output was used.
    pub packed_size: Option<usize>,
}

/// Remove the `<script src>` that loads `script_name`, along with any
/// `<link rel="modulepreload">` pointing at the same file.
///
/// Returns the rewritten document and whether the script element was found.
pub fn remove_script_slot(html: &str, script_name: &str) -> Result<(String, bool), CompactError> {
    let mut removed = false;
    let output = rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!("script[src]", |el| {
                    if removed {
                        return Ok(());
                    }
                    let src = el.get_attribute("src").unwrap_or_default();
                    if utils::refers_to(&src, script_name) {
                        el.remove();
                        removed = true;
                    }
                    Ok(())
                }),
                element!(r#"link[rel~="modulepreload" i][href]"#, |el| {
                    let href = el.get_attribute("href").unwrap_or_default();
                    if utils::refers_to(&href, script_name) {
                        el.remove();
                    }
                    Ok(())
                }),
            ],
            ..RewriteStrSettings::default()
        },
    )?;
    Ok((output, removed))
}

/// The combined payload: write the document, then run the application.
pub fn build_payload(html: &str, code: &str) -> String {
    let mut payload = String::with_capacity(html.len() + code.len() + 24);
    payload.push_str("document.write(\"");
    payload.push_str(&utils::escape_js_string(html));
    payload.push_str("\");");
    payload.push_str(code);
    payload
}

/// Embed `html` into `script` and pack the result.
///
/// In strict mode a missing script element is fatal: the code would run
/// twice (once from the leftover tag, once from the payload). So is any
/// other `<script>`/`<link>` left pointing at the script. Packer
/// failures are never fatal; the unpacked payload is inlined instead.
pub async fn embed_script<P: Packer>(
    html: &str,
    script: &Artifact,
    packer: &P,
    options: PackOptions,
    strict: bool,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<EmbedOutcome, CompactError> {
    let code = script.as_text().ok_or_else(|| CompactError::NotText {
        name: script.name.clone(),
    })?;

    let (base, removed) = remove_script_slot(html, &script.name)?;
    if !removed {
        if strict {
            return Err(CompactError::ScriptSlotMissing {
                script: script.name.clone(),
            });
        }
        note(
            diagnostics,
            DiagnosticLevel::Warning,
            format!(
                "No <script src> references `{}`; embedding anyway, the script may run twice",
                script.name
            ),
        );
    } else if strict {
        utils::reject_dangling_references(&base, &[script.name.as_str()])?;
    }

    let payload = build_payload(&base, code);
    tracing::info!(
        script = %script.name,
        html_bytes = base.len(),
        code_bytes = code.len(),
        payload_bytes = payload.len(),
        "built self-writing payload"
    );

    let packed = match packer.pack(PackInput::eval_js(payload.as_str()), options).await {
        Ok(packed) if !packed.is_empty() && packed.len() < payload.len() => packed,
        Ok(packed) => {
            note(
                diagnostics,
                DiagnosticLevel::Info,
                format!(
                    "Packed output ({} bytes) is not smaller than the payload ({} bytes); using the payload as is",
                    packed.len(),
                    payload.len()
                ),
            );
            return Ok(unpacked(&payload));
        }
        Err(err) => {
            note(
                diagnostics,
                DiagnosticLevel::Warning,
                format!("Packing failed, inlining the unpacked payload: {err}"),
            );
            return Ok(unpacked(&payload));
        }
    };

    note(
        diagnostics,
        DiagnosticLevel::Info,
        format!(
            "Packed {} into {} ({} rounds)",
            utils::format_bytes(payload.len() as u64),
            utils::format_bytes(packed.len() as u64),
            options.rounds
        ),
    );

    Ok(EmbedOutcome {
        html: format!("<script>{}</script>", packed.script_body()),
        packed_size: Some(packed.len()),
    })
}

fn unpacked(payload: &str) -> EmbedOutcome {
    EmbedOutcome {
        html: format!("<script>{}</script>", utils::escape_script_data(payload)),
        packed_size: None,
    }
}
