//! Utility functions for the pipeline.
//!
//! - JS string escaping (injection-safe inside `<script>`)
//! - Artifact reference matching (`./` / `/` prefixes, query strings)
//! - Post-build validation helpers

use regex::Regex;

use crate::{CompactError, Diagnostic, DiagnosticLevel};

// ---------------------------------------------------------------------------
// JS String Escaping
// ---------------------------------------------------------------------------

/// Escape a string for embedding inside a JS double-quoted string literal
/// that itself lives in an HTML `<script>` element.
///
/// Besides the usual quote/backslash/control escapes, `</` becomes `<\/`
/// and `<!--` becomes `<\!--` so the literal can never terminate the
/// surrounding element or open an HTML comment.
pub fn escape_js_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 16);
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            '<' => {
                out.push('<');
                match chars.peek() {
                    Some('/') => out.push('\\'),
                    Some('!') => out.push('\\'),
                    _ => {}
                }
            }
            c => out.push(c),
        }
    }
    out
}

/// Neutralize every `</tag` (ASCII case-insensitive) in raw element text by
/// rewriting it to `<\/tag`.
///
/// Used where text is placed verbatim inside a raw-text element (`<style>`,
/// `<script>`) without further escaping.
pub fn escape_end_tag(text: &str, tag: &str) -> String {
    let needle = format!("</{}", tag.to_ascii_lowercase());
    let lower = text.to_ascii_lowercase();
    if !lower.contains(&needle) {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len() + 8);
    let mut last = 0;
    for (pos, _) in lower.match_indices(&needle) {
        out.push_str(&text[last..pos]);
        out.push_str("<\\/");
        last = pos + 2;
    }
    out.push_str(&text[last..]);
    out
}

/// Make text safe to place verbatim as the body of a `<script>` element.
///
/// Besides `</script`, every `<!--` is rewritten to `<\!--`: a comment
/// opener followed by `<script` would switch the tokenizer into its
/// double-escaped state, where the real closing tag no longer ends the
/// element.
pub fn escape_script_data(text: &str) -> String {
    escape_end_tag(text, "script").replace("<!--", "<\\!--")
}

// ---------------------------------------------------------------------------
// Artifact References
// ---------------------------------------------------------------------------

/// Normalize an `href`/`src` value for comparison with an artifact name.
///
/// Drops query string and fragment, then any leading `./` and `/`
/// segments: `./assets/app.js?v=1` → `assets/app.js`.
pub fn normalize_reference(reference: &str) -> &str {
    let end = reference.find(['?', '#']).unwrap_or(reference.len());
    let mut path = reference[..end].trim();
    loop {
        if let Some(rest) = path.strip_prefix("./") {
            path = rest;
        } else if let Some(rest) = path.strip_prefix('/') {
            path = rest;
        } else {
            return path;
        }
    }
}

/// Whether an `href`/`src` value points at the named artifact.
pub fn refers_to(reference: &str, artifact_name: &str) -> bool {
    let reference = normalize_reference(reference);
    !reference.is_empty() && reference == normalize_reference(artifact_name)
}

// ---------------------------------------------------------------------------
// Post-Build Validation
// ---------------------------------------------------------------------------

/// Validate that no `<link>` or `<script>` element in `html` still points at
/// one of the `managed` artifacts (those the pipeline inlined).
pub fn validate_no_dangling_references(
    html: &str,
    managed: &[&str],
) -> Result<(), Vec<Diagnostic>> {
    if managed.is_empty() {
        return Ok(());
    }

    // Opening <link>/<script> tags, then their href/src value (quoted or not)
    let tag_re = Regex::new(r"(?is)<(link|script)\b([^>]*)>").unwrap();
    let attr_re =
        Regex::new(r#"(?i)\b(?:href|src)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>"']+))"#).unwrap();

    let mut dangling = Vec::new();
    for tag in tag_re.captures_iter(html) {
        let element = tag.get(1).map(|m| m.as_str().to_ascii_lowercase()).unwrap_or_default();
        let attrs = tag.get(2).map(|m| m.as_str()).unwrap_or("");

        for cap in attr_re.captures_iter(attrs) {
            let value = cap
                .get(1)
                .or(cap.get(2))
                .or(cap.get(3))
                .map(|m| m.as_str())
                .unwrap_or("");

            if let Some(name) = managed.iter().find(|name| refers_to(value, name)) {
                dangling.push(
                    Diagnostic::new(
                        DiagnosticLevel::Error,
                        format!("Dangling <{element}> reference to inlined artifact `{name}`"),
                    )
                    .with_context(format!("{element} attribute value: {value}")),
                );
            }
        }
    }

    if dangling.is_empty() {
        Ok(())
    } else {
        Err(dangling)
    }
}

/// [`validate_no_dangling_references`] as a fatal [`CompactError::ValidationError`].
pub fn reject_dangling_references(html: &str, managed: &[&str]) -> Result<(), CompactError> {
    validate_no_dangling_references(html, managed).map_err(|diags| {
        CompactError::ValidationError(
            diags
                .iter()
                .map(|d| d.message.clone())
                .collect::<Vec<_>>()
                .join("; "),
        )
    })
}

/// Render a byte count with thousands separators: `13312` → `13,312 bytes`.
pub fn format_bytes(bytes: u64) -> String {
    let digits = bytes.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 6);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out.push_str(" bytes");
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
