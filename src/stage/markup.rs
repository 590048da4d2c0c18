//! Markup minification.
//!
//! Fixed profile, applied to the single-script shell after embedding:
//!
//! 1. class tokens and attributes are sorted so repeated patterns line up
//!    for the archive compressor;
//! 2. `minify-html` removes comments, optional tags and redundant quotes,
//!    collapses whitespace and shortens the doctype.
//!
//! Inline CSS and JS are left byte-for-byte alone: they were minified (and
//! packed) upstream, and re-minifying packed code would break it.

use lol_html::{element, rewrite_str, RewriteStrSettings};
use minify_html::Cfg;

use crate::CompactError;

/// The markup minification profile. Not tunable per build.
pub fn profile() -> Cfg {
    Cfg {
        // Shortest legal doctype
        do_not_minify_doctype: false,
        // Allow the shortest unquoted attribute values browsers accept
        ensure_spec_compliant_unquoted_attribute_values: false,
        // Omit optional closing tags and <html>/<head> openers
        keep_closing_tags: false,
        keep_html_and_head_opening_tags: false,
        keep_spaces_between_attributes: false,
        keep_comments: false,
        // Already minified / packed upstream
        minify_css: false,
        minify_js: false,
        remove_bangs: true,
        remove_processing_instructions: true,
        ..Cfg::new()
    }
}

/// Sort, deduplicate and re-join the tokens of a `class` value.
pub fn sort_class_list(value: &str) -> String {
    let mut classes: Vec<&str> = value.split_ascii_whitespace().collect();
    classes.sort_unstable();
    classes.dedup();
    classes.join(" ")
}

/// Sort every element's attributes by name and its class tokens.
///
/// Elements already in canonical order are left untouched.
pub fn sort_attributes(html: &str) -> Result<String, CompactError> {
    Ok(rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![element!("*", |el| {
                let current: Vec<(String, String)> = el
                    .attributes()
                    .iter()
                    .map(|attr| (attr.name(), attr.value()))
                    .collect();
                if current.is_empty() {
                    return Ok(());
                }

                let mut canonical: Vec<(String, String)> = current
                    .iter()
                    .map(|(name, value)| {
                        if name == "class" {
                            (name.clone(), sort_class_list(value))
                        } else {
                            (name.clone(), value.clone())
                        }
                    })
                    .collect();
                canonical.sort_by(|a, b| a.0.cmp(&b.0));

                if canonical != current {
                    for (name, _) in &current {
                        el.remove_attribute(name);
                    }
                    for (name, value) in &canonical {
                        el.set_attribute(name, value)?;
                    }
                }
                Ok(())
            })],
            ..RewriteStrSettings::default()
        },
    )?)
}

/// Minify a document with the fixed [`profile`].
pub fn minify_markup(html: &str) -> Result<String, CompactError> {
    let sorted = sort_attributes(html)?;
    let minified = minify_html::minify(sorted.as_bytes(), &profile());
    let output = String::from_utf8(minified)?;

    tracing::info!(
        input_bytes = html.len(),
        output_bytes = output.len(),
        "minified markup"
    );
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn class_tokens_sorted_and_deduplicated() {
        assert_eq!(sort_class_list("  btn primary btn  active"), "active btn primary");
        assert_eq!(sort_class_list(""), "");
    }

    #[test]
    fn attributes_sorted_by_name() {
        let html = r#"<a title="t" href="/x" class="z a">go</a>"#;
        assert_eq!(
            sort_attributes(html).unwrap(),
            r#"<a class="a z" href="/x" title="t">go</a>"#
        );
    }

    #[test]
    fn canonical_elements_untouched() {
        let html = r#"<div class="a b" id="x"><p>y</p></div>"#;
        assert_eq!(sort_attributes(html).unwrap(), html);
    }

    #[test]
    fn removes_comments_and_whitespace() {
        let html = "<!DOCTYPE html>\n<html>\n  <head>\n    <!-- build: 42 -->\n    <title>Game</title>\n  </head>\n  <body>\n    <p>Hello</p>\n  </body>\n</html>\n";
        let out = minify_markup(html).unwrap();

        assert!(!out.contains("build: 42"));
        assert!(!out.contains("DOCTYPE"));
        assert!(!out.contains("\n  "));
        assert!(!out.contains("</body>"));
        assert!(out.contains("<title>Game</title>"));
        assert!(out.len() < html.len());
    }

    #[test]
    fn script_body_is_preserved() {
        let html = "<script>A='x  y'\neval(D(A))</script>";
        let out = minify_markup(html).unwrap();
        assert!(out.contains("A='x  y'\neval(D(A))"));
    }

    #[test]
    fn unquotes_simple_attribute_values() {
        let out = minify_markup(r#"<div id="main">x</div>"#).unwrap();
        assert!(out.contains("id=main"));
    }
}
