//! Pipeline stages.
//!
//! Each stage takes the HTML produced by the previous one and returns a new
//! string. Stages never reorder: classify → css_inline → js_embed → markup,
//! then archive on the written file.

pub mod archive;
pub mod classify;
pub mod css_inline;
pub mod js_embed;
pub mod markup;

use crate::{Diagnostic, DiagnosticLevel};

/// Record a diagnostic and emit the matching `tracing` event.
pub(crate) fn note(
    diagnostics: &mut Vec<Diagnostic>,
    level: DiagnosticLevel,
    message: impl Into<String>,
) {
    let message = message.into();
    match level {
        DiagnosticLevel::Error => tracing::error!("{message}"),
        DiagnosticLevel::Warning => tracing::warn!("{message}"),
        DiagnosticLevel::Info => tracing::info!("{message}"),
    }
    diagnostics.push(Diagnostic::new(level, message));
}
