//! Entropy packing.
//!
//! A [`Packer`] turns a JavaScript payload into a short self-decoding
//! bootstrap: two code fragments that, run in sequence, rebuild and
//! evaluate the original text. The statistical modelling lives in the
//! external tool; this module only defines the contract and drives the
//! Roadroller CLI as a child process.

use std::future::Future;
use std::io::Write;
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::Command;

/// How the packer must treat its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    /// JavaScript source; the packer may model it as code.
    Js,
    /// Arbitrary text.
    Text,
}

/// What the decoder does with the reconstructed text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputAction {
    /// Evaluate it as JavaScript.
    Eval,
    /// `document.write` it.
    Write,
}

/// One input unit for the packer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackInput {
    pub data: String,
    pub kind: InputKind,
    pub action: InputAction,
}

impl PackInput {
    /// A JavaScript payload to be evaluated after decoding.
    pub fn eval_js(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            kind: InputKind::Js,
            action: InputAction::Eval,
        }
    }
}

/// Options for a packing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackOptions {
    /// Model-search rounds. More rounds, smaller output, longer build.
    pub rounds: u8,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self { rounds: 2 }
    }
}

/// Bootstrap fragments produced by a packer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackedPayload {
    pub first_line: String,
    pub second_line: String,
}

impl PackedPayload {
    /// Both fragments as the body of one `<script>` element.
    pub fn script_body(&self) -> String {
        if self.second_line.is_empty() {
            return self.first_line.clone();
        }
        format!("{}\n{}", self.first_line, self.second_line)
    }

    /// Byte length of [`Self::script_body`].
    pub fn len(&self) -> usize {
        let separator = usize::from(!self.second_line.is_empty());
        self.first_line.len() + separator + self.second_line.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Errors from a packer.
#[derive(Debug, Error)]
pub enum PackError {
    #[error("packer `{program}` could not be started: {source}")]
    ToolUnavailable {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("packer exited with {status}: {stderr}")]
    ToolError { status: String, stderr: String },

    #[error("packer produced no output")]
    EmptyOutput,

    #[error("packer IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Capability to pack one payload.
pub trait Packer {
    fn pack(
        &self,
        input: PackInput,
        options: PackOptions,
    ) -> impl Future<Output = Result<PackedPayload, PackError>> + Send;
}

// ---------------------------------------------------------------------------
// Roadroller
// ---------------------------------------------------------------------------

/// Runs the Roadroller CLI: `<command…> -t js -a eval -O<rounds> -o <out> <in>`.
#[derive(Debug, Clone)]
pub struct RoadrollerPacker {
    command: Vec<String>,
}

impl RoadrollerPacker {
    /// `command` is the program followed by any leading arguments, e.g.
    /// `["npx", "roadroller"]`.
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }

    fn arguments(&self, input: &PackInput, options: PackOptions, in_path: &str, out_path: &str) -> Vec<String> {
        let kind = match input.kind {
            InputKind::Js => "js",
            InputKind::Text => "text",
        };
        let action = match input.action {
            InputAction::Eval => "eval",
            InputAction::Write => "write",
        };
        let mut args: Vec<String> = self.command.iter().skip(1).cloned().collect();
        args.extend([
            "-t".to_string(),
            kind.to_string(),
            "-a".to_string(),
            action.to_string(),
            format!("-O{}", options.rounds),
            "-o".to_string(),
            out_path.to_string(),
            in_path.to_string(),
        ]);
        args
    }
}

impl Default for RoadrollerPacker {
    fn default() -> Self {
        Self::new(vec!["npx".into(), "roadroller".into()])
    }
}

impl Packer for RoadrollerPacker {
    fn pack(
        &self,
        input: PackInput,
        options: PackOptions,
    ) -> impl Future<Output = Result<PackedPayload, PackError>> + Send {
        let command = self.clone();

        async move {
            let program = command
                .command
                .first()
                .cloned()
                .ok_or_else(|| PackError::ToolUnavailable {
                    program: String::new(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        "empty packer command",
                    ),
                })?;

            let mut in_file = tempfile::Builder::new().suffix(".js").tempfile()?;
            in_file.write_all(input.data.as_bytes())?;
            in_file.flush()?;
            let out_file = tempfile::Builder::new().suffix(".js").tempfile()?;

            let in_path = in_file.path().to_string_lossy().to_string();
            let out_path = out_file.path().to_string_lossy().to_string();
            let args = command.arguments(&input, options, &in_path, &out_path);

            tracing::info!(
                program = %program,
                rounds = options.rounds,
                input_bytes = input.data.len(),
                "running packer"
            );

            let output = Command::new(&program)
                .args(&args)
                .stdin(Stdio::null())
                .output()
                .await
                .map_err(|source| PackError::ToolUnavailable {
                    program: program.clone(),
                    source,
                })?;

            if !output.status.success() {
                return Err(PackError::ToolError {
                    status: output.status.to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                });
            }

            let stderr = String::from_utf8_lossy(&output.stderr);
            for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
                tracing::debug!(target: "htmlpack::packer", "{line}");
            }

            let packed = tokio::fs::read_to_string(out_file.path()).await?;
            parse_packed_output(&packed)
        }
    }
}

/// Split packer output into its two fragments at the first newline.
pub fn parse_packed_output(output: &str) -> Result<PackedPayload, PackError> {
    let output = output.trim_end_matches(['\n', '\r']);
    if output.trim().is_empty() {
        return Err(PackError::EmptyOutput);
    }
    let (first_line, second_line) = output.split_once('\n').unwrap_or((output, ""));
    Ok(PackedPayload {
        first_line: first_line.trim_end_matches('\r').to_string(),
        second_line: second_line.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_two_lines() {
        let packed = parse_packed_output("A='…'\neval(B)\n").unwrap();
        assert_eq!(packed.first_line, "A='…'");
        assert_eq!(packed.second_line, "eval(B)");
        assert_eq!(packed.script_body(), "A='…'\neval(B)");
        assert_eq!(packed.len(), packed.script_body().len());
    }

    #[test]
    fn parse_single_line() {
        let packed = parse_packed_output("eval(1)").unwrap();
        assert_eq!(packed.second_line, "");
        assert_eq!(packed.script_body(), "eval(1)");
        assert_eq!(packed.len(), 7);
    }

    #[test]
    fn parse_empty_output() {
        assert!(matches!(parse_packed_output("\n"), Err(PackError::EmptyOutput)));
    }

    #[test]
    fn roadroller_arguments() {
        let packer = RoadrollerPacker::default();
        let args = packer.arguments(
            &PackInput::eval_js("x"),
            PackOptions { rounds: 2 },
            "in.js",
            "out.js",
        );
        assert_eq!(
            args,
            vec!["roadroller", "-t", "js", "-a", "eval", "-O2", "-o", "out.js", "in.js"]
        );
    }

    #[tokio::test]
    async fn missing_binary_is_tool_unavailable() {
        let packer = RoadrollerPacker::new(vec!["htmlpack-no-such-packer-binary".into()]);
        let err = packer
            .pack(PackInput::eval_js("1"), PackOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PackError::ToolUnavailable { .. }));
    }
}
