//! Output contract tests.
//!
//! The JSON printed by `htmlpack build --json` and the TOML config keys are
//! consumed by other tooling. Renaming a field fails these tests.

use std::future::Future;
use std::path::{Path, PathBuf};

use htmlpack::packer::{PackError, PackInput, PackOptions, PackedPayload};
use htmlpack::stage::archive::ArchiveError;
use htmlpack::{
    compact_build, Archiver, Artifact, ArtifactSet, BuildConfig, CompactError, FinalArchive, Packer,
};

struct TinyPacker;

impl Packer for TinyPacker {
    fn pack(
        &self,
        _input: PackInput,
        _options: PackOptions,
    ) -> impl Future<Output = Result<PackedPayload, PackError>> + Send {
        async {
            Ok(PackedPayload {
                first_line: "A=0".into(),
                second_line: "eval(A)".into(),
            })
        }
    }
}

struct FixedArchiver(u64);

impl Archiver for FixedArchiver {
    fn compress(
        &self,
        _html: &Path,
        _siblings: &[PathBuf],
        archive: &Path,
    ) -> impl Future<Output = Result<FinalArchive, ArchiveError>> + Send {
        let archive = archive.to_path_buf();
        let size = self.0;
        async move { Ok(FinalArchive { path: archive, size }) }
    }
}

fn build() -> ArtifactSet {
    vec![
        Artifact::text("index.html", r#"<script src="app.js"></script>"#),
        Artifact::text("app.js", "f()"),
        Artifact::binary("i.png", vec![0u8]),
    ]
    .into_iter()
    .collect()
}

// ===========================================================================
// JSON report
// ===========================================================================

#[tokio::test]
async fn contract_build_result_json_keys() {
    let dir = tempfile::tempdir().unwrap();
    let config = BuildConfig {
        out_dir: dir.path().to_path_buf(),
        ..Default::default()
    };
    let result = compact_build(&build(), config, TinyPacker, FixedArchiver(512))
        .await
        .unwrap();

    let json = serde_json::to_value(&result).unwrap();
    let object = json.as_object().unwrap();
    let mut keys: Vec<_> = object.keys().map(String::as_str).collect();
    keys.sort_unstable();
    assert_eq!(
        keys,
        vec!["archive", "diagnostics", "external_files", "html", "html_size", "packed_size"]
    );

    assert_eq!(json["packed_size"], 11);
    assert_eq!(json["archive"]["size"], 512);
    assert_eq!(json["external_files"][0], "i.png");

    let levels: Vec<_> = json["diagnostics"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["level"].as_str().unwrap().to_string())
        .collect();
    assert!(levels.iter().all(|l| ["Error", "Warning", "Info"].contains(&l.as_str())));
    assert!(levels.iter().any(|l| l == "Warning"));
}

#[tokio::test]
async fn contract_over_budget_is_a_warning_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = BuildConfig {
        out_dir: dir.path().to_path_buf(),
        size_budget: Some(100),
        ..Default::default()
    };
    let result = compact_build(&build(), config, TinyPacker, FixedArchiver(150))
        .await
        .unwrap();

    assert!(result
        .diagnostics
        .iter()
        .any(|d| d.message == "Over budget by 50 bytes (150 bytes of 100 bytes)"));
}

// ===========================================================================
// Config keys
// ===========================================================================

#[test]
fn contract_toml_keys() {
    let config = BuildConfig::from_toml(
        r#"
        entry = "game.html"
        out_dir = "public"
        front_end = "tsc"
        js_minify = "esbuild"
        packing = true
        pack_rounds = 1
        strict = false
        write_to_disk = true
        archive = true
        size_budget = 13312

        [packer]
        command = ["roadroller"]

        [archiver]
        program = "ect"
        effort = "-9"
        output = "game.zip"
        "#,
    )
    .unwrap();

    assert_eq!(config.entry, "game.html");
    assert_eq!(config.pack_rounds, 1);
    assert!(!config.strict);
    assert_eq!(config.packer.command, vec!["roadroller"]);
    assert_eq!(config.archive_path(), PathBuf::from("public/game.zip"));
    assert!(config.validate().is_ok());
}

#[test]
fn contract_unknown_front_end_rejected() {
    match BuildConfig::from_toml("front_end = \"swc\"") {
        Err(CompactError::ConfigError(_)) => {}
        other => panic!("Expected ConfigError, got {other:?}"),
    }
}

// ===========================================================================
// Error messages
// ===========================================================================

#[test]
fn contract_error_messages() {
    assert_eq!(
        CompactError::MissingScript.to_string(),
        "Build output contains no JavaScript bundle"
    );
    assert_eq!(
        CompactError::MissingEntry {
            entry: "index.html".into()
        }
        .to_string(),
        "Entry document `index.html` is not part of the build output"
    );
}
