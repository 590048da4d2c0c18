use std::future::Future;
use std::path::{Path, PathBuf};

use htmlpack::packer::{PackError, PackInput, PackOptions, PackedPayload};
use htmlpack::stage::archive::ArchiveError;
use htmlpack::{
    compact_build, Archiver, Artifact, ArtifactSet, BuildConfig, BuildResult, FinalArchive, Packer,
};
use sha2::{Digest, Sha256};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Echoes a digest of the payload so different inputs give different output.
struct DigestPacker;

impl Packer for DigestPacker {
    fn pack(
        &self,
        input: PackInput,
        _options: PackOptions,
    ) -> impl Future<Output = Result<PackedPayload, PackError>> + Send {
        async move {
            Ok(PackedPayload {
                first_line: format!("A='{}'", &sha256(input.data.as_bytes())[..16]),
                second_line: "eval(D(A))".into(),
            })
        }
    }
}

struct NoArchiver;

impl Archiver for NoArchiver {
    fn compress(
        &self,
        _html: &Path,
        _siblings: &[PathBuf],
        _archive: &Path,
    ) -> impl Future<Output = Result<FinalArchive, ArchiveError>> + Send {
        async { Err::<FinalArchive, _>(ArchiveError::MissingOutput(PathBuf::from("index.zip"))) }
    }
}

fn sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn in_memory() -> BuildConfig {
    BuildConfig {
        write_to_disk: false,
        archive: false,
        ..Default::default()
    }
}

fn artifacts() -> Vec<Artifact> {
    vec![
        Artifact::text(
            "index.html",
            r#"<html><head><link href="b.css" rel="stylesheet"></head><body><canvas id="c" class="full dark"></canvas><script src="a.js"></script></body></html>"#,
        ),
        Artifact::text("b.css", "canvas { width: 100%; }"),
        Artifact::text("a.js", "c.getContext('2d')"),
        Artifact::binary("z.png", vec![1u8, 2, 3]),
        Artifact::text("m.txt", "notes"),
    ]
}

async fn build(set: &ArtifactSet, config: BuildConfig) -> BuildResult {
    compact_build(set, config, DigestPacker, NoArchiver)
        .await
        .unwrap()
}

// ============================================================================
// Deterministic output
// ============================================================================

#[tokio::test]
async fn deterministic_build_identical_bytes() {
    let set: ArtifactSet = artifacts().into_iter().collect();

    let first = build(&set, in_memory()).await;
    let second = build(&set, in_memory()).await;

    assert_eq!(
        sha256(first.html.as_bytes()),
        sha256(second.html.as_bytes()),
        "Builds must produce identical bytes"
    );
    assert_eq!(first.diagnostics, second.diagnostics);
}

#[tokio::test]
async fn classification_independent_of_input_order() {
    let forward: ArtifactSet = artifacts().into_iter().collect();
    let reverse: ArtifactSet = artifacts().into_iter().rev().collect();

    let a = build(&forward, in_memory()).await;
    let b = build(&reverse, in_memory()).await;

    assert_eq!(sha256(a.html.as_bytes()), sha256(b.html.as_bytes()));
    assert_eq!(a.external_files, b.external_files);
    assert_eq!(a.external_files, vec!["m.txt", "z.png"]);
}

#[tokio::test]
async fn unpacked_output_is_deterministic() {
    let set: ArtifactSet = artifacts().into_iter().collect();
    let config = BuildConfig {
        packing: false,
        ..in_memory()
    };

    let first = build(&set, config.clone()).await;
    let second = build(&set, config).await;

    assert_eq!(first.html, second.html);
    // Attributes and class tokens are emitted in canonical order
    assert!(first.html.contains("dark full"));
    assert!(first.html.contains("<style>canvas{width:100%}</style>"));
}

#[tokio::test]
async fn disk_output_matches_result() {
    let dir = tempfile::tempdir().unwrap();
    let set: ArtifactSet = artifacts().into_iter().collect();
    let config = BuildConfig {
        out_dir: dir.path().to_path_buf(),
        archive: false,
        ..Default::default()
    };

    let result = build(&set, config.clone()).await;
    let on_disk = std::fs::read(config.html_path()).unwrap();

    assert_eq!(sha256(&on_disk), sha256(result.html.as_bytes()));
    assert_eq!(std::fs::read(dir.path().join("z.png")).unwrap(), vec![1u8, 2, 3]);
}
