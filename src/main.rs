use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use htmlpack::config::{FrontEnd, JsMinify};
use htmlpack::packer::RoadrollerPacker;
use htmlpack::stage::archive::EctArchiver;
use htmlpack::utils::format_bytes;
use htmlpack::{ArtifactSet, BuildConfig, BuildResult, DiagnosticLevel, Pipeline};

#[derive(Parser)]
#[command(name = "htmlpack")]
#[command(about = "Compact a web build into one self-unpacking HTML file", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compact a build output directory
    Build(BuildArgs),
}

#[derive(clap::Args)]
struct BuildArgs {
    /// Directory holding the bundler output
    input_dir: PathBuf,

    /// Output directory (default: dist)
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Entry document name inside the input directory
    #[arg(long)]
    entry: Option<String>,

    /// TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Skip the packer and deploy the script next to the HTML
    #[arg(long)]
    no_pack: bool,

    #[arg(long, env = "HTMLPACK_PACK", value_name = "BOOL", hide = true,
          value_parser = clap::builder::BoolishValueParser::new())]
    pack: Option<bool>,

    /// Packer optimization level (1 or 2)
    #[arg(long)]
    pack_rounds: Option<u8>,

    /// Front end feeding the bundler (tsc, esbuild)
    #[arg(long, env = "HTMLPACK_FRONT_END")]
    front_end: Option<FrontEnd>,

    /// Bundler minifier (esbuild, terser, none)
    #[arg(long, env = "HTMLPACK_JS_MINIFY")]
    js_minify: Option<JsMinify>,

    /// Do not run the archive tool
    #[arg(long)]
    no_archive: bool,

    /// Archive path (relative paths resolve against the output directory)
    #[arg(long)]
    archive: Option<PathBuf>,

    /// Archive byte budget
    #[arg(long)]
    budget: Option<u64>,

    /// Downgrade a missing script slot and dangling references to warnings
    #[arg(long)]
    lenient: bool,

    /// Print the build result as JSON
    #[arg(long)]
    json: bool,
}

impl BuildArgs {
    fn resolve_config(&self) -> Result<BuildConfig> {
        let mut config = match &self.config {
            Some(path) => BuildConfig::load(path)
                .with_context(|| format!("failed to load config '{}'", path.display()))?,
            None => BuildConfig::default(),
        };

        if let Some(out_dir) = &self.out_dir {
            config.out_dir = out_dir.clone();
        }
        if let Some(entry) = &self.entry {
            config.entry = entry.clone();
        }
        if let Some(pack) = self.pack {
            config.packing = pack;
        }
        if self.no_pack {
            config.packing = false;
        }
        if let Some(rounds) = self.pack_rounds {
            config.pack_rounds = rounds;
        }
        if let Some(front_end) = self.front_end {
            config.front_end = front_end;
        }
        if let Some(js_minify) = self.js_minify {
            config.js_minify = js_minify;
        }
        if self.no_archive {
            config.archive = false;
        }
        if let Some(archive) = &self.archive {
            config.archiver.output = archive.clone();
        }
        if let Some(budget) = self.budget {
            config.size_budget = Some(budget);
        }
        if self.lenient {
            config.strict = false;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Build(args) => build(args).await,
    }
}

async fn build(args: BuildArgs) -> Result<()> {
    let config = args.resolve_config()?;

    let artifacts = ArtifactSet::from_dir(&args.input_dir)
        .with_context(|| format!("failed to read build output '{}'", args.input_dir.display()))?;

    let packer = RoadrollerPacker::new(config.packer.command.clone());
    let archiver = EctArchiver::from_config(&config.archiver);
    let pipeline = Pipeline::new(config, packer, archiver);

    let result = pipeline.run(&artifacts).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_summary(&result, pipeline.config());
    }
    Ok(())
}

fn print_summary(result: &BuildResult, config: &BuildConfig) {
    println!(
        "{} {}",
        config.html_path().display(),
        format_bytes(result.html_size as u64)
    );
    if let Some(packed) = result.packed_size {
        println!("  packed bootstrap  {}", format_bytes(packed as u64));
    }
    for name in &result.external_files {
        println!("  sibling           {name}");
    }
    if let Some(archive) = &result.archive {
        println!(
            "{} {}",
            archive.path.display(),
            format_bytes(archive.size)
        );
    }

    let warnings = result.diagnostics_at(DiagnosticLevel::Warning).count();
    if warnings > 0 {
        println!("{warnings} warning(s):");
        for diagnostic in result.diagnostics_at(DiagnosticLevel::Warning) {
            println!("  - {}", diagnostic.message);
        }
    }
}
