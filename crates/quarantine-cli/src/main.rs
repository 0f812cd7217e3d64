use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use quarantine_core::{
	detect_extension, FixedPathLimit, RecoveryConfig, RecoveryEngine, RecoveryStage,
};
use tracing_subscriber::EnvFilter;

const DEFAULT_ROOT: &str = "VZMOBILE";
const DEFAULT_COMPILED_DIR: &str = "Compiled Quarantine Files";

#[derive(Parser, Debug)]
#[command(name = "quarantine", version, about = "Recover media from backup quarantine segments")]
struct Cli {
	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
	/// Reassemble quarantined segments and copy the recovered media
	Collect {
		/// Root of the backup export
		#[arg(default_value = DEFAULT_ROOT)]
		root: PathBuf,
		/// Output directory (default: <ROOT>/Compiled Quarantine Files)
		#[arg(long)]
		out: Option<PathBuf>,
		/// Force a maximum path length instead of asking the platform
		#[arg(long)]
		max_path: Option<usize>,
		/// Write a JSON report to this file
		#[arg(long)]
		report: Option<PathBuf>,
	},
	/// Print the signature-detected extension of files
	Detect {
		#[arg(required = true)]
		files: Vec<PathBuf>,
	},
}

fn main() -> Result<()> {
	tracing_subscriber::fmt()
		.with_env_filter(
			EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
		)
		.with_writer(std::io::stderr)
		.init();

	let cli = Cli::parse();
	match cli.command {
		Commands::Collect { root, out, max_path, report } => {
			let out = out.unwrap_or_else(|| root.join(DEFAULT_COMPILED_DIR));
			collect(&root, &out, max_path, report.as_deref())?;
		}
		Commands::Detect { files } => {
			for file in files {
				let detected = detect_extension(&file)
					.with_context(|| format!("Failed to read {}", file.display()))?;
				println!("{}\t{}", file.display(), detected.unwrap_or("unknown"));
			}
		}
	}
	Ok(())
}

fn collect(
	root: &Path,
	out: &Path,
	max_path: Option<usize>,
	report_path: Option<&Path>,
) -> Result<()> {
	if !root.exists() {
		bail!("Root folder '{}' not found.", root.display());
	}

	let mut engine = RecoveryEngine::new(RecoveryConfig::default());
	if let Some(limit) = max_path {
		engine = engine.with_path_limit(FixedPathLimit(limit));
	}

	let bar = if std::io::stderr().is_terminal() {
		ProgressBar::new(0)
	} else {
		ProgressBar::hidden()
	};
	bar.set_style(
		ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} {msg}")
			.context("Invalid progress template")?
			.progress_chars("=> "),
	);
	let progress = bar.clone();
	engine.set_progress_callback(move |p| {
		progress.set_length(p.units as u64);
		progress.set_position(p.processed as u64);
		let msg = match p.stage {
			RecoveryStage::Scanning => "scanning".to_string(),
			RecoveryStage::CopyingSegments => format!("copying ({} recovered)", p.recovered),
			RecoveryStage::ReassemblingArchives => format!("reassembling ({} skipped)", p.skipped),
			RecoveryStage::Complete => "done".to_string(),
		};
		progress.set_message(msg);
	});

	let report = engine
		.recover(root, out)
		.with_context(|| format!("Failed to collect quarantined files from {}", root.display()))?;
	bar.finish_and_clear();

	println!("{}", report.summary(root, out));
	if !report.skipped.is_empty() {
		println!("Skipped the following files:");
		for path in &report.skipped {
			println!("  {}", path.display());
		}
	}

	if let Some(report_path) = report_path {
		let json = report.to_json().context("Failed to serialize report")?;
		std::fs::write(report_path, json)
			.with_context(|| format!("Failed to write report {}", report_path.display()))?;
	}
	Ok(())
}
