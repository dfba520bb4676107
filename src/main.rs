mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use cli::{Cli, OutputFormat};
use wavebars::config;
use wavebars::{BackendKind, Extractor, Waveform};

#[derive(Serialize)]
struct Report<'a> {
    path: &'a Path,
    waveform: Waveform,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();

    // Load config: explicit --config path, or auto-detect wavebars.toml / user config
    let config_path = cli.config.clone().or_else(config::find_config);
    if let Some(ref path) = config_path {
        if let Some(cfg) = config::load_config(path) {
            log::info!("Loaded config from {}", path.display());
            // Merge: config values apply only when CLI is at its default
            if cli.bars == 200 { cli.bars = cfg.waveform.bars; }
            if cli.decimation == 20 { cli.decimation = cfg.waveform.decimation; }
            if !cli.normalize { cli.normalize = cfg.waveform.normalize; }
            if cli.backend == BackendKind::Symphonia { cli.backend = cfg.decoder.backend; }
            if cli.stall_timeout_ms == 10_000 { cli.stall_timeout_ms = cfg.decoder.stall_timeout_ms; }
        } else {
            log::warn!("Failed to load config from {}", path.display());
        }
    }

    log::info!(
        "wavebars: {} input(s), {} bars, decimation {}, backend {:?}",
        cli.inputs.len(),
        cli.bars,
        cli.decimation,
        cli.backend
    );

    let pb = if cli.inputs.len() > 1 {
        let pb = ProgressBar::new(cli.inputs.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} files ({eta} remaining)")
                .context("Invalid progress bar template")?
                .progress_chars("=>-"),
        );
        pb
    } else {
        ProgressBar::hidden()
    };

    let mut reports = Vec::with_capacity(cli.inputs.len());
    let mut failures: Vec<&PathBuf> = Vec::new();

    for input in &cli.inputs {
        match extract_file(&cli, input) {
            Ok(waveform) => reports.push(Report { path: input, waveform }),
            Err(e) => {
                log::error!("{}: {:#}", input.display(), e);
                failures.push(input);
            }
        }
        pb.inc(1);
    }

    pb.finish_and_clear();

    let rendered = match cli.format {
        OutputFormat::Json => {
            let mut json = serde_json::to_string_pretty(&reports).context("Failed to serialize waveforms")?;
            json.push('\n');
            json
        }
        OutputFormat::Text => reports.iter().map(render_text).collect(),
    };

    match cli.output {
        Some(ref path) => {
            std::fs::write(path, rendered)
                .with_context(|| format!("Failed to write output: {}", path.display()))?;
            log::info!("Wrote {} waveform(s) to {}", reports.len(), path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(rendered.as_bytes()).context("Failed to write to stdout")?;
        }
    }

    if !failures.is_empty() {
        anyhow::bail!("{} of {} input(s) failed", failures.len(), cli.inputs.len());
    }
    Ok(())
}

fn extract_file(cli: &Cli, input: &Path) -> Result<Waveform> {
    let bytes = std::fs::read(input)
        .with_context(|| format!("Failed to read audio file: {}", input.display()))?;

    let hint = input.extension().and_then(|e| e.to_str());
    let waveform = Extractor::new(cli.backend.build(hint))
        .bars(cli.bars as usize)
        .decimation(cli.decimation as usize)
        .stall_timeout(Duration::from_millis(cli.stall_timeout_ms))
        .normalize(cli.normalize)
        .extract(&bytes)
        .with_context(|| format!("Failed to extract waveform from {}", input.display()))?;

    Ok(waveform)
}

fn render_text(report: &Report) -> String {
    let bars: Vec<String> = report.waveform.bars.iter().map(|b| format!("{:.4}", b)).collect();
    format!("{}: {}\n", report.path.display(), bars.join(","))
}
