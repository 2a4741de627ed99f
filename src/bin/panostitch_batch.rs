use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser;
use panostitch::discovery::{DualTrack, find_dual_tracks, output_paths};
use panostitch::logging::{JobLog, init_logging, open_job_log};
use panostitch::{StitchJob, StitchSession};

/// Stitch every dual-track recording in a directory.
///
/// Front-lens files (`*_00_*.insv`) are paired with their `*_10_*` partner; each pair becomes
/// `<output_dir>/<prefix>_stitched.mp4`, `<prefix>` being the name before `_00_`.
#[derive(Parser, Debug)]
#[command(name = "panostitch-batch", version)]
struct Cli {
    /// Directory holding the recordings.
    input_dir: PathBuf,

    /// Directory for stitched outputs (created if missing).
    output_dir: PathBuf,

    /// Job JSON used as the template for every pair; inputs and output are replaced.
    #[arg(long)]
    template: Option<PathBuf>,

    /// Write one log file per pair into this directory.
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let job_log = init_logging("info");
    match run(&cli, &job_log) {
        Ok(0) => ExitCode::SUCCESS,
        Ok(failed) => {
            tracing::error!(failed, "some recordings failed to stitch");
            ExitCode::FAILURE
        }
        Err(e) => {
            tracing::error!("batch failed: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Stitch every pair; returns how many failed.
fn run(cli: &Cli, job_log: &JobLog) -> anyhow::Result<usize> {
    let template = match &cli.template {
        Some(path) => StitchJob::from_json_file(path)
            .with_context(|| format!("load template '{}'", path.display()))?,
        None => StitchJob::dual_fisheye_8k("", "", ""),
    };
    std::fs::create_dir_all(&cli.output_dir)
        .with_context(|| format!("create output dir '{}'", cli.output_dir.display()))?;

    let tracks = find_dual_tracks(&cli.input_dir)?;
    if tracks.is_empty() {
        tracing::warn!(dir = %cli.input_dir.display(), "no dual-track recordings found");
        return Ok(0);
    }

    let outputs = output_paths(&tracks, &cli.output_dir);
    let mut failed = 0;
    for (i, (track, output)) in tracks.iter().zip(outputs).enumerate() {
        if let Some(dir) = &cli.log_dir {
            open_job_log(job_log, &log_path(dir, track));
        }
        tracing::info!(
            pair = i + 1,
            of = tracks.len(),
            front = %track.front.display(),
            back = %track.back.display(),
            "stitching"
        );
        let job = track.job_from(&template, output);
        match StitchSession::new(job).run() {
            Ok(report) => tracing::info!(
                output = %report.output.display(),
                frames = report.frames,
                absorbed_errors = report.absorbed_errors(),
                "stitching complete"
            ),
            Err(failure) => {
                failed += 1;
                tracing::error!(front = %track.front.display(), "{failure}");
            }
        }
        job_log.close();
    }
    tracing::info!(
        stitched = tracks.len() - failed,
        failed,
        "batch finished"
    );
    Ok(failed)
}

fn log_path(dir: &Path, track: &DualTrack) -> PathBuf {
    let stem = track
        .front
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "recording".to_owned());
    dir.join(format!("{stem}.log"))
}
