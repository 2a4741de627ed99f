use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use clap::error::ErrorKind;
use panostitch::logging::{init_logging, open_job_log};
use panostitch::{StitchJob, StitchSession};

const USAGE: &str = "Usage: panostitch <input_00.insv> <input_10.insv> <output.mp4>";

/// Stitch one dual-fisheye recording into an 8K equirectangular H.265 MP4.
#[derive(Parser, Debug)]
#[command(name = "panostitch", version)]
struct Cli {
    /// Front-lens recording (`*_00_*`).
    input_00: PathBuf,

    /// Back-lens recording (`*_10_*`).
    input_10: PathBuf,

    /// Output MP4 path.
    output: PathBuf,

    /// Also write the log to this file.
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Cancel the job after this many seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Write the first stitched frame to this PNG.
    #[arg(long)]
    preview: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            if e.kind() != ErrorKind::MissingRequiredArgument {
                let _ = e.print();
            }
            eprintln!("{USAGE}");
            return ExitCode::FAILURE;
        }
    };

    let job_log = init_logging("info");
    if let Some(path) = &cli.log_file {
        open_job_log(&job_log, path);
    }

    let code = match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("stitching failed: {e:#}");
            ExitCode::FAILURE
        }
    };
    job_log.close();
    code
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let mut job = StitchJob::dual_fisheye_8k(&cli.input_00, &cli.input_10, &cli.output);
    job.tuning.timeout_secs = cli.timeout_secs;

    let mut session = StitchSession::new(job);
    if let Some(path) = &cli.preview {
        session = session.with_preview_png(path);
    }

    tracing::info!(
        front = %cli.input_00.display(),
        back = %cli.input_10.display(),
        output = %cli.output.display(),
        "stitching"
    );
    let report = session.run()?;
    tracing::info!(
        output = %report.output.display(),
        frames = report.frames,
        absorbed_errors = report.absorbed_errors(),
        elapsed_s = report.elapsed.as_secs_f64(),
        "stitching complete"
    );
    Ok(())
}
