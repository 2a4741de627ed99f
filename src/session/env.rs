use std::process::{Command, Stdio};
use std::sync::OnceLock;

use crate::encode::ffmpeg::{is_ffmpeg_on_path, is_ffprobe_on_path};
use crate::foundation::error::{StitchError, StitchResult};
use crate::job::model::Codec;

/// External tooling found at startup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Environment {
    /// First line of `ffmpeg -version`.
    pub ffmpeg_version: String,
    /// Video encoders `ffmpeg` reports (e.g. `libx265`).
    pub encoders: Vec<String>,
}

impl Environment {
    /// Whether `codec`'s encoder is available.
    pub fn supports(&self, codec: Codec) -> bool {
        self.encoders.iter().any(|e| e == codec.ffmpeg_encoder())
    }
}

static ENV: OnceLock<Result<Environment, String>> = OnceLock::new();

/// Probe `ffmpeg`/`ffprobe` once per process.
///
/// Later calls return the cached outcome, including a cached failure.
pub fn init_env() -> StitchResult<&'static Environment> {
    ENV.get_or_init(probe)
        .as_ref()
        .map_err(|msg| StitchError::environment(msg.clone()))
}

#[tracing::instrument]
fn probe() -> Result<Environment, String> {
    if !is_ffmpeg_on_path() {
        return Err("ffmpeg not found on PATH".to_owned());
    }
    if !is_ffprobe_on_path() {
        return Err("ffprobe not found on PATH".to_owned());
    }
    let version = run(&["-hide_banner", "-version"])?;
    let listing = run(&["-hide_banner", "-encoders"])?;
    let env = Environment {
        ffmpeg_version: version.lines().next().unwrap_or_default().trim().to_owned(),
        encoders: parse_video_encoders(&listing),
    };
    tracing::info!(
        version = %env.ffmpeg_version,
        encoders = env.encoders.len(),
        "environment ready"
    );
    Ok(env)
}

fn run(args: &[&str]) -> Result<String, String> {
    let out = Command::new("ffmpeg")
        .args(args)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| format!("failed to run ffmpeg: {e}"))?;
    if !out.status.success() {
        return Err(format!(
            "ffmpeg {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&out.stderr).trim()
        ));
    }
    Ok(String::from_utf8_lossy(&out.stdout).into_owned())
}

/// Names of video encoders in `ffmpeg -encoders` output.
///
/// Entry lines look like ` V....D libx265  libx265 H.265 / HEVC`; the first column's leading `V`
/// marks video.
pub(crate) fn parse_video_encoders(listing: &str) -> Vec<String> {
    listing
        .lines()
        .filter_map(|line| {
            let mut cols = line.split_whitespace();
            let flags = cols.next()?;
            let name = cols.next()?;
            (flags.len() == 6 && flags.starts_with('V') && name != "=").then(|| name.to_owned())
        })
        .collect()
}
