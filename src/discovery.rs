//! Dual-track discovery for batch stitching.
//!
//! Cameras write each lens to its own file: `<prefix>_00_<suffix>.insv` for the front lens and
//! the same name with `_10_` for the back lens.

use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::foundation::error::StitchResult;
use crate::job::model::{LensPosition, StitchJob, StreamLocator};

/// Front-lens marker in recording file names.
pub const FRONT_MARKER: &str = "_00_";
/// Back-lens marker in recording file names.
pub const BACK_MARKER: &str = "_10_";
/// Recording file extension.
pub const RECORDING_EXTENSION: &str = "insv";

/// One recording: front and back lens files.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DualTrack {
    /// `_00_` file.
    pub front: PathBuf,
    /// Matching `_10_` file.
    pub back: PathBuf,
}

impl DualTrack {
    /// Output file for this recording inside `output_dir`.
    pub fn output_in(&self, output_dir: &Path) -> PathBuf {
        stitched_output_path(&self.front, output_dir)
    }

    /// `template` pointed at this recording and writing to `output`.
    ///
    /// A template with exactly one front and one back input keeps its locator settings (such as
    /// the video track) and only has its paths replaced; any other input list is replaced by the
    /// default front/back pair.
    pub fn job_from(&self, template: &StitchJob, output: impl Into<PathBuf>) -> StitchJob {
        let mut job = template.clone();
        let positions: Vec<LensPosition> = job.inputs.iter().map(|l| l.position).collect();
        if positions == [LensPosition::Front, LensPosition::Back] {
            job.inputs[0].path = self.front.clone();
            job.inputs[1].path = self.back.clone();
        } else {
            job.inputs = vec![
                StreamLocator::front(&self.front),
                StreamLocator::back(&self.back),
            ];
        }
        job.output = output.into();
        job
    }
}

/// The back-lens file name for `front`, or `None` when `front` is not a front-lens recording.
pub fn pair_for(front: &Path) -> Option<PathBuf> {
    let name = front.file_name()?.to_str()?;
    let is_recording = front
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(RECORDING_EXTENSION));
    if !is_recording || !name.contains(FRONT_MARKER) {
        return None;
    }
    Some(front.with_file_name(name.replace(FRONT_MARKER, BACK_MARKER)))
}

/// Every front-lens recording in `input_dir` whose back-lens file exists, sorted by path.
///
/// Front files without a partner are skipped with a warning. The scan is not recursive.
#[tracing::instrument(fields(dir = %input_dir.display()))]
pub fn find_dual_tracks(input_dir: &Path) -> StitchResult<Vec<DualTrack>> {
    let entries = std::fs::read_dir(input_dir)
        .with_context(|| format!("failed to read input directory '{}'", input_dir.display()))?;
    let mut fronts = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to list '{}'", input_dir.display()))?;
        let path = entry.path();
        if path.is_file() && pair_for(&path).is_some() {
            fronts.push(path);
        }
    }
    fronts.sort();

    let mut tracks = Vec::with_capacity(fronts.len());
    for front in fronts {
        let Some(back) = pair_for(&front) else {
            continue;
        };
        if back.is_file() {
            tracks.push(DualTrack { front, back });
        } else {
            tracing::warn!(front = %front.display(), "no matching back-lens file");
        }
    }
    tracing::info!(pairs = tracks.len(), "discovered recordings");
    Ok(tracks)
}

/// `<output_dir>/<base>_stitched.mp4`, where `<base>` is the front file's stem up to the
/// first `_00_` marker (`VID_20240101_00_003.insv` becomes `VID_20240101_stitched.mp4`).
/// A stem without a usable prefix is kept whole.
pub fn stitched_output_path(front: &Path, output_dir: &Path) -> PathBuf {
    let stem = front
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "recording".to_owned());
    let base = match stem.split_once(FRONT_MARKER) {
        Some((prefix, _)) if !prefix.is_empty() => prefix,
        _ => stem.as_str(),
    };
    output_dir.join(format!("{base}_stitched.mp4"))
}

/// Output file per track, in order.
///
/// Recordings split into several segments share a prefix; when two tracks would land on the same
/// file, those tracks are named after their full front stem instead.
pub fn output_paths(tracks: &[DualTrack], output_dir: &Path) -> Vec<PathBuf> {
    let short: Vec<PathBuf> = tracks.iter().map(|t| t.output_in(output_dir)).collect();
    short
        .iter()
        .zip(tracks)
        .map(|(path, track)| {
            if short.iter().filter(|p| *p == path).count() == 1 {
                return path.clone();
            }
            let stem = track
                .front
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "recording".to_owned());
            output_dir.join(format!("{stem}_stitched.mp4"))
        })
        .collect()
}

#[cfg(test)]
#[path = "../tests/unit/discovery.rs"]
mod tests;
