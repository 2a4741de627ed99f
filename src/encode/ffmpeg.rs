use std::collections::VecDeque;
use std::io::{Read, Write as _};
use std::path::Path;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc;
use std::thread::JoinHandle;

use crate::encode::annexb::{AccessUnitSplitter, is_keyframe};
use crate::encode::{ChunkMuxer, EncodeSettings, EncodedChunk, VideoEncoder};
use crate::foundation::core::Timestamp;
use crate::foundation::error::{StitchError, StitchResult};
use crate::fusion::PanoramicFrame;
use crate::job::model::Codec;

type StderrDrain = JoinHandle<std::io::Result<Vec<u8>>>;

/// Arguments of the encoding `ffmpeg`: raw RGBA on stdin, Annex-B on stdout.
pub fn encoder_args(settings: &EncodeSettings) -> Vec<String> {
    let rate = settings.bitrate_bps.to_string();
    let mut args: Vec<String> = [
        "-hide_banner",
        "-loglevel",
        "error",
        "-f",
        "rawvideo",
        "-pix_fmt",
        "rgba",
        "-s",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    args.push(format!("{}x{}", settings.width, settings.height));
    args.push("-r".to_string());
    args.push(format!("{}/{}", settings.fps.num, settings.fps.den));
    args.extend(
        [
            "-i",
            "pipe:0",
            "-an",
            "-c:v",
            settings.codec.ffmpeg_encoder(),
            "-pix_fmt",
            "yuv420p",
            "-b:v",
            rate.as_str(),
            "-maxrate",
            rate.as_str(),
            "-bufsize",
        ]
        .iter()
        .map(|s| s.to_string()),
    );
    args.push(settings.bitrate_bps.saturating_mul(2).to_string());
    match settings.codec {
        Codec::H264 => args.extend(["-bf", "0", "-x264-params", "aud=1"].map(String::from)),
        Codec::H265 => args.extend(
            [
                "-x265-params",
                "bframes=0:aud=1:repeat-headers=1:log-level=error",
            ]
            .map(String::from),
        ),
    }
    args.extend(["-f", settings.codec.elementary_format(), "pipe:1"].map(String::from));
    args
}

/// Arguments of the muxing `ffmpeg`: Annex-B on stdin, MP4 at the output path.
pub fn muxer_args(settings: &EncodeSettings) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        if settings.overwrite { "-y" } else { "-n" }.into(),
        "-f".into(),
        settings.codec.elementary_format().into(),
        "-framerate".into(),
        format!("{}/{}", settings.fps.num, settings.fps.den),
        "-i".into(),
        "pipe:0".into(),
        "-c:v".into(),
        "copy".into(),
    ];
    if settings.codec == Codec::H265 {
        args.extend(["-tag:v", "hvc1"].map(String::from));
    }
    args.extend(["-movflags", "+faststart"].map(String::from));
    args.push(settings.output.to_string_lossy().into_owned());
    args
}

fn spawn_stderr_drain(child: &mut Child) -> StitchResult<StderrDrain> {
    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| StitchError::encoder_init("failed to open ffmpeg stderr (unexpected)"))?;
    Ok(std::thread::spawn(move || {
        let mut bytes = Vec::new();
        stderr.read_to_end(&mut bytes)?;
        Ok(bytes)
    }))
}

/// Wait for `child` and turn a failed exit into an [`StitchError::EncodeFailure`] with its stderr.
fn wait_checked(what: &str, mut child: Child, stderr: Option<StderrDrain>) -> StitchResult<()> {
    let status = child
        .wait()
        .map_err(|e| StitchError::encode(format!("failed to wait for {what}: {e}")))?;
    let stderr_bytes = match stderr {
        Some(handle) => handle
            .join()
            .map_err(|_| StitchError::encode(format!("{what} stderr drain thread panicked")))?
            .map_err(|e| StitchError::encode(format!("{what} stderr read failed: {e}")))?,
        None => Vec::new(),
    };
    if !status.success() {
        let stderr = String::from_utf8_lossy(&stderr_bytes);
        return Err(StitchError::encode(format!(
            "{what} exited with status {status}: {}",
            stderr.trim()
        )));
    }
    Ok(())
}

fn kill(child: Option<Child>) {
    if let Some(mut child) = child {
        let _ = child.kill();
        let _ = child.wait();
    }
}

/// H.264/H.265 encoder running the system `ffmpeg` (`libx264`/`libx265`).
///
/// Frames are written to the child's stdin; a reader thread splits its Annex-B stdout into access
/// units. B-frames are disabled, so access unit `k` belongs to frame `k`.
#[derive(Default)]
pub struct FfmpegEncoder {
    settings: Option<EncodeSettings>,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stdout_thread: Option<JoinHandle<std::io::Result<()>>>,
    stderr_drain: Option<StderrDrain>,
    units: Option<mpsc::Receiver<Vec<u8>>>,
    pending_pts: VecDeque<Timestamp>,
    first_pts: Option<Timestamp>,
    next_index: u64,
}

impl FfmpegEncoder {
    /// Encoder that is started by [`VideoEncoder::begin`].
    pub fn new() -> Self {
        Self::default()
    }

    fn chunk(&mut self, codec: Codec, data: Vec<u8>) -> EncodedChunk {
        let index = self.next_index;
        self.next_index += 1;
        let pts_us = self.pending_pts.pop_front().unwrap_or_else(|| {
            let start = self.first_pts.unwrap_or(Timestamp::ZERO);
            match &self.settings {
                Some(s) => s.fps.frame_timestamp(start, index),
                None => start,
            }
        });
        EncodedChunk {
            index,
            pts: index as i64,
            dts: index as i64,
            pts_us,
            keyframe: is_keyframe(codec, &data),
            data,
        }
    }

    fn drain_ready(&mut self, codec: Codec) -> Vec<EncodedChunk> {
        let ready: Vec<Vec<u8>> = match &self.units {
            Some(rx) => rx.try_iter().collect(),
            None => Vec::new(),
        };
        ready.into_iter().map(|au| self.chunk(codec, au)).collect()
    }
}

impl VideoEncoder for FfmpegEncoder {
    fn begin(&mut self, settings: &EncodeSettings) -> StitchResult<()> {
        let mut child = Command::new("ffmpeg")
            .args(encoder_args(settings))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                StitchError::encoder_init(format!(
                    "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| StitchError::encoder_init("failed to open ffmpeg stdin (unexpected)"))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| StitchError::encoder_init("failed to open ffmpeg stdout (unexpected)"))?;
        let stderr_drain = spawn_stderr_drain(&mut child)?;

        let (tx, rx) = mpsc::channel();
        let codec = settings.codec;
        let stdout_thread = std::thread::spawn(move || -> std::io::Result<()> {
            let mut splitter = AccessUnitSplitter::new(codec);
            let mut buf = vec![0u8; 1 << 16];
            loop {
                let n = stdout.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                for au in splitter.push(&buf[..n]) {
                    if tx.send(au).is_err() {
                        return Ok(());
                    }
                }
            }
            if let Some(au) = splitter.finish() {
                let _ = tx.send(au);
            }
            Ok(())
        });

        tracing::debug!(
            encoder = settings.codec.ffmpeg_encoder(),
            size = %settings.canvas(),
            bitrate = settings.bitrate_bps,
            "ffmpeg encoder started"
        );
        self.settings = Some(settings.clone());
        self.child = Some(child);
        self.stdin = Some(stdin);
        self.stdout_thread = Some(stdout_thread);
        self.stderr_drain = Some(stderr_drain);
        self.units = Some(rx);
        self.pending_pts.clear();
        self.first_pts = None;
        self.next_index = 0;
        Ok(())
    }

    fn encode(&mut self, frame: &PanoramicFrame) -> StitchResult<Vec<EncodedChunk>> {
        let codec = match &self.settings {
            Some(s) if s.width == frame.width && s.height == frame.height => s.codec,
            Some(s) => {
                return Err(StitchError::encode(format!(
                    "frame size mismatch: got {}x{}, expected {}",
                    frame.width,
                    frame.height,
                    s.canvas()
                )));
            }
            None => return Err(StitchError::encode("ffmpeg encoder not started")),
        };
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(StitchError::encode("ffmpeg encoder is already flushed"));
        };
        stdin.write_all(&frame.data).map_err(|e| {
            StitchError::encode(format!("failed to write frame to ffmpeg stdin: {e}"))
        })?;
        self.first_pts.get_or_insert(frame.pts);
        self.pending_pts.push_back(frame.pts);
        Ok(self.drain_ready(codec))
    }

    fn flush(&mut self) -> StitchResult<Vec<EncodedChunk>> {
        let codec = self
            .settings
            .as_ref()
            .map(|s| s.codec)
            .ok_or_else(|| StitchError::encode("ffmpeg encoder not started"))?;
        drop(self.stdin.take());
        if let Some(handle) = self.stdout_thread.take() {
            handle
                .join()
                .map_err(|_| StitchError::encode("ffmpeg stdout reader panicked"))?
                .map_err(|e| StitchError::encode(format!("ffmpeg stdout read failed: {e}")))?;
        }
        let chunks = self.drain_ready(codec);
        let child = self
            .child
            .take()
            .ok_or_else(|| StitchError::encode("ffmpeg encoder not started"))?;
        wait_checked("ffmpeg encoder", child, self.stderr_drain.take())?;
        self.units = None;
        Ok(chunks)
    }

    fn abort(&mut self) {
        drop(self.stdin.take());
        kill(self.child.take());
        self.units = None;
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        drop(self.stdin.take());
        kill(self.child.take());
    }
}

/// MP4 muxer running the system `ffmpeg` with stream copy.
#[derive(Default)]
pub struct FfmpegMuxer {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr_drain: Option<StderrDrain>,
}

impl FfmpegMuxer {
    /// Muxer that is started by [`ChunkMuxer::begin`].
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChunkMuxer for FfmpegMuxer {
    fn begin(&mut self, settings: &EncodeSettings) -> StitchResult<()> {
        ensure_parent_dir(&settings.output)?;
        if !settings.overwrite && settings.output.exists() {
            return Err(StitchError::encoder_init(format!(
                "output file '{}' already exists",
                settings.output.display()
            )));
        }
        let mut child = Command::new("ffmpeg")
            .args(muxer_args(settings))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                StitchError::encoder_init(format!(
                    "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
                ))
            })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| StitchError::encoder_init("failed to open ffmpeg stdin (unexpected)"))?;
        self.stderr_drain = Some(spawn_stderr_drain(&mut child)?);
        self.child = Some(child);
        self.stdin = Some(stdin);
        Ok(())
    }

    fn write_chunk(&mut self, chunk: &EncodedChunk) -> StitchResult<()> {
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(StitchError::encode("ffmpeg muxer is not accepting chunks"));
        };
        stdin.write_all(&chunk.data).map_err(|e| {
            StitchError::encode(format!("failed to write chunk {} to ffmpeg: {e}", chunk.index))
        })
    }

    fn finalize(&mut self) -> StitchResult<()> {
        drop(self.stdin.take());
        let child = self
            .child
            .take()
            .ok_or_else(|| StitchError::encode("ffmpeg muxer not started"))?;
        wait_checked("ffmpeg muxer", child, self.stderr_drain.take())
    }

    fn abort(&mut self) {
        drop(self.stdin.take());
        kill(self.child.take());
    }
}

impl Drop for FfmpegMuxer {
    fn drop(&mut self) {
        drop(self.stdin.take());
        kill(self.child.take());
    }
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> StitchResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        use anyhow::Context as _;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// Return `true` when `ffmpeg` can be invoked from `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    tool_responds("ffmpeg")
}

/// Return `true` when `ffprobe` can be invoked from `PATH`.
pub fn is_ffprobe_on_path() -> bool {
    tool_responds("ffprobe")
}

fn tool_responds(tool: &str) -> bool {
    Command::new(tool)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}
