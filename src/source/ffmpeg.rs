use std::collections::{BTreeMap, VecDeque};
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;

use crate::foundation::core::{Fps, StreamId, Timestamp};
use crate::foundation::error::{StitchError, StitchResult};
use crate::job::model::StreamLocator;
use crate::source::{FrameSource, RawFrame, StreamInfo};

/// How long to wait for the decoder to report a frame's timestamp before assuming constant rate.
const PTS_WAIT: Duration = Duration::from_secs(2);

/// Stderr lines kept for error messages.
const STDERR_TAIL: usize = 16;

/// Properties of one video track reported by `ffprobe`.
#[derive(Clone, Debug, PartialEq)]
pub struct ProbedVideo {
    /// Source path.
    pub path: PathBuf,
    /// Selected video track (0-based among video streams).
    pub track: usize,
    /// Container stream index of that track.
    pub stream_index: u32,
    /// Stream properties.
    pub info: StreamInfo,
    /// Codec name, for logs.
    pub codec: Option<String>,
}

/// Probe `track` of `path` through `ffprobe`.
pub fn probe_video(path: &Path, track: usize) -> StitchResult<ProbedVideo> {
    #[derive(serde::Deserialize)]
    struct ProbeStream {
        index: u32,
        codec_type: Option<String>,
        codec_name: Option<String>,
        width: Option<u32>,
        height: Option<u32>,
        avg_frame_rate: Option<String>,
        r_frame_rate: Option<String>,
        nb_frames: Option<String>,
        start_time: Option<String>,
        duration: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeOut {
        #[serde(default)]
        streams: Vec<ProbeStream>,
    }

    if !path.exists() {
        return Err(StitchError::source_open(path, "no such file"));
    }

    let out = Command::new("ffprobe")
        .args(["-v", "error", "-print_format", "json", "-show_streams"])
        .arg(path)
        .output()
        .map_err(|e| StitchError::environment(format!("failed to run ffprobe: {e}")))?;
    if !out.status.success() {
        return Err(StitchError::source_open(
            path,
            format!(
                "ffprobe failed: {}",
                String::from_utf8_lossy(&out.stderr).trim()
            ),
        ));
    }

    let parsed: ProbeOut = serde_json::from_slice(&out.stdout)
        .map_err(|e| StitchError::source_open(path, format!("ffprobe json parse failed: {e}")))?;
    let video = parsed
        .streams
        .into_iter()
        .filter(|s| s.codec_type.as_deref() == Some("video"))
        .nth(track)
        .ok_or_else(|| StitchError::source_open(path, format!("no video track {track}")))?;

    let (Some(width), Some(height)) = (video.width, video.height) else {
        return Err(StitchError::source_open(path, "missing video dimensions"));
    };
    let fps = [video.avg_frame_rate.as_deref(), video.r_frame_rate.as_deref()]
        .into_iter()
        .flatten()
        .find_map(parse_rational)
        .ok_or_else(|| StitchError::source_open(path, "unknown framerate"))?;
    let start = video
        .start_time
        .as_deref()
        .and_then(|s| s.parse::<f64>().ok())
        .map(Timestamp::from_secs_f64)
        .unwrap_or(Timestamp::ZERO);
    let frame_count = video
        .nb_frames
        .as_deref()
        .and_then(|s| s.parse::<u64>().ok())
        .filter(|&n| n > 0)
        .or_else(|| {
            let secs = video.duration.as_deref()?.parse::<f64>().ok()?;
            Some((secs * fps.as_f64()).round() as u64)
        });

    Ok(ProbedVideo {
        path: path.to_path_buf(),
        track,
        stream_index: video.index,
        info: StreamInfo {
            width,
            height,
            fps,
            start,
            frame_count,
        },
        codec: video.codec_name,
    })
}

fn parse_rational(s: &str) -> Option<Fps> {
    let (num, den) = s.split_once('/').unwrap_or((s, "1"));
    Fps::new(num.trim().parse().ok()?, den.trim().parse().ok()?).ok()
}

/// What the decoder's stderr told us.
#[derive(Debug, PartialEq)]
enum DecoderEvent {
    /// `showinfo` reported frame `n` at `pts_time` seconds.
    FramePts(u64, f64),
    /// The decoder logged an error (the stream may continue).
    Error(String),
    /// Anything else.
    Other(String),
}

fn classify_stderr_line(line: &str) -> DecoderEvent {
    if line.contains("Parsed_showinfo")
        && let Some(ev) = parse_showinfo(line)
    {
        return ev;
    }
    if line.contains("[error]") || line.contains("[fatal]") {
        return DecoderEvent::Error(line.to_string());
    }
    DecoderEvent::Other(line.to_string())
}

fn parse_showinfo(line: &str) -> Option<DecoderEvent> {
    let field = |key: &str| -> Option<&str> {
        let rest = &line[line.find(key)? + key.len()..];
        rest.split_whitespace().next()
    };
    let n = field(" n:")?.parse().ok()?;
    let t = field("pts_time:")?.parse().ok()?;
    Some(DecoderEvent::FramePts(n, t))
}

/// Video track decoded by a system `ffmpeg` into raw RGBA8 frames.
///
/// Frame timestamps come from `showinfo` on the decoder's stderr, so variable-rate footage keeps
/// its real timing; when a timestamp is not reported in time the nominal rate is used instead.
pub struct FfmpegSource {
    stream: StreamId,
    path: PathBuf,
    info: StreamInfo,

    child: Option<Child>,
    stdout: Option<BufReader<Box<dyn Read + Send>>>,
    events: Receiver<DecoderEvent>,
    stderr_drain: Option<std::thread::JoinHandle<()>>,

    /// Reported timestamps of frames not yet read, keyed by frame index.
    reported_pts: BTreeMap<u64, f64>,
    pending_errors: VecDeque<String>,
    stderr_tail: VecDeque<String>,
    next_index: u64,
    finished: bool,
}

impl FfmpegSource {
    /// Probe and start decoding `locator` as stream `stream`.
    #[tracing::instrument(skip(locator), fields(path = %locator.path.display()))]
    pub fn open(stream: StreamId, locator: &StreamLocator) -> StitchResult<Self> {
        let probed = probe_video(&locator.path, locator.video_track)?;
        tracing::info!(
            width = probed.info.width,
            height = probed.info.height,
            fps = probed.info.fps.as_f64(),
            frames = ?probed.info.frame_count,
            codec = ?probed.codec,
            "opened source"
        );

        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .args(["-hide_banner", "-nostats", "-loglevel", "level+info", "-i"])
            .arg(&locator.path)
            .args([
                "-map",
                &format!("0:{}", probed.stream_index),
                "-vf",
                "showinfo",
                "-fps_mode",
                "passthrough",
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgba",
                "pipe:1",
            ]);

        let mut child = cmd.spawn().map_err(|e| {
            StitchError::environment(format!(
                "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
            ))
        })?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| StitchError::source_open(&locator.path, "failed to open ffmpeg stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| StitchError::source_open(&locator.path, "failed to open ffmpeg stderr"))?;

        let (tx, events) = mpsc::channel();
        let stderr_drain = std::thread::spawn(move || {
            let mut reader = BufReader::new(stderr);
            let mut line = Vec::new();
            loop {
                line.clear();
                match reader.read_until(b'\n', &mut line) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {
                        let text = String::from_utf8_lossy(&line);
                        if tx.send(classify_stderr_line(text.trim_end())).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        Ok(Self::from_parts(
            stream,
            locator.path.clone(),
            probed.info,
            Some(child),
            Box::new(stdout),
            events,
            Some(stderr_drain),
        ))
    }

    /// Source over an already running decoder: raw frames on `stdout`, parsed stderr on `events`.
    fn from_parts(
        stream: StreamId,
        path: PathBuf,
        info: StreamInfo,
        child: Option<Child>,
        stdout: Box<dyn Read + Send>,
        events: Receiver<DecoderEvent>,
        stderr_drain: Option<std::thread::JoinHandle<()>>,
    ) -> Self {
        let frame_len = info.width as usize * info.height as usize * 4;
        Self {
            stream,
            path,
            info,
            child,
            stdout: Some(BufReader::with_capacity(frame_len.clamp(1 << 16, 1 << 24), stdout)),
            events,
            stderr_drain,
            reported_pts: BTreeMap::new(),
            pending_errors: VecDeque::new(),
            stderr_tail: VecDeque::new(),
            next_index: 0,
            finished: false,
        }
    }

    fn remember(&mut self, line: String) {
        if self.stderr_tail.len() == STDERR_TAIL {
            self.stderr_tail.pop_front();
        }
        self.stderr_tail.push_back(line);
    }

    fn tail(&self) -> String {
        self.stderr_tail
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn drain_ready_events(&mut self) {
        while let Ok(ev) = self.events.try_recv() {
            self.absorb(ev);
        }
    }

    fn absorb(&mut self, ev: DecoderEvent) {
        match ev {
            // Frames already handed out fell back to the nominal rate; their reports are stale.
            DecoderEvent::FramePts(n, _) if n < self.next_index => {}
            DecoderEvent::FramePts(n, t) => {
                self.reported_pts.insert(n, t);
            }
            DecoderEvent::Error(line) => {
                self.remember(line.clone());
                self.pending_errors.push_back(line);
            }
            DecoderEvent::Other(line) => self.remember(line),
        }
    }

    /// Timestamp of frame `index`: the decoder's report, waiting up to [`PTS_WAIT`] for it, else
    /// the nominal rate.
    fn take_pts(&mut self, index: u64) -> Timestamp {
        self.drain_ready_events();
        loop {
            if let Some(t) = self.reported_pts.remove(&index) {
                return Timestamp::from_secs_f64(t);
            }
            match self.events.recv_timeout(PTS_WAIT) {
                Ok(ev) => self.absorb(ev),
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    tracing::debug!(stream = %self.stream, index, "no decoder timestamp, using nominal rate");
                    return self.info.fps.frame_timestamp(self.info.start, index);
                }
            }
        }
    }

    fn finish(&mut self) -> Option<StitchResult<RawFrame>> {
        self.finished = true;
        drop(self.stdout.take());
        let status = self.child.take().map(|mut c| c.wait());
        if let Some(h) = self.stderr_drain.take()
            && h.join().is_err()
        {
            tracing::warn!(stream = %self.stream, "decoder stderr reader panicked");
        }
        self.drain_ready_events();

        match status {
            Some(Ok(s)) if !s.success() => {
                if self.next_index == 0 {
                    return Some(Err(StitchError::stream_aborted(
                        self.stream,
                        format!("ffmpeg exited with {s} before any frame: {}", self.tail()),
                    )));
                }
                tracing::warn!(
                    stream = %self.stream,
                    frames = self.next_index,
                    "decoder exited with {s}; treating as end of stream"
                );
            }
            Some(Err(e)) => {
                return Some(Err(StitchError::stream_aborted(
                    self.stream,
                    format!("failed to wait for ffmpeg: {e}"),
                )));
            }
            _ => {}
        }
        None
    }
}

fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

impl FrameSource for FfmpegSource {
    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn next_frame(&mut self) -> Option<StitchResult<RawFrame>> {
        self.drain_ready_events();
        if let Some(line) = self.pending_errors.pop_front() {
            return Some(Err(StitchError::decode(self.stream, self.next_index, line)));
        }
        if self.finished {
            return None;
        }

        let frame_len = self.info.width as usize * self.info.height as usize * 4;
        let mut data = vec![0u8; frame_len];
        let stdout = self.stdout.as_mut()?;
        let filled = match read_full(stdout, &mut data) {
            Ok(n) => n,
            Err(e) => {
                self.finished = true;
                return Some(Err(StitchError::stream_aborted(
                    self.stream,
                    format!("reading decoded frames failed: {e}"),
                )));
            }
        };

        if filled == 0 {
            return self.finish();
        }
        if filled < frame_len {
            let index = self.next_index;
            // A partial frame is always the last thing on the pipe.
            if let Some(Err(e)) = self.finish() {
                tracing::warn!(error = %e, "decoder failed after a truncated frame");
            }
            return Some(Err(StitchError::decode(
                self.stream,
                index,
                format!("truncated frame: {filled} of {frame_len} bytes"),
            )));
        }

        let index = self.next_index;
        let pts = self.take_pts(index);
        self.next_index += 1;
        Some(Ok(RawFrame {
            stream: self.stream,
            index,
            pts,
            width: self.info.width,
            height: self.info.height,
            data: Arc::new(data),
        }))
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        drop(self.stdout.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        if let Some(h) = self.stderr_drain.take() {
            let _ = h.join();
        }
    }
}

impl std::fmt::Debug for FfmpegSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FfmpegSource")
            .field("stream", &self.stream)
            .field("path", &self.path)
            .field("next_index", &self.next_index)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/source/ffmpeg.rs"]
mod tests;
