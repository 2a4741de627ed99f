use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use rayon::prelude::*;

use crate::align::field::FieldSet;
use crate::align::model::AiFlowModel;
use crate::align::stabilizer::{FieldStabilizer, StabilizerConfig};
use crate::align::strategy::{AlignmentStrategy, build_strategy};
use crate::encode::ffmpeg::{FfmpegEncoder, FfmpegMuxer};
use crate::encode::scheduler::{EncodeScheduler, EncodeSummary};
use crate::encode::{ChunkMuxer, EncodeSettings, VideoEncoder};
use crate::foundation::cancel::CancelToken;
use crate::foundation::core::{Fps, StreamId};
use crate::foundation::diagnostics::{Diagnostics, DiagnosticsSnapshot};
use crate::foundation::error::{StitchError, StitchResult};
use crate::fusion::PanoramicFrame;
use crate::fusion::engine::{FusionConfig, FusionEngine};
use crate::geometry::lens::AccessoryProfile;
use crate::geometry::projection::ProjectionSet;
use crate::job::model::{StitchJob, StitchMode};
use crate::session::channel::{ChannelFrames, recv_cancellable, send_cancellable};
use crate::session::env::init_env;
use crate::session::reorder::ReorderBuffer;
use crate::session::state::{JobStateMachine, PipelineState};
use crate::source::ffmpeg::FfmpegSource;
use crate::source::reader::FrameReader;
use crate::source::{FrameSource, RawFrame, StreamInfo};
use crate::sync::frame_set::SynchronizedFrameSet;
use crate::sync::synchronizer::{FrameSynchronizer, SyncConfig};

/// Outcome of a completed job.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct StitchReport {
    /// Finalized output file.
    pub output: PathBuf,
    /// Output framerate (the lowest input rate).
    pub fps: Fps,
    /// Alignment strategy that ran.
    pub strategy: &'static str,
    /// Frames submitted to the encoder.
    pub frames: u64,
    /// Chunks written to the container.
    pub chunks: u64,
    /// Final counters, including absorbed frame-level errors.
    pub diagnostics: DiagnosticsSnapshot,
    /// Wall time from start of validation.
    pub elapsed: Duration,
}

impl StitchReport {
    /// Frame-level errors absorbed along the way.
    pub fn absorbed_errors(&self) -> u64 {
        self.diagnostics.absorbed_errors()
    }
}

/// A job that ended in [`PipelineState::Failed`].
#[derive(thiserror::Error, Debug)]
#[error("stitch job failed while {failed_in}: {error}")]
pub struct JobFailure {
    /// Terminal error.
    #[source]
    pub error: StitchError,
    /// Frame-level errors absorbed before the failure.
    pub absorbed: u64,
    /// State the job was in when it failed.
    pub failed_in: PipelineState,
    /// Counters at the time of failure.
    pub diagnostics: DiagnosticsSnapshot,
}

/// Streams, encoder and muxer a run works with.
struct Endpoints {
    sources: Vec<Box<dyn FrameSource>>,
    encoder: Box<dyn VideoEncoder>,
    muxer: Box<dyn ChunkMuxer>,
}

/// Everything acquired during validation.
struct Prepared {
    sources: Vec<Box<dyn FrameSource>>,
    infos: Vec<StreamInfo>,
    projections: Arc<ProjectionSet>,
    strategy: Box<dyn AlignmentStrategy>,
    scheduler: EncodeScheduler,
    fps: Fps,
}

/// A frame set with its strategy result, on its way to the stabilizer.
struct Aligned {
    set: SynchronizedFrameSet,
    computed: StitchResult<FieldSet>,
}

/// One stitch job from validation to finalized output.
///
/// The session is driven by [`run`](Self::run) (system ffmpeg) or [`run_with`](Self::run_with)
/// (caller-supplied endpoints) and may be observed from other threads meanwhile: the cancel
/// token, progress counters and state are all shared. A session runs at most once.
pub struct StitchSession {
    job: StitchJob,
    machine: Mutex<JobStateMachine>,
    cancel: CancelToken,
    diagnostics: Arc<Diagnostics>,
    preview_png: Option<PathBuf>,
}

impl StitchSession {
    /// Session for `job`, in [`PipelineState::Configured`].
    pub fn new(job: StitchJob) -> Self {
        Self {
            job,
            machine: Mutex::new(JobStateMachine::new()),
            cancel: CancelToken::new(),
            diagnostics: Arc::new(Diagnostics::new()),
            preview_png: None,
        }
    }

    /// Also write the first fused frame to `path` as PNG.
    pub fn with_preview_png(mut self, path: impl Into<PathBuf>) -> Self {
        self.preview_png = Some(path.into());
        self
    }

    /// The job.
    pub fn job(&self) -> &StitchJob {
        &self.job
    }

    /// Token that stops the run when tripped.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Live counters.
    pub fn progress(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    /// Current state.
    pub fn state(&self) -> PipelineState {
        self.machine().state()
    }

    /// States visited so far.
    pub fn history(&self) -> Vec<PipelineState> {
        self.machine().history().to_vec()
    }

    /// Run with system ffmpeg for decoding, encoding and muxing.
    pub fn run(&self) -> Result<StitchReport, JobFailure> {
        self.drive(|| {
            for locator in &self.job.inputs {
                if !locator.path.exists() {
                    return Err(StitchError::source_open(&locator.path, "no such file"));
                }
            }
            let env = init_env()?;
            if !env.supports(self.job.codec) {
                return Err(StitchError::environment(format!(
                    "ffmpeg has no {} encoder",
                    self.job.codec.ffmpeg_encoder()
                )));
            }
            let sources = self
                .job
                .inputs
                .iter()
                .enumerate()
                .map(|(i, locator)| {
                    FfmpegSource::open(StreamId(i as u16), locator)
                        .map(|s| Box::new(s) as Box<dyn FrameSource>)
                })
                .collect::<StitchResult<Vec<_>>>()?;
            Ok(Endpoints {
                sources,
                encoder: Box::new(FfmpegEncoder::new()),
                muxer: Box::new(FfmpegMuxer::new()),
            })
        })
    }

    /// Run over already opened sources and caller-supplied encoder and muxer.
    ///
    /// `sources[i]` is the stream of `job.inputs[i]`.
    pub fn run_with(
        &self,
        sources: Vec<Box<dyn FrameSource>>,
        encoder: Box<dyn VideoEncoder>,
        muxer: Box<dyn ChunkMuxer>,
    ) -> Result<StitchReport, JobFailure> {
        self.drive(move || {
            Ok(Endpoints {
                sources,
                encoder,
                muxer,
            })
        })
    }

    #[tracing::instrument(skip_all, fields(output = %self.job.output.display(), mode = ?self.job.stitch_mode))]
    fn drive(
        &self,
        open: impl FnOnce() -> StitchResult<Endpoints>,
    ) -> Result<StitchReport, JobFailure> {
        let started = Instant::now();
        self.transition(PipelineState::Validating)?;

        let mut prepared = self.prepare(open).map_err(|e| self.fail(e))?;

        self.transition(PipelineState::Running)?;
        tracing::info!(
            strategy = prepared.strategy.name(),
            fps = prepared.fps.as_f64(),
            estimated_sets = ?self.diagnostics.snapshot().estimated_sets,
            "running"
        );

        let strategy = prepared.strategy.name();
        let fps = prepared.fps;
        let summary = match self.execute(&mut prepared, started) {
            Ok(summary) => summary,
            Err(e) => {
                prepared.scheduler.abort();
                return Err(self.fail(e));
            }
        };

        self.transition(PipelineState::Completed)?;
        let report = StitchReport {
            output: self.job.output.clone(),
            fps,
            strategy,
            frames: summary.frames,
            chunks: summary.chunks,
            diagnostics: self.diagnostics.snapshot(),
            elapsed: started.elapsed(),
        };
        tracing::info!(
            frames = report.frames,
            absorbed = report.absorbed_errors(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "completed"
        );
        Ok(report)
    }

    /// Validation and startup, in order: parameters, sources, model, projections, encoder.
    ///
    /// The output file is only created by the final step.
    fn prepare(&self, open: impl FnOnce() -> StitchResult<Endpoints>) -> StitchResult<Prepared> {
        let job = &self.job;
        job.validate()?;
        let Endpoints {
            sources,
            encoder,
            muxer,
        } = open()?;
        if sources.len() != job.inputs.len() {
            return Err(StitchError::configuration(format!(
                "job lists {} inputs but {} sources were supplied",
                job.inputs.len(),
                sources.len()
            )));
        }
        let infos: Vec<StreamInfo> = sources.iter().map(|s| s.info().clone()).collect();

        let model = match job.stitch_mode {
            StitchMode::AiFlow => {
                let path = job.model.as_deref().unwrap_or(Path::new(""));
                Some(AiFlowModel::load(path)?)
            }
            StitchMode::StaticTemplate | StitchMode::OpticalFlow => None,
        };

        let sizes: Vec<(u32, u32)> = infos.iter().map(|i| (i.width, i.height)).collect();
        let projections = Arc::new(ProjectionSet::build(
            job.output_size,
            job.tuning.field_stride,
            &job.effective_rig(),
            AccessoryProfile::for_guard(job.accessory),
            &sizes,
        )?);
        let strategy = build_strategy(job, projections.clone(), model)?;

        let fps = output_fps(&infos)?;
        if let Some(total) = infos.iter().map(|i| i.frame_count).min().flatten() {
            self.diagnostics.set_estimated_sets(total);
        }

        let settings = EncodeSettings::from_job(job, fps);
        settings.validate(projections.canvas())?;
        let mut scheduler = EncodeScheduler::new(encoder, muxer, self.diagnostics.clone());
        scheduler.begin(&settings)?;

        Ok(Prepared {
            sources,
            infos,
            projections,
            strategy,
            scheduler,
            fps,
        })
    }

    /// Run every stage to completion and finalize the output.
    fn execute(&self, prepared: &mut Prepared, started: Instant) -> StitchResult<EncodeSummary> {
        let job = &self.job;
        let tuning = &job.tuning;
        let cap = tuning.channel_capacity;
        let cancel = &self.cancel;
        let diagnostics = &self.diagnostics;
        let errors = FirstError::default();
        let errors = &errors;

        let pool = build_thread_pool(tuning.alignment_concurrency)?;
        let sync_cfg = SyncConfig::for_streams(&prepared.infos, tuning);
        let mut stabilizer = FieldStabilizer::new(
            StabilizerConfig::from_job(job),
            prepared.projections.clone(),
            diagnostics.clone(),
        );
        let fusion = FusionEngine::new(FusionConfig::from_job(job), prepared.projections.clone());
        let strategy: &dyn AlignmentStrategy = prepared.strategy.as_ref();
        let sources = std::mem::take(&mut prepared.sources);
        let scheduler = &mut prepared.scheduler;
        let deadline = tuning
            .timeout_secs
            .map(|secs| started + Duration::from_secs(secs));

        std::thread::scope(|scope| -> StitchResult<()> {
            let (stop_tx, stop_rx) = mpsc::channel::<()>();
            let mut handles = Vec::new();

            if let Some(deadline) = deadline {
                handles.push(scope.spawn(move || {
                    let wait = deadline.saturating_duration_since(Instant::now());
                    if let Err(mpsc::RecvTimeoutError::Timeout) = stop_rx.recv_timeout(wait) {
                        tracing::warn!("job timeout reached, cancelling");
                        cancel.cancel();
                    }
                }));
            }

            let mut lanes = Vec::with_capacity(sources.len());
            for (i, source) in sources.into_iter().enumerate() {
                let (tx, rx) = mpsc::sync_channel::<StitchResult<RawFrame>>(cap);
                lanes.push(ChannelFrames::new(rx, cancel.clone()));
                let reader = FrameReader::new(
                    StreamId(i as u16),
                    source,
                    tuning.max_consecutive_decode_errors,
                    diagnostics.clone(),
                );
                handles.push(scope.spawn(move || {
                    for item in reader {
                        let last = item.is_err();
                        if send_cancellable(&tx, item, cancel).is_err() || last {
                            break;
                        }
                    }
                }));
            }

            let (set_tx, set_rx) = mpsc::sync_channel::<SynchronizedFrameSet>(cap);
            handles.push(scope.spawn(move || {
                let res = (|| -> StitchResult<()> {
                    let mut sync = FrameSynchronizer::new(lanes, sync_cfg)
                        .with_diagnostics(diagnostics.clone());
                    while let Some(set) = sync.next_set()? {
                        send_cancellable(&set_tx, set, cancel)?;
                    }
                    tracing::debug!(stats = ?sync.stats(), "synchronization finished");
                    Ok(())
                })();
                errors.settle("sync", res, cancel);
            }));

            let (aligned_tx, aligned_rx) = mpsc::sync_channel::<Aligned>(cap);
            let chunk = pool.current_num_threads().clamp(1, tuning.reorder_capacity);
            let pool = &pool;
            handles.push(scope.spawn(move || {
                let res = (|| -> StitchResult<()> {
                    let mut batch = Vec::with_capacity(chunk);
                    loop {
                        let next = recv_cancellable(&set_rx, cancel)?;
                        let done = next.is_none();
                        batch.extend(next);
                        if batch.len() >= chunk || (done && !batch.is_empty()) {
                            let sets = std::mem::take(&mut batch);
                            align_batch(pool, strategy, sets, &aligned_tx, cancel)?;
                        }
                        if done {
                            return Ok(());
                        }
                    }
                })();
                errors.settle("alignment", res, cancel);
            }));

            let (frame_tx, frame_rx) = mpsc::sync_channel::<PanoramicFrame>(cap);
            let preview = self.preview_png.as_deref();
            let fusion = &fusion;
            handles.push(scope.spawn(move || {
                let res = (|| -> StitchResult<()> {
                    let mut reorder = ReorderBuffer::new(tuning.reorder_capacity);
                    while let Some(item) = recv_cancellable(&aligned_rx, cancel)? {
                        reorder.push(item.set.seq, item)?;
                        while let Some(Aligned { set, computed }) = reorder.pop_ready() {
                            let fields = stabilizer.stabilize(&set, computed)?;
                            let frame = fusion.fuse(&set, &fields)?;
                            diagnostics.record_frame_fused();
                            if set.seq == 0
                                && let Some(path) = preview
                                && let Err(e) = frame.save_png(path)
                            {
                                tracing::warn!(path = %path.display(), error = %e, "preview not written");
                            }
                            send_cancellable(&frame_tx, frame, cancel)?;
                        }
                    }
                    if !reorder.is_empty() {
                        return Err(StitchError::Other(anyhow::anyhow!(
                            "alignment never delivered frame set {}",
                            reorder.next_seq()
                        )));
                    }
                    Ok(())
                })();
                errors.settle("fusion", res, cancel);
            }));

            let res = (|| -> StitchResult<()> {
                while let Some(frame) = recv_cancellable(&frame_rx, cancel)? {
                    scheduler.submit(&frame)?;
                }
                Ok(())
            })();
            errors.settle("encode", res, cancel);
            drop(frame_rx);
            drop(stop_tx);

            for h in handles {
                h.join().map_err(|_| {
                    StitchError::Other(anyhow::anyhow!("pipeline stage thread panicked"))
                })?;
            }
            Ok(())
        })?;

        if let Some(e) = errors.take() {
            return Err(e);
        }
        cancel.check()?;
        scheduler.finish()
    }

    fn transition(&self, next: PipelineState) -> Result<(), JobFailure> {
        self.machine()
            .transition(next)
            .map_err(|e| self.fail(e))
    }

    /// Move to `Failed` and package `error`.
    fn fail(&self, error: StitchError) -> JobFailure {
        let mut machine = self.machine();
        let failed_in = machine.state();
        if !failed_in.is_terminal() {
            let _ = machine.transition(PipelineState::Failed);
        }
        drop(machine);
        let diagnostics = self.diagnostics.snapshot();
        tracing::error!(state = %failed_in, kind = ?error.kind(), error = %error, "stitch job failed");
        JobFailure {
            error,
            absorbed: diagnostics.absorbed_errors(),
            failed_in,
            diagnostics,
        }
    }

    fn machine(&self) -> MutexGuard<'_, JobStateMachine> {
        self.machine
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Compute fields for a batch of frame sets on the alignment pool.
///
/// Results leave in completion order; the fusion stage restores sequence order.
fn align_batch(
    pool: &rayon::ThreadPool,
    strategy: &dyn AlignmentStrategy,
    batch: Vec<SynchronizedFrameSet>,
    tx: &mpsc::SyncSender<Aligned>,
    cancel: &CancelToken,
) -> StitchResult<()> {
    pool.install(|| {
        batch.into_par_iter().try_for_each_init(
            || tx.clone(),
            |tx, set| {
                cancel.check()?;
                let computed = strategy.compute_fields(&set);
                send_cancellable(tx, Aligned { set, computed }, cancel)
            },
        )
    })
}

fn build_thread_pool(threads: Option<usize>) -> StitchResult<rayon::ThreadPool> {
    if let Some(n) = threads
        && n == 0
    {
        return Err(StitchError::configuration(
            "alignment_concurrency must be >= 1 when set",
        ));
    }
    let mut builder = rayon::ThreadPoolBuilder::new().thread_name(|i| format!("align-{i}"));
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    builder.build().map_err(|e| {
        StitchError::Other(anyhow::anyhow!("failed to build alignment thread pool: {e}"))
    })
}

/// Output framerate: the lowest input rate, so no stream is asked for frames it does not have.
fn output_fps(infos: &[StreamInfo]) -> StitchResult<Fps> {
    infos
        .iter()
        .map(|i| i.fps)
        .min_by(|a, b| a.as_f64().total_cmp(&b.as_f64()))
        .ok_or_else(|| StitchError::configuration("no input streams"))
}

/// The error a failed run reports: the first one that is not a cancellation.
#[derive(Default)]
struct FirstError(Mutex<Option<StitchError>>);

impl FirstError {
    /// Record a stage outcome; any error also cancels the other stages.
    fn settle(&self, stage: &'static str, res: StitchResult<()>, cancel: &CancelToken) {
        let Err(e) = res else {
            return;
        };
        let mut slot = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let cancelled = matches!(e, StitchError::Cancelled);
        if !cancelled {
            tracing::error!(stage, error = %e, "stage failed");
        }
        match &*slot {
            None => *slot = Some(e),
            Some(StitchError::Cancelled) if !cancelled => *slot = Some(e),
            Some(_) => {}
        }
        drop(slot);
        cancel.cancel();
    }

    fn take(&self) -> Option<StitchError> {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/session/pipeline.rs"]
mod tests;
