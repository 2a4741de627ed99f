use super::*;
use crate::encode::memory::{InMemoryEncoder, InMemoryMuxer};
use crate::foundation::core::{Canvas, Timestamp};
use crate::foundation::error::ErrorKind;
use crate::job::model::Tuning;
use crate::source::memory::InMemorySource;

const SRC: u32 = 64;

fn fps30() -> Fps {
    Fps::new(30, 1).unwrap()
}

fn job(mode: StitchMode) -> StitchJob {
    let mut job = StitchJob::dual_fisheye_8k("front.insv", "back.insv", "out.mp4");
    job.output_size = Canvas::new(128, 64);
    job.stitch_mode = mode;
    job.tuning = Tuning {
        field_stride: 8,
        alignment_concurrency: Some(2),
        ..Tuning::default()
    };
    job
}

fn solid_sources(count: u64, rgba: [u8; 4]) -> Vec<Box<dyn FrameSource>> {
    (0..2)
        .map(|i| {
            Box::new(InMemorySource::solid_color(StreamId(i), SRC, SRC, fps30(), count, rgba))
                as Box<dyn FrameSource>
        })
        .collect()
}

#[test]
fn static_run_completes_in_order() {
    let session = StitchSession::new(job(StitchMode::StaticTemplate));
    let muxer = InMemoryMuxer::new();
    let report = session
        .run_with(
            solid_sources(12, [90, 120, 150, 255]),
            Box::new(InMemoryEncoder::new(2)),
            Box::new(muxer.handle()),
        )
        .unwrap();

    assert_eq!(report.frames, 12);
    assert_eq!(report.chunks, 12);
    assert_eq!(report.strategy, "static_template");
    assert_eq!(report.fps, fps30());
    assert_eq!(report.diagnostics.frames_fused, 12);
    assert_eq!(report.diagnostics.progress(), Some(1.0));
    assert_eq!(report.absorbed_errors(), 0);
    assert_eq!(
        session.history(),
        [
            PipelineState::Configured,
            PipelineState::Validating,
            PipelineState::Running,
            PipelineState::Completed
        ]
    );

    let log = muxer.log();
    assert!(log.finalized);
    let ticks: Vec<i64> = log.chunks.iter().map(|c| c.pts).collect();
    assert_eq!(ticks, (0..12).collect::<Vec<_>>());
    let sources: Vec<u64> = log
        .chunks
        .iter()
        .map(|c| u64::from_le_bytes(c.data[..8].try_into().unwrap()))
        .collect();
    assert_eq!(sources, (0..12).collect::<Vec<_>>());
}

#[test]
fn a_session_runs_once() {
    let session = StitchSession::new(job(StitchMode::StaticTemplate));
    session
        .run_with(
            solid_sources(2, [0, 0, 0, 255]),
            Box::new(InMemoryEncoder::new(0)),
            Box::new(InMemoryMuxer::new()),
        )
        .unwrap();
    let failure = session
        .run_with(
            solid_sources(2, [0, 0, 0, 255]),
            Box::new(InMemoryEncoder::new(0)),
            Box::new(InMemoryMuxer::new()),
        )
        .unwrap_err();
    assert_eq!(failure.failed_in, PipelineState::Completed);
    assert_eq!(session.state(), PipelineState::Completed);
}

#[test]
fn source_count_must_match_inputs() {
    let session = StitchSession::new(job(StitchMode::StaticTemplate));
    let mut sources = solid_sources(2, [0, 0, 0, 255]);
    sources.pop();
    let muxer = InMemoryMuxer::new();
    let failure = session
        .run_with(sources, Box::new(InMemoryEncoder::new(0)), Box::new(muxer.handle()))
        .unwrap_err();
    assert_eq!(failure.error.kind(), ErrorKind::Configuration);
    assert_eq!(failure.failed_in, PipelineState::Validating);
    assert!(muxer.log().settings.is_none());
}

#[test]
fn encoder_failure_ends_the_run_and_aborts_output() {
    let session = StitchSession::new(job(StitchMode::OpticalFlow));
    let muxer = InMemoryMuxer::new();
    let failure = session
        .run_with(
            solid_sources(20, [40, 40, 40, 255]),
            Box::new(InMemoryEncoder::new(0).failing_at(5)),
            Box::new(muxer.handle()),
        )
        .unwrap_err();
    assert_eq!(failure.error.kind(), ErrorKind::EncodeFailure);
    assert_eq!(failure.failed_in, PipelineState::Running);
    assert_eq!(session.state(), PipelineState::Failed);
    let log = muxer.log();
    assert!(log.aborted);
    assert!(!log.finalized);
    assert_eq!(log.chunks.len(), 5);
}

#[test]
fn stream_abort_beats_the_cancellations_it_causes() {
    let session = StitchSession::new(job(StitchMode::StaticTemplate));
    let mut broken = InMemorySource::solid_color(StreamId(1), SRC, SRC, fps30(), 3, [0; 4]);
    broken.push_abort("device unplugged");
    let sources: Vec<Box<dyn FrameSource>> = vec![
        Box::new(InMemorySource::solid_color(StreamId(0), SRC, SRC, fps30(), 30, [0; 4])),
        Box::new(broken),
    ];
    let failure = session
        .run_with(sources, Box::new(InMemoryEncoder::new(0)), Box::new(InMemoryMuxer::new()))
        .unwrap_err();
    assert_eq!(failure.error.kind(), ErrorKind::StreamAborted);
}

#[test]
fn decode_errors_are_absorbed_and_reported() {
    let session = StitchSession::new(job(StitchMode::StaticTemplate));
    let info = StreamInfo {
        width: SRC,
        height: SRC,
        fps: fps30(),
        start: Timestamp::ZERO,
        frame_count: None,
    };
    let frame = vec![10u8; (SRC * SRC * 4) as usize];
    let mut glitchy = InMemorySource::new(StreamId(1), info);
    for i in 0..6 {
        if i == 3 {
            glitchy.push_decode_error("corrupt slice");
        }
        glitchy.push_frame(fps30().frame_timestamp(Timestamp::ZERO, i), frame.clone());
    }
    let sources: Vec<Box<dyn FrameSource>> = vec![
        Box::new(InMemorySource::solid_color(StreamId(0), SRC, SRC, fps30(), 6, [10; 4])),
        Box::new(glitchy),
    ];
    let report = session
        .run_with(sources, Box::new(InMemoryEncoder::new(0)), Box::new(InMemoryMuxer::new()))
        .unwrap();
    assert_eq!(report.frames, 6);
    assert_eq!(report.diagnostics.decode_errors, 1);
    assert_eq!(report.absorbed_errors(), 1);
    assert_eq!(report.diagnostics.progress(), None);
}

#[test]
fn tripped_token_fails_with_cancelled() {
    let session = StitchSession::new(job(StitchMode::StaticTemplate));
    session.cancel_token().cancel();
    let muxer = InMemoryMuxer::new();
    let failure = session
        .run_with(
            solid_sources(5, [0; 4]),
            Box::new(InMemoryEncoder::new(0)),
            Box::new(muxer.handle()),
        )
        .unwrap_err();
    assert_eq!(failure.error.kind(), ErrorKind::Cancelled);
    assert_eq!(failure.failed_in, PipelineState::Running);
    assert!(!muxer.log().finalized);
}

#[test]
fn output_fps_is_the_lowest_input_rate() {
    let info = |num, den| StreamInfo {
        width: 2,
        height: 2,
        fps: Fps::new(num, den).unwrap(),
        start: Timestamp::ZERO,
        frame_count: None,
    };
    let fps = output_fps(&[info(30, 1), info(30000, 1001)]).unwrap();
    assert_eq!(fps, Fps::new(30000, 1001).unwrap());
    assert!(output_fps(&[]).is_err());
}

#[test]
fn zero_alignment_threads_is_rejected() {
    assert!(build_thread_pool(Some(0)).is_err());
    assert_eq!(build_thread_pool(Some(3)).unwrap().current_num_threads(), 3);
}

#[test]
fn first_real_error_wins_over_cancellation() {
    let errors = FirstError::default();
    let cancel = CancelToken::new();
    errors.settle("a", Err(StitchError::Cancelled), &cancel);
    assert!(cancel.is_cancelled());
    errors.settle("b", Err(StitchError::encode("disk full")), &cancel);
    errors.settle("c", Err(StitchError::configuration("late")), &cancel);
    errors.settle("d", Ok(()), &cancel);
    assert_eq!(errors.take().unwrap().kind(), ErrorKind::EncodeFailure);
}
