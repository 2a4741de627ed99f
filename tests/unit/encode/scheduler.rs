use std::path::PathBuf;

use super::*;
use crate::encode::memory::{InMemoryEncoder, InMemoryMuxer};
use crate::foundation::core::{Fps, Timestamp};
use crate::foundation::error::ErrorKind;
use crate::job::model::Codec;

fn settings() -> EncodeSettings {
    EncodeSettings {
        codec: Codec::H265,
        bitrate_bps: 1_000_000,
        width: 8,
        height: 4,
        fps: Fps::new(30, 1).unwrap(),
        output: PathBuf::from("out.mp4"),
        overwrite: true,
    }
}

fn frame(seq: u64) -> PanoramicFrame {
    PanoramicFrame {
        seq,
        pts: Timestamp(seq as i64 * 33_333),
        width: 8,
        height: 4,
        data: vec![seq as u8; 8 * 4 * 4],
    }
}

fn scheduler(encoder: InMemoryEncoder) -> (EncodeScheduler, InMemoryMuxer, Arc<Diagnostics>) {
    let muxer = InMemoryMuxer::new();
    let diagnostics = Arc::new(Diagnostics::new());
    let s = EncodeScheduler::new(Box::new(encoder), Box::new(muxer.handle()), diagnostics.clone());
    (s, muxer, diagnostics)
}

#[test]
fn chunks_reach_the_muxer_in_order_despite_latency() {
    let (mut s, muxer, diagnostics) = scheduler(InMemoryEncoder::new(3));
    s.begin(&settings()).unwrap();
    for seq in 0..10 {
        s.submit(&frame(seq)).unwrap();
    }
    assert_eq!(muxer.log().chunks.len(), 7);
    let summary = s.finish().unwrap();
    assert_eq!(summary, EncodeSummary { frames: 10, chunks: 10 });

    let log = muxer.log();
    assert!(log.finalized);
    assert!(!log.aborted);
    let seqs: Vec<u64> = log
        .chunks
        .iter()
        .map(|c| u64::from_le_bytes(c.data[..8].try_into().unwrap()))
        .collect();
    assert_eq!(seqs, (0..10).collect::<Vec<_>>());
    assert!(log.chunks[0].keyframe);
    assert_eq!(log.chunks[9].pts_us, Timestamp(9 * 33_333));

    let snap = diagnostics.snapshot();
    assert_eq!(snap.frames_encoded, 10);
    assert_eq!(snap.chunks_muxed, 10);
}

#[test]
fn out_of_order_submission_is_rejected() {
    let (mut s, _muxer, _) = scheduler(InMemoryEncoder::new(0));
    s.begin(&settings()).unwrap();
    s.submit(&frame(0)).unwrap();
    let err = s.submit(&frame(2)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EncodeFailure);
    assert!(err.to_string().contains("out of order"));
}

#[test]
fn encoder_failure_surfaces_and_abort_keeps_output_unfinalized() {
    let (mut s, muxer, _) = scheduler(InMemoryEncoder::new(0).failing_at(2));
    s.begin(&settings()).unwrap();
    s.submit(&frame(0)).unwrap();
    s.submit(&frame(1)).unwrap();
    let err = s.submit(&frame(2)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EncodeFailure);
    s.abort();

    let log = muxer.log();
    assert_eq!(log.chunks.len(), 2);
    assert!(log.aborted);
    assert!(!log.finalized);
    assert_eq!(s.summary().frames, 2);
}

#[test]
fn submit_before_begin_fails() {
    let (mut s, muxer, _) = scheduler(InMemoryEncoder::new(0));
    assert_eq!(s.submit(&frame(0)).unwrap_err().kind(), ErrorKind::EncodeFailure);
    assert!(muxer.log().settings.is_none());
}

#[test]
fn size_mismatch_is_an_encode_failure() {
    let (mut s, _muxer, _) = scheduler(InMemoryEncoder::new(0));
    s.begin(&settings()).unwrap();
    let mut f = frame(0);
    f.width = 16;
    assert_eq!(s.submit(&f).unwrap_err().kind(), ErrorKind::EncodeFailure);
}
