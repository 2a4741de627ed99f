use super::*;

#[test]
fn rationals_parse_like_ffprobe_prints_them() {
    assert_eq!(parse_rational("30000/1001"), Some(Fps { num: 30000, den: 1001 }));
    assert_eq!(parse_rational("30"), Some(Fps { num: 30, den: 1 }));
    assert_eq!(parse_rational("0/0"), None);
    assert_eq!(parse_rational("n/a"), None);
}

#[test]
fn showinfo_lines_yield_frame_timestamps() {
    let line = "[Parsed_showinfo_0 @ 0x5581] [info] n:  12 pts:  6006 pts_time:0.4004  duration:500";
    assert_eq!(
        classify_stderr_line(line),
        DecoderEvent::FramePts(12, 0.4004)
    );
}

#[test]
fn error_level_lines_are_decode_errors() {
    let line = "[hevc @ 0x5581] [error] Could not find ref with POC 7";
    assert!(matches!(classify_stderr_line(line), DecoderEvent::Error(_)));
    let info = "[Parsed_showinfo_0 @ 0x5581] [info] config in time_base: 1/15000";
    assert!(matches!(classify_stderr_line(info), DecoderEvent::Other(_)));
}

#[test]
fn missing_file_is_a_source_open_error() {
    let err = probe_video(Path::new("/definitely/not/here_00_.insv"), 0).unwrap_err();
    match err {
        StitchError::SourceOpen { path, reason } => {
            assert_eq!(path, Path::new("/definitely/not/here_00_.insv"));
            assert!(reason.contains("no such file"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn read_full_reports_short_reads() {
    let mut src: &[u8] = &[1, 2, 3];
    let mut buf = [0u8; 5];
    assert_eq!(read_full(&mut src, &mut buf).unwrap(), 3);
    assert_eq!(&buf[..3], &[1, 2, 3]);
}

fn scripted(frames: usize) -> (FfmpegSource, mpsc::Sender<DecoderEvent>) {
    let info = StreamInfo {
        width: 2,
        height: 1,
        fps: Fps::new(30, 1).unwrap(),
        start: Timestamp::ZERO,
        frame_count: Some(frames as u64),
    };
    let stdout = std::io::Cursor::new(vec![7u8; frames * 8]);
    let (tx, rx) = mpsc::channel();
    let source = FfmpegSource::from_parts(
        StreamId(0),
        PathBuf::from("scripted_00_.insv"),
        info,
        None,
        Box::new(stdout),
        rx,
        None,
    );
    (source, tx)
}

#[test]
fn timestamps_reported_ahead_of_the_frame_are_used() {
    let (mut source, tx) = scripted(2);
    tx.send(DecoderEvent::FramePts(0, 10.0)).unwrap();
    tx.send(DecoderEvent::Other("[info] frame queued".into())).unwrap();
    tx.send(DecoderEvent::FramePts(1, 10.25)).unwrap();

    let started = std::time::Instant::now();
    let f0 = source.next_frame().unwrap().unwrap();
    let f1 = source.next_frame().unwrap().unwrap();
    assert!(started.elapsed() < PTS_WAIT);

    assert_eq!((f0.index, f0.pts), (0, Timestamp::from_secs_f64(10.0)));
    assert_eq!((f1.index, f1.pts), (1, Timestamp::from_secs_f64(10.25)));
    assert!(source.next_frame().is_none());
}

#[test]
fn late_timestamps_are_waited_for() {
    let (mut source, tx) = scripted(1);
    let late = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(50));
        tx.send(DecoderEvent::FramePts(0, 3.5)).unwrap();
        tx
    });
    let f0 = source.next_frame().unwrap().unwrap();
    assert_eq!(f0.pts, Timestamp::from_secs_f64(3.5));
    drop(late.join().unwrap());
}

#[test]
fn unreported_timestamps_fall_back_to_the_nominal_rate() {
    let (mut source, tx) = scripted(2);
    tx.send(DecoderEvent::FramePts(1, 9.0)).unwrap();
    drop(tx);

    let f0 = source.next_frame().unwrap().unwrap();
    let f1 = source.next_frame().unwrap().unwrap();
    assert_eq!(f0.pts, Timestamp::ZERO);
    assert_eq!(f1.pts, Timestamp::from_secs_f64(9.0));
}

#[test]
fn decoder_errors_surface_before_the_next_frame() {
    let (mut source, tx) = scripted(1);
    tx.send(DecoderEvent::Error("[h264 @ 0x1] [error] corrupt slice".into())).unwrap();
    tx.send(DecoderEvent::FramePts(0, 1.0)).unwrap();

    let err = source.next_frame().unwrap().unwrap_err();
    assert_eq!(err.kind(), crate::foundation::error::ErrorKind::Decode);
    let f0 = source.next_frame().unwrap().unwrap();
    assert_eq!(f0.pts, Timestamp::from_secs_f64(1.0));
}

#[test]
fn a_panicked_stderr_reader_does_not_fail_the_stream() {
    let (mut source, tx) = scripted(1);
    source.stderr_drain = Some(std::thread::spawn(move || {
        drop(tx);
        panic!("stderr reader gave up");
    }));
    let f0 = source.next_frame().unwrap().unwrap();
    assert_eq!(f0.pts, Timestamp::ZERO);
    assert!(source.next_frame().is_none());
    assert!(source.stderr_drain.is_none());
}
