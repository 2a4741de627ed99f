use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert!(
        StitchError::configuration("x")
            .to_string()
            .contains("configuration error:")
    );
    assert!(
        StitchError::encoder_init("x")
            .to_string()
            .contains("encoder init error:")
    );
    assert!(StitchError::encode("x").to_string().contains("encode failure:"));
    assert!(
        StitchError::source_open("/nope.mp4", "missing")
            .to_string()
            .contains("'/nope.mp4'")
    );
}

#[test]
fn kinds_and_frame_level_classification() {
    let decode = StitchError::decode(StreamId(1), 7, "corrupt");
    assert_eq!(decode.kind(), ErrorKind::Decode);
    assert!(decode.is_frame_level());

    let align = StitchError::alignment(3, 0.1, "low confidence");
    assert_eq!(align.kind(), ErrorKind::AlignmentFailure);
    assert!(align.is_frame_level());

    assert!(!StitchError::Cancelled.is_frame_level());
    assert_eq!(
        StitchError::model_load("m.json", "missing").kind(),
        ErrorKind::ModelLoad
    );
}

#[test]
fn other_preserves_source() {
    let base = std::io::Error::other("boom");
    let err = StitchError::Other(anyhow::Error::new(base));
    assert!(err.to_string().contains("boom"));
    assert_eq!(err.kind(), ErrorKind::Other);
}
