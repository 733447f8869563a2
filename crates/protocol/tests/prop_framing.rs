//! Property tests for the frame codec: round-trips and chunking laws.

use esphome_proto::framing::{Frame, FrameCodec, MAX_FRAME_SIZE};
use proptest::prelude::*;

fn frame_strategy() -> impl Strategy<Value = (u32, Vec<u8>)> {
    (1u32..200, prop::collection::vec(any::<u8>(), 0..512))
}

proptest! {
    /// Decoding the encoding of any frame yields exactly that frame.
    #[test]
    fn prop_roundtrip((msg_type, payload) in frame_strategy()) {
        let encoded = FrameCodec::encode(msg_type, &payload);
        let mut codec = FrameCodec::new();
        let frames = codec.feed(&encoded).unwrap();
        prop_assert_eq!(frames, vec![Frame::new(msg_type, payload)]);
        prop_assert!(codec.is_empty());
    }

    /// Feeding a stream in arbitrary chunks yields the same frames as
    /// feeding it whole.
    #[test]
    fn prop_streaming_equivalence(
        frames in prop::collection::vec(frame_strategy(), 1..8),
        cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..16),
    ) {
        let mut stream = Vec::new();
        for (msg_type, payload) in &frames {
            stream.extend_from_slice(&FrameCodec::encode(*msg_type, payload));
        }

        let mut whole = FrameCodec::new();
        let expected = whole.feed(&stream).unwrap();

        // Partition the stream at the sampled cut points.
        let mut offsets: Vec<usize> = cuts.iter().map(|ix| ix.index(stream.len() + 1)).collect();
        offsets.push(0);
        offsets.push(stream.len());
        offsets.sort_unstable();
        offsets.dedup();

        let mut chunked = FrameCodec::new();
        let mut collected = Vec::new();
        for pair in offsets.windows(2) {
            collected.extend(chunked.feed(&stream[pair[0]..pair[1]]).unwrap());
        }

        prop_assert_eq!(collected, expected);
        prop_assert!(chunked.is_empty());
    }

    /// Arbitrary non-preamble garbage before a valid frame is skipped and
    /// reported; the frame still decodes.
    #[test]
    fn prop_resynchronization(
        garbage in prop::collection::vec(1u8..=255, 1..32),
        (msg_type, payload) in frame_strategy(),
    ) {
        let mut stream = garbage.clone();
        stream.extend_from_slice(&FrameCodec::encode(msg_type, &payload));

        let mut codec = FrameCodec::new();
        let frames = codec.feed(&stream).unwrap();
        prop_assert_eq!(frames, vec![Frame::new(msg_type, payload)]);
        prop_assert_eq!(codec.resync_skips(), garbage.len() as u64);
    }
}

/// A frame declaring a length beyond the cap is rejected as soon as its
/// header parses, before any payload is buffered.
#[test]
fn oversized_frame_rejected_from_header_alone() {
    let mut header = vec![0x00];
    let oversize = (MAX_FRAME_SIZE + 1) as u64;
    // varint(oversize)
    let mut v = oversize;
    while v >= 0x80 {
        header.push((v as u8 & 0x7f) | 0x80);
        v >>= 7;
    }
    header.push(v as u8);
    header.push(0x07);

    let mut codec = FrameCodec::new();
    assert!(codec.feed(&header).is_err());
}
