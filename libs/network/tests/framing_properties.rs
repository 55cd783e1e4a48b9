use bytes::{Bytes, BytesMut};
use network::{Frame, FrameCodec};
use proptest::prelude::*;

proptest! {
    #[test]
    fn frames_survive_arbitrary_chunking(
        payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 1..200), 1..20),
        chunk in 1usize..64,
        checksum in any::<bool>(),
    ) {
        let codec = FrameCodec::new(checksum, 1024);
        let mut wire = BytesMut::new();
        for payload in &payloads {
            codec.encode(payload, &mut wire).unwrap();
            codec.encode_ping(&mut wire);
        }

        let mut buffer = BytesMut::new();
        let mut frames = Vec::new();
        for piece in wire.chunks(chunk) {
            buffer.extend_from_slice(piece);
            while let Some(frame) = codec.try_decode(&mut buffer).unwrap() {
                frames.push(frame);
            }
        }

        let expected: Vec<Frame> = payloads
            .iter()
            .flat_map(|p| [Frame::Message(Bytes::copy_from_slice(p)), Frame::Ping])
            .collect();
        prop_assert_eq!(frames, expected);
        prop_assert!(buffer.is_empty());
    }

    #[test]
    fn garbage_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
        let codec = FrameCodec::new(true, 128);
        let mut buffer = BytesMut::from(&bytes[..]);
        while let Ok(Some(_)) = codec.try_decode(&mut buffer) {}
    }
}
