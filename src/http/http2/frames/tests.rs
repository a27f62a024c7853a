use super::*;
use crate::http::error::ErrorKind;
use proptest::prelude::*;

fn round_trip(frame: Frame) -> Frame {
    let bytes = frame.encode();
    let mut raw = [0u8; HEADER_LEN];
    raw.copy_from_slice(&bytes[..HEADER_LEN]);
    let header = FrameHeader::try_from(&raw).unwrap();
    assert_eq!(header.length as usize, bytes.len() - HEADER_LEN);

    Frame::parse(header, &bytes[HEADER_LEN..]).unwrap()
}

fn header(kind: FrameKind, flags: u8, id: u32, length: u32) -> FrameHeader {
    FrameHeader {
        length,
        kind,
        flags,
        stream_identifier: id,
    }
}

#[test]
fn header_layout() {
    let frame = Frame::new(3, END_STREAM, Data::new(b"hello".to_vec()));
    let bytes = frame.encode();
    assert_eq!(
        &bytes[..HEADER_LEN],
        &[0x00, 0x00, 0x05, 0x00, 0x01, 0x00, 0x00, 0x00, 0x03]
    );
    assert_eq!(&bytes[HEADER_LEN..], b"hello");
}

#[test]
fn reserved_bit_is_ignored_on_read_and_cleared_on_write() {
    let raw = [0x00, 0x00, 0x04, 0x08, 0x00, 0x80, 0x00, 0x00, 0x01];
    let header = FrameHeader::try_from(&raw).unwrap();
    assert_eq!(header.stream_identifier, 1);

    let frame = Frame::window_update(0xffff_ffff, 0xffff_ffff);
    let bytes = frame.encode();
    assert_eq!(bytes[5] & RESERVED, 0);
    assert_eq!(bytes[HEADER_LEN] & RESERVED, 0);
}

#[test]
fn flags_follow_payload() {
    let mut data = Data::new(b"x".to_vec());
    data.padding = Some(vec![0; 3]);
    let frame = Frame::new(1, END_STREAM, data);
    assert_eq!(frame.flags(), END_STREAM | PADDED);

    let mut headers = Headers::new(vec![0x82]);
    headers.priority = Some(Priority {
        is_exclusive: true,
        stream_dependency: 0,
        weight: 15,
    });
    let bytes = Frame::new(1, END_HEADERS | PADDED, headers).encode();
    assert_eq!(bytes[4], END_HEADERS | PRIORITY);
    assert_eq!(bytes[HEADER_LEN], 0x80);
}

#[test]
fn padded_data_strips_padding() {
    let header = header(FrameKind::Data, PADDED, 1, 8);
    let frame = Frame::parse(header, &[2, b'a', b'b', b'c', b'd', b'e', 0, 0]).unwrap();
    match frame.payload {
        Payload::Data(data) => {
            assert_eq!(data.data, b"abcde");
            assert_eq!(data.pad_length(), Some(2));
        }
        other => panic!("unexpected payload {other:?}"),
    }
}

#[test]
fn padding_longer_than_payload_is_protocol_error() {
    let header = header(FrameKind::Data, PADDED, 1, 3);
    let err = Frame::parse(header, &[5, b'a', b'b']).unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::ProtocolError));
}

#[test]
fn oversized_padding_is_cut_to_255_bytes() {
    let data = Data {
        data: b"body".to_vec(),
        padding: Some(vec![0; 300]),
    };
    assert_eq!(data.pad_length(), Some(255));
    let frame = round_trip(Frame::new(1, END_STREAM, data));
    assert_eq!(frame.header.length, 1 + 4 + 255);
    match frame.payload {
        Payload::Data(data) => {
            assert_eq!(data.data, b"body");
            assert_eq!(data.padding, Some(vec![0; 255]));
        }
        other => panic!("unexpected payload {other:?}"),
    }

    let headers = Headers {
        priority: None,
        header_block: vec![0x82],
        padding: Some(vec![0; 256]),
    };
    match round_trip(Frame::new(1, END_HEADERS, headers)).payload {
        Payload::Headers(headers) => {
            assert_eq!(headers.header_block, [0x82]);
            assert_eq!(headers.pad_length(), Some(255));
        }
        other => panic!("unexpected payload {other:?}"),
    }
}

#[test]
fn fixed_sizes_are_enforced() {
    let cases = [
        header(FrameKind::Ping, 0, 0, 7),
        header(FrameKind::Priority, 0, 1, 4),
        header(FrameKind::RstStream, 0, 1, 5),
        header(FrameKind::WindowUpdate, 0, 0, 3),
        header(FrameKind::Settings, 0, 0, 7),
        header(FrameKind::Settings, ACK, 0, 6),
        header(FrameKind::GoAway, 0, 0, 7),
    ];
    for header in cases {
        let err = header.validate().unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::FrameSizeError), "{header}");
    }
}

#[test]
fn stream_id_class_is_enforced() {
    let cases = [
        header(FrameKind::Data, 0, 0, 0),
        header(FrameKind::Headers, 0, 0, 0),
        header(FrameKind::Continuation, 0, 0, 0),
        header(FrameKind::Settings, 0, 1, 0),
        header(FrameKind::Ping, 0, 1, 8),
        header(FrameKind::GoAway, 0, 3, 8),
    ];
    for header in cases {
        let err = header.validate().unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Protocol(ErrorCode::ProtocolError)));
    }
    assert!(header(FrameKind::WindowUpdate, 0, 0, 4).validate().is_ok());
    assert!(header(FrameKind::WindowUpdate, 0, 7, 4).validate().is_ok());
}

#[test]
fn unknown_frame_type_is_reported() {
    let raw = [0x00, 0x00, 0x00, 0x0a, 0x00, 0x00, 0x00, 0x00, 0x00];
    assert!(FrameHeader::try_from(&raw).is_err());
    assert_eq!(FrameKind::try_from(0x0b), Err(0x0b));
}

#[test]
fn unknown_error_code_is_internal_error() {
    assert_eq!(ErrorCode::from(0xff), ErrorCode::InternalError);
    assert_eq!(ErrorCode::from([0, 0, 0, 0x8]), ErrorCode::Cancel);
}

#[test]
fn header_display_names_flags() {
    let header = header(FrameKind::Headers, END_STREAM | END_HEADERS, 1, 10);
    assert_eq!(
        header.to_string(),
        "FrameHeader { length: 10, kind: HEADERS, flags: END_STREAM|END_HEADERS, stream_identifier: 1 }"
    );
}

#[test]
fn settings_ack_is_empty() {
    let bytes = Frame::settings_ack().encode();
    assert_eq!(bytes, vec![0, 0, 0, 0x04, 0x01, 0, 0, 0, 0]);
}

#[test]
fn goaway_debug_data() {
    let frame = round_trip(Frame::go_away(7, ErrorCode::ProtocolError, "bad settings"));
    match frame.payload {
        Payload::GoAway(go_away) => {
            assert_eq!(go_away.last_stream_id, 7);
            assert_eq!(go_away.error_code, ErrorCode::ProtocolError);
            assert_eq!(go_away.debug_message(), "bad settings");
        }
        other => panic!("unexpected payload {other:?}"),
    }
}

fn error_code() -> impl Strategy<Value = ErrorCode> {
    (0u32..=0xd).prop_map(ErrorCode::from)
}

fn padding() -> impl Strategy<Value = Option<Vec<u8>>> {
    prop::option::of(prop::collection::vec(any::<u8>(), 0..32))
}

fn priority() -> impl Strategy<Value = Priority> {
    (any::<bool>(), 0..=MAX_STREAM_ID, any::<u8>()).prop_map(|(e, d, w)| Priority {
        is_exclusive: e,
        stream_dependency: d,
        weight: w,
    })
}

fn payload() -> impl Strategy<Value = Payload> {
    let block = || prop::collection::vec(any::<u8>(), 0..64);
    prop_oneof![
        (block(), padding()).prop_map(|(data, padding)| Data { data, padding }.into()),
        (prop::option::of(priority()), block(), padding()).prop_map(
            |(priority, header_block, padding)| Headers {
                priority,
                header_block,
                padding
            }
            .into()
        ),
        priority().prop_map(Payload::from),
        error_code().prop_map(|error_code| RstStream { error_code }.into()),
        prop::collection::vec((1u16..=6, any::<u32>()), 0..6).prop_map(|items| Settings {
            items: items.into_iter().map(Setting::from).collect()
        }
        .into()),
        (1..=MAX_STREAM_ID, block(), padding()).prop_map(
            |(promised_stream_id, header_block, padding)| PushPromise {
                promised_stream_id,
                header_block,
                padding
            }
            .into()
        ),
        any::<[u8; 8]>().prop_map(|opaque_data| Ping { opaque_data }.into()),
        (0..=MAX_STREAM_ID, error_code(), block()).prop_map(
            |(last_stream_id, error_code, additional_debug_data)| GoAway {
                last_stream_id,
                error_code,
                additional_debug_data
            }
            .into()
        ),
        (1..=MAX_STREAM_ID).prop_map(|window_size_increment| WindowUpdate {
            window_size_increment
        }
        .into()),
        block().prop_map(|header_block| Continuation { header_block }.into()),
    ]
}

fn frame_of(payload: Payload, flags: u8, id: u32) -> Frame {
    let id = match payload.kind() {
        FrameKind::Settings | FrameKind::Ping | FrameKind::GoAway => 0,
        _ => id,
    };
    let flags = match payload.kind() {
        FrameKind::Settings => 0,
        _ => flags,
    };
    match payload {
        Payload::Data(p) => Frame::new(id, flags, p),
        Payload::Headers(p) => Frame::new(id, flags, p),
        Payload::Priority(p) => Frame::new(id, flags, p),
        Payload::RstStream(p) => Frame::new(id, flags, p),
        Payload::Settings(p) => Frame::new(id, flags, p),
        Payload::PushPromise(p) => Frame::new(id, flags, p),
        Payload::Ping(p) => Frame::new(id, flags, p),
        Payload::GoAway(p) => Frame::new(id, flags, p),
        Payload::WindowUpdate(p) => Frame::new(id, flags, p),
        Payload::Continuation(p) => Frame::new(id, flags, p),
    }
}

proptest! {
    #[test]
    fn frames_round_trip(
        payload in payload(),
        flags in prop::sample::select(vec![0u8, END_STREAM, END_HEADERS, END_STREAM | END_HEADERS]),
        id in 1..=MAX_STREAM_ID,
    ) {
        let frame = frame_of(payload, flags, id);
        let parsed = round_trip(frame.clone());
        prop_assert_eq!(parsed.kind(), frame.kind());
        prop_assert_eq!(parsed.flags(), frame.flags());
        prop_assert_eq!(parsed.id(), frame.id());
        prop_assert_eq!(parsed.payload, frame.payload);
    }
}
