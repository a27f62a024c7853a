use super::*;
use proptest::prelude::*;
use std::sync::mpsc::channel;

fn fields(pairs: &[(&str, &str)]) -> HeaderList {
    pairs
        .iter()
        .map(|(n, v)| (n.to_string(), v.to_string()))
        .collect()
}

fn stream_in(state: State) -> Stream {
    let mut stream = Stream::new(1, 65_535, 65_535);
    stream.state = state;
    stream
}

fn any_state() -> impl Strategy<Value = State> {
    prop_oneof![
        Just(State::Idle),
        Just(State::ReservedLocal),
        Just(State::ReservedRemote),
        Just(State::Open),
        Just(State::HalfClosedLocal),
        Just(State::HalfClosedRemote),
        Just(State::Closed),
    ]
}

#[test]
fn client_exchange() {
    let mut stream = Stream::new(1, 65_535, 65_535);
    stream.send_headers(true).unwrap();
    assert_eq!(stream.state, State::HalfClosedLocal);
    stream
        .recv_headers(fields(&[(":status", "200")]), false)
        .unwrap();
    assert_eq!(stream.state, State::HalfClosedLocal);
    stream.recv_data(b"hel".to_vec(), false).unwrap();
    stream.recv_data(b"lo".to_vec(), true).unwrap();
    assert!(stream.is_closed());
    let (headers, body) = stream.take_message();
    assert_eq!(headers, fields(&[(":status", "200")]));
    assert_eq!(body, b"hello");
}

#[test]
fn server_exchange() {
    let mut stream = Stream::new(1, 65_535, 65_535);
    stream
        .recv_headers(fields(&[(":method", "GET")]), true)
        .unwrap();
    assert_eq!(stream.state, State::HalfClosedRemote);
    assert!(stream.is_remote_closed());
    stream.send_headers(false).unwrap();
    assert_eq!(stream.state, State::HalfClosedRemote);
    stream.send_end_stream();
    assert!(stream.is_closed());
}

#[test]
fn end_stream_is_observed_once() {
    let mut stream = stream_in(State::HalfClosedLocal);
    stream.recv_headers(Vec::new(), true).unwrap();
    assert!(stream.is_closed());
    let err = stream.recv_data(b"late".to_vec(), true).unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::StreamClosed));
    assert!(!stream.recv_end_stream());
    assert!(stream.is_closed());
    assert!(stream.body.is_empty());
}

#[test]
fn trailers_extend_the_header_list() {
    let mut stream = stream_in(State::HalfClosedLocal);
    stream
        .recv_headers(fields(&[(":status", "200")]), false)
        .unwrap();
    stream.recv_data(b"body".to_vec(), false).unwrap();
    stream
        .recv_headers(fields(&[("x-checksum", "abc")]), true)
        .unwrap();
    assert_eq!(
        stream.headers,
        fields(&[(":status", "200"), ("x-checksum", "abc")])
    );
}

#[test]
fn headers_after_remote_end_fail() {
    let mut stream = stream_in(State::HalfClosedRemote);
    let err = stream.recv_headers(Vec::new(), false).unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::StreamClosed));
    let mut stream = stream_in(State::Closed);
    assert!(stream.send_headers(false).is_err());
}

#[test]
fn reserved_states() {
    let mut stream = stream_in(State::ReservedRemote);
    stream.recv_headers(Vec::new(), false).unwrap();
    assert_eq!(stream.state, State::HalfClosedLocal);
    let mut stream = stream_in(State::ReservedLocal);
    stream.send_headers(false).unwrap();
    assert_eq!(stream.state, State::HalfClosedRemote);
}

#[test]
fn streaming_mode_forwards_events() {
    let (sink, events) = channel();
    let mut stream = stream_in(State::HalfClosedLocal);
    stream.sink = Some(sink);
    stream
        .recv_headers(fields(&[(":status", "200")]), false)
        .unwrap();
    stream.recv_data(b"chunk".to_vec(), false).unwrap();
    stream.recv_data(Vec::new(), true).unwrap();
    assert!(stream.headers.is_empty());
    assert!(stream.body.is_empty());
    let received: Vec<StreamEvent> = events.try_iter().collect();
    assert_eq!(
        received,
        vec![
            StreamEvent::Headers(fields(&[(":status", "200")])),
            StreamEvent::Data(b"chunk".to_vec()),
            StreamEvent::End,
        ]
    );
}

#[test]
fn display() {
    let stream = Stream::new(3, 100, 200);
    assert_eq!(
        stream.to_string(),
        "Stream { id: 3, state: idle, send_window: 100, recv_window: 200 }"
    );
}

proptest! {
    #[test]
    fn reset_closes_from_any_state(state in any_state()) {
        let (sink, events) = channel();
        let mut stream = stream_in(state);
        stream.sink = Some(sink);
        stream.reset(ErrorCode::Cancel);
        prop_assert!(stream.is_closed());
        prop_assert_eq!(events.try_recv().ok(), Some(StreamEvent::Reset(ErrorCode::Cancel)));
        prop_assert!(!stream.recv_end_stream());
        prop_assert!(stream.recv_data(vec![1], false).is_err());
    }
}
