//! Fuzz target for command frame bodies.
//!
//! Whatever the peer sends, decoding a frame body never panics, and a body
//! that decodes re-encodes to the same bytes.

#![no_main]

use bytes::{Bytes, BytesMut};
use journal_rpc::command::{Command, FRAME_LEN_PREFIX};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some(command) = Command::decode_body(Bytes::copy_from_slice(data)) else {
        return;
    };

    let mut frame = BytesMut::new();
    if command.encode_frame(&mut frame).is_some() {
        assert_eq!(&frame[FRAME_LEN_PREFIX..], data);
    }
});
