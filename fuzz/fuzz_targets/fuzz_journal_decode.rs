//! Fuzz target for journal entry decoding.
//!
//! Arbitrary bytes must never panic the decoder, and anything that decodes
//! must re-encode to exactly the bytes it was read from.

#![no_main]

use journal_rpc::journal::{self, JournalEntryCodec};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Should never panic
    if let Ok(entry) = JournalEntryCodec::decode(data) {
        let encoded = JournalEntryCodec::encode(&entry).expect("decoded entry re-encodes");
        assert_eq!(&data[..entry.length()], &encoded[..]);
    }

    let outcome = journal::scan(data);
    assert!(outcome.valid_len <= data.len());

    // Entries are contiguous and end at the valid prefix
    let mut expected_offset = 0;
    for (offset, entry) in &outcome.entries {
        assert_eq!(*offset, expected_offset);
        expected_offset += entry.length();
    }
    assert_eq!(expected_offset, outcome.valid_len);
    assert_eq!(outcome.is_clean(), outcome.valid_len == data.len());
});
