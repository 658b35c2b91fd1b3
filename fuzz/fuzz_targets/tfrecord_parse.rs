//! Fuzz target for TFRecord framing and `tf.train.Example` decoding.

#![no_main]

use libfuzzer_sys::fuzz_target;
use prost::Message;
use recordprep::record::example::Example;
use recordprep::record::TfRecordReader;

fuzz_target!(|data: &[u8]| {
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    for payload in TfRecordReader::new(data, "<fuzz>") {
        match payload {
            Ok(payload) => {
                let _ = Example::decode(payload.as_slice());
            }
            Err(_) => break,
        }
    }
});
