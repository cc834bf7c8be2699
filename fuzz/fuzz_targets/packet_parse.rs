#![no_main]

use libfuzzer_sys::fuzz_target;
use nfsieve_queue_engine::packet;

fuzz_target!(|data: &[u8]| {
    if let Ok(parsed) = packet::parse(data) {
        assert!(parsed.headers_len() <= parsed.total_len);
        assert!(parsed.payload.end <= data.len());
        let _ = parsed.payload(data);
    }
});
