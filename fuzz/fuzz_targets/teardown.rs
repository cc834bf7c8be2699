#![no_main]

use libfuzzer_sys::fuzz_target;
use nfsieve_queue_engine::packet;
use nfsieve_queue_engine::teardown::{TCP_ACK, TCP_FIN, teardown};

fuzz_target!(|data: &[u8]| {
    if let Ok(segment) = teardown(data) {
        // 종료 세그먼트는 페이로드 없는 FIN/ACK
        let parsed = packet::parse(&segment).expect("teardown segment must parse");
        assert!(parsed.payload(&segment).is_empty());
        let flags = segment[parsed.transport_offset() + 13];
        assert_eq!(flags & (TCP_FIN | TCP_ACK), TCP_FIN | TCP_ACK);
    }
});
