#![no_main]

use libfuzzer_sys::fuzz_target;
use nfsieve_regex_filter::FilterRule;

fuzz_target!(|data: &[u8]| {
    if let Ok(token) = std::str::from_utf8(data) {
        if let Ok(rule) = FilterRule::compile(token) {
            // 규칙은 원본 토큰을 그대로 보존
            assert_eq!(rule.source(), token);
            let _ = rule.is_match(data);
        }
    }
});
