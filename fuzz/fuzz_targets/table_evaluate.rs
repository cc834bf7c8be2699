#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use nfsieve_core::types::{Direction, Polarity};
use nfsieve_regex_filter::{FilterTable, encode_token};

/// 퍼저용 구조적 입력
#[derive(Arbitrary, Debug)]
struct FuzzInput {
    /// (입력 방향 여부, 거부 여부, 패턴)
    rules: Vec<(bool, bool, String)>,
    payload: Vec<u8>,
    input: bool,
}

fuzz_target!(|input: FuzzInput| {
    let tokens: Vec<String> = input
        .rules
        .iter()
        .take(16)
        .map(|(is_input, is_deny, pattern)| {
            let direction = if *is_input { Direction::Input } else { Direction::Output };
            let polarity = if *is_deny { Polarity::Deny } else { Polarity::Allow };
            encode_token(direction, polarity, pattern)
        })
        .collect();

    let table = FilterTable::build(&tokens);
    let direction = if input.input { Direction::Input } else { Direction::Output };

    // 거부 규칙이 매칭되면 반드시 거부
    let denied = table
        .rules(direction, Polarity::Deny)
        .iter()
        .any(|rule| rule.is_match(&input.payload));
    if denied {
        assert!(!table.check(&input.payload, direction));
    }
    assert_eq!(
        table.check(&input.payload, direction),
        table.evaluate(&input.payload, direction).is_none()
    );
});
