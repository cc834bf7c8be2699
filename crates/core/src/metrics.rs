//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`
//! 매크로를 호출합니다. 레코더가 설치되지 않으면 모든 호출은 no-op입니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `nfsieve_`
//! - 접미어: `_total` (counter), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(nfsieve_core::metrics::PACKETS_TOTAL, "direction" => "input").increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 방향 레이블 키 (input, output)
pub const LABEL_DIRECTION: &str = "direction";

/// 판정 레이블 키 (accept, accept_with, drop)
pub const LABEL_VERDICT: &str = "verdict";

// ─── 패킷 처리 메트릭 ──────────────────────────────────────────────

/// 워커가 처리한 전체 패킷 수 (counter, label: direction)
pub const PACKETS_TOTAL: &str = "nfsieve_packets_total";

/// 판정별 패킷 수 (counter, labels: direction, verdict)
pub const VERDICTS_TOTAL: &str = "nfsieve_verdicts_total";

/// 규칙에 의해 거부된 패킷 수 (counter, label: direction)
pub const PACKETS_REJECTED_TOTAL: &str = "nfsieve_packets_rejected_total";

/// 합성된 TCP FIN/ACK 종료 세그먼트 수 (counter)
pub const TEARDOWNS_TOTAL: &str = "nfsieve_teardowns_total";

/// 종료 세그먼트 합성 실패로 drop된 패킷 수 (counter)
pub const TEARDOWN_FAILURES_TOTAL: &str = "nfsieve_teardown_failures_total";

/// 커널 큐 수신/판정 에러 수 (counter)
pub const QUEUE_ERRORS_TOTAL: &str = "nfsieve_queue_errors_total";

/// 바인딩된 큐 수 (gauge, label: direction)
pub const QUEUES_BOUND: &str = "nfsieve_queues_bound";

// ─── 규칙 메트릭 ───────────────────────────────────────────────────

/// 적용된 규칙 업데이트 수 (counter)
pub const RULE_UPDATES_TOTAL: &str = "nfsieve_rule_updates_total";

/// 파싱/컴파일 실패로 건너뛴 토큰 수 (counter)
pub const RULE_PARSE_ERRORS_TOTAL: &str = "nfsieve_rule_parse_errors_total";

/// 현재 테이블의 활성 규칙 수 (gauge)
pub const ACTIVE_RULES: &str = "nfsieve_active_rules";

/// 채널이 가득 차 버려진 stdout 알림 수 (counter)
pub const NOTICES_DROPPED_TOTAL: &str = "nfsieve_notices_dropped_total";

/// 모든 메트릭의 설명을 등록합니다.
///
/// 레코더 설치 직후 한 번 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge};

    describe_counter!(PACKETS_TOTAL, "Packets handled by packet workers");
    describe_counter!(VERDICTS_TOTAL, "Verdicts issued, by direction and verdict");
    describe_counter!(
        PACKETS_REJECTED_TOTAL,
        "Packets rejected by the active filter table"
    );
    describe_counter!(
        TEARDOWNS_TOTAL,
        "TCP FIN/ACK teardown segments injected in place of rejected packets"
    );
    describe_counter!(
        TEARDOWN_FAILURES_TOTAL,
        "Rejected TCP packets dropped because the teardown segment could not be built"
    );
    describe_counter!(QUEUE_ERRORS_TOTAL, "Kernel queue receive/verdict errors");
    describe_gauge!(QUEUES_BOUND, "Kernel queues bound per direction");
    describe_counter!(RULE_UPDATES_TOTAL, "Filter table updates applied");
    describe_counter!(
        RULE_PARSE_ERRORS_TOTAL,
        "Rule tokens skipped because they could not be decoded or compiled"
    );
    describe_gauge!(ACTIVE_RULES, "Rules in the most recently published table");
    describe_counter!(
        NOTICES_DROPPED_TOTAL,
        "stdout notices dropped because the notice channel was full"
    );
}
