//! 엔진 에러 타입
//!
//! - [`EngineError`]: 큐 할당, 제어 채널, 워커 배포 단계의 에러
//! - [`PacketError`]: 패킷 헤더 해석 실패 (해당 패킷은 통과 처리)
//! - [`TeardownError`]: 종료 세그먼트 합성 실패 (해당 패킷은 drop)

use nfsieve_core::error::{NfsieveError, QueueError};
use nfsieve_core::types::Direction;

/// 큐 엔진 에러
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// 큐 번호 공간 안에서 연속 구간을 찾지 못함
    #[error("no free window of {count} {direction} queues below {limit} (search started at {start})")]
    QueueSpaceExhausted {
        direction: Direction,
        count: u16,
        start: u32,
        limit: u32,
    },

    /// 방향별 큐 수가 0
    #[error("queue count must be at least 1")]
    InvalidQueueCount,

    /// 복구할 수 없는 커널 큐 에러
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// 워커의 업데이트 채널이 닫힘
    #[error("{direction} worker for queue {queue_id} is no longer accepting updates")]
    WorkerUnavailable { direction: Direction, queue_id: u16 },

    /// 제어 채널 EOF
    #[error("control channel closed")]
    ControlChannelClosed,

    /// 큐 펌프 스레드 생성 실패 또는 제어 채널 읽기 실패
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 엔진 구성 누락
    #[error("engine build failed: {0}")]
    Build(String),
}

impl From<EngineError> for NfsieveError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Queue(e) => NfsieveError::Queue(e),
            EngineError::Io(e) => NfsieveError::Io(e),
            other => NfsieveError::Engine(other.to_string()),
        }
    }
}

/// 패킷 헤더 해석 에러
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PacketError {
    /// 헤더가 잘림
    #[error("{layer} header truncated: need {needed} bytes, have {available}")]
    Truncated {
        layer: &'static str,
        needed: usize,
        available: usize,
    },

    /// 헤더 길이 필드가 유효하지 않음
    #[error("{layer} header length field is invalid: {value}")]
    BadLength { layer: &'static str, value: usize },

    /// IPv4/IPv6가 아닌 패킷
    #[error("unsupported IP version {0}")]
    UnsupportedVersion(u8),

    /// 첫 조각이 아닌 IP 조각 (전송 계층 헤더 없음)
    #[error("non-initial IP fragment")]
    Fragment,

    /// TCP/UDP가 아닌 전송 계층
    #[error("unsupported transport protocol {0}")]
    UnsupportedProtocol(u8),
}

/// TCP 종료 세그먼트 합성 에러
#[derive(Debug, thiserror::Error)]
pub enum TeardownError {
    /// TCP가 아닌 패킷
    #[error("teardown requires a TCP packet")]
    NotTcp,

    /// 조각화된 IPv6 패킷 (조각 헤더를 유지한 채 재작성할 수 없음)
    #[error("cannot rewrite a fragmented IPv6 packet")]
    Fragmented,

    /// 원본 패킷 해석 실패
    #[error(transparent)]
    Packet(#[from] PacketError),
}

impl From<TeardownError> for NfsieveError {
    fn from(err: TeardownError) -> Self {
        NfsieveError::Engine(err.to_string())
    }
}
