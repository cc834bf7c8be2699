//! 에러 타입 — 도메인별 에러 정의
//!
//! 각 모듈 크레이트는 자체 에러 타입을 정의하고 `From<..> for NfsieveError`를
//! 구현하여 상위 레이어에서 `?` 연산자로 전파합니다.

/// nfsieve 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum NfsieveError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 커널 큐 에러
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    /// 필터 규칙 에러
    #[error("filter error: {0}")]
    Filter(String),

    /// 패킷 처리 엔진 에러
    #[error("engine error: {0}")]
    Engine(String),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 커널 패킷 큐 에러
///
/// `Busy`만 큐 할당기가 복구할 수 있는 경합 에러입니다.
/// 나머지는 호출자에게 그대로 전파됩니다.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// 큐 번호가 이미 다른 소비자에게 바인딩됨
    #[error("queue {id} is busy: {reason}")]
    Busy { id: u16, reason: String },

    /// 커널 큐 채널을 열 수 없음
    #[error("failed to open queue channel: {0}")]
    Open(String),

    /// 패킷 수신 실패
    #[error("queue {id} receive failed: {reason}")]
    Recv { id: u16, reason: String },

    /// 판정 전송 실패
    #[error("queue {id} verdict failed: {reason}")]
    Verdict { id: u16, reason: String },

    /// 큐가 닫힘
    #[error("queue {0} closed")]
    Closed(u16),
}

impl QueueError {
    /// 큐 할당기가 다음 윈도우로 넘어가 복구할 수 있는 에러인지 여부
    pub fn is_contention(&self) -> bool {
        matches!(self, Self::Busy { .. })
    }
}
