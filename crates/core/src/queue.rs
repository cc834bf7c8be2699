//! 커널 패킷 큐 협력자 trait
//!
//! 커널의 패킷 큐잉 서브시스템(Linux NFQUEUE)을 추상화합니다.
//! 계약은 단순합니다:
//!
//! 1. 16비트 큐 번호를 바인딩한다 (이미 사용 중이면 [`QueueError::Busy`])
//! 2. 바인딩된 큐에서 패킷 메시지 스트림을 받는다 (blocking)
//! 3. 메시지마다 정확히 하나의 [`Verdict`]를 돌려준다
//!
//! 실제 바인딩은 `nfsieve-queue-engine`의 `netlink` 모듈(Linux 전용)이,
//! 테스트는 인메모리 구현이 담당합니다.

use crate::error::QueueError;
use crate::types::Verdict;

/// 큐 바인딩 파라미터
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSpec {
    /// 커널 측 큐 최대 길이 (패킷 수)
    pub capacity: u32,
    /// 유저스페이스로 복사할 최대 패킷 크기 (바이트)
    pub max_packet_size: u16,
    /// 큐가 가득 찼을 때 커널이 패킷을 통과시킬지 여부
    pub fail_open: bool,
}

impl Default for QueueSpec {
    fn default() -> Self {
        Self {
            capacity: 100,
            max_packet_size: u16::MAX,
            fail_open: false,
        }
    }
}

/// 큐에서 수신한 패킷 메시지
pub trait QueueMessage: Send + 'static {
    /// 네트워크 계층부터 시작하는 원시 패킷 바이트
    fn packet(&self) -> &[u8];
}

/// 바인딩된 커널 큐 하나
///
/// 드롭 시 바인딩이 해제되어야 합니다.
pub trait PacketQueue: Send + 'static {
    /// 큐가 전달하는 메시지 타입
    type Message: QueueMessage;

    /// 바인딩된 큐 번호
    fn id(&self) -> u16;

    /// 다음 패킷을 기다립니다 (blocking).
    fn recv(&mut self) -> Result<Self::Message, QueueError>;

    /// 메시지에 대한 판정을 커널로 돌려줍니다.
    ///
    /// 메시지를 소비하므로 같은 메시지에 두 번 판정할 수 없습니다.
    fn verdict(&mut self, message: Self::Message, verdict: Verdict) -> Result<(), QueueError>;
}

/// 큐 번호를 바인딩하는 팩토리
pub trait QueueBinder {
    /// 바인딩 결과 큐 타입
    type Queue: PacketQueue;

    /// 큐 번호 `id`를 바인딩합니다.
    ///
    /// # 에러
    /// - `QueueError::Busy`: 번호가 이미 다른 소비자에게 바인딩됨 (복구 가능)
    /// - `QueueError::Open`: 커널 채널 자체를 열 수 없음 (치명적)
    fn bind(&mut self, id: u16, spec: &QueueSpec) -> Result<Self::Queue, QueueError>;
}
