//! 큐 할당기 -- 연속된 큐 번호 구간 탐색
//!
//! `[low, low + count)` 구간을 위에서부터 아래로 바인딩합니다. 번호 `f`에서
//! 경합(`QueueError::Busy`)이 나면 이번 시도에서 바인딩한 큐를 모두 해제하고
//! `low = f + 1`로 다시 시도합니다. `low`는 매번 증가하므로 탐색은 반드시 끝납니다.
//!
//! 구간이 번호 65535에 닿으면 `EngineError::QueueSpaceExhausted`로 실패합니다.
//! 같은 할당기에서 받은 구간끼리는 겹치지 않습니다.

use tracing::{debug, info};

use nfsieve_core::config::{QUEUE_BASE_ID, QUEUE_ID_LIMIT};
use nfsieve_core::queue::{QueueBinder, QueueSpec};
use nfsieve_core::types::Direction;

use crate::error::EngineError;

/// 바인딩된 연속 큐 구간
#[derive(Debug)]
pub struct QueueBlock<Q> {
    /// `low`부터 오름차순
    pub queues: Vec<Q>,
    pub low: u16,
    pub high: u16,
}

impl<Q> QueueBlock<Q> {
    /// `(low, high)` 쌍
    pub fn range(&self) -> (u16, u16) {
        (self.low, self.high)
    }
}

/// 큐 번호 구간 할당기
pub struct QueueAllocator<B: QueueBinder> {
    binder: B,
    spec: QueueSpec,
    /// 다음 탐색 시작 번호
    next_low: u32,
}

impl<B: QueueBinder> QueueAllocator<B> {
    /// `base_id`부터 탐색하는 할당기를 만듭니다.
    pub fn new(binder: B, spec: QueueSpec, base_id: u16) -> Self {
        Self {
            binder,
            spec,
            next_low: u32::from(base_id.max(QUEUE_BASE_ID)),
        }
    }

    /// 방향 하나에 `count`개의 연속 큐를 할당합니다.
    ///
    /// # 에러
    /// - `InvalidQueueCount`: `count == 0`
    /// - `QueueSpaceExhausted`: 남은 번호 공간에 구간이 없음
    /// - `Queue`: 경합이 아닌 커널 에러 (재시도하지 않음)
    pub fn allocate(
        &mut self,
        direction: Direction,
        count: u16,
    ) -> Result<QueueBlock<B::Queue>, EngineError> {
        if count == 0 {
            return Err(EngineError::InvalidQueueCount);
        }

        let count = u32::from(count);
        let start = self.next_low;
        let mut low = start;

        loop {
            if low + count > QUEUE_ID_LIMIT {
                return Err(EngineError::QueueSpaceExhausted {
                    direction,
                    count: count as u16,
                    start,
                    limit: QUEUE_ID_LIMIT,
                });
            }

            match self.try_window(low, count)? {
                Ok(queues) => {
                    let high = low + count - 1;
                    self.next_low = high + 1;
                    info!(
                        direction = direction.as_str(),
                        low, high, "queue block bound"
                    );
                    metrics::gauge!(
                        nfsieve_core::metrics::QUEUES_BOUND,
                        nfsieve_core::metrics::LABEL_DIRECTION => direction.as_str()
                    )
                    .set(f64::from(count));
                    return Ok(QueueBlock {
                        queues,
                        low: low as u16,
                        high: high as u16,
                    });
                }
                Err(failed) => {
                    debug!(
                        direction = direction.as_str(),
                        failed,
                        next_low = failed + 1,
                        "queue window contended, shifting"
                    );
                    low = failed + 1;
                }
            }
        }
    }

    /// 구간 하나를 위에서부터 바인딩합니다.
    ///
    /// 바깥 `Err`는 치명적 에러, 안쪽 `Err`는 경합이 난 번호입니다.
    /// 실패 시 이미 바인딩한 큐는 드롭으로 해제됩니다.
    #[allow(clippy::type_complexity)]
    fn try_window(
        &mut self,
        low: u32,
        count: u32,
    ) -> Result<Result<Vec<B::Queue>, u32>, EngineError> {
        let mut bound = Vec::with_capacity(count as usize);

        for id in (low..low + count).rev() {
            match self.binder.bind(id as u16, &self.spec) {
                Ok(queue) => bound.push(queue),
                Err(e) if e.is_contention() => {
                    debug!(queue_id = id, error = %e, "queue id unavailable");
                    return Ok(Err(id));
                }
                Err(e) => return Err(e.into()),
            }
        }

        bound.reverse();
        Ok(Ok(bound))
    }

    /// 바인더를 돌려받습니다.
    pub fn into_binder(self) -> B {
        self.binder
    }
}
