//! 큐 엔진 -- 큐 할당, 펌프 스레드, 워커 태스크 조립
//!
//! [`QueueEngine`]은 빌더 패턴([`QueueEngineBuilder`])으로 생성합니다.
//! `start()`는 tokio 런타임 안에서 호출해야 합니다.
//!
//! # 아키텍처
//! ```text
//! QueueAllocator ──▶ input block [lo..=hi] ──┬──▶ pump thread ──▶ PacketWorker task
//!                ──▶ output block [lo..=hi] ─┘          (큐마다 한 쌍)
//!
//! ConfigDistributor ──▶ WorkerHandle (입력 워커 먼저, 그다음 출력 워커)
//! ```
//!
//! # 사용 예시
//! ```ignore
//! let (notice_tx, notice_rx) = mpsc::channel(1024);
//! let engine = QueueEngine::builder()
//!     .binder(NetlinkBinder::new())
//!     .queue_count(4)
//!     .notices(notice_tx.clone())
//!     .start()?;
//!
//! notice_tx.send(engine.queues_notice()).await?;
//! engine.distributor().run(stdin, cancel).await?;
//! ```

use std::thread::JoinHandle;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use nfsieve_core::config::QUEUE_BASE_ID;
use nfsieve_core::queue::{PacketQueue, QueueBinder, QueueSpec};
use nfsieve_core::types::Direction;

use crate::allocator::QueueAllocator;
use crate::distributor::{ConfigDistributor, WorkerHandle};
use crate::error::EngineError;
use crate::event;
use crate::notice::Notice;
use crate::worker::PacketWorker;

/// 워커 ↔ 펌프 이벤트 채널 용량 (큐당 처리 중인 패킷은 하나)
const EVENT_CHANNEL_CAPACITY: usize = 1;

/// 배포기 → 워커 업데이트 채널 용량
const UPDATE_CHANNEL_CAPACITY: usize = 1;

/// 실행 중인 큐 엔진
///
/// # 필드
/// - `input` / `output`: 방향별 바인딩된 큐 구간
/// - `workers`: 배포 대상 워커 목록 (등록 순서)
/// - `tasks`: 워커 태스크
/// - `pumps`: 큐 펌프 스레드 (`recv`가 blocking이므로 종료 시 join하지 않음)
pub struct QueueEngine {
    input: (u16, u16),
    output: (u16, u16),
    workers: Vec<WorkerHandle>,
    notices: mpsc::Sender<Notice>,
    cancel: CancellationToken,
    tasks: JoinSet<()>,
    pumps: Vec<JoinHandle<()>>,
}

/// 큐 엔진 빌더
pub struct QueueEngineBuilder<B> {
    binder: Option<B>,
    queue_count: u16,
    base_id: u16,
    spec: QueueSpec,
    notices: Option<mpsc::Sender<Notice>>,
    cancel: Option<CancellationToken>,
}

impl<B: QueueBinder> QueueEngineBuilder<B> {
    fn new() -> Self {
        Self {
            binder: None,
            queue_count: 1,
            base_id: QUEUE_BASE_ID,
            spec: QueueSpec::default(),
            notices: None,
            cancel: None,
        }
    }

    /// 커널 큐 바인더를 지정합니다.
    pub fn binder(mut self, binder: B) -> Self {
        self.binder = Some(binder);
        self
    }

    /// 방향별 큐 수를 지정합니다 (기본: 1).
    pub fn queue_count(mut self, count: u16) -> Self {
        self.queue_count = count;
        self
    }

    /// 큐 번호 탐색 시작점을 지정합니다 (기본: 1000).
    pub fn base_id(mut self, base_id: u16) -> Self {
        self.base_id = base_id;
        self
    }

    /// 큐 바인딩 파라미터를 지정합니다.
    pub fn spec(mut self, spec: QueueSpec) -> Self {
        self.spec = spec;
        self
    }

    /// stdout 알림 채널의 송신자를 지정합니다.
    pub fn notices(mut self, tx: mpsc::Sender<Notice>) -> Self {
        self.notices = Some(tx);
        self
    }

    /// 외부 취소 토큰을 지정합니다.
    ///
    /// 지정하지 않으면 엔진 전용 토큰을 만듭니다.
    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// 큐를 할당하고 펌프와 워커를 시작합니다.
    ///
    /// 입력 방향을 먼저 할당합니다.
    ///
    /// # 에러
    /// - `Build`: 바인더 또는 알림 채널 누락
    /// - `InvalidQueueCount`, `QueueSpaceExhausted`, `Queue`: 할당 실패
    /// - `Io`: 펌프 스레드 생성 실패
    pub fn start(self) -> Result<QueueEngine, EngineError> {
        let binder = self
            .binder
            .ok_or_else(|| EngineError::Build("binder is required".to_owned()))?;
        let notices = self
            .notices
            .ok_or_else(|| EngineError::Build("notice sender is required".to_owned()))?;
        let cancel = self.cancel.unwrap_or_default();

        let mut allocator = QueueAllocator::new(binder, self.spec, self.base_id);
        let input = allocator.allocate(Direction::Input, self.queue_count)?;
        let output = allocator.allocate(Direction::Output, self.queue_count)?;

        let mut engine = QueueEngine {
            input: input.range(),
            output: output.range(),
            workers: Vec::with_capacity(usize::from(self.queue_count) * 2),
            notices,
            cancel,
            tasks: JoinSet::new(),
            pumps: Vec::new(),
        };

        for queue in input.queues {
            engine.attach(queue, Direction::Input)?;
        }
        for queue in output.queues {
            engine.attach(queue, Direction::Output)?;
        }

        info!(
            input_low = engine.input.0,
            input_high = engine.input.1,
            output_low = engine.output.0,
            output_high = engine.output.1,
            "queue engine started"
        );

        Ok(engine)
    }
}

impl QueueEngine {
    /// 빌더를 반환합니다.
    pub fn builder<B: QueueBinder>() -> QueueEngineBuilder<B> {
        QueueEngineBuilder::new()
    }

    /// 입력 방향 큐 구간 `(low, high)`
    pub fn input_range(&self) -> (u16, u16) {
        self.input
    }

    /// 출력 방향 큐 구간 `(low, high)`
    pub fn output_range(&self) -> (u16, u16) {
        self.output
    }

    /// 시작 시 한 번 내보내는 `QUEUE` 알림
    pub fn queues_notice(&self) -> Notice {
        Notice::Queues {
            input: self.input,
            output: self.output,
        }
    }

    /// 등록 순서의 워커 목록
    pub fn workers(&self) -> &[WorkerHandle] {
        &self.workers
    }

    /// 모든 워커에 연결된 배포기를 만듭니다.
    pub fn distributor(&self) -> ConfigDistributor {
        ConfigDistributor::new(self.workers.clone(), self.notices.clone())
    }

    /// 엔진의 취소 토큰
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn attach<Q: PacketQueue>(&mut self, queue: Q, direction: Direction) -> Result<(), EngineError> {
        let queue_id = queue.id();
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (update_tx, update_rx) = mpsc::channel(UPDATE_CHANNEL_CAPACITY);

        let worker = PacketWorker::new(
            queue_id,
            direction,
            update_rx,
            event_rx,
            self.notices.clone(),
            self.cancel.child_token(),
        );
        self.tasks.spawn(worker.run());

        let pump = event::spawn_pump(queue, direction, event_tx, self.cancel.clone())?;
        self.pumps.push(pump);

        self.workers.push(WorkerHandle {
            queue_id,
            direction,
            updates: update_tx,
        });
        Ok(())
    }

    /// 워커를 취소하고 종료를 기다립니다.
    ///
    /// 펌프 스레드는 다음 패킷을 받거나 프로세스가 끝날 때 정리됩니다.
    pub async fn shutdown(mut self) {
        info!("stopping queue engine");
        self.cancel.cancel();
        self.workers.clear();

        while let Some(result) = self.tasks.join_next().await {
            if let Err(e) = result {
                warn!(error = %e, "packet worker task failed");
            }
        }

        let finished = self.pumps.iter().filter(|pump| pump.is_finished()).count();
        info!(
            pumps = self.pumps.len(),
            finished, "queue engine stopped"
        );
    }
}
