//! 규칙 배포기 -- 제어 라인마다 새 테이블을 만들어 모든 워커에 전달
//!
//! 배포기는 테이블의 유일한 작성자입니다. 한 줄을 적용하는 순서:
//!
//! 1. ASCII 공백으로 토큰 분리, 2자 미만 토큰 제외
//! 2. 다음 버전 번호로 [`FilterTable`] 빌드
//! 3. 등록 순서대로(입력 워커 먼저) 각 워커의 업데이트 채널에 전송, 수락까지 대기
//! 4. 전송이 모두 끝난 뒤 이전 테이블 참조를 해제
//! 5. `ACK OK` 기록
//!
//! 라인은 바이트 단위로 읽습니다. UTF-8이 아닌 바이트는 해당 토큰만 잘못된 토큰으로
//! 만들 뿐이고, 제어 채널 EOF/읽기 실패만 복구할 수 없는 에러입니다.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use nfsieve_core::metrics as m;
use nfsieve_core::types::Direction;
use nfsieve_regex_filter::FilterTable;

use crate::error::EngineError;
use crate::notice::Notice;

/// 배포 대상 워커 하나의 업데이트 채널
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    pub queue_id: u16,
    pub direction: Direction,
    pub updates: mpsc::Sender<Arc<FilterTable>>,
}

/// 제어 채널 루프
pub struct ConfigDistributor {
    workers: Vec<WorkerHandle>,
    previous: Arc<FilterTable>,
    notices: mpsc::Sender<Notice>,
}

impl ConfigDistributor {
    /// 워커 목록(등록 순서 유지)으로 배포기를 만듭니다.
    pub fn new(workers: Vec<WorkerHandle>, notices: mpsc::Sender<Notice>) -> Self {
        Self {
            workers,
            previous: Arc::new(FilterTable::empty()),
            notices,
        }
    }

    /// 마지막으로 배포한 테이블
    pub fn current(&self) -> &Arc<FilterTable> {
        &self.previous
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// 취소되거나 제어 채널이 끝날 때까지 한 줄씩 적용합니다.
    ///
    /// # 에러
    /// - `ControlChannelClosed`: EOF
    /// - `Io`: 읽기 실패
    /// - `WorkerUnavailable`: 워커의 업데이트 채널이 닫힘
    pub async fn run<R>(
        mut self,
        mut reader: R,
        cancel: CancellationToken,
    ) -> Result<(), EngineError>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut buf = Vec::new();

        loop {
            buf.clear();
            let read = tokio::select! {
                () = cancel.cancelled() => {
                    debug!("config distributor cancelled");
                    return Ok(());
                }
                read = reader.read_until(b'\n', &mut buf) => read,
            };

            match read {
                Ok(0) => {
                    error!("control channel reached end of input");
                    return Err(EngineError::ControlChannelClosed);
                }
                Ok(_) => {
                    // 잘못된 바이트는 U+FFFD가 되어 그 토큰의 16진수 디코딩만 실패시킴
                    let line = String::from_utf8_lossy(&buf);
                    self.apply_line(&line).await?;
                }
                Err(e) => {
                    error!(error = %e, "failed to read control channel");
                    return Err(EngineError::Io(e));
                }
            }
        }
    }

    /// 제어 라인 하나를 적용합니다.
    pub async fn apply_line(&mut self, line: &str) -> Result<(), EngineError> {
        let tokens = line.split_ascii_whitespace().filter(|token| {
            let keep = token.chars().nth(1).is_some();
            if !keep {
                trace!(token, "ignoring short token");
            }
            keep
        });

        let version = self.previous.version() + 1;
        let table = Arc::new(FilterTable::build(tokens).with_version(version));
        info!(
            version,
            rules = table.len(),
            skipped = table.skipped(),
            "distributing filter table"
        );

        for worker in &self.workers {
            if worker.updates.send(Arc::clone(&table)).await.is_err() {
                let err = EngineError::WorkerUnavailable {
                    direction: worker.direction,
                    queue_id: worker.queue_id,
                };
                error!(version, error = %err, "filter table broadcast failed");
                self.ack(Notice::AckFail(err.to_string())).await;
                return Err(err);
            }
        }

        // 브로드캐스트가 끝난 뒤에야 이전 테이블을 놓음
        let rules = table.len();
        self.previous = table;

        metrics::counter!(m::RULE_UPDATES_TOTAL).increment(1);
        metrics::gauge!(m::ACTIVE_RULES).set(rules as f64);

        self.ack(Notice::AckOk).await;
        Ok(())
    }

    async fn ack(&self, notice: Notice) {
        if self.notices.send(notice).await.is_err() {
            debug!("notice channel closed, acknowledgement discarded");
        }
    }
}
