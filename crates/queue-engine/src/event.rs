//! 패킷 이벤트와 큐 펌프
//!
//! 큐 펌프는 커널 큐 하나를 소유하는 전용 OS 스레드입니다.
//! `recv → PacketEvent 전송 → 판정 대기 → verdict` 사이클을 반복하며,
//! 큐 안에서는 도착 순서대로 한 번에 한 패킷만 처리합니다.
//!
//! [`PacketEvent::resolve`]가 이벤트를 소비하므로 판정은 이벤트당 한 번뿐입니다.
//! 워커가 판정 없이 이벤트를 버리면 펌프가 accept를 내립니다.

use std::thread::{self, JoinHandle};

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use nfsieve_core::error::QueueError;
use nfsieve_core::metrics as m;
use nfsieve_core::queue::{PacketQueue, QueueMessage};
use nfsieve_core::types::{Direction, Verdict};

/// 가로챈 패킷 하나
#[derive(Debug)]
pub struct PacketEvent {
    direction: Direction,
    queue_id: u16,
    packet: Bytes,
    sink: oneshot::Sender<Verdict>,
}

impl PacketEvent {
    /// 이벤트와 판정 수신자를 만듭니다.
    pub fn new(
        direction: Direction,
        queue_id: u16,
        packet: Bytes,
    ) -> (Self, oneshot::Receiver<Verdict>) {
        let (sink, verdict_rx) = oneshot::channel();
        let event = Self {
            direction,
            queue_id,
            packet,
            sink,
        };
        (event, verdict_rx)
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn queue_id(&self) -> u16 {
        self.queue_id
    }

    /// 네트워크 계층부터 시작하는 원시 패킷
    pub fn packet(&self) -> &[u8] {
        &self.packet
    }

    /// 판정을 돌려줍니다.
    ///
    /// 펌프가 이미 사라졌으면 `false`를 반환합니다.
    pub fn resolve(self, verdict: Verdict) -> bool {
        self.sink.send(verdict).is_ok()
    }
}

/// 큐 펌프 스레드를 시작합니다.
///
/// 스레드는 큐가 닫히거나 워커의 이벤트 채널이 닫히면 종료합니다.
/// `recv`는 무기한 blocking이므로 취소는 패킷 사이에서만 관찰됩니다.
pub fn spawn_pump<Q: PacketQueue>(
    queue: Q,
    direction: Direction,
    events: mpsc::Sender<PacketEvent>,
    cancel: CancellationToken,
) -> std::io::Result<JoinHandle<()>> {
    let name = format!("nfsieve-{}-{}", direction.as_str(), queue.id());
    thread::Builder::new()
        .name(name)
        .spawn(move || run_pump(queue, direction, events, cancel))
}

fn run_pump<Q: PacketQueue>(
    mut queue: Q,
    direction: Direction,
    events: mpsc::Sender<PacketEvent>,
    cancel: CancellationToken,
) {
    let queue_id = queue.id();
    info!(queue_id, direction = direction.as_str(), "queue pump started");

    while !cancel.is_cancelled() {
        let message = match queue.recv() {
            Ok(message) => message,
            Err(QueueError::Closed(_)) => {
                debug!(queue_id, "queue closed");
                break;
            }
            Err(e) => {
                warn!(queue_id, error = %e, "failed to receive packet");
                metrics::counter!(m::QUEUE_ERRORS_TOTAL, m::LABEL_DIRECTION => direction.as_str())
                    .increment(1);
                continue;
            }
        };

        let (event, verdict_rx) =
            PacketEvent::new(direction, queue_id, Bytes::copy_from_slice(message.packet()));

        if events.blocking_send(event).is_err() {
            // 워커 종료: 받은 패킷은 통과시키고 멈춤
            debug!(queue_id, "worker gone, stopping queue pump");
            deliver(&mut queue, message, Verdict::Accept, direction);
            break;
        }

        let verdict = match verdict_rx.blocking_recv() {
            Ok(verdict) => verdict,
            Err(_) => {
                error!(queue_id, "verdict sink dropped without a verdict, accepting packet");
                Verdict::Accept
            }
        };

        deliver(&mut queue, message, verdict, direction);
    }

    info!(queue_id, direction = direction.as_str(), "queue pump stopped");
}

fn deliver<Q: PacketQueue>(queue: &mut Q, message: Q::Message, verdict: Verdict, direction: Direction) {
    if let Err(e) = queue.verdict(message, verdict) {
        warn!(queue_id = queue.id(), error = %e, "failed to deliver verdict");
        metrics::counter!(m::QUEUE_ERRORS_TOTAL, m::LABEL_DIRECTION => direction.as_str())
            .increment(1);
    }
}
