//! 패킷 워커 -- 큐 하나의 패킷을 현재 필터 테이블로 판정
//!
//! 워커는 자신만의 `Arc<FilterTable>`을 들고 있으며 전용 업데이트 채널로만
//! 교체합니다. 워커 간 교체 시점은 서로 독립적입니다.
//!
//! # 판정
//! 1. 헤더를 해석할 수 없거나 페이로드가 비어있으면 accept
//! 2. 테이블이 허용하면 accept
//! 3. 거부되면 `BLOCKED` 알림 후 TCP는 FIN/ACK 종료 세그먼트로 교체, 그 외는 drop

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use nfsieve_core::metrics as m;
use nfsieve_core::types::{Direction, Verdict};
use nfsieve_regex_filter::FilterTable;

use crate::event::PacketEvent;
use crate::notice::Notice;
use crate::packet::{self, Transport};
use crate::teardown;

/// 큐 하나를 담당하는 패킷 워커
pub struct PacketWorker {
    queue_id: u16,
    direction: Direction,
    table: Arc<FilterTable>,
    updates: mpsc::Receiver<Arc<FilterTable>>,
    events: mpsc::Receiver<PacketEvent>,
    notices: mpsc::Sender<Notice>,
    cancel: CancellationToken,
}

impl PacketWorker {
    /// 빈(모두 허용) 테이블로 시작하는 워커를 만듭니다.
    pub fn new(
        queue_id: u16,
        direction: Direction,
        updates: mpsc::Receiver<Arc<FilterTable>>,
        events: mpsc::Receiver<PacketEvent>,
        notices: mpsc::Sender<Notice>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            queue_id,
            direction,
            table: Arc::new(FilterTable::empty()),
            updates,
            events,
            notices,
            cancel,
        }
    }

    pub fn queue_id(&self) -> u16 {
        self.queue_id
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// 현재 사용 중인 테이블
    pub fn table(&self) -> &Arc<FilterTable> {
        &self.table
    }

    /// 취소되거나 이벤트 채널이 닫힐 때까지 실행합니다.
    ///
    /// 업데이트 채널이 닫혀도 현재 테이블로 계속 판정합니다.
    pub async fn run(mut self) {
        info!(
            queue_id = self.queue_id,
            direction = self.direction.as_str(),
            "packet worker started"
        );

        let mut updates_open = true;

        loop {
            // 대기 중인 업데이트는 다음 패킷보다 먼저 적용
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => {
                    debug!(queue_id = self.queue_id, "packet worker cancelled");
                    break;
                }
                update = self.updates.recv(), if updates_open => match update {
                    Some(table) => self.adopt(table),
                    None => {
                        debug!(queue_id = self.queue_id, "update channel closed, keeping current table");
                        updates_open = false;
                    }
                },
                event = self.events.recv() => match event {
                    Some(event) => self.handle(event),
                    None => {
                        debug!(queue_id = self.queue_id, "event channel closed");
                        break;
                    }
                },
            }
        }

        info!(
            queue_id = self.queue_id,
            direction = self.direction.as_str(),
            "packet worker stopped"
        );
    }

    fn adopt(&mut self, table: Arc<FilterTable>) {
        debug!(
            queue_id = self.queue_id,
            version = table.version(),
            rules = table.len(),
            "adopting filter table"
        );
        // 이전 테이블 참조는 여기서 해제됨
        self.table = table;
    }

    fn handle(&self, event: PacketEvent) {
        let verdict = self.judge(event.packet());

        metrics::counter!(m::PACKETS_TOTAL, m::LABEL_DIRECTION => self.direction.as_str())
            .increment(1);
        metrics::counter!(
            m::VERDICTS_TOTAL,
            m::LABEL_DIRECTION => self.direction.as_str(),
            m::LABEL_VERDICT => verdict.as_str()
        )
        .increment(1);

        if !event.resolve(verdict) {
            warn!(queue_id = self.queue_id, "queue pump gone before verdict");
        }
    }

    /// 패킷 하나를 판정합니다.
    pub fn judge(&self, bytes: &[u8]) -> Verdict {
        let parsed = match packet::parse(bytes) {
            Ok(parsed) => parsed,
            Err(e) => {
                trace!(queue_id = self.queue_id, error = %e, "unparsable packet, accepting");
                return Verdict::Accept;
            }
        };

        let payload = parsed.payload(bytes);
        if payload.is_empty() {
            return Verdict::Accept;
        }

        let Some(rule) = self.table.evaluate(payload, self.direction) else {
            return Verdict::Accept;
        };

        info!(
            queue_id = self.queue_id,
            direction = self.direction.as_str(),
            token = rule.source(),
            src = %parsed.src,
            dst = %parsed.dst,
            "packet rejected"
        );
        metrics::counter!(m::PACKETS_REJECTED_TOTAL, m::LABEL_DIRECTION => self.direction.as_str())
            .increment(1);
        self.notify(Notice::Blocked(rule.source().to_owned()));

        match parsed.transport {
            Transport::Tcp => match teardown::build_teardown(bytes, &parsed) {
                Ok(segment) => {
                    metrics::counter!(m::TEARDOWNS_TOTAL).increment(1);
                    Verdict::AcceptWith(segment)
                }
                Err(e) => {
                    warn!(queue_id = self.queue_id, error = %e, "teardown failed, dropping packet");
                    metrics::counter!(m::TEARDOWN_FAILURES_TOTAL).increment(1);
                    Verdict::Drop
                }
            },
            Transport::Udp => Verdict::Drop,
        }
    }

    fn notify(&self, notice: Notice) {
        match self.notices.try_send(notice) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                metrics::counter!(m::NOTICES_DROPPED_TOTAL).increment(1);
            }
            Err(TrySendError::Closed(_)) => {
                trace!(queue_id = self.queue_id, "notice channel closed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nfsieve_core::types::Polarity;
    use nfsieve_regex_filter::encode_token;

    fn ipv4(protocol: u8, transport: &[u8], payload: &[u8]) -> Vec<u8> {
        let total = 20 + transport.len() + payload.len();
        let mut p = vec![0u8; 20];
        p[0] = 0x45;
        p[2..4].copy_from_slice(&(total as u16).to_be_bytes());
        p[8] = 64;
        p[9] = protocol;
        p[12..16].copy_from_slice(&[10, 1, 1, 1]);
        p[16..20].copy_from_slice(&[10, 1, 1, 2]);
        p.extend_from_slice(transport);
        p.extend_from_slice(payload);
        p
    }

    fn tcp(payload: &[u8]) -> Vec<u8> {
        let mut h = [0u8; 20];
        h[12] = 5 << 4;
        h[13] = 0x18;
        ipv4(packet::PROTO_TCP, &h, payload)
    }

    fn udp(payload: &[u8]) -> Vec<u8> {
        let mut h = [0u8; 8];
        h[4..6].copy_from_slice(&((8 + payload.len()) as u16).to_be_bytes());
        ipv4(packet::PROTO_UDP, &h, payload)
    }

    fn worker(direction: Direction, tokens: &[String]) -> (PacketWorker, mpsc::Receiver<Notice>) {
        let (_upd_tx, upd_rx) = mpsc::channel(1);
        let (_ev_tx, ev_rx) = mpsc::channel(1);
        let (notice_tx, notice_rx) = mpsc::channel(8);
        let mut worker = PacketWorker::new(
            1000,
            direction,
            upd_rx,
            ev_rx,
            notice_tx,
            CancellationToken::new(),
        );
        worker.adopt(Arc::new(FilterTable::build(tokens)));
        (worker, notice_rx)
    }

    fn deny_bad() -> Vec<String> {
        vec![encode_token(Direction::Input, Polarity::Deny, "bad")]
    }

    #[test]
    fn rejected_tcp_becomes_teardown() {
        let (worker, mut notices) = worker(Direction::Input, &deny_bad());
        let verdict = worker.judge(&tcp(b"some bad data"));

        let segment = match verdict {
            Verdict::AcceptWith(segment) => segment,
            other => panic!("expected replacement, got {other}"),
        };
        assert_eq!(segment.len(), 40);
        assert_eq!(segment[33] & 0x17, teardown::TCP_FIN | teardown::TCP_ACK);
        assert_eq!(
            notices.try_recv().unwrap(),
            Notice::Blocked("i1626164".to_owned())
        );
    }

    #[test]
    fn rejected_udp_is_dropped() {
        let (worker, _notices) = worker(Direction::Input, &deny_bad());
        assert_eq!(worker.judge(&udp(b"bad")), Verdict::Drop);
    }

    #[test]
    fn output_worker_ignores_input_rules() {
        let (worker, mut notices) = worker(Direction::Output, &deny_bad());
        assert_eq!(worker.judge(&tcp(b"bad")), Verdict::Accept);
        assert!(notices.try_recv().is_err());
    }

    #[test]
    fn empty_payload_always_accepted() {
        let tokens = vec![encode_token(Direction::Input, Polarity::Allow, "^never$")];
        let (worker, _notices) = worker(Direction::Input, &tokens);
        assert_eq!(worker.judge(&tcp(b"")), Verdict::Accept);
        assert!(matches!(worker.judge(&tcp(b"x")), Verdict::AcceptWith(_)));
    }

    #[test]
    fn unparsable_packets_accepted() {
        let (worker, _notices) = worker(Direction::Input, &deny_bad());
        assert_eq!(worker.judge(b"bad"), Verdict::Accept);
        // ICMP
        assert_eq!(worker.judge(&ipv4(1, &[8, 0, 0, 0], b"bad")), Verdict::Accept);
    }

    #[test]
    fn full_notice_channel_does_not_block() {
        let (_upd_tx, upd_rx) = mpsc::channel(1);
        let (_ev_tx, ev_rx) = mpsc::channel(1);
        let (notice_tx, _notice_rx) = mpsc::channel(1);
        let mut worker =
            PacketWorker::new(1000, Direction::Input, upd_rx, ev_rx, notice_tx, CancellationToken::new());
        worker.adopt(Arc::new(FilterTable::build(deny_bad())));

        for _ in 0..3 {
            assert_eq!(worker.judge(&udp(b"bad")), Verdict::Drop);
        }
    }

    #[tokio::test]
    async fn run_adopts_updates_between_packets() {
        let (upd_tx, upd_rx) = mpsc::channel(1);
        let (ev_tx, ev_rx) = mpsc::channel(1);
        let (notice_tx, _notice_rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let worker = PacketWorker::new(1000, Direction::Input, upd_rx, ev_rx, notice_tx, cancel.clone());
        let task = tokio::spawn(worker.run());

        let (event, verdict) = PacketEvent::new(Direction::Input, 1000, udp(b"bad").into());
        ev_tx.send(event).await.unwrap();
        assert_eq!(verdict.await.unwrap(), Verdict::Accept);

        upd_tx
            .send(Arc::new(FilterTable::build(deny_bad()).with_version(1)))
            .await
            .unwrap();
        // 채널 용량이 1이므로 두 번째 전송은 첫 업데이트가 소비된 뒤에 완료됨
        upd_tx
            .send(Arc::new(FilterTable::build(deny_bad()).with_version(2)))
            .await
            .unwrap();

        let (event, verdict) = PacketEvent::new(Direction::Input, 1000, udp(b"bad").into());
        ev_tx.send(event).await.unwrap();
        assert_eq!(verdict.await.unwrap(), Verdict::Drop);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn closed_update_channel_keeps_serving() {
        let (upd_tx, upd_rx) = mpsc::channel(1);
        let (ev_tx, ev_rx) = mpsc::channel(1);
        let (notice_tx, _notice_rx) = mpsc::channel(8);
        let worker = PacketWorker::new(
            1001,
            Direction::Output,
            upd_rx,
            ev_rx,
            notice_tx,
            CancellationToken::new(),
        );
        let task = tokio::spawn(worker.run());
        drop(upd_tx);

        let (event, verdict) = PacketEvent::new(Direction::Output, 1001, tcp(b"hi").into());
        ev_tx.send(event).await.unwrap();
        assert_eq!(verdict.await.unwrap(), Verdict::Accept);

        drop(ev_tx);
        task.await.unwrap();
    }
}
