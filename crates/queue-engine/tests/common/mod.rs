//! 통합 테스트 공용 도구: 인메모리 큐 바인더와 패킷 생성기

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use nfsieve_core::error::QueueError;
use nfsieve_core::queue::{PacketQueue, QueueBinder, QueueMessage, QueueSpec};
use nfsieve_core::types::Verdict;

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// 큐 메시지 (원시 패킷)
pub struct MockMessage(Vec<u8>);

impl QueueMessage for MockMessage {
    fn packet(&self) -> &[u8] {
        &self.0
    }
}

/// 테스트가 패킷을 넣고 판정을 읽는 인메모리 큐
pub struct MockQueue {
    id: u16,
    packets: mpsc::UnboundedReceiver<Vec<u8>>,
    verdicts: mpsc::UnboundedSender<Verdict>,
    released: Arc<Mutex<Vec<u16>>>,
}

impl PacketQueue for MockQueue {
    type Message = MockMessage;

    fn id(&self) -> u16 {
        self.id
    }

    fn recv(&mut self) -> Result<MockMessage, QueueError> {
        // 펌프 스레드는 런타임 밖이므로 blocking 수신 가능
        self.packets
            .blocking_recv()
            .map(MockMessage)
            .ok_or(QueueError::Closed(self.id))
    }

    fn verdict(&mut self, _message: MockMessage, verdict: Verdict) -> Result<(), QueueError> {
        self.verdicts.send(verdict).map_err(|_| QueueError::Verdict {
            id: self.id,
            reason: "observer gone".to_owned(),
        })
    }
}

impl Drop for MockQueue {
    fn drop(&mut self) {
        if let Ok(mut released) = self.released.lock() {
            released.push(self.id);
        }
    }
}

/// 테스트 측 큐 손잡이
pub struct QueueTap {
    pub id: u16,
    packets: mpsc::UnboundedSender<Vec<u8>>,
    verdicts: mpsc::UnboundedReceiver<Verdict>,
}

impl QueueTap {
    /// 패킷 하나를 넣고 판정을 기다립니다.
    pub async fn judge(&mut self, packet: Vec<u8>) -> Verdict {
        self.packets.send(packet).expect("pump gone");
        tokio::time::timeout(TIMEOUT, self.verdicts.recv())
            .await
            .expect("verdict timed out")
            .expect("queue dropped")
    }
}

/// 지정 번호는 경합으로 거절하고 나머지는 인메모리 큐로 바인딩
#[derive(Default)]
pub struct MockBinder {
    busy: BTreeSet<u16>,
    taps: Arc<Mutex<Vec<QueueTap>>>,
    released: Arc<Mutex<Vec<u16>>>,
    attempts: Arc<Mutex<Vec<u16>>>,
}

impl MockBinder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_busy(busy: &[u16]) -> Self {
        Self {
            busy: busy.iter().copied().collect(),
            ..Self::default()
        }
    }

    /// 바인더가 엔진으로 옮겨진 뒤에도 상태를 볼 수 있는 관찰자
    pub fn observer(&self) -> BinderObserver {
        BinderObserver {
            taps: Arc::clone(&self.taps),
            released: Arc::clone(&self.released),
            attempts: Arc::clone(&self.attempts),
        }
    }
}

impl QueueBinder for MockBinder {
    type Queue = MockQueue;

    fn bind(&mut self, id: u16, _spec: &QueueSpec) -> Result<MockQueue, QueueError> {
        self.attempts.lock().unwrap().push(id);
        if self.busy.contains(&id) {
            return Err(QueueError::Busy {
                id,
                reason: "already bound".to_owned(),
            });
        }

        let (packet_tx, packet_rx) = mpsc::unbounded_channel();
        let (verdict_tx, verdict_rx) = mpsc::unbounded_channel();
        self.taps.lock().unwrap().push(QueueTap {
            id,
            packets: packet_tx,
            verdicts: verdict_rx,
        });
        Ok(MockQueue {
            id,
            packets: packet_rx,
            verdicts: verdict_tx,
            released: Arc::clone(&self.released),
        })
    }
}

#[derive(Clone)]
pub struct BinderObserver {
    taps: Arc<Mutex<Vec<QueueTap>>>,
    released: Arc<Mutex<Vec<u16>>>,
    attempts: Arc<Mutex<Vec<u16>>>,
}

impl BinderObserver {
    /// 큐 번호의 손잡이를 꺼냅니다.
    pub fn take_tap(&self, id: u16) -> QueueTap {
        let mut taps = self.taps.lock().unwrap();
        let index = taps
            .iter()
            .position(|tap| tap.id == id)
            .unwrap_or_else(|| panic!("queue {id} was not bound"));
        taps.swap_remove(index)
    }

    pub fn bound_ids(&self) -> Vec<u16> {
        let mut ids: Vec<u16> = self.taps.lock().unwrap().iter().map(|t| t.id).collect();
        ids.sort_unstable();
        ids
    }

    pub fn released(&self) -> Vec<u16> {
        let mut ids = self.released.lock().unwrap().clone();
        ids.sort_unstable();
        ids
    }

    pub fn attempts(&self) -> Vec<u16> {
        self.attempts.lock().unwrap().clone()
    }
}

// --- 패킷 생성기 ---

pub const PROTO_TCP: u8 = 6;
pub const PROTO_UDP: u8 = 17;

fn tcp_header(flags: u8) -> Vec<u8> {
    let mut h = vec![0u8; 20];
    h[0..2].copy_from_slice(&40000u16.to_be_bytes());
    h[2..4].copy_from_slice(&80u16.to_be_bytes());
    h[4..8].copy_from_slice(&7u32.to_be_bytes());
    h[8..12].copy_from_slice(&9u32.to_be_bytes());
    h[12] = 5 << 4;
    h[13] = flags;
    h[14..16].copy_from_slice(&1024u16.to_be_bytes());
    h
}

fn udp_header(payload_len: usize) -> Vec<u8> {
    let mut h = vec![0u8; 8];
    h[0..2].copy_from_slice(&5353u16.to_be_bytes());
    h[2..4].copy_from_slice(&53u16.to_be_bytes());
    h[4..6].copy_from_slice(&((8 + payload_len) as u16).to_be_bytes());
    h
}

fn ipv4(protocol: u8, transport: Vec<u8>, payload: &[u8]) -> Vec<u8> {
    let total = 20 + transport.len() + payload.len();
    let mut p = vec![0u8; 20];
    p[0] = 0x45;
    p[2..4].copy_from_slice(&(total as u16).to_be_bytes());
    p[8] = 64;
    p[9] = protocol;
    p[12..16].copy_from_slice(&[10, 0, 0, 1]);
    p[16..20].copy_from_slice(&[10, 0, 0, 2]);
    p.extend_from_slice(&transport);
    p.extend_from_slice(payload);
    p
}

fn ipv6(next: u8, transport: Vec<u8>, payload: &[u8]) -> Vec<u8> {
    let mut p = vec![0u8; 40];
    p[0] = 0x60;
    p[4..6].copy_from_slice(&((transport.len() + payload.len()) as u16).to_be_bytes());
    p[6] = next;
    p[7] = 64;
    p[8..24].copy_from_slice(&[0xfd, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]);
    p[24..40].copy_from_slice(&[0xfd, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 2]);
    p.extend_from_slice(&transport);
    p.extend_from_slice(payload);
    p
}

/// PSH|ACK 세그먼트
pub fn tcp_v4(payload: &[u8]) -> Vec<u8> {
    ipv4(PROTO_TCP, tcp_header(0x18), payload)
}

pub fn udp_v4(payload: &[u8]) -> Vec<u8> {
    ipv4(PROTO_UDP, udp_header(payload.len()), payload)
}

pub fn tcp_v6(payload: &[u8]) -> Vec<u8> {
    ipv6(PROTO_TCP, tcp_header(0x18), payload)
}

pub fn udp_v6(payload: &[u8]) -> Vec<u8> {
    ipv6(PROTO_UDP, udp_header(payload.len()), payload)
}

/// TCP 플래그 바이트 (IPv4, 옵션 없는 헤더 기준)
pub fn tcp_v4_flags(packet: &[u8]) -> u8 {
    packet[20 + 13]
}
