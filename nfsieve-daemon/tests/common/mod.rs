//! In-memory queue binder for daemon tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use nfsieve_core::error::QueueError;
use nfsieve_core::queue::{PacketQueue, QueueBinder, QueueMessage, QueueSpec};
use nfsieve_core::types::Verdict;

pub const TIMEOUT: Duration = Duration::from_secs(5);

pub struct Packet(Vec<u8>);

impl QueueMessage for Packet {
    fn packet(&self) -> &[u8] {
        &self.0
    }
}

pub struct ChannelQueue {
    id: u16,
    packets: mpsc::UnboundedReceiver<Vec<u8>>,
    verdicts: mpsc::UnboundedSender<Verdict>,
}

impl PacketQueue for ChannelQueue {
    type Message = Packet;

    fn id(&self) -> u16 {
        self.id
    }

    fn recv(&mut self) -> Result<Packet, QueueError> {
        self.packets
            .blocking_recv()
            .map(Packet)
            .ok_or(QueueError::Closed(self.id))
    }

    fn verdict(&mut self, _message: Packet, verdict: Verdict) -> Result<(), QueueError> {
        self.verdicts.send(verdict).map_err(|_| QueueError::Verdict {
            id: self.id,
            reason: "observer gone".to_owned(),
        })
    }
}

/// Test side of one bound queue.
pub struct Tap {
    packets: mpsc::UnboundedSender<Vec<u8>>,
    verdicts: mpsc::UnboundedReceiver<Verdict>,
}

impl Tap {
    pub async fn judge(&mut self, packet: Vec<u8>) -> Verdict {
        self.packets.send(packet).expect("pump gone");
        tokio::time::timeout(TIMEOUT, self.verdicts.recv())
            .await
            .expect("verdict timed out")
            .expect("queue dropped")
    }
}

pub type Taps = Arc<Mutex<BTreeMap<u16, Tap>>>;

#[derive(Default)]
pub struct ChannelBinder {
    pub busy: BTreeSet<u16>,
    pub taps: Taps,
}

impl QueueBinder for ChannelBinder {
    type Queue = ChannelQueue;

    fn bind(&mut self, id: u16, _spec: &QueueSpec) -> Result<ChannelQueue, QueueError> {
        if self.busy.contains(&id) {
            return Err(QueueError::Busy {
                id,
                reason: "already bound".to_owned(),
            });
        }
        let (packet_tx, packet_rx) = mpsc::unbounded_channel();
        let (verdict_tx, verdict_rx) = mpsc::unbounded_channel();
        self.taps.lock().unwrap().insert(
            id,
            Tap {
                packets: packet_tx,
                verdicts: verdict_rx,
            },
        );
        Ok(ChannelQueue {
            id,
            packets: packet_rx,
            verdicts: verdict_tx,
        })
    }
}

pub fn take_tap(taps: &Taps, id: u16) -> Tap {
    taps.lock()
        .unwrap()
        .remove(&id)
        .unwrap_or_else(|| panic!("queue {id} was not bound"))
}

/// IPv4/UDP packet carrying `payload`.
pub fn udp_v4(payload: &[u8]) -> Vec<u8> {
    let total = 28 + payload.len();
    let mut p = vec![0u8; 28];
    p[0] = 0x45;
    p[2..4].copy_from_slice(&(total as u16).to_be_bytes());
    p[8] = 64;
    p[9] = 17;
    p[12..16].copy_from_slice(&[10, 0, 0, 1]);
    p[16..20].copy_from_slice(&[10, 0, 0, 2]);
    p[24..26].copy_from_slice(&((8 + payload.len()) as u16).to_be_bytes());
    p.extend_from_slice(payload);
    p
}
