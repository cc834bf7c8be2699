#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//! - [`packet`]: IPv4/IPv6 + TCP/UDP 헤더 파서, 체크섬 계산
//! - [`teardown`]: 거부된 TCP 패킷을 FIN/ACK 종료 세그먼트로 변환
//! - [`allocator`]: 연속된 큐 번호 구간 탐색 및 바인딩
//! - [`event`]: `PacketEvent`와 큐 펌프 스레드
//! - [`worker`]: 큐 하나를 담당하는 `PacketWorker`
//! - [`distributor`]: 제어 라인 → 새 필터 테이블 → 워커 브로드캐스트
//! - [`notice`]: stdout 라인 프로토콜
//! - [`engine`]: 전체 조립 (`QueueEngine`)
//! - `netlink`: Linux NFQUEUE 바인딩

pub mod allocator;
pub mod distributor;
pub mod engine;
pub mod error;
pub mod event;
#[cfg(target_os = "linux")]
pub mod netlink;
pub mod notice;
pub mod packet;
pub mod teardown;
pub mod worker;

// --- 주요 타입 re-export ---

// 엔진
pub use engine::{QueueEngine, QueueEngineBuilder};

// 구성 요소
pub use allocator::{QueueAllocator, QueueBlock};
pub use distributor::{ConfigDistributor, WorkerHandle};
pub use event::PacketEvent;
pub use notice::Notice;
pub use worker::PacketWorker;

// 에러
pub use error::{EngineError, PacketError, TeardownError};

// 커널 바인딩
#[cfg(target_os = "linux")]
pub use netlink::{NetlinkBinder, NetlinkQueue};
