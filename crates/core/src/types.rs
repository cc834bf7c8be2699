//! 도메인 타입 — 시스템 전역에서 사용되는 공통 타입
//!
//! 필터 규칙, 큐 할당기, 패킷 워커가 공유하는 분류/판정 타입을 정의합니다.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// 트래픽 방향
///
/// 어느 큐 블록이 패킷을 전달했는지로 결정됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// 로컬 호스트로 들어오는 트래픽
    Input,
    /// 로컬 호스트에서 나가는 트래픽
    Output,
}

impl Direction {
    /// 모든 방향 (할당/등록 순서: 입력 먼저)
    pub const ALL: [Direction; 2] = [Direction::Input, Direction::Output];

    /// 메트릭 레이블 및 로그용 문자열
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 규칙 극성
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    /// 화이트리스트: 매칭되지 않으면 거부
    Allow,
    /// 블랙리스트: 매칭되면 거부
    Deny,
}

impl Polarity {
    /// 로그용 문자열
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
        }
    }
}

impl fmt::Display for Polarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 가로챈 패킷 하나에 대한 최종 처분
///
/// 커널 협력자는 이벤트마다 정확히 하나의 판정을 받아야 합니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// 원본 그대로 통과
    Accept,
    /// 대체 바이트로 교체하여 통과
    AcceptWith(Bytes),
    /// 폐기
    Drop,
}

impl Verdict {
    /// 메트릭 레이블 및 로그용 문자열
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::AcceptWith(_) => "accept_with",
            Self::Drop => "drop",
        }
    }

    /// 교체 바이트 (있을 경우)
    pub fn replacement(&self) -> Option<&Bytes> {
        match self {
            Self::AcceptWith(bytes) => Some(bytes),
            _ => None,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AcceptWith(bytes) => write!(f, "accept_with({} bytes)", bytes.len()),
            other => f.write_str(other.as_str()),
        }
    }
}
