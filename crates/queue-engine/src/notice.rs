//! stdout 라인 프로토콜
//!
//! 컨트롤러는 프로세스의 stdout을 한 줄씩 읽습니다. 모든 알림은 단일
//! 채널을 거쳐 [`write_notices`] 하나가 기록하므로 줄이 섞이지 않습니다.

use std::fmt;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

/// stdout으로 내보내는 알림 한 줄
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// 바인딩된 큐 구간 (시작 시 한 번)
    Queues {
        input: (u16, u16),
        output: (u16, u16),
    },
    /// 규칙에 의해 거부된 패킷 (원본 토큰)
    Blocked(String),
    /// 제어 라인 적용 완료
    AckOk,
    /// 제어 라인 적용 실패
    AckFail(String),
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queues { input, output } => write!(
                f,
                "QUEUE INPUT {} {} OUTPUT {} {}",
                input.0, input.1, output.0, output.1
            ),
            Self::Blocked(token) => write!(f, "BLOCKED {token}"),
            Self::AckOk => f.write_str("ACK OK"),
            // 사유가 여러 줄이면 프로토콜이 깨짐
            Self::AckFail(reason) => write!(f, "ACK FAIL {}", reason.replace(['\r', '\n'], " ")),
        }
    }
}

/// 채널이 닫힐 때까지 알림을 한 줄씩 기록합니다.
///
/// 줄마다 flush 합니다.
pub async fn write_notices<W>(mut rx: mpsc::Receiver<Notice>, mut writer: W) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(notice) = rx.recv().await {
        let line = format!("{notice}\n");
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
    }
    Ok(())
}
