//! 설정 관리 — nfsieve.toml 파싱 및 런타임 설정
//!
//! [`NfsieveConfig`]는 데몬과 모든 모듈의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`NFSIEVE_QUEUE_COUNT=4` 형식)
//! 3. 설정 파일 (`nfsieve.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), nfsieve_core::error::NfsieveError> {
//! use nfsieve_core::config::NfsieveConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = NfsieveConfig::load("nfsieve.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = NfsieveConfig::parse("[queue]\ncount = 4")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, NfsieveError};
use crate::queue::QueueSpec;

/// 첫 번째 후보 큐 번호
pub const QUEUE_BASE_ID: u16 = 1000;

/// 큐 번호 상한 (배타적). 할당된 번호는 항상 `[QUEUE_BASE_ID, QUEUE_ID_LIMIT)` 안에 있습니다.
pub const QUEUE_ID_LIMIT: u32 = 65535;

/// nfsieve 통합 설정
///
/// `nfsieve.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NfsieveConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 커널 큐 설정
    #[serde(default)]
    pub queue: QueueConfig,
    /// 제어 채널 설정
    #[serde(default)]
    pub control: ControlConfig,
    /// 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl NfsieveConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, NfsieveError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    ///
    /// 검증하지 않습니다. 오버라이드를 모두 병합한 뒤 `validate()`를 한 번 호출하세요.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, NfsieveError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                NfsieveError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                NfsieveError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, NfsieveError> {
        toml::from_str(toml_str).map_err(|e| {
            NfsieveError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `NFSIEVE_{SECTION}_{FIELD}`
    /// 예: `NFSIEVE_QUEUE_FAIL_OPEN=true`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "NFSIEVE_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "NFSIEVE_GENERAL_LOG_FORMAT");

        // Queue
        override_u16(&mut self.queue.count, "NFSIEVE_QUEUE_COUNT");
        override_u16(&mut self.queue.base_id, "NFSIEVE_QUEUE_BASE_ID");
        override_u32(&mut self.queue.capacity, "NFSIEVE_QUEUE_CAPACITY");
        override_u16(
            &mut self.queue.max_packet_size,
            "NFSIEVE_QUEUE_MAX_PACKET_SIZE",
        );
        override_bool(&mut self.queue.fail_open, "NFSIEVE_QUEUE_FAIL_OPEN");

        // Control
        override_usize(
            &mut self.control.notice_capacity,
            "NFSIEVE_CONTROL_NOTICE_CAPACITY",
        );

        // Metrics
        override_bool(&mut self.metrics.enabled, "NFSIEVE_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "NFSIEVE_METRICS_LISTEN_ADDR");
        override_u16(&mut self.metrics.port, "NFSIEVE_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), NfsieveError> {
        // log_level 검증
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        // log_format 검증
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.queue.count == 0 {
            return Err(invalid("queue.count", "must be at least 1".to_owned()));
        }

        if self.queue.base_id < QUEUE_BASE_ID {
            return Err(invalid(
                "queue.base_id",
                format!("must be at least {QUEUE_BASE_ID}"),
            ));
        }

        // 시작 윈도우조차 상한을 넘으면 할당이 불가능
        if u32::from(self.queue.base_id) + u32::from(self.queue.count) > QUEUE_ID_LIMIT {
            return Err(invalid(
                "queue.count",
                format!(
                    "{} queues starting at {} exceed the queue id space",
                    self.queue.count, self.queue.base_id
                ),
            ));
        }

        if self.queue.capacity == 0 {
            return Err(invalid("queue.capacity", "must be at least 1".to_owned()));
        }

        if self.queue.max_packet_size < 64 {
            return Err(invalid(
                "queue.max_packet_size",
                "must be at least 64 bytes".to_owned(),
            ));
        }

        if self.control.notice_capacity == 0 {
            return Err(invalid(
                "control.notice_capacity",
                "must be at least 1".to_owned(),
            ));
        }

        if self.metrics.enabled && self.metrics.endpoint != "/metrics" {
            return Err(invalid(
                "metrics.endpoint",
                "only '/metrics' is supported".to_owned(),
            ));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: String) -> NfsieveError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason,
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
        }
    }
}

/// 커널 큐 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// 방향별 큐 개수
    pub count: u16,
    /// 탐색을 시작할 큐 번호
    pub base_id: u16,
    /// 커널 측 큐 최대 길이 (패킷 수)
    pub capacity: u32,
    /// 유저스페이스로 복사할 최대 패킷 크기 (바이트)
    pub max_packet_size: u16,
    /// 큐가 가득 찼을 때 통과 여부 (fail-open)
    pub fail_open: bool,
}

impl QueueConfig {
    /// 바인딩 파라미터로 변환합니다.
    pub fn spec(&self) -> QueueSpec {
        QueueSpec {
            capacity: self.capacity,
            max_packet_size: self.max_packet_size,
            fail_open: self.fail_open,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            count: 1,
            base_id: QUEUE_BASE_ID,
            capacity: 100,
            max_packet_size: u16::MAX,
            fail_open: false,
        }
    }
}

/// 제어 채널 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// stdout 알림(BLOCKED/ACK) 채널 용량
    pub notice_capacity: usize,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            notice_capacity: 1024,
        }
    }
}

/// 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prometheus 엔드포인트 활성화 여부
    pub enabled: bool,
    /// 수신 주소
    pub listen_addr: String,
    /// 수신 포트
    pub port: u16,
    /// 스크레이프 경로
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9464,
            endpoint: "/metrics".to_owned(),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    override_parsed(target, env_key, "bool");
}

fn override_u16(target: &mut u16, env_key: &str) {
    override_parsed(target, env_key, "u16");
}

fn override_u32(target: &mut u32, env_key: &str) {
    override_parsed(target, env_key, "u32");
}

fn override_usize(target: &mut usize, env_key: &str) {
    override_parsed(target, env_key, "usize");
}

fn override_parsed<T: std::str::FromStr>(target: &mut T, env_key: &str, type_name: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                expected = type_name,
                "failed to parse env var, ignoring"
            ),
        }
    }
}
