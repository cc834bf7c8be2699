//! 필터 규칙 에러 타입
//!
//! [`FilterError`]는 규칙 토큰 하나를 컴파일하는 동안 발생하는 에러입니다.
//! 테이블 빌드 중에는 토큰 단위로 격리되어 경고 로그만 남기고 건너뜁니다.

use nfsieve_core::error::NfsieveError;

/// 규칙 토큰 컴파일 에러
#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    /// 분류 문자 2개보다 짧은 토큰
    #[error("token '{token}' is too short: expected <dir><pol><hex>")]
    TooShort {
        /// 원본 토큰
        token: String,
    },

    /// 알 수 없는 극성 문자
    #[error("token '{token}': invalid polarity '{found}', expected '0' (allow) or '1' (deny)")]
    InvalidPolarity {
        /// 원본 토큰
        token: String,
        /// 발견된 문자
        found: char,
    },

    /// 16진수 디코딩 실패
    #[error("token '{token}': invalid hex pattern: {reason}")]
    InvalidHex {
        /// 원본 토큰
        token: String,
        /// 실패 사유
        reason: String,
    },

    /// 정규식 컴파일 실패
    #[error("pattern '{pattern}' failed to compile: {source}")]
    InvalidPattern {
        /// 디코딩된 패턴 텍스트
        pattern: String,
        /// 정규식 엔진 에러
        #[source]
        source: regex::Error,
    },
}

impl From<FilterError> for NfsieveError {
    fn from(err: FilterError) -> Self {
        NfsieveError::Filter(err.to_string())
    }
}
