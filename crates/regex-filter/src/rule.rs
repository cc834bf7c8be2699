//! 규칙 컴파일러 -- 토큰 디코딩 및 정규식 컴파일
//!
//! [`FilterRule::compile`]은 제어 채널 토큰 하나(`<dir><pol><hex>`)를
//! 방향/극성 분류와 컴파일된 정규식으로 변환합니다.
//!
//! 페이로드는 임의의 바이너리이므로 `regex::bytes`를 유니코드 모드 없이 사용합니다.
//! 이 모드에서 `.`은 개행을 제외한 모든 바이트와 매칭됩니다.

use std::fmt;

use regex::bytes::{Regex, RegexBuilder};

use nfsieve_core::types::{Direction, Polarity};

use crate::error::FilterError;

/// 컴파일된 필터 규칙
///
/// 생성 후 불변이며, 자신을 컴파일한 [`FilterTable`](crate::FilterTable)이 소유합니다.
#[derive(Debug, Clone)]
pub struct FilterRule {
    /// 컴파일된 패턴
    pattern: Regex,
    /// 제어 채널에서 받은 원본 토큰 (BLOCKED 알림의 식별자)
    source: String,
    /// 적용 방향
    direction: Direction,
    /// 극성
    polarity: Polarity,
}

impl FilterRule {
    /// 토큰 하나를 컴파일합니다.
    ///
    /// # 에러
    /// - `TooShort`: 분류 문자 2개가 없음
    /// - `InvalidPolarity`: 두 번째 문자가 `'0'`/`'1'`이 아님
    /// - `InvalidHex`: 홀수 길이 또는 16진수가 아닌 문자
    /// - `InvalidPattern`: 정규식 문법 오류
    pub fn compile(token: &str) -> Result<Self, FilterError> {
        let mut chars = token.chars();
        let (Some(dir), Some(pol)) = (chars.next(), chars.next()) else {
            return Err(FilterError::TooShort {
                token: token.to_owned(),
            });
        };

        let direction = if dir.eq_ignore_ascii_case(&'i') {
            Direction::Input
        } else {
            Direction::Output
        };

        let polarity = match pol {
            '1' => Polarity::Deny,
            '0' => Polarity::Allow,
            found => {
                return Err(FilterError::InvalidPolarity {
                    token: token.to_owned(),
                    found,
                });
            }
        };

        let raw = decode_hex(chars.as_str()).map_err(|reason| FilterError::InvalidHex {
            token: token.to_owned(),
            reason,
        })?;
        let text = pattern_text(raw);

        let pattern = RegexBuilder::new(&text)
            .unicode(false)
            .build()
            .map_err(|source| FilterError::InvalidPattern {
                pattern: text.clone(),
                source,
            })?;

        Ok(Self {
            pattern,
            source: token.to_owned(),
            direction,
            polarity,
        })
    }

    /// 페이로드 어딘가에 패턴이 매칭되는지 검사합니다.
    pub fn is_match(&self, payload: &[u8]) -> bool {
        self.pattern.is_match(payload)
    }

    /// 원본 토큰
    pub fn source(&self) -> &str {
        &self.source
    }

    /// 디코딩된 패턴 텍스트
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// 적용 방향
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// 극성
    pub fn polarity(&self) -> Polarity {
        self.polarity
    }
}

impl fmt::Display for FilterRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} /{}/",
            self.direction,
            self.polarity,
            self.pattern.as_str()
        )
    }
}

/// 패턴 텍스트와 분류로 제어 채널 토큰을 만듭니다.
///
/// 컨트롤러 측 인코딩과 동일합니다. 출력 방향은 `o`를 사용합니다.
pub fn encode_token(direction: Direction, polarity: Polarity, pattern: &str) -> String {
    let dir = match direction {
        Direction::Input => 'i',
        Direction::Output => 'o',
    };
    let pol = match polarity {
        Polarity::Deny => '1',
        Polarity::Allow => '0',
    };

    let mut token = String::with_capacity(2 + pattern.len() * 2);
    token.push(dir);
    token.push(pol);
    for byte in pattern.as_bytes() {
        token.push_str(&format!("{byte:02x}"));
    }
    token
}

/// 디코딩된 바이트를 정규식 텍스트로 옮깁니다.
///
/// UTF-8이 아닌 바이트는 `\xNN` 이스케이프가 됩니다. 유니코드 모드가 꺼져 있으므로
/// 이 이스케이프는 원시 바이트 하나와 매칭됩니다.
fn pattern_text(raw: Vec<u8>) -> String {
    let raw = match String::from_utf8(raw) {
        Ok(text) => return text,
        Err(e) => e.into_bytes(),
    };

    let mut text = String::with_capacity(raw.len() * 4);
    for chunk in raw.utf8_chunks() {
        text.push_str(chunk.valid());
        for byte in chunk.invalid() {
            text.push_str(&format!("\\x{byte:02x}"));
        }
    }
    text
}

/// 16진수 문자열을 바이트로 디코딩합니다 (대소문자 허용).
fn decode_hex(hex: &str) -> Result<Vec<u8>, String> {
    let digits = hex.as_bytes();
    if digits.len() % 2 != 0 {
        return Err(format!("odd number of digits ({})", digits.len()));
    }

    let nibble = |b: u8| -> Option<u8> {
        match b {
            b'0'..=b'9' => Some(b - b'0'),
            b'a'..=b'f' => Some(b - b'a' + 10),
            b'A'..=b'F' => Some(b - b'A' + 10),
            _ => None,
        }
    };

    digits
        .chunks_exact(2)
        .enumerate()
        .map(|(idx, pair)| match (nibble(pair[0]), nibble(pair[1])) {
            (Some(hi), Some(lo)) => Ok((hi << 4) | lo),
            _ => Err(format!("invalid hex digit at offset {}", idx * 2)),
        })
        .collect()
}
