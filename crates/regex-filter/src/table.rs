//! 필터 테이블 -- 방향 × 극성으로 분할된 불변 규칙 스냅샷
//!
//! [`FilterTable`]은 한 번 게시되면 변경되지 않습니다. 업데이트는 항상 새 테이블을
//! 만들어 `Arc<FilterTable>`로 교체합니다. 마지막 참조가 사라질 때 컴파일된
//! 정규식 자원이 해제됩니다.
//!
//! # 평가 순서
//!
//! 1. 해당 방향의 deny 목록: 첫 매칭 규칙이 거부 사유
//! 2. allow 목록이 비어있지 않고 아무것도 매칭되지 않으면 첫 allow 규칙이 거부 사유
//! 3. 그 외에는 허용 (빈 테이블은 모두 허용)

use tracing::{debug, warn};

use nfsieve_core::metrics as m;
use nfsieve_core::types::{Direction, Polarity};

use crate::rule::FilterRule;

/// 불변 필터 규칙 스냅샷
#[derive(Debug, Default)]
pub struct FilterTable {
    /// 0은 시작 시의 빈 테이블
    version: u64,
    input_allow: Vec<FilterRule>,
    input_deny: Vec<FilterRule>,
    output_allow: Vec<FilterRule>,
    output_deny: Vec<FilterRule>,
    /// 컴파일에 실패해 건너뛴 토큰 수
    skipped: usize,
}

impl FilterTable {
    /// 모든 패킷을 허용하는 빈 테이블 (version 0)
    pub fn empty() -> Self {
        Self::default()
    }

    /// 토큰 목록을 컴파일하여 테이블을 만듭니다.
    ///
    /// 실패한 토큰은 `warn!` 로그를 남기고 건너뜁니다. 업데이트 전체가
    /// 실패하는 경우는 없습니다. 2자 미만 토큰의 필터링은 호출자 책임입니다.
    pub fn build<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut table = Self::empty();

        for token in tokens {
            let token = token.as_ref();
            match FilterRule::compile(token) {
                Ok(rule) => table.push(rule),
                Err(e) => {
                    warn!(token, error = %e, "skipping malformed rule token");
                    metrics::counter!(m::RULE_PARSE_ERRORS_TOTAL).increment(1);
                    table.skipped += 1;
                }
            }
        }

        table
    }

    /// 버전 번호를 지정합니다.
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    fn push(&mut self, rule: FilterRule) {
        let group = match (rule.direction(), rule.polarity()) {
            (Direction::Input, Polarity::Allow) => &mut self.input_allow,
            (Direction::Input, Polarity::Deny) => &mut self.input_deny,
            (Direction::Output, Polarity::Allow) => &mut self.output_allow,
            (Direction::Output, Polarity::Deny) => &mut self.output_deny,
        };
        group.push(rule);
    }

    /// 페이로드를 평가하여 거부 사유가 된 규칙을 반환합니다.
    ///
    /// `None`이면 허용입니다.
    pub fn evaluate(&self, payload: &[u8], direction: Direction) -> Option<&FilterRule> {
        if let Some(rule) = self
            .rules(direction, Polarity::Deny)
            .iter()
            .find(|rule| rule.is_match(payload))
        {
            return Some(rule);
        }

        let allow = self.rules(direction, Polarity::Allow);
        if allow.is_empty() || allow.iter().any(|rule| rule.is_match(payload)) {
            None
        } else {
            allow.first()
        }
    }

    /// 페이로드가 허용되면 `true`
    pub fn check(&self, payload: &[u8], direction: Direction) -> bool {
        self.evaluate(payload, direction).is_none()
    }

    /// 분류별 규칙 목록 (삽입 순서)
    pub fn rules(&self, direction: Direction, polarity: Polarity) -> &[FilterRule] {
        match (direction, polarity) {
            (Direction::Input, Polarity::Allow) => &self.input_allow,
            (Direction::Input, Polarity::Deny) => &self.input_deny,
            (Direction::Output, Polarity::Allow) => &self.output_allow,
            (Direction::Output, Polarity::Deny) => &self.output_deny,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// 전체 규칙 수
    pub fn len(&self) -> usize {
        self.input_allow.len()
            + self.input_deny.len()
            + self.output_allow.len()
            + self.output_deny.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 빌드 중 건너뛴 토큰 수
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl Drop for FilterTable {
    fn drop(&mut self) {
        if !self.is_empty() {
            debug!(
                version = self.version,
                rules = self.len(),
                "releasing filter table"
            );
        }
    }
}
