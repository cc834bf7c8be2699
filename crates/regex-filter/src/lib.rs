#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`rule`]: 규칙 토큰 디코딩/컴파일 ([`FilterRule`])
//! - [`table`]: 방향 × 극성으로 분할된 불변 스냅샷 ([`FilterTable`])
//! - [`error`]: 도메인 에러 타입
//!
//! # 데이터 흐름
//!
//! ```text
//! control line ──split──▶ tokens ──FilterRule::compile──▶ FilterTable::build ──▶ Arc<FilterTable>
//!                                        │
//!                                   실패 시 warn! 후 건너뜀
//! ```

pub mod error;
pub mod rule;
pub mod table;

// --- 주요 타입 re-export ---

pub use error::FilterError;
pub use rule::{FilterRule, encode_token};
pub use table::FilterTable;
