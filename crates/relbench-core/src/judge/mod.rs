pub mod parse;
pub mod prompt;
pub mod retry;

pub use parse::parse_score_and_reason;
pub use retry::call_with_retry;
