//! リトライ制御
//!
//! - 最大2回試行
//! - クォータ系の失敗は5秒、それ以外は2秒待って再試行
//! - 最後の試行の後は待たない

use crate::error::Result;
use std::time::Duration;
use tracing::{error, info, warn};

/// 失敗の分類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// レート制限・クォータ超過（一時的）
    Quota,
    Other,
}

const QUOTA_SIGNALS: &[&str] = &["429", "quota", "rate limit", "resource_exhausted"];

impl FailureKind {
    /// エラーメッセージからクォータ系かどうかを判定する（大文字小文字無視）
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        if QUOTA_SIGNALS.iter().any(|s| lower.contains(s)) {
            FailureKind::Quota
        } else {
            FailureKind::Other
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub quota_backoff: Duration,
    pub other_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            quota_backoff: Duration::from_secs(5),
            other_backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self, kind: FailureKind) -> Duration {
        match kind {
            FailureKind::Quota => self.quota_backoff,
            FailureKind::Other => self.other_backoff,
        }
    }
}

/// 待機処理（テストでは記録用の実装に差し替える）
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// スレッドをブロックして待つ
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// 全試行が失敗したときの情報
#[derive(Debug, Clone)]
pub struct RetryExhausted {
    pub attempts: u32,
    pub last_error: String,
    pub last_kind: FailureKind,
}

/// `op` を最大 `policy.max_attempts` 回実行する
///
/// # Arguments
/// * `label` - ログ表示用の処理名
/// * `op` - 試行番号（1始まり）を受け取る処理
pub fn run_with_retry<T, F>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    label: &str,
    mut op: F,
) -> std::result::Result<T, RetryExhausted>
where
    F: FnMut(u32) -> Result<T>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut last = RetryExhausted {
        attempts: 0,
        last_error: String::new(),
        last_kind: FailureKind::Other,
    };

    for attempt in 1..=max_attempts {
        info!("{} Attempt {}/{}", label, attempt, max_attempts);

        match op(attempt) {
            Ok(value) => return Ok(value),
            Err(e) => {
                let message = e.to_string();
                let kind = FailureKind::classify(&message);
                warn!("Attempt {} failed: {}", attempt, message);
                last = RetryExhausted {
                    attempts: attempt,
                    last_error: message,
                    last_kind: kind,
                };

                if attempt < max_attempts {
                    if kind == FailureKind::Quota {
                        error!("Quota exceeded. Waiting before retry...");
                    }
                    sleeper.sleep(policy.backoff(kind));
                }
            }
        }
    }

    Err(last)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::AppError;
    use std::cell::{Cell, RefCell};

    /// 待機時間を記録するだけのスリーパー
    #[derive(Default)]
    pub(crate) struct RecordingSleeper {
        pub sleeps: RefCell<Vec<Duration>>,
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) {
            self.sleeps.borrow_mut().push(duration);
        }
    }

    #[test]
    fn test_classify_failure() {
        assert_eq!(FailureKind::classify("HTTP 429 Too Many Requests"), FailureKind::Quota);
        assert_eq!(FailureKind::classify("Quota exceeded for metric"), FailureKind::Quota);
        assert_eq!(FailureKind::classify("RESOURCE_EXHAUSTED"), FailureKind::Quota);
        assert_eq!(FailureKind::classify("connection reset"), FailureKind::Other);
    }

    #[test]
    fn test_generic_failure_retries_once() {
        let sleeper = RecordingSleeper::default();
        let calls = Cell::new(0);

        let result: std::result::Result<(), _> =
            run_with_retry(&RetryPolicy::default(), &sleeper, "Analysis", |_| {
                calls.set(calls.get() + 1);
                Err(AppError::ApiCall("connection reset".into()))
            });

        let exhausted = result.unwrap_err();
        assert_eq!(calls.get(), 2);
        assert_eq!(exhausted.attempts, 2);
        assert_eq!(exhausted.last_kind, FailureKind::Other);
        assert_eq!(*sleeper.sleeps.borrow(), vec![Duration::from_secs(2)]);
    }

    #[test]
    fn test_quota_failure_waits_longer() {
        let sleeper = RecordingSleeper::default();

        let result: std::result::Result<(), _> =
            run_with_retry(&RetryPolicy::default(), &sleeper, "Analysis", |_| {
                Err(AppError::ApiCall("Gemini API error 429: Quota exceeded".into()))
            });

        assert_eq!(result.unwrap_err().last_kind, FailureKind::Quota);
        assert_eq!(*sleeper.sleeps.borrow(), vec![Duration::from_secs(5)]);
    }

    #[test]
    fn test_success_on_second_attempt() {
        let sleeper = RecordingSleeper::default();

        let result = run_with_retry(&RetryPolicy::default(), &sleeper, "Extraction", |attempt| {
            if attempt == 1 {
                Err(AppError::ApiParse("JSONが見つかりません".into()))
            } else {
                Ok(attempt)
            }
        });

        assert_eq!(result.unwrap(), 2);
        assert_eq!(sleeper.sleeps.borrow().len(), 1);
    }
}
