//! Single retry helper parameterised by attempts and a recoverable-error
//! predicate (spec §9 redesign flag: "ad-hoc retry counters with per-try bus
//! clears... extract into a single retry helper").

use seqlab_core::SeqError;
use std::future::Future;

/// How many attempts to make and what to do between them.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
}

impl RetryPolicy {
    /// Spec §4.2: retry up to N=10 on Timeout or on a discrete value outside
    /// the declared set.
    pub const PARAMETER_READ: RetryPolicy = RetryPolicy { attempts: 10 };
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy { attempts: 1 }
    }
}

/// Run `op` up to `policy.attempts` times, calling `between` (typically a bus
/// clear) between failed attempts whose error satisfies `recoverable`.
/// Returns the last error if every attempt fails.
pub async fn with_retries<T, Op, OpFut, Recoverable, Between, BetweenFut>(
    policy: RetryPolicy,
    recoverable: Recoverable,
    mut op: Op,
    mut between: Between,
) -> Result<T, SeqError>
where
    Op: FnMut(u32) -> OpFut,
    OpFut: Future<Output = Result<T, SeqError>>,
    Recoverable: Fn(&SeqError) -> bool,
    Between: FnMut() -> BetweenFut,
    BetweenFut: Future<Output = ()>,
{
    let mut last_err = None;
    for attempt in 0..policy.attempts.max(1) {
        match op(attempt).await {
            Ok(v) => return Ok(v),
            Err(e) if recoverable(&e) && attempt + 1 < policy.attempts => {
                last_err = Some(e);
                between().await;
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap_or(SeqError::AbortRequested))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_until_success() {
        let tries = AtomicU32::new(0);
        let result: Result<u32, SeqError> = with_retries(
            RetryPolicy { attempts: 5 },
            |e| matches!(e, SeqError::TransportTimeout { .. }),
            |_attempt| {
                let n = tries.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(SeqError::TransportTimeout {
                            address: "x".into(),
                        })
                    } else {
                        Ok(42)
                    }
                }
            },
            || async {},
        )
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(tries.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn surfaces_last_error_after_exhausting_attempts() {
        let result: Result<u32, SeqError> = with_retries(
            RetryPolicy { attempts: 3 },
            |_| true,
            |_| async {
                Err(SeqError::TransportTimeout {
                    address: "x".into(),
                })
            },
            || async {},
        )
        .await;
        assert!(matches!(result, Err(SeqError::TransportTimeout { .. })));
    }

    #[tokio::test]
    async fn non_recoverable_error_returns_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, SeqError> = with_retries(
            RetryPolicy { attempts: 5 },
            |_| false,
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(SeqError::BadValue {
                        instrument: "i".into(),
                        parameter: "p".into(),
                        reason: "r".into(),
                    })
                }
            },
            || async {},
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
