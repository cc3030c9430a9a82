use std::path::Path;
use std::time::Duration;

use image::error::{ImageError, LimitErrorKind};

use crate::errors::{LaneSegError, Result};
use crate::traits::Sleeper;

/// Bounded retry with quadratic backoff for reads that fail under memory pressure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Attempt `n` is followed by a pause of `n² * base_delay`.
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Pause after the given 1-based failed attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(attempt.saturating_mul(attempt))
    }

    /// Run `read` until it succeeds, fails for a reason other than memory, or the
    /// attempt budget runs out.
    pub fn run<T, F, S>(&self, path: &Path, sleeper: &S, mut read: F) -> Result<T>
    where
        F: FnMut() -> std::result::Result<T, ImageError>,
        S: Sleeper + ?Sized,
    {
        for attempt in 1..=self.max_attempts {
            match read() {
                Ok(value) => return Ok(value),
                Err(err) if is_out_of_memory(&err) => {
                    if attempt == self.max_attempts {
                        break;
                    }
                    let delay = self.delay_after(attempt);
                    log::warn!(
                        "{err} while reading {}, attempt {attempt}/{}; retrying in {delay:?}",
                        path.display(),
                        self.max_attempts,
                    );
                    sleeper.sleep(delay);
                }
                Err(err) => {
                    return Err(LaneSegError::LabelRead {
                        path: path.to_path_buf(),
                        source: Box::new(err),
                    })
                }
            }
        }

        Err(LaneSegError::ResourceExhausted {
            path: path.to_path_buf(),
            attempts: self.max_attempts,
        })
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(99, Duration::from_secs(1))
    }
}

/// True for decode failures caused by running out of memory rather than by the file.
pub fn is_out_of_memory(err: &ImageError) -> bool {
    match err {
        ImageError::Limits(limit) => matches!(limit.kind(), LimitErrorKind::InsufficientMemory),
        ImageError::IoError(io) => io.kind() == std::io::ErrorKind::OutOfMemory,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{out_of_memory, RecordingSleeper};
    use std::cell::Cell;

    #[test]
    fn test_quadratic_delays() {
        let policy = RetryPolicy::new(5, Duration::from_millis(10));
        assert_eq!(policy.delay_after(1), Duration::from_millis(10));
        assert_eq!(policy.delay_after(2), Duration::from_millis(40));
        assert_eq!(policy.delay_after(3), Duration::from_millis(90));
    }

    #[test]
    fn test_succeeds_after_transient_failures() -> Result<()> {
        let policy = RetryPolicy::new(99, Duration::from_secs(1));
        let sleeper = RecordingSleeper::new();
        let calls = Cell::new(0);

        let value = policy.run(Path::new("a.png"), &sleeper, || {
            calls.set(calls.get() + 1);
            if calls.get() <= 3 {
                Err(out_of_memory())
            } else {
                Ok(42)
            }
        })?;

        assert_eq!(value, 42);
        assert_eq!(calls.get(), 4);
        assert_eq!(
            sleeper.recorded(),
            vec![
                Duration::from_secs(1),
                Duration::from_secs(4),
                Duration::from_secs(9)
            ]
        );
        Ok(())
    }

    #[test]
    fn test_exhausted_budget_is_fatal() {
        let policy = RetryPolicy::new(4, Duration::from_millis(1));
        let sleeper = RecordingSleeper::new();
        let calls = Cell::new(0);

        let result: Result<()> = policy.run(Path::new("big.png"), &sleeper, || {
            calls.set(calls.get() + 1);
            Err(out_of_memory())
        });

        assert!(matches!(
            result,
            Err(LaneSegError::ResourceExhausted { attempts: 4, .. })
        ));
        assert_eq!(calls.get(), 4);
        // no pause after the last attempt
        assert_eq!(sleeper.recorded().len(), 3);
    }

    #[test]
    fn test_other_errors_are_not_retried() {
        let policy = RetryPolicy::default();
        let sleeper = RecordingSleeper::new();
        let calls = Cell::new(0);

        let result: Result<()> = policy.run(Path::new("missing.png"), &sleeper, || {
            calls.set(calls.get() + 1);
            Err(ImageError::IoError(std::io::Error::from(
                std::io::ErrorKind::NotFound,
            )))
        });

        assert!(matches!(result, Err(LaneSegError::LabelRead { .. })));
        assert_eq!(calls.get(), 1);
        assert!(sleeper.recorded().is_empty());
    }

    #[test]
    fn test_out_of_memory_classification() {
        assert!(is_out_of_memory(&out_of_memory()));
        assert!(is_out_of_memory(&ImageError::IoError(
            std::io::Error::from(std::io::ErrorKind::OutOfMemory)
        )));
        assert!(!is_out_of_memory(&ImageError::IoError(
            std::io::Error::from(std::io::ErrorKind::NotFound)
        )));
    }
}
