use std::time::Duration;

/// Run configuration for [`ExpectSaga`](crate::testing::ExpectSaga).
///
/// Controls how long the harness waits for the saga and its forked tasks to
/// settle before cancelling the main task. Use the builder methods to
/// customize, or use [`Default`] for the 250 ms default.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
/// use sagaplan::RunConfig;
///
/// let config = RunConfig::default()
///     .with_timeout(Duration::from_millis(50))   // give up sooner
///     .silence_timeout();                        // no warning on timeout
///
/// // Plain milliseconds convert too
/// let config: RunConfig = 50u64.into();
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RunConfig {
    /// How long to wait for quiescence. `None` waits forever.
    /// Default: 250ms
    timeout: Option<Duration>,

    /// Suppress the warning logged when the timeout cancels the saga.
    /// Default: false
    silence_timeout: bool,
}

impl RunConfig {
    /// Default async timeout applied by [`ExpectSaga::run`](crate::testing::ExpectSaga::run).
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(250);

    /// Set the quiescence timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Wait for quiescence without a timeout.
    ///
    /// A saga that never finishes (e.g. a watcher blocked on `take`) will
    /// then keep the run pending forever.
    pub fn without_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    /// Do not warn when the timeout cancels the saga.
    pub fn silence_timeout(mut self) -> Self {
        self.silence_timeout = true;
        self
    }

    /// Returns the quiescence timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Returns `true` if the timeout warning is suppressed.
    pub fn is_timeout_silenced(&self) -> bool {
        self.silence_timeout
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            timeout: Some(Self::DEFAULT_TIMEOUT),
            silence_timeout: false,
        }
    }
}

impl From<Duration> for RunConfig {
    fn from(timeout: Duration) -> Self {
        RunConfig::default().with_timeout(timeout)
    }
}

impl From<u64> for RunConfig {
    fn from(millis: u64) -> Self {
        RunConfig::from(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timeout_is_250ms() {
        let config = RunConfig::default();
        assert_eq!(config.timeout(), Some(Duration::from_millis(250)));
        assert!(!config.is_timeout_silenced());
    }

    #[test]
    fn millis_convert_into_timeout() {
        let config: RunConfig = 50u64.into();
        assert_eq!(config.timeout(), Some(Duration::from_millis(50)));
    }

    #[test]
    fn without_timeout_clears_it() {
        let config = RunConfig::default().without_timeout().silence_timeout();
        assert_eq!(config.timeout(), None);
        assert!(config.is_timeout_silenced());
    }
}
