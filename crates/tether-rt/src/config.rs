use std::time::Duration;

/// How long an idle executor parks in the reactor before re-checking its
/// queue. Submissions wake it early through the poller.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_millis(10);

/// Settings for a single executor.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Name used in log fields and for the thread spawned by [`crate::LoopThread`].
    pub name: Option<String>,
    /// Upper bound on one reactor wait when the ready queue is empty.
    pub idle_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        ExecutorConfig {
            name: None,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

impl ExecutorConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_uses_reactor_poll_interval() {
        let config = ExecutorConfig::default();
        assert_eq!(config.idle_timeout, Duration::from_millis(10));
        assert!(config.name.is_none());
    }

    #[test]
    fn builder_overrides_fields() {
        let config = ExecutorConfig::default()
            .with_name("main")
            .with_idle_timeout(Duration::from_millis(1));
        assert_eq!(config.name.as_deref(), Some("main"));
        assert_eq!(config.idle_timeout, Duration::from_millis(1));
    }
}
