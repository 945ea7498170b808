use std::time::Duration;

/// Time bounds a session works within
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimings {
    /// How long `disconnect` waits for each worker before abandoning it
    pub join_timeout: Duration,
    /// Sleep between two test polls
    pub test_interval: Duration,
    /// Upper bound on closing the physical link
    pub close_timeout: Duration,
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self {
            join_timeout: Duration::from_secs(2),
            test_interval: Duration::from_secs(1),
            close_timeout: Duration::from_secs(1),
        }
    }
}
