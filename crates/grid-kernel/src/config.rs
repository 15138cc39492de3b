//! Kernel configuration.

use std::time::Duration;

use grid_router::RouterConfig;

use crate::ResolveError;

/// Limits for resolution and requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    /// Miss handling limits.
    pub router: RouterConfig,
    /// Maximum miss rounds per resolve.
    pub max_resolution_depth: u32,
    /// Bound on a whole request, from `send` to reply.
    pub request_timeout: Duration,
    /// Longest accepted key.
    pub max_key_len: usize,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            router: RouterConfig::default(),
            max_resolution_depth: 32,
            request_timeout: Duration::from_secs(30),
            max_key_len: 4096,
        }
    }
}

impl KernelConfig {
    /// Short timeouts for tests and local simulations.
    pub fn fast() -> Self {
        Self {
            router: RouterConfig::fast(),
            request_timeout: Duration::from_secs(2),
            ..Self::default()
        }
    }

    /// Set router limits.
    #[must_use]
    pub fn with_router(mut self, router: RouterConfig) -> Self {
        self.router = router;
        self
    }

    /// Set the miss round limit.
    #[must_use]
    pub fn with_max_resolution_depth(mut self, depth: u32) -> Self {
        self.max_resolution_depth = depth;
        self
    }

    /// Set the request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the key length limit.
    #[must_use]
    pub fn with_max_key_len(mut self, len: usize) -> Self {
        self.max_key_len = len;
        self
    }

    /// Reject empty and oversized keys.
    pub fn validate_key(&self, key: &[u8]) -> Result<(), ResolveError> {
        if key.is_empty() {
            return Err(ResolveError::InvalidKey("empty key".into()));
        }
        if key.len() > self.max_key_len {
            return Err(ResolveError::InvalidKey(format!(
                "key is {} bytes, limit is {}",
                key.len(),
                self.max_key_len
            )));
        }
        Ok(())
    }
}
