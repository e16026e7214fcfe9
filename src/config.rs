//! Configuration for the Datastore adapter
//!
//! Centralized configuration with sensible defaults.

use std::time::Duration;

use crate::error::{AdapterError, Result};

/// Main configuration for a connection
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Backend Addressing
    // -------------------------------------------------------------------------
    /// Project the backend client is bound to
    pub project: String,

    /// Namespace applied to every key this connection derives
    pub namespace: String,

    // -------------------------------------------------------------------------
    // Constraint Configuration
    // -------------------------------------------------------------------------
    /// Global switch for unique-marker enforcement.
    /// A model may still force checks on for itself.
    pub enforce_constraint_checks: bool,

    // -------------------------------------------------------------------------
    // Transaction Configuration
    // -------------------------------------------------------------------------
    /// Attempts per transaction before a conflict becomes terminal
    pub max_transaction_attempts: u32,

    /// First backoff delay after a conflict (milliseconds)
    pub retry_base_delay_ms: u64,

    /// Upper bound for the exponential backoff (milliseconds)
    pub retry_max_delay_ms: u64,

    /// Attempts for idempotent reads (lookup, query pages)
    pub max_read_attempts: u32,

    /// Maximum mutations staged in a single commit
    pub max_mutations_per_commit: usize,

    /// Entities deleted per transaction in bulk deletes
    pub delete_batch_size: usize,

    // -------------------------------------------------------------------------
    // Query Configuration
    // -------------------------------------------------------------------------
    /// Maximum OR/IN branches a query may expand into
    pub max_query_branches: usize,

    /// Properties that may carry inequality filters in one native query
    pub max_inequality_properties: usize,

    /// Page size for lazily fetched query results
    pub query_batch_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project: "dev-project".to_string(),
            namespace: String::new(),
            enforce_constraint_checks: true,
            max_transaction_attempts: 5,
            retry_base_delay_ms: 10,
            retry_max_delay_ms: 1000,
            max_read_attempts: 3,
            max_mutations_per_commit: 500,
            delete_batch_size: 25,
            max_query_branches: 30,
            max_inequality_properties: 1,
            query_batch_size: 100,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Backoff delay before retry number `attempt` (1-based)
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(20);
        let delay = self.retry_base_delay_ms.saturating_mul(1u64 << shift);
        Duration::from_millis(delay.min(self.retry_max_delay_ms))
    }

    fn validate(&self) -> Result<()> {
        if self.max_transaction_attempts == 0 {
            return Err(AdapterError::Config(
                "max_transaction_attempts must be at least 1".to_string(),
            ));
        }
        if self.max_read_attempts == 0 {
            return Err(AdapterError::Config(
                "max_read_attempts must be at least 1".to_string(),
            ));
        }
        if self.retry_base_delay_ms > self.retry_max_delay_ms {
            return Err(AdapterError::Config(format!(
                "retry_base_delay_ms ({}) exceeds retry_max_delay_ms ({})",
                self.retry_base_delay_ms, self.retry_max_delay_ms
            )));
        }
        let sizes = [
            ("max_mutations_per_commit", self.max_mutations_per_commit),
            ("delete_batch_size", self.delete_batch_size),
            ("max_query_branches", self.max_query_branches),
            ("query_batch_size", self.query_batch_size),
        ];
        for (name, value) in sizes {
            if value == 0 {
                return Err(AdapterError::Config(format!("{} must be non-zero", name)));
            }
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the backend project
    pub fn project(mut self, project: impl Into<String>) -> Self {
        self.config.project = project.into();
        self
    }

    /// Set the key namespace
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.config.namespace = namespace.into();
        self
    }

    /// Enable or disable unique-marker enforcement globally
    pub fn enforce_constraint_checks(mut self, enabled: bool) -> Self {
        self.config.enforce_constraint_checks = enabled;
        self
    }

    /// Set the number of attempts per transaction
    pub fn max_transaction_attempts(mut self, attempts: u32) -> Self {
        self.config.max_transaction_attempts = attempts;
        self
    }

    /// Set the conflict backoff window (in milliseconds)
    pub fn retry_delay_ms(mut self, base: u64, max: u64) -> Self {
        self.config.retry_base_delay_ms = base;
        self.config.retry_max_delay_ms = max;
        self
    }

    /// Set the number of attempts for idempotent reads
    pub fn max_read_attempts(mut self, attempts: u32) -> Self {
        self.config.max_read_attempts = attempts;
        self
    }

    /// Set the commit write-set cap
    pub fn max_mutations_per_commit(mut self, count: usize) -> Self {
        self.config.max_mutations_per_commit = count;
        self
    }

    /// Set the bulk delete batch size
    pub fn delete_batch_size(mut self, count: usize) -> Self {
        self.config.delete_batch_size = count;
        self
    }

    /// Set the OR/IN branch cap
    pub fn max_query_branches(mut self, count: usize) -> Self {
        self.config.max_query_branches = count;
        self
    }

    /// Set the native inequality property cap
    pub fn max_inequality_properties(mut self, count: usize) -> Self {
        self.config.max_inequality_properties = count;
        self
    }

    /// Set the result page size
    pub fn query_batch_size(mut self, count: usize) -> Self {
        self.config.query_batch_size = count;
        self
    }

    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}
