use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const FABRIC_API_URL: &str = "https://api.fabric.microsoft.com/v1";
pub const POWERBI_API_URL: &str = "https://api.powerbi.com/v1.0/myorg";
pub const GITHUB_API_URL: &str = "https://api.github.com";
pub const AUTHORITY_URL: &str = "https://login.microsoftonline.com";
pub const FABRIC_SCOPE: &str = "https://api.fabric.microsoft.com/.default";

fn validate_url(name: &str, url: &str) -> Result<(), String> {
    if url.is_empty() {
        return Err(format!("{} cannot be empty", name));
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(format!("{} must start with http:// or https://", name));
    }
    Ok(())
}

/// Bounded retry of transient transport failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Attempts after the first one
    pub max_retries: u32,
    /// Base delay for exponential backoff (in milliseconds)
    pub base_delay_ms: u64,
    /// Maximum delay for exponential backoff (in milliseconds)
    pub max_delay_ms: u64,
    /// Jitter factor for randomizing retry delays (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
            jitter_factor: 0.1,
        }
    }
}

impl RetryPolicy {
    pub fn with_retries(max_retries: u32, base_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            ..Default::default()
        }
    }

    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter_factor = 0.0;
        self
    }

    /// Delay before retry number `attempt` (0-based), exponential with jitter.
    pub fn calculate_retry_delay(&self, attempt: u32) -> Duration {
        let base_delay = Duration::from_millis(self.base_delay_ms);
        let exponential_delay = base_delay.saturating_mul(2_u32.saturating_pow(attempt));
        let max_delay = Duration::from_millis(self.max_delay_ms);

        let delay = exponential_delay.min(max_delay);

        if self.jitter_factor > 0.0 {
            let mut rng = rand::thread_rng();
            let jitter = rng.gen_range(0.0..=self.jitter_factor);
            let jitter_ms = (delay.as_millis() as f64 * jitter) as u64;
            delay + Duration::from_millis(jitter_ms)
        } else {
            delay
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err("Jitter factor must be between 0.0 and 1.0".to_string());
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err("Maximum retry delay must not be below the base delay".to_string());
        }
        Ok(())
    }
}

/// Bounds for polling a long running operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollPolicy {
    /// Wait before the first status check
    pub initial_delay: Duration,
    /// Wait between status checks
    pub interval: Duration,
    pub max_attempts: u32,
    /// Wall-clock bound across all attempts
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            interval: Duration::from_secs(15),
            max_attempts: 120,
            timeout: Duration::from_secs(30 * 60),
        }
    }
}

impl PollPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Poll back to back; meant for scripted sources.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            initial_delay: Duration::ZERO,
            interval: Duration::ZERO,
            max_attempts,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_initial_delay(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Longest sleep honoured when the server asks for one via `Retry-After`.
    pub fn max_retry_after(&self) -> Duration {
        self.interval.saturating_mul(4)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("Poll attempts must be greater than 0".to_string());
        }
        if self.timeout.is_zero() {
            return Err("Poll timeout must be greater than 0".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FabricConfig {
    pub base_url: String,
    /// Power BI REST root, used for workspace user administration
    pub powerbi_base_url: String,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for FabricConfig {
    fn default() -> Self {
        Self {
            base_url: FABRIC_API_URL.to_string(),
            powerbi_base_url: POWERBI_API_URL.to_string(),
            timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
        }
    }
}

impl FabricConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_powerbi_base_url(mut self, powerbi_base_url: impl Into<String>) -> Self {
        self.powerbi_base_url = powerbi_base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_url("Fabric API URL", &self.base_url)?;
        validate_url("Power BI API URL", &self.powerbi_base_url)?;
        if self.timeout.is_zero() {
            return Err("Timeout must be greater than 0".to_string());
        }
        self.retry.validate()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    pub base_url: String,
    pub api_version: String,
    pub user_agent: String,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            base_url: GITHUB_API_URL.to_string(),
            api_version: "2022-11-28".to_string(),
            user_agent: concat!("branchout/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

impl GitHubConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_url("GitHub API URL", &self.base_url)?;
        if self.user_agent.is_empty() {
            return Err("User agent cannot be empty".to_string());
        }
        if self.timeout.is_zero() {
            return Err("Timeout must be greater than 0".to_string());
        }
        self.retry.validate()
    }
}

/// Identity provider used to exchange credentials for a Fabric token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    pub authority_url: String,
    pub scope: String,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            authority_url: AUTHORITY_URL.to_string(),
            scope: FABRIC_SCOPE.to_string(),
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

impl IdentityConfig {
    pub fn with_authority_url(mut self, authority_url: impl Into<String>) -> Self {
        self.authority_url = authority_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn token_url(&self, tenant_id: &str) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_url.trim_end_matches('/'),
            tenant_id
        )
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_url("Authority URL", &self.authority_url)?;
        if self.scope.is_empty() {
            return Err("Scope cannot be empty".to_string());
        }
        self.retry.validate()
    }
}
