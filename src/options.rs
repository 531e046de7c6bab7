use std::time::Duration;

use crate::modes::OperationMode;
use crate::resolver::LocalFeaturesResolver;

pub(crate) const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);
pub(crate) const DEFAULT_OUTPUT_MAX_MESSAGES: usize = 100;
pub(crate) const DEFAULT_OUTPUT_FLUSH_INTERVAL: Duration = Duration::from_secs(10);
pub(crate) const DEFAULT_OUTPUT_ROLLING_WINDOW: Duration = Duration::from_secs(60);
pub(crate) const DEFAULT_FEATURES_REFRESH_INTERVAL: Duration = Duration::from_secs(60);
pub(crate) const DEFAULT_FEATURES_STALE_AGE: Duration = Duration::from_secs(600);

/// Settings of the output (telemetry) pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputOptions {
    /// Number of queued messages that triggers an immediate flush.
    pub max_messages: usize,
    /// Interval of the periodic flush.
    pub flush_interval: Duration,
    /// Period within which structurally equal messages are sent only once.
    pub rolling_window: Duration,
}

/// Settings of the feature definition refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct FeaturesOptions {
    /// Interval of the periodic download of feature definitions.
    pub refresh_interval: Duration,
    /// Age after which the cached feature definitions are reported as stale.
    pub stale_age: Duration,
}

/// The validated configuration of a [`crate::Client`].
pub struct Options {
    secret_key: String,
    base_url: String,
    mode: OperationMode,
    http_timeout: Duration,
    output: OutputOptions,
    features: FeaturesOptions,
    resolvers: Vec<Box<dyn LocalFeaturesResolver>>,
}

impl Options {
    pub(crate) fn new(
        secret_key: String,
        base_url: String,
        mode: OperationMode,
        http_timeout: Duration,
        output: OutputOptions,
        features: FeaturesOptions,
        resolvers: Vec<Box<dyn LocalFeaturesResolver>>,
    ) -> Self {
        Self {
            secret_key,
            base_url,
            mode,
            http_timeout,
            output,
            features,
            resolvers,
        }
    }

    /// Get the secret key.
    pub fn secret_key(&self) -> &str {
        &self.secret_key
    }

    /// Get the base URL of the backend.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get the configured [`OperationMode`].
    pub fn mode(&self) -> OperationMode {
        self.mode
    }

    /// Get the configured HTTP request timeout.
    pub fn http_timeout(&self) -> Duration {
        self.http_timeout
    }

    /// Get the output pipeline settings.
    pub fn output(&self) -> &OutputOptions {
        &self.output
    }

    /// Get the feature refresh settings.
    pub fn features(&self) -> &FeaturesOptions {
        &self.features
    }

    pub(crate) fn resolvers(&self) -> &[Box<dyn LocalFeaturesResolver>] {
        &self.resolvers
    }
}
