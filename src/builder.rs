use std::time::Duration;

use crate::constants::DEFAULT_BASE_URL;
use crate::errors::{ClientError, ErrorKind};
use crate::modes::OperationMode;
use crate::options::*;
use crate::resolver::LocalFeaturesResolver;
use crate::Client;

/// Builder to create a Bucket [`Client`].
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use bucket::{Client, MapResolver, OperationMode};
///
/// #[tokio::main]
/// async fn main() {
///     let client = Client::builder("SECRET_KEY")
///         .mode(OperationMode::LocalEvaluation)
///         .features_refresh_interval(Duration::from_secs(30))
///         .local_features(MapResolver::from([("dark-mode", true)]))
///         .build()
///         .unwrap();
/// }
/// ```
pub struct ClientBuilder {
    secret_key: String,
    base_url: Option<String>,
    mode: Option<OperationMode>,
    http_timeout: Option<Duration>,
    output_max_messages: Option<usize>,
    output_flush_interval: Option<Duration>,
    output_rolling_window: Option<Duration>,
    features_refresh_interval: Option<Duration>,
    features_stale_age: Option<Duration>,
    resolvers: Vec<Box<dyn LocalFeaturesResolver>>,
}

impl ClientBuilder {
    pub(crate) fn new(secret_key: &str) -> Self {
        Self {
            secret_key: secret_key.to_owned(),
            base_url: None,
            mode: None,
            http_timeout: None,
            output_max_messages: None,
            output_flush_interval: None,
            output_rolling_window: None,
            features_refresh_interval: None,
            features_stale_age: None,
            resolvers: Vec::new(),
        }
    }

    /// Sets a custom base URL.
    /// Default value is `https://front.bucket.co`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use bucket::Client;
    ///
    /// let builder = Client::builder("SECRET_KEY")
    ///     .base_url("https://bucket-proxy.example.com");
    /// ```
    pub fn base_url(mut self, base_url: &str) -> Self {
        self.base_url = Some(base_url.to_owned());
        self
    }

    /// Sets the [`OperationMode`].
    /// Default value is [`OperationMode::LocalEvaluation`].
    pub fn mode(mut self, mode: OperationMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Sets the HTTP request timeout.
    /// Default value is `10` seconds.
    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = Some(timeout);
        self
    }

    /// Sets the number of queued output messages that triggers an immediate flush.
    /// Default value is `100`.
    pub fn output_max_messages(mut self, max_messages: usize) -> Self {
        self.output_max_messages = Some(max_messages);
        self
    }

    /// Sets the interval of the periodic output flush.
    /// Default value is `10` seconds.
    pub fn output_flush_interval(mut self, interval: Duration) -> Self {
        self.output_flush_interval = Some(interval);
        self
    }

    /// Sets the period within which structurally equal output messages are sent only once.
    /// Default value is `60` seconds.
    pub fn output_rolling_window(mut self, window: Duration) -> Self {
        self.output_rolling_window = Some(window);
        self
    }

    /// Sets the interval of the feature definition refresh.
    /// Default value is `60` seconds.
    pub fn features_refresh_interval(mut self, interval: Duration) -> Self {
        self.features_refresh_interval = Some(interval);
        self
    }

    /// Sets the age after which cached feature definitions are reported as stale.
    /// Default value is `10` minutes.
    pub fn features_stale_age(mut self, age: Duration) -> Self {
        self.features_stale_age = Some(age);
        self
    }

    /// Registers a [`LocalFeaturesResolver`]. Resolvers are consulted in registration order.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use bucket::{Client, MapResolver, OperationMode};
    ///
    /// let builder = Client::builder("")
    ///     .mode(OperationMode::Offline)
    ///     .local_features(MapResolver::from([("dark-mode", true)]));
    /// ```
    pub fn local_features<R: LocalFeaturesResolver + 'static>(mut self, resolver: R) -> Self {
        self.resolvers.push(Box::new(resolver));
        self
    }

    /// Creates a [`Client`] from the configuration made on the builder.
    /// Must be called within a tokio runtime.
    ///
    /// # Errors
    ///
    /// This method fails if the secret key is empty (unless the mode is
    /// [`OperationMode::Offline`]), if an interval, timeout, or size is zero,
    /// or if the base URL is invalid.
    pub fn build(self) -> Result<Client, ClientError> {
        Client::with_options(self.build_options()?)
    }

    pub(crate) fn build_options(self) -> Result<Options, ClientError> {
        let mode = self.mode.unwrap_or_default();
        if self.secret_key.trim().is_empty() && mode != OperationMode::Offline {
            return Err(ClientError::new(
                ErrorKind::InvalidSecretKey,
                "Secret key cannot be empty".to_owned(),
            ));
        }

        let base_url = self
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_owned());
        if let Err(err) = reqwest::Url::parse(base_url.as_str()) {
            return Err(invalid(format!("Base URL '{base_url}' is invalid. ({err})")));
        }

        let http_timeout = positive(self.http_timeout, DEFAULT_HTTP_TIMEOUT, "HTTP timeout")?;
        let output = OutputOptions {
            max_messages: match self.output_max_messages {
                Some(0) => return Err(invalid("Output max messages must be positive".to_owned())),
                Some(max) => max,
                None => DEFAULT_OUTPUT_MAX_MESSAGES,
            },
            flush_interval: positive(
                self.output_flush_interval,
                DEFAULT_OUTPUT_FLUSH_INTERVAL,
                "Output flush interval",
            )?,
            rolling_window: positive(
                self.output_rolling_window,
                DEFAULT_OUTPUT_ROLLING_WINDOW,
                "Output rolling window",
            )?,
        };
        let features = FeaturesOptions {
            refresh_interval: positive(
                self.features_refresh_interval,
                DEFAULT_FEATURES_REFRESH_INTERVAL,
                "Features refresh interval",
            )?,
            stale_age: positive(
                self.features_stale_age,
                DEFAULT_FEATURES_STALE_AGE,
                "Features stale age",
            )?,
        };

        Ok(Options::new(
            self.secret_key,
            base_url,
            mode,
            http_timeout,
            output,
            features,
            self.resolvers,
        ))
    }
}

fn positive(value: Option<Duration>, default: Duration, name: &str) -> Result<Duration, ClientError> {
    match value {
        Some(duration) if duration.is_zero() => Err(invalid(format!("{name} must be positive"))),
        Some(duration) => Ok(duration),
        None => Ok(default),
    }
}

fn invalid(message: String) -> ClientError {
    ClientError::new(ErrorKind::InvalidConfiguration, message)
}
