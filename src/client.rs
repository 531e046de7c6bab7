use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once};

use log::{debug, warn};
use serde::de::DeserializeOwned;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use crate::builder::ClientBuilder;
use crate::context::{Company, Context, Fields, TrackingStrategy, User};
use crate::errors::{ClientError, ErrorKind};
use crate::eval::feature::FeatureEvaluator;
use crate::fetch::fetcher::Fetcher;
use crate::model::feature::{EvaluatedFeature, EvaluationDebugData, FeatureConfig};
use crate::model::output::{
    CompanyUpdate, FeatureEvent, FeatureEventAction, OutputMessage, TrackEvent, TrackingContext,
    UserUpdate,
};
use crate::modes::OperationMode;
use crate::options::Options;
use crate::output::{Enqueued, OutputPipeline};
use crate::ticker::Ticker;
use crate::value::Value;

const CLIENT: &str = "client";

struct ClientState {
    options: Options,
    pipeline: OutputPipeline,
    fetcher: Option<Fetcher>,
    runtime: Handle,
    token: CancellationToken,
    disposed: AtomicBool,
}

impl ClientState {
    fn check_disposed(&self) -> Result<(), ClientError> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(ClientError::disposed(CLIENT));
        }
        Ok(())
    }

    fn enqueue(self: &Arc<Self>, message: OutputMessage) {
        if self.options.mode() == OperationMode::Offline {
            debug!("Client is in offline mode, output message dropped");
            return;
        }
        if let Enqueued::Full(batch) = self.pipeline.enqueue(message) {
            debug!("Output queue is full, sending {} messages", batch.len());
            let state = Arc::clone(self);
            self.runtime.spawn(async move {
                _ = state.send(batch).await;
            });
        }
    }

    async fn flush(&self) -> Result<(), ClientError> {
        let batch = self.pipeline.take_batch();
        self.send(batch).await
    }

    async fn send(&self, batch: Vec<OutputMessage>) -> Result<(), ClientError> {
        let Some(fetcher) = self.fetcher.as_ref() else {
            return Ok(());
        };
        match batch.as_slice() {
            [] => Ok(()),
            [OutputMessage::Track(event)] => fetcher.send_event(event).await,
            _ => fetcher.send_bulk(&batch).await,
        }
    }
}

/// The main component for evaluating features and reporting their use.
///
/// # Examples
///
/// ```no_run
/// use bucket::{Client, Company, Context, TrackingStrategy, User};
///
/// #[tokio::main]
/// async fn main() {
///     let client = Client::new("SECRET_KEY").unwrap();
///
///     let context = Context::new()
///         .user(User::new("user-id").name("John"))
///         .company(Company::new("company-id"));
///     let feature = client
///         .get_feature("export", &context, TrackingStrategy::Default)
///         .await
///         .unwrap();
///
///     if feature.is_enabled().unwrap() {
///         feature.track().unwrap();
///     }
/// }
/// ```
pub struct Client {
    state: Arc<ClientState>,
    features: Option<Ticker<Vec<FeatureEvaluator>>>,
    output: Option<Ticker<()>>,
    close: Once,
}

impl Client {
    pub(crate) fn with_options(options: Options) -> Result<Self, ClientError> {
        let runtime = Handle::try_current().map_err(|err| {
            ClientError::new(
                ErrorKind::InvalidConfiguration,
                format!("The client must be created within a tokio runtime. ({err})"),
            )
        })?;
        let token = CancellationToken::new();
        let mode = options.mode();
        let fetcher = match mode {
            OperationMode::Offline => None,
            _ => Some(Fetcher::new(
                options.base_url(),
                options.secret_key(),
                options.http_timeout(),
                token.clone(),
            )?),
        };
        let state = Arc::new(ClientState {
            pipeline: OutputPipeline::new(
                options.output().max_messages,
                options.output().rolling_window,
            ),
            fetcher,
            runtime,
            token,
            disposed: AtomicBool::new(false),
            options,
        });

        let features: Option<Ticker<Vec<FeatureEvaluator>>> = match mode {
            OperationMode::LocalEvaluation => {
                let refresh_state = Arc::clone(&state);
                Some(Ticker::new(
                    "features",
                    state.options.features().refresh_interval,
                    move || {
                        let state = Arc::clone(&refresh_state);
                        async move {
                            let definitions = state.fetcher.as_ref()?.fetch_features().await.ok()?;
                            Some(definitions.iter().map(FeatureEvaluator::new).collect())
                        }
                    },
                ))
            }
            _ => None,
        };
        let output = match mode {
            OperationMode::Offline => None,
            _ => {
                let flush_state = Arc::clone(&state);
                Some(Ticker::new(
                    "output",
                    state.options.output().flush_interval,
                    move || {
                        let state = Arc::clone(&flush_state);
                        async move { state.flush().await.ok() }
                    },
                ))
            }
        };

        debug!("Client initialized in {mode:?} mode");
        Ok(Self {
            state,
            features,
            output,
            close: Once::new(),
        })
    }

    /// Creates a new [`ClientBuilder`] used to build a [`Client`].
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use bucket::{Client, OperationMode};
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     let client = Client::builder("SECRET_KEY")
    ///         .mode(OperationMode::RemoteEvaluation)
    ///         .build()
    ///         .unwrap();
    /// }
    /// ```
    pub fn builder(secret_key: &str) -> ClientBuilder {
        ClientBuilder::new(secret_key)
    }

    /// Creates a new [`Client`] with default options. Must be called within a tokio runtime.
    ///
    /// # Errors
    ///
    /// This method fails if the given secret key is empty.
    pub fn new(secret_key: &str) -> Result<Self, ClientError> {
        ClientBuilder::new(secret_key).build()
    }

    /// Resolves every feature for the given context.
    ///
    /// Depending on the [`OperationMode`], the base set is empty, evaluated
    /// locally from the cached feature definitions, or evaluated by the backend.
    /// The registered [`crate::LocalFeaturesResolver`]s are merged over it in
    /// registration order.
    ///
    /// Network failures yield an empty base set; evaluation issues are logged.
    ///
    /// # Errors
    ///
    /// This method fails if the client is disposed or a resolver fails. A
    /// resolver's error is returned unchanged as the source of a
    /// [`ErrorKind::ResolverFailure`] error, reachable through
    /// [`ClientError::into_source`] or [`std::error::Error::source`].
    pub async fn get_features(
        &self,
        context: &Context,
    ) -> Result<HashMap<String, EvaluatedFeature>, ClientError> {
        self.state.check_disposed()?;
        let fields = context.to_shared_fields();
        self.resolve_features(context, &fields).await
    }

    /// Resolves the feature with the given `key` and returns a handle to it.
    ///
    /// The user and company of the context are sent to the backend first,
    /// unless `tracking` is [`TrackingStrategy::Disabled`]. A feature that
    /// doesn't exist is returned as disabled.
    ///
    /// # Errors
    ///
    /// The same as [`Client::get_features`].
    pub async fn get_feature(
        &self,
        key: &str,
        context: &Context,
        tracking: TrackingStrategy,
    ) -> Result<Feature, ClientError> {
        self.state.check_disposed()?;
        if tracking != TrackingStrategy::Disabled {
            if let Some(user) = context.get_user() {
                self.state.enqueue(user_update(user, tracking));
            }
            if let Some(company) = context.get_company() {
                self.state
                    .enqueue(company_update(company, context.get_user(), tracking));
            }
        }

        let fields = context.to_shared_fields();
        let mut features = self.resolve_features(context, &fields).await?;
        let evaluated = features
            .remove(key)
            .unwrap_or_else(|| EvaluatedFeature::not_found(key, &fields));
        Ok(Feature {
            state: Arc::clone(&self.state),
            evaluated,
            user_id: context.get_user().map(|user| user.id().to_owned()),
            company_id: context.get_company().map(|company| company.id().to_owned()),
        })
    }

    /// Sends the attributes of a user to the backend.
    pub fn update_user(&self, user: &User, tracking: TrackingStrategy) -> Result<(), ClientError> {
        self.state.check_disposed()?;
        if tracking != TrackingStrategy::Disabled {
            self.state.enqueue(user_update(user, tracking));
        }
        Ok(())
    }

    /// Sends the attributes of a company to the backend, optionally associating a user with it.
    pub fn update_company(
        &self,
        company: &Company,
        user: Option<&User>,
        tracking: TrackingStrategy,
    ) -> Result<(), ClientError> {
        self.state.check_disposed()?;
        if tracking != TrackingStrategy::Disabled {
            self.state.enqueue(company_update(company, user, tracking));
        }
        Ok(())
    }

    /// Sends a custom event to the backend.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use bucket::{Client, TrackEvent};
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     let client = Client::new("SECRET_KEY").unwrap();
    ///
    ///     client
    ///         .track(&TrackEvent::new("export-clicked", "user-id").attribute("format", "csv"))
    ///         .unwrap();
    /// }
    /// ```
    pub fn track(&self, event: &TrackEvent) -> Result<(), ClientError> {
        self.state.check_disposed()?;
        self.state.enqueue(OutputMessage::Track(event.clone()));
        Ok(())
    }

    /// Sends the queued output messages now.
    ///
    /// A failed request is logged and its messages are dropped; they are not retried.
    ///
    /// # Errors
    ///
    /// This method fails only if the client is disposed.
    pub async fn flush(&self) -> Result<(), ClientError> {
        self.state.check_disposed()?;
        if let Err(err) = self.state.flush().await {
            debug!("Output messages dropped after a failed request ({:?})", err.kind);
        }
        Ok(())
    }

    /// Downloads the feature definitions now and returns whether it succeeded.
    ///
    /// Concurrent calls share one download. Outside of
    /// [`OperationMode::LocalEvaluation`] there is nothing to refresh and
    /// `false` is returned.
    pub async fn refresh_features(&self) -> Result<bool, ClientError> {
        self.state.check_disposed()?;
        match self.features.as_ref() {
            Some(ticker) => ticker.tick().await,
            None => {
                debug!(
                    "Client is in {:?} mode, there are no feature definitions to refresh",
                    self.state.options.mode()
                );
                Ok(false)
            }
        }
    }

    /// Stops the background work and cancels in-flight requests.
    ///
    /// Every later call on the client, or on a [`Feature`] issued by it, fails
    /// with [`ErrorKind::Disposed`]. Calling it again has no effect.
    pub fn dispose(&self) {
        self.close.call_once(|| {
            self.state.disposed.store(true, Ordering::SeqCst);
            self.state.token.cancel();
            if let Some(ticker) = self.features.as_ref() {
                ticker.dispose();
            }
            if let Some(ticker) = self.output.as_ref() {
                ticker.dispose();
            }
            let dropped = self.state.pipeline.len();
            if dropped > 0 {
                debug!("Client disposed with {dropped} unsent output messages");
            }
        });
    }

    async fn resolve_features(
        &self,
        context: &Context,
        fields: &Arc<Fields>,
    ) -> Result<HashMap<String, EvaluatedFeature>, ClientError> {
        let mut features = match self.state.options.mode() {
            OperationMode::Offline => HashMap::new(),
            OperationMode::LocalEvaluation => self.evaluate_locally(fields).await?,
            OperationMode::RemoteEvaluation => self.evaluate_remotely(fields).await,
        };

        for resolver in self.state.options.resolvers() {
            let local = resolver.resolve(context).map_err(|err| {
                let msg = format!("Local features resolver failed. ({err})");
                warn!(event_id = ErrorKind::ResolverFailure.as_u16(); "{}", msg);
                ClientError::with_source(ErrorKind::ResolverFailure, msg, err)
            })?;
            for feature in local {
                match features.entry(feature.key.clone()) {
                    Entry::Vacant(slot) => {
                        slot.insert(EvaluatedFeature {
                            evaluation_context: Some(Arc::clone(fields)),
                            ..feature
                        });
                    }
                    Entry::Occupied(mut slot) if feature.overridden => {
                        let existing = slot.get_mut();
                        existing.enabled = feature.enabled;
                        existing.config = feature.config;
                        existing.overridden = true;
                    }
                    Entry::Occupied(_) => {}
                }
            }
        }

        for feature in features.values() {
            let issues: Vec<String> = feature.issues().map(|issue| issue.to_string()).collect();
            if !issues.is_empty() {
                warn!(event_id = 3002; "Evaluation of feature '{}' reported issues: {}", feature.key, issues.join(", "));
            }
        }
        Ok(features)
    }

    async fn evaluate_locally(
        &self,
        fields: &Arc<Fields>,
    ) -> Result<HashMap<String, EvaluatedFeature>, ClientError> {
        let Some(ticker) = self.features.as_ref() else {
            return Ok(HashMap::new());
        };
        let cached = ticker.value_async().await?;
        let Some(evaluators) = cached.value else {
            warn!(event_id = 3003; "Feature definitions are not available, evaluating without targeting rules");
            return Ok(HashMap::new());
        };
        let stale_age = self.state.options.features().stale_age;
        if cached.age > stale_age {
            warn!(event_id = 3001; "Feature definitions are stale (last refreshed {}s ago, stale after {}s)", cached.age.as_secs(), stale_age.as_secs());
        }

        let mut features = HashMap::with_capacity(evaluators.len());
        for evaluator in evaluators.iter() {
            let evaluated = evaluator.evaluate(fields);
            if let Some(debug) = evaluated.flag_debug.as_ref() {
                self.state.enqueue(feature_event(
                    FeatureEventAction::Evaluate,
                    &evaluated,
                    debug,
                    Value::Bool(evaluated.enabled),
                ));
            }
            if let Some(debug) = evaluated.config_debug.as_ref() {
                self.state.enqueue(feature_event(
                    FeatureEventAction::EvaluateConfig,
                    &evaluated,
                    debug,
                    config_value(evaluated.config.as_ref()),
                ));
            }
            features.insert(evaluated.key.clone(), evaluated);
        }
        Ok(features)
    }

    async fn evaluate_remotely(&self, fields: &Arc<Fields>) -> HashMap<String, EvaluatedFeature> {
        let Some(fetcher) = self.state.fetcher.as_ref() else {
            return HashMap::new();
        };
        match fetcher.fetch_evaluated(fields).await {
            Ok(remote) => remote
                .into_iter()
                .map(|feature| {
                    let evaluated = feature.into_evaluated(fields);
                    (evaluated.key.clone(), evaluated)
                })
                .collect(),
            Err(_) => HashMap::new(),
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// A resolved feature. Reading it through [`Feature::is_enabled`] or
/// [`Feature::config`] reports the use to the backend.
#[derive(Debug)]
pub struct Feature {
    state: Arc<ClientState>,
    evaluated: EvaluatedFeature,
    user_id: Option<String>,
    company_id: Option<String>,
}

impl Feature {
    /// The key of the feature.
    pub fn key(&self) -> &str {
        &self.evaluated.key
    }

    /// The full evaluation result. Reading it is not reported.
    pub fn evaluated(&self) -> &EvaluatedFeature {
        &self.evaluated
    }

    /// Whether the feature is enabled. Each call reports a `check` event.
    pub fn is_enabled(&self) -> Result<bool, ClientError> {
        self.state.check_disposed()?;
        let evaluated = &self.evaluated;
        self.state.enqueue(check_event(
            FeatureEventAction::Check,
            evaluated,
            evaluated.flag_debug.as_ref(),
            Value::Bool(evaluated.enabled),
        ));
        Ok(evaluated.enabled)
    }

    /// The config of the feature, if any. Each call reports a `check-config` event.
    pub fn config(&self) -> Result<Option<&FeatureConfig>, ClientError> {
        self.state.check_disposed()?;
        let evaluated = &self.evaluated;
        self.state.enqueue(check_event(
            FeatureEventAction::CheckConfig,
            evaluated,
            evaluated.config_debug.as_ref(),
            config_value(evaluated.config.as_ref()),
        ));
        Ok(evaluated.config.as_ref())
    }

    /// The config payload deserialized into `T`. Reports the use like [`Feature::config`].
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use bucket::{Client, Context, TrackingStrategy};
    /// use serde::Deserialize;
    ///
    /// #[derive(Deserialize)]
    /// struct ExportLimits {
    ///     max_rows: u32,
    /// }
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     let client = Client::new("SECRET_KEY").unwrap();
    ///     let feature = client
    ///         .get_feature("export", &Context::new(), TrackingStrategy::Default)
    ///         .await
    ///         .unwrap();
    ///     let limits: Option<ExportLimits> = feature.config_as().unwrap();
    /// }
    /// ```
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorKind::ConfigDeserializationFailure`] if the payload doesn't fit `T`.
    pub fn config_as<T: DeserializeOwned>(&self) -> Result<Option<T>, ClientError> {
        let Some(config) = self.config()? else {
            return Ok(None);
        };
        match serde_json::from_value::<T>(config.payload.to_json_val()) {
            Ok(payload) => Ok(Some(payload)),
            Err(err) => {
                let msg = format!(
                    "Failed to deserialize the config '{}' of feature '{}'. ({err})",
                    config.key, self.evaluated.key
                );
                warn!(event_id = ErrorKind::ConfigDeserializationFailure.as_u16(); "{}", msg);
                Err(ClientError::with_source(
                    ErrorKind::ConfigDeserializationFailure,
                    msg,
                    Box::new(err),
                ))
            }
        }
    }

    /// Sends an event named after the feature on behalf of the context's user.
    ///
    /// Nothing is sent when the context had no user.
    pub fn track(&self) -> Result<(), ClientError> {
        self.state.check_disposed()?;
        let Some(user_id) = self.user_id.as_deref() else {
            debug!("Feature '{}' not tracked, the context has no user", self.evaluated.key);
            return Ok(());
        };
        let mut event = TrackEvent::new(&self.evaluated.key, user_id);
        event.company_id.clone_from(&self.company_id);
        self.state.enqueue(OutputMessage::Track(event));
        Ok(())
    }
}

impl std::fmt::Debug for ClientState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientState")
            .field("mode", &self.options.mode())
            .field("disposed", &self.disposed)
            .finish()
    }
}

fn user_update(user: &User, tracking: TrackingStrategy) -> OutputMessage {
    OutputMessage::User(UserUpdate {
        user_id: user.id().to_owned(),
        attributes: user.attributes(),
        context: TrackingContext::from_flag(tracking.active_flag()),
    })
}

fn company_update(company: &Company, user: Option<&User>, tracking: TrackingStrategy) -> OutputMessage {
    OutputMessage::Company(CompanyUpdate {
        company_id: company.id().to_owned(),
        user_id: user.map(|user| user.id().to_owned()),
        attributes: company.attributes(),
        context: TrackingContext::from_flag(tracking.active_flag()),
    })
}

fn config_value(config: Option<&FeatureConfig>) -> Value {
    config.map(FeatureConfig::to_value).unwrap_or_default()
}

fn feature_event(
    action: FeatureEventAction,
    evaluated: &EvaluatedFeature,
    debug: &EvaluationDebugData,
    result: Value,
) -> OutputMessage {
    OutputMessage::Feature(FeatureEvent {
        action,
        key: evaluated.key.clone(),
        targeting_version: Some(debug.version),
        eval_context: evaluated.evaluation_context.clone(),
        eval_result: result,
        eval_rule_results: Some(debug.evaluated_rules.clone()),
        eval_missing_fields: Some(debug.missing_fields()),
    })
}

fn check_event(
    action: FeatureEventAction,
    evaluated: &EvaluatedFeature,
    debug: Option<&EvaluationDebugData>,
    result: Value,
) -> OutputMessage {
    OutputMessage::Feature(FeatureEvent {
        action,
        key: evaluated.key.clone(),
        targeting_version: debug.map(|debug| debug.version),
        eval_context: None,
        eval_result: result,
        eval_rule_results: None,
        eval_missing_fields: None,
    })
}
