use crate::context::{Attributes, Fields};
use crate::value::Value;
use serde::Serialize;
use std::sync::Arc;

/// Activity marker attached to user and company updates.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct TrackingContext {
    /// Whether the update counts as activity of the entity.
    pub active: bool,
}

impl TrackingContext {
    pub(crate) fn from_flag(active: Option<bool>) -> Option<Self> {
        active.map(|active| Self { active })
    }
}

/// Creates or updates a user on the backend.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdate {
    /// The identifier of the user.
    pub user_id: String,
    /// The attributes of the user.
    #[serde(skip_serializing_if = "Attributes::is_empty")]
    pub attributes: Attributes,
    /// The activity marker.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<TrackingContext>,
}

/// Creates or updates a company on the backend, optionally associating a user with it.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompanyUpdate {
    /// The identifier of the company.
    pub company_id: String,
    /// The identifier of the user belonging to the company.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// The attributes of the company.
    #[serde(skip_serializing_if = "Attributes::is_empty")]
    pub attributes: Attributes,
    /// The activity marker.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<TrackingContext>,
}

/// A custom event performed by a user.
///
/// # Examples
///
/// ```rust
/// use bucket::TrackEvent;
///
/// let event = TrackEvent::new("export-clicked", "user-id")
///     .company("company-id")
///     .attribute("format", "csv");
/// ```
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrackEvent {
    /// The name of the event.
    pub event: String,
    /// The identifier of the user performing the event.
    pub user_id: String,
    /// The identifier of the company the user acts for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_id: Option<String>,
    /// Additional event attributes.
    #[serde(skip_serializing_if = "Attributes::is_empty")]
    pub attributes: Attributes,
}

impl TrackEvent {
    /// Creates a new [`TrackEvent`].
    pub fn new(event: &str, user_id: &str) -> Self {
        Self {
            event: event.to_owned(),
            user_id: user_id.to_owned(),
            company_id: None,
            attributes: Attributes::new(),
        }
    }

    /// Sets the company the event belongs to.
    pub fn company(mut self, company_id: &str) -> Self {
        self.company_id = Some(company_id.to_owned());
        self
    }

    /// Adds an attribute to the event.
    pub fn attribute<T: Into<Value>>(mut self, key: &str, value: T) -> Self {
        self.attributes.insert(key.to_owned(), value.into());
        self
    }
}

/// What happened to a feature.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum FeatureEventAction {
    /// The targeting rules were evaluated.
    Evaluate,
    /// The config variants were evaluated.
    EvaluateConfig,
    /// The caller read whether the feature is enabled.
    Check,
    /// The caller read the config of the feature.
    CheckConfig,
}

/// Telemetry about the evaluation or use of a feature.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeatureEvent {
    /// What happened.
    pub action: FeatureEventAction,
    /// Key of the feature.
    pub key: String,
    /// Version of the targeting rules or config variants involved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub targeting_version: Option<i64>,
    /// The field map involved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eval_context: Option<Arc<Fields>>,
    /// The outcome: a boolean for flags, the config (or null) for configs.
    pub eval_result: Value,
    /// Result of every rule, in definition order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eval_rule_results: Option<Vec<bool>>,
    /// Fields referenced by the rules but absent from the context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eval_missing_fields: Option<Vec<String>>,
}

/// A message waiting to be delivered to the backend.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum OutputMessage {
    /// A user update.
    #[serde(rename = "user")]
    User(UserUpdate),
    /// A company update.
    #[serde(rename = "company")]
    Company(CompanyUpdate),
    /// A custom event.
    #[serde(rename = "event")]
    Track(TrackEvent),
    /// A feature evaluation or use.
    #[serde(rename = "feature-flag-event")]
    Feature(FeatureEvent),
}

impl OutputMessage {
    /// The structural identity of the message, used to rate-limit duplicates.
    pub(crate) fn identity(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{self:?}"))
    }
}
