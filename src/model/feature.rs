use crate::context::Fields;
use crate::model::filter::Filter;
use crate::value::Value;
use serde::Deserialize;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("JSON parsing failed. ({0})")]
    Parse(String),
    #[error("The response reported `success: false`.")]
    Unsuccessful,
}

/// Describes a feature as downloaded from the backend.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct FeatureDefinition {
    /// The key of the feature.
    pub key: String,
    /// The rules deciding whether the feature is enabled.
    pub targeting: Targeting,
    /// The rules deciding which config variant applies.
    pub config: Option<ConfigDefinition>,
}

/// The versioned list of targeting rules of a feature (a logical OR relation between the items).
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Targeting {
    /// The targeting version.
    pub version: i64,
    /// The targeting rules.
    #[serde(default)]
    pub rules: Vec<TargetingRule>,
}

/// Describes a targeting rule.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct TargetingRule {
    /// The filter tree of the rule.
    pub filter: Filter,
}

/// The versioned list of config variants of a feature.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ConfigDefinition {
    /// The config version.
    pub version: i64,
    /// The variants, in priority order.
    #[serde(default)]
    pub variants: Vec<ConfigVariant>,
}

/// Describes a config variant.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ConfigVariant {
    /// The filter tree selecting the variant.
    pub filter: Filter,
    /// The key of the variant.
    pub key: String,
    /// The opaque payload of the variant.
    #[serde(default)]
    pub payload: Value,
}

#[derive(Deserialize, Debug)]
pub(crate) struct FeaturesResponse {
    pub success: bool,
    #[serde(default)]
    pub features: Vec<FeatureDefinition>,
}

pub(crate) fn features_from_json(json: &str) -> Result<Vec<FeatureDefinition>, Error> {
    match serde_json::from_str::<FeaturesResponse>(json) {
        Ok(response) if response.success => Ok(response.features),
        Ok(_) => Err(Error::Unsuccessful),
        Err(err) => Err(Error::Parse(err.to_string())),
    }
}

/// The kind of a non-fatal problem found while evaluating a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IssueKind {
    /// The field referenced by a filter is absent from the context.
    MissingField,
    /// The field couldn't be converted to the type the operator requires.
    InvalidFieldType,
    /// The filter or its operator is unknown or malformed.
    UnsupportedFilter,
}

impl Display for IssueKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            IssueKind::MissingField => f.write_str("missing field"),
            IssueKind::InvalidFieldType => f.write_str("invalid field type"),
            IssueKind::UnsupportedFilter => f.write_str("unsupported filter"),
        }
    }
}

/// A non-fatal problem found while evaluating a filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EvaluationIssue {
    /// The kind of the problem.
    pub kind: IssueKind,
    /// The field name, or for [`IssueKind::UnsupportedFilter`] the offending filter type.
    pub field: String,
}

impl EvaluationIssue {
    pub(crate) fn new(kind: IssueKind, field: &str) -> Self {
        Self {
            kind,
            field: field.to_owned(),
        }
    }
}

impl Display for EvaluationIssue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} '{}'", self.kind, self.field)
    }
}

/// Debug data of one evaluation (targeting or config).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EvaluationDebugData {
    /// The version of the evaluated rule set.
    pub version: i64,
    /// The result of every rule, in definition order.
    pub evaluated_rules: Vec<bool>,
    /// Issues found while evaluating the rules.
    pub issues: Vec<EvaluationIssue>,
}

impl EvaluationDebugData {
    pub(crate) fn missing_fields(&self) -> Vec<String> {
        self.issues
            .iter()
            .filter(|issue| issue.kind == IssueKind::MissingField)
            .map(|issue| issue.field.clone())
            .collect()
    }
}

/// The resolved config of a feature.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeatureConfig {
    /// The key of the selected variant.
    pub key: String,
    /// The payload of the selected variant.
    pub payload: Value,
}

impl FeatureConfig {
    /// Creates a new [`FeatureConfig`].
    pub fn new<T: Into<Value>>(key: &str, payload: T) -> Self {
        Self {
            key: key.to_owned(),
            payload: payload.into(),
        }
    }

    pub(crate) fn to_value(&self) -> Value {
        let mut map = std::collections::BTreeMap::new();
        map.insert("key".to_owned(), Value::from(self.key.as_str()));
        map.insert("payload".to_owned(), self.payload.clone());
        Value::Object(map)
    }
}

/// The result of evaluating one feature for one context.
///
/// # Examples
///
/// ```rust
/// use bucket::{EvaluatedFeature, FeatureConfig};
///
/// let local = EvaluatedFeature::new("dark-mode", true)
///     .with_config(FeatureConfig::new("blue", "#0000ff"))
///     .overriding();
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EvaluatedFeature {
    /// Key of the feature.
    pub key: String,
    /// Indicates whether the feature is enabled.
    pub enabled: bool,
    /// Indicates whether this result replaces a backend-derived one when merged.
    pub overridden: bool,
    /// The selected config, if any.
    pub config: Option<FeatureConfig>,
    /// Debug data of the targeting evaluation.
    pub flag_debug: Option<EvaluationDebugData>,
    /// Debug data of the config evaluation; present whenever the feature defines a config.
    pub config_debug: Option<EvaluationDebugData>,
    /// The field map the feature was evaluated against.
    pub evaluation_context: Option<Arc<Fields>>,
}

impl EvaluatedFeature {
    /// Creates a result without debug data, as local resolvers produce it.
    pub fn new(key: &str, enabled: bool) -> Self {
        Self {
            key: key.to_owned(),
            enabled,
            ..EvaluatedFeature::default()
        }
    }

    /// Attaches a config.
    pub fn with_config(mut self, config: FeatureConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Marks the result as one that replaces a backend-derived result with the same key.
    pub fn overriding(mut self) -> Self {
        self.overridden = true;
        self
    }

    pub(crate) fn not_found(key: &str, fields: &Arc<Fields>) -> Self {
        Self {
            key: key.to_owned(),
            evaluation_context: Some(Arc::clone(fields)),
            ..EvaluatedFeature::default()
        }
    }

    pub(crate) fn issues(&self) -> impl Iterator<Item = &EvaluationIssue> {
        self.flag_debug
            .iter()
            .chain(self.config_debug.iter())
            .flat_map(|debug| debug.issues.iter())
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EvaluatedFeaturesResponse {
    pub success: bool,
    #[serde(default)]
    pub remote_context_used: bool,
    #[serde(default)]
    pub features: Vec<RemoteFeature>,
}

pub(crate) fn evaluated_from_json(json: &str) -> Result<EvaluatedFeaturesResponse, Error> {
    match serde_json::from_str::<EvaluatedFeaturesResponse>(json) {
        Ok(response) if response.success => Ok(response),
        Ok(_) => Err(Error::Unsuccessful),
        Err(err) => Err(Error::Parse(err.to_string())),
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RemoteFeature {
    pub key: String,
    pub is_enabled: bool,
    #[serde(default)]
    pub targeting_version: i64,
    pub config: Option<RemoteConfig>,
    pub missing_context_fields: Option<Vec<String>>,
    pub rule_evaluation_results: Option<Vec<bool>>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RemoteConfig {
    pub key: Option<String>,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub version: i64,
    pub missing_context_fields: Option<Vec<String>>,
    pub rule_evaluation_results: Option<Vec<bool>>,
}

fn remote_debug(
    version: i64,
    missing: Option<Vec<String>>,
    rules: Option<Vec<bool>>,
) -> EvaluationDebugData {
    EvaluationDebugData {
        version,
        evaluated_rules: rules.unwrap_or_default(),
        issues: missing
            .unwrap_or_default()
            .iter()
            .map(|field| EvaluationIssue::new(IssueKind::MissingField, field))
            .collect(),
    }
}

impl RemoteFeature {
    pub(crate) fn into_evaluated(self, fields: &Arc<Fields>) -> EvaluatedFeature {
        let (config, config_debug) = match self.config {
            Some(remote) => {
                let debug = remote_debug(
                    remote.version,
                    remote.missing_context_fields,
                    remote.rule_evaluation_results,
                );
                let config = remote.key.map(|key| FeatureConfig {
                    key,
                    payload: remote.payload,
                });
                (config, Some(debug))
            }
            None => (None, None),
        };
        EvaluatedFeature {
            key: self.key,
            enabled: self.is_enabled,
            overridden: false,
            config,
            flag_debug: Some(remote_debug(
                self.targeting_version,
                self.missing_context_fields,
                self.rule_evaluation_results,
            )),
            config_debug,
            evaluation_context: Some(Arc::clone(fields)),
        }
    }
}

#[cfg(test)]
mod feature_model_tests {
    use crate::model::feature::{
        evaluated_from_json, features_from_json, EvaluatedFeaturesResponse, Error,
        FeaturesResponse,
    };
    use crate::{ContextOperator, Fields, Filter, IssueKind, Value};
    use std::sync::Arc;

    #[test]
    fn parse_definitions() {
        let json = r#"{
            "success": true,
            "features": [{
                "key": "export",
                "targeting": {"version": 3, "rules": [
                    {"filter": {"type": "context", "field": "company.id", "operator": "ANY_OF", "values": ["a", "b"]}}
                ]},
                "config": {"version": 2, "variants": [
                    {"filter": {"type": "constant", "value": true}, "key": "csv", "payload": {"limit": 10}}
                ]}
            }, {
                "key": "bare",
                "targeting": {"version": 1, "rules": []}
            }]
        }"#;
        let response: FeaturesResponse = serde_json::from_str(json).unwrap();
        assert!(response.success);
        assert_eq!(response.features.len(), 2);

        let export = &response.features[0];
        assert_eq!(export.targeting.version, 3);
        assert_eq!(
            export.targeting.rules[0].filter,
            Filter::context("company.id", ContextOperator::StringAnyOf, &["a", "b"])
        );
        let config = export.config.as_ref().unwrap();
        assert_eq!(config.version, 2);
        assert_eq!(config.variants[0].key, "csv");
        assert_eq!(
            config.variants[0].payload,
            Value::from_json_val(&serde_json::json!({"limit": 10}))
        );
        assert!(response.features[1].config.is_none());
    }

    #[test]
    fn parse_remote_features() {
        let json = r#"{
            "success": true,
            "remoteContextUsed": false,
            "features": [{
                "key": "export",
                "isEnabled": true,
                "targetingVersion": 5,
                "config": {"key": "csv", "payload": "x", "version": 2},
                "missingContextFields": ["company.tier"],
                "ruleEvaluationResults": [false, true]
            }]
        }"#;
        let response: EvaluatedFeaturesResponse = serde_json::from_str(json).unwrap();
        let fields = Arc::new(Fields::new());
        let feature = response
            .features
            .into_iter()
            .next()
            .unwrap()
            .into_evaluated(&fields);

        assert!(feature.enabled);
        assert_eq!(feature.config.as_ref().unwrap().key, "csv");
        let flag_debug = feature.flag_debug.as_ref().unwrap();
        assert_eq!(flag_debug.version, 5);
        assert_eq!(flag_debug.evaluated_rules, vec![false, true]);
        assert_eq!(flag_debug.issues[0].kind, IssueKind::MissingField);
        assert_eq!(flag_debug.missing_fields(), vec!["company.tier".to_owned()]);
        assert_eq!(feature.config_debug.as_ref().unwrap().version, 2);
    }

    #[test]
    fn parse_failures() {
        assert!(matches!(
            features_from_json(r#"{"success": false}"#),
            Err(Error::Unsuccessful)
        ));
        assert!(matches!(
            evaluated_from_json(r#"{"success": false, "features": []}"#),
            Err(Error::Unsuccessful)
        ));
        let err = features_from_json(r#"{"success": true"#).unwrap_err();
        assert_eq!(
            err.to_string(),
            "JSON parsing failed. (EOF while parsing an object at line 1 column 16)"
        );
        assert!(features_from_json(r#"{"success": true}"#).unwrap().is_empty());
    }
}
