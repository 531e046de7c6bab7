use serde::Deserialize;
use std::fmt::{Display, Formatter};

/// Describes one node of a targeting rule tree.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum Filter {
    /// A list of filters combined with a logical AND or OR.
    #[serde(rename = "group")]
    Group(GroupFilter),
    /// The logical negation of another filter.
    #[serde(rename = "negation")]
    Negation(NegationFilter),
    /// A filter that always yields the same result.
    #[serde(rename = "constant")]
    Constant(ConstantFilter),
    /// A filter comparing one context field with a list of values.
    #[serde(rename = "context")]
    Context(ContextFilter),
    /// A filter selecting a deterministic fraction of the values of an attribute.
    #[serde(rename = "rolloutPercentage")]
    PartialRollout(PartialRolloutFilter),
    /// A filter type this SDK doesn't know about.
    #[serde(other)]
    Unsupported,
}

impl Filter {
    /// Creates a group filter.
    pub fn group(operator: GroupOperator, filters: Vec<Filter>) -> Self {
        Filter::Group(GroupFilter { operator, filters })
    }

    /// Creates a negation filter.
    pub fn not(filter: Filter) -> Self {
        Filter::Negation(NegationFilter {
            filter: Box::new(filter),
        })
    }

    /// Creates a constant filter.
    pub fn constant(value: bool) -> Self {
        Filter::Constant(ConstantFilter { value })
    }

    /// Creates a context filter.
    pub fn context(field: &str, operator: ContextOperator, values: &[&str]) -> Self {
        Filter::Context(ContextFilter {
            field: field.to_owned(),
            operator,
            values: values.iter().map(|v| (*v).to_owned()).collect(),
        })
    }

    /// Creates a partial rollout filter.
    pub fn rollout(key: &str, attribute: &str, threshold: i64) -> Self {
        Filter::PartialRollout(PartialRolloutFilter {
            key: key.to_owned(),
            partial_rollout_attribute: attribute.to_owned(),
            partial_rollout_threshold: threshold,
        })
    }

    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            Filter::Group(_) => "group",
            Filter::Negation(_) => "negation",
            Filter::Constant(_) => "constant",
            Filter::Context(_) => "context",
            Filter::PartialRollout(_) => "rolloutPercentage",
            Filter::Unsupported => "unknown",
        }
    }
}

/// The logical operator of a [`GroupFilter`].
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GroupOperator {
    /// Every child must match.
    And,
    /// At least one child must match.
    Or,
    /// An operator this SDK doesn't know about.
    #[serde(other)]
    Unknown,
}

/// Describes a group of filters.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct GroupFilter {
    /// The operator combining the children.
    pub operator: GroupOperator,
    /// The children, evaluated in order.
    #[serde(default)]
    pub filters: Vec<Filter>,
}

/// Describes the negation of a filter.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct NegationFilter {
    /// The negated filter.
    pub filter: Box<Filter>,
}

/// Describes a constant filter.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ConstantFilter {
    /// The result of the filter.
    pub value: bool,
}

/// Describes a filter that is based on a context field.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ContextFilter {
    /// The dotted field name, e.g. `company.id`.
    pub field: String,
    /// The operator which defines the relation between the field and the comparison values.
    pub operator: ContextOperator,
    /// The comparison values.
    #[serde(default)]
    pub values: Vec<String>,
}

impl Display for ContextFilter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {:?}", self.field, self.operator, self.values)
    }
}

/// Describes a partial rollout filter.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PartialRolloutFilter {
    /// The salt of the rollout hash, usually the feature key.
    pub key: String,
    /// The context field whose value is hashed.
    pub partial_rollout_attribute: String,
    /// The fraction of buckets (out of 100000) that match.
    pub partial_rollout_threshold: i64,
}

/// Context field comparison operator used during the evaluation process.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextOperator {
    /// Checks whether the field contains the comparison value (case-insensitive).
    #[serde(rename = "CONTAINS")]
    StringContains,
    /// Checks whether the field does not contain the comparison value (case-insensitive).
    #[serde(rename = "NOT_CONTAINS")]
    StringNotContains,
    /// Checks whether the field equals any of the comparison values.
    #[serde(rename = "ANY_OF")]
    StringAnyOf,
    /// Checks whether the field equals none of the comparison values.
    #[serde(rename = "NOT_ANY_OF")]
    StringNotAnyOf,
    /// Checks whether the field equals the comparison value.
    #[serde(rename = "IS")]
    Is,
    /// Checks whether the field does not equal the comparison value.
    #[serde(rename = "IS_NOT")]
    IsNot,
    /// Checks whether the field interpreted as a number is greater than the comparison value.
    #[serde(rename = "GT")]
    NumberGreaterThan,
    /// Checks whether the field interpreted as a number is less than the comparison value.
    #[serde(rename = "LT")]
    NumberLessThan,
    /// Checks whether the field interpreted as a timestamp is later than now plus the comparison value in days.
    #[serde(rename = "AFTER")]
    DateAfter,
    /// Checks whether the field interpreted as a timestamp is earlier than now plus the comparison value in days.
    #[serde(rename = "BEFORE")]
    DateBefore,
    /// Checks whether the field has a non-empty value.
    #[serde(rename = "SET")]
    Set,
    /// Checks whether the field is missing a non-empty value.
    #[serde(rename = "NOT_SET")]
    NotSet,
    /// Checks whether the field interpreted as a boolean is `true`.
    #[serde(rename = "IS_TRUE")]
    IsTrue,
    /// Checks whether the field interpreted as a boolean is `false`.
    #[serde(rename = "IS_FALSE")]
    IsFalse,
    /// An operator this SDK doesn't know about.
    #[serde(other)]
    Unknown,
}

impl Display for ContextOperator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ContextOperator::StringContains => f.write_str("CONTAINS"),
            ContextOperator::StringNotContains => f.write_str("NOT_CONTAINS"),
            ContextOperator::StringAnyOf => f.write_str("ANY_OF"),
            ContextOperator::StringNotAnyOf => f.write_str("NOT_ANY_OF"),
            ContextOperator::Is => f.write_str("IS"),
            ContextOperator::IsNot => f.write_str("IS_NOT"),
            ContextOperator::NumberGreaterThan => f.write_str("GT"),
            ContextOperator::NumberLessThan => f.write_str("LT"),
            ContextOperator::DateAfter => f.write_str("AFTER"),
            ContextOperator::DateBefore => f.write_str("BEFORE"),
            ContextOperator::Set => f.write_str("SET"),
            ContextOperator::NotSet => f.write_str("NOT_SET"),
            ContextOperator::IsTrue => f.write_str("IS_TRUE"),
            ContextOperator::IsFalse => f.write_str("IS_FALSE"),
            ContextOperator::Unknown => f.write_str("<unknown operator>"),
        }
    }
}

#[cfg(test)]
mod filter_tests {
    use crate::{ContextOperator, Filter, GroupOperator};

    #[test]
    fn parse_tree() {
        let json = r#"{
            "type": "group",
            "operator": "and",
            "filters": [
                {"type": "context", "field": "company.id", "operator": "IS", "values": ["c1"]},
                {"type": "negation", "filter": {"type": "constant", "value": false}},
                {"type": "rolloutPercentage", "key": "flag", "partialRolloutAttribute": "user.id", "partialRolloutThreshold": 50000}
            ]
        }"#;
        let filter: Filter = serde_json::from_str(json).unwrap();
        assert_eq!(
            filter,
            Filter::group(
                GroupOperator::And,
                vec![
                    Filter::context("company.id", ContextOperator::Is, &["c1"]),
                    Filter::not(Filter::constant(false)),
                    Filter::rollout("flag", "user.id", 50000),
                ]
            )
        );
    }

    #[test]
    fn parse_unknown_parts() {
        let filter: Filter = serde_json::from_str(r#"{"type": "segment", "id": 4}"#).unwrap();
        assert_eq!(filter, Filter::Unsupported);

        let filter: Filter =
            serde_json::from_str(r#"{"type": "group", "operator": "xor", "filters": []}"#).unwrap();
        assert_eq!(filter, Filter::group(GroupOperator::Unknown, vec![]));

        let filter: Filter = serde_json::from_str(
            r#"{"type": "context", "field": "user.id", "operator": "MATCHES_REGEX", "values": ["a.*"]}"#,
        )
        .unwrap();
        assert_eq!(
            filter,
            Filter::context("user.id", ContextOperator::Unknown, &["a.*"])
        );
    }

    #[test]
    fn parse_missing_values() {
        let filter: Filter =
            serde_json::from_str(r#"{"type": "context", "field": "user.email", "operator": "SET"}"#)
                .unwrap();
        assert_eq!(
            filter,
            Filter::context("user.email", ContextOperator::Set, &[])
        );
    }
}
