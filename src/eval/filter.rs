use crate::context::Fields;
use crate::model::feature::{EvaluationIssue, IssueKind};
use crate::model::filter::{
    ContextFilter, ContextOperator, ContextOperator::*, Filter, GroupOperator,
    PartialRolloutFilter,
};
use crate::utils::rollout_bucket;
use crate::value::{parse_float, Value};
use chrono::{DateTime, Utc};

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// A filter tree compiled into an executable predicate.
///
/// Operator arity and comparison values are validated once, here; a malformed
/// node compiles into a predicate that always reports
/// [`IssueKind::UnsupportedFilter`] and yields `false`.
///
/// # Examples
///
/// ```rust
/// use bucket::{Context, ContextOperator, Filter, FilterEvaluator, User};
///
/// let evaluator = FilterEvaluator::new(&Filter::context("user.id", ContextOperator::Is, &["u1"]));
/// let fields = Context::new().user(User::new("u1")).to_fields();
/// let mut issues = Vec::new();
///
/// assert!(evaluator.evaluate(&fields, &mut issues));
/// assert!(issues.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct FilterEvaluator {
    root: Node,
}

impl FilterEvaluator {
    /// Compiles the given filter.
    pub fn new(filter: &Filter) -> Self {
        Self {
            root: compile(filter),
        }
    }

    /// Evaluates the compiled filter against `fields`, appending every issue found to `issues`.
    pub fn evaluate(&self, fields: &Fields, issues: &mut Vec<EvaluationIssue>) -> bool {
        self.evaluate_at(fields, issues, Utc::now())
    }

    pub(crate) fn evaluate_at(
        &self,
        fields: &Fields,
        issues: &mut Vec<EvaluationIssue>,
        now: DateTime<Utc>,
    ) -> bool {
        self.root.eval(fields, issues, now)
    }
}

#[derive(Debug, Clone)]
enum Node {
    All(Vec<Node>),
    Any(Vec<Node>),
    Not(Box<Node>),
    Constant(bool),
    Field { field: String, check: FieldCheck },
    Rollout {
        key: String,
        attribute: String,
        threshold: i64,
    },
    Unsupported(&'static str),
}

#[derive(Debug, Clone)]
enum FieldCheck {
    Contains(String),
    NotContains(String),
    AnyOf(Vec<String>),
    NotAnyOf(Vec<String>),
    Is(String),
    IsNot(String),
    GreaterThan(f64),
    LessThan(f64),
    AfterDays(f64),
    BeforeDays(f64),
    Set,
    NotSet,
    IsTrue,
    IsFalse,
}

fn compile(filter: &Filter) -> Node {
    match filter {
        Filter::Group(group) => {
            let children = group.filters.iter().map(compile).collect();
            match group.operator {
                GroupOperator::And => Node::All(children),
                GroupOperator::Or => Node::Any(children),
                GroupOperator::Unknown => Node::Unsupported(filter.type_name()),
            }
        }
        Filter::Negation(negation) => Node::Not(Box::new(compile(&negation.filter))),
        Filter::Constant(constant) => Node::Constant(constant.value),
        Filter::Context(context) => match compile_check(context) {
            Some(check) => Node::Field {
                field: context.field.clone(),
                check,
            },
            None => Node::Unsupported(filter.type_name()),
        },
        Filter::PartialRollout(PartialRolloutFilter {
            key,
            partial_rollout_attribute,
            partial_rollout_threshold,
        }) => Node::Rollout {
            key: key.clone(),
            attribute: partial_rollout_attribute.clone(),
            threshold: *partial_rollout_threshold,
        },
        Filter::Unsupported => Node::Unsupported(filter.type_name()),
    }
}

fn single(values: &[String]) -> Option<&String> {
    match values {
        [value] => Some(value),
        _ => None,
    }
}

fn single_non_empty(values: &[String]) -> Option<String> {
    single(values)
        .filter(|value| !value.is_empty())
        .map(|value| value.to_lowercase())
}

fn single_number(values: &[String]) -> Option<f64> {
    single(values).and_then(|value| parse_float(value))
}

fn compile_check(filter: &ContextFilter) -> Option<FieldCheck> {
    let values = &filter.values;
    let none_expected = |check: FieldCheck| values.is_empty().then_some(check);
    match filter.operator {
        StringContains => single_non_empty(values).map(FieldCheck::Contains),
        StringNotContains => single_non_empty(values).map(FieldCheck::NotContains),
        StringAnyOf => Some(FieldCheck::AnyOf(values.clone())),
        StringNotAnyOf => Some(FieldCheck::NotAnyOf(values.clone())),
        Is => single(values).cloned().map(FieldCheck::Is),
        IsNot => single(values).cloned().map(FieldCheck::IsNot),
        NumberGreaterThan => single_number(values).map(FieldCheck::GreaterThan),
        NumberLessThan => single_number(values).map(FieldCheck::LessThan),
        DateAfter => single_number(values).map(FieldCheck::AfterDays),
        DateBefore => single_number(values).map(FieldCheck::BeforeDays),
        Set => none_expected(FieldCheck::Set),
        NotSet => none_expected(FieldCheck::NotSet),
        IsTrue => none_expected(FieldCheck::IsTrue),
        IsFalse => none_expected(FieldCheck::IsFalse),
        ContextOperator::Unknown => None,
    }
}

impl Node {
    fn eval(&self, fields: &Fields, issues: &mut Vec<EvaluationIssue>, now: DateTime<Utc>) -> bool {
        match self {
            // `all` and `any` stop at the first decisive child; the rest report no issues.
            Node::All(children) => children.iter().all(|child| child.eval(fields, issues, now)),
            Node::Any(children) => children.iter().any(|child| child.eval(fields, issues, now)),
            Node::Not(child) => !child.eval(fields, issues, now),
            Node::Constant(value) => *value,
            Node::Field { field, check } => match fields.get(field) {
                Some(value) => check.eval(field, value, issues, now),
                None => {
                    issues.push(EvaluationIssue::new(IssueKind::MissingField, field));
                    false
                }
            },
            Node::Rollout {
                key,
                attribute,
                threshold,
            } => match fields.get(attribute) {
                Some(value) => {
                    let bucket = rollout_bucket(key, value.to_invariant_string().as_str());
                    i64::from(bucket) < *threshold
                }
                None => {
                    issues.push(EvaluationIssue::new(IssueKind::MissingField, attribute));
                    false
                }
            },
            Node::Unsupported(type_name) => {
                issues.push(EvaluationIssue::new(IssueKind::UnsupportedFilter, type_name));
                false
            }
        }
    }
}

impl FieldCheck {
    fn eval(
        &self,
        field: &str,
        value: &Value,
        issues: &mut Vec<EvaluationIssue>,
        now: DateTime<Utc>,
    ) -> bool {
        let mut invalid = || {
            issues.push(EvaluationIssue::new(IssueKind::InvalidFieldType, field));
            false
        };
        match self {
            FieldCheck::Contains(needle) => {
                value.to_invariant_string().to_lowercase().contains(needle)
            }
            FieldCheck::NotContains(needle) => {
                !value.to_invariant_string().to_lowercase().contains(needle)
            }
            FieldCheck::AnyOf(options) => options.contains(&value.to_invariant_string()),
            FieldCheck::NotAnyOf(options) => !options.contains(&value.to_invariant_string()),
            FieldCheck::Is(expected) => value.to_invariant_string() == *expected,
            FieldCheck::IsNot(expected) => value.to_invariant_string() != *expected,
            FieldCheck::GreaterThan(threshold) => match value.coerce_number() {
                Some(number) => number > *threshold,
                None => invalid(),
            },
            FieldCheck::LessThan(threshold) => match value.coerce_number() {
                Some(number) => number < *threshold,
                None => invalid(),
            },
            FieldCheck::AfterDays(days) => match value.coerce_datetime() {
                Some(date) => millis(date) > millis(now) + days * MILLIS_PER_DAY,
                None => invalid(),
            },
            FieldCheck::BeforeDays(days) => match value.coerce_datetime() {
                Some(date) => millis(date) < millis(now) + days * MILLIS_PER_DAY,
                None => invalid(),
            },
            FieldCheck::Set => value.is_set(),
            FieldCheck::NotSet => !value.is_set(),
            FieldCheck::IsTrue => match value.coerce_bool() {
                Some(flag) => flag,
                None => invalid(),
            },
            FieldCheck::IsFalse => match value.coerce_bool() {
                Some(flag) => !flag,
                None => invalid(),
            },
        }
    }
}

fn millis(date: DateTime<Utc>) -> f64 {
    date.timestamp_millis() as f64
}
