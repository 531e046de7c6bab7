//! Bucket feature flag SDK for Rust.

#![warn(missing_docs)]

#[macro_use]
mod macros;
mod builder;
mod client;
mod constants;
mod context;
mod errors;
mod eval;
mod fetch;
mod model;
mod modes;
mod options;
mod output;
mod resolver;
mod ticker;
mod utils;
mod value;

pub use client::{Client, Feature};
pub use constants::PKG_VERSION;
pub use errors::{BoxError, ClientError, ErrorKind};

pub use context::{Attributes, Company, Context, Fields, TrackingStrategy, User};

pub use model::filter::{
    ConstantFilter, ContextFilter, ContextOperator, Filter, GroupFilter, GroupOperator,
    NegationFilter, PartialRolloutFilter,
};

pub use model::feature::{
    ConfigDefinition, ConfigVariant, EvaluatedFeature, EvaluationDebugData, EvaluationIssue,
    FeatureConfig, FeatureDefinition, IssueKind, Targeting, TargetingRule,
};

pub use model::output::{
    CompanyUpdate, FeatureEvent, FeatureEventAction, OutputMessage, TrackEvent, TrackingContext,
    UserUpdate,
};

pub use eval::feature::FeatureEvaluator;
pub use eval::filter::FilterEvaluator;
pub use ticker::{Ticker, TickerValue};

pub use resolver::{LocalFeaturesResolver, MapResolver};

pub use builder::ClientBuilder;
pub use modes::OperationMode;
pub use options::{FeaturesOptions, Options, OutputOptions};

pub use utils::rollout_bucket;
pub use value::Value;
