use crate::context::Fields;
use crate::eval::filter::FilterEvaluator;
use crate::model::feature::{
    EvaluatedFeature, EvaluationDebugData, EvaluationIssue, FeatureConfig, FeatureDefinition,
};
use crate::value::Value;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// A feature definition with every targeting rule and config variant compiled.
#[derive(Debug, Clone)]
pub struct FeatureEvaluator {
    key: String,
    targeting_version: i64,
    rules: Vec<FilterEvaluator>,
    config: Option<CompiledConfig>,
}

#[derive(Debug, Clone)]
struct CompiledConfig {
    version: i64,
    variants: Vec<CompiledVariant>,
}

#[derive(Debug, Clone)]
struct CompiledVariant {
    filter: FilterEvaluator,
    key: String,
    payload: Value,
}

impl FeatureEvaluator {
    /// Compiles the given feature definition.
    pub fn new(definition: &FeatureDefinition) -> Self {
        Self {
            key: definition.key.clone(),
            targeting_version: definition.targeting.version,
            rules: definition
                .targeting
                .rules
                .iter()
                .map(|rule| FilterEvaluator::new(&rule.filter))
                .collect(),
            config: definition.config.as_ref().map(|config| CompiledConfig {
                version: config.version,
                variants: config
                    .variants
                    .iter()
                    .map(|variant| CompiledVariant {
                        filter: FilterEvaluator::new(&variant.filter),
                        key: variant.key.clone(),
                        payload: variant.payload.clone(),
                    })
                    .collect(),
            }),
        }
    }

    /// The key of the feature.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Evaluates the feature against the given field map.
    ///
    /// Every rule and every variant is evaluated so the debug data is complete;
    /// the first matching variant (in definition order) becomes the config.
    pub fn evaluate(&self, fields: &Arc<Fields>) -> EvaluatedFeature {
        let now = Utc::now();
        let (enabled_rules, flag_issues) = run_all(self.rules.iter(), fields, now);
        let enabled = enabled_rules.iter().any(|matched| *matched);

        let (config, config_debug) = match self.config.as_ref() {
            Some(compiled) => {
                let (matches, issues) =
                    run_all(compiled.variants.iter().map(|v| &v.filter), fields, now);
                let selected = compiled
                    .variants
                    .iter()
                    .zip(matches.iter())
                    .find(|(_, matched)| **matched)
                    .map(|(variant, _)| FeatureConfig {
                        key: variant.key.clone(),
                        payload: variant.payload.clone(),
                    });
                let debug = EvaluationDebugData {
                    version: compiled.version,
                    evaluated_rules: matches,
                    issues,
                };
                (selected, Some(debug))
            }
            None => (None, None),
        };

        EvaluatedFeature {
            key: self.key.clone(),
            enabled,
            overridden: false,
            config,
            flag_debug: Some(EvaluationDebugData {
                version: self.targeting_version,
                evaluated_rules: enabled_rules,
                issues: flag_issues,
            }),
            config_debug,
            evaluation_context: Some(Arc::clone(fields)),
        }
    }
}

fn run_all<'a>(
    filters: impl Iterator<Item = &'a FilterEvaluator>,
    fields: &Fields,
    now: DateTime<Utc>,
) -> (Vec<bool>, Vec<EvaluationIssue>) {
    let mut issues = Vec::new();
    let results = filters
        .map(|filter| filter.evaluate_at(fields, &mut issues, now))
        .collect();
    (results, issues)
}
