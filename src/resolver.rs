use std::collections::{BTreeMap, HashMap};

use crate::context::Context;
use crate::errors::BoxError;
use crate::model::feature::{EvaluatedFeature, FeatureConfig};

/// Source of locally decided feature results, merged over the backend-derived ones.
///
/// A feature the backend doesn't know about is added as it is. A feature the
/// backend already resolved is only replaced when the local result is marked
/// with [`EvaluatedFeature::overriding`].
///
/// Closures of the matching signature implement the trait:
///
/// ```rust
/// use bucket::{BoxError, Context, EvaluatedFeature, LocalFeaturesResolver};
///
/// let resolver = |context: &Context| -> Result<Vec<EvaluatedFeature>, BoxError> {
///     let beta = context.get_user().is_some_and(|user| user.id().starts_with("beta-"));
///     Ok(vec![EvaluatedFeature::new("beta-banner", beta)])
/// };
/// # fn assert_resolver(_: impl LocalFeaturesResolver) {}
/// # assert_resolver(resolver);
/// ```
pub trait LocalFeaturesResolver: Send + Sync {
    /// Resolves the local features for the given context. Errors are passed to the caller of the client.
    fn resolve(&self, context: &Context) -> Result<Vec<EvaluatedFeature>, BoxError>;
}

impl<F> LocalFeaturesResolver for F
where
    F: Fn(&Context) -> Result<Vec<EvaluatedFeature>, BoxError> + Send + Sync,
{
    fn resolve(&self, context: &Context) -> Result<Vec<EvaluatedFeature>, BoxError> {
        self(context)
    }
}

/// Resolver that returns the same static features for every context.
///
/// # Examples
///
/// ```rust
/// use bucket::MapResolver;
///
/// let resolver = MapResolver::from([("dark-mode", true), ("export", false)]).overriding();
/// ```
#[derive(Debug, Clone, Default)]
pub struct MapResolver {
    features: BTreeMap<String, EvaluatedFeature>,
}

impl MapResolver {
    /// Marks every feature of the resolver as overriding the backend-derived result.
    pub fn overriding(mut self) -> Self {
        for feature in self.features.values_mut() {
            feature.overridden = true;
        }
        self
    }

    /// Attaches a config to the feature with the given key, adding a disabled feature if it's not present yet.
    pub fn config(mut self, key: &str, config: FeatureConfig) -> Self {
        let feature = self
            .features
            .entry(key.to_owned())
            .or_insert_with(|| EvaluatedFeature::new(key, false));
        feature.config = Some(config);
        self
    }
}

impl LocalFeaturesResolver for MapResolver {
    fn resolve(&self, _: &Context) -> Result<Vec<EvaluatedFeature>, BoxError> {
        Ok(self.features.values().cloned().collect())
    }
}

impl<const N: usize> From<[(&str, bool); N]> for MapResolver {
    fn from(arr: [(&str, bool); N]) -> Self {
        Self {
            features: arr
                .iter()
                .map(|(key, enabled)| ((*key).to_owned(), EvaluatedFeature::new(key, *enabled)))
                .collect(),
        }
    }
}

impl From<HashMap<&str, bool>> for MapResolver {
    fn from(value: HashMap<&str, bool>) -> Self {
        Self {
            features: value
                .iter()
                .map(|(key, enabled)| ((*key).to_owned(), EvaluatedFeature::new(key, *enabled)))
                .collect(),
        }
    }
}

impl From<HashMap<String, bool>> for MapResolver {
    fn from(value: HashMap<String, bool>) -> Self {
        Self {
            features: value
                .iter()
                .map(|(key, enabled)| (key.clone(), EvaluatedFeature::new(key, *enabled)))
                .collect(),
        }
    }
}

impl From<Vec<EvaluatedFeature>> for MapResolver {
    fn from(value: Vec<EvaluatedFeature>) -> Self {
        Self {
            features: value
                .into_iter()
                .map(|feature| (feature.key.clone(), feature))
                .collect(),
        }
    }
}
