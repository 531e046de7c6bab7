use bucket::{
    Client, Company, Context, ContextOperator, FeatureDefinition, FeatureEvaluator, Filter,
    GroupOperator, MapResolver, OperationMode, Targeting, TargetingRule, User,
};
use criterion::Criterion;
use criterion::{criterion_group, criterion_main};
use std::sync::Arc;
use tokio::runtime::Runtime;

fn definition() -> FeatureDefinition {
    FeatureDefinition {
        key: "new-checkout".to_owned(),
        targeting: Targeting {
            version: 1,
            rules: vec![
                TargetingRule {
                    filter: Filter::group(
                        GroupOperator::And,
                        vec![
                            Filter::context("company.tier", ContextOperator::StringAnyOf, &["gold", "platinum"]),
                            Filter::context("user.email", ContextOperator::StringContains, &["@acme.com"]),
                        ],
                    ),
                },
                TargetingRule {
                    filter: Filter::rollout("new-checkout", "user.id", 25000),
                },
            ],
        },
        config: None,
    }
}

fn evaluate_bench(c: &mut Criterion) {
    let evaluator = FeatureEvaluator::new(&definition());
    let fields = Arc::new(
        Context::new()
            .user(User::new("user-1").email("john@example.com"))
            .company(Company::new("company-1").custom("tier", "silver"))
            .to_fields(),
    );
    c.bench_function("evaluate", |b| b.iter(|| evaluator.evaluate(&fields)));
}

fn get_features_bench(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let client = Arc::new(runtime.block_on(async {
        Client::builder("")
            .mode(OperationMode::Offline)
            .local_features(MapResolver::from([("a", true), ("b", false), ("c", true)]))
            .build()
            .unwrap()
    }));
    let context = Context::new().user(User::new("user-1"));
    c.bench_function("get_features", |b| {
        b.to_async(&runtime).iter(|| async {
            client.get_features(&context).await.unwrap();
        });
    });
}

criterion_group!(benches, evaluate_bench, get_features_bench);
criterion_main!(benches);
