#![allow(dead_code)]

use std::collections::BTreeMap;

use bucket::{
    Client, Context, ErrorKind, FeatureConfig, MapResolver, OperationMode, TrackEvent,
    TrackingStrategy, User, Value,
};
use serde::Deserialize;

mod utils;

#[derive(Deserialize, Debug, PartialEq)]
struct Theme {
    color: String,
    size: u32,
}

fn offline_client() -> Client {
    let theme = BTreeMap::from([
        ("color".to_owned(), Value::from("blue")),
        ("size".to_owned(), Value::from(3)),
    ]);
    Client::builder("")
        .mode(OperationMode::Offline)
        .local_features(
            MapResolver::from([("export", true)]).config("theme", FeatureConfig::new("dark", theme)),
        )
        .build()
        .unwrap()
}

#[tokio::test]
async fn feature_handle() {
    let client = offline_client();
    let context = Context::new().user(User::new("u1"));

    let export = client
        .get_feature("export", &context, TrackingStrategy::Default)
        .await
        .unwrap();
    assert_eq!(export.key(), "export");
    assert!(export.is_enabled().unwrap());
    assert!(export.config().unwrap().is_none());
    assert!(export.config_as::<Theme>().unwrap().is_none());
    export.track().unwrap();

    let theme = client
        .get_feature("theme", &context, TrackingStrategy::Default)
        .await
        .unwrap();
    assert!(!theme.is_enabled().unwrap());
    assert_eq!(theme.config().unwrap().unwrap().key, "dark");
    assert_eq!(
        theme.config_as::<Theme>().unwrap(),
        Some(Theme {
            color: "blue".to_owned(),
            size: 3
        })
    );
}

#[tokio::test]
async fn config_deserialization_failure() {
    let client = offline_client();
    let theme = client
        .get_feature("theme", &Context::new(), TrackingStrategy::Default)
        .await
        .unwrap();

    let err = theme.config_as::<Vec<String>>().err().unwrap();
    assert_eq!(err.kind, ErrorKind::ConfigDeserializationFailure);
    assert!(err.to_string().contains("'dark' of feature 'theme'"));
    assert!(err.into_source().is_some());
}

#[tokio::test]
async fn track_without_user() {
    let client = offline_client();
    let export = client
        .get_feature("export", &Context::new(), TrackingStrategy::Default)
        .await
        .unwrap();
    assert!(export.track().is_ok());
}

#[tokio::test]
async fn disposed_client() {
    let client = offline_client();
    let context = Context::new().user(User::new("u1"));
    let export = client
        .get_feature("export", &context, TrackingStrategy::Default)
        .await
        .unwrap();

    client.dispose();
    client.dispose();

    let err = client.get_features(&context).await.err().unwrap();
    assert_eq!(err.kind, ErrorKind::Disposed);
    assert_eq!(err.to_string(), "The client has been disposed and can no longer be used.");
    assert_eq!(
        client
            .get_feature("export", &context, TrackingStrategy::Default)
            .await
            .err()
            .unwrap()
            .kind,
        ErrorKind::Disposed
    );
    assert_eq!(client.track(&TrackEvent::new("e", "u1")).err().unwrap().kind, ErrorKind::Disposed);
    assert_eq!(
        client.update_user(&User::new("u1"), TrackingStrategy::Default).err().unwrap().kind,
        ErrorKind::Disposed
    );
    assert_eq!(client.flush().await.err().unwrap().kind, ErrorKind::Disposed);
    assert_eq!(client.refresh_features().await.err().unwrap().kind, ErrorKind::Disposed);

    assert_eq!(export.is_enabled().err().unwrap().kind, ErrorKind::Disposed);
    assert_eq!(export.config().err().unwrap().kind, ErrorKind::Disposed);
    assert_eq!(export.track().err().unwrap().kind, ErrorKind::Disposed);
    assert_eq!(export.key(), "export");
}
