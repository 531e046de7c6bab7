#![allow(dead_code)]

use std::time::Duration;

use bucket::{Company, Context, OperationMode, TrackEvent, TrackingStrategy, User};
use mockito::Matcher;

use crate::utils::{builder, evaluated_feature, evaluated_payload, features_payload};

mod utils;

async fn wait_until_matched(mock: &mockito::Mock) {
    for _ in 0..100 {
        if mock.matched_async().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn single_track_sent_as_event() {
    let mut server = mockito::Server::new_async().await;
    let event = server
        .mock("POST", "/event")
        .match_body(Matcher::JsonString(
            r#"{"event": "clicked", "userId": "u1", "companyId": "c1"}"#.to_owned(),
        ))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;
    let bulk = server.mock("POST", "/bulk").expect(0).create_async().await;

    let client = builder(&server, OperationMode::RemoteEvaluation).build().unwrap();
    client.track(&TrackEvent::new("clicked", "u1").company("c1")).unwrap();
    client.flush().await.unwrap();

    event.assert_async().await;
    bulk.assert_async().await;
}

#[tokio::test]
async fn duplicates_sent_once() {
    let mut server = mockito::Server::new_async().await;
    let bulk = server
        .mock("POST", "/bulk")
        .match_body(Matcher::JsonString(
            r#"[
                {"type": "user", "userId": "u1", "attributes": {"name": "John"}},
                {"type": "event", "event": "clicked", "userId": "u1"}
            ]"#
            .to_owned(),
        ))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;
    let event = server.mock("POST", "/event").expect(0).create_async().await;

    let client = builder(&server, OperationMode::RemoteEvaluation).build().unwrap();
    let user = User::new("u1").name("John");
    for _ in 0..3 {
        client.update_user(&user, TrackingStrategy::Default).unwrap();
        client.track(&TrackEvent::new("clicked", "u1")).unwrap();
    }
    client.flush().await.unwrap();

    client.update_user(&user, TrackingStrategy::Default).unwrap();
    client.flush().await.unwrap();

    bulk.assert_async().await;
    event.assert_async().await;
}

#[tokio::test]
async fn duplicates_sent_again_after_window() {
    let mut server = mockito::Server::new_async().await;
    let event = server
        .mock("POST", "/event")
        .with_status(200)
        .expect(2)
        .create_async()
        .await;

    let client = builder(&server, OperationMode::RemoteEvaluation)
        .output_rolling_window(Duration::from_millis(200))
        .build()
        .unwrap();
    client.track(&TrackEvent::new("clicked", "u1")).unwrap();
    client.flush().await.unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    client.track(&TrackEvent::new("clicked", "u1")).unwrap();
    client.flush().await.unwrap();

    event.assert_async().await;
}

#[tokio::test]
async fn full_queue_sent_immediately() {
    let mut server = mockito::Server::new_async().await;
    let bulk = server
        .mock("POST", "/bulk")
        .match_body(Matcher::JsonString(
            r#"[
                {"type": "event", "event": "a", "userId": "u1"},
                {"type": "event", "event": "b", "userId": "u1"}
            ]"#
            .to_owned(),
        ))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let client = builder(&server, OperationMode::RemoteEvaluation)
        .output_max_messages(2)
        .build()
        .unwrap();
    client.track(&TrackEvent::new("a", "u1")).unwrap();
    client.track(&TrackEvent::new("b", "u1")).unwrap();

    wait_until_matched(&bulk).await;
    bulk.assert_async().await;
}

#[tokio::test]
async fn periodic_flush() {
    let mut server = mockito::Server::new_async().await;
    let event = server
        .mock("POST", "/event")
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let client = builder(&server, OperationMode::RemoteEvaluation)
        .output_flush_interval(Duration::from_millis(100))
        .build()
        .unwrap();
    client.track(&TrackEvent::new("clicked", "u1")).unwrap();

    wait_until_matched(&event).await;
    event.assert_async().await;
}

#[tokio::test]
async fn feature_usage_reported() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/features/evaluated")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(evaluated_payload(evaluated_feature("export", true).as_str()))
        .create_async()
        .await;
    let bulk = server
        .mock("POST", "/bulk")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex(r#"\{"type":"user","userId":"u1","attributes":\{"name":"John"\},"context":\{"active":true\}\}"#.to_owned()),
            Matcher::Regex(r#"\{"type":"company","companyId":"c1","userId":"u1","context":\{"active":true\}\}"#.to_owned()),
            Matcher::Regex(r#"\{"type":"feature-flag-event","action":"check","key":"export","targetingVersion":3,"evalResult":true\}"#.to_owned()),
            Matcher::Regex(r#"\{"type":"event","event":"export","userId":"u1","companyId":"c1"\}"#.to_owned()),
        ]))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let client = builder(&server, OperationMode::RemoteEvaluation).build().unwrap();
    let context = Context::new()
        .user(User::new("u1").name("John"))
        .company(Company::new("c1"));
    let feature = client
        .get_feature("export", &context, TrackingStrategy::Active)
        .await
        .unwrap();

    assert!(feature.is_enabled().unwrap());
    assert!(feature.is_enabled().unwrap());
    feature.track().unwrap();
    client.flush().await.unwrap();

    bulk.assert_async().await;
}

#[tokio::test]
async fn disabled_tracking_sends_no_updates() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/features/evaluated")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(evaluated_payload(""))
        .create_async()
        .await;
    let post = server.mock("POST", Matcher::Any).expect(0).create_async().await;

    let client = builder(&server, OperationMode::RemoteEvaluation).build().unwrap();
    let context = Context::new().user(User::new("u1")).company(Company::new("c1"));
    client
        .get_feature("export", &context, TrackingStrategy::Disabled)
        .await
        .unwrap();
    client
        .update_company(&Company::new("c1"), None, TrackingStrategy::Disabled)
        .unwrap();
    client.flush().await.unwrap();

    post.assert_async().await;
}

#[tokio::test]
async fn failed_send_absorbed() {
    let mut server = mockito::Server::new_async().await;
    let event = server
        .mock("POST", "/event")
        .with_status(500)
        .expect(2)
        .create_async()
        .await;

    let client = builder(&server, OperationMode::RemoteEvaluation).build().unwrap();
    client.track(&TrackEvent::new("clicked", "u1")).unwrap();
    assert!(client.flush().await.is_ok());

    client.track(&TrackEvent::new("exported", "u1")).unwrap();
    assert!(client.flush().await.is_ok());

    event.assert_async().await;
}

#[tokio::test]
async fn local_evaluation_reported() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/features")
        .with_status(200)
        .with_body(features_payload(
            r#"{"key": "theme",
                "targeting": {"version": 1, "rules": [{"filter": {"type": "context", "field": "company.id", "operator": "IS", "values": ["acme"]}}]},
                "config": {"version": 5, "variants": [{"filter": {"type": "constant", "value": true}, "key": "dark", "payload": {"color": "blue"}}]}}"#,
        ))
        .create_async()
        .await;
    let bulk = server
        .mock("POST", "/bulk")
        .match_body(Matcher::JsonString(
            r#"[
                {
                    "type": "feature-flag-event",
                    "action": "evaluate",
                    "key": "theme",
                    "targetingVersion": 1,
                    "evalContext": {"user.id": "u1"},
                    "evalResult": false,
                    "evalRuleResults": [false],
                    "evalMissingFields": ["company.id"]
                },
                {
                    "type": "feature-flag-event",
                    "action": "evaluate-config",
                    "key": "theme",
                    "targetingVersion": 5,
                    "evalContext": {"user.id": "u1"},
                    "evalResult": {"key": "dark", "payload": {"color": "blue"}},
                    "evalRuleResults": [true],
                    "evalMissingFields": []
                }
            ]"#
            .to_owned(),
        ))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let client = builder(&server, OperationMode::LocalEvaluation).build().unwrap();
    let features = client
        .get_features(&Context::new().user(User::new("u1")))
        .await
        .unwrap();
    assert!(!features["theme"].enabled);
    assert_eq!(features["theme"].config.as_ref().unwrap().key, "dark");
    client.flush().await.unwrap();

    bulk.assert_async().await;
}

#[tokio::test]
async fn feature_use_reported_without_updates() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/features/evaluated")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(evaluated_payload(
            r#"{"key": "theme", "isEnabled": true, "targetingVersion": 3,
                "config": {"key": "dark", "payload": {"color": "blue"}, "version": 4}}"#,
        ))
        .create_async()
        .await;
    let silent = server.mock("POST", Matcher::Any).expect(0).create_async().await;

    let client = builder(&server, OperationMode::RemoteEvaluation).build().unwrap();
    let context = Context::new().user(User::new("u1")).company(Company::new("c1"));
    let theme = client
        .get_feature("theme", &context, TrackingStrategy::Disabled)
        .await
        .unwrap();
    client.flush().await.unwrap();
    silent.assert_async().await;
    silent.remove_async().await;

    let bulk = server
        .mock("POST", "/bulk")
        .match_body(Matcher::JsonString(
            r#"[
                {"type": "feature-flag-event", "action": "check", "key": "theme", "targetingVersion": 3, "evalResult": true},
                {
                    "type": "feature-flag-event",
                    "action": "check-config",
                    "key": "theme",
                    "targetingVersion": 4,
                    "evalResult": {"key": "dark", "payload": {"color": "blue"}}
                }
            ]"#
            .to_owned(),
        ))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    assert!(theme.is_enabled().unwrap());
    assert_eq!(theme.config().unwrap().unwrap().key, "dark");
    client.flush().await.unwrap();

    bulk.assert_async().await;
}
