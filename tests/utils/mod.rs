use bucket::{Client, ClientBuilder, OperationMode};
use log::kv::Key;
use log::{set_max_level, Level, Log, Metadata, Record};
use rand::distr::{Alphanumeric, SampleString};
use std::cell::RefCell;
use std::time::Duration;

pub fn rand_secret() -> String {
    format!("sec_{}", Alphanumeric.sample_string(&mut rand::rng(), 22))
}

pub fn builder(server: &mockito::ServerGuard, mode: OperationMode) -> ClientBuilder {
    Client::builder(rand_secret().as_str())
        .base_url(server.url().as_str())
        .mode(mode)
        .http_timeout(Duration::from_secs(2))
}

pub fn features_payload(features: &str) -> String {
    format!(r#"{{"success": true, "features": [{features}]}}"#)
}

pub fn constant_feature(key: &str, version: i64, enabled: bool) -> String {
    format!(
        r#"{{"key": "{key}", "targeting": {{"version": {version}, "rules": [{{"filter": {{"type": "constant", "value": {enabled}}}}}]}}}}"#
    )
}

pub fn company_feature(key: &str, company_id: &str) -> String {
    format!(
        r#"{{"key": "{key}", "targeting": {{"version": 1, "rules": [{{"filter": {{"type": "context", "field": "company.id", "operator": "IS", "values": ["{company_id}"]}}}}]}}}}"#
    )
}

pub fn evaluated_payload(features: &str) -> String {
    format!(r#"{{"success": true, "remoteContextUsed": true, "features": [{features}]}}"#)
}

pub fn evaluated_feature(key: &str, enabled: bool) -> String {
    format!(r#"{{"key": "{key}", "isEnabled": {enabled}, "targetingVersion": 3}}"#)
}

pub struct RecordingLogger {}

impl RecordingLogger {
    thread_local!(pub static LOGS: RefCell<String> = RefCell::new(String::default()));
}

impl Log for RecordingLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level() && metadata.target().contains("bucket")
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let level = match record.level() {
            Level::Error => "ERROR",
            Level::Warn => "WARNING",
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        };
        let event_id = record
            .key_values()
            .get(Key::from("event_id"))
            .and_then(|id| id.to_i64())
            .unwrap_or_default();
        Self::LOGS.with_borrow_mut(|l| {
            l.push_str(format!("{level} [{event_id}] {}\n", record.args()).as_str())
        });
    }

    fn flush(&self) {}
}

pub fn log_record_init() {
    set_max_level(log::LevelFilter::Info);
    _ = log::set_logger(&RecordingLogger {});
}
