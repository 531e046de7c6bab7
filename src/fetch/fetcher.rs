use std::time::Duration;

use log::{debug, error};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::RequestBuilder;
use tokio_util::sync::CancellationToken;

use crate::constants::{
    BULK_PATH, EVALUATED_FEATURES_PATH, EVENT_PATH, FEATURES_PATH, PKG_VERSION,
    SDK_VERSION_HEADER,
};
use crate::context::Fields;
use crate::errors::ErrorKind::*;
use crate::errors::{ClientError, ErrorKind};
use crate::model::feature::{
    evaluated_from_json, features_from_json, Error, FeatureDefinition, RemoteFeature,
};
use crate::model::output::{OutputMessage, TrackEvent};

/// HTTP transport of the client. Every request is aborted when `token` is cancelled.
pub(crate) struct Fetcher {
    base_url: String,
    http_client: reqwest::Client,
    token: CancellationToken,
}

impl Fetcher {
    pub fn new(
        base_url: &str,
        secret_key: &str,
        timeout: Duration,
        token: CancellationToken,
    ) -> Result<Self, ClientError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            SDK_VERSION_HEADER,
            HeaderValue::from_static(concat!("rust-sdk/", env!("CARGO_PKG_VERSION"))),
        );
        let mut auth = HeaderValue::from_str(format!("Bearer {secret_key}").as_str())
            .map_err(|_| {
                ClientError::new(
                    InvalidSecretKey,
                    "The secret key contains characters that are not allowed in an HTTP header."
                        .to_owned(),
                )
            })?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|err| {
                ClientError::new(
                    InvalidConfiguration,
                    format!("Failed to initialize the HTTP client. {err}"),
                )
            })?;

        debug!("HTTP transport initialized (rust-sdk/{PKG_VERSION}, base URL: {base_url})");
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            http_client,
            token,
        })
    }

    pub async fn fetch_features(&self) -> Result<Vec<FeatureDefinition>, ClientError> {
        let request = self.http_client.get(self.url(FEATURES_PATH));
        let body = self.execute(request, "fetch feature definitions").await?;
        let features = features_from_json(body.as_str())
            .map_err(|err| parse_failure(err, "fetch feature definitions"))?;
        debug!("Fetched {} feature definitions", features.len());
        Ok(features)
    }

    pub async fn fetch_evaluated(&self, fields: &Fields) -> Result<Vec<RemoteFeature>, ClientError> {
        let query: Vec<(String, String)> = fields
            .iter()
            .map(|(key, value)| (format!("context.{key}"), value.to_invariant_string()))
            .collect();
        let request = self
            .http_client
            .get(self.url(EVALUATED_FEATURES_PATH))
            .query(&query);
        let body = self.execute(request, "evaluate features remotely").await?;
        let response = evaluated_from_json(body.as_str())
            .map_err(|err| parse_failure(err, "evaluate features remotely"))?;
        debug!(
            "Fetched {} remotely evaluated features (remote context used: {})",
            response.features.len(),
            response.remote_context_used
        );
        Ok(response.features)
    }

    pub async fn send_bulk(&self, batch: &[OutputMessage]) -> Result<(), ClientError> {
        let body = to_body(batch)?;
        let request = self.http_client.post(self.url(BULK_PATH)).body(body);
        self.execute(request, "send output messages").await?;
        debug!("Sent {} output messages", batch.len());
        Ok(())
    }

    pub async fn send_event(&self, event: &TrackEvent) -> Result<(), ClientError> {
        let body = to_body(event)?;
        let request = self.http_client.post(self.url(EVENT_PATH)).body(body);
        self.execute(request, "send event").await?;
        debug!("Sent event '{}'", event.event);
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    async fn execute(&self, request: RequestBuilder, action: &str) -> Result<String, ClientError> {
        let request = request.header(CONTENT_TYPE, "application/json");
        let result = tokio::select! {
            biased;
            _ = self.token.cancelled() => {
                let msg = format!("Request to {action} was cancelled because the client is being disposed.");
                debug!("{msg}");
                return Err(ClientError::new(RequestCancelled, msg));
            }
            result = request.send() => result,
        };

        match result {
            Ok(response) => match response.status().as_u16() {
                200..=299 => match response.text().await {
                    Ok(body) => Ok(body),
                    Err(body_error) => Err(log_failure(
                        InvalidHttpResponseContent,
                        format!("Request to {action} was successful but the HTTP response content was invalid. {body_error}"),
                    )),
                },
                code @ 401 | code @ 403 => Err(log_failure(
                    InvalidSecretKey,
                    format!("Your secret key seems to be wrong. Request to {action} was rejected with status code {code}."),
                )),
                code => Err(log_failure(
                    UnexpectedHttpResponse,
                    format!("Unexpected HTTP response was received while trying to {action}. Status code: {code}"),
                )),
            },
            Err(error) if error.is_timeout() => Err(log_failure(
                HttpRequestTimeout,
                format!("Request timed out while trying to {action}."),
            )),
            Err(error) => Err(log_failure(
                HttpRequestFailure,
                format!("Unexpected error occurred while trying to {action}. It is most likely due to a local network issue. {error}"),
            )),
        }
    }
}

fn to_body<T: serde::Serialize + ?Sized>(payload: &T) -> Result<String, ClientError> {
    serde_json::to_string(payload).map_err(|err| {
        log_failure(
            InvalidHttpResponseContent,
            format!("Failed to serialize the request payload. {err}"),
        )
    })
}

fn parse_failure(err: Error, action: &str) -> ClientError {
    match err {
        Error::Unsuccessful => log_failure(
            UnexpectedHttpResponse,
            format!("Request to {action} was answered with `success: false`."),
        ),
        Error::Parse(_) => log_failure(
            InvalidHttpResponseContent,
            format!("Request to {action} was successful but the HTTP response content was invalid. {err}"),
        ),
    }
}

fn log_failure(kind: ErrorKind, msg: String) -> ClientError {
    error!(event_id = kind.as_u16(); "{}", msg);
    ClientError::new(kind, msg)
}
