//! Request plumbing shared by the platform and git-host clients: bounded
//! retries of transient failures and decoding of inline vs. accepted (202)
//! replies.

use crate::config::RetryPolicy;
use crate::provider::{ApiError, ApiResult};
use crate::types::{Accepted, OperationHandle};
use reqwest::header::{HeaderMap, LOCATION, RETRY_AFTER};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub(crate) struct HttpSender {
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl HttpSender {
    pub(crate) fn new(client: reqwest::Client, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }

    /// Sends the request built by `build`, rebuilding it for every attempt.
    /// Non-success statuses are returned as [`ApiError::Status`].
    pub(crate) async fn send<F>(&self, method: Method, url: &str, build: F) -> ApiResult<Response>
    where
        F: Fn(RequestBuilder) -> RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            let request = build(self.client.request(method.clone(), url));
            let (err, retry_after) = match request.send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let retry_after = parse_retry_after(response.headers());
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    let err = ApiError::Status {
                        method: method.to_string(),
                        url: url.to_string(),
                        status: status.as_u16(),
                        body,
                    };
                    (err, retry_after)
                }
                Err(err) => (ApiError::Network(err), None),
            };

            if !err.is_transient() || attempt >= self.retry.max_retries {
                return Err(err);
            }

            let delay = retry_after
                .map(|d| d.min(Duration::from_millis(self.retry.max_delay_ms)))
                .unwrap_or_else(|| self.retry.calculate_retry_delay(attempt));
            attempt += 1;
            warn!(
                %method,
                url,
                attempt,
                max_retries = self.retry.max_retries,
                "Transient failure, retrying in {:?}: {}",
                delay,
                err
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// Seconds form of `Retry-After`; the HTTP-date form is ignored.
pub(crate) fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Decodes a JSON body; an empty body decodes as JSON `null` so unit replies work.
pub(crate) async fn decode_json<T: DeserializeOwned>(response: Response) -> ApiResult<T> {
    let text = response.text().await?;
    let value = if text.trim().is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_str(&text)?
    };
    Ok(serde_json::from_value(value)?)
}

pub(crate) fn operation_handle(response: &Response) -> ApiResult<OperationHandle> {
    let headers = response.headers();
    let location = headers
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::UnexpectedResponse {
            message: format!("202 from {} without a Location header", response.url()),
        })?;

    let mut handle = OperationHandle::new(location);
    if let Some(id) = headers.get("x-ms-operation-id").and_then(|v| v.to_str().ok()) {
        handle = handle.with_operation_id(id);
    }
    if let Some(retry_after) = parse_retry_after(headers) {
        handle = handle.with_retry_after(retry_after);
    }
    Ok(handle)
}

/// 202 becomes [`Accepted::Pending`], any other success decodes the body.
pub(crate) async fn decode_accepted<T: DeserializeOwned>(
    response: Response,
) -> ApiResult<Accepted<T>> {
    if response.status() == StatusCode::ACCEPTED {
        let handle = operation_handle(&response)?;
        debug!(operation = %handle, "Request accepted as long running operation");
        return Ok(Accepted::Pending(handle));
    }
    Ok(Accepted::Completed(decode_json(response).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_parse_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("20"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(20)));
    }

    #[test]
    fn test_parse_retry_after_ignores_dates() {
        let mut headers = HeaderMap::new();
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(parse_retry_after(&headers), None);
        assert_eq!(parse_retry_after(&HeaderMap::new()), None);
    }

    #[tokio::test]
    async fn test_send_retries_server_errors_then_gives_up() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/flaky")
            .with_status(503)
            .with_body("busy")
            .expect(3)
            .create_async()
            .await;

        let sender = HttpSender::new(
            reqwest::Client::new(),
            RetryPolicy::with_retries(2, 1).without_jitter(),
        );
        let url = format!("{}/flaky", server.url());
        let result = sender.send(Method::GET, &url, |r| r).await;

        mock.assert_async().await;
        assert!(matches!(result, Err(ApiError::Status { status: 503, .. })));
    }

    #[tokio::test]
    async fn test_send_does_not_retry_client_errors() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/missing")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let sender = HttpSender::new(
            reqwest::Client::new(),
            RetryPolicy::with_retries(3, 1).without_jitter(),
        );
        let url = format!("{}/missing", server.url());
        let err = sender.send(Method::GET, &url, |r| r).await.unwrap_err();

        mock.assert_async().await;
        assert!(err.is_not_found());
    }
}
