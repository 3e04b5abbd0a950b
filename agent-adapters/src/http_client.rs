use std::sync::Arc;
use std::time::Duration;

use hyper::body::{Bytes, to_bytes};
use hyper::client::HttpConnector;
use hyper::header::{CONTENT_TYPE, HeaderName, RETRY_AFTER};
use hyper::{Body, Client, Request, StatusCode, Uri};
use hyper_rustls::HttpsConnector;
use rustls::{ClientConfig, OwnedTrustAnchor, RootCertStore};
use tokio::time::timeout;
use webpki_roots::TLS_SERVER_ROOTS;

use crate::traits::{AdapterError, AdapterResult};

pub(crate) type HyperClient = Client<HttpsConnector<HttpConnector>, Body>;

#[allow(clippy::unnecessary_wraps)]
pub(crate) fn build_https_client() -> AdapterResult<HyperClient> {
    let mut roots = RootCertStore::empty();
    roots.add_trust_anchors(TLS_SERVER_ROOTS.iter().map(|anchor| {
        OwnedTrustAnchor::from_subject_spki_name_constraints(
            anchor.subject,
            anchor.spki,
            anchor.name_constraints,
        )
    }));

    let config = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(roots)
        .with_no_client_auth();

    let mut http = HttpConnector::new();
    http.enforce_http(false);

    let connector = HttpsConnector::from((http, Arc::new(config)));

    Ok(Client::builder().build::<_, Body>(connector))
}

/// Outbound JSON `POST` shared by the model and search adapters.
pub(crate) struct JsonPost<'a> {
    pub(crate) client: &'a HyperClient,
    pub(crate) uri: &'a Uri,
    pub(crate) auth: (HeaderName, &'a str),
    pub(crate) timeout: Duration,
    pub(crate) service: &'static str,
}

impl JsonPost<'_> {
    /// Sends `body` and returns the response body of a 2xx reply.
    ///
    /// `timeout` bounds the whole exchange, body included.
    ///
    /// 429 maps to [`AdapterError::RateLimited`], other non-2xx statuses to
    /// [`AdapterError::Response`] carrying the provider's error text.
    pub(crate) async fn send(&self, body: Vec<u8>) -> AdapterResult<Bytes> {
        let service = self.service;
        let request = Request::post(self.uri.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(self.auth.0.clone(), self.auth.1)
            .body(Body::from(body))
            .map_err(|err| {
                AdapterError::transport(format!("failed to build {service} request: {err}"))
            })?;

        let exchange = async {
            let response = self.client.request(request).await.map_err(|err| {
                AdapterError::transport(format!("{service} request failed: {err}"))
            })?;

            let status = response.status();
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<u64>().ok())
                .map(Duration::from_secs);

            let bytes = to_bytes(response.into_body()).await.map_err(|err| {
                AdapterError::transport(format!("failed to read {service} response: {err}"))
            })?;
            Ok::<_, AdapterError>((status, retry_after, bytes))
        };

        // The deadline covers the body read as well as the response headers.
        let (status, retry_after, bytes) = timeout(self.timeout, exchange)
            .await
            .map_err(|_| AdapterError::transport(format!("{service} request timed out")))??;

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AdapterError::RateLimited { retry_after });
        }
        if !status.is_success() {
            let reason = String::from_utf8_lossy(&bytes);
            return Err(AdapterError::response(format!(
                "{service} returned {status}: {reason}"
            )));
        }

        Ok(bytes)
    }
}

/// Normalises a service base URL to `scheme://host[/path]/`.
pub(crate) fn sanitize_base_url(input: &str, service: &str) -> AdapterResult<String> {
    let mut base = input.trim().to_owned();
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        return Err(AdapterError::configuration(format!(
            "{service} base URL must start with http:// or https://"
        )));
    }
    if !base.ends_with('/') {
        base.push('/');
    }
    base.parse::<Uri>().map_err(|err| {
        AdapterError::configuration(format!("invalid {service} base URL: {err}"))
    })?;
    Ok(base)
}
