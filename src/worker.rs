//! The worker: one simulated user walking the scenario in a loop.
//!
//! Each worker owns its HTTP client (and with it a private cookie jar), a
//! rate limiter, a random source, and the session state a browser would
//! carry: persistent headers and the current CSRF token. Nothing here is
//! shared across workers; cross-worker leakage of session state would
//! invalidate measurements.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cli::Config;
use crate::credentials::Credentials;
use crate::error::Error;
use crate::metrics::{RequestEvent, Sink};
use crate::rate::RateLimiter;
use crate::scenario::{Action, Scenario};
use crate::template;

/// Form-body token replaced with the worker's current CSRF token.
const CSRF_PLACEHOLDER: &str = "CSRF_TOKEN_PLACEHOLDER";

// CSRF extraction patterns, tried in order; first match wins.
static META_CSRF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<meta name="csrf-token" content="([^"]+)""#).expect("static regex")
});
static INPUT_CSRF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<input[^>]*name="authenticity_token"[^>]*value="([^"]+)""#).expect("static regex")
});
static ANY_CSRF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"authenticity_token"[^>]*value="([^"]+)""#).expect("static regex"));

pub struct Worker {
    id: u64,
    client: reqwest::Client,
    limiter: RateLimiter,
    scenario: std::sync::Arc<Scenario>,
    sink: Sink,
    rng: SmallRng,
    credentials: Option<Credentials>,
    login_header: Option<(String, String)>,
    /// Headers replayed on every subsequent request, e.g. a rotated
    /// `X-CSRF-Token` or an `Authorization` issued by the target.
    session_headers: HashMap<String, String>,
    /// Empty until extracted from a login page or response header.
    csrf_token: String,
}

impl Worker {
    pub fn new(
        id: u64,
        config: &Config,
        scenario: std::sync::Arc<Scenario>,
        credentials: Option<Credentials>,
        sink: Sink,
    ) -> Result<Self, Error> {
        Ok(Worker {
            id,
            client: crate::client::build(config.insecure_tls)?,
            limiter: RateLimiter::new(config.rps),
            scenario,
            sink,
            rng: SmallRng::from_entropy(),
            credentials,
            login_header: config.login_header(),
            session_headers: HashMap::new(),
            csrf_token: String::new(),
        })
    }

    /// Drive the worker until the cancellation token fires. The optional
    /// login is a single POST; a 4xx/5xx answer aborts this worker only.
    pub async fn run(
        mut self,
        cancel: CancellationToken,
        login_url: Option<&str>,
    ) -> Result<(), Error> {
        if let Some(url) = login_url {
            tokio::select! {
                res = self.login(url) => res?,
                _ = cancel.cancelled() => return Ok(()),
            }
        }

        while !cancel.is_cancelled() {
            self.run_scenario(&cancel).await;
        }
        Ok(())
    }

    async fn run_scenario(&mut self, cancel: &CancellationToken) {
        let scenario = std::sync::Arc::clone(&self.scenario);
        for action in &scenario.actions {
            tokio::select! {
                _ = self.limiter.acquire() => {}
                _ = cancel.cancelled() => return,
            }
            if cancel.is_cancelled() {
                return;
            }

            self.execute_action(action).await;

            if let Some(delay) = action.delay.sample(&mut self.rng) {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => return,
                }
            }
        }
    }

    async fn login(&mut self, url: &str) -> Result<(), Error> {
        let mut request = self.client.post(url);
        if let Some((name, value)) = &self.login_header {
            request = request.header(name, value);
        }
        let response = request.send().await.map_err(|source| Error::LoginRequest {
            url: url.to_owned(),
            source,
        })?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(Error::LoginStatus {
                url: url.to_owned(),
                status: status.as_u16(),
            });
        }
        self.extract_session_headers(response.headers());
        Ok(())
    }

    async fn execute_action(&mut self, action: &Action) {
        let ctx = template::Context {
            user_id: self.id,
            credentials: self.credentials.as_ref(),
        };
        let url = template::expand(&action.url, &ctx, &mut self.rng);
        let body = Self::expand_body(&mut self.rng, &self.csrf_token, action, &ctx);

        let start = Instant::now();

        let method = match Method::from_bytes(action.method.as_bytes()) {
            Ok(method) => method,
            Err(err) => {
                self.emit(action, &url, start, start, 0, 0, Some(err.to_string()));
                return;
            }
        };

        let mut headers = HeaderMap::new();
        if action.json_body.is_some() {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        // Scenario headers first so session state and auth can override
        // them. Accept-Encoding is suppressed; the client negotiates and
        // decompresses on its own.
        for (name, value) in &action.headers {
            if name.eq_ignore_ascii_case("accept-encoding") {
                continue;
            }
            let value = template::expand(value, &ctx, &mut self.rng);
            insert_header(&mut headers, name, &value);
        }
        for (name, value) in &self.session_headers {
            insert_header(&mut headers, name, value);
        }
        if !self.csrf_token.is_empty() {
            insert_header(&mut headers, "X-CSRF-Token", &self.csrf_token);
        }
        if let Some((name, value)) = &self.login_header {
            insert_header(&mut headers, name, value);
        }

        let mut request = self.client.request(method, &url).headers(headers);
        if let Some(timeout) = action.timeout {
            request = request.timeout(timeout);
        }
        if let Some(body) = body {
            request = request.body(body);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                let end = Instant::now();
                self.emit(action, &url, start, end, 0, 0, Some(error_text(&err)));
                return;
            }
        };

        // Latency is time to the response head; the body is read after.
        let end = Instant::now();
        let status = response.status().as_u16();
        let response_headers = response.headers().clone();

        // Partial reads degrade to whatever arrived, never to an event error.
        let body_bytes = response.bytes().await.unwrap_or_default();
        let bytes_read = body_bytes.len() as u64;

        if url.contains("sign_in") || url.contains("login") {
            if let Ok(html) = std::str::from_utf8(&body_bytes) {
                self.extract_csrf_from_html(html);
            }
        }
        self.extract_session_headers(&response_headers);

        let error = if action.expect_status > 0 && status != action.expect_status {
            Some(format!(
                "expected status {}, got {}",
                action.expect_status, status
            ))
        } else {
            None
        };

        self.emit(action, &url, start, end, status, bytes_read, error);
    }

    /// Pick the JSON body when present, else the form body with the CSRF
    /// placeholder substituted (URL-encoded, since the body is form data).
    fn expand_body(
        rng: &mut SmallRng,
        csrf_token: &str,
        action: &Action,
        ctx: &template::Context<'_>,
    ) -> Option<String> {
        if let Some(json) = &action.json_body {
            return Some(template::expand(json, ctx, rng));
        }
        let body = action.body.as_ref()?;
        let mut body = template::expand(body, ctx, rng);
        if !csrf_token.is_empty() && body.contains(CSRF_PLACEHOLDER) {
            body = body.replace(CSRF_PLACEHOLDER, &urlencoding::encode(csrf_token));
        }
        Some(body)
    }

    fn extract_csrf_from_html(&mut self, html: &str) {
        for pattern in [&*META_CSRF, &*INPUT_CSRF, &*ANY_CSRF] {
            if let Some(captures) = pattern.captures(html) {
                self.csrf_token = captures[1].to_owned();
                return;
            }
        }
    }

    /// Lift session-relevant response headers into the persistent map.
    /// Cookies are not handled here; the jar owns those.
    fn extract_session_headers(&mut self, headers: &HeaderMap) {
        if let Some(token) = headers.get("X-CSRF-Token").and_then(|v| v.to_str().ok()) {
            self.session_headers
                .insert("X-CSRF-Token".to_owned(), token.to_owned());
            self.csrf_token = token.to_owned();
        }
        if let Some(auth) = headers.get("Authorization").and_then(|v| v.to_str().ok()) {
            self.session_headers
                .insert("Authorization".to_owned(), auth.to_owned());
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn emit(
        &self,
        action: &Action,
        url: &str,
        start: Instant,
        end: Instant,
        status: u16,
        bytes_read: u64,
        error: Option<String>,
    ) {
        self.sink.offer(RequestEvent {
            name: action.name.clone(),
            method: action.method.clone(),
            url: url.to_owned(),
            start,
            end,
            status,
            bytes_read,
            error,
        });
    }
}

fn insert_header(headers: &mut HeaderMap, name: &str, value: &str) {
    match (
        HeaderName::from_bytes(name.as_bytes()),
        HeaderValue::from_str(value),
    ) {
        (Ok(name), Ok(value)) => {
            headers.insert(name, value);
        }
        _ => debug!(header = name, "skipping invalid header"),
    }
}

/// Flatten a reqwest error chain into the short descriptor stored on the
/// event; the default Display of wrapper errors hides the useful cause.
fn error_text(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        return format!("timeout: {err}");
    }
    if err.is_redirect() {
        return format!("redirect loop: {err}");
    }
    let mut text = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        text = format!("{text}: {cause}");
        source = cause.source();
    }
    text
}
