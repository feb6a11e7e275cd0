//! Scenario model: the ordered list of HTTP actions every worker replays.
//!
//! A scenario file is a YAML sequence of action records. Duration fields are
//! human-readable literals (`250ms`, `2s`, `1m`) and are converted to typed
//! [`Duration`]s at load time so a bad literal fails before any worker
//! starts. Unknown fields are ignored.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use rand::Rng;
use serde::Deserialize;

use crate::error::Error;

/// Inter-action pause, resolved per iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelaySpec {
    None,
    Fixed(Duration),
    /// Uniform random delay in `[min, max]`.
    Range(Duration, Duration),
}

impl DelaySpec {
    /// Sample a concrete delay, or `None` when the action has no delay.
    pub fn sample(&self, rng: &mut impl Rng) -> Option<Duration> {
        match *self {
            DelaySpec::None => None,
            DelaySpec::Fixed(d) => Some(d),
            DelaySpec::Range(min, max) => {
                let nanos = rng.gen_range(min.as_nanos()..=max.as_nanos());
                Some(Duration::from_nanos(nanos as u64))
            }
        }
    }
}

/// One HTTP step of the scenario. Immutable once parsed.
#[derive(Debug, Clone)]
pub struct Action {
    /// Labels the metric bucket for this step.
    pub name: String,
    pub method: String,
    pub url: String,
    /// Preferred over `body` when both are present.
    pub json_body: Option<String>,
    /// Form body; the literal `CSRF_TOKEN_PLACEHOLDER` is substituted by the
    /// worker before dispatch.
    pub body: Option<String>,
    pub headers: HashMap<String, String>,
    /// Expected status code; 0 disables the assertion.
    pub expect_status: u16,
    /// Per-action request deadline, overriding the client default.
    pub timeout: Option<Duration>,
    pub delay: DelaySpec,
}

/// Parsed scenario, shared read-only between workers.
#[derive(Debug)]
pub struct Scenario {
    pub actions: Vec<Action>,
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let data = std::fs::read_to_string(path).map_err(|source| Error::ScriptRead {
            path: path.to_owned(),
            source,
        })?;
        let raw: Vec<RawAction> =
            serde_yaml::from_str(&data).map_err(|source| Error::ScriptParse {
                path: path.to_owned(),
                source,
            })?;
        if raw.is_empty() {
            return Err(Error::ScriptEmpty {
                path: path.to_owned(),
            });
        }
        let actions = raw
            .into_iter()
            .map(RawAction::into_action)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Scenario { actions })
    }
}

/// Wire form of an action as it appears in the YAML file.
#[derive(Debug, Deserialize)]
struct RawAction {
    name: String,
    method: String,
    url: String,
    #[serde(default)]
    json_body: Option<String>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(default)]
    expect_status: u16,
    #[serde(default)]
    timeout: Option<String>,
    #[serde(default)]
    delay: Option<String>,
    #[serde(default)]
    delay_min: Option<String>,
    #[serde(default)]
    delay_max: Option<String>,
}

impl RawAction {
    fn into_action(self) -> Result<Action, Error> {
        let timeout = self
            .timeout
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| parse_duration(&self.name, "timeout", s))
            .transpose()?;

        // A fixed delay wins over a min/max pair. An inverted or degenerate
        // range means no delay; only unparsable literals are fatal.
        let delay = if let Some(value) = self.delay.as_deref().filter(|s| !s.is_empty()) {
            DelaySpec::Fixed(parse_duration(&self.name, "delay", value)?)
        } else {
            match (
                self.delay_min.as_deref().filter(|s| !s.is_empty()),
                self.delay_max.as_deref().filter(|s| !s.is_empty()),
            ) {
                (Some(min), Some(max)) => {
                    let min = parse_duration(&self.name, "delay_min", min)?;
                    let max = parse_duration(&self.name, "delay_max", max)?;
                    if max > min {
                        DelaySpec::Range(min, max)
                    } else {
                        DelaySpec::None
                    }
                }
                _ => DelaySpec::None,
            }
        };

        Ok(Action {
            name: self.name,
            method: self.method,
            url: self.url,
            json_body: self.json_body.filter(|s| !s.is_empty()),
            body: self.body.filter(|s| !s.is_empty()),
            headers: self.headers,
            expect_status: self.expect_status,
            timeout,
            delay,
        })
    }
}

fn parse_duration(action: &str, field: &'static str, value: &str) -> Result<Duration, Error> {
    humantime::parse_duration(value).map_err(|_| Error::InvalidDuration {
        action: action.to_owned(),
        field,
        value: value.to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;
    use std::io::Write;

    fn load_str(yaml: &str) -> Result<Scenario, Error> {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        Scenario::load(file.path())
    }

    #[test]
    fn parses_full_action() {
        let scenario = load_str(
            r#"
- name: Login
  method: POST
  url: https://example.com/users/sign_in
  body: "user[email]={{username}}&authenticity_token=CSRF_TOKEN_PLACEHOLDER"
  headers:
    Accept: text/html
    Accept-Encoding: gzip
  expect_status: 302
  timeout: 5s
  delay: 250ms
"#,
        )
        .unwrap();

        assert_eq!(scenario.actions.len(), 1);
        let action = &scenario.actions[0];
        assert_eq!(action.name, "Login");
        assert_eq!(action.method, "POST");
        assert_eq!(action.expect_status, 302);
        assert_eq!(action.timeout, Some(Duration::from_secs(5)));
        assert_eq!(action.delay, DelaySpec::Fixed(Duration::from_millis(250)));
        assert_eq!(action.headers.get("Accept").unwrap(), "text/html");
        assert!(action.json_body.is_none());
    }

    #[test]
    fn ignores_unknown_fields() {
        let scenario = load_str(
            r#"
- name: Ping
  method: GET
  url: https://example.com/ping
  comment: not a real field
  weight: 3
"#,
        )
        .unwrap();
        assert_eq!(scenario.actions[0].name, "Ping");
        assert_eq!(scenario.actions[0].expect_status, 0);
        assert_eq!(scenario.actions[0].delay, DelaySpec::None);
    }

    #[test]
    fn bad_duration_literal_is_fatal() {
        let err = load_str(
            r#"
- name: Ping
  method: GET
  url: https://example.com/ping
  delay: "2 fortnights"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidDuration { field: "delay", .. }));
    }

    #[test]
    fn empty_script_is_fatal() {
        let err = load_str("[]").unwrap_err();
        assert!(matches!(err, Error::ScriptEmpty { .. }));
    }

    #[test]
    fn fixed_delay_wins_over_range() {
        let scenario = load_str(
            r#"
- name: Ping
  method: GET
  url: https://example.com/ping
  delay: 1s
  delay_min: 10ms
  delay_max: 20ms
"#,
        )
        .unwrap();
        assert_eq!(
            scenario.actions[0].delay,
            DelaySpec::Fixed(Duration::from_secs(1))
        );
    }

    #[test]
    fn inverted_range_means_no_delay() {
        let scenario = load_str(
            r#"
- name: Ping
  method: GET
  url: https://example.com/ping
  delay_min: 2s
  delay_max: 1s
"#,
        )
        .unwrap();
        assert_eq!(scenario.actions[0].delay, DelaySpec::None);
    }

    #[test]
    fn range_delay_samples_within_bounds() {
        let spec = DelaySpec::Range(Duration::from_millis(10), Duration::from_millis(20));
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..100 {
            let d = spec.sample(&mut rng).unwrap();
            assert!(d >= Duration::from_millis(10) && d <= Duration::from_millis(20));
        }
        assert_eq!(DelaySpec::None.sample(&mut rng), None);
    }
}
