/*! Barrage is a scripted HTTP load generator.

An operator supplies a scenario (an ordered list of templated HTTP actions),
a user count, a per-user request rate and a duration; barrage spawns that
many simulated users, each of which replays the scenario in a loop while
keeping the session state a browser would: a private cookie jar, persistent
headers, and the current CSRF token. Latencies aggregate into per-action HDR
histograms and come out as a terminal table plus an optional JSON report.

# Concepts

* *Scenario* - The ordered sequence of [actions](scenario::Action) loaded
  from a YAML script. Frozen at startup and shared by every worker.

* *Worker* - One simulated user. Owns its HTTP client, cookie jar, rate
  limiter and random source; walks the scenario until the run is cancelled.
  Session state never crosses workers, so measurements stay independent.

* *Metric sink* - A bounded channel between the many workers and the single
  aggregator task. Submission never blocks; when the sink is full the event
  is dropped rather than distorting the request rate being measured.

* *Runner* - Spawns the workers under one cancellation scope, waits for
  drain, and guarantees a final report on deadline expiry and operator
  interrupt alike.

# Architecture

```text
  ┌────────┐ spawns  ┌─────────┐ events  ┌────────────┐ drain ┌────────────┐
  │ Runner ├────────►│ Workers ├────────►│ metric sink├──────►│ aggregator │
  └───┬────┘         └─────────┘         └────────────┘       └─────┬──────┘
      │ cancel scope      ▲                                         │
      └───────────────────┘                  snapshots ┌────────────┴──┐
                                             ◄─────────┤   Reporter    │
                                                       └───────────────┘
```

Data flows one way from workers to the aggregator; the aggregator is the
single writer of histogram state and the reporter only ever reads.
*/

pub mod cli;
pub mod client;
pub mod credentials;
pub mod error;
pub mod metrics;
pub mod rate;
pub mod report;
pub mod runner;
pub mod scenario;
pub mod template;
pub mod worker;

pub use error::Error;
