//! Decides whether a render context should be built. Outside production mode
//! everything is built. In production mode drafts are skipped, and so are
//! contexts whose publication date hasn't arrived yet; those dates are
//! collected in a [`FutureRegistry`] so a scheduler can rebuild once they pass.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;
use std::fmt;
use std::path::Path;
use std::sync::Mutex;

use crate::context::Context;

/// The keys a publication date may be given under. The first one present
/// wins.
pub const PUBLICATION_DATE_KEYS: [&str; 4] = [
    "publicationDate",
    "publication_date",
    "publication date",
    "publication:date",
];

const DRAFT_KEY: &str = "draft";

/// The environment variable selecting the build mode.
pub const MODE_VAR: &str = "ORCHID_ENV";

/// The build mode. Gating only applies in [`Mode::Production`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Development,
    Production,
}

impl Mode {
    /// Reads the mode from `ORCHID_ENV`, if set.
    pub fn from_env() -> Option<Mode> {
        std::env::var(MODE_VAR).ok().map(|value| Mode::from_name(&value))
    }

    /// `production` (any case) is production; anything else is development.
    pub fn from_name(name: &str) -> Mode {
        if name.trim().eq_ignore_ascii_case("production") {
            Mode::Production
        } else {
            Mode::Development
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Mode::Development => write!(f, "development"),
            Mode::Production => write!(f, "production"),
        }
    }
}

/// The outcome of gating one context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildDecision {
    Build,

    /// The context is marked as a draft.
    SkipDraft,

    /// The publication date is in the future. The date has been registered.
    SkipFuture(DateTime<Utc>),

    /// The publication date couldn't be parsed.
    SkipInvalidDate,
}

impl BuildDecision {
    pub fn should_build(self) -> bool {
        self == BuildDecision::Build
    }
}

/// A source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock stopped at a single instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// The distinct future publication dates seen during a run, in the order they
/// were first seen. Safe to append to from concurrent builds.
#[derive(Debug, Default)]
pub struct FutureRegistry {
    dates: Mutex<Vec<DateTime<Utc>>>,
}

impl FutureRegistry {
    pub fn new() -> FutureRegistry {
        FutureRegistry::default()
    }

    /// Adds `date` unless an equal instant is already registered. Returns
    /// whether it was added.
    pub fn register(&self, date: DateTime<Utc>) -> bool {
        let mut dates = self.lock();
        if dates.contains(&date) {
            false
        } else {
            dates.push(date);
            true
        }
    }

    /// Returns a snapshot of the registered dates.
    pub fn dates(&self) -> Vec<DateTime<Utc>> {
        self.lock().clone()
    }

    /// Replaces the registered dates, returning the previous ones. Pass an
    /// empty vector to reset between runs.
    pub fn replace(&self, dates: Vec<DateTime<Utc>>) -> Vec<DateTime<Utc>> {
        let mut deduped: Vec<DateTime<Utc>> = Vec::with_capacity(dates.len());
        for date in dates {
            if !deduped.contains(&date) {
                deduped.push(date);
            }
        }
        std::mem::replace(&mut *self.lock(), deduped)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A poisoned lock still holds a valid list of dates.
    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<DateTime<Utc>>> {
        self.dates.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Gates contexts against the build mode and the clock, recording deferred
/// publication dates.
pub struct BuildGate {
    mode: Mode,
    clock: Box<dyn Clock>,
    registry: FutureRegistry,
}

impl BuildGate {
    pub fn new(mode: Mode) -> BuildGate {
        BuildGate::with_clock(mode, Box::new(SystemClock))
    }

    pub fn with_clock(mode: Mode, clock: Box<dyn Clock>) -> BuildGate {
        BuildGate {
            mode,
            clock,
            registry: FutureRegistry::new(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn registry(&self) -> &FutureRegistry {
        &self.registry
    }

    /// Decides whether `context` should be built. `id` names the source in
    /// log messages.
    pub fn decide(&self, id: &Path, context: &Context) -> BuildDecision {
        if self.mode != Mode::Production {
            return BuildDecision::Build;
        }

        if context.get(DRAFT_KEY).map_or(false, is_truthy) {
            tracing::debug!("skipping draft {}", id.display());
            return BuildDecision::SkipDraft;
        }

        let value = match publication_date(context) {
            None => return BuildDecision::Build,
            Some(value) => value,
        };

        match parse_date(value) {
            None => {
                tracing::warn!("Invalid publication date in {}", id.display());
                BuildDecision::SkipInvalidDate
            }
            Some(date) if date > self.clock.now() => {
                tracing::debug!(
                    "deferring {} until its publication date {}",
                    id.display(),
                    date.to_rfc3339()
                );
                self.registry.register(date);
                BuildDecision::SkipFuture(date)
            }
            Some(_) => BuildDecision::Build,
        }
    }
}

fn publication_date(context: &Context) -> Option<&Value> {
    PUBLICATION_DATE_KEYS
        .iter()
        .filter_map(|key| context.get(*key))
        .find(|value| !value.is_null())
}

/// Truthiness as front matter authors expect it: `false`, `0`, `""` and
/// `null` are false, everything else is true.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Parses a publication date. Strings may be RFC 3339, RFC 2822, or a naive
/// date or date-time (read as UTC); integers are Unix epoch milliseconds.
pub fn parse_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_date_str(s.trim()),
        Value::Number(n) => n
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        _ => None,
    }
}

fn parse_date_str(s: &str) -> Option<DateTime<Utc>> {
    const NAIVE_DATE_TIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

    if let Ok(date) = DateTime::parse_from_rfc3339(s) {
        return Some(date.with_timezone(&Utc));
    }
    if let Ok(date) = DateTime::parse_from_rfc2822(s) {
        return Some(date.with_timezone(&Utc));
    }
    for format in NAIVE_DATE_TIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn context(value: Value) -> Context {
        match value {
            Value::Object(map) => map,
            _ => panic!("not a mapping"),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn production() -> BuildGate {
        BuildGate::with_clock(Mode::Production, Box::new(FixedClock(now())))
    }

    fn id() -> &'static Path {
        Path::new("pages/post.hbs")
    }

    #[test]
    fn test_development_always_builds() {
        let gate = BuildGate::with_clock(Mode::Development, Box::new(FixedClock(now())));
        for ctx in [
            json!({"draft": true}),
            json!({"publication_date": "2999-01-01"}),
            json!({"publication_date": "not a date"}),
        ] {
            assert_eq!(gate.decide(id(), &context(ctx)), BuildDecision::Build);
        }
        assert!(gate.registry().is_empty());
    }

    #[test]
    fn test_draft_is_skipped() {
        let gate = production();
        assert_eq!(
            gate.decide(id(), &context(json!({"draft": true}))),
            BuildDecision::SkipDraft
        );
        assert_eq!(
            gate.decide(id(), &context(json!({"draft": "yes"}))),
            BuildDecision::SkipDraft
        );
        assert_eq!(
            gate.decide(id(), &context(json!({"draft": false}))),
            BuildDecision::Build
        );
        assert_eq!(
            gate.decide(id(), &context(json!({"draft": 0}))),
            BuildDecision::Build
        );
    }

    #[test]
    fn test_draft_wins_over_future_date() {
        let gate = production();
        assert_eq!(
            gate.decide(
                id(),
                &context(json!({"draft": true, "publication_date": "2999-01-01"}))
            ),
            BuildDecision::SkipDraft
        );
        assert!(gate.registry().is_empty());
    }

    #[test]
    fn test_registry_concurrent_registration() {
        use std::sync::Arc;

        let registry = Arc::new(FutureRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    let mut added = 0;
                    // every worker offers the same five years, starting at a
                    // different one
                    for i in 0..5 {
                        let year = 2990 + (worker + i) % 5;
                        let date = Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).unwrap();
                        if registry.register(date) {
                            added += 1;
                        }
                    }
                    added
                })
            })
            .collect();

        let added: i32 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(added, 5);
        assert_eq!(registry.len(), 5);
        let mut dates = registry.dates();
        dates.sort();
        dates.dedup();
        assert_eq!(dates.len(), 5);
    }

    #[test]
    fn test_future_dates_are_registered_once() {
        let gate = production();
        let first = Utc.with_ymd_and_hms(2999, 1, 1, 0, 0, 0).unwrap();
        let second = Utc.with_ymd_and_hms(3000, 1, 1, 0, 0, 0).unwrap();

        assert_eq!(
            gate.decide(id(), &context(json!({"publicationDate": "2999-01-01T00:00:00Z"}))),
            BuildDecision::SkipFuture(first)
        );
        assert_eq!(
            gate.decide(id(), &context(json!({"publication_date": "2999-01-01T00:00:00Z"}))),
            BuildDecision::SkipFuture(first)
        );
        assert_eq!(gate.registry().dates(), vec![first]);

        gate.decide(id(), &context(json!({"publication date": "3000-01-01T00:00:00Z"})));
        assert_eq!(gate.registry().dates(), vec![first, second]);
    }

    #[test]
    fn test_past_date_builds() {
        let gate = production();
        assert_eq!(
            gate.decide(id(), &context(json!({"publication:date": "2020-01-01"}))),
            BuildDecision::Build
        );
        assert_eq!(
            gate.decide(id(), &context(json!({"publication_date": now().to_rfc3339()}))),
            BuildDecision::Build
        );
    }

    #[test]
    fn test_invalid_date_is_skipped() {
        let gate = production();
        assert_eq!(
            gate.decide(id(), &context(json!({"publication_date": "someday"}))),
            BuildDecision::SkipInvalidDate
        );
        assert_eq!(
            gate.decide(id(), &context(json!({"publication_date": true}))),
            BuildDecision::SkipInvalidDate
        );
        assert!(gate.registry().is_empty());
    }

    #[test]
    fn test_first_present_key_wins() {
        let gate = production();
        // `publicationDate` comes first, so the invalid spelling later on is
        // never looked at.
        assert_eq!(
            gate.decide(
                id(),
                &context(json!({
                    "publicationDate": "2020-01-01",
                    "publication_date": "garbage",
                }))
            ),
            BuildDecision::Build
        );
    }

    #[test]
    fn test_parse_date_forms() {
        let midnight = Utc.with_ymd_and_hms(2021, 4, 16, 0, 0, 0).unwrap();
        assert_eq!(parse_date(&json!("2021-04-16")), Some(midnight));
        assert_eq!(parse_date(&json!("2021-04-16T00:00:00")), Some(midnight));
        assert_eq!(parse_date(&json!("2021-04-16 00:00:00")), Some(midnight));
        assert_eq!(parse_date(&json!("2021-04-16T02:00:00+02:00")), Some(midnight));
        assert_eq!(parse_date(&json!("Fri, 16 Apr 2021 00:00:00 +0000")), Some(midnight));
        assert_eq!(parse_date(&json!(midnight.timestamp_millis())), Some(midnight));
        assert_eq!(parse_date(&json!("16/04/2021")), None);
    }

    #[test]
    fn test_registry_replace() {
        let registry = FutureRegistry::new();
        let date = Utc.with_ymd_and_hms(2999, 1, 1, 0, 0, 0).unwrap();
        assert!(registry.register(date));
        assert!(!registry.register(date));
        assert_eq!(registry.replace(vec![date, date]), vec![date]);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.replace(Vec::new()), vec![date]);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_mode_from_name() {
        assert_eq!(Mode::from_name("production"), Mode::Production);
        assert_eq!(Mode::from_name("PRODUCTION"), Mode::Production);
        assert_eq!(Mode::from_name("dev"), Mode::Development);
    }
}
