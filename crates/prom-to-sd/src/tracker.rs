//! Per-source memory of cumulative series.
//!
//! A tracker is owned by exactly one source worker and is only touched from
//! that worker's cycle, so it needs no locking. Sharing one across workers
//! would require wrapping it in a mutex with a well defined lock scope.

use std::collections::HashMap;
use std::fmt;

use chrono::DateTime;
use chrono::Utc;

use crate::model::Labels;

/// Stable identity of one series: source, metric name and canonical labels.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeriesKey(String);

impl SeriesKey {
    /// Labels are canonicalized by name, so insertion order never matters.
    /// Names and values are escaped so distinct label sets never collide.
    pub fn new(source: &str, metric: &str, labels: &Labels) -> Self {
        let mut key = String::with_capacity(source.len() + metric.len() + labels.len() * 16);
        push_escaped(&mut key, source);
        key.push('/');
        push_escaped(&mut key, metric);
        key.push('{');
        for (i, (name, value)) in labels.iter().enumerate() {
            if i > 0 {
                key.push(',');
            }
            push_escaped(&mut key, name);
            key.push_str("=\"");
            push_escaped(&mut key, value);
            key.push('"');
        }
        key.push('}');
        SeriesKey(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn push_escaped(out: &mut String, s: &str) {
    for c in s.chars() {
        if matches!(c, '\\' | '"' | ',' | '{' | '}' | '/' | '=') {
            out.push('\\');
        }
        out.push(c);
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Remembered state of one cumulative series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CounterState {
    /// First observation, or the observation at which the last reset was seen.
    pub start: DateTime<Utc>,
    pub last_value: f64,
    pub last_seen: DateTime<Utc>,
}

/// Result of one observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub start: DateTime<Utc>,
    pub reset: bool,
}

#[derive(Debug, Default)]
pub struct CounterStateTracker {
    states: HashMap<SeriesKey, CounterState>,
}

impl CounterStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `value` at `timestamp` and returns the start of its
    /// cumulative interval.
    ///
    /// A value lower than the last one is a reset: the series restarts at
    /// `timestamp`. Repeating an identical observation changes nothing.
    /// NaN and infinite values are not observations: they return `None` and
    /// leave the state untouched.
    /// Entries are never evicted; cardinality is bounded by configuration.
    pub fn observe(
        &mut self,
        key: &SeriesKey,
        value: f64,
        timestamp: DateTime<Utc>,
    ) -> Option<Observation> {
        if !value.is_finite() {
            return None;
        }

        let fresh = CounterState {
            start: timestamp,
            last_value: value,
            last_seen: timestamp,
        };

        let observation = match self.states.get_mut(key) {
            None => {
                self.states.insert(key.clone(), fresh);
                Observation {
                    start: timestamp,
                    reset: false,
                }
            }
            Some(state) if value < state.last_value => {
                *state = fresh;
                Observation {
                    start: timestamp,
                    reset: true,
                }
            }
            Some(state) => {
                state.last_value = value;
                if timestamp > state.last_seen {
                    state.last_seen = timestamp;
                }
                Observation {
                    start: state.start,
                    reset: false,
                }
            }
        };
        Some(observation)
    }

    pub fn get(&self, key: &SeriesKey) -> Option<&CounterState> {
        self.states.get(key)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
