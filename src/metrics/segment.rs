use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;

use super::{Observation, PercentileSet};
use crate::error::{Error, Result};

// ─── Aggregation pattern ─────────────────────────────────────────

/// A path pattern that must match the whole request path.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    pub fn new(source: &str) -> Result<Self> {
        let regex = Regex::new(&format!("^(?:{source})$")).map_err(|e| Error::Pattern {
            pattern: source.to_owned(),
            source: e,
        })?;
        Ok(Self {
            source: source.to_owned(),
            regex,
        })
    }

    /// The pattern as the caller wrote it.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }
}

// ─── Segment ─────────────────────────────────────────────────────

/// What a segment matches request paths against.
#[derive(Debug, Clone)]
pub enum PathMatch {
    Literal(String),
    Pattern(Pattern),
}

impl PathMatch {
    fn matches(&self, path: &str) -> bool {
        match self {
            Self::Literal(literal) => literal == path,
            Self::Pattern(pattern) => pattern.is_match(path),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Literal(literal) => literal,
            Self::Pattern(pattern) => pattern.as_str(),
        }
    }
}

/// One (method, path-or-pattern, status) bucket of a report.
#[derive(Debug, Clone)]
pub struct Segment {
    pub method: String,
    pub path: PathMatch,
    pub status: u16,
    observations: Vec<Observation>,
}

impl Segment {
    fn matches(&self, obs: &Observation) -> bool {
        self.method == obs.method && self.status == obs.status && self.path.matches(&obs.path)
    }

    /// Literal path, or the pattern text for pattern segments.
    pub fn display_path(&self) -> &str {
        self.path.as_str()
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn count(&self) -> usize {
        self.observations.len()
    }

    // ── Response time ───────────────────────────────────────────

    /// `Duration::MAX` for an empty segment.
    pub fn min_response_time(&self) -> Duration {
        self.observations
            .iter()
            .fold(Duration::MAX, |n, o| n.min(o.response_time))
    }

    pub fn max_response_time(&self) -> Duration {
        self.observations
            .iter()
            .fold(Duration::ZERO, |n, o| n.max(o.response_time))
    }

    pub fn sum_response_time(&self) -> Duration {
        self.observations.iter().map(|o| o.response_time).sum()
    }

    /// Truncating mean.
    pub fn avg_response_time(&self) -> Duration {
        if self.observations.is_empty() {
            return Duration::ZERO;
        }
        let avg = self.sum_response_time().as_nanos() / self.observations.len() as u128;
        Duration::from_nanos(u64::try_from(avg).unwrap_or(u64::MAX))
    }

    pub fn response_time_percentiles(&self) -> PercentileSet {
        PercentileSet::from_durations(self.observations.iter().map(|o| o.response_time))
    }

    // ── Response body ───────────────────────────────────────────

    /// `u64::MAX` for an empty segment.
    pub fn min_body(&self) -> u64 {
        self.observations
            .iter()
            .fold(u64::MAX, |n, o| n.min(o.response_body_size))
    }

    pub fn max_body(&self) -> u64 {
        self.observations
            .iter()
            .fold(0, |n, o| n.max(o.response_body_size))
    }

    pub fn sum_body(&self) -> u64 {
        self.observations.iter().map(|o| o.response_body_size).sum()
    }

    pub fn avg_body(&self) -> f64 {
        if self.observations.is_empty() {
            return 0.0;
        }
        self.sum_body() as f64 / self.observations.len() as f64
    }
}

// ─── Segmentation ────────────────────────────────────────────────

/// Group observations into segments and find the earliest access time.
///
/// Each observation joins the first existing segment (in creation order)
/// with the same method and status whose path matches. Otherwise it opens a
/// new segment keyed by the first pattern that fully matches its path, or by
/// the literal path when none does.
pub fn build_segments(
    observations: Vec<Observation>,
    patterns: &[Pattern],
) -> (Vec<Segment>, Option<DateTime<Utc>>) {
    let mut segments: Vec<Segment> = Vec::new();
    let mut since: Option<DateTime<Utc>> = None;

    for obs in observations {
        since = Some(match since {
            Some(t) => t.min(obs.accessed_at),
            None => obs.accessed_at,
        });

        if let Some(seg) = segments.iter_mut().find(|seg| seg.matches(&obs)) {
            seg.observations.push(obs);
            continue;
        }

        let path = patterns
            .iter()
            .find(|p| p.is_match(&obs.path))
            .map(|p| PathMatch::Pattern(p.clone()))
            .unwrap_or_else(|| PathMatch::Literal(obs.path.clone()));
        segments.push(Segment {
            method: obs.method.clone(),
            path,
            status: obs.status,
            observations: vec![obs],
        });
    }

    (segments, since)
}
