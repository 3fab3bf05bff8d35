use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use comfy_table::{presets::ASCII_FULL, CellAlignment, Table};
use serde::Serialize;

use super::segment::{build_segments, Pattern, Segment};
use super::{AccessProf, Observation, PercentileSet};
use crate::error::Result;

pub(crate) const HEADER: [&str; 12] = [
    "STATUS", "METHOD", "PATH", "COUNT", "MIN", "MAX", "SUM", "AVG", "MIN(BODY)", "MAX(BODY)",
    "SUM(BODY)", "AVG(BODY)",
];

/// Columns rendered right-aligned.
pub(crate) const NUMERIC_COLUMNS: [usize; 6] = [0, 3, 8, 9, 10, 11];

// ─── Patterns ────────────────────────────────────────────────────

/// Ordered path patterns used to merge literal paths into segments.
/// Earlier patterns take precedence when a new segment is opened.
#[derive(Debug, Clone, Default)]
pub struct AggregationPatterns {
    patterns: Vec<Pattern>,
}

impl AggregationPatterns {
    /// Compile every pattern, stopping at the first invalid one.
    pub fn compile<I, S>(sources: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = sources
            .into_iter()
            .map(|s| Pattern::new(s.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// Parse the comma separated `agg` query form, e.g. `/users/\d+,/.*\.png`.
    pub fn from_query(query: &str) -> Result<Self> {
        Self::compile(query.split(',').filter(|s| !s.is_empty()))
    }

    pub fn as_slice(&self) -> &[Pattern] {
        &self.patterns
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

// ─── Report ──────────────────────────────────────────────────────

/// Point-in-time aggregation of everything the profiler has seen.
#[derive(Debug, Clone)]
pub struct Report {
    segments: Vec<Segment>,
    patterns: Vec<String>,
    since: Option<DateTime<Utc>>,
}

impl Report {
    pub fn build(observations: Vec<Observation>, patterns: &AggregationPatterns) -> Self {
        let (segments, since) = build_segments(observations, patterns.as_slice());
        Self {
            segments,
            patterns: patterns.as_slice().iter().map(|p| p.as_str().to_owned()).collect(),
            since,
        }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Earliest access time among the included observations.
    pub fn since(&self) -> Option<DateTime<Utc>> {
        self.since
    }

    pub fn total_requests(&self) -> usize {
        self.segments.iter().map(Segment::count).sum()
    }

    pub fn summary(&self) -> ReportSummary {
        ReportSummary {
            total_requests: self.total_requests(),
            since: self.since,
            patterns: self.patterns.clone(),
            segments: self.segments.iter().map(SegmentSummary::from).collect(),
        }
    }
}

impl Report {
    /// One formatted cell per [`HEADER`] column for every segment.
    pub(crate) fn rows(&self) -> Vec<[String; 12]> {
        self.segments
            .iter()
            .map(|seg| {
                [
                    seg.status.to_string(),
                    seg.method.clone(),
                    seg.display_path().to_owned(),
                    seg.count().to_string(),
                    format!("{:?}", seg.min_response_time()),
                    format!("{:?}", seg.max_response_time()),
                    format!("{:?}", seg.sum_response_time()),
                    format!("{:?}", seg.avg_response_time()),
                    seg.min_body().to_string(),
                    seg.max_body().to_string(),
                    seg.sum_body().to_string(),
                    format!("{:.3}", seg.avg_body()),
                ]
            })
            .collect()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut table = Table::new();
        table.load_preset(ASCII_FULL).set_header(HEADER);
        for row in self.rows() {
            table.add_row(row);
        }

        for idx in NUMERIC_COLUMNS {
            if let Some(column) = table.column_mut(idx) {
                column.set_cell_alignment(CellAlignment::Right);
            }
        }

        write!(f, "{table}")
    }
}

// ─── Serializable view ───────────────────────────────────────────

/// JSON shape of a report, shipped by the report endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct ReportSummary {
    pub total_requests: usize,
    pub since: Option<DateTime<Utc>>,
    pub patterns: Vec<String>,
    pub segments: Vec<SegmentSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SegmentSummary {
    pub status: u16,
    pub method: String,
    pub path: String,
    pub is_pattern: bool,
    pub count: usize,
    pub min_response_time_ns: u64,
    pub max_response_time_ns: u64,
    pub sum_response_time_ns: u64,
    pub avg_response_time_ns: u64,
    pub min_body: u64,
    pub max_body: u64,
    pub sum_body: u64,
    /// Rounded to three decimals.
    pub avg_body: f64,
    pub response_time_us: PercentileSet,
}

impl From<&Segment> for SegmentSummary {
    fn from(seg: &Segment) -> Self {
        Self {
            status: seg.status,
            method: seg.method.clone(),
            path: seg.display_path().to_owned(),
            is_pattern: matches!(seg.path, super::segment::PathMatch::Pattern(_)),
            count: seg.count(),
            min_response_time_ns: nanos(seg.min_response_time()),
            max_response_time_ns: nanos(seg.max_response_time()),
            sum_response_time_ns: nanos(seg.sum_response_time()),
            avg_response_time_ns: nanos(seg.avg_response_time()),
            min_body: seg.min_body(),
            max_body: seg.max_body(),
            sum_body: seg.sum_body(),
            avg_body: (seg.avg_body() * 1000.0).round() / 1000.0,
            response_time_us: seg.response_time_percentiles(),
        }
    }
}

fn nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

// ─── Orchestration ───────────────────────────────────────────────

impl AccessProf {
    /// Flush, reload the log file and aggregate it together with whatever
    /// is still buffered. Requests finishing while this runs may or may not
    /// be included.
    pub fn report(&self, patterns: &AggregationPatterns) -> Result<Report> {
        let observations = self.observations()?;
        Ok(Report::build(observations, patterns))
    }
}
