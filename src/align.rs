//! Time alignment of decoded record streams.
//!
//! An [Aligner] consumes decoded records one at a time, resolves each
//! record's timestamp, and accumulates one value series per schema variable
//! in positional lockstep with the time list. [Aligner::finish] applies the
//! unique ascending sort order and hands back the frozen [AlignedSeries].

use std::collections::BTreeMap;

use tracing::trace;

use crate::record::{DecodedRecord, Value};
use crate::schema::{RecordSchema, Variable};
use crate::timestamp::TimeResolver;

/// Accumulates one stream of records into per-variable time series.
///
/// Owns its accumulation state; one producer per instance. For partitioned
/// ingestion, build one aligner per partition and merge the outputs.
pub struct Aligner {
    schema: RecordSchema,
    resolver: TimeResolver,
    start: i64,
    end: i64,
    intake: i64,
    times: Vec<i64>,
    values: Vec<Vec<Option<Value>>>,
    dates_resolved: bool,
}

impl Aligner {
    /// An aligner admitting resolved timestamps within `[start, end]`
    /// inclusive, in epoch milliseconds. Records without a resolvable
    /// timestamp bypass the window; see [Aligner::push_record].
    #[must_use]
    pub fn new(schema: &RecordSchema, start: i64, end: i64) -> Self {
        Self::with_resolver(schema, start, end, TimeResolver::new())
    }

    /// Same, with a caller-supplied resolver (e.g. one with a pinned base
    /// instant).
    #[must_use]
    pub fn with_resolver(
        schema: &RecordSchema,
        start: i64,
        end: i64,
        resolver: TimeResolver,
    ) -> Self {
        Aligner {
            schema: schema.clone(),
            resolver,
            start,
            end,
            intake: 0,
            times: Vec::new(),
            values: vec![Vec::new(); schema.variables.len()],
            dates_resolved: false,
        }
    }

    /// Ingest one decoded record.
    ///
    /// A record whose timestamp does not resolve is always admitted under a
    /// synthetic timestamp, its 1-based intake ordinal, so ordering stays
    /// deterministic; the admission window only filters records that carry a
    /// real timestamp.
    pub fn push_record(&mut self, record: &DecodedRecord) {
        self.intake += 1;
        let timestamp = match self.resolver.resolve(record) {
            Some(instant) => {
                let millis = instant.timestamp_millis();
                if millis < self.start || millis > self.end {
                    trace!(timestamp = millis, "record outside admission window");
                    return;
                }
                self.dates_resolved = true;
                millis
            }
            None => self.intake,
        };
        self.times.push(timestamp);
        for (variable, series) in self.schema.variables.iter().zip(&mut self.values) {
            series.push(record.get(variable).and_then(Clone::clone));
        }
    }

    /// Sort, deduplicate, and freeze the accumulated series.
    #[must_use]
    pub fn finish(self) -> AlignedSeries {
        let keep = unique_ascending(&self.times);
        let times = keep.iter().map(|&i| self.times[i]).collect();
        let values = self
            .values
            .into_iter()
            .map(|series| keep.iter().map(|&i| series[i].clone()).collect())
            .collect();
        AlignedSeries {
            variables: self.schema.variables,
            times,
            values,
            dates_resolved: self.dates_resolved,
        }
    }
}

/// Indexes of the unique ascending ordering of `times`: sorted by value,
/// first-encountered intake position wins among duplicates.
fn unique_ascending(times: &[i64]) -> Vec<usize> {
    let mut order = BTreeMap::new();
    for (index, &time) in times.iter().enumerate() {
        order.entry(time).or_insert(index);
    }
    order.into_values().collect()
}

/// Positionally aligned output series: one time list plus one value list per
/// variable, all the same length, times strictly increasing.
#[derive(Debug, Clone)]
pub struct AlignedSeries {
    variables: Vec<Variable>,
    times: Vec<i64>,
    values: Vec<Vec<Option<Value>>>,
    dates_resolved: bool,
}

impl AlignedSeries {
    /// Timestamps in epoch milliseconds (or synthetic ordinals when
    /// [AlignedSeries::dates_resolved] is false), strictly increasing.
    #[must_use]
    pub fn times(&self) -> &[i64] {
        &self.times
    }

    /// The value series for a variable, located by the identity rule
    /// (id match when both sides carry one, else case-insensitive name
    /// plus column index).
    #[must_use]
    pub fn series(&self, variable: &Variable) -> Option<&[Option<Value>]> {
        self.variables
            .iter()
            .position(|v| v.matches(variable))
            .map(|i| self.values[i].as_slice())
    }

    /// The value series for the first variable with this name,
    /// case-insensitive.
    #[must_use]
    pub fn series_by_name(&self, name: &str) -> Option<&[Option<Value>]> {
        self.variables
            .iter()
            .position(|v| v.name.eq_ignore_ascii_case(name))
            .map(|i| self.values[i].as_slice())
    }

    #[must_use]
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// True when at least one admitted record carried a real timestamp;
    /// false means [AlignedSeries::times] holds synthetic ordinals only.
    #[must_use]
    pub fn dates_resolved(&self) -> bool {
        self.dates_resolved
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.times.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn schema() -> RecordSchema {
        RecordSchema::delimited(
            vec![
                Variable::builder()
                    .name("time")
                    .format("long")
                    .units("epoch milliseconds")
                    .column_index(1)
                    .build(),
                Variable::builder()
                    .name("obs")
                    .format("string")
                    .column_index(2)
                    .build(),
            ],
            "comma",
        )
    }

    fn resolver() -> TimeResolver {
        TimeResolver::with_base(Utc.with_ymd_and_hms(2020, 6, 1, 0, 0, 0).unwrap())
    }

    fn record(schema: &RecordSchema, millis: i64, obs: &str) -> DecodedRecord {
        let mut r = DecodedRecord::default();
        r.push(&schema.variables[0], Some(Value::Long(millis)));
        r.push(&schema.variables[1], Some(Value::Text(obs.to_string())));
        r
    }

    fn obs_only(schema: &RecordSchema, obs: &str) -> DecodedRecord {
        let mut r = DecodedRecord::default();
        r.push(&schema.variables[1], Some(Value::Text(obs.to_string())));
        r
    }

    #[test]
    fn duplicate_timestamps_keep_first_encountered() {
        let schema = schema();
        let mut aligner = Aligner::with_resolver(&schema, 0, i64::MAX, resolver());
        for (millis, obs) in [(5, "A"), (3, "B"), (5, "C"), (1, "D")] {
            aligner.push_record(&record(&schema, millis, obs));
        }
        let series = aligner.finish();
        assert_eq!(series.times(), &[1, 3, 5]);
        let obs: Vec<_> = series
            .series_by_name("obs")
            .unwrap()
            .iter()
            .map(|v| v.clone().unwrap().to_string())
            .collect();
        assert_eq!(obs, ["D", "B", "A"]);
        assert!(series.dates_resolved());
    }

    #[test]
    fn empty_input_yields_empty_series() {
        let schema = schema();
        let series = Aligner::with_resolver(&schema, 0, i64::MAX, resolver()).finish();
        assert!(series.is_empty());
        assert_eq!(series.series_by_name("obs").unwrap().len(), 0);
        assert!(!series.dates_resolved());
    }

    #[test]
    fn all_duplicates_collapse_to_one_element() {
        let schema = schema();
        let mut aligner = Aligner::with_resolver(&schema, 0, i64::MAX, resolver());
        for obs in ["A", "B", "C"] {
            aligner.push_record(&record(&schema, 42, obs));
        }
        let series = aligner.finish();
        assert_eq!(series.times(), &[42]);
        assert_eq!(
            series.series_by_name("obs").unwrap(),
            &[Some(Value::Text("A".to_string()))]
        );
    }

    #[test]
    fn series_stay_in_lockstep_with_times() {
        let schema = schema();
        let mut aligner = Aligner::with_resolver(&schema, 0, i64::MAX, resolver());
        for (millis, obs) in [(9, "A"), (2, "B"), (9, "C"), (4, "D")] {
            aligner.push_record(&record(&schema, millis, obs));
        }
        let series = aligner.finish();
        for variable in series.variables().to_vec() {
            assert_eq!(
                series.series(&variable).unwrap().len(),
                series.times().len()
            );
        }
        assert!(series.times().windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let schema = schema();
        let mut aligner = Aligner::with_resolver(&schema, 10, 20, resolver());
        for millis in [9, 10, 15, 20, 21] {
            aligner.push_record(&record(&schema, millis, "x"));
        }
        assert_eq!(aligner.finish().times(), &[10, 15, 20]);
    }

    #[test]
    fn unresolved_records_bypass_the_window() {
        let schema = schema();
        let mut aligner = Aligner::with_resolver(
            &schema,
            1_700_000_000_000,
            1_700_000_010_000,
            resolver(),
        );
        aligner.push_record(&obs_only(&schema, "A"));
        aligner.push_record(&record(&schema, 1_700_000_005_000, "B"));
        aligner.push_record(&obs_only(&schema, "C"));
        let series = aligner.finish();
        // synthetic ordinals 1 and 3 are admitted despite the window
        assert_eq!(series.times(), &[1, 3, 1_700_000_005_000]);
        assert_eq!(
            series.series_by_name("obs").unwrap(),
            &[
                Some(Value::Text("A".to_string())),
                Some(Value::Text("C".to_string())),
                Some(Value::Text("B".to_string())),
            ]
        );
    }

    #[test]
    fn dates_resolved_requires_an_admitted_dated_record() {
        let schema = schema();
        let mut aligner = Aligner::with_resolver(&schema, 10, 20, resolver());
        // dated but outside the window, then undated
        aligner.push_record(&record(&schema, 99, "A"));
        aligner.push_record(&obs_only(&schema, "B"));
        let series = aligner.finish();
        assert_eq!(series.times(), &[2]);
        assert!(!series.dates_resolved());
    }

    #[test]
    fn unresolved_records_get_intake_ordinals() {
        let schema = schema();
        let mut aligner = Aligner::with_resolver(&schema, 0, i64::MAX, resolver());
        for obs in ["A", "B", "C"] {
            aligner.push_record(&obs_only(&schema, obs));
        }
        let series = aligner.finish();
        assert_eq!(series.times(), &[1, 2, 3]);
        assert!(!series.dates_resolved());
    }

    #[test]
    fn missing_values_are_kept_as_gaps() {
        let schema = schema();
        let mut aligner = Aligner::with_resolver(&schema, 0, i64::MAX, resolver());
        aligner.push_record(&record(&schema, 1, "A"));
        let mut gap = DecodedRecord::default();
        gap.push(&schema.variables[0], Some(Value::Long(2)));
        aligner.push_record(&gap);
        let series = aligner.finish();
        assert_eq!(
            series.series_by_name("obs").unwrap(),
            &[Some(Value::Text("A".to_string())), None]
        );
    }
}
