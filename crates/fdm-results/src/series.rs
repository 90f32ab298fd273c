//! Column-oriented view over a `(t, y)` log.

use std::ops::Range;
use std::sync::Arc;

use fdm_system::{Record, Value};

use crate::{ResultsError, ResultsResult};

/// A time-indexed log of output snapshots, or of one sub-field of them.
///
/// Cloning and field extraction share the underlying samples: a field series
/// only stores an index path into each snapshot and a sample window.
#[derive(Clone, Debug)]
pub struct TimeSeries {
    t: Arc<[f64]>,
    y: Arc<[Value]>,
    path: Vec<usize>,
    label: String,
    window: Range<usize>,
}

impl TimeSeries {
    /// Build from parallel time and value columns.
    ///
    /// Every sample must have the shape of the first one.
    pub fn new(t: Vec<f64>, y: Vec<Value>) -> ResultsResult<Self> {
        if t.len() != y.len() {
            return Err(ResultsError::LengthMismatch {
                times: t.len(),
                values: y.len(),
            });
        }
        if let Some(first) = y.first()
            && let Some(index) = y.iter().position(|v| !v.same_shape(first))
        {
            return Err(ResultsError::ShapeChanged { index });
        }
        let len = t.len();
        Ok(Self {
            t: t.into(),
            y: y.into(),
            path: Vec::new(),
            label: String::new(),
            window: 0..len,
        })
    }

    /// Build from a run log of `(t, y)` pairs.
    pub fn from_log(log: Vec<(f64, Value)>) -> ResultsResult<Self> {
        let (t, y) = log.into_iter().unzip();
        Self::new(t, y)
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Dotted path of this series within the logged output; empty for the
    /// full output.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn times(&self) -> &[f64] {
        &self.t[self.window.clone()]
    }

    /// Value of sample `i`.
    pub fn value(&self, i: usize) -> Option<&Value> {
        if i >= self.len() {
            return None;
        }
        self.y[self.window.start + i].resolve(&self.path)
    }

    /// Time and value of sample `i`.
    pub fn get(&self, i: usize) -> Option<(f64, &Value)> {
        let v = self.value(i)?;
        Some((self.t[self.window.start + i], v))
    }

    /// Component `j` of numeric sample `i`.
    pub fn at(&self, i: usize, j: usize) -> Option<f64> {
        self.value(i)?.component(j)
    }

    pub fn last(&self) -> Option<(f64, &Value)> {
        self.len().checked_sub(1).and_then(|i| self.get(i))
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, &Value)> + '_ {
        (0..self.len()).filter_map(move |i| self.get(i))
    }

    /// Sub-series for a direct field.
    pub fn field(&self, name: &str) -> ResultsResult<TimeSeries> {
        let index = self
            .template()
            .and_then(Value::as_record)
            .and_then(|r| r.index_of(name))
            .ok_or_else(|| ResultsError::FieldNotFound {
                path: self.child_label(name),
            })?;
        Ok(self.child(index, name))
    }

    /// Sub-series for a dotted path such as `"servo.actuator.throttle"`.
    pub fn path(&self, dotted: &str) -> ResultsResult<TimeSeries> {
        dotted
            .split('.')
            .filter(|s| !s.is_empty())
            .try_fold(self.clone(), |series, name| series.field(name))
    }

    /// Decompose a record series into one series per field, in field order.
    pub fn fields(&self) -> Fields<'_> {
        Fields {
            series: self,
            record: self.template().and_then(Value::as_record),
            next: 0,
        }
    }

    /// All samples of a scalar series, or `None` if it is not scalar.
    pub fn scalars(&self) -> Option<Vec<f64>> {
        self.iter().map(|(_, v)| v.as_f64()).collect()
    }

    /// Component `j` of every sample of a numeric series.
    pub fn column(&self, j: usize) -> Option<Vec<f64>> {
        (0..self.len()).map(|i| self.at(i, j)).collect()
    }

    /// Window of samples `range`, clamped to this series.
    pub fn slice(&self, range: Range<usize>) -> TimeSeries {
        let end = range.end.min(self.len());
        let start = range.start.min(end);
        let mut out = self.clone();
        out.window = self.window.start + start..self.window.start + end;
        out
    }

    /// Index of the last sample at or before `t`.
    pub fn index_at_or_before(&self, t: f64) -> Option<usize> {
        self.times().partition_point(|&s| s <= t).checked_sub(1)
    }

    fn template(&self) -> Option<&Value> {
        self.value(0)
    }

    fn child_label(&self, name: &str) -> String {
        if self.label.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", self.label, name)
        }
    }

    fn child(&self, index: usize, name: &str) -> TimeSeries {
        let mut path = self.path.clone();
        path.push(index);
        TimeSeries {
            t: Arc::clone(&self.t),
            y: Arc::clone(&self.y),
            path,
            label: self.child_label(name),
            window: self.window.clone(),
        }
    }
}

/// Iterator returned by [`TimeSeries::fields`].
pub struct Fields<'a> {
    series: &'a TimeSeries,
    record: Option<&'a Record>,
    next: usize,
}

impl<'a> Iterator for Fields<'a> {
    type Item = (&'a str, TimeSeries);

    fn next(&mut self) -> Option<Self::Item> {
        let record = self.record?;
        let name = record.name_at(self.next)?;
        let series = self.series.child(self.next, name);
        self.next += 1;
        Some((name, series))
    }
}
