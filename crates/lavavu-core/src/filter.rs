//! Per-object value filters
//!
//! A filter restricts which vertices render by testing a labelled value
//! array against a range. Ranges given as a pair (tuple) exclude their
//! endpoints, ranges given as a list include them, and a single value is an
//! inclusive `[v, v]` range.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Range argument to a filter call
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FilterRange {
    /// Endpoints excluded
    Exclusive(f64, f64),
    /// Endpoints included
    Inclusive(f64, f64),
    /// Degenerate inclusive `[v, v]`
    Single(f64),
    /// Use the full range of the data label
    Full,
}

impl FilterRange {
    /// `(minimum, maximum, inclusive)`, with `full` supplying the data range
    pub fn bounds(&self, full: (f64, f64)) -> (f64, f64, bool) {
        match *self {
            FilterRange::Exclusive(a, b) => (a, b, false),
            FilterRange::Inclusive(a, b) => (a, b, true),
            FilterRange::Single(v) => (v, v, true),
            FilterRange::Full => (full.0, full.1, true),
        }
    }
}

impl From<f64> for FilterRange {
    fn from(v: f64) -> Self {
        FilterRange::Single(v)
    }
}

impl From<(f64, f64)> for FilterRange {
    fn from((a, b): (f64, f64)) -> Self {
        FilterRange::Exclusive(a, b)
    }
}

impl From<[f64; 2]> for FilterRange {
    fn from([a, b]: [f64; 2]) -> Self {
        FilterRange::Inclusive(a, b)
    }
}

impl From<Option<(f64, f64)>> for FilterRange {
    fn from(range: Option<(f64, f64)>) -> Self {
        range.map(FilterRange::from).unwrap_or(FilterRange::Full)
    }
}

/// A filter record as stored in an object's `filters` list
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub by: String,
    pub minimum: f64,
    pub maximum: f64,
    pub map: bool,
    pub out: bool,
    pub inclusive: bool,
}

impl Filter {
    pub fn new(
        by: impl Into<String>,
        range: FilterRange,
        out: bool,
        map: bool,
        full: (f64, f64),
    ) -> Self {
        let (minimum, maximum, inclusive) = range.bounds(if map { (0.0, 1.0) } else { full });
        Self {
            by: by.into(),
            minimum,
            maximum,
            map,
            out,
            // A degenerate range would match nothing if exclusive
            inclusive: inclusive || minimum == maximum,
        }
    }

    /// Bounds in data units, resolving mapped fractions against `data_range`
    pub fn effective_bounds(&self, data_range: (f64, f64)) -> (f64, f64) {
        if self.map {
            let span = data_range.1 - data_range.0;
            (
                data_range.0 + self.minimum * span,
                data_range.0 + self.maximum * span,
            )
        } else {
            (self.minimum, self.maximum)
        }
    }

    /// Whether a vertex with `value` is drawn
    pub fn passes(&self, value: f64, data_range: (f64, f64)) -> bool {
        let (lo, hi) = self.effective_bounds(data_range);
        let within = if self.inclusive {
            value >= lo && value <= hi
        } else {
            value > lo && value < hi
        };
        within != self.out
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn from_json(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}

/// Decode an object's `filters` property, skipping malformed entries
pub fn filters_from_json(value: &Value) -> Vec<Filter> {
    value
        .as_array()
        .map(|items| items.iter().filter_map(Filter::from_json).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tuple_is_exclusive() {
        let f = Filter::new("x", (0.0, 1.0).into(), false, false, (0.0, 0.0));
        assert_eq!(
            f.to_json(),
            json!({
                "by": "x",
                "minimum": 0.0,
                "maximum": 1.0,
                "map": false,
                "out": false,
                "inclusive": false
            })
        );
    }

    #[test]
    fn test_list_and_scalar_inclusive() {
        let f = Filter::new("x", [0.0, 1.0].into(), false, false, (0.0, 0.0));
        assert!(f.inclusive);
        let f = Filter::new("x", 2.5.into(), false, false, (0.0, 0.0));
        assert_eq!((f.minimum, f.maximum, f.inclusive), (2.5, 2.5, true));
    }

    #[test]
    fn test_full_range() {
        let f = Filter::new("x", FilterRange::Full, false, false, (-3.0, 7.0));
        assert_eq!((f.minimum, f.maximum), (-3.0, 7.0));
        let mapped = Filter::new("x", FilterRange::Full, false, true, (-3.0, 7.0));
        assert_eq!((mapped.minimum, mapped.maximum), (0.0, 1.0));
    }

    #[test]
    fn test_endpoint_inclusion() {
        for (a, b) in [(0.0, 1.0), (-5.0, 5.0), (2.0, 2.0)] {
            let keep = Filter::new("v", [a, b].into(), false, false, (0.0, 0.0));
            let drop = Filter::new("v", [a, b].into(), true, false, (0.0, 0.0));
            assert!(keep.passes(a, (a, b)));
            assert!(!drop.passes(a, (a, b)));
        }
        let exclusive = Filter::new("v", (0.0, 1.0).into(), false, false, (0.0, 0.0));
        assert!(!exclusive.passes(0.0, (0.0, 1.0)));
        assert!(exclusive.passes(0.5, (0.0, 1.0)));
    }

    #[test]
    fn test_mapped_bounds() {
        let f = Filter::new("v", [0.25, 0.75].into(), false, true, (0.0, 0.0));
        assert!(f.passes(50.0, (0.0, 100.0)));
        assert!(!f.passes(10.0, (0.0, 100.0)));
    }

    #[test]
    fn test_filters_from_json() {
        let list = json!([
            {
                "by": "x",
                "minimum": 0.0,
                "maximum": 1.0,
                "map": false,
                "out": false,
                "inclusive": true
            },
            {"junk": true}
        ]);
        assert_eq!(filters_from_json(&list).len(), 1);
        assert!(filters_from_json(&json!(null)).is_empty());
    }
}
