use crate::query::BsonValue;
use bson::{Bson, Document};
use std::fmt;

/// A single interval over the values of one index field, with explicit
/// inclusivity on both ends.
///
/// Unbounded ends are expressed with the `MinKey`/`MaxKey` sentinels, which
/// sort below and above every other BSON value.
#[derive(Debug, Clone, PartialEq)]
pub struct Interval {
    pub start: BsonValue,
    pub end: BsonValue,
    pub start_inclusive: bool,
    pub end_inclusive: bool,
}

impl Interval {
    pub fn new(start: BsonValue, end: BsonValue, start_inclusive: bool, end_inclusive: bool) -> Self {
        Interval {
            start,
            end,
            start_inclusive,
            end_inclusive,
        }
    }

    /// The degenerate interval `[v, v]`.
    pub fn point(value: BsonValue) -> Self {
        Interval {
            start: value.clone(),
            end: value,
            start_inclusive: true,
            end_inclusive: true,
        }
    }

    /// `[MinKey, MaxKey]`: every value, in ascending order.
    pub fn all_values() -> Self {
        Interval {
            start: BsonValue(Bson::MinKey),
            end: BsonValue(Bson::MaxKey),
            start_inclusive: true,
            end_inclusive: true,
        }
    }

    /// `[MaxKey, MinKey]`: every value, in descending order.
    pub fn all_values_reversed() -> Self {
        Interval {
            start: BsonValue(Bson::MaxKey),
            end: BsonValue(Bson::MinKey),
            start_inclusive: true,
            end_inclusive: true,
        }
    }

    pub fn is_point(&self) -> bool {
        self.start_inclusive && self.end_inclusive && self.start == self.end
    }

    /// Swaps the direction of the interval in place.
    pub fn reverse(&mut self) {
        std::mem::swap(&mut self.start, &mut self.end);
        std::mem::swap(&mut self.start_inclusive, &mut self.end_inclusive);
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}, {}{}",
            if self.start_inclusive { '[' } else { '(' },
            self.start,
            self.end,
            if self.end_inclusive { ']' } else { ')' },
        )
    }
}

/// The ordered intervals scanned for one field of an index key pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedIntervalList {
    pub field: String,
    pub intervals: Vec<Interval>,
}

impl OrderedIntervalList {
    pub fn new(field: &str, intervals: Vec<Interval>) -> Self {
        OrderedIntervalList {
            field: field.to_string(),
            intervals,
        }
    }

    pub fn all_values(field: &str) -> Self {
        Self::new(field, vec![Interval::all_values()])
    }
}

/// The bounds of an index scan: one interval list per key-pattern field, in
/// key-pattern order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IndexBounds {
    pub fields: Vec<OrderedIntervalList>,
    /// Set for min/max-style scans expressed as one raw key range; such
    /// bounds cannot be decomposed per field and disqualify the rewrites.
    pub is_simple_range: bool,
}

impl IndexBounds {
    pub fn new(fields: Vec<OrderedIntervalList>) -> Self {
        IndexBounds {
            fields,
            is_simple_range: false,
        }
    }

    /// Bounds spanning every key of the given pattern.
    pub fn all_values(key_pattern: &Document) -> Self {
        IndexBounds {
            fields: key_pattern
                .keys()
                .map(|field| OrderedIntervalList::all_values(field))
                .collect(),
            is_simple_range: false,
        }
    }
}
