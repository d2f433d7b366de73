//! Timestamped operation records, the vertices of the precedence graph.

use std::fmt;

/// Whether an operation observed a value or produced one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    /// A read of the tracked key; `value` is the value observed.
    Read,
    /// A write of the tracked key; `value` is the value written.
    Write,
}

/// One completed request/response pair, immutable once created.
///
/// `start` and `end` are logical-clock readings taken just before the call was
/// dispatched and just after it returned; they bracket, but do not pin, the
/// call's real-time execution interval. `start < end` always.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpRecord {
    /// Clock reading taken before the call was issued.
    pub start: u64,
    /// Clock reading taken after the response arrived.
    pub end: u64,
    /// Value written (for writes) or observed (for reads).
    pub value: String,
    /// Read or write.
    pub kind: OpKind,
}

impl OpRecord {
    /// Create a read record.
    pub fn read(start: u64, end: u64, value: impl Into<String>) -> Self {
        Self {
            start,
            end,
            value: value.into(),
            kind: OpKind::Read,
        }
    }

    /// Create a write record.
    pub fn write(start: u64, end: u64, value: impl Into<String>) -> Self {
        Self {
            start,
            end,
            value: value.into(),
            kind: OpKind::Write,
        }
    }

    /// Real-time-certain precedence: this operation completed before `other`
    /// began. Overlapping intervals are possibly concurrent and yield `false`.
    pub fn happens_before(&self, other: &OpRecord) -> bool {
        self.end < other.start
    }

    /// Whether this record is a read.
    pub fn is_read(&self) -> bool {
        self.kind == OpKind::Read
    }
}

impl fmt::Display for OpRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.kind {
            OpKind::Read => 'R',
            OpKind::Write => 'W',
        };
        write!(f, "[{}-{}]{}({})", self.start, self.end, tag, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happens_before_requires_disjoint_intervals() {
        let earlier = OpRecord::write(1, 4, "1");
        let later = OpRecord::read(5, 9, "1");
        let overlapping = OpRecord::read(3, 7, "1");

        assert!(earlier.happens_before(&later));
        assert!(!later.happens_before(&earlier));
        assert!(!earlier.happens_before(&overlapping));
        assert!(!overlapping.happens_before(&earlier));
    }

    #[test]
    fn test_touching_intervals_are_concurrent() {
        // end == start means the two calls raced on the clock; no ordering.
        let a = OpRecord::write(1, 5, "1");
        let b = OpRecord::read(5, 8, "1");
        assert!(!a.happens_before(&b));
    }

    #[test]
    fn test_display_format() {
        assert_eq!(OpRecord::write(3, 17, "42").to_string(), "[3-17]W(42)");
        assert_eq!(OpRecord::read(20, 25, "42").to_string(), "[20-25]R(42)");
    }
}
