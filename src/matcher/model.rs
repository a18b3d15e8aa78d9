use thiserror::Error;

use crate::model::{Count, Value};

#[derive(Debug, Error, PartialEq, Eq)]
pub(super) enum CloseError {
    #[error("too few values provided for '{name}' (provided={provided}, expected={expected}).")]
    TooFewValues {
        name: String,
        provided: usize,
        expected: usize,
    },
}

/// Accumulates the values of one variadic slot while its bounds allow.
#[derive(Debug)]
pub(super) struct SlotBuffer {
    name: String,
    count: Count,
    values: Vec<Value>,
}

impl SlotBuffer {
    pub(super) fn new(name: impl Into<String>, count: Count) -> Self {
        Self {
            name: name.into(),
            count,
            values: Vec::default(),
        }
    }

    pub(super) fn name(&self) -> &str {
        &self.name
    }

    pub(super) fn push(&mut self, value: Value) {
        self.values.push(value);
    }

    pub(super) fn is_open(&self) -> bool {
        self.count.admits(self.values.len())
    }

    pub(super) fn can_close(&self) -> bool {
        self.values.len() >= self.count.min()
    }

    pub(super) fn close(self) -> Result<(String, Value), CloseError> {
        if self.values.len() < self.count.min() {
            return Err(CloseError::TooFewValues {
                name: self.name,
                provided: self.values.len(),
                expected: self.count.min(),
            });
        }
        Ok((self.name, Value::List(self.values)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{thread_rng, Rng};
    use rstest::rstest;

    #[test]
    fn buffer_fills_to_any_minimum() {
        for _ in 0..100 {
            let count: Count = thread_rng().gen();
            let mut buffer = SlotBuffer::new("item", count);
            for i in 0..count.min() {
                assert!(!buffer.can_close());
                buffer.push(Value::Int(i as i64));
            }
            assert!(buffer.can_close());
            assert_matches!(buffer.close(), Ok((_, Value::List(_))));
        }
    }

    #[rstest]
    #[case(Count::AtLeast(0), 0, true)]
    #[case(Count::AtLeast(1), 0, false)]
    #[case(Count::AtLeast(1), 1, true)]
    #[case(Count::Range(1, 2), 0, false)]
    #[case(Count::Range(1, 2), 1, true)]
    #[case(Count::Range(1, 2), 2, true)]
    #[case(Count::Exactly(2), 1, false)]
    #[case(Count::Exactly(2), 2, true)]
    fn close_respects_lower_bound(
        #[case] count: Count,
        #[case] feed: usize,
        #[case] expected_ok: bool,
    ) {
        // Setup
        let mut buffer = SlotBuffer::new("item", count);
        for i in 0..feed {
            buffer.push(Value::Int(i as i64));
        }

        // Execute & verify
        assert_eq!(buffer.can_close(), expected_ok);
        if expected_ok {
            let (name, value) = buffer.close().unwrap();
            assert_eq!(name, "item");
            assert_eq!(
                value,
                Value::List((0..feed).map(|i| Value::Int(i as i64)).collect())
            );
        } else {
            assert_matches!(buffer.close(), Err(CloseError::TooFewValues { .. }));
        }
    }

    #[rstest]
    #[case(Count::Range(0, 2), 1, true)]
    #[case(Count::Range(0, 2), 2, false)]
    #[case(Count::Exactly(1), 1, false)]
    #[case(Count::AtLeast(0), 100, true)]
    fn open_respects_upper_bound(
        #[case] count: Count,
        #[case] feed: usize,
        #[case] remains_open: bool,
    ) {
        let mut buffer = SlotBuffer::new("item", count);
        for i in 0..feed {
            buffer.push(Value::Int(i as i64));
        }
        assert_eq!(buffer.is_open(), remains_open);
    }
}
