/// Decides when an item-set's working buffer is full and must be pushed
/// into a child segment.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SplitTrigger {
    /// Full once the serialized buffer exceeds this many bytes.
    SizeOfMem(usize),
    /// Full once the buffer holds at least this many items.
    Length(usize),
}

impl Default for SplitTrigger {
    fn default() -> Self {
        SplitTrigger::SizeOfMem(10 * 1024 * 1024)
    }
}

impl SplitTrigger {
    pub(crate) fn is_full(&self, buffer_len: usize, buffer_bytes: usize) -> bool {
        match *self {
            SplitTrigger::SizeOfMem(threshold) => buffer_bytes > threshold,
            SplitTrigger::Length(threshold) => buffer_len >= threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_of_mem_trigger() {
        let trigger = SplitTrigger::SizeOfMem(21);

        assert!(!trigger.is_full(100, 21), "threshold itself is not full");
        assert!(trigger.is_full(1, 22));
    }

    #[test]
    fn test_length_trigger() {
        let trigger = SplitTrigger::Length(2);

        assert!(!trigger.is_full(1, usize::MAX));
        assert!(trigger.is_full(2, 0));
    }
}
