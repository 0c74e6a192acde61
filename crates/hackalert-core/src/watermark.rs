use crate::snapshot::FIRST_DATA_ROW;

/// Highest sheet row already handled. Only moves forward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Watermark {
    last_processed: Option<usize>,
}

impl Watermark {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(row: usize) -> Self {
        Self {
            last_processed: Some(row),
        }
    }

    pub fn current(&self) -> Option<usize> {
        self.last_processed
    }

    /// Returns `false` and leaves the mark alone when `row` would move it backwards.
    pub fn advance_to(&mut self, row: usize) -> bool {
        match self.last_processed {
            Some(current) if row < current => false,
            _ => {
                self.last_processed = Some(row);
                true
            }
        }
    }

    /// First row a scan should look at. The header row is never a candidate.
    pub fn next_candidate(&self) -> usize {
        self.last_processed
            .map_or(FIRST_DATA_ROW, |row| (row + 1).max(FIRST_DATA_ROW))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_before_first_data_row() {
        let mark = Watermark::new();
        assert_eq!(mark.current(), None);
        assert_eq!(mark.next_candidate(), 1);
    }

    #[test]
    fn never_regresses() {
        let mut mark = Watermark::at(7);
        assert!(!mark.advance_to(3));
        assert_eq!(mark.current(), Some(7));
        assert!(mark.advance_to(7));
        assert!(mark.advance_to(9));
        assert_eq!(mark.next_candidate(), 10);
    }
}
