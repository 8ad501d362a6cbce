use std::cell::Cell;

use super::model::LineInfo;

/// Line boundaries of a text, with a count of the lookups performed.
pub(crate) struct LineIndex<'a> {
    text: &'a str,
    starts: Vec<usize>,
    lookups: Cell<usize>,
}

/// A resolved line: its byte range and 0-based index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LineRange {
    pub index: usize,
    pub start: usize,
    pub end: usize,
}

impl LineRange {
    pub fn contains(&self, offset: usize) -> bool {
        offset >= self.start && offset <= self.end
    }
}

impl<'a> LineIndex<'a> {
    pub fn new(text: &'a str) -> Self {
        let mut starts = vec![0];
        starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
        Self {
            text,
            starts,
            lookups: Cell::new(0),
        }
    }

    pub fn lookups(&self) -> usize {
        self.lookups.get()
    }

    pub fn line_of(&self, offset: usize) -> LineRange {
        self.lookups.set(self.lookups.get() + 1);
        let index = self.starts.partition_point(|&s| s <= offset).saturating_sub(1);
        let start = self.starts[index];
        let end = match self.starts.get(index + 1) {
            Some(&next) => next - 1,
            None => self.text.len(),
        };
        LineRange { index, start, end }
    }

    /// Line text without the trailing line terminator.
    pub fn text_of(&self, line: &LineRange) -> &'a str {
        self.text
            .get(line.start..line.end)
            .unwrap_or("")
            .trim_end_matches('\r')
    }

    pub fn info(&self, line: &LineRange, offset: usize) -> LineInfo {
        LineInfo {
            line_number: line.index + 1,
            line_span_start: offset - line.start,
            line_span_text: self.text_of(line).to_string(),
        }
    }
}
