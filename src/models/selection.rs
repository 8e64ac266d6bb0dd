use std::collections::HashSet;

/// A set of selected step indices plus the last-touched index, supporting
/// shift-extend range selection. Independent of flow identity, so it must be
/// re-validated whenever the flow length changes.
#[derive(Debug, Clone, Default)]
pub struct SelectionSet {
    indices: HashSet<usize>,
    last_touched: Option<usize>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check or uncheck one index, recording it as the range anchor.
    pub fn toggle(&mut self, index: usize, checked: bool) {
        if checked {
            self.indices.insert(index);
        } else {
            self.indices.remove(&index);
        }
        self.last_touched = Some(index);
    }

    /// Shift-extend: apply `checked` to the inclusive range between the
    /// last-touched index and `index`. Falls back to a plain toggle when
    /// nothing was touched yet.
    pub fn range(&mut self, index: usize, checked: bool) {
        match self.last_touched {
            Some(anchor) => {
                let (start, end) = if anchor <= index {
                    (anchor, index)
                } else {
                    (index, anchor)
                };
                for i in start..=end {
                    if checked {
                        self.indices.insert(i);
                    } else {
                        self.indices.remove(&i);
                    }
                }
                self.last_touched = Some(index);
            }
            None => self.toggle(index, checked),
        }
    }

    pub fn select_all(&mut self, len: usize) {
        self.indices = (0..len).collect();
    }

    pub fn clear(&mut self) {
        self.indices.clear();
        self.last_touched = None;
    }

    /// Drop indices that no longer exist in a flow of `len` steps.
    pub fn revalidate(&mut self, len: usize) {
        self.indices.retain(|&i| i < len);
        if matches!(self.last_touched, Some(i) if i >= len) {
            self.last_touched = None;
        }
    }

    pub fn contains(&self, index: usize) -> bool {
        self.indices.contains(&index)
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.indices.iter().copied()
    }

    /// Sorted indices, for status snapshots.
    pub fn sorted(&self) -> Vec<usize> {
        let mut v: Vec<usize> = self.indices.iter().copied().collect();
        v.sort_unstable();
        v
    }
}
