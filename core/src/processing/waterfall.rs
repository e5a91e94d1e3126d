use crate::math::stats::POWER_FLOOR_DB;
use crate::processing::row::SpectrumRow;
use ndarray::Array2;
use std::collections::VecDeque;
use std::sync::Arc;

/// Bounded FIFO history of spectrum rows, oldest first.
///
/// Only the acquisition loop mutates the buffer. Anything else gets a
/// [`WaterfallSnapshot`], which owns its rows.
#[derive(Debug)]
pub struct WaterfallBuffer {
    rows: VecDeque<SpectrumRow>,
    capacity: usize,
    pushed: u64,
}

impl WaterfallBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            rows: VecDeque::with_capacity(capacity + 1),
            capacity,
            pushed: 0,
        }
    }

    /// Appends `row`, evicting the oldest row once more than `capacity` are held.
    pub fn push(&mut self, row: SpectrumRow) {
        self.rows.push_back(row);
        if self.rows.len() > self.capacity {
            self.rows.pop_front();
        }
        self.pushed += 1;
    }

    /// Number of rows currently held.
    pub fn depth(&self) -> usize {
        self.rows.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn total_pushed(&self) -> u64 {
        self.pushed
    }

    pub fn latest(&self) -> Option<&SpectrumRow> {
        self.rows.back()
    }

    /// Independent copy of the current history.
    pub fn snapshot(&self) -> WaterfallSnapshot {
        WaterfallSnapshot {
            rows: self.rows.iter().cloned().collect(),
            capacity: self.capacity,
        }
    }
}

/// Immutable copy of the waterfall at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct WaterfallSnapshot {
    rows: Vec<SpectrumRow>,
    capacity: usize,
}

impl WaterfallSnapshot {
    pub fn rows(&self) -> &[SpectrumRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<&SpectrumRow> {
        self.rows.last()
    }

    pub fn freq_axis(&self) -> Option<Arc<[f64]>> {
        self.latest().map(SpectrumRow::freq_axis)
    }

    /// Rows x bins matrix, oldest row first. Rows narrower than the newest
    /// row are padded with the power floor.
    pub fn to_matrix(&self) -> Array2<f32> {
        let width = self.latest().map_or(0, SpectrumRow::len);
        let mut matrix = Array2::from_elem((self.rows.len(), width), POWER_FLOOR_DB);
        for (mut target, row) in matrix.rows_mut().into_iter().zip(&self.rows) {
            for (cell, &value) in target.iter_mut().zip(row.power_db()) {
                *cell = value;
            }
        }
        matrix
    }
}
