//! Per-object, per-direction value table

use crate::types::{Direction, ObjectId};
use ndarray::{Array2, ArrayView1};

#[derive(Debug, Clone, PartialEq)]
pub struct ValueStore {
    values: Array2<f64>,
    saturation_bound: f64,
}

impl ValueStore {
    pub fn new(max_objects: usize, saturation_bound: f64) -> Self {
        Self {
            values: Array2::zeros((max_objects, Direction::COUNT)),
            saturation_bound,
        }
    }

    /// Rebuild from persisted rows. Rows beyond `max_objects` are dropped,
    /// missing rows start at zero.
    pub fn from_rows(
        rows: &[[f64; Direction::COUNT]],
        max_objects: usize,
        saturation_bound: f64,
    ) -> Self {
        let mut store = Self::new(max_objects, saturation_bound);
        for (i, row) in rows.iter().take(max_objects).enumerate() {
            for (j, value) in row.iter().enumerate() {
                store.values[[i, j]] = *value;
            }
        }
        store
    }

    pub fn capacity(&self) -> usize {
        self.values.nrows()
    }

    pub fn saturation_bound(&self) -> f64 {
        self.saturation_bound
    }

    /// Learned value, 0.0 for ids outside the table
    pub fn get(&self, object: ObjectId, direction: Direction) -> f64 {
        object
            .index(self.capacity())
            .map_or(0.0, |i| self.values[[i, direction.index()]])
    }

    pub fn row(&self, object: ObjectId) -> Option<ArrayView1<'_, f64>> {
        object.index(self.capacity()).map(|i| self.values.row(i))
    }

    /// Add `delta` to one entry and rescale the row if it saturates.
    /// Returns false when the id does not fit the table.
    pub fn adjust(&mut self, object: ObjectId, direction: Direction, delta: f64) -> bool {
        let Some(i) = object.index(self.capacity()) else {
            return false;
        };

        self.values[[i, direction.index()]] += delta;

        let mut row = self.values.row_mut(i);
        let max_abs = row.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
        if max_abs > self.saturation_bound {
            let scale = self.saturation_bound / max_abs;
            row.mapv_inplace(|v| v * scale);
            log::debug!("Rescaled value row for {} by {:.3}", object, scale);
        }
        true
    }

    pub fn reset(&mut self) {
        self.values.fill(0.0);
    }

    pub fn to_rows(&self) -> Vec<[f64; Direction::COUNT]> {
        self.values
            .outer_iter()
            .map(|row| {
                let mut out = [0.0; Direction::COUNT];
                for (dst, src) in out.iter_mut().zip(row.iter()) {
                    *dst = *src;
                }
                out
            })
            .collect()
    }
}
