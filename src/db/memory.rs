//! In-process series store

use super::{resolve_range, SeriesStore};
use crate::core::Result;
use std::collections::{HashMap, VecDeque};

/// Series store backed by in-memory queues
#[derive(Debug, Default)]
pub struct MemoryStore {
    series: HashMap<String, VecDeque<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SeriesStore for MemoryStore {
    fn push(&mut self, series: &str, record: &str) -> Result<()> {
        self.series
            .entry(series.to_string())
            .or_default()
            .push_back(record.to_string());
        Ok(())
    }

    fn range(&self, series: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        let Some(list) = self.series.get(series) else {
            return Ok(Vec::new());
        };

        Ok(match resolve_range(list.len(), start, stop) {
            Some((first, last)) => list
                .iter()
                .skip(first)
                .take(last - first + 1)
                .cloned()
                .collect(),
            None => Vec::new(),
        })
    }

    fn trim(&mut self, series: &str, start: i64, stop: i64) -> Result<()> {
        let Some(list) = self.series.get_mut(series) else {
            return Ok(());
        };

        match resolve_range(list.len(), start, stop) {
            Some((first, last)) => {
                list.truncate(last + 1);
                list.drain(..first);
            }
            None => list.clear(),
        }

        Ok(())
    }

    fn len(&self, series: &str) -> Result<usize> {
        Ok(self.series.get(series).map_or(0, VecDeque::len))
    }
}
