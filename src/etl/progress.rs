use serde::Serialize;
use std::sync::mpsc::Sender;

use crate::schema::SpeciesId;

/// Point-in-time view of a sync run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub missing_total: usize,
    pub fetched: usize,
    pub current_id: Option<SpeciesId>,
    pub current_species: Option<String>,
    pub done: bool,
}

impl ProgressSnapshot {
    pub fn started(missing_total: usize) -> Self {
        Self {
            missing_total,
            ..Self::default()
        }
    }

    pub fn working(missing_total: usize, fetched: usize, id: SpeciesId, species: &str) -> Self {
        Self {
            missing_total,
            fetched,
            current_id: Some(id),
            current_species: Some(species.to_string()),
            done: false,
        }
    }

    pub fn finished(missing_total: usize, fetched: usize) -> Self {
        Self {
            missing_total,
            fetched,
            done: true,
            ..Self::default()
        }
    }

    pub fn ratio(&self) -> f64 {
        if self.missing_total == 0 {
            if self.done {
                1.0
            } else {
                0.0
            }
        } else {
            self.fetched as f64 / self.missing_total as f64
        }
    }
}

/// Receives progress snapshots from a run
pub trait ProgressSink {
    fn report(&mut self, snapshot: &ProgressSnapshot);
}

impl<F: FnMut(&ProgressSnapshot)> ProgressSink for F {
    fn report(&mut self, snapshot: &ProgressSnapshot) {
        self(snapshot)
    }
}

/// Forwards snapshots over a channel. A hung-up receiver is ignored.
pub struct ChannelProgress(pub Sender<ProgressSnapshot>);

impl ProgressSink for ChannelProgress {
    fn report(&mut self, snapshot: &ProgressSnapshot) {
        self.0.send(snapshot.clone()).ok();
    }
}

/// Discards every snapshot
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&mut self, _snapshot: &ProgressSnapshot) {}
}
