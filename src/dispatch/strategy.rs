//! Redirect selection strategies.

use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use uuid::Uuid;

use crate::config::SelectionKind;
use crate::model::{Endpoint, Redirect};

/// Picks one redirect among the survivors of filtering.
pub trait SelectionStrategy: Send + Sync {
    /// Index into `candidates`; `None` only when `candidates` is empty.
    fn pick(&self, endpoint: &Endpoint, candidates: &[Redirect]) -> Option<usize>;
}

/// Build the configured strategy.
pub fn from_kind(kind: SelectionKind) -> Box<dyn SelectionStrategy> {
    match kind {
        SelectionKind::Random => Box::new(UniformRandom),
        SelectionKind::RoundRobin => Box::new(RoundRobin::new()),
        SelectionKind::First => Box::new(FirstCandidate),
    }
}

/// Uniformly random choice.
#[derive(Debug, Default)]
pub struct UniformRandom;

impl SelectionStrategy for UniformRandom {
    fn pick(&self, _endpoint: &Endpoint, candidates: &[Redirect]) -> Option<usize> {
        match candidates.len() {
            0 => None,
            len => Some(fastrand::usize(..len)),
        }
    }
}

/// Always the first candidate, in storage order.
#[derive(Debug, Default)]
pub struct FirstCandidate;

impl SelectionStrategy for FirstCandidate {
    fn pick(&self, _endpoint: &Endpoint, candidates: &[Redirect]) -> Option<usize> {
        (!candidates.is_empty()).then_some(0)
    }
}

/// Rotates through candidates, one counter per endpoint.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursors: DashMap<Uuid, AtomicUsize>,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SelectionStrategy for RoundRobin {
    fn pick(&self, endpoint: &Endpoint, candidates: &[Redirect]) -> Option<usize> {
        if candidates.is_empty() {
            return None;
        }
        let count = self
            .cursors
            .entry(endpoint.id)
            .or_default()
            .fetch_add(1, Ordering::Relaxed);
        Some(count % candidates.len())
    }
}
