use std::collections::{HashMap, VecDeque};

use uuid::Uuid;

use crate::scheduler::job::JobKind;

const DEFAULT_QUEUE_CAPACITY: usize = 1_000;

/// Intake buffer of queued job ids.
///
/// Each kind has its own FIFO lane; `pop` serves lanes round-robin so a burst
/// of one kind cannot starve the others. Order is only promised within a lane.
#[derive(Debug)]
pub struct JobQueue {
    lanes: HashMap<JobKind, VecDeque<Uuid>>,
    next_lane: usize,
    len: usize,
    capacity: usize,
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl JobQueue {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            lanes: HashMap::new(),
            next_lane: 0,
            len: 0,
            capacity,
        }
    }

    /// Append a job to its kind's lane. Returns false if the queue is at capacity.
    pub fn push(&mut self, kind: JobKind, job_id: Uuid) -> bool {
        if self.is_full() {
            return false;
        }
        self.lanes.entry(kind).or_default().push_back(job_id);
        self.len += 1;
        true
    }

    /// Take the next job, rotating across non-empty lanes.
    pub fn pop(&mut self) -> Option<(JobKind, Uuid)> {
        let lane_count = JobKind::ALL.len();
        for offset in 0..lane_count {
            let index = (self.next_lane + offset) % lane_count;
            let kind = JobKind::ALL[index];
            if let Some(job_id) = self.lanes.get_mut(&kind).and_then(VecDeque::pop_front) {
                self.next_lane = (index + 1) % lane_count;
                self.len -= 1;
                return Some((kind, job_id));
            }
        }
        None
    }

    /// Remove a queued job wherever it sits. Returns true if it was found.
    pub fn remove(&mut self, job_id: &Uuid) -> bool {
        for lane in self.lanes.values_mut() {
            if let Some(pos) = lane.iter().position(|id| id == job_id) {
                lane.remove(pos);
                self.len -= 1;
                return true;
            }
        }
        false
    }

    pub fn contains(&self, job_id: &Uuid) -> bool {
        self.lanes.values().any(|lane| lane.contains(job_id))
    }

    /// Number of queued jobs per kind, in kind order.
    pub fn depth_by_kind(&self) -> Vec<(JobKind, usize)> {
        JobKind::ALL
            .into_iter()
            .map(|kind| (kind, self.lanes.get(&kind).map_or(0, VecDeque::len)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
