//! C7 Queue Manager: the four Arena-style disciplines (`spec.md` §4.7).

use std::collections::{BinaryHeap, VecDeque};

use des_domain::QueueDiscipline;

use crate::value::AttributeMap;

#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub entity_id: String,
    pub entity_table: String,
    pub attributes: AttributeMap,
    pub entry_time: f64,
    pub priority: f64,
}

/// One persisted row per enqueue/dequeue (`spec.md` §4.7, output table
/// `sim_queue_activity`).
#[derive(Debug, Clone)]
pub struct QueueActivity {
    pub queue_name: String,
    pub entity_id: String,
    pub entity_table: String,
    pub action: QueueAction,
    pub sim_time: f64,
    pub priority: Option<f64>,
    pub length_before: usize,
    pub length_after: usize,
    pub wait_time: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueAction {
    Entry,
    Exit,
}

/// A min-heap entry ordering by `key` ascending; used for both
/// `LowAttribute` (key = attribute value) and `HighAttribute` (key =
/// `-attribute value`), so both disciplines share one extract-min structure
/// (`spec.md` §4.7).
#[derive(Debug, Clone)]
struct HeapEntry {
    key: f64,
    seq: u64,
    entry: QueueEntry,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.seq == other.seq
    }
}
impl Eq for HeapEntry {}
impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Reversed so `BinaryHeap` (a max-heap) behaves as a min-heap on
        // `key`, ties broken by arrival order.
        other
            .key
            .total_cmp(&self.key)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

enum Backing {
    Fifo(VecDeque<QueueEntry>),
    Lifo(Vec<QueueEntry>),
    Heap(BinaryHeap<HeapEntry>),
}

pub struct Queue {
    pub name: String,
    pub discipline: QueueDiscipline,
    pub priority_attribute: Option<String>,
    backing: Backing,
    heap_seq: u64,

    pub total_entries: u64,
    pub total_exits: u64,
    pub total_wait_time: f64,
    pub max_wait_time: f64,
    pub max_length: usize,
    pub wait_times: Vec<f64>,
}

impl Queue {
    pub fn new(name: String, discipline: QueueDiscipline, priority_attribute: Option<String>) -> Self {
        let backing = match discipline {
            QueueDiscipline::Fifo => Backing::Fifo(VecDeque::new()),
            QueueDiscipline::Lifo => Backing::Lifo(Vec::new()),
            QueueDiscipline::LowAttribute | QueueDiscipline::HighAttribute => Backing::Heap(BinaryHeap::new()),
        };
        Queue {
            name,
            discipline,
            priority_attribute,
            backing,
            heap_seq: 0,
            total_entries: 0,
            total_exits: 0,
            total_wait_time: 0.0,
            max_wait_time: 0.0,
            max_length: 0,
            wait_times: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        match &self.backing {
            Backing::Fifo(q) => q.len(),
            Backing::Lifo(q) => q.len(),
            Backing::Heap(q) => q.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Derives this entry's priority key from `priority_attribute`. Missing
    /// attributes yield `+infinity` for `Low` (sorts last) and `0` for
    /// `High` (sorts first after negation), per `spec.md` §4.7.
    fn derive_priority(&self, attributes: &AttributeMap) -> f64 {
        let raw = self
            .priority_attribute
            .as_ref()
            .and_then(|attr| attributes.get(attr))
            .and_then(|v| v.as_f64());
        match (self.discipline, raw) {
            (QueueDiscipline::LowAttribute, Some(v)) => v,
            (QueueDiscipline::LowAttribute, None) => f64::INFINITY,
            (QueueDiscipline::HighAttribute, Some(v)) => -v,
            (QueueDiscipline::HighAttribute, None) => 0.0,
            _ => 0.0,
        }
    }

    pub fn enqueue(
        &mut self,
        entity_id: String,
        entity_table: String,
        attributes: AttributeMap,
        now: f64,
    ) -> (QueueEntry, QueueActivity) {
        let length_before = self.len();
        let priority = self.derive_priority(&attributes);
        let entry = QueueEntry {
            entity_id,
            entity_table,
            attributes,
            entry_time: now,
            priority,
        };
        match &mut self.backing {
            Backing::Fifo(q) => q.push_back(entry.clone()),
            Backing::Lifo(q) => q.push(entry.clone()),
            Backing::Heap(q) => {
                let seq = self.heap_seq;
                self.heap_seq += 1;
                q.push(HeapEntry {
                    key: entry.priority,
                    seq,
                    entry: entry.clone(),
                });
            }
        }
        self.total_entries += 1;
        self.max_length = self.max_length.max(self.len());
        let activity = QueueActivity {
            queue_name: self.name.clone(),
            entity_id: entry.entity_id.clone(),
            entity_table: entry.entity_table.clone(),
            action: QueueAction::Entry,
            sim_time: now,
            priority: Some(entry.priority),
            length_before,
            length_after: self.len(),
            wait_time: None,
        };
        (entry, activity)
    }

    pub fn dequeue(&mut self, now: f64) -> Option<(QueueEntry, QueueActivity)> {
        let length_before = self.len();
        let entry = match &mut self.backing {
            Backing::Fifo(q) => q.pop_front(),
            Backing::Lifo(q) => q.pop(),
            Backing::Heap(q) => q.pop().map(|h| h.entry),
        }?;
        let wait_time = now - entry.entry_time;
        self.total_exits += 1;
        self.total_wait_time += wait_time;
        self.max_wait_time = self.max_wait_time.max(wait_time);
        self.wait_times.push(wait_time);
        let activity = QueueActivity {
            queue_name: self.name.clone(),
            entity_id: entry.entity_id.clone(),
            entity_table: entry.entity_table.clone(),
            action: QueueAction::Exit,
            sim_time: now,
            priority: Some(entry.priority),
            length_before,
            length_after: self.len(),
            wait_time: Some(wait_time),
        };
        Some((entry, activity))
    }

    pub fn avg_wait_time(&self) -> f64 {
        if self.total_exits == 0 {
            0.0
        } else {
            self.total_wait_time / self.total_exits as f64
        }
    }

    /// Linear-interpolated percentile over the sorted wait-time sample
    /// (SPEC_FULL.md §12.2).
    pub fn percentile_wait(&self, p: f64) -> f64 {
        if self.wait_times.is_empty() {
            return 0.0;
        }
        let mut sorted = self.wait_times.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));
        if sorted.len() == 1 {
            return sorted[0];
        }
        let rank = p * (sorted.len() - 1) as f64;
        let lo = rank.floor() as usize;
        let hi = rank.ceil() as usize;
        if lo == hi {
            sorted[lo]
        } else {
            let frac = rank - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(priority: Option<f64>) -> AttributeMap {
        let mut m = AttributeMap::new();
        if let Some(p) = priority {
            m.insert("priority".to_string(), crate::value::Value::Real(p));
        }
        m
    }

    #[test]
    fn fifo_dequeues_in_arrival_order() {
        let mut q = Queue::new("q".into(), QueueDiscipline::Fifo, None);
        for (i, t) in [0.0, 1.0, 2.0].into_iter().enumerate() {
            q.enqueue(format!("e{i}"), "t".into(), attrs(None), t);
        }
        let order: Vec<_> = std::iter::from_fn(|| q.dequeue(5.0)).map(|(e, _)| e.entity_id).collect();
        assert_eq!(order, vec!["e0", "e1", "e2"]);
    }

    #[test]
    fn lifo_dequeues_in_reverse_arrival_order() {
        let mut q = Queue::new("q".into(), QueueDiscipline::Lifo, None);
        for (i, t) in [0.0, 1.0, 2.0, 3.0, 4.0].into_iter().enumerate() {
            q.enqueue(format!("e{i}"), "t".into(), attrs(None), t);
        }
        let order: Vec<_> = std::iter::from_fn(|| q.dequeue(10.0)).map(|(e, _)| e.entity_id).collect();
        assert_eq!(order, vec!["e4", "e3", "e2", "e1", "e0"]);
    }

    #[test]
    fn high_attribute_dequeues_highest_priority_first() {
        let mut q = Queue::new("q".into(), QueueDiscipline::HighAttribute, Some("priority".into()));
        q.enqueue("e1".into(), "t".into(), attrs(Some(1.0)), 0.0);
        q.enqueue("e100".into(), "t".into(), attrs(Some(100.0)), 0.0);
        q.enqueue("e10".into(), "t".into(), attrs(Some(10.0)), 0.0);
        let order: Vec<_> = std::iter::from_fn(|| q.dequeue(5.0)).map(|(e, _)| e.entity_id).collect();
        assert_eq!(order, vec!["e100", "e10", "e1"]);
    }

    #[test]
    fn low_attribute_missing_value_sorts_last() {
        let mut q = Queue::new("q".into(), QueueDiscipline::LowAttribute, Some("priority".into()));
        q.enqueue("has_value".into(), "t".into(), attrs(Some(5.0)), 0.0);
        q.enqueue("missing".into(), "t".into(), attrs(None), 0.0);
        let order: Vec<_> = std::iter::from_fn(|| q.dequeue(5.0)).map(|(e, _)| e.entity_id).collect();
        assert_eq!(order, vec!["has_value", "missing"]);
    }

    #[test]
    fn length_tracking_is_symmetric() {
        let mut q = Queue::new("q".into(), QueueDiscipline::Fifo, None);
        let (_, a) = q.enqueue("e0".into(), "t".into(), attrs(None), 0.0);
        assert_eq!((a.length_before, a.length_after), (0, 1));
        let (_, a) = q.dequeue(1.0).unwrap();
        assert_eq!((a.length_before, a.length_after), (1, 0));
    }
}
