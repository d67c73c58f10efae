//! Owns every declared [`Queue`](crate::queue::Queue) by name and buffers
//! the persisted activity log rows for `des-persistence` to flush.

use std::collections::HashMap;

use des_domain::QueueConfig;

use crate::errors::CoreError;
use crate::queue::{Queue, QueueActivity, QueueEntry};
use crate::value::AttributeMap;

pub struct QueueManager {
    queues: HashMap<String, Queue>,
    activity_log: Vec<QueueActivity>,
}

impl QueueManager {
    pub fn from_config(configs: &[QueueConfig]) -> Self {
        let queues = configs
            .iter()
            .map(|c| {
                (
                    c.name.clone(),
                    Queue::new(c.name.clone(), c.discipline, c.priority_attribute.clone()),
                )
            })
            .collect();
        QueueManager {
            queues,
            activity_log: Vec::new(),
        }
    }

    pub fn enqueue(
        &mut self,
        queue_name: &str,
        entity_id: String,
        entity_table: String,
        attributes: AttributeMap,
        now: f64,
    ) -> Result<QueueEntry, CoreError> {
        let queue = self
            .queues
            .get_mut(queue_name)
            .ok_or_else(|| CoreError::UnknownQueue(queue_name.to_string()))?;
        let (entry, activity) = queue.enqueue(entity_id, entity_table, attributes, now);
        self.activity_log.push(activity);
        Ok(entry)
    }

    pub fn dequeue(&mut self, queue_name: &str, now: f64) -> Result<Option<QueueEntry>, CoreError> {
        let queue = self
            .queues
            .get_mut(queue_name)
            .ok_or_else(|| CoreError::UnknownQueue(queue_name.to_string()))?;
        let dequeued = queue.dequeue(now);
        if let Some((entry, activity)) = dequeued {
            self.activity_log.push(activity);
            Ok(Some(entry))
        } else {
            Ok(None)
        }
    }

    pub fn queue_len(&self, queue_name: &str) -> usize {
        self.queues.get(queue_name).map(|q| q.len()).unwrap_or(0)
    }

    pub fn has_queue(&self, queue_name: &str) -> bool {
        self.queues.contains_key(queue_name)
    }

    /// Drains the buffered activity rows so `des-persistence` can flush them
    /// to `sim_queue_activity` without the core depending on a store trait.
    pub fn drain_activity(&mut self) -> Vec<QueueActivity> {
        std::mem::take(&mut self.activity_log)
    }

    pub fn queues(&self) -> impl Iterator<Item = &Queue> {
        self.queues.values()
    }
}
