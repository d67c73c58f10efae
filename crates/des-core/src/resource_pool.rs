//! C6 Resource Pool: filtered acquisition, ordered release, group retention,
//! utilisation stats (`spec.md` §4.6).
//!
//! Acquisition is expressed as two halves because the scheduler is
//! cooperative rather than blocking: [`ResourcePool::attempt_acquire`] either
//! grants a free resource immediately, or parks the requesting task (via a
//! plain FIFO waiter list, or — when the requirement names a `queue` — via
//! the [`QueueManager`] so the configured discipline, not arrival order,
//! decides who is served next). [`ResourcePool::release`] hands freed
//! resources to the earliest-eligible waiter before the resource is
//! considered available to anyone else.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::errors::CoreError;
use crate::queue_manager::QueueManager;
use crate::resource::{Resource, ResourceKey, UtilizationRecord};
use crate::sched::{Scheduler, TaskId};
use crate::value::AttributeMap;

pub enum AcquireAttempt {
    Granted(ResourceKey),
    Parked,
}

pub struct ResourcePool {
    resources: HashMap<ResourceKey, Resource>,
    in_use: HashSet<ResourceKey>,
    utilization: HashMap<ResourceKey, UtilizationRecord>,

    allocations: HashMap<String, Vec<ResourceKey>>,
    groups: HashMap<(String, String), Vec<ResourceKey>>,

    plain_waiters: HashMap<(String, String), VecDeque<TaskId>>,
    queued_waiters: HashMap<(String, String), String>,
    entity_task: HashMap<String, TaskId>,
    grants: HashMap<TaskId, ResourceKey>,
}

impl ResourcePool {
    pub fn new() -> Self {
        ResourcePool {
            resources: HashMap::new(),
            in_use: HashSet::new(),
            utilization: HashMap::new(),
            allocations: HashMap::new(),
            groups: HashMap::new(),
            plain_waiters: HashMap::new(),
            queued_waiters: HashMap::new(),
            entity_task: HashMap::new(),
            grants: HashMap::new(),
        }
    }

    /// Loads the resource table once at start-up (`spec.md` §4.6).
    pub fn load(&mut self, resources: Vec<Resource>) {
        for resource in resources {
            self.utilization.insert(resource.key.clone(), UtilizationRecord::default());
            self.resources.insert(resource.key.clone(), resource);
        }
    }

    pub fn register_entity_task(&mut self, entity_id: String, task: TaskId) {
        self.entity_task.insert(entity_id, task);
    }

    fn free_matching(&self, table: &str, type_value: &str) -> Option<ResourceKey> {
        self.resources
            .values()
            .filter(|r| r.key.table == table && r.resource_type == type_value)
            .filter(|r| !self.in_use.contains(&r.key))
            .map(|r| r.key.clone())
            .min_by(|a, b| a.id.cmp(&b.id))
    }

    fn mark_allocated(&mut self, key: &ResourceKey, now: f64) {
        self.in_use.insert(key.clone());
        let util = self.utilization.entry(key.clone()).or_default();
        util.allocation_count += 1;
        util.last_allocated = Some(now);
    }

    /// Grants a free resource immediately, or parks `task` — via the named
    /// queue's discipline when `queue_name` is set, else FIFO — for the
    /// next matching release. `entity_ctx` (id, table, attribute snapshot)
    /// is required whenever parking is possible (i.e. always, since we
    /// don't know in advance whether a free resource exists... it is in
    /// fact only consulted on the parking path).
    ///
    /// The enqueue still happens even on an immediate grant
    /// (`original_source/managers/resource_manager.py::allocate_resources`:
    /// `queue_manager.enqueue(...)` runs unconditionally before the
    /// `resource_store.get()` wait, and is immediately followed by a
    /// `dequeue()` the moment that wait resolves — including when it
    /// resolves instantly) so `sim_queue_activity` logs a matched
    /// entry/exit pair for every request that names a queue, not only the
    /// ones that actually park.
    #[allow(clippy::too_many_arguments)]
    pub fn attempt_acquire(
        &mut self,
        task: TaskId,
        table: &str,
        type_value: &str,
        queue_name: Option<&str>,
        entity_ctx: (&str, &str, &AttributeMap),
        queue_manager: &mut QueueManager,
        now: f64,
    ) -> Result<AcquireAttempt, CoreError> {
        let (entity_id, entity_table, attrs) = entity_ctx;
        if let Some(key) = self.free_matching(table, type_value) {
            self.mark_allocated(&key, now);
            if let Some(qname) = queue_name {
                queue_manager.enqueue(qname, entity_id.to_string(), entity_table.to_string(), attrs.clone(), now)?;
                queue_manager.dequeue(qname, now)?;
            }
            return Ok(AcquireAttempt::Granted(key));
        }
        self.entity_task.insert(entity_id.to_string(), task);
        let request_key = (table.to_string(), type_value.to_string());
        if let Some(qname) = queue_name {
            queue_manager.enqueue(qname, entity_id.to_string(), entity_table.to_string(), attrs.clone(), now)?;
            self.queued_waiters.entry(request_key).or_insert_with(|| qname.to_string());
        } else {
            self.plain_waiters.entry(request_key).or_default().push_back(task);
        }
        Ok(AcquireAttempt::Parked)
    }

    /// Picks up a resource granted to `task` while it was parked. Returns
    /// `None` if still waiting.
    pub fn take_grant(&mut self, task: TaskId) -> Option<ResourceKey> {
        self.grants.remove(&task)
    }

    /// Returns a single acquired-but-not-yet-committed resource directly to
    /// the pool without recording a release span — used when an in-progress
    /// `allocate()` call is aborted partway through (`spec.md` §4.6/§7: "If
    /// cancelled mid-allocation, already-acquired resources... must be
    /// returned to the pool before propagating").
    pub fn abort_partial(&mut self, key: ResourceKey, now: f64, queue_manager: &mut QueueManager, scheduler: &mut Scheduler) {
        self.return_to_pool(key, now, queue_manager, scheduler);
    }

    pub fn commit_allocation(&mut self, allocation_key: String, resources: Vec<ResourceKey>) {
        self.allocations.entry(allocation_key).or_default().extend(resources);
    }

    /// Releases every resource held under `allocation_key`. Falls back to
    /// matching a key ending in `_<event_id>` (SPEC_FULL.md §12.8 / `spec.md`
    /// §9's open question) when an exact match isn't found — a known
    /// latent-collision source carried over verbatim, not "fixed".
    pub fn release(
        &mut self,
        allocation_key: &str,
        now: f64,
        queue_manager: &mut QueueManager,
        scheduler: &mut Scheduler,
    ) -> Result<Vec<ResourceKey>, CoreError> {
        let keys = match self.allocations.remove(allocation_key) {
            Some(keys) => keys,
            None => {
                let suffix = allocation_key
                    .rsplit(':')
                    .next()
                    .map(|event_id| format!("_{event_id}"));
                let fallback_key = suffix.and_then(|suf| {
                    self.allocations.keys().find(|k| k.ends_with(&suf)).cloned()
                });
                match fallback_key {
                    Some(k) => self.allocations.remove(&k).unwrap_or_default(),
                    None => Vec::new(),
                }
            }
        };
        for key in &keys {
            self.return_to_pool(key.clone(), now, queue_manager, scheduler);
        }
        Ok(keys)
    }

    fn return_to_pool(
        &mut self,
        key: ResourceKey,
        now: f64,
        queue_manager: &mut QueueManager,
        scheduler: &mut Scheduler,
    ) {
        self.in_use.remove(&key);
        if let Some(util) = self.utilization.get_mut(&key) {
            if let Some(last) = util.last_allocated {
                util.total_busy_minutes += (now - last).max(0.0);
            }
            util.last_released = Some(now);
        }
        let resource_type = self
            .resources
            .get(&key)
            .map(|r| r.resource_type.clone())
            .unwrap_or_default();
        let request_key = (key.table.clone(), resource_type);

        // Queue-governed waiters take priority over plain FIFO waiters for
        // the same (table, type) key, matching `spec.md` §4.6's dequeue-on-
        // release protocol.
        if let Some(qname) = self.queued_waiters.get(&request_key).cloned() {
            if let Ok(Some(entry)) = queue_manager.dequeue(&qname, now) {
                if let Some(task) = self.entity_task.remove(&entry.entity_id) {
                    self.mark_allocated(&key, now);
                    self.grants.insert(task, key.clone());
                    scheduler.wake_now(task);
                    return;
                }
            }
        }
        if let Some(waiters) = self.plain_waiters.get_mut(&request_key) {
            if let Some(task) = waiters.pop_front() {
                self.mark_allocated(&key, now);
                self.grants.insert(task, key.clone());
                scheduler.wake_now(task);
                return;
            }
        }
        // No waiter: the resource simply returns to the free pool.
    }

    pub fn add_to_group(&mut self, entity_id: String, group_id: String, resources: Vec<ResourceKey>) {
        self.groups.entry((entity_id, group_id)).or_default().extend(resources);
    }

    pub fn release_group(
        &mut self,
        entity_id: &str,
        group_id: &str,
        now: f64,
        queue_manager: &mut QueueManager,
        scheduler: &mut Scheduler,
    ) -> Vec<ResourceKey> {
        let keys = self
            .groups
            .remove(&(entity_id.to_string(), group_id.to_string()))
            .unwrap_or_default();
        for key in &keys {
            self.return_to_pool(key.clone(), now, queue_manager, scheduler);
        }
        keys
    }

    /// Releases every group held by `entity_id`, used by the Release step
    /// processor (`spec.md` §4.9 Release) when an entity's flow ends while
    /// it still retains grouped resources.
    pub fn release_all_groups_for_entity(
        &mut self,
        entity_id: &str,
        now: f64,
        queue_manager: &mut QueueManager,
        scheduler: &mut Scheduler,
    ) -> Vec<ResourceKey> {
        let matching: Vec<(String, String)> = self
            .groups
            .keys()
            .filter(|(eid, _)| eid == entity_id)
            .cloned()
            .collect();
        let mut released = Vec::new();
        for (eid, gid) in matching {
            released.extend(self.release_group(&eid, &gid, now, queue_manager, scheduler));
        }
        released
    }

    pub fn total_resources(&self) -> usize {
        self.resources.len()
    }

    pub fn currently_allocated(&self) -> usize {
        self.in_use.len()
    }

    /// Sum of every resource's lifetime allocation count, used for the
    /// `resource_utilization.total_allocations` metric (`spec.md` §6).
    pub fn total_allocation_count(&self) -> u64 {
        self.utilization.values().map(|u| u.allocation_count).sum()
    }

    pub fn no_orphan_allocations(&self) -> bool {
        self.allocations.is_empty()
            && self
                .utilization
                .values()
                .all(|u| match (u.last_allocated, u.last_released) {
                    (Some(a), Some(r)) => a <= r,
                    (Some(_), None) => false,
                    _ => true,
                })
    }

    pub fn resource(&self, key: &ResourceKey) -> Option<&Resource> {
        self.resources.get(key)
    }

    pub fn utilization_by_resource(&self, now: f64) -> HashMap<ResourceKey, f64> {
        self.utilization
            .iter()
            .map(|(key, rec)| (key.clone(), rec.utilization_percent(now, self.in_use.contains(key))))
            .collect()
    }

    pub fn utilization_by_type(&self, now: f64) -> HashMap<String, f64> {
        let mut sums: HashMap<String, (f64, usize)> = HashMap::new();
        for (key, rec) in &self.utilization {
            let rtype = self
                .resources
                .get(key)
                .map(|r| r.resource_type.clone())
                .unwrap_or_default();
            let pct = rec.utilization_percent(now, self.in_use.contains(key));
            let entry = sums.entry(rtype).or_insert((0.0, 0));
            entry.0 += pct;
            entry.1 += 1;
        }
        sums.into_iter().map(|(k, (sum, n))| (k, sum / n.max(1) as f64)).collect()
    }
}

impl Default for ResourcePool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn resource(table: &str, id: &str, rtype: &str) -> Resource {
        Resource {
            key: ResourceKey {
                table: table.to_string(),
                id: id.to_string(),
            },
            resource_type: rtype.to_string(),
            attributes: AttributeMap::new(),
        }
    }

    #[test]
    fn immediate_grant_when_free_resource_exists() {
        let mut pool = ResourcePool::new();
        pool.load(vec![resource("doctors", "1", "Cardiologist")]);
        let mut qmgr = QueueManager::from_config(&[]);
        let mut scheduler = Scheduler::new();
        let attrs = AttributeMap::new();
        let outcome = pool
            .attempt_acquire(TaskId(1), "doctors", "Cardiologist", None, ("e1", "patients", &attrs), &mut qmgr, 0.0)
            .unwrap();
        assert!(matches!(outcome, AcquireAttempt::Granted(_)));
        assert_eq!(pool.currently_allocated(), 1);
    }

    #[test]
    fn parks_then_grants_on_release() {
        let mut pool = ResourcePool::new();
        pool.load(vec![resource("doctors", "1", "Cardiologist")]);
        let mut qmgr = QueueManager::from_config(&[]);
        let mut scheduler = Scheduler::new();
        let attrs = AttributeMap::new();

        let first = pool
            .attempt_acquire(TaskId(1), "doctors", "Cardiologist", None, ("e1", "patients", &attrs), &mut qmgr, 0.0)
            .unwrap();
        let key = match first {
            AcquireAttempt::Granted(k) => k,
            _ => panic!("expected grant"),
        };
        pool.commit_allocation("f:1".to_string(), vec![key]);

        let second = pool
            .attempt_acquire(TaskId(2), "doctors", "Cardiologist", None, ("e2", "patients", &attrs), &mut qmgr, 1.0)
            .unwrap();
        assert!(matches!(second, AcquireAttempt::Parked));
        assert!(pool.take_grant(TaskId(2)).is_none());

        pool.release("f:1", 10.0, &mut qmgr, &mut scheduler).unwrap();
        let granted = pool.take_grant(TaskId(2));
        assert!(granted.is_some());
    }

    #[test]
    fn release_uses_legacy_suffix_fallback() {
        let mut pool = ResourcePool::new();
        pool.load(vec![resource("doctors", "1", "Cardiologist")]);
        let mut qmgr = QueueManager::from_config(&[]);
        let mut scheduler = Scheduler::new();
        let attrs = AttributeMap::new();
        let key = match pool
            .attempt_acquire(TaskId(1), "doctors", "Cardiologist", None, ("e1", "patients", &attrs), &mut qmgr, 0.0)
            .unwrap()
        {
            AcquireAttempt::Granted(k) => k,
            _ => unreachable!(),
        };
        pool.commit_allocation("oldflow_42".to_string(), vec![key]);
        let released = pool.release("newflow:42", 5.0, &mut qmgr, &mut scheduler).unwrap();
        assert_eq!(released.len(), 1);
        assert_eq!(pool.currently_allocated(), 0);
    }

    #[test]
    fn utilization_percent_reflects_busy_fraction() {
        let mut pool = ResourcePool::new();
        pool.load(vec![resource("doctors", "1", "Cardiologist")]);
        let mut qmgr = QueueManager::from_config(&[]);
        let mut scheduler = Scheduler::new();
        let attrs = AttributeMap::new();
        let key = match pool
            .attempt_acquire(TaskId(1), "doctors", "Cardiologist", None, ("e1", "patients", &attrs), &mut qmgr, 0.0)
            .unwrap()
        {
            AcquireAttempt::Granted(k) => k,
            _ => unreachable!(),
        };
        pool.commit_allocation("f:1".into(), vec![key.clone()]);
        pool.release("f:1", 50.0, &mut qmgr, &mut scheduler).unwrap();
        let util = pool.utilization_by_resource(100.0);
        assert_eq!(*util.get(&key).unwrap(), 50.0);
    }
}
