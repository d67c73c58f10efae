//! Final metrics assembly (`spec.md` §6 "Metrics output"), collected once
//! after the run loop stops and every allocation has been drained.

use std::collections::HashMap;

use des_core::queue_manager::QueueManager;
use des_core::resource_pool::ResourcePool;
use des_core::time::BaseTimeUnit;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ResourceUtilization {
    pub by_resource: HashMap<String, f64>,
    pub by_type: HashMap<String, f64>,
    pub currently_allocated: usize,
    pub total_allocations: u64,
    pub total_resources: usize,
}

#[derive(Debug, Serialize)]
pub struct QueueStats {
    pub queue_type: String,
    pub total_processed: u64,
    pub current_length: usize,
    pub max_length: usize,
    pub avg_wait_time: f64,
    pub max_wait_time: f64,
    pub total_wait_time: f64,
    /// Linear-interpolated wait-time percentiles (`SPEC_FULL.md` §12.2).
    pub wait_time_p50: f64,
    pub wait_time_p90: f64,
    pub wait_time_p95: f64,
}

#[derive(Debug, Serialize)]
pub struct QueueStatistics {
    pub per_queue: HashMap<String, QueueStats>,
}

#[derive(Debug, Serialize)]
pub struct SimulationMetrics {
    pub simulation_time_minutes: f64,
    pub simulation_time_base_units: f64,
    pub base_time_unit: BaseTimeUnit,
    pub termination_reason: String,
    pub entity_count: u64,
    pub entities_processed: u64,
    pub processed_events: u64,
    pub resource_utilization: ResourceUtilization,
    pub queue_statistics: QueueStatistics,
}

fn resource_discipline_label(discipline: des_domain::QueueDiscipline) -> &'static str {
    match discipline {
        des_domain::QueueDiscipline::Fifo => "fifo",
        des_domain::QueueDiscipline::Lifo => "lifo",
        des_domain::QueueDiscipline::LowAttribute => "low_attribute",
        des_domain::QueueDiscipline::HighAttribute => "high_attribute",
    }
}

pub fn collect(
    now: f64,
    base_time_unit: BaseTimeUnit,
    termination_reason: String,
    entity_count: u64,
    processed_events: u64,
    resources: &ResourcePool,
    queues: &QueueManager,
) -> SimulationMetrics {
    let by_resource: HashMap<String, f64> = resources
        .utilization_by_resource(now)
        .into_iter()
        .map(|(key, pct)| (format!("{}:{}", key.table, key.id), pct))
        .collect();
    let by_type = resources.utilization_by_type(now);

    let per_queue: HashMap<String, QueueStats> = queues
        .queues()
        .map(|q| {
            (
                q.name.clone(),
                QueueStats {
                    queue_type: resource_discipline_label(q.discipline).to_string(),
                    total_processed: q.total_exits,
                    current_length: q.len(),
                    max_length: q.max_length,
                    avg_wait_time: q.avg_wait_time(),
                    max_wait_time: q.max_wait_time,
                    total_wait_time: q.total_wait_time,
                    wait_time_p50: q.percentile_wait(0.5),
                    wait_time_p90: q.percentile_wait(0.9),
                    wait_time_p95: q.percentile_wait(0.95),
                },
            )
        })
        .collect();

    SimulationMetrics {
        simulation_time_minutes: now,
        simulation_time_base_units: base_time_unit.from_minutes(now),
        base_time_unit,
        termination_reason,
        entity_count,
        entities_processed: entity_count,
        processed_events,
        resource_utilization: ResourceUtilization {
            by_resource,
            by_type,
            currently_allocated: resources.currently_allocated(),
            total_allocations: resources.total_allocation_count(),
            total_resources: resources.total_resources(),
        },
        queue_statistics: QueueStatistics { per_queue },
    }
}
