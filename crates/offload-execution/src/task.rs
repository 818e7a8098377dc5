use std::net::Ipv4Addr;

use offload_common::config::WorkloadConfig;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::device::Endpoint;
use crate::error::ExecutionResult;
use crate::id::{IdGenerator, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Unprocessed,
    Dispatched,
    Finished,
}

/// One atomic unit of work within a task group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskElement {
    pub task_id: TaskId,
    pub group: String,
    pub size: f64,
    pub cpu: f64,
    pub deadline: f64,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_ip: Option<Ipv4Addr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<f64>,
}

impl TaskElement {
    pub fn new(task_id: TaskId, group: impl Into<String>, size: f64, cpu: f64, deadline: f64) -> Self {
        Self {
            task_id,
            group: group.into(),
            size,
            cpu,
            deadline,
            status: TaskStatus::Unprocessed,
            from_ip: None,
            from_port: None,
            processing_time: None,
        }
    }

    pub fn origin(&self) -> Option<Endpoint> {
        match (self.from_ip, self.from_port) {
            (Some(host), Some(port)) => Some(Endpoint::new(host, port)),
            _ => None,
        }
    }

    pub fn set_origin(&mut self, endpoint: Endpoint) {
        self.from_ip = Some(endpoint.host);
        self.from_port = Some(endpoint.port);
    }

    pub fn is_unprocessed(&self) -> bool {
        self.status == TaskStatus::Unprocessed
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Task {
    elements: Vec<TaskElement>,
}

impl Task {
    pub fn new(elements: Vec<TaskElement>) -> Self {
        Self { elements }
    }

    pub fn push(&mut self, element: TaskElement) {
        self.elements.push(element);
    }

    pub fn elements(&self) -> &[TaskElement] {
        &self.elements
    }

    pub fn elements_mut(&mut self) -> &mut [TaskElement] {
        &mut self.elements
    }

    pub fn into_elements(self) -> Vec<TaskElement> {
        self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// The position of the first element that has not been processed.
    pub fn first_unprocessed(&self) -> Option<usize> {
        self.elements.iter().position(|x| x.is_unprocessed())
    }

    /// Marks every element as unprocessed and forgets its processing time.
    pub fn reset(&mut self) {
        for element in self.elements.iter_mut() {
            element.status = TaskStatus::Unprocessed;
            element.processing_time = None;
        }
    }

    pub fn total_processing_time(&self) -> f64 {
        self.elements.iter().filter_map(|x| x.processing_time).sum()
    }
}

/// Generates task elements with attributes drawn from the workload ranges.
pub struct TaskGenerator<R: Rng> {
    config: WorkloadConfig,
    rng: R,
    task_id_generator: IdGenerator<TaskId>,
}

impl<R: Rng> TaskGenerator<R> {
    pub fn new(config: WorkloadConfig, rng: R) -> Self {
        Self {
            config,
            rng,
            task_id_generator: IdGenerator::new(),
        }
    }

    pub fn generate(&mut self, count: usize) -> ExecutionResult<Task> {
        let group = self.config.group.clone();
        self.generate_group(count, &group)
    }

    pub fn generate_group(&mut self, count: usize, group: &str) -> ExecutionResult<Task> {
        let mut task = Task::default();
        for _ in 0..count {
            let task_id = self.task_id_generator.next()?;
            let size = sample(&mut self.rng, self.config.size_min, self.config.size_max);
            let cpu = sample(&mut self.rng, self.config.cpu_min, self.config.cpu_max);
            let deadline = sample(&mut self.rng, self.config.deadline_min, self.config.deadline_max);
            task.push(TaskElement::new(task_id, group, size, cpu, deadline));
        }
        Ok(task)
    }
}

fn sample(rng: &mut impl Rng, min: f64, max: f64) -> f64 {
    if max > min {
        rng.random_range(min..max)
    } else {
        min
    }
}
