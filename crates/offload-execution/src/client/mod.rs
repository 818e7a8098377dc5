mod response;

use std::collections::HashSet;

use log::{error, info};
pub use response::{Finished, ResponseCache, ResponseEntry};

use crate::device::{DeviceKind, Endpoint};
use crate::id::{DeviceId, TaskId};
use crate::message::ResponseContent;
use crate::task::{Task, TaskElement, TaskStatus};

pub type DoneCallback = Box<dyn FnMut(&[ResponseEntry])>;

/// A device that sends task elements and aggregates their responses.
pub struct Client {
    device_id: DeviceId,
    endpoint: Endpoint,
    responses: ResponseCache,
    done: Option<DoneCallback>,
    completed_groups: HashSet<String>,
}

impl Client {
    pub fn new(device_id: DeviceId, endpoint: Endpoint) -> Self {
        Self {
            device_id,
            endpoint,
            responses: ResponseCache::new(),
            done: None,
            completed_groups: HashSet::new(),
        }
    }

    pub fn device_id(&self) -> DeviceId {
        self.device_id
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    pub fn responses(&self) -> &ResponseCache {
        &self.responses
    }

    /// Registers the callback that receives the entries of each group
    /// once every element of the group has a response.
    pub fn when_done(&mut self, callback: DoneCallback) {
        self.done = Some(callback);
    }

    /// Tracks the elements of the task and stamps them with this client as the origin.
    pub fn prepare(&mut self, task: Task) -> Vec<TaskElement> {
        task.into_elements()
            .into_iter()
            .map(|mut element| {
                element.status = TaskStatus::Unprocessed;
                element.processing_time = None;
                element.set_origin(self.endpoint);
                self.responses.track(&element);
                self.completed_groups.remove(&element.group);
                element
            })
            .collect()
    }

    pub fn receive(&mut self, content: ResponseContent) {
        let Some(group) = content.group.as_deref() else {
            error!(
                "client({}) received a response without group for task({})",
                self.endpoint, content.task_id
            );
            return;
        };
        self.on_response(
            group,
            content.task_id,
            content.device_type,
            content.device_address.clone(),
            content.processing_time,
        );
    }

    pub fn on_response(
        &mut self,
        group: &str,
        task_id: TaskId,
        device_type: Option<DeviceKind>,
        device_address: Option<String>,
        processing_time: Option<f64>,
    ) {
        let Some(entry) = self.responses.get_mut(group, task_id) else {
            error!(
                "client({}) received a response for unknown task({task_id}) of group {group}",
                self.endpoint
            );
            return;
        };
        entry.finished = if device_type.is_some() {
            Finished::Success
        } else {
            Finished::Failure
        };
        entry.device_type = device_type;
        entry.device_address = device_address;
        entry.processing_time = processing_time;
        info!(
            "client({}) received a response for task({task_id}): finished {}, device {:?} at {:?}",
            self.endpoint, entry.finished, entry.device_type, entry.device_address
        );

        if self.completed_groups.contains(group) || !self.responses.is_group_complete(group) {
            return;
        }
        self.completed_groups.insert(group.to_string());
        let entries = self.responses.group(group).cloned().collect::<Vec<_>>();
        match self.done.as_mut() {
            Some(callback) => callback(&entries),
            None => info!("client({}) completed group {group}", self.endpoint),
        }
    }
}
