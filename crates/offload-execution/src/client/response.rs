use std::fmt;

use crate::device::DeviceKind;
use crate::id::TaskId;
use crate::task::TaskElement;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finished {
    Unfinished,
    Success,
    Failure,
}

impl fmt::Display for Finished {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Finished::Unfinished => write!(f, "0"),
            Finished::Success => write!(f, "Y"),
            Finished::Failure => write!(f, "N"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResponseEntry {
    pub task_id: TaskId,
    pub group: String,
    pub finished: Finished,
    pub device_type: Option<DeviceKind>,
    pub device_address: Option<String>,
    pub processing_time: Option<f64>,
}

/// The outcome of every element a client has sent, keyed by group and task ID.
#[derive(Debug, Default)]
pub struct ResponseCache {
    entries: Vec<ResponseEntry>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking the element as unfinished.
    pub fn track(&mut self, element: &TaskElement) {
        let entry = ResponseEntry {
            task_id: element.task_id,
            group: element.group.clone(),
            finished: Finished::Unfinished,
            device_type: None,
            device_address: None,
            processing_time: None,
        };
        match self.get_mut(&element.group, element.task_id) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    pub fn get(&self, group: &str, task_id: TaskId) -> Option<&ResponseEntry> {
        self.entries
            .iter()
            .find(|x| x.group == group && x.task_id == task_id)
    }

    pub fn get_mut(&mut self, group: &str, task_id: TaskId) -> Option<&mut ResponseEntry> {
        self.entries
            .iter_mut()
            .find(|x| x.group == group && x.task_id == task_id)
    }

    pub fn group<'a>(&'a self, group: &'a str) -> impl Iterator<Item = &'a ResponseEntry> + 'a {
        self.entries.iter().filter(move |x| x.group == group)
    }

    /// Whether every tracked element of the group has a response.
    pub fn is_group_complete(&self, group: &str) -> bool {
        let mut entries = self.group(group).peekable();
        entries.peek().is_some() && entries.all(|x| x.finished != Finished::Unfinished)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResponseEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
