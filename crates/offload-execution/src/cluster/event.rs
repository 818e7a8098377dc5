use crate::device::Endpoint;
use crate::engine::TrainingEvent;
use crate::id::DeviceId;
use crate::task::{Task, TaskElement};

pub enum ClusterEvent {
    /// A client sends the elements of the task to the coordinator.
    SubmitTask { client: DeviceId, task: Task },
    /// An encoded message arrives at its destination.
    Deliver {
        from: Endpoint,
        to: Endpoint,
        payload: Vec<u8>,
    },
    /// A server finished processing an element.
    TaskCompleted {
        device: DeviceId,
        element: TaskElement,
        reply_to: Endpoint,
        processing_time: f64,
        /// The cpu to give back to the server,
        /// or [None] if the server did not deduct any.
        demand: Option<f64>,
    },
    /// The coordinator decides the first unprocessed element, if any.
    HandleNext,
    /// A server reports its cpu to the coordinator.
    ResourceChanged { device: DeviceId, cpu: f64 },
    Train { task: Task, episodes: usize },
    Training(TrainingEvent),
    Shutdown,
}
