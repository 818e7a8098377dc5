mod actor;
mod event;
mod options;

pub use actor::ClusterActor;
pub use event::ClusterEvent;
pub use options::ClusterOptions;
