use std::time::Duration;

use log::{debug, info};

use crate::engine::dqn::agent::Learner;
use crate::engine::dqn::episode::{Episode, EpisodeEvent, EpisodeState};
use crate::engine::{TrainingEvent, TrainingScheduler};
use crate::error::{ExecutionError, ExecutionResult};
use crate::resource::DeviceCache;
use crate::task::Task;

#[derive(Debug, Clone)]
pub struct EpisodeSummary {
    /// The one-based index of the episode.
    pub episode: usize,
    pub episodes: usize,
    pub completed: bool,
    pub total_time: f64,
    pub task: Task,
    pub cache: DeviceCache,
}

pub type EpisodeCallback = Box<dyn FnMut(&EpisodeSummary)>;

/// Runs training episodes one after another on the simulated clock.
pub struct EpisodeTrainer {
    learner: Learner,
    template: Option<Task>,
    episode: Option<Episode>,
    remaining: usize,
    total: usize,
    callback: Option<EpisodeCallback>,
    history: Vec<f64>,
}

impl EpisodeTrainer {
    pub fn new(learner: Learner) -> Self {
        Self {
            learner,
            template: None,
            episode: None,
            remaining: 0,
            total: 0,
            callback: None,
            history: vec![],
        }
    }

    pub fn learner(&self) -> &Learner {
        &self.learner
    }

    pub fn is_training(&self) -> bool {
        self.template.is_some()
    }

    /// The total processing time of each episode that has ended.
    pub fn history(&self) -> &[f64] {
        &self.history
    }

    pub fn set_callback(&mut self, callback: EpisodeCallback) {
        self.callback = Some(callback);
    }

    pub fn train(
        &mut self,
        scheduler: &mut dyn TrainingScheduler,
        task: Task,
        episodes: usize,
        cache: &DeviceCache,
    ) -> ExecutionResult<()> {
        if self.is_training() {
            return Err(ExecutionError::invalid("training is already in progress"));
        }
        if task.is_empty() {
            return Err(ExecutionError::invalid("cannot train on an empty task"));
        }
        self.template = Some(task);
        self.train_start(scheduler, episodes, episodes, cache)
    }

    fn train_start(
        &mut self,
        scheduler: &mut dyn TrainingScheduler,
        remaining: usize,
        total: usize,
        cache: &DeviceCache,
    ) -> ExecutionResult<()> {
        self.remaining = remaining;
        self.total = total;
        if remaining == 0 {
            info!(
                "training finished after {total} episodes at {:.6}s",
                scheduler.now().as_secs_f64()
            );
            self.template = None;
            self.episode = None;
            return Ok(());
        }
        let task = self
            .template
            .clone()
            .ok_or_else(|| ExecutionError::internal("missing training task"))?;
        let id = total - remaining + 1;
        info!(
            "training episode {id} of {total} at {:.6}s",
            scheduler.now().as_secs_f64()
        );
        self.episode = Some(Episode::new(id, task, cache.clone()));
        self.on_episode_event(scheduler, id, EpisodeEvent::Start)
    }

    pub fn on_event(
        &mut self,
        scheduler: &mut dyn TrainingScheduler,
        event: TrainingEvent,
        cache: &DeviceCache,
    ) -> ExecutionResult<()> {
        match event {
            TrainingEvent::Episode { episode, event } => {
                self.on_episode_event(scheduler, episode, event)
            }
            TrainingEvent::NextEpisode => {
                if !self.is_training() {
                    debug!("no training in progress");
                    return Ok(());
                }
                self.train_start(
                    scheduler,
                    self.remaining.saturating_sub(1),
                    self.total,
                    cache,
                )
            }
        }
    }

    fn on_episode_event(
        &mut self,
        scheduler: &mut dyn TrainingScheduler,
        episode: usize,
        event: EpisodeEvent,
    ) -> ExecutionResult<()> {
        let Some(current) = self.episode.as_mut() else {
            debug!("ignored {event:?} for episode {episode} without training");
            return Ok(());
        };
        if current.id() != episode {
            debug!("ignored {event:?} for stale episode {episode}");
            return Ok(());
        }
        let was_terminal = current.is_terminal();
        if let Err(e) = current.on_event(&mut self.learner, scheduler, event) {
            self.template = None;
            self.episode = None;
            return Err(e);
        }
        if was_terminal || !current.is_terminal() {
            return Ok(());
        }
        let (completed, total_time) = match current.state() {
            EpisodeState::Finished { total_time } => (true, *total_time),
            _ => (false, current.task().total_processing_time()),
        };
        let summary = EpisodeSummary {
            episode,
            episodes: self.total,
            completed,
            total_time,
            task: current.task().clone(),
            cache: current.cache().clone(),
        };
        if completed {
            info!("episode {episode} finished with total processing time {total_time:.6}s");
        } else {
            info!("episode {episode} aborted");
        }
        self.history.push(total_time);
        if let Some(callback) = self.callback.as_mut() {
            callback(&summary);
        }
        scheduler.schedule(Duration::ZERO, TrainingEvent::NextEpisode);
        Ok(())
    }
}
