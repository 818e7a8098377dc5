use log::debug;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::engine::dqn::network::{argmax, QNetwork, Target};
use crate::engine::dqn::options::DqnOptions;
use crate::engine::dqn::replay::{ReplayBuffer, Transition};
use crate::error::ExecutionResult;

/// A deep Q-learning agent with a target network and experience replay.
pub struct DeepQNetwork {
    options: DqnOptions,
    eval_net: QNetwork,
    target_net: QNetwork,
    memory: ReplayBuffer,
    rng: ChaCha8Rng,
    learn_step_counter: usize,
    cost_history: Vec<f64>,
}

impl DeepQNetwork {
    pub fn new(n_actions: usize, n_features: usize, options: DqnOptions) -> ExecutionResult<Self> {
        let mut rng = ChaCha8Rng::seed_from_u64(options.seed);
        let eval_net = QNetwork::new(n_features, options.hidden_units, n_actions, &mut rng)?;
        let target_net = eval_net.clone();
        let memory = ReplayBuffer::new(options.memory_size);
        Ok(Self {
            options,
            eval_net,
            target_net,
            memory,
            rng,
            learn_step_counter: 0,
            cost_history: vec![],
        })
    }

    pub fn n_actions(&self) -> usize {
        self.eval_net.n_actions()
    }

    pub fn n_features(&self) -> usize {
        self.eval_net.n_features()
    }

    /// Picks the best known action with probability `e_greedy`
    /// and a uniformly random action otherwise.
    pub fn choose_action(&mut self, observation: &[f64]) -> ExecutionResult<usize> {
        if self.rng.random::<f64>() < self.options.e_greedy {
            if let Some(action) = self.greedy_action(observation)? {
                return Ok(action);
            }
        }
        Ok(self.rng.random_range(0..self.n_actions()))
    }

    pub fn greedy_action(&self, observation: &[f64]) -> ExecutionResult<Option<usize>> {
        Ok(argmax(&self.q_values(observation)?))
    }

    pub fn q_values(&self, observation: &[f64]) -> ExecutionResult<Vec<f64>> {
        self.eval_net.forward(observation)
    }

    pub fn store_transition(&mut self, transition: Transition) {
        self.memory.push(transition);
    }

    /// Fits the evaluation network on a batch drawn from memory.
    /// Returns the batch cost, or [None] if there is nothing to learn from.
    pub fn learn(&mut self) -> ExecutionResult<Option<f64>> {
        if self.memory.is_empty() {
            return Ok(None);
        }
        if self.learn_step_counter % self.options.replace_target_iter == 0 {
            self.target_net = self.eval_net.clone();
            debug!(
                "target network replaced after {} learning steps",
                self.learn_step_counter
            );
        }
        let batch = self.memory.sample(self.options.batch_size, &mut self.rng);
        let targets = batch
            .iter()
            .map(|t| {
                let next = self.target_net.forward(&t.next_state)?;
                let best = next.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                Ok(Target {
                    state: &t.state,
                    action: t.action,
                    value: t.reward + self.options.reward_decay * best,
                })
            })
            .collect::<ExecutionResult<Vec<_>>>()?;
        let cost = self.eval_net.fit(&targets, self.options.learning_rate)?;
        self.cost_history.push(cost);
        self.learn_step_counter += 1;
        Ok(Some(cost))
    }

    pub fn memory(&self) -> &ReplayBuffer {
        &self.memory
    }

    pub fn learn_steps(&self) -> usize {
        self.learn_step_counter
    }

    pub fn cost_history(&self) -> &[f64] {
        &self.cost_history
    }
}

/// Counts training steps and decides when the agent learns.
/// Learning starts after the warmup and then happens every `interval` steps.
#[derive(Debug, Clone)]
pub struct TrainingSteps {
    count: usize,
    warmup: usize,
    interval: usize,
}

impl TrainingSteps {
    pub fn new(warmup: usize, interval: usize) -> Self {
        Self {
            count: 0,
            warmup,
            interval: interval.max(1),
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Records one step and returns whether the agent should learn at this step.
    pub fn advance(&mut self) -> bool {
        let learn = self.count > self.warmup && self.count % self.interval == 0;
        self.count += 1;
        learn
    }
}

/// The agent together with its training step counter.
/// The counter survives across episodes.
pub struct Learner {
    agent: DeepQNetwork,
    steps: TrainingSteps,
}

impl Learner {
    pub fn new(agent: DeepQNetwork, options: &DqnOptions) -> Self {
        Self {
            agent,
            steps: TrainingSteps::new(options.warmup_steps, options.learn_interval),
        }
    }

    pub fn agent(&self) -> &DeepQNetwork {
        &self.agent
    }

    pub fn agent_mut(&mut self) -> &mut DeepQNetwork {
        &mut self.agent
    }

    pub fn steps(&self) -> &TrainingSteps {
        &self.steps
    }

    pub fn step(&mut self) -> ExecutionResult<()> {
        if self.steps.advance() {
            if let Some(cost) = self.agent.learn()? {
                debug!("step {}: cost {cost:.6}", self.steps.count());
            }
        }
        Ok(())
    }
}
