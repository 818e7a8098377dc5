use offload_common::config::DqnConfig;

#[readonly::make]
#[derive(Debug, Clone)]
pub struct DqnOptions {
    pub learning_rate: f64,
    pub reward_decay: f64,
    pub e_greedy: f64,
    pub replace_target_iter: usize,
    pub memory_size: usize,
    pub batch_size: usize,
    pub hidden_units: usize,
    pub warmup_steps: usize,
    pub learn_interval: usize,
    pub seed: u64,
}

impl DqnOptions {
    pub fn new(config: &DqnConfig, seed: u64) -> Self {
        Self {
            learning_rate: config.learning_rate,
            reward_decay: config.reward_decay,
            e_greedy: config.e_greedy,
            replace_target_iter: config.replace_target_iter.max(1),
            memory_size: config.memory_size.max(1),
            batch_size: config.batch_size.max(1),
            hidden_units: config.hidden_units.max(1),
            warmup_steps: config.warmup_steps,
            learn_interval: config.learn_interval.max(1),
            seed,
        }
    }
}

#[cfg(test)]
pub(crate) fn test_options(e_greedy: f64) -> DqnOptions {
    let config = DqnConfig {
        learning_rate: 0.01,
        reward_decay: 0.9,
        e_greedy,
        replace_target_iter: 3,
        memory_size: 50,
        batch_size: 4,
        hidden_units: 6,
        warmup_steps: 2,
        learn_interval: 2,
        episodes: 1,
    };
    DqnOptions::new(&config, 7)
}
