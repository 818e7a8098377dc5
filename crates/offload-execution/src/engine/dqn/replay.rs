use std::collections::VecDeque;

use rand::Rng;

/// One experience of the agent.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: Vec<f64>,
    pub action: usize,
    pub reward: f64,
    pub next_state: Vec<f64>,
}

/// A bounded memory of transitions that forgets the oldest first.
#[derive(Debug, Clone)]
pub struct ReplayBuffer {
    capacity: usize,
    transitions: VecDeque<Transition>,
    stored: usize,
}

impl ReplayBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            transitions: VecDeque::with_capacity(capacity),
            stored: 0,
        }
    }

    pub fn push(&mut self, transition: Transition) {
        if self.transitions.len() == self.capacity {
            self.transitions.pop_front();
        }
        self.transitions.push_back(transition);
        self.stored += 1;
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    /// The number of transitions ever stored, including forgotten ones.
    pub fn stored(&self) -> usize {
        self.stored
    }

    pub fn iter(&self) -> impl Iterator<Item = &Transition> {
        self.transitions.iter()
    }

    /// Draws a batch uniformly with replacement.
    pub fn sample(&self, batch_size: usize, rng: &mut impl Rng) -> Vec<&Transition> {
        if self.transitions.is_empty() {
            return vec![];
        }
        (0..batch_size)
            .map(|_| &self.transitions[rng.random_range(0..self.transitions.len())])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    fn transition(reward: f64) -> Transition {
        Transition {
            state: vec![1.0, 0.5],
            action: 0,
            reward,
            next_state: vec![0.5, 0.5],
        }
    }

    #[test]
    fn test_evict_oldest() {
        let mut buffer = ReplayBuffer::new(3);
        for i in 0..5 {
            buffer.push(transition(i as f64));
        }
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.stored(), 5);
        let rewards = buffer.iter().map(|x| x.reward).collect::<Vec<_>>();
        assert_eq!(rewards, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_sample_with_replacement() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut buffer = ReplayBuffer::new(10);
        assert!(buffer.sample(4, &mut rng).is_empty());
        buffer.push(transition(-1.0));
        let batch = buffer.sample(4, &mut rng);
        assert_eq!(batch.len(), 4);
        assert!(batch.iter().all(|x| x.reward == -1.0));
    }
}
