//! A single-threaded actor runtime driven by simulated time.
//!
//! Messages are never delivered concurrently. Each message is bound to a
//! simulated timestamp and the runtime processes messages in nondecreasing
//! timestamp order. Messages scheduled for the same timestamp are processed
//! in the order they were scheduled.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Duration;

use log::debug;

pub trait Actor: Sized + 'static {
    type Message: 'static;
    type Options;
    type Error;

    fn new(options: Self::Options) -> Result<Self, Self::Error>;
    fn start(&mut self, ctx: &mut ActorContext<Self>) -> Result<(), Self::Error>;
    fn receive(
        &mut self,
        ctx: &mut ActorContext<Self>,
        message: Self::Message,
    ) -> Result<ActorAction, Self::Error>;
    fn stop(self) -> Result<(), Self::Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorAction {
    Continue,
    Stop,
}

struct Scheduled<M> {
    at: Duration,
    sequence: u64,
    message: M,
}

impl<M> PartialEq for Scheduled<M> {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.sequence == other.sequence
    }
}

impl<M> Eq for Scheduled<M> {}

impl<M> PartialOrd for Scheduled<M> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<M> Ord for Scheduled<M> {
    fn cmp(&self, other: &Self) -> Ordering {
        // `BinaryHeap` is a max-heap, so the order is reversed to pop
        // the earliest message first.
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// The handle an actor uses to read the simulated clock and schedule messages.
pub struct ActorContext<T: Actor> {
    now: Duration,
    next_sequence: u64,
    queue: BinaryHeap<Scheduled<T::Message>>,
}

impl<T: Actor> ActorContext<T> {
    fn new() -> Self {
        Self {
            now: Duration::ZERO,
            next_sequence: 0,
            queue: BinaryHeap::new(),
        }
    }

    /// The current simulated time.
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Schedules a message to be received at the current simulated time,
    /// after all messages already scheduled for this time.
    pub fn send(&mut self, message: T::Message) {
        self.send_with_delay(message, Duration::ZERO);
    }

    /// Schedules a message to be received after the delay in simulated time.
    pub fn send_with_delay(&mut self, message: T::Message, delay: Duration) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.queue.push(Scheduled {
            at: self.now + delay,
            sequence,
            message,
        });
    }

    /// The number of messages that have not been received yet.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    fn next_due(&self) -> Option<Duration> {
        self.queue.peek().map(|x| x.at)
    }

    fn pop(&mut self) -> Option<(Duration, T::Message)> {
        self.queue.pop().map(|x| (x.at, x.message))
    }
}

pub struct ActorSystem<T: Actor> {
    actor: T,
    ctx: ActorContext<T>,
    stopped: bool,
}

impl<T: Actor> ActorSystem<T> {
    pub fn new(options: T::Options) -> Result<Self, T::Error> {
        let mut actor = T::new(options)?;
        let mut ctx = ActorContext::new();
        actor.start(&mut ctx)?;
        Ok(Self {
            actor,
            ctx,
            stopped: false,
        })
    }

    pub fn now(&self) -> Duration {
        self.ctx.now()
    }

    pub fn pending(&self) -> usize {
        self.ctx.pending()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn actor(&self) -> &T {
        &self.actor
    }

    pub fn actor_mut(&mut self) -> &mut T {
        &mut self.actor
    }

    /// Schedules a message from outside the actor at the current simulated time.
    pub fn send(&mut self, message: T::Message) {
        self.ctx.send(message);
    }

    pub fn send_with_delay(&mut self, message: T::Message, delay: Duration) {
        self.ctx.send_with_delay(message, delay);
    }

    /// Processes messages until no message is pending or the actor stops.
    pub fn run(&mut self) -> Result<(), T::Error> {
        while !self.stopped {
            if !self.step()? {
                break;
            }
        }
        Ok(())
    }

    /// Processes all messages scheduled at or before the deadline,
    /// then advances the simulated clock to the deadline.
    pub fn run_until(&mut self, deadline: Duration) -> Result<(), T::Error> {
        while !self.stopped {
            match self.ctx.next_due() {
                Some(at) if at <= deadline => {
                    self.step()?;
                }
                _ => break,
            }
        }
        if !self.stopped && self.ctx.now < deadline {
            self.ctx.now = deadline;
        }
        Ok(())
    }

    /// Processes the next pending message.
    /// Returns `false` if there is no message to process.
    pub fn step(&mut self) -> Result<bool, T::Error> {
        if self.stopped {
            return Ok(false);
        }
        let Some((at, message)) = self.ctx.pop() else {
            return Ok(false);
        };
        self.ctx.now = at;
        match self.actor.receive(&mut self.ctx, message)? {
            ActorAction::Continue => {}
            ActorAction::Stop => {
                debug!("actor stopped at {:.6}s", at.as_secs_f64());
                self.stopped = true;
            }
        }
        Ok(true)
    }

    pub fn stop(self) -> Result<(), T::Error> {
        self.actor.stop()
    }
}
