use anyhow::{Result, bail};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;

use crate::action::Action;
use crate::emulation::Observation;
use crate::info::Info;

// =============================================================================
// Transition
// =============================================================================

/// One macro-decision: the state it was taken in, the action, and where it led.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub observation: Observation,
    pub info: Info,
    pub action: Action,
    /// Summed over every frame the action locked the character through.
    pub reward: f64,
    pub next_observation: Observation,
    pub next_info: Info,
    pub done: bool,
}

// =============================================================================
// Experience Buffer
// =============================================================================

/// Fixed-capacity FIFO of transitions.
///
/// Slots are allocated once; when full, the next push overwrites the oldest
/// slot in place and the write head advances.
#[derive(Debug, Serialize, Deserialize)]
pub struct ExperienceBuffer {
    slots: Vec<Transition>,
    head: usize,
    capacity: usize,
}

impl ExperienceBuffer {
    /// # Panics
    ///
    /// Panics if `capacity` is zero. `LobbyConfig::validate` rejects that before
    /// any player is built.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "experience buffer capacity must be positive");
        Self {
            slots: Vec::with_capacity(capacity),
            head: 0,
            capacity,
        }
    }

    /// Append, evicting and returning the oldest record when full.
    pub fn push(&mut self, t: Transition) -> Option<Transition> {
        let evicted = if self.slots.len() < self.capacity {
            self.slots.push(t);
            None
        } else {
            Some(std::mem::replace(&mut self.slots[self.head], t))
        };
        self.head = (self.head + 1) % self.capacity;
        evicted
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.slots.len() == self.capacity
    }

    fn oldest(&self) -> usize {
        if self.is_full() { self.head } else { 0 }
    }

    /// Record by age: 0 is the oldest, `len() - 1` the newest.
    pub fn get(&self, index: usize) -> Option<&Transition> {
        if index >= self.slots.len() {
            return None;
        }
        Some(&self.slots[(self.oldest() + index) % self.capacity])
    }

    pub fn newest(&self) -> Option<&Transition> {
        self.len().checked_sub(1).and_then(|i| self.get(i))
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &Transition> {
        let (newer, older) = self.slots.split_at(self.oldest());
        older.iter().chain(newer.iter())
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.head = 0;
    }

    /// Hand over every record in time order, leaving the buffer empty.
    pub fn drain(&mut self) -> Vec<Transition> {
        let oldest = self.oldest();
        let mut records = std::mem::take(&mut self.slots);
        records.rotate_left(oldest);
        self.slots = Vec::with_capacity(self.capacity);
        self.head = 0;
        records
    }

    pub fn total_reward(&self) -> f64 {
        self.slots.iter().map(|t| t.reward).sum()
    }

    /// Uniform sample with replacement.
    pub fn sample<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> Result<Vec<&Transition>> {
        let len = self.slots.len();
        if len == 0 {
            bail!("cannot sample from an empty experience buffer");
        }
        Ok((0..batch_size)
            .map(|_| &self.slots[rng.random_range(0..len)])
            .collect())
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path.as_ref())?;
        let writer = std::io::BufWriter::new(file);
        bincode::serialize_into(writer, self)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let reader = std::io::BufReader::new(file);
        let buffer: Self = bincode::deserialize_from(reader)?;
        if buffer.capacity == 0
            || buffer.slots.len() > buffer.capacity
            || buffer.head >= buffer.capacity
            || (buffer.slots.len() < buffer.capacity && buffer.head != buffer.slots.len())
        {
            bail!(
                "corrupt experience buffer: {} records, capacity {}, head {}",
                buffer.slots.len(),
                buffer.capacity,
                buffer.head
            );
        }
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn transition(reward: f64) -> Transition {
        Transition {
            observation: vec![0],
            info: Info::new(512, 512, 99),
            action: Action::noop(12),
            reward,
            next_observation: vec![1],
            next_info: Info::new(512, 512, 98),
            done: false,
        }
    }

    fn rewards(buf: &ExperienceBuffer) -> Vec<f64> {
        buf.iter().map(|t| t.reward).collect()
    }

    #[test]
    fn test_push_below_capacity() {
        let mut buf = ExperienceBuffer::new(4);
        assert!(buf.is_empty());
        for r in 0..3 {
            assert!(buf.push(transition(r as f64)).is_none());
        }
        assert_eq!(buf.len(), 3);
        assert!(!buf.is_full());
        assert_eq!(rewards(&buf), vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_overflow_evicts_oldest_first() {
        let capacity = 3;
        let mut buf = ExperienceBuffer::new(capacity);
        let mut evicted = Vec::new();
        for r in 0..(capacity + 4) {
            if let Some(old) = buf.push(transition(r as f64)) {
                evicted.push(old.reward);
            }
            assert!(buf.len() <= capacity);
        }
        assert_eq!(buf.len(), capacity);
        assert_eq!(evicted, vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(rewards(&buf), vec![4.0, 5.0, 6.0]);
        assert_eq!(buf.get(0).unwrap().reward, 4.0);
        assert_eq!(buf.newest().unwrap().reward, 6.0);
        assert!(buf.get(3).is_none());
    }

    #[test]
    fn test_drain_returns_time_order() {
        let mut buf = ExperienceBuffer::new(3);
        for r in 0..5 {
            buf.push(transition(r as f64));
        }
        let drained: Vec<f64> = buf.drain().into_iter().map(|t| t.reward).collect();
        assert_eq!(drained, vec![2.0, 3.0, 4.0]);
        assert!(buf.is_empty());
        buf.push(transition(9.0));
        assert_eq!(rewards(&buf), vec![9.0]);
    }

    #[test]
    fn test_clear() {
        let mut buf = ExperienceBuffer::new(2);
        buf.push(transition(1.0));
        buf.push(transition(2.0));
        buf.push(transition(3.0));
        buf.clear();
        assert!(buf.is_empty());
        assert!(buf.newest().is_none());
        buf.push(transition(4.0));
        assert_eq!(rewards(&buf), vec![4.0]);
    }

    #[test]
    fn test_sample() {
        let mut buf = ExperienceBuffer::new(8);
        let mut rng = SmallRng::seed_from_u64(3);
        assert!(buf.sample(4, &mut rng).is_err());
        for r in 0..5 {
            buf.push(transition(r as f64));
        }
        let batch = buf.sample(16, &mut rng).unwrap();
        assert_eq!(batch.len(), 16);
        assert!(batch.iter().all(|t| (0.0..5.0).contains(&t.reward)));
    }

    #[test]
    fn test_save_load_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("buffer.bin");
        let mut buf = ExperienceBuffer::new(3);
        for r in 0..4 {
            buf.push(transition(r as f64));
        }
        buf.save(&path).unwrap();
        let mut loaded = ExperienceBuffer::load(&path).unwrap();
        assert_eq!(rewards(&loaded), vec![1.0, 2.0, 3.0]);
        loaded.push(transition(4.0));
        assert_eq!(rewards(&loaded), vec![2.0, 3.0, 4.0]);
        assert_eq!(loaded.total_reward(), 9.0);
    }

    #[test]
    fn test_load_rejects_head_out_of_step_with_len() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("buffer.bin");
        let mut buf = ExperienceBuffer::new(4);
        buf.push(transition(0.0));
        buf.push(transition(1.0));
        buf.head = 0;
        buf.save(&path).unwrap();
        let err = ExperienceBuffer::load(&path).unwrap_err();
        assert!(err.to_string().contains("corrupt"));
    }
}
