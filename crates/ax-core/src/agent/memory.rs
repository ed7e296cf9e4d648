//! Working, episodic, and long-term memory.
//!
//! Working memory is a bounded ordered map with LRU eviction. Episodic
//! memory is a bounded buffer that evicts the lowest-importance record
//! on overflow (oldest among ties). A consolidation pass runs every
//! `K_c` ticks and copies the top-importance episodic records into the
//! append-only long-term store.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use ax_math::cosine_similarity;

/// One working-memory slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkingItem {
    pub key: String,
    pub value: Vec<f64>,
}

/// Bounded LRU working memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkingMemory {
    capacity: usize,
    /// Most recently used at the back.
    items: VecDeque<WorkingItem>,
}

impl WorkingMemory {
    pub fn new(capacity: usize) -> Self {
        WorkingMemory {
            capacity: capacity.max(1),
            items: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Insert or refresh a key, evicting the least recently used slot
    /// at capacity.
    pub fn put(&mut self, key: impl Into<String>, value: Vec<f64>) {
        let key = key.into();
        if let Some(pos) = self.items.iter().position(|i| i.key == key) {
            self.items.remove(pos);
        } else if self.items.len() >= self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(WorkingItem { key, value });
    }

    /// Fetch a key, marking it most recently used.
    pub fn get(&mut self, key: &str) -> Option<&WorkingItem> {
        let pos = self.items.iter().position(|i| i.key == key)?;
        let item = self.items.remove(pos).expect("position just found");
        self.items.push_back(item);
        self.items.back()
    }
}

/// One episodic record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub tick: u64,
    /// Belief or state vector at the time of the experience.
    pub state: Vec<f64>,
    pub observation: usize,
    pub action: usize,
    pub outcome: String,
    pub reward: f64,
    /// Importance in [0, 1]; drives eviction and consolidation.
    pub importance: f64,
}

/// Bounded, importance-weighted episodic memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodicMemory {
    capacity: usize,
    episodes: Vec<Episode>,
}

impl EpisodicMemory {
    pub fn new(capacity: usize) -> Self {
        EpisodicMemory {
            capacity: capacity.max(1),
            episodes: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.episodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.episodes.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Record an episode, evicting the lowest-importance record when
    /// full (oldest among ties).
    pub fn record(&mut self, mut episode: Episode) {
        episode.importance = episode.importance.clamp(0.0, 1.0);
        if self.episodes.len() >= self.capacity {
            let victim = self
                .episodes
                .iter()
                .enumerate()
                .min_by(|(ia, a), (ib, b)| {
                    a.importance
                        .partial_cmp(&b.importance)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| a.tick.cmp(&b.tick))
                        .then_with(|| ia.cmp(ib))
                })
                .map(|(i, _)| i);
            if let Some(i) = victim {
                self.episodes.remove(i);
            }
        }
        self.episodes.push(episode);
    }

    /// The most recent `n` episodes, newest first.
    pub fn recent(&self, n: usize) -> Vec<&Episode> {
        let mut out: Vec<&Episode> = self.episodes.iter().collect();
        out.sort_by(|a, b| b.tick.cmp(&a.tick));
        out.truncate(n);
        out
    }

    /// Episodes at or above an importance threshold.
    pub fn by_importance(&self, threshold: f64) -> Vec<&Episode> {
        let mut out: Vec<&Episode> = self
            .episodes
            .iter()
            .filter(|e| e.importance >= threshold)
            .collect();
        out.sort_by(|a, b| {
            b.importance
                .partial_cmp(&a.importance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        out
    }

    /// The `k` episodes most similar to a state vector (cosine).
    pub fn similar(&self, state: &[f64], k: usize) -> Vec<&Episode> {
        let mut scored: Vec<(f64, &Episode)> = self
            .episodes
            .iter()
            .map(|e| (cosine_similarity(&e.state, state), e))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.into_iter().take(k).map(|(_, e)| e).collect()
    }

    /// Raise an episode's importance (promotion by outcome feedback).
    pub fn promote(&mut self, tick: u64, boost: f64) {
        for e in self.episodes.iter_mut().filter(|e| e.tick == tick) {
            e.importance = (e.importance + boost).clamp(0.0, 1.0);
        }
    }
}

/// Append-only long-term memory with a hard capacity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LongTermMemory {
    capacity: usize,
    episodes: Vec<Episode>,
}

impl LongTermMemory {
    pub fn new(capacity: usize) -> Self {
        LongTermMemory {
            capacity: capacity.max(1),
            episodes: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.episodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.episodes.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn episodes(&self) -> &[Episode] {
        &self.episodes
    }

    /// Append if capacity allows; long-term memory never evicts.
    pub fn append(&mut self, episode: Episode) -> bool {
        if self.episodes.len() >= self.capacity {
            return false;
        }
        self.episodes.push(episode);
        true
    }
}

/// The agent's full memory system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemorySystem {
    pub working: WorkingMemory,
    pub episodic: EpisodicMemory,
    pub long_term: LongTermMemory,
    consolidation_interval: u64,
    consolidation_top_k: usize,
    last_consolidation: u64,
}

impl MemorySystem {
    pub fn new(settings: &ax_config::MemorySettings) -> Self {
        MemorySystem {
            working: WorkingMemory::new(settings.working_capacity),
            episodic: EpisodicMemory::new(settings.episodic_capacity),
            long_term: LongTermMemory::new(settings.longterm_capacity),
            consolidation_interval: settings.consolidation_interval.max(1),
            consolidation_top_k: settings.consolidation_top_k.max(1),
            last_consolidation: 0,
        }
    }

    /// Run consolidation when due: copy the top-importance episodic
    /// records into long-term memory. Returns how many were copied.
    pub fn maybe_consolidate(&mut self, tick: u64) -> usize {
        if tick < self.last_consolidation + self.consolidation_interval {
            return 0;
        }
        self.last_consolidation = tick;
        let candidates: Vec<Episode> = self
            .episodic
            .by_importance(0.0)
            .into_iter()
            .take(self.consolidation_top_k)
            .cloned()
            .collect();
        let mut copied = 0;
        for episode in candidates {
            let duplicate = self
                .long_term
                .episodes()
                .iter()
                .any(|e| e.tick == episode.tick && e.action == episode.action);
            if !duplicate && self.long_term.append(episode) {
                copied += 1;
            }
        }
        copied
    }

    /// Approximate memory pressure in [0, 1].
    pub fn pressure(&self) -> f64 {
        let used = self.working.len() + self.episodic.len() + self.long_term.len();
        let cap = self.working.capacity()
            + self.episodic.capacity()
            + self.long_term.capacity();
        used as f64 / cap as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn episode(tick: u64, importance: f64) -> Episode {
        Episode {
            tick,
            state: vec![1.0, 0.0],
            observation: 0,
            action: 0,
            outcome: "ok".into(),
            reward: 0.0,
            importance,
        }
    }

    #[test]
    fn working_memory_evicts_lru() {
        let mut wm = WorkingMemory::new(2);
        wm.put("a", vec![1.0]);
        wm.put("b", vec![2.0]);
        wm.get("a");
        wm.put("c", vec![3.0]);
        assert!(wm.get("b").is_none());
        assert!(wm.get("a").is_some());
        assert_eq!(wm.len(), 2);
    }

    #[test]
    fn episodic_evicts_lowest_importance() {
        let mut em = EpisodicMemory::new(3);
        em.record(episode(1, 0.9));
        em.record(episode(2, 0.1));
        em.record(episode(3, 0.5));
        em.record(episode(4, 0.7));
        assert_eq!(em.len(), 3);
        assert!(em.recent(10).iter().all(|e| e.tick != 2));
    }

    #[test]
    fn episodic_ties_evict_oldest() {
        let mut em = EpisodicMemory::new(2);
        em.record(episode(1, 0.5));
        em.record(episode(2, 0.5));
        em.record(episode(3, 0.9));
        assert!(em.recent(10).iter().all(|e| e.tick != 1));
    }

    #[test]
    fn recent_returns_newest_first() {
        let mut em = EpisodicMemory::new(8);
        for t in 1..=5 {
            em.record(episode(t, 0.5));
        }
        let recent = em.recent(2);
        assert_eq!(recent[0].tick, 5);
        assert_eq!(recent[1].tick, 4);
    }

    #[test]
    fn similar_ranks_by_cosine() {
        let mut em = EpisodicMemory::new(8);
        let mut aligned = episode(1, 0.5);
        aligned.state = vec![1.0, 0.0];
        let mut orthogonal = episode(2, 0.5);
        orthogonal.state = vec![0.0, 1.0];
        em.record(aligned);
        em.record(orthogonal);
        let hits = em.similar(&[0.9, 0.1], 1);
        assert_eq!(hits[0].tick, 1);
    }

    #[test]
    fn long_term_never_exceeds_capacity() {
        let mut lt = LongTermMemory::new(2);
        assert!(lt.append(episode(1, 0.5)));
        assert!(lt.append(episode(2, 0.5)));
        assert!(!lt.append(episode(3, 0.5)));
        assert_eq!(lt.len(), 2);
    }

    #[test]
    fn consolidation_runs_on_the_interval() {
        let settings = ax_config::MemorySettings {
            consolidation_interval: 10,
            consolidation_top_k: 2,
            ..ax_config::MemorySettings::default()
        };
        let mut mem = MemorySystem::new(&settings);
        mem.episodic.record(episode(1, 0.9));
        mem.episodic.record(episode(2, 0.8));
        mem.episodic.record(episode(3, 0.1));
        assert_eq!(mem.maybe_consolidate(5), 0);
        assert_eq!(mem.maybe_consolidate(10), 2);
        assert_eq!(mem.long_term.len(), 2);
        // Running again immediately does nothing.
        assert_eq!(mem.maybe_consolidate(11), 0);
    }
}
