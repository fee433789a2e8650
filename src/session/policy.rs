use chrono::Duration;

use crate::config::Config;
use crate::model::PracticeMode;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Batching {
    /// Whole remaining pool in one round.
    Full,
    /// Rounds of `chunk_size` words, at most `max_rounds` per session.
    Chunked { chunk_size: usize, max_rounds: usize },
    /// One round of at most `max_size` words.
    Capped { max_size: usize },
}

/// How a practice mode batches words and reacts to misses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionPolicy {
    pub batching: Batching,
    /// Missed words lead the next round.
    pub retry_on_miss: bool,
    /// Misses cost a life.
    pub life_penalty: bool,
    pub shuffle: bool,
    /// Delay before a correct answer moves on by itself.
    pub auto_advance: Option<Duration>,
}

impl SessionPolicy {
    pub fn for_mode(mode: PracticeMode, config: &Config) -> Self {
        let auto_advance = Some(Duration::milliseconds(config.auto_advance_ms as i64));
        match mode {
            PracticeMode::Flashcards => Self {
                batching: Batching::Full,
                retry_on_miss: false,
                life_penalty: false,
                shuffle: false,
                auto_advance: None,
            },
            PracticeMode::Quiz => Self {
                batching: Batching::Full,
                retry_on_miss: false,
                life_penalty: false,
                shuffle: true,
                auto_advance,
            },
            PracticeMode::Matching => Self {
                batching: Batching::Chunked {
                    chunk_size: config.matching_chunk_size,
                    max_rounds: config.matching_max_rounds,
                },
                retry_on_miss: true,
                life_penalty: true,
                shuffle: true,
                auto_advance,
            },
            PracticeMode::Writing => Self {
                batching: Batching::Capped {
                    max_size: config.writing_session_size,
                },
                retry_on_miss: false,
                life_penalty: false,
                shuffle: true,
                auto_advance,
            },
            PracticeMode::SentencePuzzle => Self {
                batching: Batching::Full,
                retry_on_miss: false,
                life_penalty: false,
                shuffle: true,
                auto_advance,
            },
        }
    }

    pub fn round_size(&self) -> usize {
        match self.batching {
            Batching::Full => usize::MAX,
            Batching::Chunked { chunk_size, .. } => chunk_size.max(1),
            Batching::Capped { max_size } => max_size.max(1),
        }
    }

    /// Rounds before the session stops; a full-list session runs until
    /// the pool is empty.
    pub fn max_rounds(&self) -> usize {
        match self.batching {
            Batching::Full => usize::MAX,
            Batching::Chunked { max_rounds, .. } => max_rounds.max(1),
            Batching::Capped { .. } => 1,
        }
    }
}
