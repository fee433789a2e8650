use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use thiserror::Error;
use tracing::{debug, info};

use crate::engine::ledger::{LedgerError, ProgressLedger};
use crate::engine::lives::{LifeOutcome, LivesGate};
use crate::model::{Lesson, PracticeMode, Word, WordKey};
use crate::session::evaluate::{check_sentence, check_written, tiles};
use crate::session::policy::SessionPolicy;
use crate::session::pool;

/// Wrong options shown next to the right one in a quiz.
const QUIZ_DISTRACTORS: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Loading,
    Presenting,
    Answered { correct: bool },
    SessionComplete,
    LessonComplete,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Response {
    /// Flashcard marked as known or not after flipping.
    Flashcard { known: bool },
    /// Index into the quiz options.
    Choice(usize),
    /// Matching: a word on the left paired with a translation on the right.
    Pair { left: WordKey, right: WordKey },
    Text(String),
    Tiles(Vec<String>),
}

impl Response {
    fn kind(&self) -> &'static str {
        match self {
            Response::Flashcard { .. } => "flashcard",
            Response::Choice(_) => "choice",
            Response::Pair { .. } => "pair",
            Response::Text(_) => "text",
            Response::Tiles(_) => "tiles",
        }
    }

    fn fits(&self, mode: PracticeMode) -> bool {
        matches!(
            (mode, self),
            (PracticeMode::Flashcards, Response::Flashcard { .. })
                | (PracticeMode::Quiz, Response::Choice(_))
                | (PracticeMode::Matching, Response::Pair { .. })
                | (PracticeMode::Writing, Response::Text(_))
                | (PracticeMode::SentencePuzzle, Response::Tiles(_))
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuizOption {
    pub text: String,
    /// `None` for hand-written distractors that belong to no card.
    pub key: Option<WordKey>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchTile {
    pub key: WordKey,
    pub text: String,
    pub solved: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Prompt {
    Flashcard {
        word: Word,
        revealed: bool,
        position: usize,
        total: usize,
    },
    Quiz {
        word: Word,
        options: Vec<QuizOption>,
    },
    Matching {
        left: Vec<MatchTile>,
        right: Vec<MatchTile>,
    },
    Writing {
        word: Word,
    },
    SentencePuzzle {
        word: Word,
        tiles: Vec<String>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Feedback {
    pub correct: bool,
    pub word: Word,
    pub expected: String,
    /// The answer added the word to the ledger (false if it was already there).
    pub newly_learned: bool,
    pub life: Option<LifeOutcome>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Advance {
    Next,
    SessionComplete,
    LessonComplete,
    /// Nothing to advance from, or completion was already reported.
    Ignored,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no word is waiting for an answer")]
    NotPresenting,
    #[error("{mode} does not accept a {response} answer")]
    WrongResponse {
        mode: PracticeMode,
        response: &'static str,
    },
    #[error("option {0} does not exist")]
    InvalidChoice(usize),
    #[error("`{0}` is not on the board")]
    NotOnBoard(String),
    #[error("out of lives, try again in {remaining_secs}s")]
    Exhausted { remaining_secs: i64 },
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("failed to update lives: {0}")]
    Lives(#[from] anyhow::Error),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub correct: u32,
    pub incorrect: u32,
    pub rounds: u32,
}

#[derive(Clone, Debug)]
struct RoundItem {
    word: Word,
    solved: bool,
    missed: bool,
}

/// Drives one practice mode over one lesson.
///
/// Sequential modes walk the round one word at a time; matching puts the
/// whole round on a board and finishes when every pair is solved. Learned
/// words go straight to the ledger, so the pool for the next round is always
/// derived fresh from it.
pub struct SessionController {
    mode: PracticeMode,
    lesson_id: String,
    policy: SessionPolicy,
    rng: SmallRng,
    state: SessionState,
    round: Vec<RoundItem>,
    cursor: usize,
    revealed: bool,
    options: Vec<QuizOption>,
    tiles: Vec<String>,
    left_order: Vec<usize>,
    right_order: Vec<usize>,
    review: Vec<Word>,
    rounds_played: usize,
    lesson_complete_sent: bool,
    advance_at: Option<DateTime<Utc>>,
    stats: SessionStats,
}

impl SessionController {
    pub fn new(mode: PracticeMode, lesson_id: &str, policy: SessionPolicy, rng: SmallRng) -> Self {
        Self {
            mode,
            lesson_id: lesson_id.to_string(),
            policy,
            rng,
            state: SessionState::Loading,
            round: Vec::new(),
            cursor: 0,
            revealed: false,
            options: Vec::new(),
            tiles: Vec::new(),
            left_order: Vec::new(),
            right_order: Vec::new(),
            review: Vec::new(),
            rounds_played: 0,
            lesson_complete_sent: false,
            advance_at: None,
            stats: SessionStats::default(),
        }
    }

    pub fn mode(&self) -> PracticeMode {
        self.mode
    }

    pub fn lesson_id(&self) -> &str {
        &self.lesson_id
    }

    pub fn policy(&self) -> &SessionPolicy {
        &self.policy
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Deadline of the scheduled auto-advance, if any.
    pub fn pending_advance(&self) -> Option<DateTime<Utc>> {
        self.advance_at
    }

    /// Position of the current word within the round.
    pub fn position(&self) -> usize {
        self.cursor
    }

    /// Words of the current round in batch order (review words first).
    pub fn round_words(&self) -> Vec<&Word> {
        self.round.iter().map(|item| &item.word).collect()
    }

    /// Begin a fresh run: no review queue, no rounds played, stats zeroed.
    pub fn start(&mut self, lesson: &Lesson, ledger: &ProgressLedger) -> Advance {
        self.cancel();
        self.review.clear();
        self.rounds_played = 0;
        self.lesson_complete_sent = false;
        self.stats = SessionStats::default();
        self.state = SessionState::Loading;
        info!(mode = %self.mode, lesson = %self.lesson_id, "session started");
        self.next_round(lesson, ledger)
    }

    /// Drop any scheduled auto-advance.
    pub fn cancel(&mut self) {
        self.advance_at = None;
    }

    /// Jump to a card (flashcards navigation). Returns the clamped position.
    pub fn skip_to(&mut self, index: usize, lesson: &Lesson) -> Option<usize> {
        if self.mode != PracticeMode::Flashcards || self.round.is_empty() {
            return None;
        }
        if !matches!(
            self.state,
            SessionState::Presenting | SessionState::Answered { .. }
        ) {
            return None;
        }
        self.cancel();
        self.cursor = index.min(self.round.len() - 1);
        self.present(lesson);
        self.state = SessionState::Presenting;
        Some(self.cursor)
    }

    /// Flip the current flashcard.
    pub fn reveal(&mut self) -> bool {
        if self.mode != PracticeMode::Flashcards || self.state != SessionState::Presenting {
            return false;
        }
        self.revealed = true;
        true
    }

    pub fn prompt(&self) -> Option<Prompt> {
        if !matches!(
            self.state,
            SessionState::Presenting | SessionState::Answered { .. }
        ) {
            return None;
        }
        if self.mode == PracticeMode::Matching {
            let tile = |i: &usize, text: fn(&Word) -> &str| {
                let item = &self.round[*i];
                MatchTile {
                    key: item.word.key(),
                    text: text(&item.word).to_string(),
                    solved: item.solved,
                }
            };
            return Some(Prompt::Matching {
                left: self.left_order.iter().map(|i| tile(i, |w| &w.de)).collect(),
                right: self.right_order.iter().map(|i| tile(i, |w| &w.ru)).collect(),
            });
        }

        let word = self.round.get(self.cursor)?.word.clone();
        Some(match self.mode {
            PracticeMode::Flashcards => Prompt::Flashcard {
                word,
                revealed: self.revealed,
                position: self.cursor,
                total: self.round.len(),
            },
            PracticeMode::Quiz => Prompt::Quiz {
                word,
                options: self.options.clone(),
            },
            PracticeMode::Writing => Prompt::Writing { word },
            PracticeMode::SentencePuzzle => Prompt::SentencePuzzle {
                word,
                tiles: self.tiles.clone(),
            },
            PracticeMode::Matching => return None,
        })
    }

    pub fn answer(
        &mut self,
        response: Response,
        ledger: &mut ProgressLedger,
        lives: &mut LivesGate,
        now: DateTime<Utc>,
    ) -> Result<Feedback, SessionError> {
        if self.state != SessionState::Presenting {
            return Err(SessionError::NotPresenting);
        }
        if !response.fits(self.mode) {
            return Err(SessionError::WrongResponse {
                mode: self.mode,
                response: response.kind(),
            });
        }
        if self.policy.life_penalty {
            lives.refresh(now)?;
            if let Some(left) = lives.cooldown_remaining(now) {
                return Err(SessionError::Exhausted {
                    remaining_secs: left.num_seconds(),
                });
            }
        }

        match response {
            Response::Pair { left, right } => self.answer_pair(&left, &right, ledger, lives, now),
            other => self.answer_current(other, ledger, lives, now),
        }
    }

    fn answer_current(
        &mut self,
        response: Response,
        ledger: &mut ProgressLedger,
        lives: &mut LivesGate,
        now: DateTime<Utc>,
    ) -> Result<Feedback, SessionError> {
        let Some(item) = self.round.get(self.cursor) else {
            return Err(SessionError::NotPresenting);
        };
        let word = item.word.clone();

        let (correct, expected) = match response {
            Response::Flashcard { known } => (known, word.ru.clone()),
            Response::Choice(index) => {
                let option = self
                    .options
                    .get(index)
                    .ok_or(SessionError::InvalidChoice(index))?;
                (option.key.as_ref() == Some(&word.key()), word.ru.clone())
            }
            Response::Text(text) => (check_written(&text, &word.de), word.de.clone()),
            Response::Tiles(order) => {
                let sentence = word.example_sentence().unwrap_or_default().to_string();
                (check_sentence(&order, &sentence), sentence)
            }
            Response::Pair { .. } => {
                return Err(SessionError::WrongResponse {
                    mode: self.mode,
                    response: "pair",
                });
            }
        };

        let (newly_learned, life) = self.record(&word, correct, ledger, lives, now)?;
        if let Some(item) = self.round.get_mut(self.cursor) {
            item.solved = correct;
            item.missed |= !correct;
        }
        self.state = SessionState::Answered { correct };
        if correct {
            self.schedule_advance(now);
        }

        Ok(Feedback {
            correct,
            word,
            expected,
            newly_learned,
            life,
        })
    }

    fn answer_pair(
        &mut self,
        left: &WordKey,
        right: &WordKey,
        ledger: &mut ProgressLedger,
        lives: &mut LivesGate,
        now: DateTime<Utc>,
    ) -> Result<Feedback, SessionError> {
        let on_board = |key: &WordKey| {
            self.round
                .iter()
                .position(|item| !item.solved && item.word.matches(key))
        };
        let li = on_board(left).ok_or_else(|| SessionError::NotOnBoard(left.de.clone()))?;
        on_board(right).ok_or_else(|| SessionError::NotOnBoard(right.de.clone()))?;

        let correct = left == right;
        let word = self.round[li].word.clone();
        let already_missed = self.round[li].missed;

        // A word missed this round must still be cleared from the board, but
        // only counts as learned when it is matched cleanly in a later round.
        let (newly_learned, life) = if correct && already_missed {
            self.stats.correct += 1;
            (false, None)
        } else {
            self.record(&word, correct, ledger, lives, now)?
        };

        if correct {
            self.round[li].solved = true;
        } else {
            self.round[li].missed = true;
        }

        if self.round.iter().all(|item| item.solved) {
            let clean = !self.round.iter().any(|item| item.missed);
            self.state = SessionState::Answered { correct: clean };
            self.schedule_advance(now);
        }

        Ok(Feedback {
            correct,
            expected: word.ru.clone(),
            word,
            newly_learned,
            life,
        })
    }

    /// Ledger and lives bookkeeping shared by every mode.
    fn record(
        &mut self,
        word: &Word,
        correct: bool,
        ledger: &mut ProgressLedger,
        lives: &mut LivesGate,
        now: DateTime<Utc>,
    ) -> Result<(bool, Option<LifeOutcome>), SessionError> {
        if correct {
            self.stats.correct += 1;
            let inserted = ledger.mark_learned(self.mode, word)?;
            debug!(mode = %self.mode, de = %word.de, "correct");
            return Ok((inserted, None));
        }
        self.stats.incorrect += 1;
        debug!(mode = %self.mode, de = %word.de, "missed");
        let life = if self.policy.life_penalty {
            Some(lives.lose_life(now)?)
        } else {
            None
        };
        Ok((false, life))
    }

    fn schedule_advance(&mut self, now: DateTime<Utc>) {
        self.advance_at = self.policy.auto_advance.map(|delay| now + delay);
    }

    /// Move past an answered word or a cleared board.
    pub fn advance(&mut self, lesson: &Lesson, ledger: &ProgressLedger) -> Advance {
        if !matches!(self.state, SessionState::Answered { .. }) {
            return Advance::Ignored;
        }
        self.cancel();

        if self.mode != PracticeMode::Matching && self.cursor + 1 < self.round.len() {
            self.cursor += 1;
            self.present(lesson);
            self.state = SessionState::Presenting;
            return Advance::Next;
        }

        self.finish_round();
        self.next_round(lesson, ledger)
    }

    /// Fire the auto-advance once its deadline has passed.
    pub fn tick(
        &mut self,
        now: DateTime<Utc>,
        lesson: &Lesson,
        ledger: &ProgressLedger,
    ) -> Option<Advance> {
        match self.advance_at {
            Some(at) if now >= at => {
                self.advance_at = None;
                Some(self.advance(lesson, ledger))
            }
            _ => None,
        }
    }

    /// Same lesson and mode again with full lives; the ledger is untouched.
    pub fn repeat(
        &mut self,
        lesson: &Lesson,
        ledger: &ProgressLedger,
        lives: &mut LivesGate,
    ) -> Result<Advance, SessionError> {
        lives.reset_lives()?;
        Ok(self.start(lesson, ledger))
    }

    /// Forget this mode's progress for the lesson, then repeat.
    pub fn restart(
        &mut self,
        lesson: &Lesson,
        ledger: &mut ProgressLedger,
        lives: &mut LivesGate,
    ) -> Result<Advance, SessionError> {
        let cleared = ledger.clear_lesson_progress(self.mode, &self.lesson_id)?;
        info!(mode = %self.mode, lesson = %self.lesson_id, cleared, "progress reset");
        self.repeat(lesson, ledger, lives)
    }

    fn finish_round(&mut self) {
        self.rounds_played += 1;
        self.stats.rounds += 1;
        if !self.policy.retry_on_miss {
            return;
        }
        for item in &self.round {
            if item.missed && !self.review.iter().any(|w| w.key() == item.word.key()) {
                self.review.push(item.word.clone());
            }
        }
    }

    fn next_round(&mut self, lesson: &Lesson, ledger: &ProgressLedger) -> Advance {
        let pool = pool::remaining(ledger, lesson, self.mode);
        if pool.is_empty() {
            return self.complete_lesson();
        }
        if self.rounds_played >= self.policy.max_rounds() {
            self.state = SessionState::SessionComplete;
            info!(
                mode = %self.mode,
                lesson = %self.lesson_id,
                remaining = pool.len(),
                "session complete"
            );
            return Advance::SessionComplete;
        }

        let pending: HashSet<WordKey> = pool.iter().map(Word::key).collect();
        let mut review: Vec<Word> = std::mem::take(&mut self.review)
            .into_iter()
            .filter(|w| pending.contains(&w.key()))
            .collect();
        let queued: HashSet<WordKey> = review.iter().map(Word::key).collect();
        let mut fresh: Vec<Word> = pool
            .into_iter()
            .filter(|w| !queued.contains(&w.key()))
            .collect();
        if self.policy.shuffle {
            fresh.shuffle(&mut self.rng);
        }

        let size = self.policy.round_size();
        if review.len() > size {
            self.review = review.split_off(size);
        }
        let batch: Vec<Word> = review
            .into_iter()
            .chain(fresh)
            .take(size)
            .collect();
        debug!(mode = %self.mode, size = batch.len(), "round built");

        self.round = batch
            .into_iter()
            .map(|word| RoundItem {
                word,
                solved: false,
                missed: false,
            })
            .collect();
        self.cursor = 0;
        self.present(lesson);
        self.state = SessionState::Presenting;
        Advance::Next
    }

    fn complete_lesson(&mut self) -> Advance {
        self.round.clear();
        self.state = SessionState::LessonComplete;
        if self.lesson_complete_sent {
            return Advance::Ignored;
        }
        self.lesson_complete_sent = true;
        info!(mode = %self.mode, lesson = %self.lesson_id, "lesson complete");
        Advance::LessonComplete
    }

    /// Prepare per-word presentation state for the current cursor.
    fn present(&mut self, lesson: &Lesson) {
        self.revealed = false;
        self.options.clear();
        self.tiles.clear();

        match self.mode {
            PracticeMode::Matching => {
                self.left_order = (0..self.round.len()).collect();
                self.right_order = (0..self.round.len()).collect();
                self.left_order.shuffle(&mut self.rng);
                self.right_order.shuffle(&mut self.rng);
            }
            PracticeMode::Quiz => {
                if let Some(item) = self.round.get(self.cursor) {
                    let word = item.word.clone();
                    self.options = self.quiz_options(&word, lesson);
                }
            }
            PracticeMode::SentencePuzzle => {
                if let Some(sentence) = self
                    .round
                    .get(self.cursor)
                    .and_then(|item| item.word.example_sentence())
                {
                    let mut shuffled = tiles(sentence);
                    shuffled.shuffle(&mut self.rng);
                    self.tiles = shuffled;
                }
            }
            PracticeMode::Flashcards | PracticeMode::Writing => {}
        }
    }

    /// The right translation plus up to three wrong ones: the card's own
    /// distractors first, then translations of other cards in the lesson.
    fn quiz_options(&mut self, word: &Word, lesson: &Lesson) -> Vec<QuizOption> {
        let mut options = vec![QuizOption {
            text: word.ru.clone(),
            key: Some(word.key()),
        }];
        let mut seen: HashSet<String> = HashSet::from([word.ru.trim().to_string()]);

        for text in word.distractors.iter().flatten() {
            if options.len() > QUIZ_DISTRACTORS {
                break;
            }
            let text = text.trim();
            if !text.is_empty() && seen.insert(text.to_string()) {
                options.push(QuizOption {
                    text: text.to_string(),
                    key: None,
                });
            }
        }

        let mut others: Vec<&Word> = lesson.cards.iter().filter(|c| c.de != word.de).collect();
        others.shuffle(&mut self.rng);
        for other in others {
            if options.len() > QUIZ_DISTRACTORS {
                break;
            }
            if seen.insert(other.ru.trim().to_string()) {
                options.push(QuizOption {
                    text: other.ru.clone(),
                    key: Some(other.key()),
                });
            }
        }

        options.shuffle(&mut self.rng);
        options
    }
}
