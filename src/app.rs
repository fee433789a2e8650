use std::rc::Rc;

use anyhow::{Result, bail};
use chrono::{DateTime, Duration, Utc};
use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};
use tracing::{info, warn};

use crate::config::Config;
use crate::engine::ledger::{LedgerOutcome, LedgerRequest, ProgressLedger};
use crate::engine::lives::LivesGate;
use crate::engine::repository::{LessonRepository, RepositoryError};
use crate::model::{Lesson, PracticeMode, Word};
use crate::session::controller::{Advance, Feedback, Prompt, Response, SessionController};
use crate::session::policy::SessionPolicy;
use crate::session::pool;
use crate::store::SharedStore;
use crate::store::json_store::JsonStore;
use crate::store::preferences::Preferences;

/// Learned/eligible counts for one mode of a lesson.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModeProgress {
    pub mode: PracticeMode,
    pub learned: usize,
    pub eligible: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LessonProgress {
    pub lesson_id: String,
    pub total: usize,
    pub modes: Vec<ModeProgress>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LivesStatus {
    pub count: u32,
    pub max_lives: u32,
    pub is_unlimited: bool,
    pub cooldown_remaining: Option<Duration>,
}

/// Owns every piece of state for one user and at most one running session.
pub struct App {
    pub config: Config,
    pub repository: LessonRepository,
    pub ledger: ProgressLedger,
    pub lives: LivesGate,
    pub preferences: Preferences,
    session: Option<SessionController>,
    rng: SmallRng,
}

impl App {
    /// Open the on-disk store named by the config.
    pub fn open(config: Config) -> Result<Self> {
        let store = JsonStore::with_base_dir(config.data_path())?;
        store.check_interrupted_commit();
        Self::with_store(config, Rc::new(store), SmallRng::from_entropy())
    }

    pub fn with_store(config: Config, store: SharedStore, rng: SmallRng) -> Result<Self> {
        let repository = LessonRepository::load_all(store.clone())?;
        let ledger = ProgressLedger::load(store.clone());
        let lives = LivesGate::load(store.clone(), config.max_lives, config.cooldown());
        let preferences = Preferences::new(store);
        Ok(Self {
            config,
            repository,
            ledger,
            lives,
            preferences,
            session: None,
            rng,
        })
    }

    // --- Sessions ---

    pub fn session(&self) -> Option<&SessionController> {
        self.session.as_ref()
    }

    pub fn prompt(&self) -> Option<Prompt> {
        self.session.as_ref().and_then(SessionController::prompt)
    }

    /// Start `mode` on a lesson, replacing any running session. Flashcards
    /// resume at the last viewed card.
    pub fn start_session(&mut self, mode: PracticeMode, lesson_id: &str) -> Result<Advance> {
        self.start_session_at(mode, lesson_id, Utc::now())
    }

    pub fn start_session_at(
        &mut self,
        mode: PracticeMode,
        lesson_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Advance> {
        self.end_session();
        let lesson = self
            .repository
            .lesson(lesson_id)
            .ok_or_else(|| RepositoryError::LessonNotFound(lesson_id.to_string()))?;
        self.lives.refresh(now)?;

        let policy = SessionPolicy::for_mode(mode, &self.config);
        let rng = SmallRng::seed_from_u64(self.rng.next_u64());
        let mut session = SessionController::new(mode, lesson_id, policy, rng);
        let step = session.start(lesson, &self.ledger);

        if mode == PracticeMode::Flashcards
            && let Some(index) = self.preferences.last_index(lesson_id)
        {
            session.skip_to(index, lesson);
        }
        self.session = Some(session);
        Ok(step)
    }

    /// Stop the running session, remembering the flashcard position.
    pub fn end_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.cancel();
            self.remember_position(&session);
        }
    }

    pub fn answer(&mut self, response: Response) -> Result<Feedback> {
        self.answer_at(response, Utc::now())
    }

    pub fn answer_at(&mut self, response: Response, now: DateTime<Utc>) -> Result<Feedback> {
        let Some(session) = self.session.as_mut() else {
            bail!("no practice session is running");
        };
        Ok(session.answer(response, &mut self.ledger, &mut self.lives, now)?)
    }

    pub fn reveal(&mut self) -> bool {
        self.session.as_mut().is_some_and(SessionController::reveal)
    }

    pub fn advance(&mut self) -> Result<Advance> {
        let (session, lesson) = active(&mut self.session, &self.repository)?;
        let step = session.advance(lesson, &self.ledger);
        self.after_step();
        Ok(step)
    }

    /// Fire a due auto-advance.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Result<Option<Advance>> {
        let (session, lesson) = active(&mut self.session, &self.repository)?;
        let step = session.tick(now, lesson, &self.ledger);
        if step.is_some() {
            self.after_step();
        }
        Ok(step)
    }

    /// Flashcards navigation.
    pub fn skip_to(&mut self, index: usize) -> Result<Option<usize>> {
        let (session, lesson) = active(&mut self.session, &self.repository)?;
        let position = session.skip_to(index, lesson);
        self.after_step();
        Ok(position)
    }

    pub fn repeat(&mut self) -> Result<Advance> {
        let (session, lesson) = active(&mut self.session, &self.repository)?;
        Ok(session.repeat(lesson, &self.ledger, &mut self.lives)?)
    }

    pub fn restart(&mut self) -> Result<Advance> {
        let (session, lesson) = active(&mut self.session, &self.repository)?;
        let step = session.restart(lesson, &mut self.ledger, &mut self.lives)?;
        let lesson_id = session.lesson_id().to_string();
        self.preferences.clear_last_index(&lesson_id)?;
        Ok(step)
    }

    fn after_step(&self) {
        if let Some(session) = &self.session {
            self.remember_position(session);
        }
    }

    fn remember_position(&self, session: &SessionController) {
        if session.mode() != PracticeMode::Flashcards {
            return;
        }
        if let Err(e) = self
            .preferences
            .set_last_index(session.lesson_id(), session.position())
        {
            warn!(error = %e, "could not save flashcard position");
        }
    }

    // --- Catalog ---

    /// Delete a lesson along with its progress and saved position.
    pub fn delete_lesson(&mut self, lesson_id: &str) -> Result<Lesson> {
        let lesson = self.repository.delete_lesson(lesson_id)?;
        self.forget_lesson(lesson_id)?;
        Ok(lesson)
    }

    /// Delete a folder and everything in it. Returns the removed lesson ids.
    pub fn delete_folder(&mut self, folder_id: &str) -> Result<Vec<String>> {
        let removed = self.repository.delete_folder(folder_id)?;
        for lesson_id in &removed {
            self.forget_lesson(lesson_id)?;
        }
        Ok(removed)
    }

    fn forget_lesson(&mut self, lesson_id: &str) -> Result<()> {
        if self
            .session
            .as_ref()
            .is_some_and(|s| s.lesson_id() == lesson_id)
        {
            self.session = None;
        }
        let cleared = self.ledger.clear_lesson(lesson_id)?;
        self.preferences.clear_last_index(lesson_id)?;
        info!(lesson = lesson_id, cleared, "forgot lesson progress");
        Ok(())
    }

    // --- Progress ---

    pub fn remaining(&self, mode: PracticeMode, lesson_id: &str) -> Result<Vec<Word>> {
        let lesson = self
            .repository
            .lesson(lesson_id)
            .ok_or_else(|| RepositoryError::LessonNotFound(lesson_id.to_string()))?;
        Ok(pool::remaining(&self.ledger, lesson, mode))
    }

    pub fn progress(&self, lesson_id: &str) -> Result<LessonProgress> {
        let lesson = self
            .repository
            .lesson(lesson_id)
            .ok_or_else(|| RepositoryError::LessonNotFound(lesson_id.to_string()))?;
        let modes = PracticeMode::all()
            .iter()
            .map(|&mode| ModeProgress {
                mode,
                learned: self.ledger.learned_count(mode, lesson_id),
                eligible: pool::eligible_count(lesson, mode),
            })
            .collect();
        Ok(LessonProgress {
            lesson_id: lesson.id.clone(),
            total: lesson.cards.len(),
            modes,
        })
    }

    pub fn reset_progress(&mut self, mode: PracticeMode, lesson_id: &str) -> Result<usize> {
        Ok(self.ledger.clear_lesson_progress(mode, lesson_id)?)
    }

    pub fn reset_all_progress(&mut self) -> Result<()> {
        self.end_session();
        self.ledger.reset_all()?;
        Ok(())
    }

    /// Apply a JSON ledger request.
    pub fn apply_ledger(&mut self, json: &str) -> Result<LedgerOutcome> {
        let request = LedgerRequest::from_json(json)?;
        Ok(self.ledger.apply(request)?)
    }

    // --- Lives ---

    pub fn lives_status(&mut self, now: DateTime<Utc>) -> Result<LivesStatus> {
        self.lives.refresh(now)?;
        Ok(LivesStatus {
            count: self.lives.count(),
            max_lives: self.lives.max_lives(),
            is_unlimited: self.lives.is_unlimited(),
            cooldown_remaining: self.lives.cooldown_remaining(now),
        })
    }

    pub fn restore_lives(&mut self) -> Result<()> {
        self.lives.restore_lives()
    }

    pub fn deactivate_unlimited(&mut self) -> Result<()> {
        self.lives.deactivate_unlimited()
    }
}

/// The running session together with its lesson.
fn active<'a>(
    session: &'a mut Option<SessionController>,
    repository: &'a LessonRepository,
) -> Result<(&'a mut SessionController, &'a Lesson)> {
    let Some(session) = session.as_mut() else {
        bail!("no practice session is running");
    };
    let lesson = repository
        .lesson(session.lesson_id())
        .ok_or_else(|| RepositoryError::LessonNotFound(session.lesson_id().to_string()))?;
    Ok((session, lesson))
}
