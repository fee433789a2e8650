use std::collections::{BTreeMap, HashSet};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::model::{PracticeMode, Word, WordKey};
use crate::store::{SharedStore, load_json};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger request is missing required field `{0}`")]
    MissingField(&'static str),
    #[error("malformed ledger request: {0}")]
    Malformed(String),
    #[error("failed to persist learned words: {0}")]
    Persist(#[from] anyhow::Error),
}

/// Explicit request shapes accepted at the ledger boundary.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerRequest {
    Mark {
        mode: PracticeMode,
        word: Word,
    },
    Remove {
        mode: PracticeMode,
        #[serde(default)]
        de: String,
        #[serde(rename = "lessonId", default)]
        lesson_id: String,
    },
    Clear {
        mode: PracticeMode,
        #[serde(rename = "lessonId", default)]
        lesson_id: String,
    },
    MarkMaster {
        word: Word,
    },
    ResetAll,
}

impl LedgerRequest {
    pub fn from_json(json: &str) -> Result<Self, LedgerError> {
        serde_json::from_str(json).map_err(|e| {
            warn!(error = %e, "rejected malformed ledger payload");
            LedgerError::Malformed(e.to_string())
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LedgerOutcome {
    Marked { inserted: bool },
    Removed { removed: bool },
    Cleared { removed: usize },
    MarkedMaster { inserted: usize },
    Reset,
}

/// Per-mode sets of learned words, written through to the store on every
/// mutation. Modes are independent: learning a word in one mode says nothing
/// about the others.
///
/// Mutations build the new sets first and adopt them only after the store
/// accepted them, so memory never runs ahead of disk.
pub struct ProgressLedger {
    store: SharedStore,
    sets: BTreeMap<PracticeMode, Vec<Word>>,
}

impl ProgressLedger {
    pub fn load(store: SharedStore) -> Self {
        let mut sets = BTreeMap::new();
        for &mode in PracticeMode::all() {
            let stored: Vec<Word> = load_json(store.as_ref(), mode.storage_key()).unwrap_or_default();
            sets.insert(mode, sanitize(mode, stored));
        }
        Self { store, sets }
    }

    pub fn learned(&self, mode: PracticeMode) -> &[Word] {
        self.sets.get(&mode).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn learned_keys(&self, mode: PracticeMode) -> HashSet<WordKey> {
        self.learned(mode).iter().map(Word::key).collect()
    }

    pub fn is_learned(&self, mode: PracticeMode, key: &WordKey) -> bool {
        self.learned(mode).iter().any(|w| w.matches(key))
    }

    pub fn learned_count(&self, mode: PracticeMode, lesson_id: &str) -> usize {
        self.learned(mode)
            .iter()
            .filter(|w| w.lesson_id == lesson_id)
            .count()
    }

    /// Insert `word` unless an entry with the same identity exists.
    /// Returns whether anything was inserted.
    pub fn mark_learned(&mut self, mode: PracticeMode, word: &Word) -> Result<bool, LedgerError> {
        validate_key(&word.de, &word.lesson_id)?;
        let Some(next) = self.with_word(mode, word) else {
            return Ok(false);
        };
        self.commit(vec![(mode, next)])?;
        debug!(%mode, de = %word.de, lesson = %word.lesson_id, "marked learned");
        Ok(true)
    }

    pub fn remove_learned(
        &mut self,
        mode: PracticeMode,
        de: &str,
        lesson_id: &str,
    ) -> Result<bool, LedgerError> {
        validate_key(de, lesson_id)?;
        let key = WordKey::new(de, lesson_id);
        let next = self.without(mode, |w| w.matches(&key));
        let removed = next.len() != self.learned(mode).len();
        if removed {
            self.commit(vec![(mode, next)])?;
            debug!(%mode, de, lesson = lesson_id, "unmarked learned");
        }
        Ok(removed)
    }

    /// Drop every entry of one lesson from one mode. Other modes and other
    /// lessons are untouched.
    pub fn clear_lesson_progress(
        &mut self,
        mode: PracticeMode,
        lesson_id: &str,
    ) -> Result<usize, LedgerError> {
        if lesson_id.trim().is_empty() {
            warn!(%mode, "rejected clear request without lessonId");
            return Err(LedgerError::MissingField("lessonId"));
        }
        let next = self.without(mode, |w| w.lesson_id == lesson_id);
        let removed = self.learned(mode).len() - next.len();
        if removed > 0 {
            self.commit(vec![(mode, next)])?;
        }
        info!(%mode, lesson = lesson_id, removed, "cleared lesson progress");
        Ok(removed)
    }

    /// Clear a lesson from every mode, used when the lesson itself goes away.
    pub fn clear_lesson(&mut self, lesson_id: &str) -> Result<usize, LedgerError> {
        if lesson_id.trim().is_empty() {
            return Err(LedgerError::MissingField("lessonId"));
        }
        let mut removed = 0;
        let mut updates = Vec::new();
        for &mode in PracticeMode::all() {
            let next = self.without(mode, |w| w.lesson_id == lesson_id);
            let dropped = self.learned(mode).len() - next.len();
            if dropped > 0 {
                removed += dropped;
                updates.push((mode, next));
            }
        }
        self.commit(updates)?;
        info!(lesson = lesson_id, removed, "cleared lesson from every mode");
        Ok(removed)
    }

    /// Mark `word` learned in all five modes, each checked independently.
    /// Returns the number of modes that gained the word.
    pub fn mark_master_learned(&mut self, word: &Word) -> Result<usize, LedgerError> {
        validate_key(&word.de, &word.lesson_id)?;
        let updates: Vec<(PracticeMode, Vec<Word>)> = PracticeMode::all()
            .iter()
            .filter_map(|&mode| self.with_word(mode, word).map(|next| (mode, next)))
            .collect();
        let inserted = updates.len();
        self.commit(updates)?;
        debug!(de = %word.de, lesson = %word.lesson_id, inserted, "marked learned in all modes");
        Ok(inserted)
    }

    pub fn reset_all(&mut self) -> Result<(), LedgerError> {
        for &mode in PracticeMode::all() {
            self.store.remove(mode.storage_key())?;
            self.sets.insert(mode, Vec::new());
        }
        info!("reset all learned words");
        Ok(())
    }

    pub fn apply(&mut self, request: LedgerRequest) -> Result<LedgerOutcome, LedgerError> {
        match request {
            LedgerRequest::Mark { mode, word } => {
                let inserted = self.mark_learned(mode, &word)?;
                Ok(LedgerOutcome::Marked { inserted })
            }
            LedgerRequest::Remove {
                mode,
                de,
                lesson_id,
            } => {
                let removed = self.remove_learned(mode, &de, &lesson_id)?;
                Ok(LedgerOutcome::Removed { removed })
            }
            LedgerRequest::Clear { mode, lesson_id } => {
                let removed = self.clear_lesson_progress(mode, &lesson_id)?;
                Ok(LedgerOutcome::Cleared { removed })
            }
            LedgerRequest::MarkMaster { word } => {
                let inserted = self.mark_master_learned(&word)?;
                Ok(LedgerOutcome::MarkedMaster { inserted })
            }
            LedgerRequest::ResetAll => {
                self.reset_all()?;
                Ok(LedgerOutcome::Reset)
            }
        }
    }

    /// The set for `mode` with `word` appended, or `None` if already present.
    fn with_word(&self, mode: PracticeMode, word: &Word) -> Option<Vec<Word>> {
        let key = word.key();
        let current = self.learned(mode);
        if current.iter().any(|w| w.matches(&key)) {
            return None;
        }
        let mut next = current.to_vec();
        next.push(word.clone());
        Some(next)
    }

    fn without(&self, mode: PracticeMode, remove: impl Fn(&Word) -> bool) -> Vec<Word> {
        self.learned(mode)
            .iter()
            .filter(|w| !remove(*w))
            .cloned()
            .collect()
    }

    fn commit(&mut self, updates: Vec<(PracticeMode, Vec<Word>)>) -> Result<(), LedgerError> {
        if updates.is_empty() {
            return Ok(());
        }
        let mut entries = Vec::with_capacity(updates.len());
        for (mode, words) in &updates {
            let json = serde_json::to_string(words).map_err(anyhow::Error::from)?;
            entries.push((mode.storage_key(), json));
        }
        self.store.set_many(&entries)?;
        self.sets.extend(updates);
        Ok(())
    }
}

fn validate_key(de: &str, lesson_id: &str) -> Result<(), LedgerError> {
    if de.trim().is_empty() {
        warn!(lesson = lesson_id, "rejected ledger request without de");
        return Err(LedgerError::MissingField("de"));
    }
    if lesson_id.trim().is_empty() {
        warn!(de, "rejected ledger request without lessonId");
        return Err(LedgerError::MissingField("lessonId"));
    }
    Ok(())
}

/// Drop entries without an identity and collapse duplicates left by older
/// versions that did not check before inserting.
fn sanitize(mode: PracticeMode, stored: Vec<Word>) -> Vec<Word> {
    let total = stored.len();
    let mut seen = HashSet::new();
    let words: Vec<Word> = stored
        .into_iter()
        .filter(|w| !w.de.trim().is_empty() && !w.lesson_id.trim().is_empty())
        .filter(|w| seen.insert(w.key()))
        .collect();
    if words.len() != total {
        warn!(%mode, dropped = total - words.len(), "dropped invalid or duplicate learned entries");
    }
    words
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::store::{KeyValueStore, MemoryStore};

    /// Memory store whose writes can be switched off.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        failing: Cell<bool>,
    }

    impl KeyValueStore for FlakyStore {
        fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
            if self.failing.get() {
                anyhow::bail!("disk full");
            }
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> anyhow::Result<()> {
            self.inner.remove(key)
        }

        fn set_many(&self, entries: &[(&str, String)]) -> anyhow::Result<()> {
            if self.failing.get() {
                anyhow::bail!("disk full");
            }
            for (key, value) in entries {
                self.inner.set(key, value)?;
            }
            Ok(())
        }
    }

    fn make_ledger() -> (Rc<MemoryStore>, ProgressLedger) {
        let store = MemoryStore::shared();
        let ledger = ProgressLedger::load(store.clone());
        (store, ledger)
    }

    fn word(de: &str, lesson: &str) -> Word {
        Word::new(de, "перевод", lesson)
    }

    #[test]
    fn test_mark_learned_is_idempotent() {
        let (_store, mut ledger) = make_ledger();
        let w = word("Haus", "les1");
        assert!(ledger.mark_learned(PracticeMode::Quiz, &w).unwrap());
        let once = ledger.learned(PracticeMode::Quiz).to_vec();
        assert!(!ledger.mark_learned(PracticeMode::Quiz, &w).unwrap());
        assert_eq!(ledger.learned(PracticeMode::Quiz), once.as_slice());
    }

    #[test]
    fn test_mark_then_remove_restores_set() {
        let (_store, mut ledger) = make_ledger();
        ledger
            .mark_learned(PracticeMode::Writing, &word("Baum", "les1"))
            .unwrap();
        let before = ledger.learned(PracticeMode::Writing).to_vec();

        let w = word("Haus", "les1");
        ledger.mark_learned(PracticeMode::Writing, &w).unwrap();
        assert!(
            ledger
                .remove_learned(PracticeMode::Writing, &w.de, &w.lesson_id)
                .unwrap()
        );
        assert_eq!(ledger.learned(PracticeMode::Writing), before.as_slice());
    }

    #[test]
    fn test_remove_missing_is_noop() {
        let (_store, mut ledger) = make_ledger();
        assert!(
            !ledger
                .remove_learned(PracticeMode::Quiz, "Haus", "les1")
                .unwrap()
        );
    }

    #[test]
    fn test_same_de_in_two_lessons_is_distinct() {
        let (_store, mut ledger) = make_ledger();
        ledger
            .mark_learned(PracticeMode::Quiz, &word("Haus", "les1"))
            .unwrap();
        ledger
            .mark_learned(PracticeMode::Quiz, &word("Haus", "les2"))
            .unwrap();
        assert_eq!(ledger.learned(PracticeMode::Quiz).len(), 2);
    }

    #[test]
    fn test_modes_are_independent() {
        let (_store, mut ledger) = make_ledger();
        let w = word("Haus", "les1");
        ledger.mark_learned(PracticeMode::Quiz, &w).unwrap();
        assert!(ledger.is_learned(PracticeMode::Quiz, &w.key()));
        assert!(!ledger.is_learned(PracticeMode::Writing, &w.key()));
    }

    #[test]
    fn test_clear_lesson_progress_is_scoped() {
        let (_store, mut ledger) = make_ledger();
        ledger
            .mark_learned(PracticeMode::Quiz, &word("Haus", "les1"))
            .unwrap();
        ledger
            .mark_learned(PracticeMode::Quiz, &word("Baum", "les1"))
            .unwrap();
        ledger
            .mark_learned(PracticeMode::Quiz, &word("Haus", "les2"))
            .unwrap();
        ledger
            .mark_learned(PracticeMode::Matching, &word("Haus", "les1"))
            .unwrap();

        let removed = ledger
            .clear_lesson_progress(PracticeMode::Quiz, "les1")
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(ledger.learned_count(PracticeMode::Quiz, "les1"), 0);
        assert_eq!(ledger.learned_count(PracticeMode::Quiz, "les2"), 1);
        assert_eq!(ledger.learned_count(PracticeMode::Matching, "les1"), 1);
    }

    #[test]
    fn test_mark_master_learned_covers_all_modes() {
        let (_store, mut ledger) = make_ledger();
        let w = word("Haus", "les1");
        ledger.mark_learned(PracticeMode::Quiz, &w).unwrap();
        let inserted = ledger.mark_master_learned(&w).unwrap();
        assert_eq!(inserted, 4);
        for &mode in PracticeMode::all() {
            assert!(ledger.is_learned(mode, &w.key()));
            assert_eq!(ledger.learned(mode).len(), 1);
        }
    }

    #[test]
    fn test_writes_through_to_store() {
        let (store, mut ledger) = make_ledger();
        ledger
            .mark_learned(PracticeMode::SentencePuzzle, &word("Haus", "les1"))
            .unwrap();
        let raw = store.get("learnedSentencePuzzle").unwrap().unwrap();
        assert!(raw.contains("\"lessonId\":\"les1\""));

        let reloaded = ProgressLedger::load(store.clone());
        assert_eq!(reloaded.learned(PracticeMode::SentencePuzzle).len(), 1);
    }

    #[test]
    fn test_reset_all_erases_persisted_copies() {
        let (store, mut ledger) = make_ledger();
        ledger.mark_master_learned(&word("Haus", "les1")).unwrap();
        ledger.reset_all().unwrap();
        for &mode in PracticeMode::all() {
            assert!(ledger.learned(mode).is_empty());
            assert!(!store.contains(mode.storage_key()));
        }
    }

    #[test]
    fn test_missing_fields_rejected_without_change() {
        let (store, mut ledger) = make_ledger();
        let err = ledger
            .mark_learned(PracticeMode::Quiz, &word("", "les1"))
            .unwrap_err();
        assert!(matches!(err, LedgerError::MissingField("de")));
        let err = ledger
            .mark_learned(PracticeMode::Quiz, &word("Haus", ""))
            .unwrap_err();
        assert!(matches!(err, LedgerError::MissingField("lessonId")));
        assert!(ledger.learned(PracticeMode::Quiz).is_empty());
        assert!(!store.contains("learnedQuiz"));
    }

    #[test]
    fn test_request_payload_validation() {
        let (_store, mut ledger) = make_ledger();

        let err = LedgerRequest::from_json(r#"{"type":"mark","word":{"de":"Haus","lessonId":"l"}}"#)
            .unwrap_err();
        assert!(err.to_string().contains("mode"));

        let err = LedgerRequest::from_json(r#"{"type":"mark","mode":"dictation","word":{}}"#)
            .unwrap_err();
        assert!(matches!(err, LedgerError::Malformed(_)));

        let request =
            LedgerRequest::from_json(r#"{"type":"remove","mode":"quiz","lessonId":"les1"}"#)
                .unwrap();
        assert!(matches!(
            ledger.apply(request),
            Err(LedgerError::MissingField("de"))
        ));

        let request = LedgerRequest::from_json(
            r#"{"type":"mark","mode":"sentence_puzzle","word":{"de":"Haus","ru":"дом","lessonId":"les1"}}"#,
        )
        .unwrap();
        assert_eq!(
            ledger.apply(request).unwrap(),
            LedgerOutcome::Marked { inserted: true }
        );
    }

    #[test]
    fn test_failed_write_leaves_sets_unchanged() {
        let store = Rc::new(FlakyStore::default());
        let mut ledger = ProgressLedger::load(store.clone());
        let kept = word("Baum", "les1");
        ledger.mark_learned(PracticeMode::Quiz, &kept).unwrap();
        let before = ledger.learned(PracticeMode::Quiz).to_vec();

        store.failing.set(true);
        let w = word("Haus", "les1");
        let err = ledger.mark_learned(PracticeMode::Quiz, &w).unwrap_err();
        assert!(matches!(err, LedgerError::Persist(_)));
        assert_eq!(ledger.learned(PracticeMode::Quiz), before.as_slice());

        assert!(ledger.mark_master_learned(&w).is_err());
        for &mode in PracticeMode::all() {
            assert!(!ledger.is_learned(mode, &w.key()));
        }

        assert!(ledger.clear_lesson("les1").is_err());
        assert!(ledger.is_learned(PracticeMode::Quiz, &kept.key()));

        store.failing.set(false);
        let reloaded = ProgressLedger::load(store.clone());
        assert_eq!(reloaded.learned(PracticeMode::Quiz), before.as_slice());
    }

    #[test]
    fn test_mark_master_learned_persists_every_mode() {
        let (store, mut ledger) = make_ledger();
        ledger.mark_master_learned(&word("Haus", "les1")).unwrap();
        let keys = store.keys();
        for &mode in PracticeMode::all() {
            assert!(keys.contains(&mode.storage_key().to_string()));
        }
        let reloaded = ProgressLedger::load(store.clone());
        for &mode in PracticeMode::all() {
            assert_eq!(reloaded.learned(mode).len(), 1);
        }
    }

    #[test]
    fn test_load_drops_invalid_and_duplicate_entries() {
        let store = MemoryStore::shared();
        store
            .set(
                "learnedQuiz",
                r#"[{"de":"Haus","lessonId":"les1"},{"de":"Haus","lessonId":"les1"},{"de":"Baum"}]"#,
            )
            .unwrap();
        let ledger = ProgressLedger::load(store.clone());
        assert_eq!(ledger.learned(PracticeMode::Quiz).len(), 1);
    }
}
