use crate::engine::ledger::ProgressLedger;
use crate::model::{Lesson, PracticeMode, Word};

/// Whether a card can be practised in `mode` at all. Sentence puzzles need an
/// example sentence to cut into tiles.
pub fn is_eligible(word: &Word, mode: PracticeMode) -> bool {
    match mode {
        PracticeMode::SentencePuzzle => word.example_sentence().is_some(),
        _ => true,
    }
}

pub fn eligible_count(lesson: &Lesson, mode: PracticeMode) -> usize {
    lesson.cards.iter().filter(|w| is_eligible(w, mode)).count()
}

/// Cards of `lesson` not yet learned in `mode`, in lesson order.
pub fn remaining(ledger: &ProgressLedger, lesson: &Lesson, mode: PracticeMode) -> Vec<Word> {
    let learned = ledger.learned_keys(mode);
    lesson
        .cards
        .iter()
        .filter(|w| is_eligible(w, mode) && !learned.contains(&w.key()))
        .cloned()
        .collect()
}
