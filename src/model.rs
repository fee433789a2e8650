use std::fmt;

use serde::{Deserialize, Serialize};

// --- Practice Mode ---

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PracticeMode {
    Flashcards,
    Matching,
    Quiz,
    Writing,
    SentencePuzzle,
}

impl PracticeMode {
    pub fn as_str(self) -> &'static str {
        match self {
            PracticeMode::Flashcards => "flashcards",
            PracticeMode::Matching => "matching",
            PracticeMode::Quiz => "quiz",
            PracticeMode::Writing => "writing",
            PracticeMode::SentencePuzzle => "sentence_puzzle",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "flashcards" => Some(PracticeMode::Flashcards),
            "matching" => Some(PracticeMode::Matching),
            "quiz" => Some(PracticeMode::Quiz),
            "writing" => Some(PracticeMode::Writing),
            "sentence_puzzle" => Some(PracticeMode::SentencePuzzle),
            _ => None,
        }
    }

    /// Key of the persisted learned list for this mode.
    pub fn storage_key(self) -> &'static str {
        match self {
            PracticeMode::Flashcards => "learnedFlashcards",
            PracticeMode::Matching => "learnedMatching",
            PracticeMode::Quiz => "learnedQuiz",
            PracticeMode::Writing => "learnedWriting",
            PracticeMode::SentencePuzzle => "learnedSentencePuzzle",
        }
    }

    pub fn all() -> &'static [PracticeMode] {
        &[
            PracticeMode::Flashcards,
            PracticeMode::Matching,
            PracticeMode::Quiz,
            PracticeMode::Writing,
            PracticeMode::SentencePuzzle,
        ]
    }
}

impl fmt::Display for PracticeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Words ---

/// Identity of a word: the same `de` may appear in several lessons.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WordKey {
    pub de: String,
    pub lesson_id: String,
}

impl WordKey {
    pub fn new(de: &str, lesson_id: &str) -> Self {
        Self {
            de: de.to_string(),
            lesson_id: lesson_id.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Word {
    #[serde(default)]
    pub de: String,
    #[serde(default)]
    pub ru: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exde: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exru: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distractors: Option<Vec<String>>,
    #[serde(rename = "lessonId", default)]
    pub lesson_id: String,
}

impl Word {
    pub fn new(de: &str, ru: &str, lesson_id: &str) -> Self {
        Self {
            de: de.to_string(),
            ru: ru.to_string(),
            exde: None,
            exru: None,
            distractors: None,
            lesson_id: lesson_id.to_string(),
        }
    }

    pub fn with_example(mut self, exde: &str, exru: &str) -> Self {
        self.exde = Some(exde.to_string());
        self.exru = Some(exru.to_string());
        self
    }

    pub fn key(&self) -> WordKey {
        WordKey::new(&self.de, &self.lesson_id)
    }

    pub fn matches(&self, key: &WordKey) -> bool {
        self.de == key.de && self.lesson_id == key.lesson_id
    }

    /// Example sentence usable as a sentence puzzle, if any.
    pub fn example_sentence(&self) -> Option<&str> {
        self.exde
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

// --- Lessons & Folders ---

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Lesson {
    pub id: String,
    pub lang: String,
    pub folder_id: String,
    pub cards: Vec<Word>,
}

impl Lesson {
    /// Builds a lesson and stamps every card with its id.
    pub fn new(id: &str, lang: &str, folder_id: &str, cards: Vec<Word>) -> Self {
        let cards = cards
            .into_iter()
            .map(|mut w| {
                w.lesson_id = id.to_string();
                w
            })
            .collect();
        Self {
            id: id.to_string(),
            lang: lang.to_string(),
            folder_id: folder_id.to_string(),
            cards,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub id: String,
    pub name: String,
    #[serde(rename = "defaultLang")]
    pub default_lang: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_keys_round_trip() {
        for &mode in PracticeMode::all() {
            assert_eq!(PracticeMode::from_key(mode.as_str()), Some(mode));
        }
        assert_eq!(PracticeMode::from_key("dictation"), None);
    }

    #[test]
    fn test_storage_keys_are_distinct() {
        let mut keys: Vec<&str> = PracticeMode::all().iter().map(|m| m.storage_key()).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), 5);
    }

    #[test]
    fn test_lesson_new_stamps_lesson_id() {
        let lesson = Lesson::new(
            "les1",
            "de",
            "f1",
            vec![Word::new("Haus", "дом", ""), Word::new("Baum", "дерево", "other")],
        );
        assert!(lesson.cards.iter().all(|w| w.lesson_id == "les1"));
    }

    #[test]
    fn test_word_serde_uses_camel_case_lesson_id() {
        let word = Word::new("Haus", "дом", "les1");
        let json = serde_json::to_value(&word).unwrap();
        assert_eq!(json["lessonId"], "les1");
        assert!(json.get("exde").is_none());

        let parsed: Word = serde_json::from_str(r#"{"de":"Baum","ru":"дерево"}"#).unwrap();
        assert_eq!(parsed.lesson_id, "");
    }

    #[test]
    fn test_example_sentence_ignores_blank() {
        let word = Word::new("Haus", "дом", "les1").with_example("   ", "");
        assert_eq!(word.example_sentence(), None);
        let word = Word::new("Haus", "дом", "les1").with_example(" Das Haus ist alt. ", "");
        assert_eq!(word.example_sentence(), Some("Das Haus ist alt."));
    }
}
