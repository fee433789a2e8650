use anyhow::Result;

use crate::store::schema::{THEME_KEY, TTS_LANG_KEY, TTS_VOICE_KEY, index_key};
use crate::store::{SharedStore, load_json, save_json};

/// User preference scalars. Stored verbatim for the front end; only the
/// flashcard index is read back by the core.
pub struct Preferences {
    store: SharedStore,
}

impl Preferences {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    pub fn tts_lang(&self) -> Option<String> {
        load_json(self.store.as_ref(), TTS_LANG_KEY)
    }

    pub fn set_tts_lang(&self, lang: &str) -> Result<()> {
        save_json(self.store.as_ref(), TTS_LANG_KEY, &lang)
    }

    pub fn tts_voice(&self) -> Option<String> {
        load_json(self.store.as_ref(), TTS_VOICE_KEY)
    }

    pub fn set_tts_voice(&self, voice: &str) -> Result<()> {
        save_json(self.store.as_ref(), TTS_VOICE_KEY, &voice)
    }

    pub fn theme(&self) -> Option<String> {
        load_json(self.store.as_ref(), THEME_KEY)
    }

    pub fn set_theme(&self, theme: &str) -> Result<()> {
        save_json(self.store.as_ref(), THEME_KEY, &theme)
    }

    /// Last flashcard position viewed in a lesson.
    pub fn last_index(&self, lesson_id: &str) -> Option<usize> {
        load_json(self.store.as_ref(), &index_key(lesson_id))
    }

    pub fn set_last_index(&self, lesson_id: &str, index: usize) -> Result<()> {
        save_json(self.store.as_ref(), &index_key(lesson_id), &index)
    }

    pub fn clear_last_index(&self, lesson_id: &str) -> Result<()> {
        self.store.remove(&index_key(lesson_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_scalars_round_trip() {
        let store = MemoryStore::shared();
        let prefs = Preferences::new(store.clone());
        assert_eq!(prefs.theme(), None);

        prefs.set_theme("dark").unwrap();
        prefs.set_tts_lang("de-DE").unwrap();
        prefs.set_tts_voice("Anna").unwrap();

        assert_eq!(prefs.theme().as_deref(), Some("dark"));
        assert_eq!(prefs.tts_lang().as_deref(), Some("de-DE"));
        assert_eq!(prefs.tts_voice().as_deref(), Some("Anna"));
        assert!(store.contains("selectedTtsVoiceName"));
    }

    #[test]
    fn test_last_index_per_lesson() {
        let store = MemoryStore::shared();
        let prefs = Preferences::new(store.clone());
        prefs.set_last_index("les1", 4).unwrap();
        prefs.set_last_index("les2", 1).unwrap();
        assert_eq!(prefs.last_index("les1"), Some(4));
        assert!(store.contains("index_les1"));

        prefs.clear_last_index("les1").unwrap();
        assert_eq!(prefs.last_index("les1"), None);
        assert_eq!(prefs.last_index("les2"), Some(1));
    }
}
