use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Folder, Word};

// --- Storage keys ---

pub const USER_LESSONS_KEY: &str = "userLessons";
pub const FOLDERS_KEY: &str = "wordmasterFolders";
pub const LIVES_KEY: &str = "lives";
pub const GAME_OVER_KEY: &str = "gameOver";
pub const TTS_LANG_KEY: &str = "selectedTtsLang";
pub const TTS_VOICE_KEY: &str = "selectedTtsVoiceName";
pub const THEME_KEY: &str = "theme";

pub fn index_key(lesson_id: &str) -> String {
    format!("index_{lesson_id}")
}

// --- Catalog ---

/// Lesson as persisted under `userLessons`. Legacy entries have no folder.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LessonRecord {
    #[serde(default)]
    pub lang: String,
    #[serde(rename = "folderId", default, skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,
    #[serde(default)]
    pub cards: Vec<Word>,
}

pub type LessonMap = BTreeMap<String, LessonRecord>;
pub type FolderMap = BTreeMap<String, Folder>;

// --- Lives ---

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LivesRecord {
    pub count: u32,
    #[serde(rename = "maxLives")]
    pub max_lives: u32,
    #[serde(rename = "isUnlimited", default)]
    pub is_unlimited: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameOverRecord {
    /// Epoch milliseconds at which lives ran out.
    pub timestamp: Option<i64>,
}

// --- Import / export ---

pub const APP_NAME: &str = "wordmaster";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExportMeta {
    pub app: String,
    pub version: String,
    #[serde(rename = "exportedAt")]
    pub exported_at: DateTime<Utc>,
}

impl ExportMeta {
    pub fn now() -> Self {
        Self {
            app: APP_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            exported_at: Utc::now(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LessonExport {
    #[serde(rename = "lessonId")]
    pub lesson_id: String,
    pub lang: String,
    pub cards: Vec<Word>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<ExportMeta>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FolderLessonEntry {
    #[serde(rename = "lessonId")]
    pub lesson_id: String,
    pub lang: String,
    pub cards: Vec<Word>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FolderExport {
    #[serde(rename = "folderLang")]
    pub folder_lang: String,
    #[serde(rename = "folderName", default, skip_serializing_if = "Option::is_none")]
    pub folder_name: Option<String>,
    pub lessons: Vec<FolderLessonEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<ExportMeta>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_lesson_record_without_folder() {
        let json = r#"{"lang":"de","cards":[{"de":"Haus","ru":"дом"}]}"#;
        let record: LessonRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.folder_id, None);
        assert_eq!(record.cards.len(), 1);
    }

    #[test]
    fn test_lesson_export_field_names() {
        let export = LessonExport {
            lesson_id: "les1".to_string(),
            lang: "de".to_string(),
            cards: Vec::new(),
            meta: Some(ExportMeta::now()),
        };
        let value = serde_json::to_value(&export).unwrap();
        assert_eq!(value["lessonId"], "les1");
        assert_eq!(value["meta"]["app"], APP_NAME);
        assert!(value["meta"]["exportedAt"].is_string());
    }

    #[test]
    fn test_game_over_default_is_clear() {
        let record: GameOverRecord = serde_json::from_str(r#"{"timestamp":null}"#).unwrap();
        assert_eq!(record, GameOverRecord::default());
    }
}
