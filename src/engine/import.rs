//! Parsing and validation of lesson/folder import files.
//!
//! Everything is checked here, before the repository touches its catalog, so
//! a rejected file never leaves a partial import behind.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::engine::repository::RepositoryError;
use crate::model::Word;
use crate::store::schema::FolderLessonEntry;

#[derive(Clone, Debug)]
pub enum ImportPayload {
    Lesson(FolderLessonEntry),
    Folder {
        folder_lang: String,
        folder_name: Option<String>,
        lessons: Vec<FolderLessonEntry>,
    },
}

#[derive(Deserialize)]
struct RawLesson {
    #[serde(rename = "lessonId")]
    lesson_id: Option<String>,
    lang: Option<String>,
    cards: Option<Vec<Word>>,
}

#[derive(Deserialize)]
struct RawFolder {
    #[serde(rename = "folderLang")]
    folder_lang: Option<String>,
    #[serde(rename = "folderName")]
    folder_name: Option<String>,
    lessons: Option<Vec<RawLesson>>,
}

/// Detect the shape of an import file and validate it completely.
pub fn parse_import(json: &str) -> Result<ImportPayload, RepositoryError> {
    let value: Value = serde_json::from_str(json).map_err(|e| invalid(format!("not valid JSON: {e}")))?;
    let Some(object) = value.as_object() else {
        return Err(invalid("expected a JSON object".to_string()));
    };

    if object.contains_key("lessons") {
        let raw: RawFolder =
            serde_json::from_value(value).map_err(|e| invalid(format!("bad folder file: {e}")))?;
        parse_folder(raw)
    } else if object.contains_key("lessonId") {
        let raw: RawLesson =
            serde_json::from_value(value).map_err(|e| invalid(format!("bad lesson file: {e}")))?;
        Ok(ImportPayload::Lesson(validate_lesson(raw, None)?))
    } else {
        Err(invalid(
            "expected a lesson (`lessonId`, `lang`, `cards`) or a folder (`folderLang`, `lessons`)"
                .to_string(),
        ))
    }
}

/// Parse only a single-lesson file.
pub fn parse_lesson(json: &str) -> Result<FolderLessonEntry, RepositoryError> {
    match parse_import(json)? {
        ImportPayload::Lesson(entry) => Ok(entry),
        ImportPayload::Folder { .. } => Err(invalid(
            "expected a single lesson but found a folder file".to_string(),
        )),
    }
}

fn parse_folder(raw: RawFolder) -> Result<ImportPayload, RepositoryError> {
    let folder_lang = non_empty(raw.folder_lang, "folderLang")?;
    let lessons = raw.lessons.unwrap_or_default();
    if lessons.is_empty() {
        return Err(invalid("folder file has no lessons".to_string()));
    }
    let lessons = lessons
        .into_iter()
        .map(|l| validate_lesson(l, Some(&folder_lang)))
        .collect::<Result<Vec<_>, _>>()?;
    let folder_name = raw
        .folder_name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());
    Ok(ImportPayload::Folder {
        folder_lang,
        folder_name,
        lessons,
    })
}

fn validate_lesson(
    raw: RawLesson,
    fallback_lang: Option<&str>,
) -> Result<FolderLessonEntry, RepositoryError> {
    let lesson_id = non_empty(raw.lesson_id, "lessonId")?;
    let lang = match (raw.lang.filter(|l| !l.trim().is_empty()), fallback_lang) {
        (Some(lang), _) => lang.trim().to_string(),
        (None, Some(fallback)) => fallback.to_string(),
        (None, None) => return Err(invalid(format!("lesson `{lesson_id}` is missing `lang`"))),
    };
    let cards = raw.cards.unwrap_or_default();
    validate_cards(&lesson_id, &cards)?;
    Ok(FolderLessonEntry {
        lesson_id,
        lang,
        cards,
    })
}

/// Every card needs both sides and a `de` unique within the lesson; an empty
/// card list is not a lesson.
pub fn validate_cards(lesson_id: &str, cards: &[Word]) -> Result<(), RepositoryError> {
    if cards.is_empty() {
        return Err(invalid(format!("lesson `{lesson_id}` has no cards")));
    }
    let mut seen: HashMap<&str, usize> = HashMap::new();
    for (i, card) in cards.iter().enumerate() {
        if card.de.trim().is_empty() {
            return Err(invalid(format!(
                "lesson `{lesson_id}`: card {} is missing `de`",
                i + 1
            )));
        }
        if card.ru.trim().is_empty() {
            return Err(invalid(format!(
                "lesson `{lesson_id}`: card {} is missing `ru`",
                i + 1
            )));
        }
        if let Some(first) = seen.insert(card.de.as_str(), i + 1) {
            return Err(invalid(format!(
                "lesson `{lesson_id}`: card {} repeats `{}` from card {first}",
                i + 1,
                card.de
            )));
        }
    }
    Ok(())
}

fn non_empty(value: Option<String>, field: &str) -> Result<String, RepositoryError> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(invalid(format!("missing `{field}`"))),
    }
}

fn invalid(message: String) -> RepositoryError {
    warn!(%message, "rejected import");
    RepositoryError::InvalidImport(message)
}
