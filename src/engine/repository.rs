use std::collections::BTreeMap;

use rust_embed::Embed;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::engine::import::{self, ImportPayload};
use crate::model::{Folder, Lesson, Word};
use crate::store::schema::{
    ExportMeta, FOLDERS_KEY, FolderExport, FolderLessonEntry, FolderMap, LessonExport, LessonMap,
    LessonRecord, USER_LESSONS_KEY,
};
use crate::store::{SharedStore, load_json};

#[derive(Embed)]
#[folder = "assets/"]
struct Assets;

const CATALOG_FILE: &str = "catalog.json";

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("lesson `{0}` not found")]
    LessonNotFound(String),
    #[error("folder `{0}` not found")]
    FolderNotFound(String),
    #[error("lesson `{0}` already exists")]
    DuplicateLesson(String),
    #[error("{0} must not be empty")]
    EmptyField(&'static str),
    #[error("invalid import: {0}")]
    InvalidImport(String),
    #[error("failed to persist catalog: {0}")]
    Persist(#[from] anyhow::Error),
}

#[derive(Clone, Debug)]
pub struct NewFolder {
    pub name: String,
    pub default_lang: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportedLesson {
    pub requested_id: String,
    pub saved_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportSummary {
    pub folder_id: String,
    pub created_folder: bool,
    pub lessons: Vec<ImportedLesson>,
}

#[derive(Clone, Default)]
struct Catalog {
    lessons: BTreeMap<String, Lesson>,
    folders: BTreeMap<String, Folder>,
}

/// Lessons grouped into folders, persisted under `userLessons` and
/// `wordmasterFolders`.
pub struct LessonRepository {
    store: SharedStore,
    catalog: Catalog,
}

impl LessonRepository {
    /// Load the catalog, seeding the built-in lessons on first run and
    /// migrating legacy folder-less lessons.
    pub fn load_all(store: SharedStore) -> Result<Self, RepositoryError> {
        let lesson_map: Option<LessonMap> = load_json(store.as_ref(), USER_LESSONS_KEY);
        let folder_map: Option<FolderMap> = load_json(store.as_ref(), FOLDERS_KEY);

        let first_run = lesson_map.as_ref().is_none_or(|m| m.is_empty())
            && folder_map.as_ref().is_none_or(|m| m.is_empty());

        let mut repo = Self {
            store,
            catalog: Catalog::default(),
        };

        if first_run {
            let mut catalog = Catalog::default();
            for folder in builtin_catalog() {
                let lessons = folder.lessons;
                catalog.import_folder(&folder.folder_lang, folder.folder_name.as_deref(), lessons);
            }
            info!(
                lessons = catalog.lessons.len(),
                folders = catalog.folders.len(),
                "seeded built-in catalog"
            );
            repo.commit(catalog)?;
            return Ok(repo);
        }

        let (catalog, migrated) = migrate(lesson_map.unwrap_or_default(), folder_map);
        if migrated {
            repo.commit(catalog)?;
        } else {
            repo.catalog = catalog;
        }
        debug!(
            lessons = repo.catalog.lessons.len(),
            folders = repo.catalog.folders.len(),
            "loaded catalog"
        );
        Ok(repo)
    }

    // --- Queries ---

    pub fn lesson(&self, id: &str) -> Option<&Lesson> {
        self.catalog.lessons.get(id)
    }

    pub fn folder(&self, id: &str) -> Option<&Folder> {
        self.catalog.folders.get(id)
    }

    pub fn lessons(&self) -> impl Iterator<Item = &Lesson> {
        self.catalog.lessons.values()
    }

    /// Folders ordered by name.
    pub fn folders(&self) -> Vec<&Folder> {
        let mut folders: Vec<&Folder> = self.catalog.folders.values().collect();
        folders.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        folders
    }

    pub fn lessons_in(&self, folder_id: &str) -> Vec<&Lesson> {
        self.catalog
            .lessons
            .values()
            .filter(|l| l.folder_id == folder_id)
            .collect()
    }

    // --- Folders ---

    pub fn create_folder(&mut self, folder: NewFolder) -> Result<String, RepositoryError> {
        let name = folder.name.trim();
        let lang = folder.default_lang.trim();
        if name.is_empty() {
            return Err(RepositoryError::EmptyField("folder name"));
        }
        if lang.is_empty() {
            return Err(RepositoryError::EmptyField("folder language"));
        }
        let mut next = self.catalog.clone();
        let id = next.add_folder(name, lang);
        self.commit(next)?;
        info!(%id, name, lang, "created folder");
        Ok(id)
    }

    pub fn rename_folder(&mut self, id: &str, new_name: &str) -> Result<(), RepositoryError> {
        let new_name = new_name.trim();
        if new_name.is_empty() {
            return Err(RepositoryError::EmptyField("folder name"));
        }
        let mut next = self.catalog.clone();
        let folder = next
            .folders
            .get_mut(id)
            .ok_or_else(|| RepositoryError::FolderNotFound(id.to_string()))?;
        folder.name = new_name.to_string();
        self.commit(next)
    }

    /// Delete a folder and every lesson in it. Returns the removed lesson ids.
    pub fn delete_folder(&mut self, id: &str) -> Result<Vec<String>, RepositoryError> {
        if !self.catalog.folders.contains_key(id) {
            return Err(RepositoryError::FolderNotFound(id.to_string()));
        }
        let mut next = self.catalog.clone();
        next.folders.remove(id);
        let removed: Vec<String> = next
            .lessons
            .values()
            .filter(|l| l.folder_id == id)
            .map(|l| l.id.clone())
            .collect();
        for lesson_id in &removed {
            next.lessons.remove(lesson_id);
        }
        self.commit(next)?;
        info!(%id, lessons = removed.len(), "deleted folder");
        Ok(removed)
    }

    // --- Lessons ---

    pub fn add_lesson(
        &mut self,
        folder_id: &str,
        lesson_id: &str,
        cards: Vec<Word>,
    ) -> Result<(), RepositoryError> {
        let lesson_id = lesson_id.trim();
        if lesson_id.is_empty() {
            return Err(RepositoryError::EmptyField("lesson id"));
        }
        let folder = self
            .folder(folder_id)
            .ok_or_else(|| RepositoryError::FolderNotFound(folder_id.to_string()))?;
        if self.catalog.lessons.contains_key(lesson_id) {
            return Err(RepositoryError::DuplicateLesson(lesson_id.to_string()));
        }
        import::validate_cards(lesson_id, &cards)?;

        let lesson = Lesson::new(lesson_id, &folder.default_lang, folder_id, cards);
        let mut next = self.catalog.clone();
        next.lessons.insert(lesson.id.clone(), lesson);
        self.commit(next)?;
        info!(lesson = lesson_id, folder = folder_id, "added lesson");
        Ok(())
    }

    /// Replace a lesson's cards wholesale. This is the explicit overwrite path.
    pub fn replace_cards(&mut self, lesson_id: &str, cards: Vec<Word>) -> Result<(), RepositoryError> {
        let current = self
            .lesson(lesson_id)
            .ok_or_else(|| RepositoryError::LessonNotFound(lesson_id.to_string()))?;
        import::validate_cards(lesson_id, &cards)?;
        let lesson = Lesson::new(lesson_id, &current.lang, &current.folder_id, cards);
        let mut next = self.catalog.clone();
        next.lessons.insert(lesson.id.clone(), lesson);
        self.commit(next)
    }

    pub fn delete_lesson(&mut self, lesson_id: &str) -> Result<Lesson, RepositoryError> {
        let mut next = self.catalog.clone();
        let removed = next
            .lessons
            .remove(lesson_id)
            .ok_or_else(|| RepositoryError::LessonNotFound(lesson_id.to_string()))?;
        self.commit(next)?;
        info!(lesson = lesson_id, "deleted lesson");
        Ok(removed)
    }

    // --- Import / export ---

    /// Import either file shape.
    pub fn import(&mut self, json: &str) -> Result<ImportSummary, RepositoryError> {
        let payload = import::parse_import(json)?;
        let mut next = self.catalog.clone();
        let summary = match payload {
            ImportPayload::Lesson(entry) => next.import_lesson(entry),
            ImportPayload::Folder {
                folder_lang,
                folder_name,
                lessons,
            } => next.import_folder(&folder_lang, folder_name.as_deref(), lessons),
        };
        self.commit(next)?;
        for l in &summary.lessons {
            if l.requested_id != l.saved_id {
                info!(requested = %l.requested_id, saved = %l.saved_id, "lesson id taken, imported under new id");
            }
        }
        Ok(summary)
    }

    pub fn import_lesson(&mut self, json: &str) -> Result<ImportSummary, RepositoryError> {
        let entry = import::parse_lesson(json)?;
        let mut next = self.catalog.clone();
        let summary = next.import_lesson(entry);
        self.commit(next)?;
        Ok(summary)
    }

    pub fn import_folder(&mut self, json: &str) -> Result<ImportSummary, RepositoryError> {
        match import::parse_import(json)? {
            ImportPayload::Folder { .. } => self.import(json),
            ImportPayload::Lesson(_) => Err(RepositoryError::InvalidImport(
                "expected a folder file but found a single lesson".to_string(),
            )),
        }
    }

    pub fn export_lesson(&self, lesson_id: &str) -> Result<LessonExport, RepositoryError> {
        let lesson = self
            .lesson(lesson_id)
            .ok_or_else(|| RepositoryError::LessonNotFound(lesson_id.to_string()))?;
        Ok(LessonExport {
            lesson_id: lesson.id.clone(),
            lang: lesson.lang.clone(),
            cards: lesson.cards.clone(),
            meta: Some(ExportMeta::now()),
        })
    }

    pub fn export_folder(&self, folder_id: &str) -> Result<FolderExport, RepositoryError> {
        let folder = self
            .folder(folder_id)
            .ok_or_else(|| RepositoryError::FolderNotFound(folder_id.to_string()))?;
        let lessons = self
            .lessons_in(folder_id)
            .into_iter()
            .map(|l| FolderLessonEntry {
                lesson_id: l.id.clone(),
                lang: l.lang.clone(),
                cards: l.cards.clone(),
            })
            .collect();
        Ok(FolderExport {
            folder_lang: folder.default_lang.clone(),
            folder_name: Some(folder.name.clone()),
            lessons,
            meta: Some(ExportMeta::now()),
        })
    }

    /// Persist `next` and adopt it. The in-memory catalog only changes once
    /// both keys are written.
    fn commit(&mut self, next: Catalog) -> Result<(), RepositoryError> {
        let lessons: LessonMap = next
            .lessons
            .values()
            .map(|l| {
                (
                    l.id.clone(),
                    LessonRecord {
                        lang: l.lang.clone(),
                        folder_id: Some(l.folder_id.clone()),
                        cards: l.cards.clone(),
                    },
                )
            })
            .collect();
        let folders: FolderMap = next.folders.clone();
        self.store
            .set_many(&[
                (
                    USER_LESSONS_KEY,
                    serde_json::to_string(&lessons).map_err(anyhow::Error::from)?,
                ),
                (
                    FOLDERS_KEY,
                    serde_json::to_string(&folders).map_err(anyhow::Error::from)?,
                ),
            ])?;
        self.catalog = next;
        Ok(())
    }
}

impl Catalog {
    fn folder_for_lang(&self, lang: &str, name: Option<&str>) -> Option<String> {
        let by_lang = || self.folders.values().filter(|f| f.default_lang == lang);
        name.and_then(|n| by_lang().find(|f| f.name == n))
            .or_else(|| by_lang().next())
            .map(|f| f.id.clone())
    }

    fn add_folder(&mut self, name: &str, lang: &str) -> String {
        let id = unique_id(&format!("folder_{}", slug(lang)), |id| {
            self.folders.contains_key(id)
        });
        self.folders.insert(
            id.clone(),
            Folder {
                id: id.clone(),
                name: name.to_string(),
                default_lang: lang.to_string(),
            },
        );
        id
    }

    fn import_lesson(&mut self, entry: FolderLessonEntry) -> ImportSummary {
        let (folder_id, created_folder) = match self.folder_for_lang(&entry.lang, None) {
            Some(id) => (id, false),
            None => {
                let lang = entry.lang.clone();
                (self.add_folder(&lang, &lang), true)
            }
        };
        let imported = self.insert_imported(&folder_id, entry);
        ImportSummary {
            folder_id,
            created_folder,
            lessons: vec![imported],
        }
    }

    fn import_folder(
        &mut self,
        folder_lang: &str,
        folder_name: Option<&str>,
        lessons: Vec<FolderLessonEntry>,
    ) -> ImportSummary {
        let (folder_id, created_folder) = match self.folder_for_lang(folder_lang, folder_name) {
            Some(id) => (id, false),
            None => (
                self.add_folder(folder_name.unwrap_or(folder_lang), folder_lang),
                true,
            ),
        };
        let lessons = lessons
            .into_iter()
            .map(|entry| self.insert_imported(&folder_id, entry))
            .collect();
        ImportSummary {
            folder_id,
            created_folder,
            lessons,
        }
    }

    /// Insert under the requested id, or `<id>_imp<n>` if that is taken.
    fn insert_imported(&mut self, folder_id: &str, entry: FolderLessonEntry) -> ImportedLesson {
        let saved_id = if self.lessons.contains_key(&entry.lesson_id) {
            let mut n = 1;
            loop {
                let candidate = format!("{}_imp{n}", entry.lesson_id);
                if !self.lessons.contains_key(&candidate) {
                    break candidate;
                }
                n += 1;
            }
        } else {
            entry.lesson_id.clone()
        };
        let lesson = Lesson::new(&saved_id, &entry.lang, folder_id, entry.cards);
        self.lessons.insert(saved_id.clone(), lesson);
        ImportedLesson {
            requested_id: entry.lesson_id,
            saved_id,
        }
    }
}

/// Assign folders to legacy lessons. Returns the catalog and whether anything
/// had to change.
fn migrate(lesson_map: LessonMap, folder_map: Option<FolderMap>) -> (Catalog, bool) {
    let mut migrated = false;
    let folders_missing = folder_map.as_ref().is_none_or(|m| m.is_empty());
    let mut catalog = Catalog {
        lessons: BTreeMap::new(),
        folders: folder_map.unwrap_or_default(),
    };

    // No folders stored: one group per distinct folderId seen on lessons.
    if folders_missing {
        for record in lesson_map.values() {
            if let Some(folder_id) = record.folder_id.as_deref()
                && !catalog.folders.contains_key(folder_id)
            {
                let lang = record.lang.clone();
                let name = if lang.is_empty() { folder_id.to_string() } else { lang.clone() };
                catalog.folders.insert(
                    folder_id.to_string(),
                    Folder {
                        id: folder_id.to_string(),
                        name,
                        default_lang: lang,
                    },
                );
                migrated = true;
            }
        }
    }

    for (id, record) in lesson_map {
        let folder_id = match record.folder_id.as_deref() {
            Some(fid) if catalog.folders.contains_key(fid) => fid.to_string(),
            other => {
                if let Some(dangling) = other {
                    warn!(lesson = %id, folder = dangling, "lesson points at a missing folder");
                }
                migrated = true;
                match catalog.folder_for_lang(&record.lang, None) {
                    Some(fid) => fid,
                    None => {
                        let lang = if record.lang.is_empty() { "unknown".to_string() } else { record.lang.clone() };
                        catalog.add_folder(&lang, &lang)
                    }
                }
            }
        };
        let lesson = Lesson::new(&id, &record.lang, &folder_id, record.cards);
        catalog.lessons.insert(id, lesson);
    }

    if migrated {
        info!("migrated legacy lessons into folders");
    }
    (catalog, migrated)
}

fn builtin_catalog() -> Vec<FolderExport> {
    let Some(file) = Assets::get(CATALOG_FILE) else {
        warn!("built-in catalog asset missing");
        return Vec::new();
    };
    match serde_json::from_slice(&file.data) {
        Ok(catalog) => catalog,
        Err(e) => {
            warn!(error = %e, "built-in catalog is malformed");
            Vec::new()
        }
    }
}

fn slug(text: &str) -> String {
    let slug: String = text
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if slug.is_empty() { "x".to_string() } else { slug }
}

fn unique_id(base: &str, taken: impl Fn(&str) -> bool) -> String {
    if !taken(base) {
        return base.to_string();
    }
    let mut n = 2;
    loop {
        let candidate = format!("{base}_{n}");
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}
