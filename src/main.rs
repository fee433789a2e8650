use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use rust_i18n::t;

use wordmaster::app::App;
use wordmaster::config::Config;
use wordmaster::engine::ledger::LedgerError;
use wordmaster::engine::repository::{NewFolder, RepositoryError};
use wordmaster::model::{PracticeMode, Word, WordKey};
use wordmaster::session::controller::{
    Advance, MatchTile, Prompt, Response, SessionError, SessionState,
};
use wordmaster::telemetry;

rust_i18n::i18n!("locales", fallback = "en");

#[derive(Parser)]
#[command(name = "wordmaster", version, about = "Vocabulary trainer with per-mode progress")]
struct Cli {
    #[arg(long, help = "Directory holding the JSON store")]
    data_dir: Option<PathBuf>,

    #[arg(long, help = "Interface language (en, ru)")]
    locale: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List folders
    Folders,
    /// List lessons, optionally within one folder
    Lessons {
        #[arg(long)]
        folder: Option<String>,
    },
    /// Manage folders
    Folder {
        #[command(subcommand)]
        action: FolderAction,
    },
    /// Manage lessons
    Lesson {
        #[command(subcommand)]
        action: LessonAction,
    },
    /// Import a lesson or folder file
    Import { file: PathBuf },
    /// Export a lesson or folder
    Export {
        #[command(subcommand)]
        target: ExportTarget,
        #[arg(long, global = true, help = "Write to a file instead of stdout")]
        out: Option<PathBuf>,
    },
    /// Learned counts per mode for a lesson
    Progress { lesson: String },
    /// Forget a lesson's progress in one mode, or in all modes
    ResetProgress {
        lesson: String,
        #[arg(long, value_parser = parse_mode)]
        mode: Option<PracticeMode>,
    },
    /// Forget all progress
    ResetAll,
    /// Apply a JSON ledger request
    Ledger { request: String },
    /// Show lives and cooldown
    Lives,
    /// Restore lives and switch on unlimited mode
    Unlock,
    /// Switch unlimited mode off again
    Lock,
    /// Show or set stored preferences
    Prefs {
        #[arg(long)]
        tts_lang: Option<String>,
        #[arg(long)]
        tts_voice: Option<String>,
        #[arg(long)]
        theme: Option<String>,
    },
    /// Print the effective configuration
    Config {
        #[arg(long, help = "Write it to the config file")]
        save: bool,
    },
    /// Practise a lesson interactively
    Practice {
        lesson: String,
        #[arg(long, value_parser = parse_mode, default_value = "flashcards")]
        mode: PracticeMode,
    },
}

#[derive(Subcommand)]
enum FolderAction {
    Create {
        name: String,
        #[arg(long)]
        lang: String,
    },
    Rename {
        id: String,
        name: String,
    },
    Delete {
        id: String,
    },
}

#[derive(Subcommand)]
enum LessonAction {
    /// Print a lesson's cards
    Show { id: String },
    /// Add a lesson from a JSON array of cards
    Add {
        folder: String,
        id: String,
        #[arg(long)]
        cards: PathBuf,
    },
    /// Replace a lesson's cards from a JSON array
    Edit {
        id: String,
        #[arg(long)]
        cards: PathBuf,
    },
    Delete { id: String },
}

#[derive(Subcommand)]
enum ExportTarget {
    Lesson { id: String },
    Folder { id: String },
}

fn parse_mode(s: &str) -> Result<PracticeMode, String> {
    PracticeMode::from_key(s).ok_or_else(|| {
        let modes: Vec<&str> = PracticeMode::all().iter().map(|m| m.as_str()).collect();
        format!("unknown mode `{s}` (expected one of: {})", modes.join(", "))
    })
}

fn main() -> Result<()> {
    telemetry::init_tracing();
    let cli = Cli::parse();

    let mut config = Config::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "could not read config, using defaults");
        Config::default()
    });
    if let Some(dir) = cli.data_dir {
        config.data_dir = Some(dir.to_string_lossy().to_string());
    }
    if let Some(locale) = cli.locale {
        config.locale = locale;
    }
    config.validate();
    rust_i18n::set_locale(&config.locale);

    let mut app = App::open(config)?;
    if let Err(e) = run(&mut app, cli.command) {
        eprintln!("{}", describe(&e));
    }
    Ok(())
}

fn run(app: &mut App, command: Command) -> Result<()> {
    match command {
        Command::Folders => {
            for folder in app.repository.folders() {
                let count = app.repository.lessons_in(&folder.id).len();
                println!(
                    "{}",
                    t!("folders.row", id = folder.id, name = folder.name, lang = folder.default_lang, count = count)
                );
            }
        }
        Command::Lessons { folder } => {
            let lessons: Vec<_> = match &folder {
                Some(id) => {
                    if app.repository.folder(id).is_none() {
                        return Err(RepositoryError::FolderNotFound(id.clone()).into());
                    }
                    app.repository.lessons_in(id)
                }
                None => app.repository.lessons().collect(),
            };
            if lessons.is_empty() {
                println!("{}", t!("lessons.empty"));
            }
            for lesson in lessons {
                println!(
                    "{}",
                    t!("lessons.row", id = lesson.id, lang = lesson.lang, folder = lesson.folder_id, count = lesson.cards.len())
                );
            }
        }
        Command::Folder { action } => run_folder(app, action)?,
        Command::Lesson { action } => run_lesson(app, action)?,
        Command::Import { file } => {
            let json = fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let summary = app.repository.import(&json)?;
            if summary.created_folder {
                println!("{}", t!("import.created_folder", id = summary.folder_id));
            }
            for lesson in &summary.lessons {
                if lesson.requested_id == lesson.saved_id {
                    println!("{}", t!("import.saved", id = lesson.saved_id));
                } else {
                    println!(
                        "{}",
                        t!("import.renamed", requested = lesson.requested_id, saved = lesson.saved_id)
                    );
                }
            }
        }
        Command::Export { target, out } => {
            let json = match target {
                ExportTarget::Lesson { id } => {
                    serde_json::to_string_pretty(&app.repository.export_lesson(&id)?)?
                }
                ExportTarget::Folder { id } => {
                    serde_json::to_string_pretty(&app.repository.export_folder(&id)?)?
                }
            };
            match out {
                Some(path) => {
                    fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
                    println!("{}", t!("export.written", path = path.display()));
                }
                None => println!("{json}"),
            }
        }
        Command::Progress { lesson } => {
            let progress = app.progress(&lesson)?;
            println!("{}", t!("progress.header", id = progress.lesson_id, total = progress.total));
            for m in &progress.modes {
                println!(
                    "{}",
                    t!("progress.row", mode = m.mode, learned = m.learned, eligible = m.eligible)
                );
            }
        }
        Command::ResetProgress { lesson, mode } => {
            app.progress(&lesson)?;
            let modes = match mode {
                Some(mode) => vec![mode],
                None => PracticeMode::all().to_vec(),
            };
            let mut cleared = 0;
            for mode in modes {
                cleared += app.reset_progress(mode, &lesson)?;
            }
            println!("{}", t!("progress.cleared", count = cleared, id = lesson));
        }
        Command::ResetAll => {
            app.reset_all_progress()?;
            println!("{}", t!("progress.reset_all"));
        }
        Command::Ledger { request } => {
            let outcome = app.apply_ledger(&request)?;
            println!("{outcome:?}");
        }
        Command::Lives => print_lives(app)?,
        Command::Unlock => {
            app.restore_lives()?;
            println!("{}", t!("lives.unlocked"));
        }
        Command::Lock => {
            app.deactivate_unlimited()?;
            println!("{}", t!("lives.locked"));
        }
        Command::Prefs {
            tts_lang,
            tts_voice,
            theme,
        } => {
            if let Some(lang) = tts_lang {
                app.preferences.set_tts_lang(&lang)?;
            }
            if let Some(voice) = tts_voice {
                app.preferences.set_tts_voice(&voice)?;
            }
            if let Some(theme) = theme {
                app.preferences.set_theme(&theme)?;
            }
            let show = |v: Option<String>| v.unwrap_or_else(|| "-".to_string());
            println!("tts_lang   {}", show(app.preferences.tts_lang()));
            println!("tts_voice  {}", show(app.preferences.tts_voice()));
            println!("theme      {}", show(app.preferences.theme()));
        }
        Command::Config { save } => {
            print!("{}", toml::to_string_pretty(&app.config)?);
            if save {
                app.config.save()?;
                println!("{}", t!("config.saved", path = Config::config_path().display()));
            }
        }
        Command::Practice { lesson, mode } => practice(app, &lesson, mode)?,
    }
    Ok(())
}

fn run_folder(app: &mut App, action: FolderAction) -> Result<()> {
    match action {
        FolderAction::Create { name, lang } => {
            let id = app.repository.create_folder(NewFolder {
                name,
                default_lang: lang,
            })?;
            println!("{}", t!("folders.created", id = id));
        }
        FolderAction::Rename { id, name } => {
            app.repository.rename_folder(&id, &name)?;
            println!("{}", t!("folders.renamed", id = id));
        }
        FolderAction::Delete { id } => {
            let removed = app.delete_folder(&id)?;
            println!("{}", t!("folders.deleted", id = id, count = removed.len()));
        }
    }
    Ok(())
}

fn run_lesson(app: &mut App, action: LessonAction) -> Result<()> {
    match action {
        LessonAction::Show { id } => {
            let lesson = app
                .repository
                .lesson(&id)
                .ok_or_else(|| RepositoryError::LessonNotFound(id.clone()))?;
            for card in &lesson.cards {
                match card.example_sentence() {
                    Some(example) => println!("{} - {}  ({example})", card.de, card.ru),
                    None => println!("{} - {}", card.de, card.ru),
                }
            }
        }
        LessonAction::Add { folder, id, cards } => {
            let cards = read_cards(&cards)?;
            app.repository.add_lesson(&folder, &id, cards)?;
            println!("{}", t!("lessons.added", id = id));
        }
        LessonAction::Edit { id, cards } => {
            let cards = read_cards(&cards)?;
            app.repository.replace_cards(&id, cards)?;
            println!("{}", t!("lessons.updated", id = id));
        }
        LessonAction::Delete { id } => {
            app.delete_lesson(&id)?;
            println!("{}", t!("lessons.deleted", id = id));
        }
    }
    Ok(())
}

fn read_cards(path: &PathBuf) -> Result<Vec<Word>> {
    let json = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let cards: Vec<Word> =
        serde_json::from_str(&json).with_context(|| format!("parsing {}", path.display()))?;
    Ok(cards)
}

fn print_lives(app: &mut App) -> Result<()> {
    let status = app.lives_status(Utc::now())?;
    if status.is_unlimited {
        println!("{}", t!("lives.unlimited"));
        return Ok(());
    }
    println!("{}", t!("lives.count", count = status.count, max = status.max_lives));
    if let Some(left) = status.cooldown_remaining {
        println!("{}", t!("lives.cooldown", secs = left.num_seconds()));
    }
    Ok(())
}

/// Localised text for the errors users can act on.
fn describe(err: &anyhow::Error) -> String {
    if let Some(e) = err.downcast_ref::<RepositoryError>() {
        return match e {
            RepositoryError::LessonNotFound(id) => t!("errors.lesson_not_found", id = id).to_string(),
            RepositoryError::FolderNotFound(id) => t!("errors.folder_not_found", id = id).to_string(),
            RepositoryError::DuplicateLesson(id) => t!("errors.duplicate_lesson", id = id).to_string(),
            RepositoryError::InvalidImport(msg) => t!("errors.invalid_import", msg = msg).to_string(),
            other => other.to_string(),
        };
    }
    if let Some(SessionError::Exhausted { remaining_secs }) = err.downcast_ref::<SessionError>() {
        return t!("errors.exhausted", secs = remaining_secs).to_string();
    }
    if let Some(e) = err.downcast_ref::<LedgerError>() {
        return t!("errors.ledger", msg = e).to_string();
    }
    t!("errors.generic", msg = format!("{err:#}")).to_string()
}

// --- Interactive practice ---

enum Input {
    Line(String),
    Quit,
}

fn read_input(prompt: &str) -> Result<Input> {
    print!("{prompt} ");
    io::stdout().flush()?;
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok(Input::Quit);
    }
    let line = line.trim().to_string();
    if line == "q" {
        return Ok(Input::Quit);
    }
    Ok(Input::Line(line))
}

fn practice(app: &mut App, lesson_id: &str, mode: PracticeMode) -> Result<()> {
    let mut step = app.start_session(mode, lesson_id)?;
    println!("{}", t!("practice.started", mode = mode, id = lesson_id));

    loop {
        match step {
            Advance::LessonComplete | Advance::SessionComplete => {
                if step == Advance::LessonComplete {
                    println!("{}", t!("practice.lesson_complete"));
                } else {
                    println!("{}", t!("practice.session_complete"));
                }
                if let Some(stats) = app.session().map(|s| s.stats()) {
                    println!(
                        "{}",
                        t!("practice.stats", correct = stats.correct, incorrect = stats.incorrect)
                    );
                }
                let Input::Line(choice) = read_input(&t!("practice.again"))? else {
                    break;
                };
                step = match choice.as_str() {
                    "r" => app.repeat()?,
                    "s" => app.restart()?,
                    _ => break,
                };
                continue;
            }
            Advance::Next | Advance::Ignored => {}
        }

        let Some(prompt) = app.prompt() else {
            break;
        };
        let Some(response) = ask(app, &prompt)? else {
            break;
        };
        match app.answer(response) {
            Ok(feedback) => {
                if feedback.correct {
                    println!("{}", t!("practice.correct"));
                } else {
                    println!("{}", t!("practice.wrong", expected = feedback.expected));
                }
                if let Some(life) = feedback.life {
                    println!("{}", t!("practice.life", outcome = format!("{life:?}")));
                }
            }
            Err(e) => {
                let exhausted = matches!(
                    e.downcast_ref::<SessionError>(),
                    Some(SessionError::Exhausted { .. })
                );
                eprintln!("{}", describe(&e));
                if exhausted {
                    break;
                }
                step = Advance::Ignored;
                continue;
            }
        }

        step = match app.session().map(|s| s.state()) {
            Some(SessionState::Answered { .. }) => app.advance()?,
            _ => Advance::Ignored,
        };
    }

    app.end_session();
    Ok(())
}

/// Show a prompt and turn the typed line into a response.
fn ask(app: &mut App, prompt: &Prompt) -> Result<Option<Response>> {
    match prompt {
        Prompt::Flashcard {
            word,
            position,
            total,
            ..
        } => {
            println!("[{}/{}] {}", position + 1, total, word.de);
            if let Input::Quit = read_input(&t!("practice.flip"))? {
                return Ok(None);
            }
            app.reveal();
            println!("  {}", word.ru);
            let Input::Line(line) = read_input(&t!("practice.known"))? else {
                return Ok(None);
            };
            Ok(Some(Response::Flashcard {
                known: line.eq_ignore_ascii_case("y"),
            }))
        }
        Prompt::Quiz { word, options } => {
            println!("{}", word.de);
            for (i, option) in options.iter().enumerate() {
                println!("  {}. {}", i + 1, option.text);
            }
            let Input::Line(line) = read_input(&t!("practice.choose"))? else {
                return Ok(None);
            };
            let index = line.parse::<usize>().unwrap_or(0).wrapping_sub(1);
            Ok(Some(Response::Choice(index)))
        }
        Prompt::Matching { left, right } => {
            let open_right: Vec<_> = right.iter().filter(|t| !t.solved).collect();
            let open_left: Vec<_> = left.iter().filter(|t| !t.solved).collect();
            for (i, tile) in open_left.iter().enumerate() {
                let letter = (b'a' + i as u8) as char;
                let other = open_right.get(i).map(|t| t.text.as_str()).unwrap_or("");
                println!("  {}. {:<24} {}. {}", i + 1, tile.text, letter, other);
            }
            let Input::Line(line) = read_input(&t!("practice.pair"))? else {
                return Ok(None);
            };
            let mut parts = line.split_whitespace();
            let l = parts.next().and_then(|p| p.parse::<usize>().ok());
            let r = parts
                .next()
                .and_then(|p| p.chars().next())
                .map(|c| (c as u8).wrapping_sub(b'a') as usize);
            let pick = |tiles: &[&MatchTile], i: Option<usize>| {
                i.and_then(|i| tiles.get(i))
                    .map(|t| t.key.clone())
                    .unwrap_or_else(|| WordKey::new("", ""))
            };
            Ok(Some(Response::Pair {
                left: pick(&open_left, l.map(|l| l.wrapping_sub(1))),
                right: pick(&open_right, r),
            }))
        }
        Prompt::Writing { word } => {
            println!("{}", word.ru);
            let Input::Line(line) = read_input(&t!("practice.type"))? else {
                return Ok(None);
            };
            Ok(Some(Response::Text(line)))
        }
        Prompt::SentencePuzzle { word, tiles } => {
            if let Some(translation) = &word.exru {
                println!("{translation}");
            }
            for (i, tile) in tiles.iter().enumerate() {
                print!("{}:{}  ", i + 1, tile);
            }
            println!();
            let Input::Line(line) = read_input(&t!("practice.order"))? else {
                return Ok(None);
            };
            let order = line
                .split_whitespace()
                .filter_map(|p| p.parse::<usize>().ok())
                .filter_map(|i| tiles.get(i.wrapping_sub(1)).cloned())
                .collect();
            Ok(Some(Response::Tiles(order)))
        }
    }
}
