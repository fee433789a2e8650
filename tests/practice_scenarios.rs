use std::path::Path;
use std::rc::Rc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use tempfile::TempDir;

use wordmaster::app::App;
use wordmaster::config::Config;
use wordmaster::engine::lives::LifeOutcome;
use wordmaster::model::{PracticeMode, Word, WordKey};
use wordmaster::session::controller::{Advance, Prompt, Response, SessionError, SessionState};
use wordmaster::store::json_store::JsonStore;
use wordmaster::store::load_json;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

fn open_app(dir: &Path, config: Config) -> App {
    let store = JsonStore::with_base_dir(dir.to_path_buf()).unwrap();
    App::with_store(config, Rc::new(store), SmallRng::seed_from_u64(42)).unwrap()
}

fn add_numbered_lesson(app: &mut App, id: &str, n: usize) {
    let cards = (0..n)
        .map(|i| Word::new(&format!("Wort{i}"), &format!("слово{i}"), ""))
        .collect();
    app.repository.add_lesson("folder_de", id, cards).unwrap();
}

fn answer_quiz_correctly(app: &mut App) {
    let Some(Prompt::Quiz { word, options }) = app.prompt() else {
        panic!("expected a quiz prompt, got {:?}", app.prompt());
    };
    let choice = options
        .iter()
        .position(|o| o.key.as_ref() == Some(&word.key()))
        .expect("right answer must be offered");
    let feedback = app.answer_at(Response::Choice(choice), t0()).unwrap();
    assert!(feedback.correct);
}

fn matching_board(app: &App) -> Vec<WordKey> {
    match app.prompt() {
        Some(Prompt::Matching { left, .. }) => left
            .into_iter()
            .filter(|t| !t.solved)
            .map(|t| t.key)
            .collect(),
        other => panic!("expected a matching board, got {other:?}"),
    }
}

#[test]
fn quiz_through_whole_lesson_persists_every_word() {
    let dir = TempDir::new().unwrap();
    let mut app = open_app(dir.path(), Config::default());
    add_numbered_lesson(&mut app, "les1", 25);

    assert_eq!(
        app.start_session_at(PracticeMode::Quiz, "les1", t0()).unwrap(),
        Advance::Next
    );
    let mut completions = 0;
    for _ in 0..25 {
        answer_quiz_correctly(&mut app);
        if app.advance().unwrap() == Advance::LessonComplete {
            completions += 1;
        }
    }
    assert_eq!(completions, 1);
    assert_eq!(app.advance().unwrap(), Advance::Ignored);
    assert!(app.remaining(PracticeMode::Quiz, "les1").unwrap().is_empty());
    assert_eq!(
        app.remaining(PracticeMode::Writing, "les1").unwrap().len(),
        25,
        "other modes keep their own progress"
    );

    let store = JsonStore::with_base_dir(dir.path().to_path_buf()).unwrap();
    let learned: Vec<Word> = load_json(&store, "learnedQuiz").unwrap();
    assert_eq!(learned.len(), 25);
    assert!(learned.iter().all(|w| w.lesson_id == "les1"));
}

#[test]
fn matching_miss_returns_first_in_next_chunk() {
    let dir = TempDir::new().unwrap();
    let config = Config {
        matching_chunk_size: 3,
        ..Config::default()
    };
    let mut app = open_app(dir.path(), config);
    add_numbered_lesson(&mut app, "les1", 7);
    app.start_session_at(PracticeMode::Matching, "les1", t0())
        .unwrap();

    let board = matching_board(&app);
    assert_eq!(board.len(), 3);
    let missed = board[0].clone();
    let feedback = app
        .answer_at(
            Response::Pair {
                left: missed.clone(),
                right: board[2].clone(),
            },
            t0(),
        )
        .unwrap();
    assert_eq!(feedback.life, Some(LifeOutcome::Lost { remaining: 2 }));
    assert_eq!(app.lives.count(), 2);

    for key in &board {
        app.answer_at(
            Response::Pair {
                left: key.clone(),
                right: key.clone(),
            },
            t0(),
        )
        .unwrap();
    }
    assert_eq!(
        app.session().unwrap().state(),
        SessionState::Answered { correct: false }
    );
    assert!(!app.ledger.is_learned(PracticeMode::Matching, &missed));

    assert_eq!(app.advance().unwrap(), Advance::Next);
    let next = app.session().unwrap().round_words();
    assert_eq!(next[0].key(), missed);
    assert_eq!(next.len(), 3);
}

#[test]
fn exhausted_lives_survive_restart() {
    let dir = TempDir::new().unwrap();
    {
        let mut app = open_app(dir.path(), Config::default());
        add_numbered_lesson(&mut app, "les1", 6);
        app.start_session_at(PracticeMode::Matching, "les1", t0())
            .unwrap();
        let board = matching_board(&app);
        for _ in 0..3 {
            app.answer_at(
                Response::Pair {
                    left: board[0].clone(),
                    right: board[1].clone(),
                },
                t0(),
            )
            .unwrap();
        }
        assert_eq!(app.lives.count(), 0);
    }

    let mut app = open_app(dir.path(), Config::default());
    assert!(app.lives.is_exhausted());
    app.start_session_at(PracticeMode::Matching, "les1", t0() + Duration::minutes(2))
        .unwrap();
    let board = matching_board(&app);
    let err = app
        .answer_at(
            Response::Pair {
                left: board[0].clone(),
                right: board[0].clone(),
            },
            t0() + Duration::minutes(2),
        )
        .unwrap_err();
    match err.downcast_ref::<SessionError>() {
        Some(SessionError::Exhausted { remaining_secs }) => assert_eq!(*remaining_secs, 480),
        other => panic!("expected exhaustion, got {other:?}"),
    }

    // Lives come back once the cooldown has run out.
    let status = app.lives_status(t0() + Duration::minutes(10)).unwrap();
    assert_eq!(status.count, 3);
    assert_eq!(status.cooldown_remaining, None);
}

#[test]
fn restart_clears_only_current_mode_for_lesson() {
    let dir = TempDir::new().unwrap();
    let mut app = open_app(dir.path(), Config::default());
    add_numbered_lesson(&mut app, "les1", 2);
    add_numbered_lesson(&mut app, "les2", 2);

    let other = app.repository.lesson("les2").unwrap().cards[0].clone();
    app.ledger.mark_learned(PracticeMode::Quiz, &other).unwrap();
    let writing = app.repository.lesson("les1").unwrap().cards[0].clone();
    app.ledger
        .mark_learned(PracticeMode::Writing, &writing)
        .unwrap();

    app.start_session_at(PracticeMode::Quiz, "les1", t0()).unwrap();
    for _ in 0..2 {
        answer_quiz_correctly(&mut app);
        app.advance().unwrap();
    }
    assert_eq!(app.ledger.learned_count(PracticeMode::Quiz, "les1"), 2);

    assert_eq!(app.restart().unwrap(), Advance::Next);
    assert_eq!(app.ledger.learned_count(PracticeMode::Quiz, "les1"), 0);
    assert_eq!(app.ledger.learned_count(PracticeMode::Quiz, "les2"), 1);
    assert_eq!(app.ledger.learned_count(PracticeMode::Writing, "les1"), 1);
}

#[test]
fn repeat_keeps_progress_and_refills_lives() {
    let dir = TempDir::new().unwrap();
    let config = Config {
        matching_chunk_size: 3,
        ..Config::default()
    };
    let mut app = open_app(dir.path(), config);
    add_numbered_lesson(&mut app, "les1", 3);
    app.start_session_at(PracticeMode::Matching, "les1", t0())
        .unwrap();

    let board = matching_board(&app);
    app.answer_at(
        Response::Pair {
            left: board[0].clone(),
            right: board[1].clone(),
        },
        t0(),
    )
    .unwrap();
    for key in &board[1..] {
        app.answer_at(
            Response::Pair {
                left: key.clone(),
                right: key.clone(),
            },
            t0(),
        )
        .unwrap();
    }
    assert_eq!(app.lives.count(), 2);

    assert_eq!(app.repeat().unwrap(), Advance::Next);
    assert_eq!(app.lives.count(), 3);
    assert_eq!(app.ledger.learned_count(PracticeMode::Matching, "les1"), 2);
    assert_eq!(app.session().unwrap().round_words().len(), 1);
}
