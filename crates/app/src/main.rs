use std::fmt;

use chrono::{DateTime, Utc};
use course_core::model::{Answers, CourseId, LessonId, QuizId, UserId};
use serde::Serialize;
use services::{AppServices, Clock};
use tracing_subscriber::{EnvFilter, fmt as log_fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, PartialEq, Eq)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingFlag { flag: &'static str },
    UnknownArg(String),
    UnknownCommand(String),
    InvalidId { flag: &'static str, raw: String },
    InvalidAnswers { raw: String },
    InvalidDbUrl { raw: String },
    InvalidStarted { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingFlag { flag } => write!(f, "{flag} is required for this command"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::UnknownCommand(cmd) => write!(f, "unknown subcommand: {cmd}"),
            ArgsError::InvalidId { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidAnswers { raw } => {
                write!(f, "invalid --answers value (expected 0=1,1=0): {raw}")
            }
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidStarted { raw } => {
                write!(f, "invalid --started value (expected RFC3339): {raw}")
            }
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn parse_id<T: std::str::FromStr>(flag: &'static str, raw: String) -> Result<T, ArgsError> {
    raw.parse().map_err(|_| ArgsError::InvalidId { flag, raw })
}

fn required<T>(value: Option<T>, flag: &'static str) -> Result<T, ArgsError> {
    value.ok_or(ArgsError::MissingFlag { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- watch    --course <id> --lesson <id> [--user <id>]");
    eprintln!("  cargo run -p app -- progress --course <id> [--user <id>]");
    eprintln!("  cargo run -p app -- learning [--user <id>]");
    eprintln!("  cargo run -p app -- grade    --quiz <id> --answers 0=1,1=0 [--started <rfc3339>]");
    eprintln!("  cargo run -p app -- stats    --quiz <id>");
    eprintln!();
    eprintln!("Common options:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite://dev.sqlite3)");
    eprintln!("  --user <id>               Learner id (default: 1)");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  COURSE_DB_URL, COURSE_USER_ID, RUST_LOG (default: info)");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Watch,
    Progress,
    Learning,
    Grade,
    Stats,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "watch" => Some(Self::Watch),
            "progress" => Some(Self::Progress),
            "learning" => Some(Self::Learning),
            "grade" => Some(Self::Grade),
            "stats" => Some(Self::Stats),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Args {
    command: Command,
    db_url: String,
    user_id: UserId,
    course_id: Option<CourseId>,
    lesson_id: Option<LessonId>,
    quiz_id: Option<QuizId>,
    answers: Answers,
    started_at: Option<DateTime<Utc>>,
}

impl Args {
    /// Parse a subcommand and its flags. `db_url` and `user_id` arrive
    /// pre-filled from the environment.
    fn parse(
        mut args: impl Iterator<Item = String>,
        db_url: String,
        user_id: UserId,
    ) -> Result<Self, ArgsError> {
        let first = args.next().ok_or(ArgsError::UnknownCommand(String::new()))?;
        let command =
            Command::from_arg(&first).ok_or_else(|| ArgsError::UnknownCommand(first.clone()))?;

        let mut parsed = Self {
            command,
            db_url,
            user_id,
            course_id: None,
            lesson_id: None,
            quiz_id: None,
            answers: Answers::new(),
            started_at: None,
        };

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    parsed.db_url = normalize_sqlite_url(value);
                }
                "--user" => {
                    parsed.user_id = parse_id("--user", require_value(&mut args, "--user")?)?;
                }
                "--course" => {
                    let value = require_value(&mut args, "--course")?;
                    parsed.course_id = Some(parse_id("--course", value)?);
                }
                "--lesson" => {
                    let value = require_value(&mut args, "--lesson")?;
                    parsed.lesson_id = Some(parse_id("--lesson", value)?);
                }
                "--quiz" => {
                    let value = require_value(&mut args, "--quiz")?;
                    parsed.quiz_id = Some(parse_id("--quiz", value)?);
                }
                "--answers" => {
                    let value = require_value(&mut args, "--answers")?;
                    parsed.answers = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidAnswers { raw: value.clone() })?;
                }
                "--started" => {
                    let value = require_value(&mut args, "--started")?;
                    let started = DateTime::parse_from_rfc3339(&value)
                        .map_err(|_| ArgsError::InvalidStarted { raw: value.clone() })?
                        .with_timezone(&Utc);
                    parsed.started_at = Some(started);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        match parsed.command {
            Command::Watch => {
                required(parsed.course_id, "--course")?;
                required(parsed.lesson_id, "--lesson")?;
            }
            Command::Progress => {
                required(parsed.course_id, "--course")?;
            }
            Command::Grade | Command::Stats => {
                required(parsed.quiz_id, "--quiz")?;
            }
            Command::Learning => {}
        }

        Ok(parsed)
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // stdout carries JSON results; logs go to stderr.
    tracing_subscriber::registry()
        .with(filter)
        .with(
            log_fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let db_url = std::env::var("COURSE_DB_URL")
        .ok()
        .map_or_else(|| "sqlite://dev.sqlite3".into(), normalize_sqlite_url);
    let user_id = std::env::var("COURSE_USER_ID")
        .ok()
        .and_then(|value| value.parse::<UserId>().ok())
        .unwrap_or(UserId::new(1));

    let argv: Vec<String> = std::env::args().skip(1).collect();
    if argv.is_empty() || matches!(argv[0].as_str(), "--help" | "-h") {
        print_usage();
        return Ok(());
    }

    let args = Args::parse(argv.into_iter(), db_url, user_id).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    prepare_sqlite_file(&args.db_url)?;
    let app = AppServices::new_sqlite(&args.db_url, Clock::default()).await?;
    tracing::debug!(db = %args.db_url, command = ?args.command, "storage ready");

    match args.command {
        Command::Watch => {
            let course_id = required(args.course_id, "--course")?;
            let lesson_id = required(args.lesson_id, "--lesson")?;
            let snapshot = app
                .progress()
                .record_watch_event(args.user_id, course_id, lesson_id)
                .await?;
            print_json(&snapshot)
        }
        Command::Progress => {
            let course_id = required(args.course_id, "--course")?;
            let snapshot = app.progress().get_progress(args.user_id, course_id).await?;
            print_json(&snapshot)
        }
        Command::Learning => {
            let all = app.progress().my_learning(args.user_id).await?;
            print_json(&all)
        }
        Command::Grade => {
            let quiz_id = required(args.quiz_id, "--quiz")?;
            let started_at = args.started_at.unwrap_or_else(Utc::now);
            let graded = app
                .quizzes()
                .submit_attempt(args.user_id, quiz_id, args.answers, started_at)
                .await?;
            print_json(&graded)
        }
        Command::Stats => {
            let quiz_id = required(args.quiz_id, "--quiz")?;
            let stats = app.quizzes().quiz_stats(quiz_id).await?;
            print_json(&stats)
        }
    }
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        tracing::error!("{err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Result<Args, ArgsError> {
        Args::parse(
            argv.iter().map(|s| (*s).to_string()),
            "sqlite://test.sqlite3".into(),
            UserId::new(1),
        )
    }

    #[test]
    fn watch_requires_course_and_lesson() {
        let args = parse(&["watch", "--course", "3", "--lesson", "12", "--user", "9"]).unwrap();
        assert_eq!(args.command, Command::Watch);
        assert_eq!(args.course_id, Some(CourseId::new(3)));
        assert_eq!(args.lesson_id, Some(LessonId::new(12)));
        assert_eq!(args.user_id, UserId::new(9));

        assert_eq!(
            parse(&["watch", "--course", "3"]).unwrap_err(),
            ArgsError::MissingFlag { flag: "--lesson" }
        );
    }

    #[test]
    fn grade_parses_answers() {
        let args = parse(&["grade", "--quiz", "1", "--answers", "0=1,1=0"]).unwrap();
        assert_eq!(args.answers, Answers::new().with(0, 1).with(1, 0));
        assert!(args.started_at.is_none());

        assert!(matches!(
            parse(&["grade", "--quiz", "1", "--answers", "zero"]),
            Err(ArgsError::InvalidAnswers { .. })
        ));
    }

    #[test]
    fn rejects_unknown_input() {
        assert!(matches!(
            parse(&["launch"]),
            Err(ArgsError::UnknownCommand(_))
        ));
        assert!(matches!(
            parse(&["stats", "--quiz", "1", "--verbose"]),
            Err(ArgsError::UnknownArg(_))
        ));
        assert!(matches!(
            parse(&["progress", "--course", "abc"]),
            Err(ArgsError::InvalidId { flag: "--course", .. })
        ));
        assert_eq!(
            parse(&["stats", "--quiz"]).unwrap_err(),
            ArgsError::MissingValue { flag: "--quiz" }
        );
    }

    #[test]
    fn relative_db_paths_become_absolute_urls() {
        assert_eq!(
            normalize_sqlite_url("sqlite://already.db".into()),
            "sqlite://already.db"
        );
        let url = normalize_sqlite_url("sqlite:local.db".into());
        assert!(url.starts_with("sqlite:///"));
        assert!(url.ends_with("local.db"));
    }
}
