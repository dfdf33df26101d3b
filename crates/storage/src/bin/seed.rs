use std::fmt;

use course_core::model::{
    Course, CourseId, Lesson, LessonId, Percent, Question, Quiz, QuizDefinition, QuizId,
    QuizStatus, Section, SectionId,
};
use storage::repository::Storage;

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    course_id: CourseId,
    course_title: String,
    sections: u32,
    lessons_per_section: u32,
    catalog: Option<String>,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidCourseId { raw: String },
    InvalidSections { raw: String },
    InvalidLessons { raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidCourseId { raw } => write!(f, "invalid --course-id value: {raw}"),
            ArgsError::InvalidSections { raw } => write!(f, "invalid --sections value: {raw}"),
            ArgsError::InvalidLessons { raw } => write!(f, "invalid --lessons value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
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

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url =
            std::env::var("COURSE_DB_URL").unwrap_or_else(|_| "sqlite://dev.sqlite3?mode=rwc".into());
        let mut course_id = std::env::var("COURSE_ID")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .map_or_else(|| CourseId::new(1), CourseId::new);
        let mut course_title =
            std::env::var("COURSE_TITLE").unwrap_or_else(|_| "Rust from Scratch".into());
        let mut sections = 2;
        let mut lessons_per_section = 3;
        let mut catalog = None;

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = value;
                }
                "--course-id" => {
                    let value = require_value(&mut args, "--course-id")?;
                    course_id = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidCourseId { raw: value.clone() })?;
                }
                "--title" => {
                    course_title = require_value(&mut args, "--title")?;
                }
                "--sections" => {
                    let value = require_value(&mut args, "--sections")?;
                    sections = value
                        .parse::<u32>()
                        .map_err(|_| ArgsError::InvalidSections { raw: value.clone() })?;
                }
                "--lessons" => {
                    let value = require_value(&mut args, "--lessons")?;
                    lessons_per_section = value
                        .parse::<u32>()
                        .map_err(|_| ArgsError::InvalidLessons { raw: value.clone() })?;
                }
                "--catalog" => {
                    catalog = Some(require_value(&mut args, "--catalog")?);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            course_id,
            course_title,
            sections,
            lessons_per_section,
            catalog,
        })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p storage --bin seed -- [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite://dev.sqlite3?mode=rwc)");
    eprintln!("  --course-id <id>          Course id to upsert (default: 1)");
    eprintln!("  --title <text>            Course title (default: Rust from Scratch)");
    eprintln!("  --sections <n>            Number of sections (default: 2)");
    eprintln!("  --lessons <n>             Lessons per section (default: 3)");
    eprintln!("  --catalog <file.json>     Load a course from JSON instead of generating one");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Environment (same as flags):");
    eprintln!("  COURSE_DB_URL, COURSE_ID, COURSE_TITLE");
}

/// Lesson and section ids are derived from the course id so several seeded
/// courses never collide.
fn generated_course(args: &Args) -> Result<Course, course_core::Error> {
    let base = args.course_id.value() * 1_000;
    let sections = (0..args.sections)
        .map(|s| {
            let lessons = (0..args.lessons_per_section)
                .map(|l| {
                    let n = u64::from(s * args.lessons_per_section + l) + 1;
                    Lesson::new(
                        LessonId::new(base + n),
                        format!("Lesson {n}"),
                        300 + (l * 60),
                    )
                    .with_free_preview(n == 1)
                })
                .collect();
            Section::new(
                SectionId::new(base + u64::from(s) + 1),
                format!("Section {}", s + 1),
                lessons,
            )
        })
        .collect();
    Ok(Course::new(args.course_id, args.course_title.clone(), sections)?)
}

fn sample_quiz(course: &Course) -> Result<Quiz, course_core::Error> {
    let mut def = QuizDefinition::new(
        QuizId::new(course.id().value()),
        format!("{} checkpoint", course.title()),
    );
    def.lesson_id = course.lessons().last().map(|l| l.id);
    def.passing_score_percent = Percent::new(70);
    def.time_limit_minutes = Some(10);
    def.status = QuizStatus::Active;
    def.questions = vec![
        Question::single_choice(
            "Which keyword declares an immutable binding?",
            ["let", "mut", "static", "var"],
            0,
            2,
        )?,
        Question::true_false("A value can have two owners at once.", false, 1)
            .with_explanation("Each value has exactly one owner."),
        Question::single_choice(
            "What does `?` do with an `Err`?",
            ["Panics", "Returns it early", "Ignores it"],
            1,
            2,
        )?,
    ];
    Ok(Quiz::new(def)?)
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let storage = Storage::sqlite(&args.db_url).await?;

    let course = match &args.catalog {
        Some(path) => {
            let raw = std::fs::read_to_string(path)?;
            serde_json::from_str::<Course>(&raw)?
        }
        None => generated_course(&args)?,
    };
    storage.catalog.upsert_course(&course).await?;

    let quiz = sample_quiz(&course)?;
    storage.quizzes.upsert_quiz(&quiz).await?;

    println!(
        "Seeded course {} ({} lessons) and quiz {} into {}",
        course.id(),
        course.lesson_count(),
        quiz.id(),
        args.db_url
    );

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
