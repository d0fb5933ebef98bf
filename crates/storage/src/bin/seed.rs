use std::fmt;

use chrono::{DateTime, Duration, Utc};
use storage::repository::{Storage, StorageError};
use survey_core::model::{Question, QuestionId, Token, TokenRecord};

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    tokens: u32,
    prefix: char,
    group: Option<String>,
    expiry_days: u32,
    now: Option<DateTime<Utc>>,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidTokens { raw: String },
    InvalidPrefix { raw: String },
    InvalidExpiryDays { raw: String },
    InvalidDbUrl { raw: String },
    InvalidNow { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidTokens { raw } => write!(f, "invalid --tokens value: {raw}"),
            ArgsError::InvalidPrefix { raw } => {
                write!(f, "invalid --prefix value (expected one letter A-Z): {raw}")
            }
            ArgsError::InvalidExpiryDays { raw } => write!(f, "invalid --expiry-days value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidNow { raw } => {
                write!(f, "invalid --now value (expected RFC3339): {raw}")
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

fn parse_prefix(raw: &str) -> Result<char, ArgsError> {
    let mut chars = raw.trim().chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_alphabetic() => Ok(c.to_ascii_uppercase()),
        _ => Err(ArgsError::InvalidPrefix {
            raw: raw.to_owned(),
        }),
    }
}

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url =
            std::env::var("SURVEY_DB_URL").unwrap_or_else(|_| "sqlite:dev.sqlite3".into());
        let mut tokens = std::env::var("SURVEY_SEED_TOKENS")
            .ok()
            .and_then(|value| value.parse::<u32>().ok())
            .unwrap_or(5);
        let mut prefix = 'A';
        let mut group = std::env::var("SURVEY_SEED_GROUP").ok();
        let mut expiry_days = std::env::var("SURVEY_TOKEN_EXPIRY_DAYS")
            .ok()
            .and_then(|value| value.parse::<u32>().ok())
            .unwrap_or(365);
        let mut now: Option<DateTime<Utc>> = None;

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
                "--tokens" => {
                    let value = require_value(&mut args, "--tokens")?;
                    tokens = value
                        .parse::<u32>()
                        .ok()
                        .filter(|n| *n <= 9999)
                        .ok_or_else(|| ArgsError::InvalidTokens { raw: value.clone() })?;
                }
                "--prefix" => {
                    let value = require_value(&mut args, "--prefix")?;
                    prefix = parse_prefix(&value)?;
                }
                "--group" => {
                    let value = require_value(&mut args, "--group")?;
                    group = Some(value);
                }
                "--expiry-days" => {
                    let value = require_value(&mut args, "--expiry-days")?;
                    expiry_days = value
                        .parse::<u32>()
                        .ok()
                        .filter(|n| *n > 0)
                        .ok_or_else(|| ArgsError::InvalidExpiryDays { raw: value.clone() })?;
                }
                "--now" => {
                    let value = require_value(&mut args, "--now")?;
                    let parsed = DateTime::parse_from_rfc3339(&value)
                        .map_err(|_| ArgsError::InvalidNow { raw: value.clone() })?
                        .with_timezone(&Utc);
                    now = Some(parsed);
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
            tokens,
            prefix,
            group,
            expiry_days,
            now,
        })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p storage --bin seed -- [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite:dev.sqlite3)");
    eprintln!("  --tokens <n>              Number of participant tokens to issue (default: 5)");
    eprintln!("  --prefix <letter>         Token letter (default: A)");
    eprintln!("  --group <label>           Study group for issued tokens");
    eprintln!("  --expiry-days <n>         Token lifetime in days (default: 365)");
    eprintln!("  --now <rfc3339>           Fixed current time for deterministic seeding");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Environment (same as flags):");
    eprintln!(
        "  SURVEY_DB_URL, SURVEY_SEED_TOKENS, SURVEY_SEED_GROUP, SURVEY_TOKEN_EXPIRY_DAYS"
    );
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let storage = Storage::sqlite(&args.db_url).await?;
    let now = args.now.unwrap_or_else(Utc::now);
    let expires_at = now + Duration::days(i64::from(args.expiry_days));

    let mut issued = 0_u32;
    for n in 1..=args.tokens {
        let token = Token::parse(&format!("{}{n:04}", args.prefix))?;
        let record = TokenRecord::new(token.clone(), None, args.group.clone(), now, expires_at)?;
        match storage.tokens.insert_token(&record).await {
            Ok(()) => {
                issued += 1;
                println!("issued {token}");
            }
            Err(StorageError::Conflict) => println!("skipped {token} (exists)"),
            Err(err) => return Err(err.into()),
        }
    }

    let samples = [
        (1, "How rested do you feel today?", "Week 1", "Sleep"),
        (2, "Which activities did you try?", "Week 1", "Movement"),
        (3, "What got in the way this week?", "Week 2", "Reflection"),
    ];
    for (id, title, parent, module) in samples {
        let question = Question::new(QuestionId::new(id), title).in_module(parent, module);
        storage.questions.upsert_question(&question).await?;
    }

    println!(
        "Seeded {} tokens and {} questions into {}",
        issued,
        samples.len(),
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
