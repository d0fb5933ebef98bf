use std::fmt;

use server::Config;
use services::{Authority, Clock};
use survey_core::model::Token;
use tracing::info;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingToken,
    UnknownArg(String),
    InvalidPort { raw: String },
    InvalidExpiryDays { raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingToken => write!(f, "a token is required"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidPort { raw } => write!(f, "invalid --port value: {raw}"),
            ArgsError::InvalidExpiryDays { raw } => write!(f, "invalid --expiry-days value: {raw}"),
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

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- serve [--db <sqlite_url>] [--port <port>]");
    eprintln!(
        "  cargo run -p app -- token add <ID> [--owner <name>] [--group <label>] [--expiry-days <n>]"
    );
    eprintln!("  cargo run -p app -- token deactivate <ID>");
    eprintln!("  cargo run -p app -- token stats");
    eprintln!();
    eprintln!("Common options: --db <sqlite_url>");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  SURVEY_DB_URL, SURVEY_PORT, SURVEY_HOME_URL, SURVEY_LOGIN_URL,");
    eprintln!("  SURVEY_STRUCTURED_API, SURVEY_TOKEN_EXPIRY_DAYS, RUST_LOG");
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Serve,
    AddToken {
        token: String,
        owner: Option<String>,
        group: Option<String>,
        expiry_days: Option<u32>,
    },
    DeactivateToken {
        token: String,
    },
    TokenStats,
}

struct Args {
    config: Config,
    command: Command,
}

impl Args {
    fn parse(argv: Vec<String>) -> Result<Self, ArgsError> {
        let mut config = Config::load();
        let mut iter = argv.into_iter().peekable();

        let first = iter.peek().cloned();
        let mut command = match first.as_deref() {
            None => Command::Serve,
            Some(first) if first.starts_with("--") => Command::Serve,
            Some("serve") => {
                iter.next();
                Command::Serve
            }
            Some("token") => {
                iter.next();
                let action = iter.next().ok_or(ArgsError::MissingValue { flag: "token" })?;
                match action.as_str() {
                    "add" => Command::AddToken {
                        token: iter.next().ok_or(ArgsError::MissingToken)?,
                        owner: None,
                        group: None,
                        expiry_days: None,
                    },
                    "deactivate" => Command::DeactivateToken {
                        token: iter.next().ok_or(ArgsError::MissingToken)?,
                    },
                    "stats" => Command::TokenStats,
                    _ => return Err(ArgsError::UnknownArg(action)),
                }
            }
            Some(other) => return Err(ArgsError::UnknownArg(other.to_owned())),
        };

        while let Some(arg) = iter.next() {
            match (arg.as_str(), &mut command) {
                ("--db", _) => {
                    let value = require_value(&mut iter, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    config.db_url = value;
                }
                ("--port", Command::Serve) => {
                    let value = require_value(&mut iter, "--port")?;
                    config.port = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidPort { raw: value.clone() })?;
                }
                ("--owner", Command::AddToken { owner, .. }) => {
                    *owner = Some(require_value(&mut iter, "--owner")?);
                }
                ("--group", Command::AddToken { group, .. }) => {
                    *group = Some(require_value(&mut iter, "--group")?);
                }
                ("--expiry-days", Command::AddToken { expiry_days, .. }) => {
                    let value = require_value(&mut iter, "--expiry-days")?;
                    let days = value
                        .parse::<u32>()
                        .ok()
                        .filter(|n| *n > 0)
                        .ok_or_else(|| ArgsError::InvalidExpiryDays { raw: value.clone() })?;
                    *expiry_days = Some(days);
                }
                ("--help" | "-h", _) => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        config.db_url = normalize_sqlite_url(config.db_url);
        Ok(Self { config, command })
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

fn prepare_sqlite_file(db_url: &str) -> Result<(), BoxError> {
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

fn parse_token(raw: &str) -> Result<Token, BoxError> {
    Ok(Token::parse(&Token::normalize_input(raw))?)
}

async fn run() -> Result<(), BoxError> {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    if matches!(argv.first().map(String::as_str), Some("--help" | "-h")) {
        print_usage();
        return Ok(());
    }

    server::init_tracing();
    let Args { config, command } = Args::parse(argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    prepare_sqlite_file(&config.db_url)?;

    if command == Command::Serve {
        return server::serve(config).await;
    }

    let authority = Authority::sqlite(&config.db_url, Clock::default_clock()).await?;
    let tokens = authority.tokens();
    match command {
        Command::Serve => {}
        Command::AddToken {
            token,
            owner,
            group,
            expiry_days,
        } => {
            let token = parse_token(&token)?;
            let days = expiry_days.unwrap_or(config.token_expiry_days);
            let record = tokens.issue(token, owner, group, days).await?;
            info!(token = %record.token(), "token issued");
            println!(
                "issued {} (expires {})",
                record.token(),
                record.expires_at().to_rfc3339()
            );
        }
        Command::DeactivateToken { token } => {
            let token = parse_token(&token)?;
            tokens.deactivate(&token).await?;
            println!("deactivated {token}");
        }
        Command::TokenStats => {
            let stats = tokens.stats().await?;
            println!("total:    {}", stats.total);
            println!("active:   {}", stats.active);
            println!("used:     {}", stats.used);
            println!("expired:  {}", stats.expired);
            println!("logins:   {}", stats.total_logins);
            match stats.average_logins {
                Some(avg) => println!("average:  {avg:.2}"),
                None => println!("average:  -"),
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
