use std::fmt;

use learn_core::model::{ActivityId, ActivityResult, ModuleId, Percentage, Progress, UserId};
use learn_core::summarize;
use services::{AppServices, Clock, ProgressStore};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingArgument { name: &'static str },
    UnknownArg(String),
    InvalidUserId { raw: String },
    InvalidDbUrl { raw: String },
    InvalidNumber { name: &'static str, raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingArgument { name } => write!(f, "missing <{name}>"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidUserId { raw } => write!(f, "invalid --user value: {raw:?}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidNumber { name, raw } => write!(f, "invalid <{name}> value: {raw}"),
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
    eprintln!("  cargo run -p app -- show       [--db <sqlite_url>] [--user <id>]");
    eprintln!("  cargo run -p app -- record     <module> <activity> <score> [--incomplete]");
    eprintln!("  cargo run -p app -- points     <delta>");
    eprintln!("  cargo run -p app -- set-module <module> <percentage>   # legacy override");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite:dev.sqlite3");
    eprintln!("  --user local");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  LEARN_DB_URL, LEARN_USER_ID, RUST_LOG");
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Show,
    Record {
        module: ModuleId,
        activity: ActivityId,
        score: u32,
        completed: bool,
    },
    Points {
        delta: u32,
    },
    SetModule {
        module: ModuleId,
        percentage: u32,
    },
}

#[derive(Debug)]
struct Args {
    db_url: String,
    user: UserId,
    command: Command,
}

fn parse_number(name: &'static str, raw: &str) -> Result<u32, ArgsError> {
    raw.parse().map_err(|_| ArgsError::InvalidNumber {
        name,
        raw: raw.to_string(),
    })
}

impl Args {
    fn parse(
        args: impl IntoIterator<Item = String>,
        env_db: Option<String>,
        env_user: Option<String>,
    ) -> Result<Self, ArgsError> {
        let mut db_url = normalize_sqlite_url(env_db.unwrap_or_else(|| "sqlite:dev.sqlite3".into()));
        let mut user = env_user
            .and_then(|raw| raw.parse::<UserId>().ok())
            .unwrap_or_else(|| UserId::new("local"));
        let mut completed = true;
        let mut positional: Vec<String> = Vec::new();

        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--user" => {
                    let value = require_value(&mut args, "--user")?;
                    user = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidUserId { raw: value.clone() })?;
                }
                "--incomplete" => completed = false,
                flag if flag.starts_with("--") => return Err(ArgsError::UnknownArg(arg)),
                _ => positional.push(arg),
            }
        }

        let mut positional = positional.into_iter();
        let mut next =
            |name: &'static str| positional.next().ok_or(ArgsError::MissingArgument { name });

        let command = match next("command")?.as_str() {
            "show" => Command::Show,
            "record" => Command::Record {
                module: ModuleId::new(next("module")?),
                activity: ActivityId::new(next("activity")?),
                score: parse_number("score", &next("score")?)?,
                completed,
            },
            "points" => Command::Points {
                delta: parse_number("delta", &next("delta")?)?,
            },
            "set-module" => Command::SetModule {
                module: ModuleId::new(next("module")?),
                percentage: parse_number("percentage", &next("percentage")?)?,
            },
            other => return Err(ArgsError::UnknownArg(other.to_string())),
        };
        if let Some(extra) = positional.next() {
            return Err(ArgsError::UnknownArg(extra));
        }

        Ok(Self {
            db_url,
            user,
            command,
        })
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

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn print_progress(store: &ProgressStore, progress: &Progress) {
    let summary = summarize(progress, store.catalog());
    println!(
        "points {}  streak {} (best {})  last activity {}",
        progress.points,
        progress.current_streak,
        progress.best_streak,
        progress
            .last_activity_date
            .map_or_else(|| "never".to_string(), |d| d.to_string()),
    );
    println!(
        "overall {}% ({}/{} activities, average score {})",
        summary.overall.value(),
        summary.completed_activities,
        summary.total_activities,
        summary.average_score,
    );
    for module in store.catalog().modules() {
        println!(
            "  {:<12} {:>3}%",
            module.id().as_str(),
            progress.module_percentage(module.id()).value()
        );
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    if argv.is_empty() || argv.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let parsed = Args::parse(
        argv,
        std::env::var("LEARN_DB_URL").ok(),
        std::env::var("LEARN_USER_ID").ok(),
    )
    .map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    // Open + migrate SQLite at startup. Keep this in the binary glue so core/services stay pure.
    prepare_sqlite_file(&parsed.db_url)?;
    let services = AppServices::new_sqlite(&parsed.db_url, Clock::default_clock()).await?;
    let store = services.progress();
    store.attach(parsed.user.clone()).await?;

    let progress = match parsed.command {
        Command::Show => store.snapshot(),
        Command::Record {
            module,
            activity,
            score,
            completed,
        } => {
            let result = ActivityResult::new(completed, score)?;
            store
                .record_activity_result(&module, &activity, result)
                .await?
        }
        Command::Points { delta } => store.add_points(delta).await?,
        Command::SetModule { module, percentage } => {
            let percentage = Percentage::new(percentage)?;
            #[allow(deprecated)]
            store.set_module_percentage(&module, percentage).await?
        }
    };

    print_progress(&store, &progress);
    store.detach();
    Ok(())
}

#[tokio::main]
async fn main() {
    setup_logging();
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
