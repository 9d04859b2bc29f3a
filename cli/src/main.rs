use authgate::api::{ApiClient, ApiClientError, Method, RequestOptions};
use authgate::config::{AppConfig, ConfigError, Environment, parse_base_url};
use authgate::guards::{GuardOutcome, GuestOnly, Navigator, RequireAuth, RouteGuard};
use authgate::logger::DevLogger;
use authgate::session::{Session, SessionState};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Api(#[from] ApiClientError),
    #[error("invalid HTTP method: {0}")]
    InvalidMethod(String),
    #[error("invalid query pair '{0}'; expected key=value")]
    InvalidQuery(String),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "authgate-cli", about = "Authenticated API client and route guard CLI")]
struct Cli {
    /// Overrides `API_BASE_URL`.
    #[arg(long)]
    base_url: Option<String>,

    /// Token stored in the session cookie before any request is made.
    #[arg(long, env = "AUTHGATE_SESSION_TOKEN")]
    session_token: Option<String>,

    /// Overrides `APP_ENV`.
    #[arg(long = "env")]
    environment: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send one request through the authenticated client and print the body.
    Request {
        method: String,
        path: String,
        #[arg(long, help = "JSON request body")]
        data: Option<String>,
        #[arg(long = "query", help = "Query pair key=value (repeatable)")]
        query: Vec<String>,
    },
    /// Evaluate a single guard for a path.
    Guard {
        #[arg(value_enum)]
        kind: GuardKind,
        path: String,
        #[arg(long, default_value_t = false)]
        logged_in: bool,
    },
    /// Run the application's guard pipeline for a path.
    Navigate {
        path: String,
        #[arg(long, default_value_t = false)]
        logged_in: bool,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum GuardKind {
    RequireAuth,
    GuestOnly,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            tracing::warn!(error = %e, "failed to load .env");
        }
    }

    let cli = Cli::parse();
    let config = resolve_config(&cli)?;

    match cli.command {
        Command::Request { method, path, data, query } => {
            let session = Session::new(config.environment);
            if let Some(token) = cli.session_token {
                session.restore_token(token);
            }
            run_request(&config, session, &method, &path, data.as_deref(), &query).await
        }
        Command::Guard { kind, path, logged_in } => {
            let state = state_for(logged_in);
            let outcome = match kind {
                GuardKind::RequireAuth => RequireAuth::default().check(&state, &path),
                GuardKind::GuestOnly => GuestOnly::default().check(&state, &path),
            };
            print_outcome(&outcome);
            Ok(())
        }
        Command::Navigate { path, logged_in } => {
            let outcome = app_navigator(config.environment).evaluate(&state_for(logged_in), &path);
            print_outcome(&outcome);
            Ok(())
        }
    }
}

fn resolve_config(cli: &Cli) -> Result<AppConfig, CliError> {
    let mut config = AppConfig::from_env()?;
    if let Some(raw) = &cli.base_url {
        config.api_base_url = parse_base_url(raw)?;
    }
    if let Some(raw) = &cli.environment {
        config.environment = Environment::parse(raw)?;
    }
    Ok(config)
}

async fn run_request(
    config: &AppConfig,
    session: Session,
    method: &str,
    path: &str,
    data: Option<&str>,
    query: &[String],
) -> Result<(), CliError> {
    let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .map_err(|_| CliError::InvalidMethod(method.to_owned()))?;

    let mut options = RequestOptions::new();
    if let Some(raw) = data {
        options = options.json(serde_json::from_str::<Value>(raw)?);
    }
    for pair in query {
        let Some((key, value)) = pair.split_once('=') else {
            return Err(CliError::InvalidQuery(pair.clone()));
        };
        options = options.query(key, value);
    }

    let client = ApiClient::new(config, session)?;
    let body = client.request(method, path, options).await?;
    print_json(&body)
}

/// Global auth guard everywhere; guest-only on the sign-in pages.
fn app_navigator(environment: Environment) -> Navigator {
    Navigator::new()
        .with_logger(DevLogger::new(environment))
        .with_global(RequireAuth::default())
        .with_route("/login", GuestOnly::default())
        .with_route("/signup", GuestOnly::default())
}

fn state_for(logged_in: bool) -> SessionState {
    if logged_in { SessionState::logged_in() } else { SessionState::default() }
}

fn print_outcome(outcome: &GuardOutcome) {
    match outcome {
        GuardOutcome::Allow => println!("allow"),
        GuardOutcome::Redirect(redirect) => println!("redirect {redirect}"),
    }
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
