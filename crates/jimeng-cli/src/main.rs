use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use jimeng_client::history::{image_urls, wait_for_history};
use jimeng_client::{JimengClient, connect, fetch_credit, receive_credit};
use jimeng_core::config::{ClientConfig, PollingConfig};
use jimeng_core::error::AppError;
use jimeng_core::job::JobKind;
use jimeng_core::models::Method;
use jimeng_core::signature::{self, Credentials, SignatureContext, SigningScope};

#[derive(Parser)]
#[command(name = "jimeng", version, about = "Signed, retrying client for Jimeng generation jobs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct CredentialArgs {
    /// Access key id
    #[arg(long, env = "JIMENG_ACCESS_KEY_ID")]
    access_key_id: String,

    /// Secret access key
    #[arg(long, env = "JIMENG_SECRET_ACCESS_KEY", hide_env_values = true)]
    secret_access_key: String,

    /// Optional session token
    #[arg(long, env = "JIMENG_SESSION_TOKEN", hide_env_values = true)]
    session_token: Option<String>,
}

impl CredentialArgs {
    fn credentials(&self) -> Credentials {
        let credentials = Credentials::new(&self.access_key_id, &self.secret_access_key);
        match &self.session_token {
            Some(token) if !token.trim().is_empty() => credentials.with_session_token(token),
            _ => credentials,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum HttpMethod {
    Get,
    Post,
}

impl From<HttpMethod> for Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => Method::Get,
            HttpMethod::Post => Method::Post,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print the signed headers for a request
    Sign {
        #[arg(short, long, value_enum, default_value = "get")]
        method: HttpMethod,

        /// Full request URL, including the query string
        #[arg(short, long)]
        url: String,

        /// Request body (POST only)
        #[arg(short, long)]
        payload: Option<String>,

        /// x-amz-date token, e.g. 20240101T000000Z (defaults to now)
        #[arg(short, long)]
        date: Option<String>,

        /// Credential scope region
        #[arg(long, default_value = "cn-north-1")]
        scope_region: String,

        /// Credential scope service
        #[arg(long, default_value = "imagex")]
        scope_service: String,

        #[command(flatten)]
        credentials: CredentialArgs,
    },

    /// Wait for a submitted generation job and print its result
    Poll {
        /// History id returned by the submission
        #[arg(long)]
        history_id: String,

        /// Job kind, selects the polling defaults
        #[arg(short, long, default_value = "image")]
        kind: JobKind,

        #[command(flatten)]
        credentials: CredentialArgs,
    },

    /// Show the account's credit balance
    Credit {
        /// Collect today's credit grant first
        #[arg(long, default_value_t = false)]
        receive: bool,

        #[command(flatten)]
        credentials: CredentialArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("jimeng=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let name = match &cli.command {
        Commands::Sign { .. } => "sign",
        Commands::Poll { .. } => "poll",
        Commands::Credit { .. } => "credit",
    };

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, cancelling");
            trigger.cancel();
        }
    });

    let outcome = match cli.command {
        Commands::Sign {
            method,
            url,
            payload,
            date,
            scope_region,
            scope_service,
            credentials,
        } => cmd_sign(
            method.into(),
            &url,
            payload.as_deref(),
            date,
            SigningScope {
                region: scope_region,
                service: scope_service,
            },
            &credentials.credentials(),
        ),
        Commands::Poll {
            history_id,
            kind,
            credentials,
        } => cmd_poll(&history_id, kind, &credentials.credentials(), &cancel).await,
        Commands::Credit {
            receive,
            credentials,
        } => cmd_credit(receive, &credentials.credentials(), &cancel).await,
    };

    if let Err(e) = &outcome {
        report_failure(e);
    }
    outcome.with_context(|| format!("jimeng {name} failed"))
}

fn report_failure(e: &AppError) {
    let category = e.category();
    tracing::error!(%category, code = e.code().as_deref().unwrap_or("-"), "{e}");
    if let Some(hint) = category.hint() {
        eprintln!("hint: {hint}");
    }
}

fn client() -> Result<JimengClient, AppError> {
    let config = ClientConfig::from_env()?;
    tracing::debug!(region = %config.region, "Client configured");
    connect(config)
}

fn print_json(value: &impl serde::Serialize) -> Result<(), AppError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_sign(
    method: Method,
    url: &str,
    payload: Option<&str>,
    date: Option<String>,
    scope: SigningScope,
    credentials: &Credentials,
) -> Result<(), AppError> {
    let date = date.unwrap_or_else(|| signature::amz_date(Utc::now()));
    let headers = vec![(signature::DATE_HEADER.to_string(), date)];
    let ctx = SignatureContext {
        method,
        url,
        headers: &headers,
        credentials,
        payload,
        scope: &scope,
    };

    let signed: serde_json::Map<String, serde_json::Value> = signature::signed_headers(&ctx)?
        .into_iter()
        .map(|(name, value)| (name, serde_json::Value::String(value)))
        .collect();
    print_json(&signed)
}

async fn cmd_poll(
    history_id: &str,
    kind: JobKind,
    credentials: &Credentials,
    cancel: &CancellationToken,
) -> Result<(), AppError> {
    let client = client()?;
    let config = PollingConfig::from_env(kind)?;

    let (result, record) = wait_for_history(&client, credentials, history_id, config, cancel).await?;

    print_json(&serde_json::json!({
        "result": result,
        "degraded": result.is_degraded(),
        "image_urls": image_urls(&record),
        "record": record,
    }))
}

async fn cmd_credit(
    receive: bool,
    credentials: &Credentials,
    cancel: &CancellationToken,
) -> Result<(), AppError> {
    let client = client()?;

    let receipt = if receive {
        Some(receive_credit(&client, credentials, cancel).await?)
    } else {
        None
    };
    let credit = fetch_credit(&client, credentials, cancel).await?;

    print_json(&serde_json::json!({
        "credit": credit,
        "received": receipt,
    }))
}
