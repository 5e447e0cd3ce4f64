mod auth_commands;
mod media_commands;

use std::path::PathBuf;

use {
    clap::{Args, Parser, Subcommand},
    tracing::debug,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
    xurl_api::{ApiClient, RequestOptions, handle_request},
    xurl_config::XurlConfig,
    xurl_oauth::{AuthKind, Authenticator},
    xurl_store::{CredentialStore, StoreOptions},
};

#[derive(Parser)]
#[command(
    name = "xurl",
    version,
    about = "Auth enabled curl-like interface for the X API",
    args_conflicts_with_subcommands = true
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    request: RawRequestArgs,

    /// Registered app to use instead of the default one.
    #[arg(long, global = true)]
    app: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Authentication management.
    Auth {
        #[command(subcommand)]
        action: auth_commands::AuthAction,
    },
    /// Media upload operations.
    Media {
        #[command(subcommand)]
        action: media_commands::MediaAction,
    },
}

/// Flags shared by every command that talks to the API.
#[derive(Args, Debug, Clone, Default)]
pub struct RequestFlags {
    /// Request header as `Name: value`; repeatable.
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,

    /// Authentication type (oauth1, oauth2 or app).
    #[arg(long)]
    auth: Option<String>,

    /// Username for OAuth2 authentication.
    #[arg(short, long)]
    username: Option<String>,

    /// Print request and response details.
    #[arg(short, long)]
    verbose: bool,

    /// Add the trace header to requests.
    #[arg(short, long)]
    trace: bool,
}

impl RequestFlags {
    /// Request options carrying these flags, without method or endpoint.
    pub fn template(&self) -> anyhow::Result<RequestOptions> {
        Ok(RequestOptions {
            headers: self.headers.clone(),
            auth: self.auth.as_deref().unwrap_or_default().parse::<AuthKind>()?,
            username: self.username.clone().filter(|u| !u.is_empty()),
            verbose: self.verbose,
            trace: self.trace,
            ..RequestOptions::default()
        })
    }
}

#[derive(Args, Debug, Default)]
struct RawRequestArgs {
    /// Endpoint path (e.g. /2/users/me) or absolute URL.
    url: Option<String>,

    /// HTTP method.
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,

    /// Request body.
    #[arg(short, long)]
    data: Option<String>,

    /// Force streaming mode for non-streaming endpoints.
    #[arg(short, long)]
    stream: bool,

    /// File to upload with a media append request.
    #[arg(short = 'F', long)]
    file: Option<PathBuf>,

    #[command(flatten)]
    flags: RequestFlags,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    // stdout carries API output, so logs go to stderr.
    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(false),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

/// Print a JSON payload pretty-printed on stdout.
pub fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print the payload of an API error before handing the error to `main`.
pub fn report(err: xurl_common::Error) -> anyhow::Error {
    if let Some(payload) = err.api_payload()
        && let Ok(pretty) = serde_json::to_string_pretty(payload)
    {
        println!("{pretty}");
        return anyhow::anyhow!("request failed");
    }
    err.into()
}

fn open_authenticator(config: &XurlConfig) -> anyhow::Result<Authenticator> {
    let options = StoreOptions {
        client_id: config.client_id.clone(),
        client_secret: config.client_secret_str().map(str::to_string),
        twurlrc_path: Some(config.resolved_twurlrc_path()),
    };
    let store = CredentialStore::open(config.resolved_store_path(), &options)?;
    Ok(Authenticator::new(config, store))
}

async fn run_request(args: RawRequestArgs, config: &XurlConfig, auth: Authenticator) -> anyhow::Result<()> {
    let Some(url) = args.url else {
        anyhow::bail!("No URL provided. Try 'xurl --help' for more information.");
    };
    let opts = RequestOptions {
        method: args.method,
        endpoint: url,
        data: args.data.unwrap_or_default(),
        ..args.flags.template()?
    };

    let mut client = ApiClient::new(config, Some(auth))?;
    let response = handle_request(
        &mut client,
        &opts,
        args.stream,
        args.file.as_deref(),
        |line| println!("{line}"),
    )
    .await
    .map_err(report)?;

    if let Some(value) = response {
        print_json(&value)?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    debug!(version = env!("CARGO_PKG_VERSION"), "xurl starting");

    let mut config = xurl_config::discover_and_load();
    if let Some(app) = cli.app.clone().filter(|a| !a.is_empty()) {
        config.app_name = Some(app);
    }
    let auth = open_authenticator(&config)?;

    match cli.command {
        Some(Commands::Auth { action }) => auth_commands::handle_auth(action, auth).await,
        Some(Commands::Media { action }) => {
            media_commands::handle_media(action, &config, auth).await
        },
        None => run_request(cli.request, &config, auth).await,
    }
}
