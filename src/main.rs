//! Purpose: `qdtk` CLI entry point.
//! Role: Binary crate root; parses args, builds the gateway client, runs commands.
//! Invariants: Export data goes to stdout or the output file; diagnostics go to stderr only.
//! Invariants: Non-interactive errors and notices are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
#![allow(clippy::result_large_err)]
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum, ValueHint, error::ErrorKind as ClapErrorKind};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use std::error::Error as StdError;
use tracing_subscriber::EnvFilter;

mod command_dispatch;

use qdtk::api::{
    ClientOptions, DEFAULT_SCAN_LIMIT, DEFAULT_TIMEOUT, Error, ErrorKind, RemoteClient,
    RetryPolicy, to_exit_code,
};
use qdtk::notice::{Notice, notice_json};

const LOG_ENV: &str = "QDTK_LOG";
const MAX_BODY_CHARS: usize = 2_048;

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err((err, color_mode)) => {
            emit_error(&err, color_mode);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, (Error, ColorMode)> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    (
                        Error::new(ErrorKind::Io)
                            .with_message("failed to write help")
                            .with_source(io_err),
                        ColorMode::Auto,
                    )
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                let message = clap_error_summary(&err);
                let hint = clap_error_hint(&err);
                return Err((
                    Error::new(ErrorKind::Usage)
                        .with_message(message)
                        .with_hint(hint),
                    ColorMode::Auto,
                ));
            }
        },
    };

    init_tracing(cli.debug);
    let color_mode = cli.color;
    command_dispatch::dispatch_command(cli.command, cli.connection, color_mode)
        .map_err(|err| (err, color_mode))
}

#[derive(Parser)]
#[command(
    name = "qdtk",
    version,
    about = "Qdrant toolkit: list, dump, and search data in Qdrant vector databases",
    long_about = None,
    after_help = r#"EXAMPLES
  $ qdtk --url http://localhost:6333 list
  $ qdtk --url http://localhost:6333 dump -c docs -o docs.jsonl
  $ qdtk --url http://localhost:6333 dump -c all -p > payloads.jsonl
  $ qdtk --url http://localhost:6333 search -c docs -q invoice -f title

NOTES
  - Dumps are JSON Lines: one object per point, never an enclosing array
  - The API key may also be supplied via QDRANT_API_KEY
  - Set QDTK_LOG=debug (or pass --debug) to trace HTTP requests on stderr"#,
    arg_required_else_help = true
)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,
    #[arg(short = 'd', long, global = true, help = "Debug logging on stderr")]
    debug: bool,
    #[arg(
        long,
        global = true,
        default_value = "auto",
        value_enum,
        help = "Colorize stderr diagnostics: auto|always|never"
    )]
    color: ColorMode,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Clone, Debug)]
struct ConnectionArgs {
    #[arg(
        long,
        global = true,
        env = "QDRANT_URL",
        help = "Qdrant URL (e.g. https://qdrant.example.com or http://host:6333)",
        value_hint = ValueHint::Url
    )]
    url: Option<String>,
    #[arg(
        long = "api-key",
        global = true,
        env = "QDRANT_API_KEY",
        hide_env_values = true,
        help = "API key sent as the `api-key` header",
        help_heading = "Auth/TLS"
    )]
    api_key: Option<String>,
    #[arg(
        long = "api-key-file",
        global = true,
        value_name = "PATH",
        help = "Read the API key from a file",
        value_hint = ValueHint::FilePath,
        help_heading = "Auth/TLS"
    )]
    api_key_file: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        value_name = "DURATION",
        help = "Per-request timeout (e.g. 500ms, 30s, 2m; default 30s)"
    )]
    timeout: Option<String>,
    #[arg(
        long = "tls-ca",
        global = true,
        value_name = "PATH",
        help = "Trust this PEM CA/certificate for TLS",
        value_hint = ValueHint::FilePath,
        help_heading = "Auth/TLS"
    )]
    tls_ca: Option<PathBuf>,
    #[arg(
        long = "tls-skip-verify",
        global = true,
        help = "Disable TLS certificate verification (unsafe)",
        help_heading = "Auth/TLS"
    )]
    tls_skip_verify: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    fn use_color(self, is_tty: bool) -> bool {
        match self {
            ColorMode::Auto => is_tty,
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    #[command(
        about = "List collections",
        after_help = r#"EXAMPLES
  $ qdtk --url http://localhost:6333 list
  $ qdtk --url http://localhost:6333 list -v
  $ qdtk --url http://localhost:6333 list --json"#
    )]
    List {
        #[arg(short = 'v', long, help = "Show vectors, status, and segments")]
        verbose: bool,
        #[arg(long, help = "Emit JSON instead of a table")]
        json: bool,
    },
    #[command(about = "Show database statistics")]
    Stats {
        #[arg(long, help = "Emit JSON instead of a table")]
        json: bool,
    },
    #[command(
        about = "Dump collection data as JSON Lines",
        long_about = r#"Dump every point of a collection (or of all collections) as JSON Lines.

Points are streamed page by page through the scroll API; memory use stays at
one page regardless of collection size."#,
        after_help = r#"EXAMPLES
  $ qdtk --url http://localhost:6333 dump -c docs -o docs.jsonl
  $ qdtk --url http://localhost:6333 dump -c docs -l 1000 -v
  $ qdtk --url http://localhost:6333 dump -c '*' -p > payloads.jsonl

NOTES
  - Use '*' or 'all' to dump every collection, one after another
  - In all-collections mode a failing collection is reported and skipped
  - Writing to stdout implies --quiet and --no-progress
  - Timeouts are retried every --retry-delay (default 5s), without limit unless --max-retries"#
    )]
    Dump(DumpArgs),
    #[command(
        about = "Search text in collection payloads",
        long_about = r#"Scan a collection for points whose payload contains the query text.

Matching is a case-insensitive substring test over every string in the payload,
however deeply nested. Numbers and booleans never match. Without --query the
first --limit points are shown."#,
        after_help = r#"EXAMPLES
  $ qdtk --url http://localhost:6333 search -c docs -q invoice
  $ qdtk --url http://localhost:6333 search -c docs -q alpha -f tags -l 50
  $ qdtk --url http://localhost:6333 search -c docs -r"#
    )]
    Search(SearchArgs),
    #[command(about = "Generate shell completions")]
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args, Debug)]
struct DumpArgs {
    #[arg(
        short = 'c',
        long,
        help = "Collection name (use '*' or 'all' for all collections)"
    )]
    collection: String,
    #[arg(
        short = 'o',
        long = "output",
        help = "Output file (default: stdout)",
        value_hint = ValueHint::FilePath
    )]
    output: Option<PathBuf>,
    #[arg(
        short = 'l',
        long,
        default_value_t = 0,
        help = "Max points per collection (0 = unlimited)"
    )]
    limit: u64,
    #[arg(
        short = 'b',
        long = "batch-size",
        default_value_t = 100,
        help = "Points per scroll request"
    )]
    batch_size: usize,
    #[arg(short = 'v', long = "with-vectors", help = "Include vectors in output")]
    with_vectors: bool,
    #[arg(
        short = 'p',
        long = "payload-only",
        help = "Output only payloads (no metadata)"
    )]
    payload_only: bool,
    #[arg(long = "no-progress", help = "Disable progress output")]
    no_progress: bool,
    #[arg(short = 'q', long, help = "Quiet mode (errors and notices only)")]
    quiet: bool,
    #[command(flatten)]
    retry: RetryArgs,
}

#[derive(Args, Debug)]
struct SearchArgs {
    #[arg(short = 'c', long, help = "Collection name")]
    collection: String,
    #[arg(
        short = 'q',
        long,
        default_value = "",
        help = "Text to search in payloads (all string fields)"
    )]
    query: String,
    #[arg(short = 'f', long, help = "Restrict the search to one payload field")]
    field: Option<String>,
    #[arg(short = 'l', long, default_value_t = 10, help = "Max results (0 = unlimited)")]
    limit: usize,
    #[arg(
        long = "scan-limit",
        default_value_t = DEFAULT_SCAN_LIMIT,
        help = "Max points examined before giving up"
    )]
    scan_limit: u64,
    #[arg(
        short = 'b',
        long = "batch-size",
        default_value_t = 100,
        help = "Points per scroll request"
    )]
    batch_size: usize,
    #[arg(short = 'r', long, help = "Output raw JSON")]
    raw: bool,
    #[command(flatten)]
    retry: RetryArgs,
}

#[derive(Args, Debug)]
struct RetryArgs {
    #[arg(
        long = "retry-delay",
        value_name = "DURATION",
        help = "Delay before retrying a timed-out page (default 5s)"
    )]
    retry_delay: Option<String>,
    #[arg(
        long = "max-retries",
        value_name = "N",
        help = "Give up after N timeout retries (default: unlimited)"
    )]
    max_retries: Option<u32>,
}

impl RetryArgs {
    fn policy(&self) -> Result<RetryPolicy, Error> {
        let mut policy = RetryPolicy::new();
        if let Some(delay) = &self.retry_delay {
            policy = policy.with_delay(parse_duration(delay)?);
        }
        if let Some(max) = self.max_retries {
            policy = policy.with_max_retries(max);
        }
        Ok(policy)
    }
}

fn init_tracing(debug: bool) {
    let env_filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn connect(args: &ConnectionArgs) -> Result<RemoteClient, Error> {
    let Some(url) = args.url.as_deref() else {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("missing Qdrant url")
            .with_hint("Pass --url http://host:6333 or set QDRANT_URL."));
    };
    let timeout = match &args.timeout {
        Some(value) => parse_duration(value)?,
        None => DEFAULT_TIMEOUT,
    };
    let options = ClientOptions {
        timeout,
        api_key: resolve_api_key(args.api_key.clone(), args.api_key_file.as_deref())?,
        tls_ca_file: args.tls_ca.clone(),
        tls_skip_verify: args.tls_skip_verify,
    };
    RemoteClient::with_options(url, options)
}

fn read_api_key_file(path: &Path) -> Result<String, Error> {
    let raw = std::fs::read_to_string(path).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message(format!("failed to read API key file {}", path.display()))
            .with_source(err)
    })?;
    let key = raw.trim().to_string();
    if key.is_empty() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!("API key file {} is empty", path.display())));
    }
    Ok(key)
}

fn resolve_api_key(
    api_key: Option<String>,
    api_key_file: Option<&Path>,
) -> Result<Option<String>, Error> {
    if let Some(path) = api_key_file {
        return read_api_key_file(path).map(Some);
    }
    Ok(api_key.filter(|key| !key.trim().is_empty()))
}

fn parse_duration(input: &str) -> Result<Duration, Error> {
    let invalid = || {
        Error::new(ErrorKind::Usage)
            .with_message(format!("invalid duration `{input}`"))
            .with_hint("Use a number plus ms|s|m|h (e.g. 10s).")
    };
    let trimmed = input.trim();
    let split = trimmed.char_indices().find(|(_, ch)| !ch.is_ascii_digit());
    let (num_str, unit) = match split {
        Some((idx, _)) => trimmed.split_at(idx),
        None => return Err(invalid()),
    };
    if num_str.is_empty() {
        return Err(invalid());
    }
    let value: u64 = num_str.parse().map_err(|_| invalid())?;
    let millis = match unit {
        "ms" => value,
        "s" => value.saturating_mul(1_000),
        "m" => value.saturating_mul(60_000),
        "h" => value.saturating_mul(3_600_000),
        _ => return Err(invalid()),
    };
    Ok(Duration::from_millis(millis))
}

fn emit_json(value: &Value) {
    let json = if io::stdout().is_terminal() {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

fn emit_table(headers: &[&str], rows: &[Vec<String>]) {
    println!("{}", render_table(headers, rows));
}

fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    if headers.is_empty() {
        return String::new();
    }
    let mut widths = headers
        .iter()
        .map(|header| header.chars().count())
        .collect::<Vec<_>>();
    let sanitized_rows = rows
        .iter()
        .map(|row| {
            widths
                .iter_mut()
                .enumerate()
                .map(|(idx, width)| {
                    let cleaned = row
                        .get(idx)
                        .map(|value| sanitize_table_cell(value))
                        .unwrap_or_default();
                    *width = (*width).max(cleaned.chars().count());
                    cleaned
                })
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();

    let header_cells = headers.iter().map(|h| h.to_string()).collect::<Vec<_>>();
    std::iter::once(format_table_line(&header_cells, &widths))
        .chain(
            sanitized_rows
                .iter()
                .map(|row| format_table_line(row, &widths)),
        )
        .collect::<Vec<_>>()
        .join("\n")
}

fn sanitize_table_cell(value: &str) -> String {
    value.replace('\n', "\\n").replace('\r', "\\r")
}

fn format_table_line(cells: &[String], widths: &[usize]) -> String {
    let mut line = String::new();
    for (idx, width) in widths.iter().enumerate() {
        if idx > 0 {
            line.push_str("  ");
        }
        let cell = cells.get(idx).map(String::as_str).unwrap_or("");
        line.push_str(cell);
        let cell_len = cell.chars().count();
        if *width > cell_len {
            line.push_str(&" ".repeat(*width - cell_len));
        }
    }
    line.trim_end().to_string()
}

#[derive(Copy, Clone, Debug)]
enum AnsiColor {
    Red,
    Yellow,
    Green,
}

fn colorize_label(label: &str, enabled: bool, color: AnsiColor) -> String {
    if !enabled {
        return label.to_string();
    }
    let code = match color {
        AnsiColor::Red => "31",
        AnsiColor::Yellow => "33",
        AnsiColor::Green => "32",
    };
    format!("\u{1b}[{code}m{label}\u{1b}[0m")
}

fn emit_error(err: &Error, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("{}", error_text(err, color_mode.use_color(is_tty)));
        return;
    }

    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn emit_notice(notice: &Notice, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        let label = colorize_label("notice:", color_mode.use_color(is_tty), AnsiColor::Yellow);
        match &notice.collection {
            Some(collection) => eprintln!("{label} {} (collection: {collection})", notice.message),
            None => eprintln!("{label} {}", notice.message),
        }
        return;
    }

    let json = serde_json::to_string(&notice_json(notice)).unwrap_or_else(|_| {
        "{\"notice\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::Authentication => "authentication required".to_string(),
        ErrorKind::Request => "request rejected".to_string(),
        ErrorKind::Transport => "request failed".to_string(),
        ErrorKind::Timeout => "request timed out".to_string(),
        ErrorKind::Encoding => "encoding error".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
    }
}

/// Response body of a rejection that carried no Qdrant error message (e.g. a proxy page).
fn unstructured_body(err: &Error) -> Option<String> {
    let status = err.status()?;
    let body = err.body()?.trim();
    if body.is_empty() || err.message() != Some(format!("HTTP {status}").as_str()) {
        return None;
    }
    Some(body.chars().take(MAX_BODY_CHARS).collect())
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_fields(err: &Error) -> Map<String, Value> {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(collection) = err.collection() {
        inner.insert("collection".to_string(), json!(collection));
    }
    if let Some(status) = err.status() {
        inner.insert("status".to_string(), json!(status));
    }
    if let Some(body) = unstructured_body(err) {
        inner.insert("body".to_string(), json!(body));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }
    inner
}

fn error_json(err: &Error) -> Value {
    json!({ "error": Value::Object(error_fields(err)) })
}

fn error_text(err: &Error, use_color: bool) -> String {
    let mut lines = Vec::new();
    lines.push(format!(
        "{} {}",
        colorize_label("error:", use_color, AnsiColor::Red),
        error_message(err)
    ));

    if let Some(hint) = err.hint() {
        lines.push(format!(
            "{} {hint}",
            colorize_label("hint:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(collection) = err.collection() {
        lines.push(format!(
            "{} {collection}",
            colorize_label("collection:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(status) = err.status() {
        lines.push(format!(
            "{} {status}",
            colorize_label("status:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(body) = unstructured_body(err) {
        lines.push(format!(
            "{} {body}",
            colorize_label("body:", use_color, AnsiColor::Yellow)
        ));
    }

    let causes = error_causes(err);
    if let Some(cause) = causes.first() {
        lines.push(format!(
            "{} {cause}",
            colorize_label("caused by:", use_color, AnsiColor::Yellow)
        ));
    }

    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}

fn clap_error_hint(err: &clap::Error) -> String {
    let rendered = err.to_string();
    let usage = rendered
        .lines()
        .find_map(|line| line.trim().strip_prefix("Usage: "))
        .map(str::trim);
    let Some(usage) = usage else {
        return "Try `qdtk --help`.".to_string();
    };

    let tokens: Vec<&str> = usage.split_whitespace().collect();
    let Some(pos) = tokens.iter().position(|t| *t == "qdtk") else {
        return "Try `qdtk --help`.".to_string();
    };
    let parts: Vec<&str> = tokens
        .iter()
        .skip(pos + 1)
        .take_while(|token| {
            !(token.starts_with('-') || token.starts_with('<') || token.starts_with('['))
        })
        .copied()
        .collect();
    if parts.is_empty() {
        return "Try `qdtk --help`.".to_string();
    }
    format!("Try `qdtk {} --help`.", parts.join(" "))
}
