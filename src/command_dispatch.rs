//! Purpose: Hold top-level CLI command dispatch for `qdtk`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Only dump records reach stdout when dumping to stdout; everything else is stderr.
//! Invariants: Per-collection failures in all-collections mode are notices, not errors.

use super::*;

use std::fs::File;
use std::io::{BufWriter, Write};

use clap::CommandFactory;
use qdtk::api::{
    CollectionInfo, ExportObserver, ExportOptions, ExportProgress, Gateway, Projection, Record,
    SearchOptions, export_all, export_collection, search_collection,
};
use qdtk::notice::notice_time_now;

pub(super) fn dispatch_command(
    command: Command,
    connection: ConnectionArgs,
    color_mode: ColorMode,
) -> Result<RunOutcome, Error> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "qdtk", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::List { verbose, json } => {
            let client = connect(&connection)?;
            let rows = collection_rows(&client)?;
            if json {
                let values = rows.iter().map(collection_row_json).collect::<Vec<_>>();
                emit_json(&json!({ "collections": values }));
            } else {
                emit_collection_list(&rows, verbose);
            }
            Ok(RunOutcome::ok())
        }
        Command::Stats { json } => {
            let client = connect(&connection)?;
            let version = match client.telemetry() {
                Ok(telemetry) => Some(telemetry.app.version).filter(|v| !v.is_empty()),
                Err(err) => {
                    tracing::debug!(error = %err, "telemetry unavailable");
                    None
                }
            };
            let rows = collection_rows(&client)?;
            let stats = DatabaseStats::from_rows(&rows);
            if json {
                let details = rows.iter().map(collection_row_json).collect::<Vec<_>>();
                emit_json(&json!({
                    "version": version,
                    "collections": rows.len(),
                    "total_points": stats.points,
                    "total_vectors": stats.vectors,
                    "details": details,
                }));
            } else {
                emit_stats_human(version.as_deref(), &rows, &stats);
            }
            Ok(RunOutcome::ok())
        }
        Command::Dump(args) => run_dump(&connection, args, color_mode),
        Command::Search(args) => run_search(&connection, args),
    }
}

struct CollectionRow {
    name: String,
    info: Result<CollectionInfo, Error>,
}

fn collection_rows<G: Gateway + ?Sized>(gateway: &G) -> Result<Vec<CollectionRow>, Error> {
    let names = gateway.list_collections()?;
    Ok(names
        .into_iter()
        .map(|name| {
            let info = gateway
                .collection_info(&name)
                .map_err(|err| err.with_collection(name.clone()));
            CollectionRow { name, info }
        })
        .collect())
}

fn collection_row_json(row: &CollectionRow) -> Value {
    match &row.info {
        Ok(info) => json!({
            "name": row.name,
            "points": info.points(),
            "vectors": info.vectors(),
            "indexed_vectors": info.indexed_vectors_count,
            "segments": info.segments_count,
            "status": info.status,
        }),
        Err(err) => {
            let mut value = error_json(err);
            if let Value::Object(map) = &mut value {
                map.insert("name".to_string(), json!(row.name));
            }
            value
        }
    }
}

fn emit_collection_list(rows: &[CollectionRow], verbose: bool) {
    if rows.is_empty() {
        println!("No collections found");
        return;
    }
    println!("Collections ({})", rows.len());
    let headers: &[&str] = if verbose {
        &["NAME", "POINTS", "VECTORS", "STATUS", "SEGMENTS"]
    } else {
        &["NAME", "POINTS"]
    };
    let table_rows = rows
        .iter()
        .map(|row| match &row.info {
            Ok(info) if verbose => vec![
                row.name.clone(),
                info.points().to_string(),
                info.vectors().to_string(),
                info.status.clone(),
                info.segments_count.to_string(),
            ],
            Ok(info) => vec![row.name.clone(), info.points().to_string()],
            Err(err) => vec![row.name.clone(), format!("error: {}", error_message(err))],
        })
        .collect::<Vec<_>>();
    emit_table(headers, &table_rows);
}

#[derive(Default)]
struct DatabaseStats {
    points: u64,
    vectors: u64,
}

impl DatabaseStats {
    fn from_rows(rows: &[CollectionRow]) -> Self {
        rows.iter()
            .filter_map(|row| row.info.as_ref().ok())
            .fold(Self::default(), |acc, info| Self {
                points: acc.points + info.points(),
                vectors: acc.vectors + info.vectors(),
            })
    }
}

fn emit_stats_human(version: Option<&str>, rows: &[CollectionRow], stats: &DatabaseStats) {
    println!("Qdrant {}", version.unwrap_or("(version unknown)"));
    println!("Collections: {}", rows.len());
    if !rows.is_empty() {
        let table_rows = rows
            .iter()
            .map(|row| match &row.info {
                Ok(info) => vec![
                    row.name.clone(),
                    info.points().to_string(),
                    info.vectors().to_string(),
                    info.status.clone(),
                ],
                Err(err) => vec![
                    row.name.clone(),
                    "-".to_string(),
                    "-".to_string(),
                    format!("error: {}", error_message(err)),
                ],
            })
            .collect::<Vec<_>>();
        println!();
        emit_table(&["NAME", "POINTS", "VECTORS", "STATUS"], &table_rows);
        println!();
    }
    println!("Total points: {}", stats.points);
    println!("Total vectors: {}", stats.vectors);
}

/// `*` and `all` (any case) select every collection.
enum CollectionTarget {
    All,
    One(String),
}

impl CollectionTarget {
    fn parse(raw: &str) -> Result<Self, Error> {
        match raw.trim() {
            "" => Err(Error::new(ErrorKind::Usage)
                .with_message("collection name is empty")
                .with_hint("Pass -c <name>, or -c all to dump every collection.")),
            "*" => Ok(Self::All),
            name if name.eq_ignore_ascii_case("all") => Ok(Self::All),
            name => Ok(Self::One(name.to_string())),
        }
    }
}

fn run_dump(
    connection: &ConnectionArgs,
    args: DumpArgs,
    color_mode: ColorMode,
) -> Result<RunOutcome, Error> {
    let target = CollectionTarget::parse(&args.collection)?;
    if args.batch_size == 0 {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("batch size must be at least 1")
            .with_hint("Pass -b 100 (the default) or another positive number."));
    }
    let options = ExportOptions::new()
        .with_limit(args.limit)
        .with_page_size(args.batch_size)
        .with_vectors(args.with_vectors)
        .with_projection(if args.payload_only {
            Projection::PayloadOnly
        } else {
            Projection::Full
        })
        .with_retry(args.retry.policy()?);
    let client = connect(connection)?;

    let to_stdout = args.output.is_none();
    let quiet = args.quiet || to_stdout;
    let mut reporter = DumpReporter {
        quiet,
        progress: !quiet && !args.no_progress && io::stderr().is_terminal(),
        color_mode,
    };

    let mut writer: Box<dyn Write> = match &args.output {
        Some(path) => {
            let file = File::create(path).map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message(format!("failed to create output file {}", path.display()))
                    .with_source(err)
            })?;
            if !quiet {
                eprintln!("Output: {}", path.display());
            }
            Box::new(BufWriter::new(file))
        }
        None => Box::new(io::stdout().lock()),
    };

    match target {
        CollectionTarget::One(name) => {
            let written =
                export_collection(&client, &name, &options, &mut *writer, &mut reporter)?;
            if !quiet {
                eprintln!("Dump completed: {written} points");
            }
        }
        CollectionTarget::All => {
            let summary = export_all(&client, &options, &mut *writer, &mut reporter)?;
            if !quiet {
                let failed = summary.failed();
                if failed == 0 {
                    eprintln!(
                        "Dump completed: {} points from {} collections",
                        summary.total_written(),
                        summary.collections.len()
                    );
                } else {
                    eprintln!(
                        "Dump completed: {} points from {} collections ({failed} failed)",
                        summary.total_written(),
                        summary.collections.len()
                    );
                }
            }
        }
    }
    writer.flush().map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to write output")
            .with_source(err)
    })?;
    Ok(RunOutcome::ok())
}

/// Renders export progress on stderr.
struct DumpReporter {
    quiet: bool,
    progress: bool,
    color_mode: ColorMode,
}

impl ExportObserver for DumpReporter {
    fn collection_started(&mut self, collection: &str, total: u64, planned: u64) {
        if self.quiet {
            return;
        }
        if planned < total {
            eprintln!("{collection}: {total} points, dumping {planned}");
        } else {
            eprintln!("{collection}: {total} points");
        }
    }

    fn collection_skipped_empty(&mut self, collection: &str) {
        if !self.quiet {
            eprintln!("{collection}: empty, skipped");
        }
    }

    fn page_written(&mut self, progress: &ExportProgress<'_>) {
        if !self.progress {
            return;
        }
        let percent = if progress.planned == 0 {
            100
        } else {
            (progress.written.min(progress.planned) * 100) / progress.planned
        };
        eprint!(
            "\r  {}/{} ({percent}%)",
            progress.written, progress.planned
        );
        let _ = io::stderr().flush();
    }

    fn collection_finished(&mut self, collection: &str, written: u64) {
        if self.progress {
            eprintln!();
        }
        if !self.quiet {
            let done = colorize_label(
                "done:",
                self.color_mode.use_color(io::stderr().is_terminal()),
                AnsiColor::Green,
            );
            eprintln!("{done} {collection} ({written} points)");
        }
    }

    fn collection_failed(&mut self, collection: &str, err: &Error) {
        if self.progress {
            eprintln!();
        }
        let mut details = Map::new();
        details.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
        if let Some(status) = err.status() {
            details.insert("status".to_string(), json!(status));
        }
        let notice = Notice {
            kind: "collection_failed".to_string(),
            time: notice_time_now(),
            cmd: "dump".to_string(),
            collection: Some(collection.to_string()),
            message: error_message(err),
            details,
        };
        emit_notice(&notice, self.color_mode);
    }
}

fn run_search(connection: &ConnectionArgs, args: SearchArgs) -> Result<RunOutcome, Error> {
    if args.batch_size == 0 {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("batch size must be at least 1")
            .with_hint("Pass -b 100 (the default) or another positive number."));
    }
    let options = SearchOptions::new()
        .with_limit(Some(args.limit).filter(|limit| *limit > 0))
        .with_scan_limit(args.scan_limit)
        .with_page_size(args.batch_size)
        .with_retry(args.retry.policy()?);
    let client = connect(connection)?;
    let outcome = search_collection(
        &client,
        &args.collection,
        &args.query,
        args.field.as_deref(),
        &options,
    )?;

    if args.raw {
        emit_json(&json!(outcome.matches));
        return Ok(RunOutcome::ok());
    }
    if !args.query.is_empty() {
        println!(
            "Searched {} documents, found {} matches",
            outcome.scanned,
            outcome.matches.len()
        );
        println!();
    }
    if outcome.matches.is_empty() {
        println!("No results found");
        return Ok(RunOutcome::ok());
    }
    for (idx, record) in outcome.matches.iter().enumerate() {
        println!("{}", format_search_hit(idx + 1, record));
    }
    Ok(RunOutcome::ok())
}

fn format_search_hit(position: usize, record: &Record) -> String {
    let payload = serde_json::to_string_pretty(&record.payload)
        .unwrap_or_else(|_| "{}".to_string());
    let indented = payload
        .lines()
        .map(|line| format!("    {line}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!("[{position}] ID: {}\n{indented}\n", record.id)
}
