//! `pical` CLI — expand a household calendar document and validate RRULEs.
//!
//! ## Usage
//!
//! ```sh
//! # Expand every event in a calendar document (stdin → stdout)
//! pical expand --start 2025-01-01 --end 2025-02-01 < calendar.json
//!
//! # One event, second page of ten, from file to file
//! pical expand --start 2025-01-01 --end 2025-02-01 --event bins \
//!     --limit 10 --offset 10 -i calendar.json -o page.json
//!
//! # Leave out events with broken rules instead of failing
//! pical expand --start 2025-01-01 --end 2025-02-01 --skip-malformed -i calendar.json
//!
//! # Check and normalize a rule
//! pical check "freq=weekly;byday=mo,we"
//! ```
//!
//! Logging goes to stderr and is controlled by `PICAL_LOG` (default `warn`).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pical_engine::{
    expand_calendar, expand_event, parse_instant, CalendarDocument, DstPolicy, ExpandOptions,
    OccurrencePage, PageRequest, RecurrenceRule,
};
use std::io::{self, Read};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "pical",
    version,
    about = "Household calendar recurrence expansion"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Expand a calendar document over a window into a page of occurrences
    Expand {
        /// Window start (RFC 3339, YYYY-MM-DDTHH:MM:SS in UTC, or YYYY-MM-DD)
        #[arg(long)]
        start: String,
        /// Window end, exclusive (same formats as --start)
        #[arg(long)]
        end: String,
        /// Input calendar JSON (reads from stdin if omitted)
        #[arg(short, long)]
        input: Option<String>,
        /// Output file (writes to stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
        /// Expand only this event
        #[arg(long)]
        event: Option<String>,
        /// Page size (1-200, default 50)
        #[arg(long)]
        limit: Option<usize>,
        /// Items to skip before the page
        #[arg(long)]
        offset: Option<usize>,
        /// Iteration cap per event; 0 disables the cap
        #[arg(long)]
        max_iterations: Option<u64>,
        /// Drop slots that fall in a DST gap instead of shifting them
        #[arg(long)]
        skip_dst_gaps: bool,
        /// Leave out events with malformed rules, zones or times
        #[arg(long)]
        skip_malformed: bool,
    },
    /// Validate an RRULE and print it in normalized form
    Check {
        /// The rule, with or without the `RRULE:` prefix
        rule: String,
    },
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Expand {
            start,
            end,
            input,
            output,
            event,
            limit,
            offset,
            max_iterations,
            skip_dst_gaps,
            skip_malformed,
        } => {
            let window_start = parse_instant(&start).context("Invalid --start")?;
            let window_end = parse_instant(&end).context("Invalid --end")?;
            let options = build_options(max_iterations, skip_dst_gaps, skip_malformed);

            let json = read_input(input.as_deref())?;
            let store = CalendarDocument::from_json(&json)
                .and_then(CalendarDocument::into_store)
                .context("Failed to load calendar document")?;
            tracing::debug!(events = store.len(), %window_start, %window_end, "expanding");

            let occurrences = match event.as_deref() {
                Some(id) => expand_event(&store, id, window_start, window_end, &options)
                    .with_context(|| format!("Failed to expand event '{}'", id))?,
                None => expand_calendar(&store, window_start, window_end, &options)
                    .context("Failed to expand calendar")?,
            };

            let page = OccurrencePage::paginate(occurrences, PageRequest::new(limit, offset));
            let pretty = serde_json::to_string_pretty(&page)?;
            write_output(output.as_deref(), &pretty)?;
        }
        Commands::Check { rule } => {
            let parsed = RecurrenceRule::parse(&rule).context("Invalid RRULE")?;
            println!("{}", parsed);
        }
    }

    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("PICAL_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr).with_target(true))
        .init();
}

/// Map the expand flags onto engine options.
///
/// `--max-iterations 0` removes the cap; omitting it keeps the default.
fn build_options(max_iterations: Option<u64>, skip_dst_gaps: bool, skip_malformed: bool) -> ExpandOptions {
    let mut options = ExpandOptions::default();
    if let Some(max) = max_iterations {
        options = options.with_max_iterations((max > 0).then_some(max));
    }
    if skip_dst_gaps {
        options = options.with_dst_policy(DstPolicy::Skip);
    }
    if skip_malformed {
        options = options.skipping_malformed();
    }
    options
}

fn read_input(path: Option<&str>) -> Result<String> {
    match path {
        Some(path) => {
            std::fs::read_to_string(path).with_context(|| format!("Failed to read file: {}", path))
        }
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read from stdin")?;
            Ok(buf)
        }
    }
}

fn write_output(path: Option<&str>, content: &str) -> Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write file: {}", path))?;
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
