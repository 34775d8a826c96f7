use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use pdf_table_merge::{
    EnrichSpec, ExtractOptions, ExtractWarning, MergeReport, MergeRequest, PageSelection,
    TitleQuery, enrich, extract_title_to_csv, load_reference_table, parse_table_indexes,
    run_merge, write_records,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "pdfmerge",
    version,
    about = "Extract tables from PDFs and merge them with reference tables"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Extract document tables, join them with reference tables and write CSV.
    Merge(MergeArgs),
    /// Write the table that follows a title to CSV.
    Extract(ExtractArgs),
    /// Attach mapping columns to records by key.
    Enrich(EnrichArgs),
}

#[derive(Debug, Args)]
struct ExtractionArgs {
    /// Page selection like 1-3,5.
    #[arg(long)]
    pages: Option<String>,

    /// Output delimiter character.
    #[arg(long, default_value = ",")]
    delimiter: char,

    /// Minimum cells required per candidate table row.
    #[arg(long, default_value_t = 2)]
    min_cols: usize,

    /// Skip the ruled-grid extractor and infer tables from text layout only.
    #[arg(long, env = "PDFMERGE_DISABLE_STRUCTURAL")]
    no_structural: bool,

    /// Print every warning instead of a count.
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Args)]
struct TitleArgs {
    /// Title printed above the wanted table.
    #[arg(long)]
    title: Option<String>,

    /// Only accept the title on a line of its own (no partial or fuzzy match).
    #[arg(long, requires = "title")]
    exact_title: bool,

    /// Columns to keep from the titled table, comma separated.
    #[arg(long, value_delimiter = ',', requires = "title")]
    columns: Vec<String>,
}

#[derive(Debug, Args)]
struct MergeArgs {
    /// Input PDF path.
    #[arg(long)]
    pdf: PathBuf,

    /// Reference table (.csv, .tsv, .xlsx, .xls, .ods). Repeatable; the first
    /// one leads the merge.
    #[arg(short, long = "reference")]
    references: Vec<PathBuf>,

    /// Join key; inferred from shared columns when absent.
    #[arg(short, long)]
    key: Option<String>,

    /// Output CSV path.
    #[arg(short, long, default_value = "data/output/result.csv")]
    output: PathBuf,

    #[command(flatten)]
    title: TitleArgs,

    /// Candidate table indexes to merge, like 0,2.
    #[arg(long, conflicts_with = "title")]
    tables: Option<String>,

    /// Print the merge report as JSON on stdout.
    #[arg(long)]
    json: bool,

    #[command(flatten)]
    extraction: ExtractionArgs,
}

#[derive(Debug, Args)]
struct ExtractArgs {
    /// Input PDF path.
    #[arg(long)]
    pdf: PathBuf,

    #[command(flatten)]
    title: TitleArgs,

    /// Output CSV path.
    #[arg(short, long)]
    output: PathBuf,

    #[command(flatten)]
    extraction: ExtractionArgs,
}

#[derive(Debug, Args)]
struct EnrichArgs {
    /// Records to enrich (.csv, .tsv or spreadsheet).
    #[arg(long)]
    records: PathBuf,

    /// Mapping table holding the fields to attach.
    #[arg(long)]
    mapping: PathBuf,

    /// Key column of the records.
    #[arg(short, long)]
    key: String,

    /// Key column of the mapping; defaults to --key.
    #[arg(long)]
    mapping_key: Option<String>,

    /// Mapping columns to attach, comma separated.
    #[arg(long, value_delimiter = ',', required = true)]
    fields: Vec<String>,

    /// Minimum similarity for approximate key matches.
    #[arg(long, default_value_t = pdf_table_merge::DEFAULT_CUTOFF)]
    cutoff: f64,

    /// Output CSV path.
    #[arg(short, long)]
    output: PathBuf,

    /// Output delimiter character.
    #[arg(long, default_value = ",")]
    delimiter: char,
}

fn parse_delimiter(delimiter: char) -> Result<u8> {
    u8::try_from(delimiter)
        .ok()
        .filter(u8::is_ascii)
        .ok_or_else(|| anyhow!("delimiter must be a single ASCII character"))
}

fn parse_options(args: &ExtractionArgs, tables: Option<&str>) -> Result<ExtractOptions> {
    let pages = args
        .pages
        .as_deref()
        .map(PageSelection::from_str)
        .transpose()
        .map_err(|error| anyhow!("invalid page selection: {error}"))
        .context("failed to parse --pages")?;

    let table_indexes = tables
        .map(parse_table_indexes)
        .transpose()
        .map_err(|error| anyhow!(error))
        .context("failed to parse --tables")?;

    Ok(ExtractOptions {
        pages,
        structural: !args.no_structural,
        table_indexes,
        min_cols: args.min_cols,
        delimiter: parse_delimiter(args.delimiter)?,
    })
}

fn parse_title(args: &TitleArgs) -> Option<TitleQuery> {
    args.title.as_deref().map(|title| {
        let query = TitleQuery::new(title);
        if args.exact_title {
            query.exact_only()
        } else {
            query
        }
    })
}

fn log_warnings(warnings: &[ExtractWarning], verbose: bool) {
    if warnings.is_empty() {
        return;
    }

    eprintln!("warning: {} issue(s) detected", warnings.len());
    if verbose {
        for warning in warnings {
            eprintln!(
                "  - {:?} page={:?} table_id={:?} confidence={:?}: {}",
                warning.code, warning.page, warning.table_id, warning.confidence, warning.message
            );
        }
    }
}

fn run_merge_command(args: &MergeArgs) -> Result<MergeReport> {
    let mut request = MergeRequest::new(&args.pdf, &args.output);
    request.references.clone_from(&args.references);
    request.join_key.clone_from(&args.key);
    request.title = parse_title(&args.title);
    request.required_columns.clone_from(&args.title.columns);
    request.options = parse_options(&args.extraction, args.tables.as_deref())?;

    run_merge(&request)
        .with_context(|| format!("failed to merge tables from '{}'", args.pdf.display()))
}

fn run_extract_command(args: &ExtractArgs) -> Result<usize> {
    let query = parse_title(&args.title).ok_or_else(|| anyhow!("--title is required"))?;
    let options = parse_options(&args.extraction, None)?;
    let report =
        extract_title_to_csv(&args.pdf, &query, &args.title.columns, &args.output, &options)
            .with_context(|| {
                format!("failed to extract '{}' from '{}'", query.title, args.pdf.display())
            })?;
    log_warnings(&report.warnings, args.extraction.verbose);
    Ok(report.row_count)
}

fn run_enrich_command(args: &EnrichArgs) -> Result<usize> {
    let records = load_reference_table(&args.records, None)
        .with_context(|| format!("failed to load records from '{}'", args.records.display()))?;
    let mapping = load_reference_table(&args.mapping, None)
        .with_context(|| format!("failed to load mapping from '{}'", args.mapping.display()))?;

    let mut spec = EnrichSpec::new(&args.key, args.fields.clone()).with_cutoff(args.cutoff);
    if let Some(mapping_key) = &args.mapping_key {
        spec = spec.with_mapping_key(mapping_key);
    }

    let enriched = enrich(records.table.rows(), &mapping.table, &spec);
    write_records(&args.output, &enriched, parse_delimiter(args.delimiter)?)
        .with_context(|| format!("failed to write '{}'", args.output.display()))?;
    Ok(enriched.len())
}

fn exit_for_rows(result: Result<usize>) -> ExitCode {
    match result {
        Ok(rows) if rows > 0 => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(2),
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::from(1)
        }
    }
}

fn main() -> ExitCode {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("pdf_table_merge=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Merge(args) => exit_for_rows(run_merge_command(&args).and_then(|report| {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            log_warnings(&report.warnings, args.extraction.verbose);
            Ok(report.record_count)
        })),
        Commands::Extract(args) => exit_for_rows(run_extract_command(&args)),
        Commands::Enrich(args) => exit_for_rows(run_enrich_command(&args)),
    }
}
