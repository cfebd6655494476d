use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

mod output;

use output::ColorMode;

/// Maximum number of files an archive is allowed to yield.
const ARCHIVE_MAX_FILES: usize = 50;
/// Maximum total bytes an archive is allowed to extract.
const ARCHIVE_MAX_BYTES: u64 = 500 * 1024 * 1024;

/// Detect fabricated references in academic PDFs.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check a PDF (or an archive of PDFs) for hallucinated references.
    Check {
        /// Path to the PDF file or archive (.zip/.tar.gz) to check.
        path: PathBuf,

        /// Disable colored output.
        #[arg(long)]
        no_color: bool,

        /// Number of references validated concurrently.
        #[arg(long)]
        workers: Option<usize>,

        /// Per-database query timeout in seconds.
        #[arg(long)]
        timeout: Option<u64>,

        /// Comma-separated list of databases to disable.
        #[arg(long, value_delimiter = ',')]
        disable_db: Vec<String>,

        /// OpenAlex API key.
        #[arg(long)]
        openalex_key: Option<String>,

        /// Semantic Scholar API key.
        #[arg(long)]
        s2_api_key: Option<String>,

        /// CrossRef polite-pool contact email.
        #[arg(long)]
        crossref_mailto: Option<String>,

        /// Path to an offline DBLP database.
        #[arg(long)]
        dblp_offline: Option<PathBuf>,

        /// Path to an offline ACL Anthology database.
        #[arg(long)]
        acl_offline: Option<PathBuf>,

        /// Path to an offline OpenAlex database.
        #[arg(long)]
        openalex_offline: Option<PathBuf>,

        /// SearxNG base URL, used as a last-resort fallback when no database finds a match.
        #[arg(long)]
        searxng_url: Option<String>,

        /// Path to a persistent SQLite query cache.
        #[arg(long)]
        cache_path: Option<PathBuf>,

        /// Flag author mismatches from OpenAlex (default: skipped, OpenAlex's author lists are noisy).
        #[arg(long)]
        check_openalex_authors: bool,

        /// Write the report to a file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Download and build the offline DBLP database.
    UpdateDblp {
        /// Path to store the DBLP SQLite database.
        path: PathBuf,
    },

    /// Download and build the offline ACL Anthology database.
    UpdateAcl {
        /// Path to store the ACL SQLite database.
        path: PathBuf,
    },

    /// Download and build the offline OpenAlex database.
    UpdateOpenalex {
        /// Path to store the OpenAlex Tantivy index.
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "refguard=info",
        1 => "refguard=debug",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli.command).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(3)
        }
    }
}

async fn run(command: Command) -> anyhow::Result<ExitCode> {
    let check_args = match command {
        Command::Check { .. } => command,
        Command::UpdateDblp { path } => {
            update_dblp(&path).await?;
            return Ok(ExitCode::SUCCESS);
        }
        Command::UpdateAcl { path } => {
            update_acl(&path).await?;
            return Ok(ExitCode::SUCCESS);
        }
        Command::UpdateOpenalex { path } => {
            update_openalex(&path).await?;
            return Ok(ExitCode::SUCCESS);
        }
    };

    let Command::Check {
        path,
        no_color,
        workers,
        timeout,
        disable_db,
        openalex_key,
        s2_api_key,
        crossref_mailto,
        dblp_offline,
        acl_offline,
        openalex_offline,
        searxng_url,
        cache_path,
        check_openalex_authors,
        output,
    } = check_args
    else {
        unreachable!()
    };

    if !path.exists() {
        eprintln!("error: path not found: {}", path.display());
        return Ok(ExitCode::from(2));
    }

    let file_config = refguard_core::config_file::load_config();

    let openalex_key = openalex_key
        .or_else(|| std::env::var("OPENALEX_API_KEY").ok())
        .or_else(|| file_config.api_keys.as_ref().and_then(|a| a.openalex_key.clone()));
    let s2_api_key = s2_api_key
        .or_else(|| std::env::var("S2_API_KEY").ok())
        .or_else(|| file_config.api_keys.as_ref().and_then(|a| a.s2_api_key.clone()));
    let crossref_mailto = crossref_mailto
        .or_else(|| std::env::var("CROSSREF_MAILTO").ok())
        .or_else(|| file_config.api_keys.as_ref().and_then(|a| a.crossref_mailto.clone()));

    let dblp_offline_path = dblp_offline.or_else(|| {
        file_config
            .databases
            .as_ref()
            .and_then(|d| d.dblp_offline_path.clone())
            .map(PathBuf::from)
    });
    let acl_offline_path = acl_offline.or_else(|| {
        file_config
            .databases
            .as_ref()
            .and_then(|d| d.acl_offline_path.clone())
            .map(PathBuf::from)
    });
    let openalex_offline_path = openalex_offline.or_else(|| {
        file_config
            .databases
            .as_ref()
            .and_then(|d| d.openalex_offline_path.clone())
            .map(PathBuf::from)
    });
    let cache_path = cache_path.or_else(|| {
        file_config
            .databases
            .as_ref()
            .and_then(|d| d.cache_path.clone())
            .map(PathBuf::from)
    });
    let searxng_url =
        searxng_url.or_else(|| file_config.databases.as_ref().and_then(|d| d.searxng_url.clone()));

    let mut disabled_dbs = disable_db;
    if let Some(more) = file_config.databases.as_ref().and_then(|d| d.disabled.clone()) {
        disabled_dbs.extend(more);
    }

    let num_workers = workers
        .or_else(|| file_config.concurrency.as_ref().and_then(|c| c.num_workers))
        .unwrap_or(4);
    let db_timeout_secs = timeout
        .or_else(|| file_config.concurrency.as_ref().and_then(|c| c.db_timeout_secs))
        .unwrap_or(10);
    let db_timeout_short_secs = file_config
        .concurrency
        .as_ref()
        .and_then(|c| c.db_timeout_short_secs)
        .unwrap_or(5);
    let max_rate_limit_retries = file_config
        .concurrency
        .as_ref()
        .and_then(|c| c.max_rate_limit_retries)
        .unwrap_or(3);

    let use_color = !no_color && output.is_none();
    let color = ColorMode(use_color);

    let mut writer: Box<dyn Write> = if let Some(ref output_path) = output {
        Box::new(std::fs::File::create(output_path)?)
    } else {
        Box::new(std::io::stdout())
    };

    let dblp_offline_db = open_dblp(dblp_offline_path.as_deref(), color, &mut writer)?;
    let acl_offline_db = open_acl(acl_offline_path.as_deref(), color, &mut writer)?;
    let openalex_offline_db = open_openalex(openalex_offline_path.as_deref())?;

    let (pdf_path, _extracted_dir) = resolve_pdf_path(&path)?;

    let backend = refguard_pdf_mupdf::MupdfBackend::default();
    let extraction = refguard_parsing::extract_references(&pdf_path, &backend)?;

    let pdf_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());

    output::print_extraction_summary(
        &mut writer,
        &pdf_name,
        extraction.references.len(),
        &extraction.skip_stats,
        color,
    )?;

    if extraction.references.is_empty() {
        writeln!(writer, "No references to check.")?;
        return Ok(ExitCode::SUCCESS);
    }

    let rate_limiters = refguard_core::RateLimiters::new(
        crossref_mailto.is_some(),
        s2_api_key.is_some(),
    );
    let query_cache = refguard_core::build_query_cache(
        cache_path.as_deref(),
        refguard_core::DEFAULT_POSITIVE_TTL.as_secs(),
        refguard_core::DEFAULT_NEGATIVE_TTL.as_secs(),
    );

    let config = refguard_core::Config {
        openalex_key: openalex_key.clone(),
        s2_api_key,
        dblp_offline_path,
        dblp_offline_db,
        acl_offline_path,
        acl_offline_db,
        openalex_offline_path,
        openalex_offline_db,
        num_workers,
        db_timeout_secs,
        db_timeout_short_secs,
        disabled_dbs,
        check_openalex_authors,
        crossref_mailto,
        max_rate_limit_retries,
        rate_limiters: Arc::new(rate_limiters),
        searxng_url,
        query_cache: Some(query_cache),
        cache_path,
        cache_positive_ttl_secs: refguard_core::DEFAULT_POSITIVE_TTL.as_secs(),
        cache_negative_ttl_secs: refguard_core::DEFAULT_NEGATIVE_TTL.as_secs(),
    };

    let progress_writer: Arc<Mutex<Box<dyn Write + Send>>> = if output.is_some() {
        Arc::new(Mutex::new(Box::new(std::io::stderr())))
    } else {
        Arc::new(Mutex::new(Box::new(std::io::stdout())))
    };

    let progress_color = color;
    let progress_cb = {
        let pw = Arc::clone(&progress_writer);
        move |event: refguard_core::ProgressEvent| {
            if let Ok(mut w) = pw.lock() {
                let _ = output::print_progress(&mut *w, &event, progress_color);
                let _ = w.flush();
            }
        }
    };

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_clone.cancel();
        }
    });

    let skip_stats = extraction.skip_stats.clone();
    let results =
        refguard_core::checker::check_references(extraction.references, config, progress_cb, cancel)
            .await;

    writeln!(writer)?;
    output::print_hallucination_report(&mut writer, &results, openalex_key.is_some(), color)?;
    output::print_doi_issues(&mut writer, &results, color)?;
    output::print_retraction_warnings(&mut writer, &results, color)?;
    output::print_summary(&mut writer, &results, &skip_stats, color)?;

    let anomalies = results.iter().any(|r| {
        !matches!(r.status, refguard_core::Status::Verified)
    });
    Ok(if anomalies {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    })
}

/// If `path` is an archive, extract it to a temp directory and return the first PDF
/// inside alongside the `TempDir` guard (dropped, and the directory removed, once the
/// caller is done with the extracted file). Otherwise returns `path` unchanged.
fn resolve_pdf_path(
    path: &std::path::Path,
) -> anyhow::Result<(PathBuf, Option<tempfile::TempDir>)> {
    if !refguard_ingest::is_archive_path(path) {
        return Ok((path.to_path_buf(), None));
    }

    let tmp = tempfile::tempdir()?;
    let (tx, rx) = std::sync::mpsc::channel();
    let extract_path = path.to_path_buf();
    let extract_dir = tmp.path().to_path_buf();
    std::thread::spawn(move || {
        let _ = refguard_ingest::extract_archive_streaming(
            &extract_path,
            &extract_dir,
            ARCHIVE_MAX_BYTES,
            ARCHIVE_MAX_FILES,
            &tx,
        );
    });

    let mut first_pdf = None;
    for item in rx {
        match item {
            refguard_ingest::ArchiveItem::Pdf(pdf) => {
                if first_pdf.is_none() {
                    first_pdf = Some(pdf.path);
                }
            }
            refguard_ingest::ArchiveItem::Warning(w) => {
                tracing::warn!("{}", w);
            }
            refguard_ingest::ArchiveItem::Done { .. } => break,
        }
    }

    let pdf_path = first_pdf
        .ok_or_else(|| anyhow::anyhow!("no PDF found in archive: {}", path.display()))?;
    Ok((pdf_path, Some(tmp)))
}

fn open_dblp(
    path: Option<&std::path::Path>,
    color: ColorMode,
    writer: &mut dyn Write,
) -> anyhow::Result<Option<Arc<Mutex<refguard_dblp::DblpDatabase>>>> {
    let Some(path) = path else { return Ok(None) };
    if !path.exists() {
        anyhow::bail!(
            "offline DBLP database not found at {}. Build it with: refguard-cli update-dblp {}",
            path.display(),
            path.display()
        );
    }
    let db = refguard_dblp::DblpDatabase::open(path)?;
    if let Ok(staleness) = db.check_staleness(30) {
        if staleness.is_stale {
            warn_stale(writer, color, "DBLP", staleness.age_days, path)?;
        }
    }
    Ok(Some(Arc::new(Mutex::new(db))))
}

fn open_acl(
    path: Option<&std::path::Path>,
    color: ColorMode,
    writer: &mut dyn Write,
) -> anyhow::Result<Option<Arc<Mutex<refguard_acl::AclDatabase>>>> {
    let Some(path) = path else { return Ok(None) };
    if !path.exists() {
        anyhow::bail!(
            "offline ACL Anthology database not found at {}. Build it with: refguard-cli update-acl {}",
            path.display(),
            path.display()
        );
    }
    let db = refguard_acl::AclDatabase::open(path)?;
    if let Ok(staleness) = db.check_staleness(30) {
        if staleness.is_stale {
            warn_stale(writer, color, "ACL Anthology", staleness.age_days, path)?;
        }
    }
    Ok(Some(Arc::new(Mutex::new(db))))
}

fn open_openalex(
    path: Option<&std::path::Path>,
) -> anyhow::Result<Option<Arc<Mutex<refguard_openalex::OpenAlexDatabase>>>> {
    let Some(path) = path else { return Ok(None) };
    if !path.exists() {
        anyhow::bail!("offline OpenAlex database not found at {}", path.display());
    }
    let db = refguard_openalex::OpenAlexDatabase::open(path)?;
    Ok(Some(Arc::new(Mutex::new(db))))
}

fn warn_stale(
    writer: &mut dyn Write,
    color: ColorMode,
    name: &str,
    age_days: Option<u64>,
    path: &std::path::Path,
) -> std::io::Result<()> {
    let msg = if let Some(days) = age_days {
        format!(
            "Offline {name} database is {days} days old. Consider rebuilding it ({}).",
            path.display()
        )
    } else {
        format!(
            "Offline {name} database may be stale. Consider rebuilding it ({}).",
            path.display()
        )
    };
    if color.enabled() {
        use owo_colors::OwoColorize;
        writeln!(writer, "{}", msg.yellow())?;
    } else {
        writeln!(writer, "{}", msg)?;
    }
    writeln!(writer)
}

async fn update_dblp(db_path: &PathBuf) -> anyhow::Result<()> {
    use indicatif::{HumanCount, ProgressBar, ProgressStyle};

    let bar = ProgressBar::new_spinner();
    bar.set_style(ProgressStyle::with_template("{spinner:.cyan} {msg}").unwrap());
    bar.enable_steady_tick(std::time::Duration::from_millis(120));

    let updated = refguard_dblp::build_database(db_path, |event| match event {
        refguard_dblp::BuildProgress::Downloading {
            bytes_downloaded, ..
        } => bar.set_message(format!("Downloading dblp.xml.gz ({} so far)", bytes_downloaded)),
        refguard_dblp::BuildProgress::Parsing {
            records_parsed,
            records_inserted,
            ..
        } => bar.set_message(format!(
            "{} parsed, {} inserted",
            HumanCount(records_parsed),
            HumanCount(records_inserted)
        )),
        refguard_dblp::BuildProgress::RebuildingIndex => {
            bar.set_message("Rebuilding FTS search index...")
        }
        refguard_dblp::BuildProgress::Complete {
            publications,
            authors,
            skipped,
        } => {
            if skipped {
                bar.set_message("Database is already up to date (304 Not Modified)");
            } else {
                bar.set_message(format!(
                    "Indexed {} publications, {} authors",
                    HumanCount(publications),
                    HumanCount(authors)
                ));
            }
        }
    })
    .await?;

    bar.finish();
    report_update(db_path, updated, "DBLP")
}

async fn update_acl(db_path: &PathBuf) -> anyhow::Result<()> {
    use indicatif::{HumanCount, ProgressBar, ProgressStyle};

    let bar = ProgressBar::new_spinner();
    bar.set_style(ProgressStyle::with_template("{spinner:.cyan} {msg}").unwrap());
    bar.enable_steady_tick(std::time::Duration::from_millis(120));

    let updated = refguard_acl::build_database(db_path, |event| match event {
        refguard_acl::BuildProgress::Downloading {
            bytes_downloaded, ..
        } => bar.set_message(format!(
            "Downloading acl-anthology.tar.gz ({} so far)",
            bytes_downloaded
        )),
        refguard_acl::BuildProgress::Extracting { files_extracted } => {
            bar.set_message(format!("Extracting XML files... ({})", files_extracted))
        }
        refguard_acl::BuildProgress::Parsing {
            records_parsed,
            records_inserted,
            ..
        } => bar.set_message(format!(
            "{} parsed, {} inserted",
            HumanCount(records_parsed),
            HumanCount(records_inserted)
        )),
        refguard_acl::BuildProgress::RebuildingIndex => {
            bar.set_message("Rebuilding FTS search index...")
        }
        refguard_acl::BuildProgress::Complete {
            publications,
            authors,
            skipped,
        } => {
            if skipped {
                bar.set_message("Database is already up to date (same commit SHA)");
            } else {
                bar.set_message(format!(
                    "Indexed {} publications, {} authors",
                    HumanCount(publications),
                    HumanCount(authors)
                ));
            }
        }
    })
    .await?;

    bar.finish();
    report_update(db_path, updated, "ACL Anthology")
}

async fn update_openalex(db_path: &PathBuf) -> anyhow::Result<()> {
    use indicatif::{HumanCount, ProgressBar, ProgressStyle};

    let bar = ProgressBar::new_spinner();
    bar.set_style(ProgressStyle::with_template("{spinner:.cyan} {msg}").unwrap());
    bar.enable_steady_tick(std::time::Duration::from_millis(120));

    let updated = refguard_openalex::build_database(db_path, |event| match event {
        refguard_openalex::BuildProgress::ListingPartitions { message } => bar.set_message(message),
        refguard_openalex::BuildProgress::FileStarted { filename } => {
            bar.set_message(format!("Downloading {}...", filename))
        }
        refguard_openalex::BuildProgress::Downloading {
            files_done,
            files_total,
            records_indexed,
            ..
        } => bar.set_message(format!(
            "{}/{} files, {} records indexed",
            files_done,
            files_total,
            HumanCount(records_indexed)
        )),
        refguard_openalex::BuildProgress::Committing { records_indexed } => {
            bar.set_message(format!(
                "Committing index ({} records)...",
                HumanCount(records_indexed)
            ))
        }
        _ => {}
    })
    .await?;

    bar.finish();
    report_update(db_path, updated, "OpenAlex")
}

fn report_update(db_path: &std::path::Path, updated: bool, label: &str) -> anyhow::Result<()> {
    let canonical = std::fs::canonicalize(db_path).unwrap_or_else(|_| db_path.to_path_buf());
    if updated {
        println!("{label} database saved to: {}", canonical.display());
    } else {
        println!("{label} database is already up to date: {}", canonical.display());
    }
    Ok(())
}
