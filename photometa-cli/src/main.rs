//! photometa CLI - manage and query an image-metadata library

use clap::{Parser, Subcommand};
use photometa_core::{Library, ListFilter, Namespace, PhotometaError, FIELD_DEFS};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "photometa")]
#[command(about = "Index, query and edit embedded image metadata", long_about = None)]
struct Cli {
    /// Override library root detection
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create .photometa/ and config.toml
    Init,

    /// Scan a directory into the tag index
    Scan {
        /// Directory to scan (default: library root)
        dir: Option<PathBuf>,

        /// Reread every file, ignoring stored content identities
        #[arg(long)]
        force: bool,
    },

    /// Show scan state for a directory
    Status {
        /// Directory to inspect (default: library root)
        dir: Option<PathBuf>,
    },

    /// List image files, optionally filtered
    List {
        /// Directory to list (default: library root)
        dir: Option<PathBuf>,

        /// Search string; every word must match a tag value
        #[arg(short, long)]
        search: Option<String>,

        /// Restrict search to one namespace (iptc or exif)
        #[arg(short, long)]
        namespace: Option<String>,

        /// Restrict search to one field key
        #[arg(short, long)]
        field: Option<String>,

        /// List files missing a value for --namespace/--field
        #[arg(long)]
        untagged: bool,

        /// Zero-indexed page
        #[arg(long, default_value_t = 0)]
        page: usize,

        /// Page size (default from config)
        #[arg(long)]
        page_size: Option<usize>,
    },

    /// Autocomplete tag values
    Tags {
        /// Substring to match (empty lists everything)
        #[arg(default_value = "")]
        query: String,

        /// Restrict to one namespace (iptc or exif)
        #[arg(short, long)]
        namespace: Option<String>,

        /// Restrict to one field key
        #[arg(short, long)]
        field: Option<String>,

        /// Maximum suggestions
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Read one field from a file
    Get {
        path: PathBuf,
        /// iptc or exif
        namespace: String,
        /// Field key, e.g. Keywords
        key: String,
    },

    /// Write one field of a file (no values clears the field)
    Set {
        path: PathBuf,
        /// iptc or exif
        namespace: String,
        /// Field key, e.g. Keywords
        key: String,
        values: Vec<String>,
    },

    /// Render (or fetch) the cached thumbnail for a file
    Thumb {
        path: PathBuf,

        /// Render the screen-size preview instead
        #[arg(long)]
        preview: bool,
    },

    /// Show the writable field catalog
    Fields,
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init => cmd_init(cli.root),
        Commands::Scan { dir, force } => cmd_scan(cli.root, dir, force, cli.json),
        Commands::Status { dir } => cmd_status(cli.root, dir, cli.json),
        Commands::List {
            dir,
            search,
            namespace,
            field,
            untagged,
            page,
            page_size,
        } => cmd_list(
            cli.root, dir, search, namespace, field, untagged, page, page_size, cli.json,
        ),
        Commands::Tags {
            query,
            namespace,
            field,
            limit,
        } => cmd_tags(cli.root, query, namespace, field, limit, cli.json),
        Commands::Get {
            path,
            namespace,
            key,
        } => cmd_get(cli.root, path, namespace, key, cli.json),
        Commands::Set {
            path,
            namespace,
            key,
            values,
        } => cmd_set(cli.root, path, namespace, key, values, cli.json),
        Commands::Thumb { path, preview } => cmd_thumb(cli.root, path, preview),
        Commands::Fields => cmd_fields(cli.json),
    };

    if let Err(e) = result {
        if cli.json {
            let error_json =
                serde_json::json!({ "code": "error", "message": e.to_string() });
            eprintln!("{}", serde_json::to_string_pretty(&error_json).unwrap());
        } else {
            eprintln!("Error: {}", e);
        }
        std::process::exit(1);
    }
}

/// Library root: `--root` if given, otherwise the nearest ancestor of the
/// working directory containing `.photometa/`.
fn detect_library_root(root: Option<PathBuf>) -> photometa_core::Result<PathBuf> {
    if let Some(root) = root {
        return Ok(root);
    }
    ascend_to_library(&std::env::current_dir()?)
}

fn ascend_to_library(start: &Path) -> photometa_core::Result<PathBuf> {
    let mut dir = start;
    loop {
        if dir.join(photometa_core::library::STATE_DIR).is_dir() {
            return Ok(dir.to_path_buf());
        }
        match dir.parent() {
            Some(parent) => dir = parent,
            None => return Err(PhotometaError::NotInitialized),
        }
    }
}

fn open_library(root: Option<PathBuf>) -> photometa_core::Result<Library> {
    Library::open(&detect_library_root(root)?)
}

fn parse_namespace(s: &str) -> photometa_core::Result<Namespace> {
    Namespace::parse(s)
        .ok_or_else(|| PhotometaError::UnknownField(format!("unknown namespace: {s}")))
}

fn cmd_init(root: Option<PathBuf>) -> photometa_core::Result<()> {
    use colored::Colorize;

    let root = root.map_or_else(std::env::current_dir, Ok)?;
    Library::init(&root)?;
    println!("{} .photometa/config.toml", "Created".green());
    Ok(())
}

fn cmd_scan(
    root: Option<PathBuf>,
    dir: Option<PathBuf>,
    force: bool,
    json: bool,
) -> photometa_core::Result<()> {
    use colored::Colorize;

    let lib = open_library(root)?;
    let dir = dir.unwrap_or_else(|| lib.root().to_path_buf());
    let started = lib.start_scan(&dir, force)?;

    if !started.started {
        if json {
            println!("{}", serde_json::json!({ "scanned": 0, "outcome": "up to date" }));
        } else {
            println!("{}: nothing to scan", "Up to date".green());
        }
        return Ok(());
    }

    let total = started.total;
    // The worker dies with the process, so the CLI always waits it out
    let outcome = match started.handle {
        Some(handle) => handle.wait(),
        None => photometa_core::ScanOutcome::Completed,
    };
    let status = lib.scan_status(&dir)?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "scanned": status.processed,
                "total": total,
                "outcome": outcome,
            }))
            .unwrap()
        );
    } else {
        println!(
            "{}: {} of {} files ({:?})",
            "Scanned".green(),
            status.processed,
            total,
            outcome
        );
    }
    Ok(())
}

fn cmd_status(
    root: Option<PathBuf>,
    dir: Option<PathBuf>,
    json: bool,
) -> photometa_core::Result<()> {
    use colored::Colorize;

    let lib = open_library(root)?;
    let dir = dir.unwrap_or_else(|| lib.root().to_path_buf());
    let status = lib.scan_status(&dir)?;
    let scanned = lib.directory_scanned(&dir)?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "scanning": status.scanning,
                "processed": status.processed,
                "total": status.total,
                "ever_scanned": scanned,
            }))
            .unwrap()
        );
    } else if status.scanning {
        println!(
            "{}: {} of {} files",
            "Scanning".yellow(),
            status.processed,
            status.total
        );
    } else if scanned {
        println!("{}: directory is indexed", "Idle".green());
    } else {
        println!("{}: directory has never completed a scan", "Idle".yellow());
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_list(
    root: Option<PathBuf>,
    dir: Option<PathBuf>,
    search: Option<String>,
    namespace: Option<String>,
    field: Option<String>,
    untagged: bool,
    page: usize,
    page_size: Option<usize>,
    json: bool,
) -> photometa_core::Result<()> {
    use colored::Colorize;

    let lib = open_library(root)?;
    let dir = dir.unwrap_or_else(|| lib.root().to_path_buf());

    let scope = match (namespace, field) {
        (Some(ns), Some(field)) => Some((parse_namespace(&ns)?, field)),
        (None, None) => None,
        _ => {
            return Err(PhotometaError::UnknownField(
                "--namespace and --field must be given together".to_string(),
            ))
        }
    };

    let search = search.filter(|q| !q.trim().is_empty());

    // A field scope with no search text lists files missing that field
    let filter = if untagged || (search.is_none() && scope.is_some()) {
        let (namespace, field) = scope.ok_or_else(|| {
            PhotometaError::UnknownField(
                "--untagged requires --namespace and --field".to_string(),
            )
        })?;
        ListFilter::Untagged { namespace, field }
    } else if let Some(query) = search {
        ListFilter::Search {
            query,
            field: scope,
        }
    } else {
        ListFilter::All
    };

    let result = lib.list_images(&dir, &filter, page, page_size)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result).unwrap());
    } else {
        for file in &result.files {
            println!("{}", file.display());
        }
        println!(
            "{}: {} files, page {} of {}",
            "Total".blue(),
            result.total_count,
            result.page + 1,
            result.total_pages
        );
    }
    Ok(())
}

fn cmd_tags(
    root: Option<PathBuf>,
    query: String,
    namespace: Option<String>,
    field: Option<String>,
    limit: usize,
    json: bool,
) -> photometa_core::Result<()> {
    let lib = open_library(root)?;
    let scope = match (namespace, field) {
        (Some(ns), Some(field)) => Some((parse_namespace(&ns)?, field)),
        (None, None) => None,
        _ => {
            return Err(PhotometaError::UnknownField(
                "--namespace and --field must be given together".to_string(),
            ))
        }
    };
    let scope = scope.as_ref().map(|(ns, f)| (*ns, f.as_str()));
    let values = lib.search_tags(&query, scope, limit)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&values).unwrap());
    } else {
        for value in values {
            println!("{}", value);
        }
    }
    Ok(())
}

fn cmd_get(
    root: Option<PathBuf>,
    path: PathBuf,
    namespace: String,
    key: String,
    json: bool,
) -> photometa_core::Result<()> {
    let lib = open_library(root)?;
    let values = lib.read_field(&path, parse_namespace(&namespace)?, &key)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&values).unwrap());
    } else {
        for value in values {
            println!("{}", value);
        }
    }
    Ok(())
}

fn cmd_set(
    root: Option<PathBuf>,
    path: PathBuf,
    namespace: String,
    key: String,
    values: Vec<String>,
    json: bool,
) -> photometa_core::Result<()> {
    use colored::Colorize;

    let lib = open_library(root)?;
    let written = lib.write_field(&path, parse_namespace(&namespace)?, &key, &values)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&written).unwrap());
    } else if written.is_empty() {
        println!("{} {}", "Cleared".yellow(), key);
    } else {
        println!("{} {} = {}", "Set".green(), key, written.join(", "));
    }
    Ok(())
}

fn cmd_thumb(root: Option<PathBuf>, path: PathBuf, preview: bool) -> photometa_core::Result<()> {
    let lib = open_library(root)?;
    let artifact = if preview {
        lib.preview(&path)?
    } else {
        lib.thumbnail(&path)?
    };
    println!("{}", artifact.display());
    Ok(())
}

fn cmd_fields(json: bool) -> photometa_core::Result<()> {
    use colored::Colorize;

    if json {
        println!("{}", serde_json::to_string_pretty(FIELD_DEFS).unwrap());
        return Ok(());
    }
    for def in FIELD_DEFS {
        let multi = if def.multi_valued { " (multi)" } else { "" };
        println!(
            "{:4} {:32} {}{}",
            def.namespace.as_str().blue(),
            def.key.bold(),
            def.label,
            multi
        );
    }
    Ok(())
}
