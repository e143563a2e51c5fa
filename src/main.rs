//! CLI entry point for `lazymime`.

use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser, Subcommand};

use lazymime::config::{self, Config};
use lazymime::{MessageParser, PartSummary, PartType};

#[derive(Parser)]
#[command(
    name = "lazymime",
    version,
    about = "Inspect MIME messages without loading them into memory"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the part tree of a message
    Tree {
        path: PathBuf,
        /// Print the tree as JSON
        #[arg(long)]
        json: bool,
    },
    /// Write one part to stdout
    Show {
        path: PathBuf,
        /// Part path such as `2.1` (empty for the message itself)
        #[arg(value_name = "PART")]
        part: String,
        /// Show the header block instead of the content
        #[arg(long, conflicts_with_all = ["raw", "decoded"])]
        headers: bool,
        /// Show the whole part as it appears in the file
        #[arg(long, conflicts_with = "decoded")]
        raw: bool,
        /// Undo the transfer encoding
        #[arg(long)]
        decoded: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = config::load_config();

    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    match cli.command {
        Commands::Tree { path, json } => cmd_tree(&path, json, &config),
        Commands::Show {
            path,
            part,
            headers,
            raw,
            decoded,
        } => {
            let view = if headers {
                ShowView::Headers
            } else if raw {
                ShowView::Raw
            } else if decoded {
                ShowView::Decoded
            } else {
                ShowView::Content
            };
            cmd_show(&path, &part, view, &config)
        }
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_file = config::log_file_path(config);
    let log_dir = config::cache_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, config::LOG_FILE_NAME);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
        tracing::debug!("Logging to {}", log_file.display());
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

fn parser_for(config: &Config) -> MessageParser {
    MessageParser::with_config(config.parser.clone())
}

/// Print the realized part tree.
fn cmd_tree(path: &Path, json: bool, config: &Config) -> anyhow::Result<()> {
    let message = parser_for(config).parse_file(path)?;
    let summary = message.summary()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("{}", path.display());
    print_summary(&summary, 0);
    let stats = message.stats();
    println!();
    println!(
        "  {} parts, {} content scans, {} child lookups",
        summary.part_count(),
        stats.content_scans,
        stats.child_discoveries
    );
    Ok(())
}

fn print_summary(summary: &PartSummary, depth: usize) {
    use humansize::{format_size, BINARY};

    let label = if summary.path.is_empty() {
        "message".to_string()
    } else {
        summary.path.clone()
    };
    let mut line = format!(
        "{:indent$}{label:<10} {:<32} {:>10}",
        "",
        summary.content_type,
        format_size(summary.content_length, BINARY),
        indent = depth * 2
    );
    if summary.part_type == PartType::UuEncoded {
        if let Some(mode) = summary.uu_mode {
            line.push_str(&format!("  mode {mode:o}"));
        }
    }
    if let Some(ref filename) = summary.filename {
        line.push_str(&format!("  \"{filename}\""));
    }
    if let Some(ref boundary) = summary.boundary {
        line.push_str(&format!("  boundary={boundary}"));
    }
    if summary.boundary.is_some() && !summary.end_boundary_found {
        line.push_str("  (unterminated)");
    }
    println!("{line}");

    for child in &summary.children {
        print_summary(child, depth + 1);
    }
}

enum ShowView {
    Content,
    Decoded,
    Headers,
    Raw,
}

/// Copy one view of a part to stdout.
fn cmd_show(path: &Path, part_path: &str, view: ShowView, config: &Config) -> anyhow::Result<()> {
    let message = parser_for(config).parse_file(path)?;
    let part = message.part_at_path(part_path)?;

    let bytes = match view {
        ShowView::Content => part.content()?,
        ShowView::Decoded => part.decoded_content()?,
        ShowView::Raw => part.raw()?,
        ShowView::Headers => {
            let mut header_view = part.header_view()?;
            header_view.read_all()?
        }
    };

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&bytes)?;
    stdout.flush()?;
    Ok(())
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "lazymime", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::stdout().write_all(&buf)?;
    Ok(())
}
