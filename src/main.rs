//! CLI entry point for `mimefix`.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use mimefix::config::{self, Config};
use mimefix::model::content::{Children, ContentNode};
use mimefix::render::TextRenderer;
use mimefix::sniff::MagicSniffer;
use mimefix::source::MessageSource;
use mimefix::store::extract;
use mimefix::store::PartStore;
use mimefix::transform::charset::EncodingRsConverter;
use mimefix::transform::Transformer;
use mimefix::TreeParser;

#[derive(Parser)]
#[command(name = "mimefix", version, about = "Inspect and repair MIME mail messages")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a message and report its structure and defects
    Check {
        file: PathBuf,
    },
    /// Run the repair pipeline and write the fixed message
    Fix {
        file: PathBuf,
        /// Write here instead of rewriting the input in place
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Overwrite an existing output file
        #[arg(long)]
        clobber: bool,
        /// Convert text/plain parts to this charset
        #[arg(long, value_name = "CHARSET")]
        charset: Option<String>,
        /// Print one line per transformation performed
        #[arg(short = 'a', long)]
        audit: bool,
    },
    /// Print one part's decoded content to stdout
    Show {
        file: PathBuf,
        /// Part number, e.g. "1.2" (whole message when omitted)
        #[arg(default_value = "1")]
        part: String,
        /// Print the raw transfer-encoded bytes instead
        #[arg(long)]
        raw: bool,
    },
    /// Extract parts to files
    Extract {
        file: PathBuf,
        /// Extract just this part instead of every attachment
        #[arg(short, long)]
        part: Option<String>,
        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
        /// Overwrite existing files
        #[arg(long)]
        clobber: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = config::load_config();

    let log_level = match cli.verbose {
        0 => config.log.level.clone(),
        1 => "info".to_string(),
        2 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    setup_logging(&log_level, &config);

    match cli.command {
        Commands::Check { file } => cmd_check(&file, &config),
        Commands::Fix {
            file,
            output,
            clobber,
            charset,
            audit,
        } => cmd_fix(&file, output.as_deref(), clobber, charset, audit, &config),
        Commands::Show { file, part, raw } => cmd_show(&file, &part, raw, &config),
        Commands::Extract {
            file,
            part,
            output,
            clobber,
        } => cmd_extract(&file, part.as_deref(), &output, clobber, &config),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_path = config::log_file_path(config);
    let log_dir = log_path.parent().map(Path::to_path_buf).unwrap_or_default();
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "mimefix.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Parse and describe a message without touching it.
fn cmd_check(file: &Path, config: &Config) -> anyhow::Result<()> {
    let source = MessageSource::open(file)?;
    let tree = TreeParser::new(config.policy.max_nesting_depth).parse(&source)?;

    print_outline(&tree, 0);

    let defects = tree.collect_defects();
    if defects.is_empty() {
        println!("no defects");
    } else {
        println!("{} defect(s):", defects.len());
        for (part, defect) in defects {
            println!("  part {part}: {defect}");
        }
    }
    Ok(())
}

fn print_outline(node: &ContentNode, indent: usize) {
    println!(
        "{:indent$}{} {} ({}; {} bytes)",
        "",
        node.part_number,
        node.mime_type(),
        node.transfer_encoding,
        node.body.len(),
        indent = indent * 2
    );
    match &node.children {
        Children::None => {}
        Children::Message(inner) => print_outline(inner, indent + 1),
        Children::Multipart(mp) => {
            for part in &mp.parts {
                print_outline(part, indent + 1);
            }
        }
    }
}

/// Run the repair pipeline and write the result.
fn cmd_fix(
    file: &Path,
    output: Option<&Path>,
    clobber: bool,
    charset: Option<String>,
    audit: bool,
    config: &Config,
) -> anyhow::Result<()> {
    let source = MessageSource::open(file)?;
    let mut tree = TreeParser::new(config.policy.max_nesting_depth).parse(&source)?;

    let mut policy = config.policy.to_policy();
    if charset.is_some() {
        policy.target_charset = charset;
    }

    let sniffer = MagicSniffer;
    let renderer = TextRenderer::default();
    let converter = EncodingRsConverter;
    let transformer = Transformer {
        policy: &policy,
        sniffer: &sniffer,
        renderer: &renderer,
        converter: &converter,
        context: file.display().to_string(),
    };
    let report = transformer.run(&mut tree);

    if audit {
        for record in &report.audit {
            eprintln!("{}: part {}: {}", record.context, record.part_number, record.message);
        }
    }
    for failure in &report.failures {
        eprintln!("warning: {failure}");
    }

    if report.modifications == 0 {
        println!("{}: no changes needed", file.display());
        return Ok(());
    }

    let bytes = mimefix::serialize(&tree);
    let target = output.unwrap_or(file);
    let in_place = target == file;

    if !in_place && target.exists() && !clobber && !config.output.clobber {
        anyhow::bail!("output file exists: {} (use --clobber)", target.display());
    }
    if in_place && config.output.backup {
        let backup = file.with_extension(backup_extension(file));
        std::fs::copy(file, &backup)?;
    }
    write_atomically(target, &bytes)?;

    println!(
        "{}: {} modification(s) applied",
        target.display(),
        report.modifications
    );
    Ok(())
}

fn backup_extension(file: &Path) -> String {
    match file.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{ext}.orig"),
        None => "orig".to_string(),
    }
}

fn write_atomically(path: &Path, data: &[u8]) -> anyhow::Result<()> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    std::io::Write::write_all(&mut tmp, data)?;
    tmp.persist(path)?;
    Ok(())
}

/// Print one part's content to stdout.
fn cmd_show(file: &Path, part: &str, raw: bool, config: &Config) -> anyhow::Result<()> {
    let mut store = PartStore::new(config.policy.max_nesting_depth);
    let bytes = if raw {
        let tree = store.tree(file)?;
        let node = tree
            .find_part(part)
            .ok_or_else(|| mimefix::MimeError::PartNotFound(part.to_string()))?;
        node.body_bytes().to_vec()
    } else {
        store.decoded_part(file, part)?
    };
    std::io::Write::write_all(&mut std::io::stdout(), &bytes)?;
    Ok(())
}

/// Extract one part or all attachments.
fn cmd_extract(
    file: &Path,
    part: Option<&str>,
    output: &Path,
    clobber: bool,
    config: &Config,
) -> anyhow::Result<()> {
    let clobber = clobber || config.output.clobber;
    let mut store = PartStore::new(config.policy.max_nesting_depth);
    match part {
        Some(number) => {
            std::fs::create_dir_all(output)?;
            let path = extract::extract_part(&mut store, file, number, output, clobber)?;
            println!("{}", path.display());
        }
        None => {
            let paths = extract::extract_attachments(&mut store, file, output, clobber)?;
            for path in &paths {
                println!("{}", path.display());
            }
            if paths.is_empty() {
                eprintln!("{}: no attachments found", file.display());
            }
        }
    }
    Ok(())
}
