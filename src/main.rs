//! dfs - operate a decomposed filesystem from the command line.
//!
//! Usage:
//!   dfs --root DIR init                 Create the storage layout
//!   dfs --root DIR mkdir PATH           Create a container
//!   dfs --root DIR put PATH [FILE]      Store a file (stdin when FILE is absent)
//!   dfs --root DIR stat PATH            Show a node
//!   dfs --root DIR path ID              Resolve a node id to its path
//!   dfs --root DIR rm PATH              Move a node to the trash
//!   dfs --root DIR trash list           List the trash
//!   dfs --help                          Show help

use std::io::Read;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, Result, bail, eyre};
use tracing_subscriber::EnvFilter;

use decomposedfs_core::{
    Options, Reference, RecycleItem, RequestContext, ResourceId, User, UserId,
};
use decomposedfs_recycle::Recycle;
use decomposedfs_tree::ResourceInfo;

#[derive(Parser)]
#[command(
    name = "dfs",
    version,
    about = "Operate a decomposed filesystem storage",
    long_about = "dfs manipulates a decomposed filesystem: nodes addressed by id, \
                  names and parent links kept in attributes, deleted nodes kept \
                  in a per-user trash until they are restored or purged."
)]
struct Cli {
    /// Storage root directory
    #[arg(short, long, global = true)]
    root: Option<PathBuf>,

    /// TOML file with storage options
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Resolve paths relative to the user's home
    #[arg(long, global = true)]
    home: bool,

    /// Act as this user, as `username` or `idp:username`
    #[arg(short, long, global = true)]
    user: Option<String>,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the storage layout (and the user's home with --home)
    Init,

    /// Create a container
    Mkdir {
        /// Logical path of the new container
        path: String,
    },

    /// Store a file
    Put {
        /// Logical path of the new file
        path: String,

        /// Local file to read (defaults to stdin)
        source: Option<PathBuf>,
    },

    /// Show a node
    Stat {
        /// Logical path
        path: String,

        /// Follow references while walking the path
        #[arg(short = 'L', long)]
        follow: bool,
    },

    /// Resolve a node id to its logical path
    Path {
        /// Node id
        id: String,
    },

    /// Move a node to the trash
    Rm {
        /// Logical path
        path: String,
    },

    /// Inspect and manage the trash
    Trash {
        #[command(subcommand)]
        command: TrashCommand,
    },
}

#[derive(Subcommand)]
enum TrashCommand {
    /// List trash entries, or the contents of one entry
    List {
        /// Trash key (lists the whole trash when absent)
        key: Option<String>,

        /// Path below the trashed entry
        #[arg(short, long, default_value = "/")]
        path: String,
    },

    /// Restore a trash entry
    Restore {
        /// Trash key
        key: String,

        /// Path below the trashed entry
        #[arg(short, long, default_value = "")]
        path: String,

        /// Restore to this logical path instead of the origin
        #[arg(short, long)]
        to: Option<String>,
    },

    /// Delete a trash entry for good
    Purge {
        /// Trash key
        key: String,

        /// Path below the trashed entry
        #[arg(short, long, default_value = "")]
        path: String,
    },

    /// Delete everything in the trash
    Empty,
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let options = load_options(&cli)?;
    let ctx = match &cli.user {
        Some(name) => RequestContext::for_user(parse_user(name)),
        None => RequestContext::anonymous(),
    };
    let recycle = Recycle::open(options).context("Failed to open storage")?;

    match cli.command {
        Command::Init => run_init(&recycle, &ctx)?,
        Command::Mkdir { path } => run_create(&recycle, &ctx, &path, None, cli.format)?,
        Command::Put { path, source } => {
            let content = read_source(source)?;
            run_create(&recycle, &ctx, &path, Some(&content), cli.format)?;
        }
        Command::Stat { path, follow } => {
            let node = recycle
                .lookup()
                .node_from_path(&ctx, &path, follow)
                .with_context(|| format!("Failed to resolve {path}"))?;
            if !node.exists {
                bail!("{path}: no such node");
            }
            print_info(&recycle.tree().resource_info(&ctx, &node)?, cli.format)?;
        }
        Command::Path { id } => {
            let node = recycle
                .lookup()
                .node_from_id(&ResourceId::local(id.as_str()))
                .with_context(|| format!("Failed to resolve node {id}"))?;
            println!("{}", recycle.lookup().path(&ctx, &node)?);
        }
        Command::Rm { path } => {
            let node = recycle.lookup().node_from_path(&ctx, &path, false)?;
            if !node.exists {
                bail!("{path}: no such node");
            }
            let key = recycle.tree().delete(&ctx, &node)?;
            match cli.format {
                OutputFormat::Text => println!("{key}"),
                OutputFormat::Json => {
                    println!("{}", serde_json::json!({ "key": key, "path": path }));
                }
            }
        }
        Command::Trash { command } => run_trash(&recycle, &ctx, command, cli.format)?,
    }

    Ok(())
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Build options from the config file and the command line flags.
fn load_options(cli: &Cli) -> Result<Options> {
    let mut options = match &cli.config {
        Some(path) => Options::from_toml_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => {
            let root = cli
                .root
                .clone()
                .ok_or_else(|| eyre!("either --root or --config is required"))?;
            Options::builder()
                .root(root)
                .build()
                .context("Invalid options")?
        }
    };
    if let (Some(_), Some(root)) = (&cli.config, &cli.root) {
        options.root = root.clone();
    }
    if cli.home {
        options.enable_home = true;
    }
    Ok(options)
}

/// Parse `username` or `idp:username`.
fn parse_user(arg: &str) -> User {
    let (idp, name) = arg.rsplit_once(':').unwrap_or(("local", arg));
    User::new(UserId::new(idp, name), name)
}

fn read_source(source: Option<PathBuf>) -> Result<Vec<u8>> {
    match source {
        Some(path) => {
            std::fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))
        }
        None => {
            let mut buf = Vec::new();
            std::io::stdin().read_to_end(&mut buf)?;
            Ok(buf)
        }
    }
}

fn run_init(recycle: &Recycle, ctx: &RequestContext) -> Result<()> {
    recycle.tree().setup()?;
    let options = recycle.lookup().options();
    eprintln!("Initialized {}", options.root.display());

    if options.enable_home && ctx.user().is_some() {
        let home = recycle.tree().create_home(ctx)?;
        eprintln!("Home ready ({})", home.id);
    }
    Ok(())
}

fn run_create(
    recycle: &Recycle,
    ctx: &RequestContext,
    path: &str,
    content: Option<&[u8]>,
    format: OutputFormat,
) -> Result<()> {
    let lookup = recycle.lookup();
    let target = lookup.node_from_path(ctx, path, false)?;
    if target.exists {
        bail!("{path}: already exists");
    }
    let parent = target.parent(lookup)?;
    let node = match content {
        Some(bytes) => recycle.tree().create_file(ctx, &parent, &target.name, bytes)?,
        None => recycle.tree().create_dir(ctx, &parent, &target.name)?,
    };
    print_info(&recycle.tree().resource_info(ctx, &node)?, format)
}

fn run_trash(
    recycle: &Recycle,
    ctx: &RequestContext,
    command: TrashCommand,
    format: OutputFormat,
) -> Result<()> {
    match command {
        TrashCommand::List { key, path } => {
            let key = key.unwrap_or_default();
            let listing = recycle.list_recycle_report(ctx, &key, &path)?;
            match format {
                OutputFormat::Text => {
                    if listing.items.is_empty() {
                        println!(" Trash is empty.");
                    }
                    for item in &listing.items {
                        print_item(item);
                    }
                    if listing.skipped > 0 {
                        eprintln!("{} unreadable entr(y/ies) skipped", listing.skipped);
                    }
                }
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&listing)?);
                }
            }
        }
        TrashCommand::Restore { key, path, to } => {
            let target = to.map(Reference::from_path);
            recycle.restore_recycle_item(ctx, &key, &path, target.as_ref())?;
            eprintln!("Restored {key}");
        }
        TrashCommand::Purge { key, path } => {
            recycle.purge_recycle_item(ctx, &key, &path)?;
            eprintln!("Purged {key}");
        }
        TrashCommand::Empty => {
            recycle.empty_recycle(ctx)?;
            eprintln!("Trash emptied");
        }
    }
    Ok(())
}

fn print_info(info: &ResourceInfo, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            println!(" {}", info.path);
            println!("   id:     {}", info.id);
            println!("   type:   {}", info.resource_type);
            println!("   size:   {}", format_size(info.size));
            if let Some(owner) = &info.owner {
                println!("   owner:  {} ({})", owner.opaque_id, owner.idp);
            }
            if let Some(space) = &info.space_root {
                println!("   space:  {space}");
            }
            if let Some(target) = &info.reference {
                println!("   ref:    {}", target.to_reference_attr());
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(info)?);
        }
    }
    Ok(())
}

fn print_item(item: &RecycleItem) {
    let deleted = item
        .deletion_time
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string());
    println!(
        " {:<40} {:<9} {:>10}  {}  {}",
        item.key,
        item.resource_type,
        format_size(item.size),
        deleted,
        item.origin_path
    );
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}
