use clap::{Parser, Subcommand};
use md2wiki::config::{self, SyncConfig};
use md2wiki::convert::Converter;
use md2wiki::diagram::CommandRenderer;
use md2wiki::index::{PageIndex, build_index};
use md2wiki::store::PageStore;
use md2wiki::store::confluence::{Auth, ConfluenceSettings, ConfluenceStore};
use md2wiki::store::local::LocalStore;
use md2wiki::sync::{SyncOptions, sync};
use md2wiki::{output, scan};
use std::path::{Path, PathBuf};

/// Connection and target overrides for the remote command.
#[derive(clap::Args, Clone)]
struct RemoteArgs {
    /// Wiki host, e.g. example.atlassian.net
    #[arg(long, env = "CONFLUENCE_DOMAIN")]
    domain: Option<String>,

    /// Path prefix of the wiki, e.g. /wiki/
    #[arg(long, env = "CONFLUENCE_PATH")]
    path: Option<String>,

    /// Account e-mail. Without it the API key is sent as a bearer token
    #[arg(long, env = "CONFLUENCE_USER_NAME")]
    user: Option<String>,

    /// API token or personal access token
    #[arg(long, env = "CONFLUENCE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[command(flatten)]
    target: TargetArgs,
}

/// Overrides shared by every command that publishes.
#[derive(clap::Args, Clone)]
struct TargetArgs {
    /// Space that receives pages without a space-key directive
    #[arg(long, env = "CONFLUENCE_SPACE_KEY")]
    space: Option<String>,

    /// Existing page the root index document is published under
    #[arg(long)]
    root_page: Option<String>,

    /// Create a page for each directory without index.md or README.md
    #[arg(long)]
    keep_hierarchy: bool,
}

#[derive(Parser)]
#[command(name = "md2wiki")]
#[command(about = "Publish a Markdown directory tree as Confluence pages")]
#[command(long_about = "\
Publish a Markdown directory tree as Confluence pages

Your directory tree is the page tree. index.md or README.md becomes the
parent page of its directory, every other Markdown file becomes a child.

Source structure:

  docs/
  ├── md2wiki.toml             # Config (optional)
  ├── .mdignore                # Glob patterns excluded in this directory
  ├── index.md                 # Root page (or set root_page_id)
  ├── install.md               # Child of the root page
  └── api/
      ├── README.md            # Child of the root, parent of auth.md
      └── auth.md

Title resolution (first available wins):
  front matter title → single top-level heading → file name

After the first sync every file carries a confluence-page-id directive,
so renames keep updating the same page.

Run 'md2wiki gen-config' to generate a documented md2wiki.toml.")]
#[command(version)]
struct Cli {
    /// Synchronization root
    #[arg(long, default_value = ".", global = true)]
    root: PathBuf,

    /// More log output (-v info, -vv debug). RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Publish the tree to a Confluence site
    Sync(SyncArgs),
    /// Publish the tree to a local store under .md2wiki/ and write .csf files
    Local(TargetArgs),
    /// Index the tree and print the page hierarchy without publishing
    Check,
    /// Convert one file and print its storage format to stdout
    Convert {
        /// Markdown file inside the root
        file: PathBuf,
    },
    /// Print a stock md2wiki.toml with all options documented
    GenConfig,
}

#[derive(clap::Args, Clone)]
struct SyncArgs {
    #[command(flatten)]
    remote: RemoteArgs,

    /// Do not write page ids back into the Markdown files
    #[arg(long)]
    skip_update: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Sync(args) => {
            let mut config = config::load_config(&cli.root)?;
            apply_target(&mut config, &args.remote.target);
            if let Some(domain) = &args.remote.domain {
                config.site.domain = domain.clone();
            }
            if let Some(path) = &args.remote.path {
                config.site.base_path = path.clone();
            }
            config.skip_update |= args.skip_update;
            config.validate()?;
            if config.space_key.is_none() {
                return Err("no space key: pass --space, set CONFLUENCE_SPACE_KEY or space_key".into());
            }

            let api_key = args
                .remote
                .api_key
                .clone()
                .ok_or("no API key: pass --api-key or set CONFLUENCE_API_KEY")?;
            let auth = match &args.remote.user {
                Some(user) => Auth::Basic {
                    user: user.clone(),
                    api_key,
                },
                None => Auth::Bearer(api_key),
            };
            let store = ConfluenceStore::new(ConfluenceSettings {
                domain: config.site.domain.clone(),
                base_path: config.site.base_path.clone(),
                auth,
            })?;
            println!("==> Synchronizing {}", cli.root.display());
            run_sync(&cli.root, &config, &store, &SyncOptions::default())?;
        }
        Command::Local(target) => {
            let mut config = config::load_config(&cli.root)?;
            apply_target(&mut config, &target);
            config.skip_update = true;
            config.validate()?;
            let store = LocalStore::open(&cli.root)?;
            println!("==> Publishing {} locally", cli.root.display());
            run_sync(
                &cli.root,
                &config,
                &store,
                &SyncOptions { write_csf: true },
            )?;
        }
        Command::Check => {
            let config = config::load_config(&cli.root)?;
            println!("==> Checking {}", cli.root.display());
            let plan = build_index(&scan::scan(&cli.root)?, &config)?;
            output::print_check_output(&plan);
            if !plan.failures.is_empty() {
                std::process::exit(1);
            }
            println!("==> Tree is valid");
        }
        Command::Convert { file } => {
            let mut config = config::load_config(&cli.root)?;
            // Pages that were never synchronized have no id to link to.
            config.converter.force_valid_url = false;
            let body = convert_one(&cli.root, &file, &config)?;
            println!("{}", body);
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Logging goes to stderr at `warn` unless raised by `-v` or `RUST_LOG`.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn apply_target(config: &mut SyncConfig, target: &TargetArgs) {
    if let Some(space) = &target.space {
        config.space_key = Some(space.clone());
    }
    if let Some(page) = &target.root_page {
        config.root_page_id = Some(page.clone());
    }
    config.keep_hierarchy |= target.keep_hierarchy;
}

/// Run the pipeline with a printer thread and exit non-zero on failures.
fn run_sync(
    root: &Path,
    config: &SyncConfig,
    store: &dyn PageStore,
    options: &SyncOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    init_thread_pool(&config.processing);
    let renderer = CommandRenderer::new(config.diagrams.clone());
    let (tx, rx) = std::sync::mpsc::channel();
    let printer = std::thread::spawn(move || {
        for event in rx {
            for line in output::format_sync_event(&event) {
                println!("{}", line);
            }
        }
    });
    let result = sync(root, config, store, &renderer, options, Some(tx));
    printer.join().map_err(|_| "output thread panicked")?;
    let report = result?;

    println!();
    output::print_run_summary(&report);
    if report.has_failures() {
        std::process::exit(1);
    }
    Ok(())
}

/// Convert a single file against the current identities of the tree.
fn convert_one(
    root: &Path,
    file: &Path,
    config: &SyncConfig,
) -> Result<String, Box<dyn std::error::Error>> {
    let plan = build_index(&scan::scan(root)?, config)?;
    let wanted = file.canonicalize()?;
    let doc = plan
        .documents
        .iter()
        .find(|d| d.path.canonicalize().is_ok_and(|p| p == wanted))
        .ok_or_else(|| {
            match plan.failures.iter().find(|f| plan.root.join(&f.relative) == wanted) {
                Some(failure) => format!("{}: {}", failure.relative, failure.error),
                None => format!("{} is not a document under {}", file.display(), root.display()),
            }
        })?;
    let index = PageIndex::new(&plan.root, &plan.documents);
    let renderer = CommandRenderer::new(config.diagrams.clone());
    let converted = Converter::new(config, &index, &renderer).convert(doc)?;
    Ok(converted.body)
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores; the config can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
