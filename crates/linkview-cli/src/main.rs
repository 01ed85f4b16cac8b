use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod app;
mod commands;
mod errors;
mod output;

use app::App;

#[derive(Parser)]
#[command(name = "linkview", version, about = "linkview - tag views as hardlink trees")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show workspaces, views and catalog size
    Status,
    /// Validate configuration file
    Validate,
    /// Manage tag dimensions
    Dimension {
        #[command(subcommand)]
        action: DimensionAction,
    },
    /// Register, tag and move source files
    File {
        #[command(subcommand)]
        action: FileAction,
    },
    /// Save, check, delete and list views
    View {
        #[command(subcommand)]
        action: ViewAction,
    },
    /// Remove stale links and empty folders
    Reconcile {
        /// Workspace id
        workspace: String,
    },
    /// Rebuild every view of a workspace, then reconcile
    Sync {
        /// Workspace id
        workspace: String,
    },
    /// Materialize a folder plan from a JSON file
    Plan {
        /// Workspace id
        workspace: String,
        /// Plan file with `tree`, `assignments` and `options`
        plan: PathBuf,
        /// Link every assigned file directly into the virtual root
        #[arg(long)]
        flatten: bool,
    },
    /// Show the virtual folder tree
    Tree {
        /// Workspace id
        workspace: String,
        /// Maximum depth to recurse
        #[arg(short, long)]
        depth: Option<usize>,
    },
    /// Check the virtual tree against the catalog
    Verify {
        /// Workspace id
        workspace: String,
    },
    /// Reconcile periodically until interrupted
    Watch {
        /// Workspace id
        workspace: String,
        /// Interval between passes (e.g. 30s, 5m); defaults to config
        #[arg(short, long)]
        interval: Option<String>,
        /// Stop after this many passes
        #[arg(long)]
        passes: Option<usize>,
    },
}

#[derive(Subcommand)]
enum DimensionAction {
    /// Create a dimension (no-op if it exists)
    Add {
        /// Dimension name, e.g. Genre
        name: String,
    },
    /// List dimensions
    List,
}

#[derive(Subcommand)]
enum FileAction {
    /// Register a file of a configured workspace
    Add {
        /// Path of the file
        path: PathBuf,
        /// Name used for its links instead of the file name
        #[arg(long)]
        name: Option<String>,
        /// Tag as dimension=value; repeatable
        #[arg(short, long = "tag")]
        tags: Vec<String>,
    },
    /// List files of a workspace
    List {
        /// Workspace id
        workspace: String,
    },
    /// Add a tag to a file
    Tag {
        /// File id
        id: String,
        /// Tag as dimension=value
        tag: String,
    },
    /// Remove every value of a dimension from a file
    Untag {
        /// File id
        id: String,
        /// Dimension name
        dimension: String,
    },
    /// Include or exclude a file from views
    Eligible {
        /// File id
        id: String,
        /// true or false
        #[arg(action = clap::ArgAction::Set)]
        eligible: bool,
    },
    /// Move a file and carry its links along
    Move {
        /// File id
        id: String,
        /// Destination path
        new_path: PathBuf,
    },
}

#[derive(Subcommand)]
enum ViewAction {
    /// List views, of one workspace or all
    List {
        /// Workspace id
        workspace: Option<String>,
    },
    /// Save a view and materialize it
    Save {
        /// Workspace id
        workspace: String,
        /// Display name
        name: String,
        /// Tag chain as dimension=value, outermost first
        #[arg(required = true)]
        chain: Vec<String>,
        /// View id; derived from the name when omitted
        #[arg(long)]
        id: Option<String>,
        /// Parent view id
        #[arg(long)]
        parent: Option<String>,
    },
    /// Check whether a chain could be saved (exit code 1 on conflict)
    Check {
        /// Workspace id
        workspace: String,
        /// Tag chain as dimension=value, outermost first
        #[arg(required = true)]
        chain: Vec<String>,
        /// Ignore this view when checking
        #[arg(long)]
        exclude: Option<String>,
    },
    /// Delete a view and its links
    Delete {
        /// Workspace id
        workspace: String,
        /// View id
        id: String,
    },
    /// Rename a view without touching its links
    Rename {
        /// Workspace id
        workspace: String,
        /// View id
        id: String,
        /// New display name
        name: String,
    },
}

fn find_config() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("LINKVIEW_CONFIG") {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    let cwd_config = PathBuf::from("linkview.yaml");
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    if let Some(home) = dirs_next::home_dir() {
        let home_config = home.join(".config/linkview/config.yaml");
        if home_config.exists() {
            return Some(home_config);
        }
    }

    None
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = cli
        .config
        .or_else(find_config)
        .ok_or("No configuration file found. Use --config, set LINKVIEW_CONFIG, or create linkview.yaml")?;

    if let Commands::Validate = cli.command {
        return commands::validate::run(&config_path).await;
    }

    let app = App::open(&config_path)?;
    let json = cli.json;

    match cli.command {
        Commands::Status => commands::status::run(&app, json).await?,
        Commands::Dimension { action } => match action {
            DimensionAction::Add { name } => commands::dimension::run_add(&app, &name, json)?,
            DimensionAction::List => commands::dimension::run_list(&app, json)?,
        },
        Commands::File { action } => match action {
            FileAction::Add { path, name, tags } => {
                commands::file::run_add(&app, &path, name.as_deref(), &tags, json)?
            }
            FileAction::List { workspace } => commands::file::run_list(&app, &workspace, json)?,
            FileAction::Tag { id, tag } => commands::file::run_tag(&app, &id, &tag)?,
            FileAction::Untag { id, dimension } => commands::file::run_untag(&app, &id, &dimension)?,
            FileAction::Eligible { id, eligible } => commands::file::run_eligible(&app, &id, eligible)?,
            FileAction::Move { id, new_path } => {
                commands::file::run_move(&app, &id, &new_path, json).await?
            }
        },
        Commands::View { action } => match action {
            ViewAction::List { workspace } => {
                commands::view::run_list(&app, workspace.as_deref(), json).await?
            }
            ViewAction::Save {
                workspace,
                name,
                chain,
                id,
                parent,
            } => {
                let args = commands::view::SaveArgs {
                    workspace,
                    name,
                    chain,
                    id,
                    parent,
                };
                commands::view::run_save(&app, args, json).await?
            }
            ViewAction::Check {
                workspace,
                chain,
                exclude,
            } => commands::view::run_check(&app, &workspace, &chain, exclude.as_deref(), json).await?,
            ViewAction::Delete { workspace, id } => {
                commands::view::run_delete(&app, &workspace, &id, json).await?
            }
            ViewAction::Rename { workspace, id, name } => {
                commands::view::run_rename(&app, &workspace, &id, &name, json).await?
            }
        },
        Commands::Reconcile { workspace } => commands::reconcile::run(&app, &workspace, json).await?,
        Commands::Sync { workspace } => commands::sync::run(&app, &workspace, json).await?,
        Commands::Plan {
            workspace,
            plan,
            flatten,
        } => commands::plan::run(&app, &workspace, &plan, flatten, json).await?,
        Commands::Tree { workspace, depth } => commands::tree::run(&app, &workspace, depth).await?,
        Commands::Verify { workspace } => commands::verify::run(&app, &workspace, json).await?,
        Commands::Watch {
            workspace,
            interval,
            passes,
        } => commands::watch::run(&app, &workspace, interval.as_deref(), passes, json).await?,
        Commands::Validate => {
            return Err("Internal error: command should have been handled earlier".into());
        }
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return match err.exit_code() {
                0 => ExitCode::SUCCESS,
                code => ExitCode::from(code.clamp(1, 255) as u8),
            };
        }
    };
    init_tracing();

    if let Err(e) = run(cli).await {
        errors::print_error(e.as_ref());
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
