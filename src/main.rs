use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use rainboard::config::Settings;
use rainboard::forge::HttpForgeClient;
use rainboard::reconcile::{url_github, url_gitlab, url_travis};
use rainboard::server::{AppState, create_router};
use rainboard::store::{SqliteStore, Store};
use rainboard::types::Project;

#[derive(Parser)]
#[command(name = "rainboard")]
#[command(about = "Mirror projects across forges and relay their webhooks", long_about = None)]
struct Cli {
    /// Settings file
    #[arg(long, short, global = true, default_value = "rainboard.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and the configured forges
    Init,

    /// Start the webhook server
    Serve,

    /// Pull projects from the forges
    Sync {
        /// Only synchronize the forge with this slug
        #[arg(long)]
        forge: Option<String>,
    },

    /// Run the update cycle of every project
    Update {
        /// Only update this project (name or slug)
        #[arg(long)]
        project: Option<String>,

        /// Also resolve contributors from the git history
        #[arg(long)]
        contributors: bool,
    },

    /// Fetch every remote and move mirrored branches to their upstream tips
    Fetch,

    /// Delete projects owned by personal namespaces
    PrunePersonal,

    /// Show a project and its forge URLs
    Info {
        /// Project name or slug
        project: String,
    },
}

fn open_state(settings: Settings, create: bool) -> anyhow::Result<AppState> {
    let db_path = settings.db_path();
    if !create && !db_path.exists() {
        bail!(
            "Database not found at {}. Run 'rainboard init' first.",
            db_path.display()
        );
    }
    fs::create_dir_all(&settings.data_dir)?;

    let store = SqliteStore::new(&db_path)?;
    store.initialize()?;
    let client = HttpForgeClient::new(Duration::from_secs(settings.timeout_secs))?;
    Ok(AppState::new(Arc::new(store), Arc::new(client), settings))
}

fn find_project(state: &AppState, name: &str) -> anyhow::Result<Project> {
    let project = match state.store.get_project_by_name(name)? {
        Some(project) => Some(project),
        None => state.store.get_project_by_slug(name)?,
    };
    project.with_context(|| format!("project '{name}' not found"))
}

fn run_init(settings: Settings) -> anyhow::Result<()> {
    let state = open_state(settings, true)?;
    fs::create_dir_all(state.mirrors.root())?;

    let forges = state.reconciler().seed_forges()?;
    println!("Database ready at {}", state.settings.db_path().display());
    for forge in forges {
        println!("  {} ({}) {}", forge.slug, forge.source, forge.url);
    }
    Ok(())
}

fn run_info(state: &AppState, name: &str) -> anyhow::Result<()> {
    let project = find_project(state, name)?;
    let store = state.store.as_ref();

    println!("{}", project.name);
    if let Some(version) = &project.version {
        println!("  version: {version}");
    }
    if let Some(description) = &project.description {
        println!("  description: {description}");
    }
    for (label, url) in [
        ("github", url_github(store, &project)?),
        ("gitlab", url_gitlab(store, &project)?),
        ("travis", url_travis(store, &project)?),
    ] {
        if let Some(url) = url {
            println!("  {label}: {url}");
        }
    }
    Ok(())
}

fn serve(state: AppState) -> anyhow::Result<()> {
    let addr = state.settings.socket_addr()?;
    // The blocking forge client must be dropped outside the runtime.
    let state = Arc::new(state);
    let app = create_router(Arc::clone(&state));

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        info!("Starting server on {}", addr);
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;
        Ok::<(), anyhow::Error>(())
    })
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("rainboard=info".parse()?))
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(&cli.config)?;

    match cli.command {
        Commands::Init => run_init(settings)?,
        Commands::Serve => serve(open_state(settings, false)?)?,
        Commands::Sync { forge } => {
            let state = open_state(settings, false)?;
            let reconciler = state.reconciler();
            match forge {
                Some(slug) => {
                    let forge = state
                        .store
                        .get_forge_by_slug(&slug)?
                        .with_context(|| format!("forge '{slug}' not found"))?;
                    reconciler.sync_forge(&forge)?;
                }
                None => reconciler.sync_all()?,
            }
        }
        Commands::Update {
            project,
            contributors,
        } => {
            let state = open_state(settings, false)?;
            match project {
                Some(name) => {
                    let project = find_project(&state, &name)?;
                    state.reconciler().update_project(project.id, contributors)?;
                }
                None => {
                    let failures = state.reconciler().update_all(contributors)?;
                    if failures > 0 {
                        bail!("{failures} projects failed to update");
                    }
                }
            }
        }
        Commands::Fetch => {
            let state = open_state(settings, false)?;
            let failures = state.reconciler().fetch_all()?;
            if failures > 0 {
                bail!("{failures} projects failed to fetch");
            }
        }
        Commands::PrunePersonal => {
            let state = open_state(settings, false)?;
            let removed = state.reconciler().prune_personal()?;
            println!("Removed {removed} personal projects");
        }
        Commands::Info { project } => {
            let state = open_state(settings, false)?;
            run_info(&state, &project)?;
        }
    }

    Ok(())
}
