///
/// This module implements the full CLI interface for diversion-sync: command parsing,
/// argument validation, main entrypoints, and user-visible output.
///
/// All synchronisation logic (trees, script resolution, changelogs, polling) lives in the
/// [`diversion-sync-core`] crate. This module is strictly CLI glue: it loads the config,
/// builds the HTTP gateway, plays the host build for the core and prints results.
///
/// ## Features
/// - Entry struct [`Cli`] defines all user-facing options and subcommands.
/// - `checkout` runs one synchronisation pass per configured source, concurrently, sharing a
///   single build session so the build ends up with one meaningful changelog.
/// - `poll` prints whether a new build is due; gateway failures read as "no changes".
/// - Inspection commands: `changelog`, `resolve-script`, `ls`, `state`, `tags`.
/// - Async entrypoint (`run`) for programmatic invocation and integration testing.
///
/// [`diversion-sync-core`]: ../../diversion-sync-core/
use crate::gateway::HttpGateway;
use crate::load_config::load_config;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use diversion_sync_core::changelog::read_changelog;
use diversion_sync_core::checkout::{checkout, CheckoutRequest};
use diversion_sync_core::config::{Config, SourceConfig};
use diversion_sync_core::contract::{HostBuild, RemoteGateway};
use diversion_sync_core::polling::poll;
use diversion_sync_core::resolver::{resolve_script_in_tree, DEFAULT_SCRIPT_NAME};
use diversion_sync_core::revision::{
    current_revision_state, head_revision, read_state, write_state, RecordedState,
};
use diversion_sync_core::session::{SessionRegistry, SourceRole};
use diversion_sync_core::tree::{NodeKind, RevisionTree};
use futures::future::try_join_all;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// CLI for diversion-sync: materialise Diversion sources for builds and detect changes.
#[derive(Parser)]
#[clap(
    name = "diversion-sync",
    version,
    about = "Synchronise build workspaces with Diversion repositories"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check out every configured source and record changelogs and the next baseline
    Checkout {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Workspace of the primary source; libraries go to `<workspace>@libs/<repository>`
        #[clap(long)]
        workspace: PathBuf,
        /// Build identifier; a random one is generated when omitted
        #[clap(long)]
        build_id: Option<String>,
        /// Job name used for script auto-detection
        #[clap(long, default_value = "")]
        job: String,
        /// Directory receiving one changelog file per source
        #[clap(long)]
        changelog_dir: Option<PathBuf>,
        /// State recorded by the previous build
        #[clap(long)]
        baseline: Option<PathBuf>,
        /// Where to write the state for the next build; printed when omitted
        #[clap(long)]
        state_out: Option<PathBuf>,
    },
    /// Decide whether a source changed since the recorded baseline
    Poll {
        #[clap(long)]
        config: PathBuf,
        #[clap(long)]
        baseline: PathBuf,
        /// Index of the source in the config
        #[clap(long, default_value_t = 0)]
        source: usize,
    },
    /// Print a recorded changelog
    Changelog {
        #[clap(long)]
        file: PathBuf,
    },
    /// Show which script a job would run
    ResolveScript {
        #[clap(long)]
        config: PathBuf,
        #[clap(long)]
        job: String,
        #[clap(long, default_value = DEFAULT_SCRIPT_NAME)]
        requested: String,
        #[clap(long, default_value_t = 0)]
        source: usize,
    },
    /// List a directory of a source's head revision
    Ls {
        #[clap(long)]
        config: PathBuf,
        #[clap(long, default_value = "")]
        path: String,
        #[clap(long, default_value_t = 0)]
        source: usize,
    },
    /// Print the revision state a build of this source would record now
    State {
        #[clap(long)]
        config: PathBuf,
        #[clap(long, default_value_t = 0)]
        source: usize,
    },
    /// Print the branch and head commit a source's reference resolves to
    Head {
        #[clap(long)]
        config: PathBuf,
        #[clap(long, default_value_t = 0)]
        source: usize,
    },
    /// List the branches of a source's repository, marking the default one
    Branches {
        #[clap(long)]
        config: PathBuf,
        #[clap(long, default_value_t = 0)]
        source: usize,
    },
    /// List the tags of a source's repository, or show one tag
    Tags {
        #[clap(long)]
        config: PathBuf,
        #[clap(long, default_value_t = 0)]
        source: usize,
        #[clap(long)]
        tag: Option<String>,
    },
}

/// The CLI invocation acting as the host build.
struct CliBuild {
    build_id: String,
    job: String,
    previous: Option<RecordedState>,
    primary_repository_id: Option<String>,
}

impl HostBuild for CliBuild {
    fn build_id(&self) -> String {
        self.build_id.clone()
    }

    fn job_name(&self) -> String {
        self.job.clone()
    }

    fn previous_state(&self) -> Option<RecordedState> {
        self.previous.clone()
    }

    fn primary_repository_id(&self) -> Option<String> {
        self.primary_repository_id.clone()
    }
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Checkout {
            config,
            workspace,
            build_id,
            job,
            changelog_dir,
            baseline,
            state_out,
        } => {
            let config = load_config(config)?;
            let roles = config.validate_roles(&workspace)?;
            let gateway: Arc<dyn RemoteGateway> =
                Arc::new(HttpGateway::new_from_env(config.api.base_url.as_deref())?);
            let build_id = build_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let previous = match &baseline {
                Some(path) => read_state(path)
                    .with_context(|| format!("Failed to read baseline {}", path.display()))?,
                None => None,
            };
            let host = CliBuild {
                build_id: build_id.clone(),
                job,
                previous,
                primary_repository_id: config
                    .primary_repository_id(&workspace)
                    .map(str::to_string),
            };
            tracing::info!(command = "checkout", build_id = %build_id, sources = config.sources.len(), "Starting checkout");

            let registry = SessionRegistry::new();
            let session = registry.session(&build_id);
            let sources = config.sources.iter().zip(roles).enumerate();
            let passes = sources.map(|(i, (source, role))| {
                let mut source = source.clone();
                source.role = Some(role);
                let request = CheckoutRequest {
                    workspace: source_workspace(&workspace, role, &source.repository_id),
                    source,
                    changelog: changelog_dir
                        .as_ref()
                        .map(|dir| dir.join(format!("changelog{i}.json"))),
                };
                let gateway = Arc::clone(&gateway);
                let host = &host;
                let session = &session;
                let settings = &config.settings;
                async move { checkout(gateway, host, session, &request, settings).await }
            });
            let result = try_join_all(passes).await;
            registry.end(&build_id);

            let reports = match result {
                Ok(reports) => reports,
                Err(e) => {
                    tracing::error!(command = "checkout", error = %e, "Checkout failed");
                    return Err(anyhow::Error::new(e).context("Checkout failed"));
                }
            };
            for report in &reports {
                println!(
                    "{} {}: {} file(s) written, {} skipped, {} changelog entr{}",
                    report.role,
                    report.repository_id,
                    report.written.len(),
                    report.skipped.len(),
                    report.changelog_entries,
                    if report.changelog_entries == 1 { "y" } else { "ies" }
                );
            }

            let mut states: Vec<RecordedState> = reports
                .into_iter()
                .filter_map(|r| r.state.map(RecordedState::from))
                .collect();
            let recorded = match states.len() {
                0 => None,
                1 => states.pop(),
                _ => Some(RecordedState::Composite { states }),
            };
            match (recorded, state_out) {
                (Some(state), Some(path)) => {
                    write_state(&path, &state)
                        .with_context(|| format!("Failed to write state {}", path.display()))?;
                    tracing::info!(path = %path.display(), "Recorded state written");
                }
                (Some(state), None) => println!("{}", serde_json::to_string_pretty(&state)?),
                (None, _) => tracing::warn!("No revision state could be recorded"),
            }
            tracing::info!(command = "checkout", "Checkout complete");
            Ok(())
        }
        Commands::Poll {
            config,
            baseline,
            source,
        } => {
            let config = load_config(config)?;
            let source = select_source(&config, source)?;
            let gateway = HttpGateway::new_from_env(config.api.base_url.as_deref())?;
            let baseline = match read_state(&baseline) {
                Ok(state) => state,
                Err(e) => {
                    tracing::warn!(error = %e, "Unreadable baseline, treating as absent");
                    None
                }
            };
            let outcome = poll(
                &gateway,
                &source.repository_id,
                &source.branch,
                baseline.as_ref(),
            )
            .await;
            println!("{}", serde_json::to_string(&outcome)?);
            tracing::info!(command = "poll", ?outcome, trigger = outcome.should_trigger(), "Poll complete");
            Ok(())
        }
        Commands::Changelog { file } => {
            match read_changelog(&file)
                .with_context(|| format!("Failed to read changelog {}", file.display()))?
            {
                None => println!("No changelog recorded at {}", file.display()),
                Some(record) if record.is_empty() => println!("No changes"),
                Some(record) => {
                    for entry in &record.entries {
                        println!(
                            "{} {} {}: {}",
                            entry.commit_id,
                            entry.timestamp,
                            entry.author_name,
                            entry.message.lines().next().unwrap_or_default()
                        );
                        for path in &entry.changed_paths {
                            println!("    {path}");
                        }
                    }
                }
            }
            Ok(())
        }
        Commands::ResolveScript {
            config,
            job,
            requested,
            source,
        } => {
            let config = load_config(config)?;
            let source = select_source(&config, source)?;
            let gateway = Arc::new(HttpGateway::new_from_env(config.api.base_url.as_deref())?);
            let tree = RevisionTree::new(gateway, source.repository_id.clone(), source.branch.clone());
            let resolved = resolve_script_in_tree(
                &tree,
                source.script_path.as_deref(),
                &job,
                &requested,
                &config.settings.naming(),
            )
            .await;
            println!("{}", resolved.path());
            tracing::info!(command = "resolve-script", ?resolved, "Script resolved");
            Ok(())
        }
        Commands::Ls {
            config,
            path,
            source,
        } => {
            let config = load_config(config)?;
            let source = select_source(&config, source)?;
            let gateway = Arc::new(HttpGateway::new_from_env(config.api.base_url.as_deref())?);
            let tree = Arc::new(
                RevisionTree::new(gateway, source.repository_id.clone(), source.branch.clone())
                    .with_conventional_dirs(config.settings.conventional_dirs.clone()),
            );
            let node = tree.root_node().child(&path);
            if !node.is_directory().await {
                anyhow::bail!(
                    "{path} is not a directory in {} ({:?})",
                    source.repository_id,
                    node.kind().await
                );
            }
            let children = node
                .children()
                .await
                .with_context(|| format!("Failed to list {}", source.repository_id))?;
            for child in children {
                let marker = match child.cached_kind() {
                    Some(NodeKind::Directory) => "d",
                    Some(NodeKind::File) => "f",
                    _ => "?",
                };
                println!("{marker} {}", child.full_path());
            }
            Ok(())
        }
        Commands::State { config, source } => {
            let config = load_config(config)?;
            let source = select_source(&config, source)?;
            let gateway = HttpGateway::new_from_env(config.api.base_url.as_deref())?;
            let state = current_revision_state(&gateway, &source.repository_id, &source.branch)
                .await
                .with_context(|| format!("Failed to read head of {}", source.repository_id))?;
            println!(
                "{}",
                serde_json::to_string_pretty(&RecordedState::from(state))?
            );
            Ok(())
        }
        Commands::Head { config, source } => {
            let config = load_config(config)?;
            let source = select_source(&config, source)?;
            let gateway = HttpGateway::new_from_env(config.api.base_url.as_deref())?;
            let head = head_revision(&gateway, &source.repository_id, &source.branch)
                .await
                .with_context(|| format!("Failed to resolve head of {}", source.branch))?;
            println!("{} {} {}", head.branch_name, head.branch_id, head.commit_id);
            tracing::info!(command = "head", commit_id = %head.commit_id, "Head resolved");
            Ok(())
        }
        Commands::Branches { config, source } => {
            let config = load_config(config)?;
            let source = select_source(&config, source)?;
            let gateway = HttpGateway::new_from_env(config.api.base_url.as_deref())?;
            let repository = gateway
                .get_repository(&source.repository_id)
                .await
                .with_context(|| format!("Failed to read repository {}", source.repository_id))?;
            let branches = gateway
                .list_branches(&source.repository_id)
                .await
                .with_context(|| format!("Failed to list branches of {}", repository.name))?;
            tracing::info!(
                command = "branches",
                repository = %repository.name,
                count = branches.len(),
                "Branches listed"
            );
            for branch in branches {
                let marker = if branch.id == repository.default_branch
                    || branch.name == repository.default_branch
                {
                    "*"
                } else {
                    " "
                };
                println!(
                    "{marker} {} {} {}",
                    branch.name,
                    branch.id,
                    branch.head_commit_id.as_deref().unwrap_or("-")
                );
            }
            Ok(())
        }
        Commands::Tags {
            config,
            source,
            tag,
        } => {
            let config = load_config(config)?;
            let source = select_source(&config, source)?;
            let gateway = HttpGateway::new_from_env(config.api.base_url.as_deref())?;
            let tags = match tag {
                Some(tag_id) => vec![gateway
                    .get_tag(&source.repository_id, &tag_id)
                    .await
                    .with_context(|| format!("Failed to read tag {tag_id}"))?],
                None => gateway
                    .list_tags(&source.repository_id)
                    .await
                    .with_context(|| {
                        format!("Failed to list tags of {}", source.repository_id)
                    })?,
            };
            for tag in tags {
                println!(
                    "{} {} {}",
                    tag.name,
                    tag.commit_id.as_deref().unwrap_or("-"),
                    tag.description.as_deref().unwrap_or("")
                );
            }
            Ok(())
        }
    }
}

fn select_source(config: &Config, index: usize) -> Result<&SourceConfig> {
    config.sources.get(index).with_context(|| {
        format!(
            "Source index {index} out of range, config has {} source(s)",
            config.sources.len()
        )
    })
}

/// Primary sources use the workspace itself, libraries a sibling `@libs` workspace.
fn source_workspace(workspace: &Path, role: SourceRole, repository_id: &str) -> PathBuf {
    match role {
        SourceRole::Auxiliary => {
            let mut libs = workspace.as_os_str().to_owned();
            if !workspace.to_string_lossy().contains("@libs") {
                libs.push("@libs");
            }
            PathBuf::from(libs).join(repository_id)
        }
        SourceRole::Primary => workspace.to_path_buf(),
    }
}
