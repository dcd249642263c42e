use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use client_core::{
    filter::TITLE_FIELD, load_settings, ActivityOrchestrator, AllowedServicesMonitor,
    CapacityMonitor, CategorySelection, ClubBackend, FilterState, HttpClubBackend,
    OrchestratorOptions, ScreenState, SessionContext,
};
use shared::domain::{ActivityStatus, Profile, ProfileId};
use tokio::sync::{watch, Notify};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Args {
    /// Overrides the backend url from club.toml / APP__BACKEND_URL.
    #[arg(long)]
    backend_url: Option<String>,
    #[arg(long)]
    member_id: String,
    #[arg(long, default_value = "Member")]
    member_name: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Lists the activities of the member or one of their dependents.
    Activities {
        #[arg(long)]
        profile: Option<String>,
        #[arg(long, default_value = "ALL")]
        category: CategorySelection,
        #[arg(long)]
        status: Option<ActivityStatus>,
        #[arg(long, default_value = "")]
        search: String,
    },
    /// Prints the current venue capacity snapshot.
    Capacity,
    /// Prints the services the member may book, in display order.
    Services,
}

struct CliSession {
    member: Profile,
    terminated: Notify,
}

impl SessionContext for CliSession {
    fn member(&self) -> Profile {
        self.member.clone()
    }

    fn force_logout(&self) {
        warn!(member_id = %self.member.id, "session terminated");
        self.terminated.notify_one();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let mut settings = load_settings()?;
    if let Some(url) = args.backend_url.as_deref() {
        settings.override_backend_url(url)?;
    }
    info!(backend_url = %settings.backend_url, "using club backend");

    let backend: Arc<dyn ClubBackend> = Arc::new(HttpClubBackend::from_settings(&settings)?);
    let session = Arc::new(CliSession {
        member: Profile::new(args.member_id, args.member_name),
        terminated: Notify::new(),
    });

    match args.command {
        Command::Activities {
            profile,
            category,
            status,
            search,
        } => {
            let orchestrator = ActivityOrchestrator::new(
                backend,
                session.clone(),
                OrchestratorOptions {
                    area_filter: settings.enrollment_area,
                    initial_filter: FilterState {
                        category,
                        status,
                        search_text: search,
                    },
                },
            );
            orchestrator.start().await;
            if let Some(profile) = profile {
                orchestrator.select_profile(ProfileId::new(profile)).await?;
            }
            let state = orchestrator.settled().await;
            if state.session_expired {
                session.force_logout();
            }
            if let Some(error) = state.error {
                bail!(error);
            }
            print_activities(&state);
        }
        Command::Capacity => {
            let monitor =
                CapacityMonitor::new(backend, session.clone(), settings.retry_policy());
            let mut updates = monitor.subscribe();
            monitor.refresh();
            let rows = wait_for_widget(&mut updates, &session).await?;
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        Command::Services => {
            let monitor =
                AllowedServicesMonitor::new(backend, session.clone(), settings.retry_policy());
            let mut updates = monitor.subscribe();
            monitor.refresh();
            for row in wait_for_widget(&mut updates, &session).await? {
                println!(
                    "{:>4}  group={} service={}",
                    row.order, row.group_id, row.service_id
                );
            }
        }
    }

    Ok(())
}

async fn wait_for_widget<T: Clone>(
    updates: &mut watch::Receiver<Option<Vec<T>>>,
    session: &CliSession,
) -> Result<Vec<T>> {
    tokio::select! {
        changed = updates.wait_for(Option::is_some) => {
            let rows = changed.map_err(|_| anyhow!("widget stopped before delivering data"))?;
            Ok(rows.clone().unwrap_or_default())
        }
        _ = session.terminated.notified() => {
            bail!("backend kept failing; session terminated")
        }
    }
}

fn print_activities(state: &ScreenState) {
    let selected = state
        .selected_profile
        .as_ref()
        .and_then(|id| state.profiles.iter().find(|profile| &profile.id == id));
    if let Some(profile) = selected {
        println!("{} ({})", profile.display_name, profile.id);
    }
    if state.view.is_empty() {
        println!("  no activities match the current filters");
        return;
    }
    for record in &state.view {
        println!(
            "  {:<12} {:<22} {:<11} {}",
            record.identifier,
            record.area_category.as_str(),
            record.status.as_str(),
            record.display_field(TITLE_FIELD).unwrap_or("-"),
        );
    }
}
