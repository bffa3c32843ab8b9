use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use client_core::{
    config::{load_settings, Settings},
    error::WorkshopError,
    media::{DeviceProfile, MediaLoader, VideoEmbed},
    realtime::RealtimeChangeFeed,
    ClientEvent, WorkshopClient,
};
use shared::domain::{EnvironmentId, NotificationLevel, ScriptIdeaId, VoteKind};
use tokio::sync::broadcast;
use tokio_stream::{wrappers::BroadcastStream, StreamExt};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Vote on workshop environments and script ideas")]
struct Args {
    /// Print notifications as JSON lines.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the anonymous session id stored on this device.
    Session,
    /// List environments with their vote counts.
    Environments {
        /// Also resolve each environment's cover image.
        #[arg(long)]
        covers: bool,
    },
    /// List script ideas, newest first.
    Ideas,
    /// Cast the two environment votes in one batch.
    VoteEnvironments { first: String, second: String },
    SubmitIdea { text: String },
    VoteIdea { id: String },
    /// Show an environment's image gallery.
    Gallery {
        environment: String,
        #[arg(long)]
        index: Option<usize>,
    },
    /// Follow live vote and idea updates until interrupted.
    Watch,
    /// Check an embedded video loads for the given device.
    Video {
        url: String,
        #[arg(long)]
        autoplay: bool,
        #[arg(long, default_value_t = 1280)]
        width: u32,
        #[arg(long, default_value = "")]
        user_agent: String,
        #[arg(long)]
        connection: Option<String>,
        #[arg(long)]
        save_data: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    let args = Args::parse();

    if let Command::Video {
        url,
        autoplay,
        width,
        user_agent,
        connection,
        save_data,
    } = &args.command
    {
        let profile = DeviceProfile::detect(*width, user_agent, connection.as_deref(), *save_data);
        let embed = VideoEmbed {
            autoplay: *autoplay,
            ..VideoEmbed::new(url.as_str())
        };
        let src = MediaLoader::default().load(&embed, &profile).await?;
        println!("{src}");
        if let Some(delay) = embed.autoload_delay(&profile) {
            println!("autoplay after {}ms", delay.as_millis());
        }
        return Ok(());
    }

    let settings = load_settings();
    let client = match WorkshopClient::bootstrap(&settings).await {
        Ok(client) => client,
        Err(error @ WorkshopError::Config(_)) => {
            error!(%error, "workshop client is not configured");
            return Err(error.into());
        }
        Err(error) => {
            error!(%error, "failed to start workshop client");
            return Err(error.into());
        }
    };
    info!(session_id = %client.session_id(), "session ready");

    let events = client.subscribe_events();
    let outcome = run(&client, args.command, &settings).await;
    print_notifications(events, args.json)?;
    outcome?;
    Ok(())
}

async fn run(client: &Arc<WorkshopClient>, command: Command, settings: &Settings) -> Result<()> {
    match command {
        Command::Session => println!("{}", client.session_id()),
        Command::Environments { covers } => {
            client.initialize().await?;
            for env in client.environments().await {
                let votes = client.vote_count(VoteKind::Environment, env.id.as_str()).await;
                let mine = if client.has_voted(VoteKind::Environment, env.id.as_str()).await {
                    " (your vote)"
                } else {
                    ""
                };
                println!("{} {} [{}] {votes} votes{mine}", env.emoji, env.name, env.id);
                if covers {
                    if let Some(cover) = client.cover_image_url(&env.id).await {
                        println!("    {cover}");
                    }
                }
            }
        }
        Command::Ideas => {
            client.initialize().await?;
            print_ideas(client).await;
        }
        Command::VoteEnvironments { first, second } => {
            client.initialize().await?;
            client.select_environment(&EnvironmentId::new(first)).await?;
            client.select_environment(&EnvironmentId::new(second)).await?;
            client.submit_environment_votes().await?;
        }
        Command::SubmitIdea { text } => {
            client.initialize().await?;
            client.submit_script_idea(&text).await?;
        }
        Command::VoteIdea { id } => {
            client.initialize().await?;
            client.vote_for_idea(&ScriptIdeaId::new(id)).await?;
        }
        Command::Gallery { environment, index } => {
            client.open_carousel(&EnvironmentId::new(environment)).await?;
            if let Some(index) = index {
                client.jump_to_image(index).await;
            }
            let carousel = client.carousel().await;
            for (i, image) in carousel.images.iter().enumerate() {
                let marker = if i == carousel.index { '>' } else { ' ' };
                println!("{marker} {image}");
            }
        }
        Command::Watch => {
            client.initialize().await?;
            watch(client, settings).await?;
        }
        Command::Video { .. } => {}
    }
    Ok(())
}

async fn print_ideas(client: &WorkshopClient) {
    for idea in client.script_ideas().await {
        let votes = client.vote_count(VoteKind::Script, idea.id.as_str()).await;
        let mine = if client.has_voted(VoteKind::Script, idea.id.as_str()).await {
            " (voted)"
        } else {
            ""
        };
        println!("[{}] {votes} votes{mine}  {}", idea.id, idea.idea);
    }
}

async fn watch(client: &Arc<WorkshopClient>, settings: &Settings) -> Result<()> {
    if !settings.realtime_enabled {
        warn!("realtime updates are disabled in settings; nothing to watch");
        return Ok(());
    }
    let feed = RealtimeChangeFeed::spawn(&settings.backend()?)?;
    let reconciliation = client.attach_change_source(&feed);
    let mut events = BroadcastStream::new(client.subscribe_events());
    info!("watching for updates; press ctrl-c to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            next = events.next() => match next {
                Some(Ok(ClientEvent::EnvironmentVoteCounts(tally))) => {
                    println!("environment votes: {} total", tally.total());
                }
                Some(Ok(ClientEvent::ScriptVoteCounts(tally))) => {
                    println!("script votes: {} total", tally.total());
                }
                Some(Ok(ClientEvent::ScriptIdeasUpdated(ideas))) => {
                    println!("{} script ideas", ideas.len());
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => warn!("watch: {err}"),
                None => break,
            },
        }
    }
    reconciliation.abort();
    Ok(())
}

fn print_notifications(mut events: broadcast::Receiver<ClientEvent>, json: bool) -> Result<()> {
    while let Ok(event) = events.try_recv() {
        let ClientEvent::Notification(notification) = event else {
            continue;
        };
        if json {
            println!("{}", serde_json::to_string(&notification)?);
            continue;
        }
        let tag = match notification.level {
            NotificationLevel::Success => "ok",
            NotificationLevel::Error => "error",
            NotificationLevel::Warning => "warning",
            NotificationLevel::Info => "info",
        };
        println!("{tag}: {}", notification.message);
    }
    Ok(())
}
