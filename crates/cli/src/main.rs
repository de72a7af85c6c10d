use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use huddle_core::engine::RemoteTrack;
use huddle_core::logging::{LoggingConfig, log_welcome, parse_log_level, setup_logging};
use huddle_core::media::VideoTrack;
use huddle_core::mock::MockEnvironment;
use huddle_core::{
    CallClient, HuddleConfig, RemoteTrackEvent, RoomEvent, StartupOutcome, TrackKind, TrackPublication, UiNotice,
};
use tokio_stream::StreamExt;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Room to join
    #[arg(short, long, default_value = "DailyStandup")]
    room: String,

    /// Access token for the room
    #[arg(short, long, env = "HUDDLE_TOKEN", default_value = "demo-token")]
    token: String,

    /// YAML call configuration; --room and --token override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Identity of the scripted remote participant
    #[arg(long, default_value = "alice")]
    remote: String,

    /// How the call ends
    #[arg(short, long, value_enum, default_value_t = Scenario::Hangup)]
    scenario: Scenario,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Include file and line in log lines
    #[arg(long)]
    log_location: bool,

    /// Log span enter and exit
    #[arg(long)]
    log_spans: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Scenario {
    /// The local user hangs up
    Hangup,
    /// The remote participant leaves
    RemoteLeaves,
    /// The connection drops and comes back before hanging up
    Flaky,
}

fn load_config(args: &Args) -> Result<HuddleConfig> {
    let mut config = match &args.config {
        Some(path) => HuddleConfig::from_yaml_file(path).with_context(|| format!("loading {}", path.display()))?,
        None => HuddleConfig::default(),
    };
    config.room_name = args.room.clone();
    config.access_token = args.token.clone();
    config.validate()?;
    Ok(config)
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

async fn play(env: &MockEnvironment, call: &CallClient, args: &Args) -> Result<()> {
    env.transport.emit(RoomEvent::Connected);
    settle().await;

    let remote_video = Arc::new(VideoTrack::remote("camera", true));
    env.transport.emit(RoomEvent::RemoteTrack {
        participant: args.remote.as_str().into(),
        event: RemoteTrackEvent::Subscribed {
            publication: TrackPublication::new(format!("MT-{}-video", args.remote), "camera", TrackKind::Video),
            track: RemoteTrack::Video(remote_video),
        },
    });
    settle().await;

    call.toggle_preview()?;
    call.toggle_camera()?;
    call.toggle_microphone()?;
    settle().await;
    call.toggle_camera()?;
    call.toggle_microphone()?;
    call.toggle_preview()?;
    settle().await;

    let snapshot = call.snapshot().await?;
    info!(state = %snapshot.state, remotes = snapshot.remote_participants.len(), "Call in progress");

    match args.scenario {
        Scenario::Hangup => call.end_call()?,
        Scenario::RemoteLeaves => {
            env.transport.emit(RoomEvent::ParticipantDisconnected { identity: args.remote.as_str().into() });
        }
        Scenario::Flaky => {
            env.transport.emit(RoomEvent::Reconnecting { reason: "network handover".into() });
            settle().await;
            env.transport.emit(RoomEvent::Reconnected);
            settle().await;
            call.end_call()?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut logging = LoggingConfig::new(parse_log_level(&args.log_level)?, "huddle");
    if args.json_logs {
        logging = logging.with_json();
    }
    if args.log_location {
        logging = logging.with_file_info();
    }
    if args.log_spans {
        logging = logging.with_spans();
    }
    setup_logging(logging.clone())?;
    log_welcome(&logging, huddle_core::VERSION);

    let env = MockEnvironment::with_config(load_config(&args)?).with_remote(&args.remote);
    let startup = env.startup()?;

    let mut notices = startup.notices().subscribe();
    let printer = tokio::spawn(async move {
        while let Some(notice) = notices.next().await {
            match notice {
                Ok(notice) => {
                    match notice.message() {
                        Some(message) => println!("[notice] {message}"),
                        None => println!("[event]  {notice:?}"),
                    }
                    if matches!(notice, UiNotice::CallEnded { .. }) {
                        break;
                    }
                }
                Err(e) => warn!("Notice stream lagged: {}", e),
            }
        }
    });

    let call = match startup.run().await? {
        StartupOutcome::Started(call) => call,
        other => bail!("call did not start: {other:?}"),
    };

    play(&env, &call, &args).await?;

    let reason = tokio::time::timeout(Duration::from_secs(5), call.wait())
        .await
        .context("call did not end")??;
    printer.await.context("notice printer failed")?;

    println!("Call ended: {reason}");
    Ok(())
}
