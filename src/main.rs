use crate::config::Config;
use crate::events::Command;
use crate::pipeline::FrameClock;
use crate::render::Scene;
use crate::streamer::{FrameStreamer, StreamerSession};
use crate::workers::{ChatPoller, Producer};
use clap::Arg;
use log::{error, info, warn};
use std::sync::Arc;
use std::{panic, process};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub mod assets;
pub mod config;
pub mod control;
pub mod events;
pub mod pipeline;
pub mod render;
pub mod streamer;
pub mod workers;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let matches = clap::Command::new(config::app_name())
        .version(config::version())
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(
            Arg::new("url")
                .short('u')
                .long("url")
                .value_name("URL")
                .help("Ingest endpoint, overrides STREAM_URL.")
                .required(false),
        )
        .arg(
            Arg::new("output-dir")
                .short('o')
                .long("output-dir")
                .value_name("DIR")
                .help("Working directory for transcoder logs and captures.")
                .required(false),
        )
        .get_matches();

    // kill the main thread as soon as a secondary task panics
    let orig_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        orig_hook(panic_info);
        process::exit(105);
    }));

    let stream_url = matches
        .get_one::<String>("url")
        .cloned()
        .or_else(|| std::env::var("STREAM_URL").ok())
        .ok_or_else(|| anyhow::anyhow!("no ingest endpoint: set STREAM_URL or pass --url"))?;

    let mut config = Config::from_env(stream_url)?;
    if let Some(dir) = matches.get_one::<String>("output-dir") {
        config.stream.output_dir = dir.into();
    }

    let session = Arc::new(StreamerSession::connect(config.stream.clone())?);
    info!("> connected to the streaming service");

    let cancel = CancellationToken::new();
    let clock = FrameClock::new();
    let (command_tx, command_rx) = mpsc::channel::<Command>(100);
    let (chat_id_tx, chat_id_rx) = mpsc::channel::<String>(4);
    let title = Arc::new(std::sync::Mutex::new(assets::DEFAULT_TITLE.to_string()));

    // chat ingestion
    match &config.youtube_api_key {
        Some(api_key) => {
            let poller = ChatPoller::new(
                api_key.clone(),
                chat_id_rx,
                command_tx.clone(),
                cancel.clone(),
            );
            tokio::spawn(poller.run());
        }
        None => warn!("YOUTUBE_LIVE_API not set, chat ingestion disabled"),
    }

    // control surface
    {
        let state = control::AppState {
            commands: command_tx.clone(),
            chat_ids: chat_id_tx,
            session: Arc::clone(&session),
            clock: clock.clone(),
            title: Arc::clone(&title),
        };
        let cancel = cancel.clone();
        let port = config.control_port;
        tokio::spawn(async move {
            if let Err(e) = control::serve(state, port, cancel.clone()).await {
                error!("control surface failed: {e}");
                cancel.cancel();
            }
        });
    }

    // frame production
    let scene = Scene::new(
        config.stream.width,
        config.stream.height,
        assets::DEFAULT_TITLE.to_string(),
    );
    let producer = Producer::new(
        Arc::clone(&session),
        scene,
        clock,
        command_rx,
        title,
        config.stream.output_dir.clone(),
        config.stream.frame_rate,
        cancel.clone(),
    );
    let producer_handle = tokio::spawn(producer.run());

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("> closing application");
            cancel.cancel();
        }
        _ = cancel.cancelled() => {}
    }

    let _ = producer_handle.await;
    session.close().await?;
    Ok(())
}
