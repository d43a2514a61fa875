//! livesub CLI: run the subtitle pipeline in a terminal.

use clap::Parser;
use livesub::audio::{list_devices, suppress_audio_warnings, AudioDevice, CpalBackend};
use livesub::config::Config;
use livesub::recognition::DashScopeConnector;
use livesub::supervisor::ServiceSupervisor;
use livesub::synthesis::HttpSynthesisFactory;
use livesub::ui::TerminalUi;
use livesub::defaults;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(
    name = "livesub",
    version,
    about = "Realtime speech translation subtitles"
)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Source language, e.g. zh-CN
    #[arg(short, long)]
    source: Option<String>,

    /// Target language, e.g. en-US
    #[arg(short, long)]
    target: Option<String>,

    /// Audio input device name
    #[arg(short, long)]
    device: Option<String>,

    /// Speak translated sentences through the TTS service
    #[arg(long)]
    tts: bool,

    /// List available audio input devices and exit
    #[arg(long)]
    list_devices: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    suppress_audio_warnings();

    let args = Args::parse();

    if args.list_devices {
        for device in list_devices()? {
            println!("{}", device);
        }
        return Ok(());
    }

    let config_path = args.config.unwrap_or_else(Config::default_path);
    let mut config = Config::load_or_default(&config_path)?.with_env_overrides();

    if let Some(source) = args.source {
        config.language.source = source;
    }
    if let Some(target) = args.target {
        config.language.target = target;
    }
    if let Some(device) = args.device {
        config.audio.device = Some(device);
    }
    if args.tts {
        config.synthesis.enabled = true;
    }
    config.validate()?;

    log::info!(
        "translating {} → {}{}",
        config.language.source,
        config.language.target,
        if config.synthesis.enabled {
            " (spoken)"
        } else {
            ""
        }
    );

    let supervisor = Arc::new(ServiceSupervisor::new(
        config,
        Arc::new(AudioDevice::new(Box::new(CpalBackend))),
        Arc::new(DashScopeConnector::new()),
        Box::new(HttpSynthesisFactory),
        Arc::new(TerminalUi),
    ));

    supervisor.start()?;
    let monitor = supervisor.spawn_monitor(defaults::HEALTH_CHECK_INTERVAL);

    // Block until Ctrl-C, then wind the pipeline down.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(tokio::signal::ctrl_c())?;
    log::info!("shutting down");

    supervisor.stop();
    monitor.stop();
    Ok(())
}
