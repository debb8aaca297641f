mod cli;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use convq::config;
use cq_av::ToolRegistry;
use cq_core::config::Config;
use cq_core::{ConversionEvent, ConversionTask, EventBus};
use cq_queue::QueueState;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG if set, otherwise pick defaults from the verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "convq=trace,cq_queue=trace,cq_av=trace,cq_server=debug,cq_core=debug,tower_http=debug"
                .to_string()
        } else {
            "convq=info,cq_queue=info,cq_av=info,cq_server=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Start { host, port } => {
            let mut config = config::load_config_or_default(cli.config.as_deref())?;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            tracing::info!(
                "Starting convq on {}:{} (base dir {})",
                config.server.host,
                config.server.port,
                config.queue.base_dir.display()
            );

            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(cq_server::start(config))?;
            Ok(())
        }
        Commands::Convert {
            inputs,
            format,
            quality,
            size,
            aspect,
            video_codec,
            audio_codec,
            video_bitrate,
            audio_bitrate,
            base_dir,
            fail_closed,
        } => {
            let mut config = config::load_config_or_default(cli.config.as_deref())?;
            if let Some(base_dir) = base_dir {
                config.queue.base_dir = base_dir;
            }
            if fail_closed {
                config.queue.fail_closed = true;
            }

            let tasks = inputs
                .into_iter()
                .map(|input| {
                    let mut task = ConversionTask::new(input, format.clone());
                    task.quality = quality;
                    task.size = size.clone();
                    task.aspect = aspect.clone();
                    task.video_codec = video_codec.clone();
                    task.audio_codec = audio_codec.clone();
                    task.video_bitrate = video_bitrate;
                    task.audio_bitrate = audio_bitrate;
                    task.validate().map(|_| task)
                })
                .collect::<cq_core::Result<Vec<_>>>()?;

            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(convert_files(config, tasks))
        }
        Commands::Formats => list_formats(),
        Commands::CheckTools => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            check_tools(&config)
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
    }
}

async fn convert_files(config: Config, tasks: Vec<ConversionTask>) -> Result<()> {
    let tools = ToolRegistry::discover(&config.tools);
    tools.require("ffmpeg")?;
    tools.require("ffprobe")?;

    for dir in [config.queue.input_dir(), config.queue.converted_dir()] {
        tokio::fs::create_dir_all(&dir).await?;
    }

    let event_bus = Arc::new(EventBus::default());
    let mut events = event_bus.subscribe();
    let cancel = CancellationToken::new();
    let queue = cq_server::spawn_queue(&config, &tools, event_bus, cancel.clone());

    for task in tasks {
        queue.enqueue(task);
    }

    let idle = queue.wait_idle();
    tokio::pin!(idle);
    let snapshot = loop {
        tokio::select! {
            snapshot = &mut idle => break snapshot?,
            event = events.recv() => match event {
                Ok(event) => print_event(&event.payload),
                Err(RecvError::Lagged(n)) => tracing::debug!("Skipped {n} progress events"),
                Err(RecvError::Closed) => break (&mut idle).await?,
            },
        }
    };
    while let Ok(event) = events.try_recv() {
        print_event(&event.payload);
    }
    cancel.cancel();

    println!(
        "\n{} completed, {} failed",
        snapshot.completed, snapshot.failed
    );
    if snapshot.state == QueueState::Halted {
        anyhow::bail!("Queue halted after a failure; {} task(s) not processed", snapshot.pending);
    }
    if snapshot.failed > 0 {
        anyhow::bail!("{} conversion(s) failed", snapshot.failed);
    }
    Ok(())
}

fn print_event(event: &ConversionEvent) {
    match event {
        ConversionEvent::Queued { output_file, task } => {
            println!("queued    {} -> {}", task.input_file, output_file);
        }
        ConversionEvent::Started { hash } => println!("started   {hash}"),
        ConversionEvent::Progress {
            hash,
            percent,
            timemark,
            ..
        } => println!("progress  {hash} {percent:>3}% ({timemark})"),
        ConversionEvent::Failed { hash, error } => println!("failed    {hash}: {error}"),
        ConversionEvent::Completed { hash, url, .. } => println!("completed {hash}: {url}"),
    }
}

fn list_formats() -> Result<()> {
    println!("Formats:");
    println!(
        "  {:<8} {:<12} {:<12} {:>10} {:>10}",
        "id", "video", "audio", "video kbps", "audio kbps"
    );
    for format in cq_queue::formats() {
        println!(
            "  {:<8} {:<12} {:<12} {:>10} {:>10}",
            format.id,
            format.video_codec,
            format.audio_codec,
            format.video_bitrate,
            format.audio_bitrate
        );
    }

    println!("\nQualities:");
    for preset in cq_queue::qualities() {
        println!(
            "  {:<8} video x{:<5} audio x{:<5} preset {:<9} crf {}",
            preset.level.as_str(),
            preset.video_multiplier,
            preset.audio_multiplier,
            preset.preset,
            preset.crf
        );
    }
    Ok(())
}

fn check_tools(config: &Config) -> Result<()> {
    println!("Checking external tools...\n");

    let tools = ToolRegistry::discover(&config.tools).check_all();
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);
        if let Some(ref version) = tool.version {
            print!(" ({})", version.lines().next().unwrap_or(""));
        }
        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }
        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Conversions will fail until they are installed.");
    }
    Ok(())
}

fn validate_config(path: Option<&std::path::Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {}", p.display());
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!("  Base dir: {}", config.queue.base_dir.display());
    println!("  Fail closed: {}", config.queue.fail_closed);
    println!(
        "  Listener: {}",
        config.notifications.listener_url.as_deref().unwrap_or("(none)")
    );

    let warnings = config.validate();
    if !warnings.is_empty() {
        println!("\nWarnings:");
        for warning in &warnings {
            println!("  - {warning}");
        }
    }
    Ok(())
}
