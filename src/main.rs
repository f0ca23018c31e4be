//! ajacap - AJA capture card acquisition CLI

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use ajacap::capture::{
    CaptureSession, CaptureTimings, ChannelSink, FrameKind, SessionEvent, SinkEvent,
};
use ajacap::config::{parse_auto, AppConfig, Args, Command, SourceSettings};
use ajacap::device::sim::{SimulatedCard, SimulatedProbe};
use ajacap::device::{Card, CardManager, DeviceInfo};
use ajacap::ntv2::{IoSelection, VideoFormat};

fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::load_default()?,
    };

    // Initialize logging
    init_logging(&args, &config)?;

    match args.command.unwrap_or_default() {
        Command::List { all, show_ids } => cmd_list(&config, all, show_ids),
        Command::Info { device_id } => cmd_info(&config, &device_id),
        Command::Capture {
            source,
            device,
            input,
            video_format,
            pixel_format,
            sdi_transport,
            transport_4k,
            signal,
            duration,
        } => {
            let mut settings = match &source {
                Some(name) => config
                    .source(name)
                    .map(|s| s.settings.clone())
                    .with_context(|| format!("No source named '{}' in configuration", name))?,
                None => SourceSettings {
                    device_id: "sim-0".to_string(),
                    input: IoSelection::Sdi1,
                    ..Default::default()
                },
            };
            if let Some(device) = device {
                settings.device_id = device;
            }
            if let Some(input) = input {
                settings.input = input;
            }
            if let Some(vf) = video_format {
                settings.video_format = parse_auto(&vf)?;
            }
            if let Some(pf) = pixel_format {
                settings.pixel_format = parse_auto(&pf)?;
            }
            if let Some(t) = sdi_transport {
                settings.sdi_transport = parse_auto(&t)?;
            }
            if let Some(t) = transport_4k {
                settings.sdi_4k_transport = t.into();
            }
            let name = source.unwrap_or_else(|| "capture".to_string());
            cmd_capture(&config, &name, settings, signal, duration)
        }
        Command::InitConfig { path, force } => cmd_init_config(path.as_deref(), force),
    }
}

fn init_logging(args: &Args, config: &AppConfig) -> Result<()> {
    let level = args
        .explicit_log_level()
        .or_else(|| config.log_level())
        .unwrap_or(tracing::Level::INFO);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let log_file = args.log.as_deref().or_else(|| config.log_file());
    if let Some(log_file) = log_file {
        let file = std::fs::File::create(log_file)?;
        subscriber.with_writer(file).init();
    } else {
        subscriber.init();
    }

    Ok(())
}

/// Simulated cards standing in for installed hardware
fn simulated_cards(config: &AppConfig) -> (Vec<Arc<SimulatedCard>>, Arc<CardManager>) {
    let capture = SimulatedCard::new("sim-0");
    capture.set_frame_period(config.frame_period());
    let playout = SimulatedCard::output_only("sim-1");

    let cards = vec![capture, playout];
    let probe = SimulatedProbe::new(cards.clone());
    (cards, Arc::new(CardManager::new(probe)))
}

/// List capture devices
fn cmd_list(config: &AppConfig, all: bool, show_ids: bool) -> Result<()> {
    let (_cards, manager) = simulated_cards(config);
    let all_devices = manager.enumerate()?;
    let devices = if all {
        all_devices
    } else {
        manager.capture_devices()
    };

    if devices.is_empty() {
        println!("No capture devices found.");
        return Ok(());
    }

    println!("Available devices:\n");

    for (i, device) in devices.iter().enumerate() {
        let output_tag = if device.output_only { " [output only]" } else { "" };
        print!("  {}. {}{}", i + 1, device.display_name(), output_tag);

        if show_ids {
            println!("\n     ID: {}", device.card_id);
        } else {
            println!();
        }
    }

    println!();
    Ok(())
}

/// Show detailed device information
fn cmd_info(config: &AppConfig, device_id: &str) -> Result<()> {
    let (_cards, manager) = simulated_cards(config);
    manager.enumerate()?;

    let entry = match manager.find(device_id) {
        Ok(entry) => entry,
        Err(e) => {
            println!("{}", e);
            println!("\nUse 'ajacap list --all --show-ids' to see available devices.");
            return Ok(());
        }
    };

    let info: &DeviceInfo = entry.info();
    println!("Device Information:\n");
    println!("  Model:         {}", info.model);
    println!("  ID:            {}", info.card_id);
    println!("  Channels:      {}", info.num_channels);
    println!("  SDI inputs:    {}", info.num_sdi_inputs);
    println!("  HDMI inputs:   {}", info.num_hdmi_inputs);
    println!(
        "  Output only:   {}",
        if info.output_only { "Yes" } else { "No" }
    );

    let selections: Vec<String> = entry
        .available_selections("")
        .iter()
        .map(|s| s.to_string())
        .collect();
    println!("  Inputs:        {}", selections.join(", "));

    let formats: Vec<String> = entry
        .compatible_formats("")
        .iter()
        .map(|f| f.to_string())
        .collect();
    println!("  Formats:       {}", formats.join(", "));

    Ok(())
}

#[derive(Default)]
struct CaptureStats {
    video: u64,
    placeholders: u64,
    audio_frames: u64,
}

impl CaptureStats {
    fn record(&mut self, unit: SinkEvent) {
        match unit {
            SinkEvent::Video(v) if v.kind == FrameKind::Placeholder => self.placeholders += 1,
            SinkEvent::Video(_) => self.video += 1,
            SinkEvent::Audio { frames, .. } => self.audio_frames += frames as u64,
        }
    }
}

/// Capture from one input until Ctrl+C or the requested duration
fn cmd_capture(
    config: &AppConfig,
    name: &str,
    settings: SourceSettings,
    signal: VideoFormat,
    duration: Option<u64>,
) -> Result<()> {
    println!("ajacap - AJA capture card acquisition\n");

    let (cards, manager) = simulated_cards(config);
    manager.enumerate()?;

    for card in cards.iter().filter(|c| c.info().card_id == settings.device_id) {
        for source in settings.input.input_sources() {
            card.set_input_signal(source, Some(signal));
        }
    }

    let (sink, frames) = ChannelSink::unbounded();
    let mut session = CaptureSession::new(name, manager, Arc::new(sink)).with_timings(
        CaptureTimings {
            no_signal_backoff: config.no_signal_backoff(),
        },
    );
    let events = session.events();

    // Setup Ctrl+C handler
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    let _ = ctrlc::set_handler(move || {
        println!("\nReceived Ctrl+C, stopping...");
        r.store(false, Ordering::SeqCst);
    });

    if let Err(e) = session.update(&settings) {
        error!("Failed to start capture: {}", e);
        return Err(e.into());
    }
    println!(
        "Capturing {} on {}: {} / {}. Press Ctrl+C to stop.\n",
        session.source_props().io_select,
        session.source_props().device_id,
        session
            .source_props()
            .video_format
            .map_or_else(|| "unknown".to_string(), |vf| vf.to_string()),
        session
            .source_props()
            .pixel_format
            .map_or_else(|| "unknown".to_string(), |pf| pf.to_string()),
    );

    let started = Instant::now();
    let deadline = duration.map(|secs| started + Duration::from_secs(secs));
    let mut stats = CaptureStats::default();
    let mut last_report = Instant::now();

    while running.load(Ordering::SeqCst) && deadline.map_or(true, |d| Instant::now() < d) {
        if let Ok(unit) = frames.recv_timeout(Duration::from_millis(100)) {
            stats.record(unit);
        }

        while let Ok(event) = events.try_recv() {
            match &event {
                SessionEvent::FormatChanged { current, .. } => {
                    info!("Input changed to {}, reconfiguring", current)
                }
                SessionEvent::DeviceLost { device_id, .. } => {
                    warn!("Device {} lost, trying to reconfigure", device_id)
                }
            }
            if let Err(e) = session.reconfigure() {
                if !e.is_recoverable() {
                    error!("Capture of '{}' cannot continue: {}", event.session(), e);
                    running.store(false, Ordering::SeqCst);
                    break;
                }
                warn!("Reconfigure of '{}' failed: {}", event.session(), e);
            }
        }

        if last_report.elapsed() >= Duration::from_secs(1) {
            last_report = Instant::now();
            info!(
                "{} frames, {} placeholders, {} audio sample frames",
                stats.video, stats.placeholders, stats.audio_frames
            );
        }
    }

    session.deactivate();
    for unit in frames.try_iter() {
        stats.record(unit);
    }

    println!(
        "Stopped after {:.1}s: {} frames, {} placeholders, {} audio sample frames.",
        started.elapsed().as_secs_f64(),
        stats.video,
        stats.placeholders,
        stats.audio_frames
    );
    Ok(())
}

/// Write a sample configuration file
fn cmd_init_config(path: Option<&Path>, force: bool) -> Result<()> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => AppConfig::default_path().context("No user configuration directory")?,
    };
    if path.exists() && !force {
        bail!(
            "{} already exists, use --force to overwrite",
            path.display()
        );
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(&path, AppConfig::sample_config())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Wrote sample configuration to {}", path.display());
    Ok(())
}
