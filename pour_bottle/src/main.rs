//! pour_bottle: interactive entry point.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use pour_bottle::app::run;
use pour_bottle::config::load_config;

#[derive(Parser, Debug)]
#[command(name = "pour_bottle")]
#[command(about = "Tilt the bottle to pour", long_about = None)]
struct Args {
    /// TOML config file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Bottle model (.obj or .obj.gz); overrides the config
    #[arg(long, value_name = "FILE")]
    model: Option<PathBuf>,

    /// Pour sound (.wav); overrides the config
    #[arg(long, value_name = "FILE")]
    sound: Option<PathBuf>,

    /// Read "x y z" or "t_ms x y z" samples from FILE, or "-" for stdin, instead of the keyboard simulator
    #[arg(long, value_name = "FILE")]
    sensor_stream: Option<String>,

    /// Ask for motion access on the terminal before starting
    #[arg(long)]
    ask_permission: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                 Pour Bottle: tilt to pour                    ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    let mut cfg = load_config(args.config.as_deref())
        .context("could not load config")?;
    if args.model.is_some()         { cfg.model.path = args.model; }
    if args.sound.is_some()         { cfg.audio.pour_sound = args.sound; }
    if args.sensor_stream.is_some() { cfg.sensor.stream = args.sensor_stream; }
    if args.ask_permission          { cfg.ui.ask_permission = true; }

    match &cfg.sensor.stream {
        Some(s) => println!("  Mode: sample stream ({})", s),
        None    => println!("  Mode: keyboard simulation  (arrows tilt, J shakes)"),
    }
    println!("  Pour angle: {:.0}°   debounce: {:.0} ms",
             cfg.classifier.pour_pitch_deg, cfg.classifier.debounce_ms);
    println!();
    println!("  Opening window…  press Space to start");
    println!();

    run(cfg).context("pour_bottle exited with an error")?;
    Ok(())
}
