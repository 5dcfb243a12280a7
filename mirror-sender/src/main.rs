//! mirror-sender: entry point.
//!
//! ```text
//! mirror-sender -a 10.0.0.5,10.0.0.6:7000 -i screen.h264   Stream a file to two receivers
//! ffmpeg ... -f h264 - | mirror-sender -a tv.local -f out.bin   Stream stdin, also record
//! mirror-sender --inspect out.bin                           Describe a recording
//! mirror-sender --gen-config                                Write default config to stdout
//! ```

use std::path::PathBuf;
use std::sync::atomic::Ordering;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mirror_sender::config::{LoadOutcome, LoggingConfig, Overrides, SenderConfig};
use mirror_sender::inspect::inspect_file;
use mirror_sender::service::SenderService;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "mirror-sender", about = "Stream H.264 to AirPlay-style mirroring receivers")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "mirror-sender.toml")]
    config: PathBuf,

    /// Receivers, `host[:port]`, comma separated.
    #[arg(short, long, value_delimiter = ',')]
    airplay: Vec<String>,

    /// Also record the stream to this file.
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Also write the stream to stdout.
    #[arg(short, long)]
    stdout: bool,

    /// Annex B H.264 input, or "-" for stdin.
    #[arg(short, long)]
    input: Option<String>,

    /// Target frames per second.
    #[arg(long)]
    fps: Option<u32>,

    /// VAAPI render node for the upstream encoder.
    #[arg(short, long)]
    vaapi: Option<String>,

    /// Output (monitor) index to capture.
    #[arg(short, long)]
    output: Option<u32>,

    /// Include the cursor in captured frames.
    #[arg(long)]
    cursor: bool,

    /// Binary plist sent with the stream request.
    #[arg(long)]
    plist: Option<PathBuf>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Describe a recorded stream and exit.
    #[arg(long, value_name = "RECORDING")]
    inspect: Option<PathBuf>,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            destinations: self.airplay.clone(),
            input: self.input.clone(),
            fps: self.fps,
            file: self.file.clone(),
            stdout: self.stdout,
            vaapi_device: self.vaapi.clone(),
            output: self.output,
            cursor: self.cursor,
            plist: self.plist.clone(),
        }
    }
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&SenderConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    // Read first for the log level; report the outcome once logging is up.
    let loaded = SenderConfig::read(&cli.config);
    let level = match &loaded {
        LoadOutcome::Loaded(config) => config.logging.level.clone(),
        _ => LoggingConfig::default().level,
    };

    // Logs go to stderr: stdout may carry the stream.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    loaded.log(&cli.config);
    let mut config = loaded.into_config();
    config.apply(cli.overrides());

    if let Some(recording) = &cli.inspect {
        let mut out = std::io::stdout().lock();
        inspect_file(recording, &mut out).await?;
        return Ok(());
    }

    info!("mirror-sender v{}", env!("CARGO_PKG_VERSION"));
    info!("destinations: {:?}", config.network.destinations);
    info!("input: {}", config.stream.input);
    info!("target FPS: {}", config.stream.fps);

    let service = SenderService::new(config);
    let stop = service.stop_handle();

    let stop_clone = stop.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, stopping");
        stop_clone.store(false, Ordering::SeqCst);
    });

    let stats = service.run().await?;
    info!("done: {stats}");

    Ok(())
}
