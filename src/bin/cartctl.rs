//! cartctl
//!
//! Command-line front end: run an emulated cartridge server, or push files
//! through the full storage stack and verify they read back intact.

use anyhow::{ensure, Context};
use cartdrive::{CartConfig, CartServer, CartStorage, MemoryCart, Transport};
use clap::{Args as ClapArgs, Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "cartctl")]
#[command(about = "Cartridge storage server and client tool")]
struct Args {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(ClapArgs, Debug)]
struct Common {
    /// TOML configuration file
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Server host (overrides the configuration file)
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Server port (overrides the configuration file)
    #[arg(short = 'P', long)]
    port: Option<u16>,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Serve an in-memory cartridge device over TCP
    Serve {
        #[command(flatten)]
        common: Common,
    },

    /// Write local files to a cartridge server and read them back
    Copy {
        #[command(flatten)]
        common: Common,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,

        /// Files to copy
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Run the copy round trip against an in-process device
    Selftest {
        #[command(flatten)]
        common: Common,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Serialize)]
struct CopySummary {
    name: String,
    bytes: usize,
    frames: usize,
}

#[derive(Debug, Serialize)]
struct Report {
    files: Vec<CopySummary>,
    stats: cartdrive::StorageStats,
}

fn load_config(common: &Common) -> anyhow::Result<CartConfig> {
    let mut config = match &common.config {
        Some(path) => CartConfig::load(path)
            .with_context(|| format!("loading configuration from {:?}", path))?,
        None => CartConfig::default(),
    };

    if let Some(host) = &common.host {
        config.network.host = host.clone();
    }
    if let Some(port) = common.port {
        config.network.port = port;
    }
    config.validate()?;
    Ok(config)
}

fn serve(config: CartConfig) -> anyhow::Result<()> {
    let device = MemoryCart::new(config.geometry);
    let address = (config.network.host.as_str(), config.network.port);
    let mut server = CartServer::bind(address, device, config.geometry.frame_size)
        .with_context(|| format!("binding {}:{}", config.network.host, config.network.port))?;

    info!(
        cartridges = config.geometry.max_cartridges,
        frames = config.geometry.frames_per_cartridge,
        frame_size = config.geometry.frame_size,
        "Serving in-memory cartridge device"
    );
    server.serve()?;
    Ok(())
}

/// Write every file, read it back and compare
fn round_trip<T: Transport>(
    storage: &mut CartStorage<T>,
    files: Vec<(String, Vec<u8>)>,
    json: bool,
) -> anyhow::Result<()> {
    storage.poweron()?;

    let mut summaries = Vec::with_capacity(files.len());
    for (name, data) in files {
        let handle = storage.open(&name)?;
        storage.write(handle, &data)?;
        storage.seek(handle, 0)?;

        let readback = storage.read_to_end(handle)?;
        ensure!(readback == data, "{}: content read back differs", name);

        let info = storage.info(handle)?;
        info!(file = %name, bytes = data.len(), frames = info.frames.len(), "Verified");
        summaries.push(CopySummary {
            name,
            bytes: data.len(),
            frames: info.frames.len(),
        });
    }

    let report = Report {
        files: summaries,
        stats: storage.stats(),
    };
    storage.poweroff()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for file in &report.files {
            println!("{:<32} {:>10} bytes {:>6} frames", file.name, file.bytes, file.frames);
        }
        println!(
            "frames used {}/{}, open files {}",
            report.stats.used_frames, report.stats.total_frames, report.stats.open_files
        );
        if let Some(cache) = report.stats.cache {
            println!(
                "cache {}/{} slots, hit rate {:.1}%",
                cache.occupied,
                cache.capacity,
                cache.hit_rate()
            );
        }
    }
    Ok(())
}

fn read_local(path: &Path) -> anyhow::Result<(String, Vec<u8>)> {
    let data = std::fs::read(path).with_context(|| format!("reading {:?}", path))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .with_context(|| format!("{:?} has no file name", path))?;
    Ok((name, data))
}

fn selftest_files(frame_size: usize) -> Vec<(String, Vec<u8>)> {
    [1, frame_size - 1, frame_size, frame_size + 1, 10 * frame_size]
        .into_iter()
        .filter(|&len| len > 0)
        .enumerate()
        .map(|(i, len)| {
            let data = (0..len).map(|b| (b * 31 + i) as u8).collect();
            (format!("selftest-{}.bin", i), data)
        })
        .collect()
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    match args.command {
        Cmd::Serve { common } => serve(load_config(&common)?),
        Cmd::Copy {
            common,
            json,
            files,
        } => {
            let config = load_config(&common)?;
            let files = files
                .iter()
                .map(|path| read_local(path))
                .collect::<anyhow::Result<Vec<_>>>()?;
            let mut storage = CartStorage::connect(config)?;
            round_trip(&mut storage, files, json)
        }
        Cmd::Selftest { common, json } => {
            let config = load_config(&common)?;
            let files = selftest_files(config.geometry.frame_size);
            let mut storage = CartStorage::in_memory(config)?;
            round_trip(&mut storage, files, json)
        }
    }
}
