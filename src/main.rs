// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{crate_version, Parser, Subcommand};
use duration_string::DurationString;
use tracing::info;
use tracing_subscriber::EnvFilter;

use looptrack::audio::{self, mock, Device};
use looptrack::export::MixdownFile;
use looptrack::{config, AudioEngineService, TrackId};

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A multi-track looper."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available audio output devices.
    Devices {},
    /// Loops the given files through the audio interface.
    Play {
        /// The device name to play through.
        device_name: String,
        /// The audio files to loop, one track each.
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// The gain of every track, between 0 and 1.
        #[arg(short, long, default_value_t = 1.0)]
        gain: f32,
        /// The speed rate of every track.
        #[arg(short, long, default_value_t = 1.0)]
        speed: f32,
        /// How long to play for, in seconds.
        #[arg(long, default_value_t = 10)]
        seconds: u64,
    },
    /// Renders a mix of the given files to a WAV file without an audio device.
    Mixdown {
        /// The audio files to mix, one track each.
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// The WAV file to write.
        #[arg(short, long)]
        output: PathBuf,
        /// The gain of every track, between 0 and 1.
        #[arg(short, long, default_value_t = 1.0)]
        gain: f32,
        /// The speed rate of every track.
        #[arg(short, long, default_value_t = 1.0)]
        speed: f32,
        /// How much audio to render, e.g. 30s.
        #[arg(short, long, default_value = "30s")]
        duration: String,
        /// The sample rate of the mix.
        #[arg(long, default_value_t = 44100)]
        sample_rate: u32,
        /// The channel count of the mix.
        #[arg(long, default_value_t = 2)]
        channels: u16,
    },
    /// Starts the looper with the given engine config and plays until interrupted.
    Start {
        /// The path to the engine config.
        config_path: PathBuf,
        /// The audio files to loop, one track each.
        files: Vec<PathBuf>,
        /// Records the live output into the export directory until interrupted.
        #[arg(long)]
        record: bool,
        /// After stopping, renders the configured export duration of the mix
        /// into the export directory.
        #[arg(long)]
        export: bool,
    },
}

fn load_tracks(
    service: &mut AudioEngineService,
    files: &[PathBuf],
) -> Result<Vec<TrackId>, Box<dyn Error>> {
    let mut ids = Vec::with_capacity(files.len());
    for file in files {
        let id = service.load_track(file)?;
        info!(track = %id, file = ?file, "Loaded track");
        ids.push(id);
    }
    Ok(ids)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Play {
            device_name,
            files,
            gain,
            speed,
            seconds,
        } => {
            let config = config::Engine::new(&device_name).with_defaults(gain, speed);
            let mut service = AudioEngineService::new(&config)?;
            let ids = load_tracks(&mut service, &files)?;

            let playing = service.play_all(&ids);
            if playing == 0 {
                return Err("no tracks could be played".into());
            }
            tokio::time::sleep(Duration::from_secs(seconds)).await;
            service.shutdown();
        }
        Commands::Mixdown {
            files,
            output,
            gain,
            speed,
            duration,
            sample_rate,
            channels,
        } => {
            let duration: Duration = DurationString::from_string(duration)?.into();
            let config = config::Engine::new("mock-mixdown")
                .with_sample_rate(sample_rate)
                .with_channels(channels)
                .with_defaults(gain, speed);
            config.validate()?;
            let device: Arc<dyn Device> =
                Arc::new(mock::Device::new("mixdown", config.output_format()?));
            let mut service = AudioEngineService::with_device(device, &config);
            let ids = load_tracks(&mut service, &files)?;
            service.play_all(&ids);

            let file = MixdownFile::create(&output, service.output_format())?;
            let path = service.render_offline(file, duration)?;
            println!("Wrote {}", path.display());
        }
        Commands::Start {
            config_path,
            files,
            record,
            export,
        } => {
            let config = config::Engine::deserialize(&config_path)?;
            let mut service = AudioEngineService::new(&config)?;
            let ids = load_tracks(&mut service, &files)?;
            service.play_all(&ids);

            if record {
                let file = service.export_mix().await?;
                service.start_recording(file)?;
            }

            tokio::signal::ctrl_c().await?;
            info!("Interrupted, stopping");

            if record {
                let path = service.stop_recording()?;
                println!("Recorded {}", path.display());
            }
            if export {
                let file = service.export_mix().await?;
                let path = service.render_offline(file, config.export_duration()?)?;
                println!("Exported {}", path.display());
            }
            service.shutdown();
        }
    }

    Ok(())
}
