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
use std::f32::consts::PI;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use clap::{crate_version, Parser, Subcommand};
use jove_audio::audio::{self, BitDepth};
use jove_audio::config;
use jove_audio::engine::{Engine, SourceMode};
use tracing_subscriber::EnvFilter;

const POLL_INTERVAL: Duration = Duration::from_millis(20);
const TONE_BUFFERS: usize = 4;
const TONE_BUFFER_FRAMES: usize = 2048;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "Audio playback for the jove game framework."
)]
struct Cli {
    /// Path to a YAML audio config. JOVE_AUDIO_* environment variables override it.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// The output device to use. Overrides the config.
    #[arg(short, long, global = true)]
    device: Option<String>,
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available audio output devices.
    Devices {},
    /// Plays an audio file until it ends.
    Play {
        /// The file to play.
        path: PathBuf,
        /// Decode the file while playing instead of up front.
        #[arg(short, long)]
        stream: bool,
        /// Loop forever.
        #[arg(short, long)]
        looping: bool,
        /// Source volume in [0, 1].
        #[arg(short, long, default_value_t = 1.0)]
        volume: f32,
        /// Playback rate multiplier.
        #[arg(short, long, default_value_t = 1.0)]
        pitch: f32,
    },
    /// Synthesizes a sine tone through a queueable source.
    Tone {
        /// Frequency in Hz.
        frequency: f32,
        /// Length in seconds.
        #[arg(default_value_t = 1.0)]
        seconds: f32,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let mut config = config::load(cli.config.as_deref())?;
    if let Some(device) = &cli.device {
        config = config.with_device(device);
    }

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
            path,
            stream,
            looping,
            volume,
            pitch,
        } => {
            let engine = Engine::new(config)?;
            let mode = if stream {
                SourceMode::Stream
            } else {
                SourceMode::Static
            };
            let source = engine.new_source(&path, mode)?;
            source.set_volume(volume);
            source.set_pitch(pitch);
            source.set_looping(looping)?;

            println!(
                "Playing {} ({}, {:.2}s)",
                path.display(),
                mode,
                source.duration()
            );
            source.play()?;
            while source.is_playing() {
                engine.device_status()?;
                thread::sleep(POLL_INTERVAL);
            }
        }
        Commands::Tone { frequency, seconds } => {
            let engine = Engine::new(config)?;
            let sample_rate = engine.format().sample_rate;
            let source =
                engine.new_queueable_source(sample_rate, BitDepth::Sixteen, 1, TONE_BUFFERS)?;

            let total_frames = (seconds.max(0.0) * sample_rate as f32) as usize;
            let step = 2.0 * PI * frequency / sample_rate as f32;
            let mut written = 0;
            let mut buffer =
                engine.new_sound_data(TONE_BUFFER_FRAMES, sample_rate, BitDepth::Sixteen, 1)?;

            println!("Playing {frequency}Hz for {seconds}s");
            while written < total_frames {
                if source.free_buffer_count() == 0 {
                    engine.device_status()?;
                    thread::sleep(POLL_INTERVAL);
                    continue;
                }
                let frames = TONE_BUFFER_FRAMES.min(total_frames - written);
                if frames < TONE_BUFFER_FRAMES {
                    buffer = engine.new_sound_data(frames, sample_rate, BitDepth::Sixteen, 1)?;
                }
                for i in 0..frames {
                    let phase = step * (written + i) as f32;
                    buffer.set_sample(i, 0, 0.5 * phase.sin())?;
                }
                source.queue(&buffer)?;
                written += frames;
                if !source.is_playing() {
                    source.play()?;
                }
            }

            while source.free_buffer_count() < TONE_BUFFERS as u32 {
                engine.device_status()?;
                thread::sleep(POLL_INTERVAL);
            }
        }
    }

    Ok(())
}
