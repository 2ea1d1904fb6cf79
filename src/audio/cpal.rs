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
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{error, info, warn};

use super::{
    error::AudioError,
    format::{SampleFormat, TargetFormat},
    mixer::SharedMixer,
    thread_priority::{callback_thread_priority, configure_audio_thread_priority, rt_audio_enabled},
    OutputStream,
};
use crate::config::{self, StreamBufferSize};

/// How often the output thread checks for shutdown and device loss.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

fn device_error(e: impl fmt::Display) -> AudioError {
    AudioError::Device(e.to_string())
}

/// A small wrapper around a cpal::Device along with the settings the
/// engine drives it with.
pub struct Device {
    /// The name of the device.
    name: String,
    /// The maximum number of channels the device supports.
    max_channels: u16,
    /// The host ID of the device.
    host_id: cpal::HostId,
    /// The underlying cpal device.
    device: cpal::Device,
    /// The output format the stream is opened with.
    format: TargetFormat,
    period_frames: usize,
    buffer_size: StreamBufferSize,
    reopen_attempts: u32,
    reopen_delay: Duration,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({}) [{}]",
            self.name,
            self.max_channels,
            self.host_id.name(),
            self.format
        )
    }
}

/// Settings the output thread needs to build and rebuild the stream.
#[derive(Clone)]
struct StreamSettings {
    name: String,
    format: TargetFormat,
    period_frames: usize,
    buffer_size: StreamBufferSize,
    reopen_attempts: u32,
    reopen_delay: Duration,
}

/// Builds the cpal data callback. Renders the mixer in period-sized pieces
/// into a preallocated scratch buffer and converts to the device sample type.
fn create_single_thread_callback<T>(
    mixer: SharedMixer,
    channels: u16,
    period_frames: usize,
) -> impl FnMut(&mut [T], &cpal::OutputCallbackInfo) + Send + 'static
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let mut scratch = vec![0.0f32; period_frames.max(1) * channels as usize];
    let priority = callback_thread_priority();
    let rt_audio = rt_audio_enabled();
    let mut priority_set = false;

    move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
        configure_audio_thread_priority(priority, rt_audio, &mut priority_set);

        // A control call holding the mixer means silence for this callback, never a wait.
        let Some(mut mixer) = mixer.try_lock() else {
            data.fill(T::EQUILIBRIUM);
            return;
        };
        for piece in data.chunks_mut(scratch.len()) {
            let rendered = &mut scratch[..piece.len()];
            mixer.render_into(rendered);
            for (dst, src) in piece.iter_mut().zip(rendered.iter()) {
                *dst = T::from_sample(*src);
            }
        }
    }
}

/// Finds a cpal device by name. "default" is the default output of the default host.
fn find_device(name: &str) -> Result<(cpal::Device, cpal::HostId), AudioError> {
    if name == "default" {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| AudioError::Device("no default output device".to_string()))?;
        return Ok((device, host.id()));
    }

    let _shh_stdout = shh::stdout()?;
    let _shh_stderr = shh::stderr()?;
    for host_id in cpal::available_hosts() {
        let Ok(host) = cpal::host_from_id(host_id) else {
            continue;
        };
        let Ok(devices) = host.output_devices() else {
            continue;
        };
        for device in devices {
            if device.name().is_ok_and(|n| n.trim() == name) {
                return Ok((device, host_id));
            }
        }
    }
    Err(AudioError::Device(format!("no device found with name {}", name)))
}

fn max_output_channels(device: &cpal::Device) -> u16 {
    device
        .supported_output_configs()
        .map(|configs| configs.map(|c| c.channels()).max().unwrap_or(0))
        .unwrap_or(0)
}

fn min_buffer_frames(device: &cpal::Device, channels: u16) -> Option<u32> {
    device
        .supported_output_configs()
        .ok()?
        .filter(|c| c.channels() == channels)
        .filter_map(|c| match c.buffer_size() {
            cpal::SupportedBufferSize::Range { min, .. } => Some(*min),
            cpal::SupportedBufferSize::Unknown => None,
        })
        .min()
}

fn build_stream(
    device: &cpal::Device,
    settings: &StreamSettings,
    mixer: SharedMixer,
    lost: Arc<AtomicBool>,
) -> Result<cpal::Stream, AudioError> {
    let format = &settings.format;
    let buffer_size = match settings.buffer_size {
        StreamBufferSize::Default => cpal::BufferSize::Default,
        StreamBufferSize::Fixed(frames) => cpal::BufferSize::Fixed(frames),
        StreamBufferSize::Min => match min_buffer_frames(device, format.channels) {
            Some(frames) => cpal::BufferSize::Fixed(frames),
            None => cpal::BufferSize::Default,
        },
    };
    let config = cpal::StreamConfig {
        channels: format.channels,
        sample_rate: cpal::SampleRate(format.sample_rate),
        buffer_size,
    };

    let channels = format.channels;
    let period = settings.period_frames;
    let name = settings.name.clone();
    let err_fn = move |err: cpal::StreamError| match err {
        cpal::StreamError::DeviceNotAvailable => lost.store(true, Ordering::Release),
        other => error!(device = name, err = %other, "cpal output stream error"),
    };

    let stream = match (format.sample_format, format.bits_per_sample) {
        (SampleFormat::Float, 32) => device.build_output_stream(
            &config,
            create_single_thread_callback::<f32>(mixer, channels, period),
            err_fn,
            None,
        ),
        (SampleFormat::Int, 16) => device.build_output_stream(
            &config,
            create_single_thread_callback::<i16>(mixer, channels, period),
            err_fn,
            None,
        ),
        (SampleFormat::Int, 32) => device.build_output_stream(
            &config,
            create_single_thread_callback::<i32>(mixer, channels, period),
            err_fn,
            None,
        ),
        (sample_format, bits) => {
            return Err(AudioError::Device(format!(
                "{}-bit {} output is not supported",
                bits, sample_format
            )))
        }
    }
    .map_err(device_error)?;

    stream.play().map_err(device_error)?;
    Ok(stream)
}

/// Rebuilds the stream after device loss. Gives up after the configured number of attempts.
fn reopen(
    settings: &StreamSettings,
    mixer: &SharedMixer,
    lost: &Arc<AtomicBool>,
    shutdown_rx: &Receiver<()>,
) -> Result<cpal::Stream, AudioError> {
    let mut last_err = AudioError::Device(format!("device {} was lost", settings.name));
    for attempt in 1..=settings.reopen_attempts {
        if !matches!(
            shutdown_rx.recv_timeout(settings.reopen_delay),
            Err(RecvTimeoutError::Timeout)
        ) {
            return Err(AudioError::Device("shutting down".to_string()));
        }
        lost.store(false, Ordering::Release);
        let result = find_device(&settings.name)
            .and_then(|(device, _)| build_stream(&device, settings, mixer.clone(), lost.clone()));
        match result {
            Ok(stream) => {
                info!(device = settings.name, attempt, "Reopened output device");
                return Ok(stream);
            }
            Err(e) => {
                warn!(device = settings.name, attempt, err = %e, "Unable to reopen output device");
                last_err = e;
            }
        }
    }
    Err(last_err)
}

/// Body of the output thread. cpal streams are not Send, so the stream is
/// built, kept alive and rebuilt here.
fn run_output(
    device: cpal::Device,
    settings: StreamSettings,
    mixer: SharedMixer,
    ready_tx: Sender<Result<(), AudioError>>,
    shutdown_rx: Receiver<()>,
    fault: Arc<Mutex<Option<String>>>,
) {
    let lost = Arc::new(AtomicBool::new(false));
    let mut stream = match build_stream(&device, &settings, mixer.clone(), lost.clone()) {
        Ok(stream) => {
            let _ = ready_tx.send(Ok(()));
            Some(stream)
        }
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };
    info!(device = settings.name, format = %settings.format, "Output stream started");

    loop {
        match shutdown_rx.recv_timeout(POLL_INTERVAL) {
            Err(RecvTimeoutError::Timeout) => {}
            _ => break,
        }
        if !lost.load(Ordering::Acquire) {
            continue;
        }

        warn!(device = settings.name, "Output device lost");
        drop(stream.take());
        match reopen(&settings, &mixer, &lost, &shutdown_rx) {
            Ok(reopened) => {
                let _ = stream.replace(reopened);
            }
            Err(e) => {
                error!(device = settings.name, err = %e, "Giving up on output device");
                *fault.lock() = Some(e.to_string());
                let _ = shutdown_rx.recv();
                break;
            }
        }
    }
    info!(device = settings.name, "Output stream closed");
}

/// Handle to the output thread. Dropping it closes the stream.
struct CpalStream {
    shutdown_tx: Sender<()>,
    thread: Option<thread::JoinHandle<()>>,
    fault: Arc<Mutex<Option<String>>>,
}

impl OutputStream for CpalStream {
    fn status(&self) -> Result<(), AudioError> {
        match self.fault.lock().as_ref() {
            Some(message) => Err(AudioError::Device(message.clone())),
            None => Ok(()),
        }
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.try_send(());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Output thread panicked");
            }
        }
    }
}

impl Device {
    /// Lists cpal output devices along with their default output format.
    pub fn list() -> Result<Vec<Box<dyn super::Device>>, AudioError> {
        // Suppress noisy output here.
        let _shh_stdout = shh::stdout()?;
        let _shh_stderr = shh::stderr()?;

        let mut devices: Vec<Device> = Vec::new();
        for host_id in cpal::available_hosts() {
            let host_devices = match cpal::host_from_id(host_id).map_err(device_error)?.devices() {
                Ok(host_devices) => host_devices,
                Err(e) => {
                    error!(
                        err = e.to_string(),
                        host = host_id.name(),
                        "Unable to list devices for host"
                    );
                    continue;
                }
            };

            for device in host_devices {
                let max_channels = max_output_channels(&device);
                if max_channels == 0 {
                    continue;
                }
                let Ok(default_config) = device.default_output_config() else {
                    continue;
                };
                let (sample_format, bits) = match default_config.sample_format() {
                    cpal::SampleFormat::F32 => (SampleFormat::Float, 32),
                    cpal::SampleFormat::I16 => (SampleFormat::Int, 16),
                    cpal::SampleFormat::I32 => (SampleFormat::Int, 32),
                    _ => continue,
                };
                let format = TargetFormat::new(
                    default_config.sample_rate().0,
                    default_config.channels(),
                    sample_format,
                    bits,
                )?;
                let config = config::Audio::default();

                devices.push(Device {
                    name: device.name().map_err(device_error)?,
                    max_channels,
                    host_id,
                    device,
                    format,
                    period_frames: config.period_frames(),
                    buffer_size: config.stream_buffer_size(),
                    reopen_attempts: config.reopen_attempts(),
                    reopen_delay: Duration::ZERO,
                })
            }
        }

        devices.sort_by_key(|device| device.name.to_string());
        Ok(devices
            .into_iter()
            .map(|device| {
                let device: Box<dyn super::Device> = Box::new(device);
                device
            })
            .collect())
    }

    /// Gets the given cpal device, configured for output.
    pub fn get(config: &config::Audio) -> Result<Device, AudioError> {
        let invalid = |e: config::ConfigError| AudioError::Device(e.to_string());
        let (device, host_id) = find_device(config.device())?;
        let format = config.target_format().map_err(invalid)?;
        let max_channels = max_output_channels(&device);
        if max_channels < format.channels {
            return Err(AudioError::Device(format!(
                "{} channels requested, audio device {} only has {}",
                format.channels,
                config.device(),
                max_channels
            )));
        }

        Ok(Device {
            name: device.name().map_err(device_error)?,
            max_channels,
            host_id,
            device,
            format,
            period_frames: config.period_frames(),
            buffer_size: config.stream_buffer_size(),
            reopen_attempts: config.reopen_attempts(),
            reopen_delay: config.reopen_delay().map_err(invalid)?,
        })
    }

    fn settings(&self) -> StreamSettings {
        StreamSettings {
            name: self.name.clone(),
            format: self.format.clone(),
            period_frames: self.period_frames,
            buffer_size: self.buffer_size,
            reopen_attempts: self.reopen_attempts,
            reopen_delay: self.reopen_delay,
        }
    }
}

impl super::Device for Device {
    fn format(&self) -> TargetFormat {
        self.format.clone()
    }

    fn period_frames(&self) -> usize {
        self.period_frames
    }

    fn open(&self, mixer: SharedMixer) -> Result<Box<dyn OutputStream>, AudioError> {
        let (ready_tx, ready_rx) = bounded(1);
        let (shutdown_tx, shutdown_rx) = bounded(1);
        let fault = Arc::new(Mutex::new(None));

        let thread = {
            let device = self.device.clone();
            let settings = self.settings();
            let fault = fault.clone();
            thread::Builder::new()
                .name("jove-audio-output".to_string())
                .spawn(move || run_output(device, settings, mixer, ready_tx, shutdown_rx, fault))?
        };

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Box::new(CpalStream {
                shutdown_tx,
                thread: Some(thread),
                fault,
            })),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(AudioError::Device(
                    "output thread exited before the stream opened".to_string(),
                ))
            }
        }
    }
}
