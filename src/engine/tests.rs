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
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tempfile::TempDir;

use super::*;
use crate::audio::{mock, SampleFormat, SourceKind, SourceState};
use crate::filesystem::OsFilesystem;
use crate::testutil::{audio_test_utils, sine, write_wav, write_wav_with_bits};

const RATE: u32 = 8000;

struct Fixture {
    engine: Engine,
    device: mock::Device,
    dir: TempDir,
}

impl Fixture {
    fn new(period_frames: usize) -> Fixture {
        Fixture::with_config(
            config::Audio::new("mock-engine")
                .with_max_sources(16)
                .with_stream_chunk_frames(256),
            period_frames,
        )
    }

    fn with_config(config: config::Audio, period_frames: usize) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let format = TargetFormat::new(RATE, 2, SampleFormat::Float, 32).unwrap();
        let device = mock::Device::new("mock-engine", format, period_frames);
        let engine = Engine::with_device(
            config,
            Box::new(device.clone()),
            Arc::new(OsFilesystem::with_root(dir.path())),
        )
        .unwrap();
        Fixture {
            engine,
            device,
            dir,
        }
    }

    /// Writes a mono 32-bit float WAV into the asset directory.
    fn wav<'a>(&self, name: &'a str, samples: Vec<f32>) -> &'a Path {
        write_wav(self.dir.path().join(name), vec![samples], RATE).unwrap();
        Path::new(name)
    }

    fn sine_wav<'a>(&self, name: &'a str, frames: usize) -> &'a Path {
        self.wav(name, sine(440.0, RATE, frames, 0.5))
    }

    /// A mono clip whose samples count up, so the output shows which frame played.
    fn ramp_wav<'a>(&self, name: &'a str, frames: usize) -> &'a Path {
        self.wav(
            name,
            (0..frames).map(|i| i as f32 / frames as f32).collect(),
        )
    }

    fn periods(&self, count: usize) -> Vec<f32> {
        let mut out = Vec::new();
        for _ in 0..count {
            out.extend(self.device.render_period());
        }
        out
    }
}

fn left(samples: &[f32]) -> Vec<f32> {
    samples.iter().step_by(2).copied().collect()
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[test]
fn test_static_sine_end_to_end() {
    let fixture = Fixture::new(256);
    let path = fixture.sine_wav("sine.wav", 8000);
    let source = fixture.engine.new_source(path, SourceMode::Static).unwrap();

    assert!(audio_test_utils::peak(&fixture.periods(1)) == 0.0);

    source.play().unwrap();
    let playing = fixture.periods(1);
    assert!(audio_test_utils::calculate_rms(&playing) > 0.1);

    source.stop();
    let stopped = fixture.periods(1);
    assert_eq!(audio_test_utils::peak(&stopped), 0.0);
}

#[test]
fn test_stop_rewinds_and_pause_freezes() {
    let fixture = Fixture::new(64);
    let path = fixture.sine_wav("sine.wav", 4000);
    let source = fixture.engine.new_source(path, SourceMode::Static).unwrap();

    source.play().unwrap();
    fixture.periods(2);
    let before = source.tell();
    assert!(approx(before, 128.0 / RATE as f64));

    source.pause();
    assert!(approx(source.tell(), before));
    assert_eq!(audio_test_utils::peak(&fixture.periods(3)), 0.0);
    assert!(approx(source.tell(), before));

    // Resuming continues from the frozen position.
    source.play().unwrap();
    fixture.periods(1);
    assert!(approx(source.tell(), 192.0 / RATE as f64));

    source.stop();
    assert_eq!(source.tell(), 0.0);
    assert!(source.is_stopped());
}

#[test]
fn test_natural_end_and_replay() {
    let fixture = Fixture::new(64);
    let path = fixture.sine_wav("blip.wav", 800);
    let source = fixture.engine.new_source(path, SourceMode::Static).unwrap();

    source.play().unwrap();
    fixture.periods(13);
    assert!(source.is_stopped());
    assert!(approx(source.tell(), source.duration()));

    source.play().unwrap();
    assert_eq!(source.tell(), 0.0);
    fixture.periods(1);
    assert!(approx(source.tell(), 64.0 / RATE as f64));
}

#[test]
fn test_seek_clamps_and_lands() {
    let fixture = Fixture::new(100);
    let path = fixture.ramp_wav("ramp.wav", 2000);
    let source = fixture.engine.new_source(path, SourceMode::Static).unwrap();

    source.seek(100.0).unwrap();
    assert!(approx(source.tell(), source.duration()));
    source.seek(-1.0).unwrap();
    assert_eq!(source.tell(), 0.0);

    // A seek while stopped is honoured by the next play.
    source.seek(0.125).unwrap();
    source.play().unwrap();
    assert!(approx(source.tell(), 0.125));
    let out = left(&fixture.periods(1));
    assert!((out[0] - 1000.0 / 2000.0).abs() < 1e-6);
    assert!((out[99] - 1099.0 / 2000.0).abs() < 1e-6);

    // And one while playing takes effect on the next period.
    source.seek(0.0).unwrap();
    let out = left(&fixture.periods(1));
    assert!(out[0].abs() < 1e-6);
}

#[test]
fn test_looping_wraps_without_gap() {
    let fixture = Fixture::new(100);
    let path = fixture.sine_wav("loop.wav", 800);
    let source = fixture.engine.new_source(path, SourceMode::Static).unwrap();
    source.set_looping(true).unwrap();

    source.play().unwrap();
    let first = fixture.periods(1);
    fixture.periods(7);
    assert!(source.is_playing());
    assert!(approx(source.tell(), 0.0));

    assert_eq!(fixture.periods(1), first);
    assert!(approx(source.tell(), 100.0 / RATE as f64));
}

#[test]
fn test_queue_capacity_accounting() {
    let fixture = Fixture::new(100);
    let source = fixture
        .engine
        .new_queueable_source(RATE, BitDepth::Sixteen, 1, 3)
        .unwrap();
    let buffer = fixture
        .engine
        .new_sound_data(100, RATE, BitDepth::Sixteen, 1)
        .unwrap();

    assert_eq!(source.free_buffer_count(), 3);
    for _ in 0..3 {
        assert!(source.queue(&buffer).unwrap());
    }
    assert_eq!(source.free_buffer_count(), 0);
    assert!(!source.queue(&buffer).unwrap());

    source.play().unwrap();
    fixture.periods(1);
    assert_eq!(source.free_buffer_count(), 1);

    // Stopping discards what is still queued.
    source.stop();
    fixture.periods(1);
    assert_eq!(source.free_buffer_count(), 3);

    let wrong = fixture
        .engine
        .new_sound_data(100, RATE, BitDepth::Sixteen, 2)
        .unwrap();
    assert!(matches!(
        source.queue(&wrong),
        Err(AudioError::InvalidOperation(_))
    ));
    assert!(matches!(
        source.seek(1.0),
        Err(AudioError::InvalidOperation(_))
    ));
    assert_eq!(source.duration(), 0.0);
}

#[test]
fn test_queue_of_ramps_end_to_end() {
    let fixture = Fixture::new(1000);
    let source = fixture
        .engine
        .new_queueable_source(RATE, BitDepth::ThirtyTwoFloat, 1, 4)
        .unwrap();

    for _ in 0..4 {
        let mut buffer = fixture
            .engine
            .new_sound_data(1000, RATE, BitDepth::ThirtyTwoFloat, 1)
            .unwrap();
        for i in 0..1000 {
            buffer.set_sample(i, 0, i as f32 / 1000.0).unwrap();
        }
        assert!(source.queue(&buffer).unwrap());
    }
    source.play().unwrap();

    for _ in 0..4 {
        let out = left(&fixture.periods(1));
        assert_eq!(out[0], 0.0);
        assert!((out[999] - 0.999).abs() < 1e-6);
    }
    assert_eq!(source.free_buffer_count(), 4);

    assert_eq!(audio_test_utils::peak(&fixture.periods(1)), 0.0);
    // Running dry is an underrun, not an end.
    assert_eq!(source.state(), SourceState::Playing);
}

#[test]
fn test_stream_source_plays_through() {
    let fixture = Fixture::new(64);
    let path = fixture.ramp_wav("stream.wav", 2000);
    let source = fixture.engine.new_source(path, SourceMode::Stream).unwrap();
    assert_eq!(source.kind(), SourceKind::Stream);
    assert!(approx(source.duration(), 0.25));

    source.play().unwrap();
    // The first chunk is decoded before play returns.
    let out = left(&fixture.periods(1));
    assert!((out[63] - 63.0 / 2000.0).abs() < 1e-6);

    let mut periods = 0;
    while !source.is_stopped() {
        assert!(periods < 1000, "stream never finished");
        fixture.periods(1);
        thread::sleep(Duration::from_millis(1));
        periods += 1;
    }
    assert!(approx(source.tell(), source.duration()));
}

#[test]
fn test_stream_loop_off_stops_at_end_of_pass() {
    let fixture = Fixture::new(64);
    let path = fixture.ramp_wav("stream.wav", 600);
    let source = fixture.engine.new_source(path, SourceMode::Stream).unwrap();
    source.set_looping(true).unwrap();
    source.play().unwrap();

    let mut periods = 0;
    while source.tell() < 500.0 / RATE as f64 {
        assert!(periods < 1000, "stream never reached its last chunk");
        fixture.periods(1);
        thread::sleep(Duration::from_millis(1));
        periods += 1;
    }
    // Give the workers time to decode past the wrap.
    thread::sleep(Duration::from_millis(20));
    source.set_looping(false).unwrap();

    let mut last = source.tell();
    let mut out = Vec::new();
    periods = 0;
    while !source.is_stopped() {
        assert!(periods < 1000, "stream never finished");
        out.extend(left(&fixture.periods(1)));
        let tell = source.tell();
        assert!(tell >= last, "position went back from {} to {}", last, tell);
        assert!(tell <= source.duration() + 1e-9);
        last = tell;
        thread::sleep(Duration::from_millis(1));
        periods += 1;
    }
    assert!(approx(source.tell(), source.duration()));
    // Nothing from the start of the clip plays again.
    assert!(out.iter().all(|s| *s == 0.0 || *s >= 500.0 / 600.0 - 1e-6));
}

#[test]
fn test_stream_seek_while_playing() {
    let fixture = Fixture::new(64);
    let path = fixture.ramp_wav("stream.wav", 2000);
    let source = fixture.engine.new_source(path, SourceMode::Stream).unwrap();

    source.play().unwrap();
    fixture.periods(1);
    source.seek(0.125).unwrap();
    let out = left(&fixture.periods(1));
    assert!((out[0] - 1000.0 / 2000.0).abs() < 1e-6);
    assert!(approx(source.tell(), (1000.0 + 64.0) / RATE as f64));
}

#[test]
fn test_stream_sources_cannot_clone() {
    let fixture = Fixture::new(64);
    let path = fixture.ramp_wav("stream.wav", 500);
    let source = fixture.engine.new_source(path, SourceMode::Stream).unwrap();
    assert!(matches!(
        source.try_clone(),
        Err(AudioError::InvalidOperation(_))
    ));
}

#[test]
fn test_clone_independence() {
    let fixture = Fixture::new(64);
    let path = fixture.sine_wav("sine.wav", 800);
    let source = fixture.engine.new_source(path, SourceMode::Static).unwrap();
    source.set_volume(0.5);
    source.set_pitch(1.5);
    source.set_looping(true).unwrap();
    source.play().unwrap();

    let clone = source.try_clone().unwrap();
    assert_eq!(clone.state(), SourceState::Initial);
    assert_eq!(clone.volume(), 0.5);
    assert_eq!(clone.pitch(), 1.5);
    assert!(clone.is_looping());

    clone.set_volume(0.1);
    clone.set_pitch(0.5);
    assert_eq!(source.volume(), 0.5);
    assert_eq!(source.pitch(), 1.5);
    assert_ne!(clone.id(), source.id());
}

#[test]
fn test_active_source_count() {
    let fixture = Fixture::new(64);
    let path = fixture.sine_wav("sine.wav", 8000);
    let a = fixture.engine.new_source(path, SourceMode::Static).unwrap();
    let b = a.try_clone().unwrap();
    let c = a.try_clone().unwrap();
    assert_eq!(fixture.engine.active_source_count(), 0);

    for source in [&a, &b, &c] {
        source.play().unwrap();
    }
    assert_eq!(fixture.engine.active_source_count(), 3);

    a.pause();
    assert_eq!(fixture.engine.active_source_count(), 2);
    b.stop();
    assert_eq!(fixture.engine.active_source_count(), 1);
    c.release();
    assert_eq!(fixture.engine.active_source_count(), 0);
    a.play().unwrap();
    assert_eq!(fixture.engine.active_source_count(), 1);

    b.play().unwrap();
    assert_eq!(fixture.engine.pause_all(), 2);
    assert_eq!(fixture.engine.active_source_count(), 0);
    a.play().unwrap();
    fixture.engine.stop_all();
    assert!(a.is_stopped());
    assert!(b.is_stopped());
}

#[test]
fn test_released_sources_go_silent() {
    let fixture = Fixture::new(64);
    let path = fixture.sine_wav("sine.wav", 8000);
    let source = fixture.engine.new_source(path, SourceMode::Static).unwrap();
    source.play().unwrap();
    assert!(audio_test_utils::peak(&fixture.periods(1)) > 0.0);

    drop(source);
    assert_eq!(audio_test_utils::peak(&fixture.periods(1)), 0.0);
    assert_eq!(fixture.engine.mixer().lock().voice_count(), 0);
}

#[test]
fn test_master_volume() {
    let fixture = Fixture::new(64);
    let path = fixture.wav("dc.wav", vec![0.5; 800]);
    let source = fixture.engine.new_source(path, SourceMode::Static).unwrap();

    fixture.engine.set_volume(0.5);
    source.play().unwrap();
    let out = fixture.periods(1);
    assert!(out.iter().all(|s| (s - 0.25).abs() < 1e-6));

    fixture.engine.set_volume(2.0);
    assert_eq!(fixture.engine.volume(), 1.0);
    fixture.engine.set_volume(-1.0);
    assert_eq!(fixture.engine.volume(), 0.0);
}

#[test]
fn test_source_limit() {
    let fixture = Fixture::with_config(config::Audio::new("mock-engine").with_max_sources(2), 64);
    let path = fixture.sine_wav("sine.wav", 100);
    let a = fixture.engine.new_source(path, SourceMode::Static).unwrap();
    let _b = fixture.engine.new_source(path, SourceMode::Static).unwrap();
    assert!(matches!(
        fixture.engine.new_source(path, SourceMode::Static),
        Err(AudioError::InvalidOperation(_))
    ));
    assert!(a.try_clone().is_err());

    drop(a);
    assert!(fixture.engine.new_source(path, SourceMode::Static).is_ok());
}

#[test]
fn test_clip_cache_shares_data() {
    let fixture = Fixture::new(64);
    let path = fixture.sine_wav("sine.wav", 100);
    let first = fixture.engine.load_clip(path).unwrap();
    let second = fixture.engine.load_clip(path).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.total_frames(), 100);
}

#[test]
fn test_load_errors() {
    let fixture = Fixture::new(64);
    assert!(matches!(
        fixture
            .engine
            .new_source(Path::new("missing.wav"), SourceMode::Static),
        Err(AudioError::Io(_))
    ));

    std::fs::write(fixture.dir.path().join("junk.wav"), b"definitely not audio").unwrap();
    assert!(matches!(
        fixture
            .engine
            .new_source(Path::new("junk.wav"), SourceMode::Stream),
        Err(AudioError::UnsupportedFormat(_))
    ));
}

#[test]
fn test_sound_data() {
    let fixture = Fixture::new(64);
    write_wav_with_bits(
        fixture.dir.path().join("stereo.wav"),
        vec![vec![1000i16; 100], vec![-1000i16; 100]],
        22050,
        16,
    )
    .unwrap();

    let buffer = fixture
        .engine
        .decode_sound_data(Path::new("stereo.wav"))
        .unwrap();
    assert_eq!(buffer.frame_count(), 100);
    assert_eq!(buffer.channels(), 2);
    assert_eq!(buffer.sample_rate(), 22050);
    assert!(buffer.sample(0, 0) > 0.0);
    assert!(buffer.sample(0, 1) < 0.0);

    let blank = fixture
        .engine
        .new_sound_data(10, 44100, BitDepth::Eight, 1)
        .unwrap();
    assert_eq!(blank.frame_count(), 10);
    assert_eq!(blank.sample(9, 0), 0.0);
}

#[test]
fn test_device_status_and_shutdown() {
    let mut fixture = Fixture::new(64);
    assert!(fixture.device.is_open());
    assert!(fixture.engine.device_status().is_ok());

    fixture.device.fail("device unplugged");
    assert!(matches!(
        fixture.engine.device_status(),
        Err(AudioError::Device(_))
    ));

    fixture.engine.shutdown();
    assert!(!fixture.device.is_open());
    assert!(fixture.engine.device_status().is_err());
    fixture.engine.shutdown();
}

#[test]
fn test_open_failure_is_synchronous() {
    let format = TargetFormat::new(RATE, 2, SampleFormat::Float, 32).unwrap();
    let device = mock::Device::new("mock-engine", format, 64);
    device.fail_open("device busy");
    let result = Engine::with_device(
        config::Audio::new("mock-engine"),
        Box::new(device.clone()),
        Arc::new(OsFilesystem::default()),
    );
    assert!(matches!(result, Err(AudioError::Device(_))));
    assert!(!device.is_open());
}

#[test]
fn test_source_mode_parsing() {
    assert_eq!("static".parse::<SourceMode>().unwrap(), SourceMode::Static);
    assert_eq!("Stream".parse::<SourceMode>().unwrap(), SourceMode::Stream);
    assert!("queue".parse::<SourceMode>().is_err());
    assert_eq!(SourceMode::Stream.to_string(), "stream");
}
