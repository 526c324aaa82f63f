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
//! Scenario tests driving the engine service end to end through the mock device.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::audio::{mock, source::AudioSource, OutputFormat};
use crate::config;
use crate::graph::Endpoint;
use crate::service::AudioEngineService;
use crate::testutil::{calculate_rms, eventually, read_wav, sine};
use crate::TrackId;

fn service(
    dir: &Path,
    sample_rate: u32,
    channels: u16,
) -> (AudioEngineService, Arc<mock::Device>) {
    let config = config::Engine::new("mock")
        .with_sample_rate(sample_rate)
        .with_channels(channels)
        .with_export_dir(dir);
    let format = config.output_format().unwrap();
    let device = Arc::new(mock::Device::new("mock", format));
    (AudioEngineService::with_device(device.clone(), &config), device)
}

fn constant(value: f32, sample_rate: u32) -> Arc<AudioSource> {
    Arc::new(AudioSource::from_interleaved("dc", vec![value; 64], 1, sample_rate).unwrap())
}

fn loop_of(frequency: f32, sample_rate: u32) -> Arc<AudioSource> {
    let samples = sine(frequency, sample_rate, sample_rate as usize / 10);
    Arc::new(AudioSource::from_interleaved("sine", samples, 1, sample_rate).unwrap())
}

#[test]
fn pause_then_play_resumes_audio() {
    let dir = tempfile::tempdir().unwrap();
    let (mut service, device) = service(dir.path(), 8000, 1);
    let id = service.add_track(loop_of(200.0, 8000));

    assert!(service.play(id));
    assert!(calculate_rms(&device.pull(400)) > 0.1);

    assert!(service.pause(id));
    assert!(service.transport().graph().node_set(id).is_some());
    assert_eq!(calculate_rms(&device.pull(400)), 0.0);

    assert!(service.play(id));
    assert!(calculate_rms(&device.pull(400)) > 0.1);
}

#[test]
fn removal_leaves_no_dangling_connections() {
    let dir = tempfile::tempdir().unwrap();
    let (mut service, device) = service(dir.path(), 8000, 1);
    let a = service.add_track(constant(0.25, 8000));
    let b = service.add_track(constant(0.5, 8000));
    service.play_all(&[a, b]);
    assert_eq!(device.pull(1), vec![0.75]);

    let graph = service.transport().graph();
    let bus = graph.bus_of(b).unwrap();
    let node_set = graph.node_set(b).unwrap().clone();

    assert!(service.remove(b));
    let graph = service.transport().graph();
    assert!(service.transport().registry().get(b).is_none());
    assert!(!graph.is_bus_connected(bus));
    assert!(!graph.is_attached(node_set.player.id()));
    assert!(!graph.is_attached(node_set.pitch.id()));
    assert!(graph.connections().iter().all(|connection| {
        connection.from != node_set.player.id()
            && connection.from != node_set.pitch.id()
            && connection.to != Endpoint::MixerBus(bus)
    }));
    assert_eq!(device.pull(1), vec![0.25]);
}

#[test]
fn live_tracks_get_distinct_buses() {
    let dir = tempfile::tempdir().unwrap();
    let (mut service, _) = service(dir.path(), 8000, 1);
    let ids: Vec<TrackId> = (0..8)
        .map(|_| service.add_track(constant(0.1, 8000)))
        .collect();
    service.play_all(&ids);
    service.remove(ids[3]);
    service.remove(ids[5]);

    let mut buses: Vec<u32> = service
        .transport()
        .graph()
        .node_sets()
        .map(|(_, node_set)| node_set.bus)
        .collect();
    buses.sort();
    assert_eq!(buses, vec![0, 1, 2, 4, 6, 7]);
}

#[test]
fn bus_indices_are_never_recycled() {
    let dir = tempfile::tempdir().unwrap();
    let (mut service, _) = service(dir.path(), 8000, 1);
    let a = service.add_track(constant(0.1, 8000));
    let b = service.add_track(constant(0.1, 8000));
    let c = service.add_track(constant(0.1, 8000));
    service.play_all(&[a, b, c]);

    let graph = service.transport().graph();
    assert_eq!(
        (graph.bus_of(a), graph.bus_of(b), graph.bus_of(c)),
        (Some(0), Some(1), Some(2))
    );

    service.remove(b);
    let graph = service.transport().graph();
    assert_eq!((graph.bus_of(a), graph.bus_of(c)), (Some(0), Some(2)));

    let d = service.add_track(constant(0.1, 8000));
    service.play(d);
    assert_eq!(service.transport().graph().bus_of(d), Some(3));
}

#[test]
fn setters_on_removed_or_never_played_tracks_do_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let (mut service, _) = service(dir.path(), 8000, 1);
    let playing = service.add_track(constant(0.1, 8000));
    let idle = service.add_track(constant(0.1, 8000));
    let removed = service.add_track(constant(0.1, 8000));
    service.play_all(&[playing, removed]);
    service.remove(removed);

    for id in [idle, removed, TrackId::random()] {
        assert!(!service.set_gain(id, 0.5));
        assert!(!service.set_speed_rate(id, 2.0));
    }
    let track = service.transport().registry().get(idle).unwrap();
    assert_eq!(track.gain(), 1.0);
}

#[test]
fn double_play_schedules_once() {
    let dir = tempfile::tempdir().unwrap();
    let (mut service, device) = service(dir.path(), 8000, 1);
    let a = service.add_track(constant(0.5, 8000));

    service.play(a);
    service.play(a);
    let node_set = service.transport().graph().node_set(a).unwrap();
    assert_eq!(node_set.player.schedule_count(), 1);
    // One copy of the loop, not two overlapping ones.
    assert_eq!(device.pull(4), vec![0.5; 4]);
}

#[test]
fn speed_rate_needs_running_engine() {
    let dir = tempfile::tempdir().unwrap();
    let (mut service, _) = service(dir.path(), 8000, 1);
    let a = service.add_track(constant(0.5, 8000));

    assert!(!service.set_speed_rate(a, 2.0));
    assert!(service.play(a));
    assert!(service.set_speed_rate(a, 2.0));
    let node_set = service.transport().graph().node_set(a).unwrap();
    assert_eq!(node_set.pitch.rate(), 2.0);
}

#[test]
fn speed_rate_changes_playback_speed() {
    let dir = tempfile::tempdir().unwrap();
    let (mut service, device) = service(dir.path(), 8000, 1);
    let ramp: Vec<f32> = (0..16).map(|i| i as f32 / 16.0).collect();
    let a = service.add_track(Arc::new(
        AudioSource::from_interleaved("ramp", ramp, 1, 8000).unwrap(),
    ));

    service.play(a);
    service.set_speed_rate(a, 2.0);
    assert_eq!(device.pull(4), vec![0.0, 0.125, 0.25, 0.375]);
}

#[tokio::test]
async fn export_with_no_tracks_is_valid_and_silent() {
    let dir = tempfile::tempdir().unwrap();
    let (mut service, _) = service(dir.path(), 48000, 2);

    let file = service.export_mix().await.unwrap();
    assert_eq!(file.format(), &OutputFormat::float(48000, 2).unwrap());
    let path = service
        .render_offline(file, Duration::from_millis(10))
        .unwrap();

    let (spec, samples) = read_wav(&path).unwrap();
    assert_eq!(spec.sample_rate, 48000);
    assert_eq!(spec.channels, 2);
    assert_eq!(samples.len(), 960);
    assert!(samples.iter().all(|sample| *sample == 0.0));

    // A file finalized before anything is written is valid too.
    let path = service.export_mix().await.unwrap().finalize().unwrap();
    let (spec, samples) = read_wav(&path).unwrap();
    assert_eq!((spec.sample_rate, spec.channels), (48000, 2));
    assert!(samples.is_empty());
}

#[tokio::test]
async fn export_inherits_output_format() {
    let dir = tempfile::tempdir().unwrap();
    let (mut service, _) = service(dir.path(), 22050, 1);
    let a = service.add_track(loop_of(440.0, 22050));
    service.play(a);

    let file = service.export_mix().await.unwrap();
    let path = service
        .render_offline(file, Duration::from_millis(100))
        .unwrap();

    let (spec, samples) = read_wav(&path).unwrap();
    assert_eq!((spec.sample_rate, spec.channels), (22050, 1));
    assert_eq!(samples.len(), 2205);
    assert!(calculate_rms(&samples) > 0.1);
}

/// Pulls audio from the mock device on a separate thread, the way a hardware
/// callback would, until told to stop.
struct RenderThread {
    running: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl RenderThread {
    fn spawn(device: Arc<mock::Device>) -> RenderThread {
        let running = Arc::new(AtomicBool::new(true));
        let handle = {
            let running = running.clone();
            thread::spawn(move || {
                while running.load(Ordering::Relaxed) {
                    device.pull(64);
                    thread::sleep(Duration::from_millis(1));
                }
            })
        };
        RenderThread {
            running,
            handle: Some(handle),
        }
    }
}

impl Drop for RenderThread {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[tokio::test]
async fn recording_captures_live_output() {
    let dir = tempfile::tempdir().unwrap();
    let (mut service, device) = service(dir.path(), 8000, 1);
    let a = service.add_track(constant(0.5, 8000));
    service.play(a);

    let file = service.export_mix().await.unwrap();
    service.start_recording(file).unwrap();
    let render = RenderThread::spawn(device);
    let mixer = service.transport().graph().mixer().clone();
    eventually(
        || mixer.frames_rendered() >= 640,
        "render thread never produced audio",
    );
    drop(render);

    let path = service.stop_recording().unwrap();
    let (_, samples) = read_wav(&path).unwrap();
    assert!(samples.len() >= 640);
    assert_eq!(samples.len() % 64, 0);
    assert!(samples.iter().all(|sample| *sample == 0.5));
}

#[tokio::test]
async fn offline_render_stays_out_of_live_recording() {
    let dir = tempfile::tempdir().unwrap();
    let (mut service, _) = service(dir.path(), 8000, 1);
    let a = service.add_track(constant(0.5, 8000));
    service.play(a);

    let live = service.export_mix().await.unwrap();
    service.start_recording(live).unwrap();

    let offline = service.export_mix().await.unwrap();
    let offline_path = service
        .render_offline(offline, Duration::from_millis(100))
        .unwrap();
    let live_path = service.stop_recording().unwrap();

    let (_, samples) = read_wav(&live_path).unwrap();
    assert!(samples.is_empty());

    let (_, samples) = read_wav(&offline_path).unwrap();
    assert_eq!(samples.len(), 800);
    assert!(samples.iter().all(|sample| *sample == 0.5));
}

#[test]
fn removal_during_rendering() {
    let dir = tempfile::tempdir().unwrap();
    let (mut service, device) = service(dir.path(), 8000, 1);
    let ids: Vec<TrackId> = (0..4)
        .map(|_| service.add_track(loop_of(100.0, 8000)))
        .collect();
    service.play_all(&ids);

    let render = RenderThread::spawn(device.clone());
    let mixer = service.transport().graph().mixer().clone();
    for id in &ids {
        let target = mixer.frames_rendered() + 64;
        eventually(
            || mixer.frames_rendered() >= target,
            "render thread stalled",
        );
        assert!(service.remove(*id));
    }
    drop(render);

    assert!(mixer.connected_buses().is_empty());
    assert_eq!(calculate_rms(&device.pull(64)), 0.0);
}

#[test]
fn failed_engine_start_can_be_retried() {
    let dir = tempfile::tempdir().unwrap();
    let (mut service, device) = service(dir.path(), 8000, 1);
    let a = service.add_track(constant(0.5, 8000));

    device.fail_next_start();
    assert!(!service.play(a));
    assert!(!service.is_playing(a));
    assert_eq!(device.pull(1), vec![0.0]);

    assert!(service.play(a));
    assert_eq!(device.pull(1), vec![0.5]);
}
