use anyhow::Context;
use crossbeam_channel::{Receiver, Sender};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::{error, info, warn};

use crate::audio_api::{AudioCommand, MeterReading, VoiceId};
use crate::error::{Result, SeqError};

mod backend;
mod engine;
mod frame;
mod voice;

pub use backend::{AudioBackend, VoiceHandle};
pub use frame::StereoFrame;

use engine::Engine;

const MAX_BLOCK_FRAMES: usize = 1024;

// Where the backend's commands go. The realtime implementation feeds a cpal
// callback over channels; the offline one owns an engine and renders on demand.
pub trait AudioSink {
    fn send(&mut self, cmd: AudioCommand);

    // Idempotent; starts (or restarts) the output path.
    fn resume(&mut self) -> Result<()>;

    fn is_running(&self) -> bool;

    fn drain_expired(&mut self) -> Vec<VoiceId>;

    fn drain_meters(&mut self) -> Vec<MeterReading>;

    fn render(&mut self, _out: &mut [StereoFrame]) -> Result<()> {
        Err(SeqError::OfflineOnly)
    }
}

pub struct AudioHandle {
    tx: Sender<AudioCommand>,
    expired_rx: Receiver<VoiceId>,
    meter_rx: Receiver<MeterReading>,
    sample_rate: u32,
    running: bool,
    _output_stream: cpal::Stream,
}

impl AudioSink for AudioHandle {
    fn send(&mut self, cmd: AudioCommand) {
        if self.tx.try_send(cmd).is_err() {
            warn!("audio command queue full, dropping command");
        }
    }

    fn resume(&mut self) -> Result<()> {
        if self.running {
            return Ok(());
        }
        self._output_stream.play().map_err(|e| {
            error!("could not start output stream: {e}");
            SeqError::OutputSuspended
        })?;
        self.running = true;
        info!("audio output running at {} Hz", self.sample_rate);
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn drain_expired(&mut self) -> Vec<VoiceId> {
        self.expired_rx.try_iter().collect()
    }

    fn drain_meters(&mut self) -> Vec<MeterReading> {
        self.meter_rx.try_iter().collect()
    }
}

// Builds the output stream but leaves it paused; AudioBackend::ensure_running starts it.
pub fn start_audio() -> anyhow::Result<AudioHandle> {
    let (tx, rx) = crossbeam_channel::bounded::<AudioCommand>(1024);
    let (expired_tx, expired_rx) = crossbeam_channel::bounded::<VoiceId>(1024);
    let (meter_tx, meter_rx) = crossbeam_channel::bounded::<MeterReading>(1024);

    let host = cpal::default_host();
    let device = host.default_output_device().context("no default output device")?;
    let config = device.default_output_config().context("no default output config")?;

    let sample_rate = config.sample_rate();
    let channels = config.channels() as usize;

    let mut engine = Engine::new(sample_rate);
    engine.set_expired_tx(expired_tx);
    engine.set_meter_tx(meter_tx);

    match config.sample_format() {
        cpal::SampleFormat::F32 => {
            let output_stream = build_output_stream_f32(&device, &config.into(), rx, engine, channels)?;
            // Some hosts start streams as soon as they are built.
            let _ = output_stream.pause();
            Ok(AudioHandle {
                tx,
                expired_rx,
                meter_rx,
                sample_rate,
                running: false,
                _output_stream: output_stream,
            })
        }
        _ => anyhow::bail!("unsupported sample format (only f32 supported for now)"),
    }
}

// ── Output stream ─────────────────────────────────────────────────

fn build_output_stream_f32(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    rx: Receiver<AudioCommand>,
    mut engine: Engine,
    channels: usize,
) -> anyhow::Result<cpal::Stream> {
    let mut scratch = vec![StereoFrame::zero(); MAX_BLOCK_FRAMES];

    let err_fn = |err| error!("audio output stream error: {err}");

    let stream = device.build_output_stream(
        config,
        move |data: &mut [f32], _info| {
            while let Ok(cmd) = rx.try_recv() { // set up command handling
                engine.handle_cmd(cmd);
            }

            for chunk in data.chunks_mut(MAX_BLOCK_FRAMES * channels) {
                let n_frames = chunk.len() / channels;
                let frames = &mut scratch[..n_frames];
                engine.render_block(frames);
                for (out, frame) in chunk.chunks_exact_mut(channels).zip(frames.iter()) {
                    match out {
                        [mono] => *mono = frame.left,
                        [left, right, rest @ ..] => {
                            *left = frame.left;
                            *right = frame.right;
                            rest.fill(0.0);
                        }
                        [] => {}
                    }
                }
            }
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}

// ── Offline ───────────────────────────────────────────────────────

// In-process engine with no device. Used for bouncing to disk and by tests.
pub struct OfflineSink {
    engine: Engine,
    expired_rx: Receiver<VoiceId>,
    meter_rx: Receiver<MeterReading>,
    running: bool,
}

impl OfflineSink {
    pub fn new(sample_rate: u32) -> Self {
        let (expired_tx, expired_rx) = crossbeam_channel::unbounded();
        let (meter_tx, meter_rx) = crossbeam_channel::bounded(1024);
        let mut engine = Engine::new(sample_rate);
        engine.set_expired_tx(expired_tx);
        engine.set_meter_tx(meter_tx);
        Self { engine, expired_rx, meter_rx, running: false }
    }
}

impl AudioSink for OfflineSink {
    fn send(&mut self, cmd: AudioCommand) {
        self.engine.handle_cmd(cmd);
    }

    fn resume(&mut self) -> Result<()> {
        self.running = true;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn drain_expired(&mut self) -> Vec<VoiceId> {
        self.expired_rx.try_iter().collect()
    }

    fn drain_meters(&mut self) -> Vec<MeterReading> {
        self.meter_rx.try_iter().collect()
    }

    fn render(&mut self, out: &mut [StereoFrame]) -> Result<()> {
        for chunk in out.chunks_mut(MAX_BLOCK_FRAMES) {
            chunk.fill(StereoFrame::zero());
            self.engine.render_block(chunk);
        }
        Ok(())
    }
}
