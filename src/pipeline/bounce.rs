// Offline render of a project to a 16-bit stereo WAV.
//
// The same Middle that drives the realtime output is run against an
// OfflineSink: every tick plays one row, then exactly one tick's worth of
// audio is rendered, so timing is exact regardless of wall-clock speed.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use log::info;

use super::project::ProjectDocument;
use crate::audio::{OfflineSink, StereoFrame};
use crate::middle::Middle;
use crate::shared::Command;

pub const BOUNCE_SAMPLE_RATE: u32 = 44_100;
const TAIL: Duration = Duration::from_millis(600); // let the last notes ring out

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BounceSummary {
    pub rows: usize,
    pub frames: usize,
}

// Frame boundary of the given tick, rounded once so ticks don't drift.
fn frame_at(tick: usize, interval: Duration, sample_rate: u32) -> usize {
    (tick as f64 * interval.as_secs_f64() * sample_rate as f64).round() as usize
}

/// Render `loops` passes over the longest pattern. Returns the frames and the
/// number of rows played.
pub fn render(doc: &ProjectDocument, loops: u32) -> anyhow::Result<(Vec<StereoFrame>, usize)> {
    let mut middle = Middle::new(Box::new(OfflineSink::new(BOUNCE_SAMPLE_RATE)));
    middle.load_document(doc.clone()).context("bouncing project")?;
    middle.handle_input(Command::Play)?;

    let rows = loops as usize * middle.pattern_span();
    let interval = middle.transport().tick_interval();
    let total = frame_at(rows, interval, BOUNCE_SAMPLE_RATE)
        + (TAIL.as_secs_f64() * BOUNCE_SAMPLE_RATE as f64).round() as usize;
    let mut out = vec![StereoFrame::zero(); total];

    for tick in 0..rows {
        middle.advance();
        let start = frame_at(tick, interval, BOUNCE_SAMPLE_RATE);
        let end = frame_at(tick + 1, interval, BOUNCE_SAMPLE_RATE);
        middle.render(&mut out[start..end])?;
    }
    middle.handle_input(Command::Stop)?;
    let tail_start = frame_at(rows, interval, BOUNCE_SAMPLE_RATE);
    middle.render(&mut out[tail_start..])?;
    Ok((out, rows))
}

pub fn bounce(doc: &ProjectDocument, path: &Path, loops: u32) -> anyhow::Result<BounceSummary> {
    let (frames, rows) = render(doc, loops)?;

    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: BOUNCE_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("creating {}", path.display()))?;
    for frame in &frames {
        writer.write_sample(to_i16(frame.left))?;
        writer.write_sample(to_i16(frame.right))?;
    }
    writer.finalize()?;

    let summary = BounceSummary { rows, frames: frames.len() };
    info!("bounced {} frames to {}", summary.frames, path.display());
    Ok(summary)
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}
