use anyhow::{Context, Result};
use rodio::{OutputStream, OutputStreamHandle, Sink, Source};
use std::time::Duration;

use crate::engine::audio::SampleDriver;

pub const DEFAULT_BLOCK_SIZE: usize = 128;
pub const DEFAULT_CHANNELS: u16 = 2;
/// Upper bound on output channels; the per-block slice table lives on the stack.
pub const MAX_CHANNELS: u16 = 8;

/// Pulls fixed-size blocks from a [`SampleDriver`] and serves them to
/// rodio as interleaved samples.
///
/// Buffers are allocated once; each block is cleared before the driver
/// runs, so a silent or faulted module plays back as zeros.
pub struct DriverSource {
    driver: SampleDriver,
    channels: u16,
    planar: Vec<Vec<f32>>,
    interleaved: Vec<f32>,
    cursor: usize,
}

impl DriverSource {
    pub fn new(driver: SampleDriver, channels: u16, block_size: usize) -> Self {
        let channels = channels.clamp(1, MAX_CHANNELS);
        let block_size = block_size.max(1);
        Self {
            driver,
            channels,
            planar: vec![vec![0.0; block_size]; channels as usize],
            interleaved: vec![0.0; block_size * channels as usize],
            cursor: usize::MAX,
        }
    }

    pub fn block_size(&self) -> usize {
        self.planar.first().map(Vec::len).unwrap_or(0)
    }

    pub fn driver(&self) -> &SampleDriver {
        &self.driver
    }

    fn render_block(&mut self) {
        for channel in self.planar.iter_mut() {
            channel.fill(0.0);
        }

        let mut outputs: [&mut [f32]; MAX_CHANNELS as usize] = Default::default();
        let count = self.planar.len();
        for (slot, channel) in outputs.iter_mut().zip(self.planar.iter_mut()) {
            *slot = channel.as_mut_slice();
        }
        self.driver.process(&mut outputs[..count]);

        let channels = self.channels as usize;
        for (frame, chunk) in self.interleaved.chunks_exact_mut(channels).enumerate() {
            for (channel, out) in chunk.iter_mut().enumerate() {
                *out = self.planar[channel][frame];
            }
        }
        self.cursor = 0;
    }
}

impl Iterator for DriverSource {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.cursor >= self.interleaved.len() {
            self.render_block();
        }
        let sample = self.interleaved.get(self.cursor).copied();
        self.cursor += 1;
        sample
    }
}

impl Source for DriverSource {
    fn current_frame_len(&self) -> Option<usize> {
        Some(self.interleaved.len().saturating_sub(self.cursor).max(1))
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.driver.sample_rate()
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}

/// Default output device running a [`DriverSource`] until stopped.
pub struct AudioOutput {
    _stream: OutputStream,
    #[allow(dead_code)]
    handle: OutputStreamHandle,
    sink: Sink,
}

impl AudioOutput {
    pub fn start(driver: SampleDriver, channels: u16, block_size: usize) -> Result<Self> {
        let (stream, handle) =
            OutputStream::try_default().context("failed to access default audio output stream")?;
        let sink = Sink::try_new(&handle).context("failed to create audio sink")?;
        sink.append(DriverSource::new(driver, channels, block_size));
        sink.play();
        Ok(Self {
            _stream: stream,
            handle,
            sink,
        })
    }

    pub fn set_volume(&self, volume: f32) {
        self.sink.set_volume(volume.clamp(0.0, 1.0));
    }

    pub fn stop(&self) {
        self.sink.stop();
    }
}

#[cfg(test)]
#[path = "test_output.rs"]
mod tests;
