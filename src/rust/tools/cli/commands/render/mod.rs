use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use hound::{SampleFormat, WavSpec, WavWriter};

use crate::engine::audio::SampleDriver;
use crate::engine::processor::{InstallOutcome, Processor};
use crate::engine::runtime::CompiledModule;
use crate::tools::cli::commands::compile::compile_file;
use crate::tools::cli::state::CliContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BitDepth {
    #[value(name = "16")]
    Bit16,
    #[value(name = "32")]
    Bit32,
}

#[derive(Debug, Clone, Args)]
pub struct RenderCommand {
    /// Prebuilt module to render
    #[arg(long, conflicts_with = "input")]
    pub module: Option<PathBuf>,

    /// Source file to compile and render (defaults to the configured entry)
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// Number of host buffers to render
    #[arg(long, default_value_t = 345)]
    pub buffers: usize,

    /// Output WAV file
    #[arg(long, default_value = "render.wav")]
    pub out: PathBuf,

    #[arg(long = "bit-depth", value_enum, default_value = "32")]
    pub bit_depth: BitDepth,
}

impl RenderCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let logger = ctx.logger();
        let (cwd, config) = ctx.project()?;

        let bytes = match &self.module {
            Some(path) => {
                fs::read(path).with_context(|| format!("failed to read {}", path.display()))?
            }
            None => {
                let input = self.input.clone().unwrap_or_else(|| config.entry_path(&cwd));
                compile_file(&logger, &config, &input).await?
            }
        };
        let module = CompiledModule::from_bytes(bytes)?;

        let Processor {
            mut port,
            mut driver,
            service,
        } = Processor::new(config.sample_rate())?;
        let installer = service.installer();
        let outcome = installer
            .install(module, installer.next_generation())
            .await;
        for event in port.events_mut().drain() {
            logger.log_event(&event);
        }
        if let InstallOutcome::Failed(err) = outcome {
            anyhow::bail!("module failed to start: {err}");
        }

        let channels = config.channels();
        let pcm = render_interleaved(
            &mut driver,
            channels as usize,
            config.buffer_size(),
            self.buffers,
        );
        for event in port.events_mut().drain() {
            logger.log_event(&event);
        }

        write_wav(&self.out, &pcm, config.sample_rate(), channels, self.bit_depth)?;
        logger.success(format!(
            "Rendered {} frames to {}",
            pcm.len() / channels.max(1) as usize,
            self.out.display()
        ));
        Ok(())
    }
}

/// Drives the sample driver offline, one zeroed block per host buffer.
pub(crate) fn render_interleaved(
    driver: &mut SampleDriver,
    channels: usize,
    block_size: usize,
    buffers: usize,
) -> Vec<f32> {
    let channels = channels.max(1);
    let block_size = block_size.max(1);
    let mut planar = vec![vec![0.0f32; block_size]; channels];
    let mut pcm = Vec::with_capacity(channels * block_size * buffers);

    for _ in 0..buffers {
        for channel in planar.iter_mut() {
            channel.fill(0.0);
        }
        let mut outputs: Vec<&mut [f32]> = planar.iter_mut().map(Vec::as_mut_slice).collect();
        driver.process(&mut outputs);
        for frame in 0..block_size {
            for channel in &planar {
                pcm.push(channel[frame]);
            }
        }
    }
    pcm
}

fn write_wav(
    path: &Path,
    pcm: &[f32],
    sample_rate: u32,
    channels: u16,
    bit_depth: BitDepth,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }

    let (bits_per_sample, sample_format) = match bit_depth {
        BitDepth::Bit16 => (16, SampleFormat::Int),
        BitDepth::Bit32 => (32, SampleFormat::Float),
    };
    let spec = WavSpec {
        channels: channels.max(1),
        sample_rate,
        bits_per_sample,
        sample_format,
    };

    let mut writer = WavWriter::create(path, spec)
        .with_context(|| format!("failed to open WAV writer for {}", path.display()))?;
    for sample in pcm {
        let clamped = sample.clamp(-1.0, 1.0);
        let written = match bit_depth {
            BitDepth::Bit16 => writer.write_sample((clamped * i16::MAX as f32).round() as i16),
            BitDepth::Bit32 => writer.write_sample(clamped),
        };
        written.with_context(|| format!("unable to write audio sample to {}", path.display()))?;
    }
    writer
        .finalize()
        .with_context(|| format!("failed to finalize {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
#[path = "test_render.rs"]
mod tests;
