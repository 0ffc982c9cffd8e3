//! # Audio Capture Module
//!
//! This module handles real-time audio capture using CPAL (Cross-Platform Audio Library).
//! [`MicrophoneSource`] implements [`CaptureSource`] for a physical input
//! device and turns whatever buffers the driver delivers into fixed-size
//! mono blocks.
//!
//! ## Features
//! - Default or named input device selection
//! - Mono configurations preferred; multi-channel input is downmixed
//! - f32, i16 and u16 sample formats
//! - Stream errors classified as fatal or transient

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample, SupportedStreamConfigRange};

use crate::error::TunerError;
use crate::source::{
    BlockAssembler, BlockCallback, CaptureSource, CaptureStream, FaultCallback, OpenedStream,
    StreamFault, StreamFormat, StreamInfo,
};

/// Captures from a microphone on the default cpal host.
#[derive(Debug, Clone, Default)]
pub struct MicrophoneSource;

impl MicrophoneSource {
    pub fn new() -> Self {
        Self
    }
}

/// Names of the input devices on the default host.
pub fn list_input_devices() -> Result<Vec<String>, TunerError> {
    let host = cpal::default_host();
    let mut names = Vec::new();
    for device in host.input_devices()? {
        names.push(device.name()?);
    }
    Ok(names)
}

impl CaptureSource for MicrophoneSource {
    /// Opens the input stream.
    ///
    /// 1. Selects the requested (or default) input device
    /// 2. Picks a configuration that supports the requested sample rate
    /// 3. Builds a stream whose callback assembles blocks and hands them on
    fn open(
        &self,
        format: &StreamFormat,
        on_block: BlockCallback,
        on_fault: FaultCallback,
    ) -> Result<OpenedStream, TunerError> {
        let host = cpal::default_host();
        let device = select_device(&host, format.device.as_deref())?;
        let device_name = device.name()?;
        log::info!("Using audio input device: {device_name}");

        let configs = device.supported_input_configs()?.collect::<Vec<_>>();
        let supported = find_supported_config(configs, format.sample_rate).ok_or_else(|| {
            TunerError::UnsupportedStreamConfig {
                sample_rate: format.sample_rate,
                reason: format!("{device_name} has no f32/i16/u16 input covering this rate"),
            }
        })?;

        let sample_format = supported.sample_format();
        let config: cpal::StreamConfig = supported
            .with_sample_rate(cpal::SampleRate(format.sample_rate))
            .into();
        log::info!(
            "Selected {} Hz, {} channel(s), {:?}",
            config.sample_rate.0,
            config.channels,
            sample_format
        );

        let stream = match sample_format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, format.block_size, on_block, on_fault)?,
            SampleFormat::I16 => build_stream::<i16>(&device, &config, format.block_size, on_block, on_fault)?,
            SampleFormat::U16 => build_stream::<u16>(&device, &config, format.block_size, on_block, on_fault)?,
            other => {
                return Err(TunerError::UnsupportedStreamConfig {
                    sample_rate: format.sample_rate,
                    reason: format!("sample format {other:?}"),
                });
            }
        };

        stream.play()?;

        Ok(OpenedStream {
            stream: Box::new(CpalStream(stream)),
            info: StreamInfo {
                device: device_name,
                sample_rate: config.sample_rate.0,
                channels: config.channels,
            },
        })
    }
}

struct CpalStream(cpal::Stream);

impl CaptureStream for CpalStream {
    fn pause(&self) -> Result<(), TunerError> {
        self.0.pause()?;
        Ok(())
    }
}

fn select_device(host: &cpal::Host, name: Option<&str>) -> Result<cpal::Device, TunerError> {
    match name {
        None => host.default_input_device().ok_or(TunerError::NoInputDevice),
        Some(wanted) => host
            .input_devices()?
            .find(|device| device.name().map(|n| n == wanted).unwrap_or(false))
            .ok_or_else(|| TunerError::DeviceNotFound {
                name: wanted.to_string(),
            }),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    block_size: usize,
    mut on_block: BlockCallback,
    mut on_fault: FaultCallback,
) -> Result<cpal::Stream, TunerError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    // This assembler accumulates audio data from the callback.
    let mut assembler = BlockAssembler::new(block_size, config.channels, config.sample_rate.0);

    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            assembler.push(data, |block| on_block(block));
        },
        move |err| on_fault(classify_stream_error(&err)),
        None,
    )?;
    Ok(stream)
}

fn classify_stream_error(err: &cpal::StreamError) -> StreamFault {
    match err {
        cpal::StreamError::DeviceNotAvailable => StreamFault::fatal(err.to_string()),
        _ => StreamFault::transient(err.to_string()),
    }
}

/// Finds the best supported audio configuration for the target sample rate.
///
/// Only ranges that contain `target_rate` and use a sample format we can
/// convert are considered. Among those, mono beats multi-channel, then f32
/// beats integer formats, then fewer channels win.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| c.min_sample_rate().0 <= target_rate && target_rate <= c.max_sample_rate().0)
        .filter_map(|c| format_rank(c.sample_format()).map(|rank| (c, rank)))
        .min_by_key(|(c, rank)| (c.channels() != 1, *rank, c.channels()))
        .map(|(c, _)| c)
}

fn format_rank(format: SampleFormat) -> Option<u8> {
    match format {
        SampleFormat::F32 => Some(0),
        SampleFormat::I16 => Some(1),
        SampleFormat::U16 => Some(2),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpal::{SampleRate, SupportedBufferSize};

    fn range(channels: u16, min: u32, max: u32, format: SampleFormat) -> SupportedStreamConfigRange {
        SupportedStreamConfigRange::new(
            channels,
            SampleRate(min),
            SampleRate(max),
            SupportedBufferSize::Unknown,
            format,
        )
    }

    #[test]
    fn prefers_mono_f32_covering_the_rate() {
        let configs = vec![
            range(2, 8_000, 96_000, SampleFormat::F32),
            range(1, 8_000, 96_000, SampleFormat::I16),
            range(1, 8_000, 96_000, SampleFormat::F32),
        ];
        let picked = find_supported_config(configs, 44_100).expect("config");
        assert_eq!(picked.channels(), 1);
        assert_eq!(picked.sample_format(), SampleFormat::F32);
    }

    #[test]
    fn falls_back_to_stereo_when_no_mono() {
        let configs = vec![
            range(4, 44_100, 44_100, SampleFormat::F32),
            range(2, 44_100, 48_000, SampleFormat::I16),
        ];
        let picked = find_supported_config(configs, 44_100).expect("config");
        assert_eq!(picked.channels(), 2);
    }

    #[test]
    fn rejects_ranges_missing_the_rate() {
        let configs = vec![
            range(1, 48_000, 48_000, SampleFormat::F32),
            range(1, 8_000, 96_000, SampleFormat::F64),
        ];
        assert!(find_supported_config(configs, 44_100).is_none());
    }

    #[test]
    fn device_loss_is_fatal() {
        assert!(classify_stream_error(&cpal::StreamError::DeviceNotAvailable).is_fatal());
    }
}
