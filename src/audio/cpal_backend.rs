use crate::audio::{AudioBackend, AudioError, StreamInfo, StreamState};
use crate::synth::config::AudioConfig;
use crate::synth::mixer::ToneMixer;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleFormat, SampleRate, Stream, StreamConfig, SupportedBufferSize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Output backend over cpal. Holds the stream between `open` and `close`;
/// the mixer moves into the render callback and is never touched from the
/// control thread again.
pub struct CpalBackend {
    stream: Option<Stream>,
}

impl CpalBackend {
    pub fn new() -> Self {
        Self { stream: None }
    }

    fn resolve_device(
        host: &cpal::Host,
        device_index: Option<usize>,
    ) -> Result<cpal::Device, AudioError> {
        match device_index {
            Some(index) => host
                .output_devices()
                .map_err(|_| AudioError::DeviceUnavailable)?
                .nth(index)
                .ok_or(AudioError::DeviceUnavailable),
            None => host
                .default_output_device()
                .ok_or(AudioError::DeviceUnavailable),
        }
    }

    fn build_stream(
        &self,
        device: &cpal::Device,
        stream_config: &StreamConfig,
        mut mixer: ToneMixer,
        fault: Arc<AtomicBool>,
    ) -> Result<Stream, AudioError> {
        let channels = stream_config.channels as usize;

        device
            .build_output_stream(
                stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    // A panic must never cross into the host. Silence the
                    // buffer, latch the fault and keep the stream alive.
                    let rendered = catch_unwind(AssertUnwindSafe(|| {
                        mixer.render(data, channels);
                    }));
                    if rendered.is_err() {
                        data.fill(0.0);
                        fault.store(true, Ordering::Relaxed);
                    }
                },
                |err| log::error!("audio stream error: {}", err),
                None,
            )
            .map_err(|err| AudioError::StreamOpenFailed(err.to_string()))
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for CpalBackend {
    fn open(
        &mut self,
        config: &AudioConfig,
        mixer: ToneMixer,
        fault: Arc<AtomicBool>,
    ) -> Result<StreamInfo, AudioError> {
        let host = cpal::default_host();
        log::info!("cpal host: {}", host.id().name());

        let device = Self::resolve_device(&host, config.device_index)?;
        let device_name = device.name().unwrap_or_else(|_| String::from("(no name)"));
        log::info!("cpal device: {}", device_name);

        let default_config = device
            .default_output_config()
            .map_err(|err| AudioError::StreamOpenFailed(err.to_string()))?;
        if default_config.sample_format() != SampleFormat::F32 {
            return Err(AudioError::StreamOpenFailed(format!(
                "unsupported sample format {:?}",
                default_config.sample_format()
            )));
        }

        let stream_config = StreamConfig {
            channels: 2,
            sample_rate: SampleRate(config.sample_rate),
            buffer_size: negotiate_buffer_size(
                config.frames_per_buffer,
                default_config.buffer_size(),
            ),
        };
        log::info!("sample rate: {}", stream_config.sample_rate.0);
        log::info!("num channels: {}", stream_config.channels);
        log::info!("buffer size: {:?}", stream_config.buffer_size);

        let stream = self.build_stream(&device, &stream_config, mixer, fault)?;
        // Some hosts start a freshly built stream on their own; force it
        // quiet so no callback runs before start().
        stream
            .pause()
            .map_err(|err| AudioError::StreamOpenFailed(err.to_string()))?;
        self.stream = Some(stream);

        let buffer_frames = match stream_config.buffer_size {
            BufferSize::Fixed(frames) => Some(frames),
            BufferSize::Default => None,
        };

        Ok(StreamInfo {
            device_name,
            sample_rate: config.sample_rate,
            channels: stream_config.channels,
            buffer_frames,
        })
    }

    fn start(&mut self) -> Result<(), AudioError> {
        let stream = self.stream.as_ref().ok_or(AudioError::InvalidState {
            op: "start",
            state: StreamState::Closed,
        })?;

        stream.play().map_err(|err| match err {
            cpal::PlayStreamError::DeviceNotAvailable => AudioError::DeviceUnavailable,
            cpal::PlayStreamError::BackendSpecific { err } => {
                AudioError::StreamOpenFailed(err.to_string())
            }
        })
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        let stream = self.stream.as_ref().ok_or(AudioError::InvalidState {
            op: "stop",
            state: StreamState::Closed,
        })?;

        stream.pause().map_err(|err| match err {
            cpal::PauseStreamError::DeviceNotAvailable => AudioError::DeviceUnavailable,
            cpal::PauseStreamError::BackendSpecific { err } => {
                AudioError::StreamOpenFailed(err.to_string())
            }
        })
    }

    fn close(&mut self) -> Result<(), AudioError> {
        // Dropping the stream is what ends the callbacks.
        self.stream = None;
        Ok(())
    }
}

/// Clamp the requested frame count into the device's supported range.
/// alsa complains if the buffer size is not evenly divisible by 4, so the
/// request is rounded down before clamping.
fn negotiate_buffer_size(requested: u32, supported: &SupportedBufferSize) -> BufferSize {
    let requested = requested & !3;
    match supported {
        SupportedBufferSize::Range { min, max } => {
            BufferSize::Fixed(requested.clamp(*min, *max))
        }
        SupportedBufferSize::Unknown => BufferSize::Default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_size_within_range_is_kept() {
        let supported = SupportedBufferSize::Range { min: 16, max: 4096 };
        assert_eq!(negotiate_buffer_size(64, &supported), BufferSize::Fixed(64));
    }

    #[test]
    fn buffer_size_is_aligned_down() {
        let supported = SupportedBufferSize::Range { min: 16, max: 4096 };
        assert_eq!(negotiate_buffer_size(70, &supported), BufferSize::Fixed(68));
    }

    #[test]
    fn buffer_size_is_clamped_to_the_device_range() {
        let supported = SupportedBufferSize::Range { min: 128, max: 512 };
        assert_eq!(
            negotiate_buffer_size(64, &supported),
            BufferSize::Fixed(128)
        );
        assert_eq!(
            negotiate_buffer_size(8192, &supported),
            BufferSize::Fixed(512)
        );
    }

    #[test]
    fn unknown_range_defers_to_the_host() {
        assert_eq!(
            negotiate_buffer_size(64, &SupportedBufferSize::Unknown),
            BufferSize::Default
        );
    }
}
