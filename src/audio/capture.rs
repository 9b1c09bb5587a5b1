//! Time-bounded recording from a local input device.
//!
//! Capture is blocking by nature, so [`capture_clip`] runs it on the blocking
//! pool and enforces the timeout from the async side. The blocking
//! implementation is expected to poll its cancellation token and stop early.

use super::{Waveform, TARGET_SAMPLE_RATE};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("No audio input device available: {0}")]
    DeviceUnavailable(String),
    #[error("Recording did not finish within {0:?}")]
    TimedOut(Duration),
    #[error("Recording was cancelled")]
    Cancelled,
    #[error("Audio stream error: {0}")]
    Stream(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureRequest {
    pub duration: Duration,
    pub sample_rate: u32,
    /// Hard limit for the whole acquisition, device setup included.
    pub timeout: Duration,
}

impl CaptureRequest {
    pub fn new(duration: Duration, grace: Duration) -> Self {
        CaptureRequest {
            duration,
            sample_rate: TARGET_SAMPLE_RATE,
            timeout: duration + grace,
        }
    }

    pub fn frames(&self) -> usize {
        (self.duration.as_secs_f64() * self.sample_rate as f64).round() as usize
    }
}

pub trait AudioCapture: Send + Sync {
    /// Records `request.duration` of mono audio at `request.sample_rate`.
    /// Called on a blocking thread.
    fn capture_blocking(
        &self,
        request: &CaptureRequest,
        cancel: &CancellationToken,
    ) -> Result<Waveform, CaptureError>;
}

/// Runs a capture with the request's timeout. The blocking side is
/// cancelled when the timeout elapses or when the returned future is dropped.
pub async fn capture_clip(
    capture: Arc<dyn AudioCapture>,
    request: CaptureRequest,
) -> Result<Waveform, CaptureError> {
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();

    let worker_cancel = cancel.clone();
    let handle =
        tokio::task::spawn_blocking(move || capture.capture_blocking(&request, &worker_cancel));

    let result = match tokio::time::timeout(request.timeout, handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => Err(CaptureError::Stream(join_error.to_string())),
        Err(_) => {
            warn!("Audio capture exceeded {:?}, cancelling", request.timeout);
            return Err(CaptureError::TimedOut(request.timeout));
        }
    };
    guard.disarm();

    let waveform = result?;
    if waveform.sample_rate() != request.sample_rate {
        return Err(CaptureError::Stream(format!(
            "device delivered {} Hz, expected {} Hz",
            waveform.sample_rate(),
            request.sample_rate
        )));
    }
    if waveform.is_empty() {
        return Err(CaptureError::Stream("no samples recorded".to_string()));
    }
    debug!("Captured {:?} of audio", waveform.duration());
    Ok(waveform)
}

/// Used when the server is built without microphone support.
pub struct UnavailableCapture;

impl AudioCapture for UnavailableCapture {
    fn capture_blocking(
        &self,
        _request: &CaptureRequest,
        _cancel: &CancellationToken,
    ) -> Result<Waveform, CaptureError> {
        Err(CaptureError::DeviceUnavailable(
            "microphone support is not compiled in".to_string(),
        ))
    }
}

#[cfg(feature = "microphone")]
pub use device::CpalCapture;

#[cfg(feature = "microphone")]
mod device {
    use super::{AudioCapture, CaptureError, CaptureRequest};
    use crate::audio::Waveform;
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::SampleFormat;
    use rubato::{FastFixedIn, PolynomialDegree, Resampler};
    use std::sync::mpsc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;
    use tracing::{info, warn};

    const RESAMPLE_CHUNK: usize = 1024;

    /// Default input device of the default host.
    pub struct CpalCapture;

    fn downmix<T: Copy>(data: &[T], channels: usize, to_f32: impl Fn(T) -> f32) -> Vec<f32> {
        data.chunks(channels.max(1))
            .map(|frame| frame.iter().map(|s| to_f32(*s)).sum::<f32>() / frame.len() as f32)
            .collect()
    }

    fn resample(samples: Vec<f32>, from: u32, to: u32) -> Result<Vec<f32>, CaptureError> {
        if from == to {
            return Ok(samples);
        }
        let stream_error = |e: &dyn std::fmt::Display| CaptureError::Stream(e.to_string());
        let mut resampler = FastFixedIn::<f32>::new(
            to as f64 / from as f64,
            1.0,
            PolynomialDegree::Septic,
            RESAMPLE_CHUNK,
            1,
        )
        .map_err(|e| stream_error(&e))?;

        let mut out = Vec::with_capacity(samples.len() * to as usize / from as usize + 1);
        let mut chunks = samples.chunks_exact(RESAMPLE_CHUNK);
        for chunk in &mut chunks {
            let frames = resampler
                .process(&[chunk], None)
                .map_err(|e| stream_error(&e))?;
            out.extend_from_slice(&frames[0]);
        }
        let remainder = chunks.remainder();
        if !remainder.is_empty() {
            let frames = resampler
                .process_partial(Some(&[remainder]), None)
                .map_err(|e| stream_error(&e))?;
            out.extend_from_slice(&frames[0]);
        }
        Ok(out)
    }

    impl AudioCapture for CpalCapture {
        fn capture_blocking(
            &self,
            request: &CaptureRequest,
            cancel: &CancellationToken,
        ) -> Result<Waveform, CaptureError> {
            let host = cpal::default_host();
            let device = host.default_input_device().ok_or_else(|| {
                CaptureError::DeviceUnavailable("no default input device".to_string())
            })?;
            let supported = device
                .default_input_config()
                .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;
            let channels = supported.channels() as usize;
            let device_rate = supported.sample_rate().0;
            let config = supported.config();
            info!(
                "Recording {:?} from {:?} ({} ch @ {} Hz)",
                request.duration,
                device.name().unwrap_or_default(),
                channels,
                device_rate
            );

            let (tx, rx) = mpsc::channel::<Vec<f32>>();
            let on_error = |e: cpal::StreamError| warn!("Input stream error: {}", e);
            let stream = match supported.sample_format() {
                SampleFormat::F32 => device.build_input_stream(
                    &config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        let _ = tx.send(downmix(data, channels, |s| s));
                    },
                    on_error,
                    None,
                ),
                SampleFormat::I16 => device.build_input_stream(
                    &config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        let _ = tx.send(downmix(data, channels, |s| s as f32 / 32_768.0));
                    },
                    on_error,
                    None,
                ),
                other => {
                    return Err(CaptureError::Stream(format!(
                        "unsupported sample format {:?}",
                        other
                    )))
                }
            }
            .map_err(|e| CaptureError::Stream(e.to_string()))?;
            stream
                .play()
                .map_err(|e| CaptureError::Stream(e.to_string()))?;

            let needed =
                (request.duration.as_secs_f64() * device_rate as f64).round() as usize;
            let mut recorded = Vec::with_capacity(needed);
            while recorded.len() < needed {
                if cancel.is_cancelled() {
                    return Err(CaptureError::Cancelled);
                }
                match rx.recv_timeout(Duration::from_millis(50)) {
                    Ok(block) => recorded.extend(block),
                    Err(mpsc::RecvTimeoutError::Timeout) => continue,
                    Err(mpsc::RecvTimeoutError::Disconnected) => {
                        return Err(CaptureError::Stream("input stream closed".to_string()))
                    }
                }
            }
            drop(stream);
            recorded.truncate(needed);

            let mut samples = resample(recorded, device_rate, request.sample_rate)?;
            samples.truncate(request.frames());
            Ok(Waveform::new(samples, request.sample_rate))
        }
    }

}
