//! Real microphone capture using CPAL (Cross-Platform Audio Library).

use crate::defaults;
use crate::error::{Result, VivaprepError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

/// Trait for microphone capture devices.
///
/// This trait allows swapping implementations (real audio device vs mock).
/// `stop()` must be a safe no-op when no capture is in progress, so every
/// exit path from a recording can release the hardware without bookkeeping.
pub trait MicrophoneSource: Send {
    /// Start capturing audio from the microphone.
    ///
    /// # Errors
    /// Returns `PermissionDenied` when microphone access is refused or the
    /// device is unavailable, other capture errors otherwise.
    fn start(&mut self) -> Result<()>;

    /// Stop capturing and release the underlying stream.
    ///
    /// Idempotent: stopping an idle source is a no-op.
    fn stop(&mut self) -> Result<()>;

    /// Drain the samples accumulated since the last call.
    ///
    /// # Returns
    /// 16-bit PCM mono samples at [`defaults::SAMPLE_RATE`].
    fn take_samples(&mut self) -> Result<Vec<i16>>;

    /// Whether a capture stream is currently held.
    fn is_capturing(&self) -> bool;
}

/// Run a closure with stderr temporarily redirected to /dev/null.
///
/// This suppresses noisy ALSA/JACK/PipeWire messages that CPAL triggers
/// when probing audio backends. The messages are harmless but confusing to users.
///
/// # Safety
/// Uses `libc::dup`/`libc::dup2` to save and restore file descriptor 2 (stderr).
/// Safe as long as no other thread is concurrently manipulating fd 2.
fn with_suppressed_stderr<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    unsafe {
        let saved_fd = libc::dup(2);
        let devnull = libc::open(c"/dev/null".as_ptr(), libc::O_WRONLY);
        if saved_fd >= 0 && devnull >= 0 {
            libc::dup2(devnull, 2);
            libc::close(devnull);
        }

        let result = f();

        if saved_fd >= 0 {
            libc::dup2(saved_fd, 2);
            libc::close(saved_fd);
        }

        result
    }
}

/// Preferred device names for GNOME/PipeWire environments.
const PREFERRED_DEVICES: &[&str] = &["pipewire", "pulse", "PulseAudio"];

/// Device name patterns to filter out (not useful for voice input).
const FILTERED_PATTERNS: &[&str] = &[
    "surround",
    "front:",
    "rear:",
    "center:",
    "side:",
    "Digital Output",
    "HDMI",
    "S/PDIF",
];

/// Check if a device name should be filtered out.
fn should_filter_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    FILTERED_PATTERNS
        .iter()
        .any(|pattern| lower.contains(&pattern.to_lowercase()))
}

/// Check if a device is a preferred device.
fn is_preferred_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    PREFERRED_DEVICES
        .iter()
        .any(|pref| lower.contains(&pref.to_lowercase()))
}

/// List all available audio input devices with filtering and recommendations.
///
/// # Returns
/// A vector of device names, with preferred devices marked with "\[recommended\]".
/// Filters out obviously unusable devices (surround channels, HDMI, etc.).
///
/// # Errors
/// Returns `VivaprepError::AudioCapture` if device enumeration fails.
pub fn list_devices() -> Result<Vec<String>> {
    let devices = with_suppressed_stderr(|| cpal::default_host().input_devices()).map_err(|e| {
        VivaprepError::AudioCapture {
            message: format!("Failed to enumerate input devices: {}", e),
        }
    })?;

    let mut device_names = Vec::new();
    for device in devices {
        if let Ok(name) = device.name() {
            if should_filter_device(&name) {
                continue;
            }

            if is_preferred_device(&name) {
                device_names.push(format!("{} [recommended]", name));
            } else {
                device_names.push(name);
            }
        }
    }

    Ok(device_names)
}

/// Get the best default input device, preferring PipeWire/PulseAudio.
fn get_best_default_device() -> Result<cpal::Device> {
    let host = cpal::default_host();

    if let Ok(devices) = host.input_devices() {
        for device in devices {
            if let Ok(name) = device.name()
                && is_preferred_device(&name)
            {
                return Ok(device);
            }
        }
    }

    host.default_input_device()
        .ok_or_else(|| VivaprepError::PermissionDenied {
            message: "no input device available — check that a microphone is \
                      connected and accessible"
                .to_string(),
        })
}

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: We ensure that the stream is only accessed from a single thread at
/// a time through the Mutex wrapper in CpalMicrophone. The stream methods are
/// called synchronously and don't cross thread boundaries unsafely.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// Real microphone capture implementation using CPAL.
///
/// Captures 16-bit PCM at 16kHz mono. Tries the preferred format first
/// (i16/16kHz/mono), then falls back to f32 with conversion for devices that
/// only expose float formats.
pub struct CpalMicrophone {
    device: cpal::Device,
    stream: Arc<Mutex<Option<SendableStream>>>,
    buffer: Arc<Mutex<Vec<i16>>>,
    sample_rate: u32,
}

impl CpalMicrophone {
    /// Create a new CPAL microphone.
    ///
    /// # Arguments
    /// * `device_name` - Optional device name. If None, uses the best default
    ///   input device (prefers PipeWire/PulseAudio).
    ///
    /// # Errors
    /// Returns `PermissionDenied` when no input device is available, or
    /// `AudioDeviceNotFound` when a named device does not exist.
    pub fn new(device_name: Option<&str>) -> Result<Self> {
        let device = with_suppressed_stderr(|| {
            let host = cpal::default_host();

            if let Some(name) = device_name {
                let devices = host
                    .input_devices()
                    .map_err(|e| VivaprepError::AudioCapture {
                        message: format!("Failed to enumerate devices: {}", e),
                    })?;

                let mut found_device = None;
                for dev in devices {
                    if let Ok(dev_name) = dev.name()
                        && dev_name == name
                    {
                        found_device = Some(dev);
                        break;
                    }
                }

                found_device.ok_or_else(|| VivaprepError::AudioDeviceNotFound {
                    device: name.to_string(),
                })
            } else {
                get_best_default_device()
            }
        })?;

        Ok(Self {
            device,
            stream: Arc::new(Mutex::new(None)),
            buffer: Arc::new(Mutex::new(Vec::new())),
            sample_rate: defaults::SAMPLE_RATE,
        })
    }

    /// Build the audio stream with the configured format.
    ///
    /// Tries i16/16kHz/mono first (PipeWire/PulseAudio convert transparently),
    /// then f32/16kHz/mono for devices that only expose float formats.
    fn build_stream(&self) -> Result<cpal::Stream> {
        let config = cpal::StreamConfig {
            channels: 1,
            sample_rate: self.sample_rate,
            buffer_size: cpal::BufferSize::Default,
        };

        let err_callback = |err| {
            tracing::warn!(error = %err, "audio stream error");
        };

        let buffer = Arc::clone(&self.buffer);
        if let Ok(stream) = self.device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                if let Ok(mut buf) = buffer.lock() {
                    buf.extend_from_slice(data);
                }
            },
            err_callback,
            None,
        ) {
            return Ok(stream);
        }

        let buffer = Arc::clone(&self.buffer);
        self.device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut buf) = buffer.lock() {
                        buf.extend(
                            data.iter()
                                .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16),
                        );
                    }
                },
                err_callback,
                None,
            )
            .map_err(|e| VivaprepError::PermissionDenied {
                message: format!(
                    "failed to open the microphone: {}. Check permissions and \
                     that the device is not in use",
                    e
                ),
            })
    }
}

impl MicrophoneSource for CpalMicrophone {
    fn start(&mut self) -> Result<()> {
        {
            let stream_guard = self.stream.lock().map_err(|e| VivaprepError::AudioCapture {
                message: format!("Failed to lock stream: {}", e),
            })?;
            if stream_guard.is_some() {
                return Ok(()); // Already capturing
            }
        }

        // Drop samples left over from a previous capture
        if let Ok(mut buf) = self.buffer.lock() {
            buf.clear();
        }

        let stream = self.build_stream()?;
        stream.play().map_err(|e| VivaprepError::PermissionDenied {
            message: format!("failed to start the audio stream: {}", e),
        })?;

        let mut stream_guard = self.stream.lock().map_err(|e| VivaprepError::AudioCapture {
            message: format!("Failed to lock stream: {}", e),
        })?;
        *stream_guard = Some(SendableStream(stream));
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let mut stream_guard = self.stream.lock().map_err(|e| VivaprepError::AudioCapture {
            message: format!("Failed to lock stream: {}", e),
        })?;

        // Dropping the stream releases the hardware handle; pause first so
        // the callback stops feeding the buffer.
        if let Some(sendable_stream) = stream_guard.take() {
            sendable_stream
                .0
                .pause()
                .map_err(|e| VivaprepError::AudioCapture {
                    message: format!("Failed to stop audio stream: {}", e),
                })?;
        }
        Ok(())
    }

    fn take_samples(&mut self) -> Result<Vec<i16>> {
        let mut buffer = self.buffer.lock().map_err(|e| VivaprepError::AudioCapture {
            message: format!("Failed to lock audio buffer: {}", e),
        })?;

        Ok(std::mem::take(&mut *buffer))
    }

    fn is_capturing(&self) -> bool {
        self.stream.lock().map(|g| g.is_some()).unwrap_or(false)
    }
}

/// Observation handle into a [`MockMicrophone`], usable after the mock has
/// been moved into a recorder.
#[derive(Debug, Clone)]
pub struct MicProbe {
    capturing: Arc<AtomicBool>,
    start_calls: Arc<AtomicU32>,
    stop_calls: Arc<AtomicU32>,
}

impl MicProbe {
    /// Whether the mock currently holds a capture stream.
    pub fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    /// Number of successful `start()` calls.
    pub fn start_calls(&self) -> u32 {
        self.start_calls.load(Ordering::SeqCst)
    }

    /// Number of `stop()` calls that actually released a stream.
    pub fn stop_calls(&self) -> u32 {
        self.stop_calls.load(Ordering::SeqCst)
    }
}

/// Mock microphone for testing.
#[derive(Debug, Clone)]
pub struct MockMicrophone {
    samples: Vec<i16>,
    deny_permission: bool,
    should_fail_stop: bool,
    should_fail_read: bool,
    error_message: String,
    capturing: Arc<AtomicBool>,
    start_calls: Arc<AtomicU32>,
    stop_calls: Arc<AtomicU32>,
}

impl MockMicrophone {
    /// Create a new mock microphone with default settings.
    pub fn new() -> Self {
        Self {
            samples: vec![0i16; 160],
            deny_permission: false,
            should_fail_stop: false,
            should_fail_read: false,
            error_message: "mock microphone error".to_string(),
            capturing: Arc::new(AtomicBool::new(false)),
            start_calls: Arc::new(AtomicU32::new(0)),
            stop_calls: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Configure the mock to return specific samples.
    pub fn with_samples(mut self, samples: Vec<i16>) -> Self {
        self.samples = samples;
        self
    }

    /// Configure the mock to refuse microphone access on start.
    pub fn with_permission_denied(mut self) -> Self {
        self.deny_permission = true;
        self
    }

    /// Configure the mock to fail on stop.
    pub fn with_stop_failure(mut self) -> Self {
        self.should_fail_stop = true;
        self
    }

    /// Configure the mock to fail on read.
    pub fn with_read_failure(mut self) -> Self {
        self.should_fail_read = true;
        self
    }

    /// Configure the error message for failures.
    pub fn with_error_message(mut self, message: &str) -> Self {
        self.error_message = message.to_string();
        self
    }

    /// Observation handle that stays valid after the mock is moved.
    pub fn probe(&self) -> MicProbe {
        MicProbe {
            capturing: Arc::clone(&self.capturing),
            start_calls: Arc::clone(&self.start_calls),
            stop_calls: Arc::clone(&self.stop_calls),
        }
    }
}

impl Default for MockMicrophone {
    fn default() -> Self {
        Self::new()
    }
}

impl MicrophoneSource for MockMicrophone {
    fn start(&mut self) -> Result<()> {
        if self.deny_permission {
            return Err(VivaprepError::PermissionDenied {
                message: self.error_message.clone(),
            });
        }
        self.capturing.store(true, Ordering::SeqCst);
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if !self.capturing.load(Ordering::SeqCst) {
            return Ok(()); // idempotent release
        }
        if self.should_fail_stop {
            return Err(VivaprepError::AudioCapture {
                message: self.error_message.clone(),
            });
        }
        self.capturing.store(false, Ordering::SeqCst);
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn take_samples(&mut self) -> Result<Vec<i16>> {
        if self.should_fail_read {
            Err(VivaprepError::AudioCapture {
                message: self.error_message.clone(),
            })
        } else {
            Ok(self.samples.clone())
        }
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_filter_device() {
        assert!(should_filter_device("surround51"));
        assert!(should_filter_device("front:CARD=PCH"));
        assert!(should_filter_device("HDMI Output"));
        assert!(should_filter_device("Digital Output S/PDIF"));
        assert!(!should_filter_device("pipewire"));
        assert!(!should_filter_device("PulseAudio"));
        assert!(!should_filter_device("Built-in Audio"));
    }

    #[test]
    fn test_is_preferred_device() {
        assert!(is_preferred_device("pipewire"));
        assert!(is_preferred_device("pulse"));
        assert!(is_preferred_device("PulseAudio Sound Server"));
        assert!(!is_preferred_device("hw:CARD=PCH,DEV=0"));
    }

    #[test]
    fn test_mock_permission_denied_stays_idle() {
        let mut mic = MockMicrophone::new()
            .with_permission_denied()
            .with_error_message("access refused");
        let probe = mic.probe();

        let result = mic.start();

        match result {
            Err(VivaprepError::PermissionDenied { message }) => {
                assert_eq!(message, "access refused");
            }
            other => panic!("Expected PermissionDenied, got {:?}", other),
        }
        assert!(!probe.is_capturing());
        assert_eq!(probe.start_calls(), 0);
    }

    #[test]
    fn test_mock_stop_is_idempotent() {
        let mut mic = MockMicrophone::new();
        let probe = mic.probe();

        mic.start().unwrap();
        mic.stop().unwrap();
        mic.stop().unwrap();
        mic.stop().unwrap();

        // The stream was released exactly once for one acquisition
        assert_eq!(probe.start_calls(), 1);
        assert_eq!(probe.stop_calls(), 1);
    }

    #[test]
    fn test_mock_returns_configured_samples() {
        let test_samples = vec![100i16, 200, 300, 400, 500];
        let mut mic = MockMicrophone::new().with_samples(test_samples.clone());

        let result = mic.take_samples();

        assert!(result.is_ok());
        assert_eq!(result.unwrap(), test_samples);
    }

    #[test]
    fn test_mock_read_failure() {
        let mut mic = MockMicrophone::new().with_read_failure();

        let result = mic.take_samples();

        assert!(result.is_err());
        match result {
            Err(VivaprepError::AudioCapture { message }) => {
                assert_eq!(message, "mock microphone error");
            }
            _ => panic!("Expected AudioCapture error"),
        }
    }

    #[test]
    fn test_mock_trait_is_object_safe() {
        let source: Box<dyn MicrophoneSource> =
            Box::new(MockMicrophone::new().with_samples(vec![1i16, 2, 3]));

        let mut boxed = source;
        assert!(boxed.start().is_ok());
        assert!(boxed.is_capturing());
        assert_eq!(boxed.take_samples().unwrap(), vec![1i16, 2, 3]);
        assert!(boxed.stop().is_ok());
        assert!(!boxed.is_capturing());
    }
}
