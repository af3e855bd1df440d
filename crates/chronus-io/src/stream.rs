//! Output device enumeration via cpal.

use crate::Result;
use cpal::traits::{DeviceTrait, HostTrait};

/// Audio output device information.
#[derive(Debug, Clone)]
pub struct AudioDevice {
    /// Device name as reported by the platform.
    pub name: String,
    /// Preferred sample rate of the device's default output config.
    pub default_sample_rate: u32,
    /// Whether this is the system default output.
    pub is_default: bool,
}

/// Lists all output devices on the default host.
pub fn list_devices() -> Result<Vec<AudioDevice>> {
    let host = cpal::default_host();
    let default_name = host
        .default_output_device()
        .and_then(|d| d.name().ok());

    let mut devices = Vec::new();
    if let Ok(outputs) = host.output_devices() {
        for device in outputs {
            if let Ok(name) = device.name() {
                let sample_rate = device
                    .default_output_config()
                    .map(|c| c.sample_rate().0)
                    .unwrap_or(48000);
                devices.push(AudioDevice {
                    is_default: default_name.as_deref() == Some(name.as_str()),
                    name,
                    default_sample_rate: sample_rate,
                });
            }
        }
    }
    Ok(devices)
}

/// The system default output device, if any.
pub fn default_output_device() -> Result<Option<AudioDevice>> {
    let host = cpal::default_host();
    Ok(host.default_output_device().and_then(|d| {
        d.name().ok().map(|name| AudioDevice {
            name,
            default_sample_rate: d
                .default_output_config()
                .map(|c| c.sample_rate().0)
                .unwrap_or(48000),
            is_default: true,
        })
    }))
}
