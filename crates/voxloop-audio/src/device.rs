use cpal::traits::{DeviceTrait, HostTrait};
use cpal::Device;
use voxloop_core::AudioError;

/// Resolve an input device by name; "default" selects the host default.
pub fn input_device(name: &str) -> Result<Device, AudioError> {
    let host = cpal::default_host();
    if name == "default" {
        return host
            .default_input_device()
            .ok_or_else(|| AudioError::DeviceNotFound("no default input device".to_string()));
    }

    let devices = host
        .input_devices()
        .map_err(|e| AudioError::DeviceEnumeration(e.to_string()))?;
    for device in devices {
        if device.name().map(|n| n == name).unwrap_or(false) {
            return Ok(device);
        }
    }
    Err(AudioError::DeviceNotFound(format!(
        "input device not found: {}",
        name
    )))
}

/// Resolve an output device by name; "default" selects the host default.
pub fn output_device(name: &str) -> Result<Device, AudioError> {
    let host = cpal::default_host();
    if name == "default" {
        return host
            .default_output_device()
            .ok_or_else(|| AudioError::DeviceNotFound("no default output device".to_string()));
    }

    let devices = host
        .output_devices()
        .map_err(|e| AudioError::DeviceEnumeration(e.to_string()))?;
    for device in devices {
        if device.name().map(|n| n == name).unwrap_or(false) {
            return Ok(device);
        }
    }
    Err(AudioError::DeviceNotFound(format!(
        "output device not found: {}",
        name
    )))
}

/// Names of every input and output device the host reports.
pub fn device_names() -> Result<(Vec<String>, Vec<String>), AudioError> {
    let host = cpal::default_host();

    let inputs = host
        .input_devices()
        .map_err(|e| AudioError::DeviceEnumeration(e.to_string()))?
        .map(|d| d.name().unwrap_or_else(|_| "unknown".to_string()))
        .collect();
    let outputs = host
        .output_devices()
        .map_err(|e| AudioError::DeviceEnumeration(e.to_string()))?
        .map(|d| d.name().unwrap_or_else(|_| "unknown".to_string()))
        .collect();

    Ok((inputs, outputs))
}
