//! Time-dependent scalar functions feeding prescribed values to elements.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::stream::{StreamDriveSet, StreamValues};

/// Duration of periodic drives.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cycles {
    Forever,
    /// Number of half periods after which the value is held
    HalfCycles(u32),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DriveConfig {
    Const {
        value: f64,
    },
    /// constant + slope * t
    Linear {
        constant: f64,
        slope: f64,
    },
    Ramp {
        slope: f64,
        initial_time: f64,
        final_time: f64,
        initial_value: f64,
    },
    Sine {
        initial_time: f64,
        omega: f64,
        amplitude: f64,
        cycles: Cycles,
        initial_value: f64,
    },
    /// initial_value + amplitude * (1 - cos(omega * (t - initial_time)))
    Cosine {
        initial_time: f64,
        omega: f64,
        amplitude: f64,
        cycles: Cycles,
        initial_value: f64,
    },
    Step {
        initial_time: f64,
        step_value: f64,
        initial_value: f64,
    },
    /// Channel of a stream drive, 1-based
    File {
        drive: u32,
        index: usize,
    },
}

impl DriveConfig {
    /// Restart syntax.
    pub fn restart(&self) -> String {
        fn cycles(c: &Cycles) -> String {
            match c {
                Cycles::Forever => "forever".to_string(),
                Cycles::HalfCycles(n) => n.to_string(),
            }
        }
        match self {
            DriveConfig::Const { value } => format!("const, {:?}", value),
            DriveConfig::Linear { constant, slope } => {
                format!("linear, {:?}, {:?}", constant, slope)
            }
            DriveConfig::Ramp {
                slope,
                initial_time,
                final_time,
                initial_value,
            } => format!(
                "ramp, {:?}, {:?}, {:?}, {:?}",
                slope, initial_time, final_time, initial_value
            ),
            DriveConfig::Sine {
                initial_time,
                omega,
                amplitude,
                cycles: c,
                initial_value,
            } => format!(
                "sine, {:?}, {:?}, {:?}, {}, {:?}",
                initial_time,
                omega,
                amplitude,
                cycles(c),
                initial_value
            ),
            DriveConfig::Cosine {
                initial_time,
                omega,
                amplitude,
                cycles: c,
                initial_value,
            } => format!(
                "cosine, {:?}, {:?}, {:?}, {}, {:?}",
                initial_time,
                omega,
                amplitude,
                cycles(c),
                initial_value
            ),
            DriveConfig::Step {
                initial_time,
                step_value,
                initial_value,
            } => format!(
                "step, {:?}, {:?}, {:?}",
                initial_time, step_value, initial_value
            ),
            DriveConfig::File { drive, index } => format!("file, {}, {}", drive, index),
        }
    }
}

/// A drive bound to its data source.
///
/// Evaluation is deterministic for closed-form drives. File drives return the
/// last value received by their stream drive.
#[derive(Debug, Clone)]
pub struct DriveCaller {
    config: DriveConfig,
    stream: Option<StreamValues>,
}

impl DriveCaller {
    pub fn build(config: &DriveConfig, streams: &StreamDriveSet) -> ConfigResult<Self> {
        let stream = match *config {
            DriveConfig::File { drive, index } => {
                let values = streams
                    .values(drive)
                    .ok_or(ConfigError::UnknownStreamDrive { label: drive })?;
                if index == 0 || index > values.len() {
                    return Err(ConfigError::StreamChannelOutOfRange {
                        label: drive,
                        index,
                        channels: values.len(),
                    });
                }
                Some(values)
            }
            _ => None,
        };
        Ok(DriveCaller {
            config: config.clone(),
            stream,
        })
    }

    pub fn constant(value: f64) -> Self {
        DriveCaller {
            config: DriveConfig::Const { value },
            stream: None,
        }
    }

    pub fn config(&self) -> &DriveConfig {
        &self.config
    }

    pub fn value(&self, t: f64) -> f64 {
        match self.config {
            DriveConfig::Const { value } => value,
            DriveConfig::Linear { constant, slope } => constant + slope * t,
            DriveConfig::Ramp {
                slope,
                initial_time,
                final_time,
                initial_value,
            } => {
                let dt = t.clamp(initial_time, final_time.max(initial_time)) - initial_time;
                initial_value + slope * dt
            }
            DriveConfig::Sine {
                initial_time,
                omega,
                amplitude,
                cycles,
                initial_value,
            } => {
                let arg = periodic_argument(t, initial_time, omega, cycles);
                initial_value + amplitude * arg.sin()
            }
            DriveConfig::Cosine {
                initial_time,
                omega,
                amplitude,
                cycles,
                initial_value,
            } => {
                let arg = periodic_argument(t, initial_time, omega, cycles);
                initial_value + amplitude * (1. - arg.cos())
            }
            DriveConfig::Step {
                initial_time,
                step_value,
                initial_value,
            } => {
                if t < initial_time {
                    initial_value
                } else {
                    step_value
                }
            }
            DriveConfig::File { index, .. } => match &self.stream {
                Some(values) => values.get(index - 1),
                None => 0.,
            },
        }
    }

    pub fn restart(&self) -> String {
        self.config.restart()
    }
}

/// Phase of a periodic drive, held once the requested half cycles are done.
fn periodic_argument(t: f64, t0: f64, omega: f64, cycles: Cycles) -> f64 {
    if t <= t0 {
        return 0.;
    }
    let arg = omega * (t - t0);
    match cycles {
        Cycles::Forever => arg,
        Cycles::HalfCycles(n) => arg.min(n as f64 * PI),
    }
}

//------------------------------------------------------------------------------
// Testing
//------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    fn build(config: DriveConfig) -> DriveCaller {
        DriveCaller::build(&config, &StreamDriveSet::new()).unwrap()
    }

    #[test]
    fn test_ramp() {
        let d = build(DriveConfig::Ramp {
            slope: 2.,
            initial_time: 1.,
            final_time: 3.,
            initial_value: 0.5,
        });
        assert_relative_eq!(d.value(0.), 0.5);
        assert_relative_eq!(d.value(2.), 2.5);
        assert_relative_eq!(d.value(10.), 4.5);
    }

    #[test]
    fn test_sine_holds_after_cycles() {
        let d = build(DriveConfig::Sine {
            initial_time: 0.,
            omega: PI,
            amplitude: 2.,
            cycles: Cycles::HalfCycles(1),
            initial_value: 1.,
        });
        assert_relative_eq!(d.value(0.5), 3.);
        assert_relative_eq!(d.value(5.), 1., epsilon = 1e-12);
    }

    #[test]
    fn test_cosine_and_step() {
        let d = build(DriveConfig::Cosine {
            initial_time: 0.,
            omega: PI,
            amplitude: 1.,
            cycles: Cycles::Forever,
            initial_value: 0.,
        });
        assert_relative_eq!(d.value(1.), 2., epsilon = 1e-12);

        let d = build(DriveConfig::Step {
            initial_time: 1.,
            step_value: 4.,
            initial_value: -1.,
        });
        assert_relative_eq!(d.value(0.99), -1.);
        assert_relative_eq!(d.value(1.), 4.);
    }

    #[test]
    fn test_file_drive_requires_stream() {
        let err = DriveCaller::build(
            &DriveConfig::File { drive: 7, index: 1 },
            &StreamDriveSet::new(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownStreamDrive { label: 7 }));
    }

    #[test]
    fn test_restart_syntax() {
        let d = build(DriveConfig::Sine {
            initial_time: 0.,
            omega: 6.5,
            amplitude: 1.,
            cycles: Cycles::Forever,
            initial_value: 0.,
        });
        assert_eq!(d.restart(), "sine, 0.0, 6.5, 1.0, forever, 0.0");
        assert_eq!(DriveCaller::constant(2.).restart(), "const, 2.0");
    }
}
