//! Output channels and record formatting.
//!
//! Elements hand a record to the [`OutputHandler`] and never see where it
//! goes. A channel is either formatted text (fixed width, precision and
//! notation) or structured, one JSON object per line.

pub mod vtk;

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult, OutputResult};
use crate::prelude::*;

/// Default number of significant digits of text output.
pub const DEFAULT_PRECISION: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Per-element records
    Joints,
    Restart,
}

impl Channel {
    /// File extension used when the channel is backed by a file.
    pub fn extension(self) -> &'static str {
        match self {
            Channel::Joints => "jnt",
            Channel::Restart => "rst",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkFormat {
    #[default]
    Text,
    Structured,
}

fn default_precision() -> i64 {
    DEFAULT_PRECISION as i64
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_precision")]
    pub precision: i64,
    /// Field width, defaults to precision + 6
    #[serde(default)]
    pub width: Option<usize>,
    #[serde(default = "default_true")]
    pub scientific: bool,
    /// Channels written as JSON lines instead of text
    #[serde(default)]
    pub structured: Vec<Channel>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            precision: default_precision(),
            width: None,
            scientific: true,
            structured: vec![],
        }
    }
}

/// Something an element writes once per step.
pub trait OutputRecord: Serialize {
    fn label(&self) -> u32;

    /// Numeric fields in text column order, label excluded.
    fn fields(&self) -> Vec<f64>;
}

/// Reaction record shared by joints and rods.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JointRecord {
    pub label: u32,
    pub name: &'static str,
    pub force_local: [f64; 3],
    pub moment_local: [f64; 3],
    pub force_global: [f64; 3],
    pub moment_global: [f64; 3],
    /// Element specific trailing columns
    pub extra: Vec<f64>,
}

impl JointRecord {
    pub fn new(
        name: &'static str,
        label: u32,
        force_local: &Vector3,
        moment_local: &Vector3,
        force_global: &Vector3,
        moment_global: &Vector3,
    ) -> Self {
        JointRecord {
            label,
            name,
            force_local: (*force_local).into(),
            moment_local: (*moment_local).into(),
            force_global: (*force_global).into(),
            moment_global: (*moment_global).into(),
            extra: vec![],
        }
    }

    pub fn with_extra(mut self, values: &[f64]) -> Self {
        self.extra.extend_from_slice(values);
        self
    }
}

impl OutputRecord for JointRecord {
    fn label(&self) -> u32 {
        self.label
    }

    fn fields(&self) -> Vec<f64> {
        self.force_local
            .iter()
            .chain(&self.moment_local)
            .chain(&self.force_global)
            .chain(&self.moment_global)
            .chain(&self.extra)
            .copied()
            .collect()
    }
}

/// In-memory sink whose contents can be read back while it is in use.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        let buf = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub struct OutputHandler {
    precision: usize,
    width: usize,
    scientific: bool,
    structured: Vec<Channel>,
    sinks: BTreeMap<Channel, Box<dyn Write + Send>>,
}

impl std::fmt::Debug for OutputHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputHandler")
            .field("precision", &self.precision)
            .field("width", &self.width)
            .field("scientific", &self.scientific)
            .field("open", &self.sinks.keys().collect_vec())
            .finish()
    }
}

impl OutputHandler {
    pub fn new(config: &OutputConfig) -> ConfigResult<Self> {
        if config.precision <= 0 {
            return Err(ConfigError::InvalidPrecision(config.precision));
        }
        let precision = config.precision as usize;
        Ok(OutputHandler {
            precision,
            width: config.width.unwrap_or(precision + 6),
            scientific: config.scientific,
            structured: config.structured.clone(),
            sinks: BTreeMap::new(),
        })
    }

    /// Attaches a sink to a channel, replacing any previous one.
    pub fn open(&mut self, channel: Channel, sink: Box<dyn Write + Send>) {
        self.sinks.insert(channel, sink);
    }

    /// Opens `<base>.<ext>` files for the given channels.
    pub fn open_files(&mut self, base: &Path, channels: &[Channel]) -> ConfigResult<()> {
        for &channel in channels {
            let path = base.with_extension(channel.extension());
            let file = File::create(&path).map_err(|source| ConfigError::Io {
                path: path.display().to_string(),
                source,
            })?;
            self.open(channel, Box::new(BufWriter::new(file)));
        }
        Ok(())
    }

    pub fn is_open(&self, channel: Channel) -> bool {
        self.sinks.contains_key(&channel)
    }

    pub fn format(&self, channel: Channel) -> SinkFormat {
        if self.structured.contains(&channel) {
            SinkFormat::Structured
        } else {
            SinkFormat::Text
        }
    }

    /// Formats one number with the configured width, precision and notation.
    pub fn number(&self, v: f64) -> String {
        let (w, p) = (self.width, self.precision);
        if self.scientific {
            format!("{:>w$.p$e}", v)
        } else {
            format!("{:>w$.p$}", v)
        }
    }

    /// Writes a record, a no-op on channels without a sink.
    pub fn write_record<R: OutputRecord>(&mut self, channel: Channel, record: &R) -> OutputResult<()> {
        let line = match self.format(channel) {
            SinkFormat::Structured => serde_json::to_string(record)?,
            SinkFormat::Text => {
                let mut line = format!("{:>8}", record.label());
                for v in record.fields() {
                    line.push(' ');
                    line.push_str(&self.number(v));
                }
                line
            }
        };
        self.write_line(channel, &line)?;
        Ok(())
    }

    /// Writes raw text followed by a newline.
    pub fn write_line(&mut self, channel: Channel, line: &str) -> io::Result<()> {
        match self.sinks.get_mut(&channel) {
            Some(sink) => writeln!(sink, "{line}"),
            None => Ok(()),
        }
    }

    pub fn flush(&mut self) -> io::Result<()> {
        for sink in self.sinks.values_mut() {
            sink.flush()?;
        }
        Ok(())
    }
}

//------------------------------------------------------------------------------
// Testing
//------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> JointRecord {
        JointRecord::new(
            "LinearVelocity",
            12,
            &Vector3::new(1.5, 0., 0.),
            &Vector3::zeros(),
            &Vector3::new(0., 1.5, 0.),
            &Vector3::zeros(),
        )
        .with_extra(&[0., 1., 0., 2.])
    }

    #[test]
    fn test_text_record() {
        let buf = SharedBuffer::new();
        let mut oh = OutputHandler::new(&OutputConfig::default()).unwrap();
        oh.open(Channel::Joints, Box::new(buf.clone()));
        oh.write_record(Channel::Joints, &record()).unwrap();

        let text = buf.contents();
        let cols: Vec<&str> = text.split_whitespace().collect();
        assert_eq!(cols.len(), 17);
        assert_eq!(cols[0], "12");
        assert_eq!(cols[1], "1.500000e0");
        assert!(text.starts_with("      12 "));
    }

    #[test]
    fn test_structured_record() {
        let buf = SharedBuffer::new();
        let config = OutputConfig {
            structured: vec![Channel::Joints],
            ..Default::default()
        };
        let mut oh = OutputHandler::new(&config).unwrap();
        oh.open(Channel::Joints, Box::new(buf.clone()));
        oh.write_record(Channel::Joints, &record()).unwrap();

        let value: serde_json::Value = serde_json::from_str(buf.contents().trim()).unwrap();
        assert_eq!(value["label"], 12);
        assert_eq!(value["name"], "LinearVelocity");
        assert_eq!(value["extra"][3], 2.0);
    }

    #[test]
    fn test_fixed_notation_and_closed_channel() {
        let config = OutputConfig {
            precision: 3,
            width: Some(9),
            scientific: false,
            structured: vec![],
        };
        let mut oh = OutputHandler::new(&config).unwrap();
        assert_eq!(oh.number(-2.5), "   -2.500");
        assert!(oh.write_record(Channel::Joints, &record()).is_ok());
        assert!(matches!(
            OutputHandler::new(&OutputConfig {
                precision: 0,
                ..Default::default()
            }),
            Err(ConfigError::InvalidPrecision(0))
        ));
    }
}
