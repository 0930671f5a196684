//! A built model: nodes, unknowns, stream drives and elements.

use tracing::info;

use crate::config::ModelConfig;
use crate::context::Phase;
use crate::dof::DofRegistry;
use crate::element::Element;
use crate::error::{ChannelResult, ConfigError, ConfigResult, OutputResult};
use crate::node::NodeSet;
use crate::output::vtk::RodSegment;
use crate::output::{Channel, OutputConfig, OutputHandler};
use crate::prelude::*;
use crate::stream::{ServeStatus, StreamDrive, StreamDriveConfig, StreamDriveSet};

#[derive(Debug)]
pub struct Model {
    pub nodes: NodeSet,
    pub dofs: DofRegistry,
    pub streams: StreamDriveSet,
    pub elements: Vec<Element>,
    pub output: OutputConfig,
}

impl Model {
    /// Builds the model, connecting stream drives to their sockets.
    pub fn build(config: &ModelConfig) -> ConfigResult<Self> {
        Self::build_with(config, StreamDrive::connect)
    }

    /// Builds the model with stream drives opened by `open_stream`.
    pub fn build_with<F>(config: &ModelConfig, mut open_stream: F) -> ConfigResult<Self>
    where
        F: FnMut(&StreamDriveConfig) -> ConfigResult<StreamDrive>,
    {
        let mut dofs = DofRegistry::new();
        let mut nodes = NodeSet::new();
        for node in &config.nodes {
            nodes.add(node, &mut dofs)?;
        }

        let mut streams = StreamDriveSet::new();
        for stream in &config.stream_drives {
            streams.add(open_stream(stream)?)?;
        }

        let mut elements: Vec<Element> = Vec::with_capacity(config.elements.len());
        for element in &config.elements {
            if elements.iter().any(|e| e.label() == element.label()) {
                return Err(ConfigError::DuplicateLabel {
                    what: "element",
                    label: element.label(),
                });
            }
            elements.push(element.build(&nodes, &mut dofs, &streams)?);
        }

        info!(
            nodes = nodes.len(),
            elements = elements.len(),
            stream_drives = streams.len(),
            dofs = dofs.len(),
            "built model"
        );
        Ok(Model {
            nodes,
            dofs,
            streams,
            elements,
            output: config.output.clone(),
        })
    }

    pub fn from_json(text: &str) -> ConfigResult<Self> {
        Self::build(&ModelConfig::from_json(text)?)
    }

    pub fn num_dofs(&self) -> usize {
        self.dofs.len()
    }

    pub fn element(&self, label: u32) -> Option<&Element> {
        self.elements.iter().find(|e| e.label() == label)
    }

    pub fn element_mut(&mut self, label: u32) -> Option<&mut Element> {
        self.elements.iter_mut().find(|e| e.label() == label)
    }

    /// State vectors at the initial node configuration for a phase.
    pub fn initial_state(&self, phase: Phase) -> (VectorD, VectorD) {
        let mut x = VectorD::zeros(self.dofs.len());
        let mut xp = VectorD::zeros(self.dofs.len());
        match phase {
            Phase::Regular | Phase::InverseDynamics => {
                self.nodes.initial_state(&self.dofs, &mut x, &mut xp)
            }
            Phase::Initial => self.nodes.initial_assembly_state(&self.dofs, &mut x),
        }
        (x, xp)
    }

    /// Serves every stream drive for the step at time `t`.
    pub fn serve_pending(&mut self, t: f64) -> ChannelResult<Vec<ServeStatus>> {
        self.streams.serve_pending(t)
    }

    pub fn output_handler(&self) -> ConfigResult<OutputHandler> {
        OutputHandler::new(&self.output)
    }

    /// Restart text, stream drives first then elements.
    pub fn restart(&self) -> String {
        self.streams
            .iter()
            .map(StreamDrive::restart)
            .chain(self.elements.iter().map(Element::restart))
            .map(|s| s + "\n")
            .collect()
    }

    pub fn write_restart(&self, oh: &mut OutputHandler) -> OutputResult<()> {
        for line in self.restart().lines() {
            oh.write_line(Channel::Restart, line)?;
        }
        Ok(())
    }

    pub fn rod_segments(&self) -> Vec<RodSegment> {
        self.elements
            .iter()
            .filter_map(Element::rod_segment)
            .collect()
    }
}
