//! Model description read from JSON.
//!
//! Element configurations are the defining parameters of an element: building
//! one yields the element, and every element can give its configuration back
//! for restart.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::constitutive::ConstitutiveLaw;
use crate::dof::{DofOrder, DofRegistry};
use crate::drive::{DriveCaller, DriveConfig};
use crate::element::rod::RodParams;
use crate::element::velocity::JointParams;
use crate::element::*;
use crate::error::{ConfigError, ConfigResult};
use crate::node::{NodeConfig, NodeSet};
use crate::output::OutputConfig;
use crate::prelude::*;
use crate::stream::{StreamDriveConfig, StreamDriveSet};

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ElementConfig {
    /// Rod between two nodes, offset attachment points when `offsets` is set
    Rod {
        label: u32,
        nodes: [u32; 2],
        /// Reference length, measured between the nodes when absent
        #[serde(default)]
        length: Option<f64>,
        law: ConstitutiveLaw,
        #[serde(default)]
        offsets: Option<[[f64; 3]; 2]>,
        #[serde(default = "default_true")]
        output: bool,
    },
    /// Prescribed node velocity along a global direction
    LinearVelocity {
        label: u32,
        node: u32,
        direction: [f64; 3],
        drive: DriveConfig,
        #[serde(default = "default_true")]
        output: bool,
    },
    /// Prescribed node angular velocity along a direction in the node frame
    AngularVelocity {
        label: u32,
        node: u32,
        direction: [f64; 3],
        drive: DriveConfig,
        #[serde(default = "default_true")]
        output: bool,
    },
}

impl ElementConfig {
    pub fn label(&self) -> u32 {
        match *self {
            ElementConfig::Rod { label, .. }
            | ElementConfig::LinearVelocity { label, .. }
            | ElementConfig::AngularVelocity { label, .. } => label,
        }
    }

    /// Builds the element, allocating its reaction unknowns.
    ///
    /// Rods with offsets become [`RodWithOffset`], rods whose law depends on
    /// the strain rate [`ViscoElasticRod`], all others [`Rod`].
    pub fn build(
        &self,
        nodes: &NodeSet,
        dofs: &mut DofRegistry,
        streams: &StreamDriveSet,
    ) -> ConfigResult<Element> {
        match self {
            ElementConfig::Rod {
                label,
                nodes: node_labels,
                length,
                law,
                offsets,
                output,
            } => {
                let label = *label;
                if node_labels[0] == node_labels[1] {
                    return Err(ConfigError::CoincidentNodes {
                        label,
                        node: node_labels[0],
                    });
                }
                let n1 = nodes.resolve(node_labels[0], "rod", label)?;
                let n2 = nodes.resolve(node_labels[1], "rod", label)?;
                let offsets = offsets.map(|[f1, f2]| [Vector3::from(f1), Vector3::from(f2)]);

                let length = match length {
                    Some(l) => *l,
                    None => {
                        let [f1, f2] = offsets.unwrap_or_default();
                        let (s1, s2) = (nodes.get(n1), nodes.get(n2));
                        ((s2.x0 + s2.r_ref * f2) - (s1.x0 + s1.r_ref * f1)).norm()
                    }
                };
                if !(length > 0. && length.is_finite()) {
                    return Err(ConfigError::InvalidRodLength { label, length });
                }

                let params = RodParams {
                    label,
                    nodes: [n1, n2],
                    node_labels: *node_labels,
                    length,
                    law: law.clone(),
                    output: *output,
                };
                Ok(match offsets {
                    Some(offsets) => Element::RodWithOffset(RodWithOffset::new(params, offsets)),
                    None if law.has_rate() => Element::ViscoElasticRod(ViscoElasticRod::new(params)),
                    None => Element::Rod(Rod::new(params)),
                })
            }
            ElementConfig::LinearVelocity {
                label,
                node,
                direction,
                drive,
                output,
            } => {
                let params = joint_params(
                    "linear velocity",
                    *label,
                    *node,
                    direction,
                    drive,
                    *output,
                    nodes,
                    dofs,
                    streams,
                )?;
                Ok(Element::LinearVelocity(LinearVelocityJoint::new(params)))
            }
            ElementConfig::AngularVelocity {
                label,
                node,
                direction,
                drive,
                output,
            } => {
                let params = joint_params(
                    "angular velocity",
                    *label,
                    *node,
                    direction,
                    drive,
                    *output,
                    nodes,
                    dofs,
                    streams,
                )?;
                Ok(Element::AngularVelocity(AngularVelocityJoint::new(params)))
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn joint_params(
    what: &'static str,
    label: u32,
    node_label: u32,
    direction: &[f64; 3],
    drive: &DriveConfig,
    output: bool,
    nodes: &NodeSet,
    dofs: &mut DofRegistry,
    streams: &StreamDriveSet,
) -> ConfigResult<JointParams> {
    let node = nodes.resolve(node_label, what, label)?;
    let direction = Vector3::from(*direction);
    if direction.norm_squared() == 0. {
        return Err(ConfigError::NullDirection { what, label });
    }
    let drive = DriveCaller::build(drive, streams)?;
    Ok(JointParams {
        label,
        node,
        node_label,
        direction,
        drive,
        dofs: dofs.allocate(label, 1, DofOrder::Algebraic),
        output,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub nodes: Vec<NodeConfig>,
    #[serde(default)]
    pub stream_drives: Vec<StreamDriveConfig>,
    pub elements: Vec<ElementConfig>,
    #[serde(default)]
    pub output: OutputConfig,
}

impl ModelConfig {
    pub fn from_json(text: &str) -> ConfigResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_json(&text)?;
        info!(
            path = %path.display(),
            nodes = config.nodes.len(),
            elements = config.elements.len(),
            "read model configuration"
        );
        Ok(config)
    }
}

//------------------------------------------------------------------------------
// Testing
//------------------------------------------------------------------------------
