//! Restart text.
//!
//! Elements and stream drives write one statement each with their defining
//! parameters; the reader turns the same text back into configurations.
//!
//! ```text
//! file: 5, socket stream, stream drive name, "loads", create, no, port, 9012,
//!     host, "127.0.0.1", input every, 1, receive first, yes, timeout, 0.0, 2;
//! joint: 1, rod, 10, 20, 1.0, linear elastic, 1000.0;
//! joint: 2, linear velocity, 10, reference, global, 1.0, 0.0, 0.0, file, 5, 1, output, no;
//! ```
//!
//! `#` starts a comment running to the end of the line.

use std::str::FromStr;

use itertools::Itertools;

use crate::config::ElementConfig;
use crate::constitutive::ConstitutiveLaw;
use crate::drive::{Cycles, DriveConfig};
use crate::error::{RestartError, RestartResult};
use crate::stream::{EchoConfig, StreamDriveConfig};

//------------------------------------------------------------------------------
// Writer
//------------------------------------------------------------------------------

fn vector(v: &[f64; 3]) -> String {
    v.iter().map(|x| format!("{:?}", x)).join(", ")
}

impl ElementConfig {
    /// Restart statement.
    pub fn restart(&self) -> String {
        let (mut s, output) = match self {
            ElementConfig::Rod {
                label,
                nodes,
                length,
                law,
                offsets,
                output,
            } => {
                let length = match length {
                    Some(l) => format!("{:?}", l),
                    None => "from nodes".to_string(),
                };
                let s = match offsets {
                    None => format!(
                        "joint: {}, rod, {}, {}, {}, {}",
                        label,
                        nodes[0],
                        nodes[1],
                        length,
                        law.restart()
                    ),
                    Some([f1, f2]) => format!(
                        "joint: {}, rod with offset, \
                         {}, position, reference, node, {}, \
                         {}, position, reference, node, {}, {}, {}",
                        label,
                        nodes[0],
                        vector(f1),
                        nodes[1],
                        vector(f2),
                        length,
                        law.restart()
                    ),
                };
                (s, *output)
            }
            ElementConfig::LinearVelocity {
                label,
                node,
                direction,
                drive,
                output,
            } => (
                format!(
                    "joint: {}, linear velocity, {}, reference, global, {}, {}",
                    label,
                    node,
                    vector(direction),
                    drive.restart()
                ),
                *output,
            ),
            ElementConfig::AngularVelocity {
                label,
                node,
                direction,
                drive,
                output,
            } => (
                format!(
                    "joint: {}, angular velocity, {}, reference, node, {}, {}",
                    label,
                    node,
                    vector(direction),
                    drive.restart()
                ),
                *output,
            ),
        };
        if !output {
            s.push_str(", output, no");
        }
        s.push(';');
        s
    }
}

//------------------------------------------------------------------------------
// Reader
//------------------------------------------------------------------------------

/// One statement of restart text.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Element(ElementConfig),
    StreamDrive(StreamDriveConfig),
}

/// Reads every statement of restart text.
pub fn parse(text: &str) -> RestartResult<Vec<Statement>> {
    let text = strip_comments(text);
    split_outside_quotes(&text, ';')
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(parse_statement)
        .collect()
}

/// Reads the element statements of restart text, skipping everything else.
pub fn parse_elements(text: &str) -> RestartResult<Vec<ElementConfig>> {
    Ok(parse(text)?
        .into_iter()
        .filter_map(|s| match s {
            Statement::Element(e) => Some(e),
            Statement::StreamDrive(_) => None,
        })
        .collect())
}

fn strip_comments(text: &str) -> String {
    text.lines()
        .map(|line| {
            let mut quoted = false;
            for (i, c) in line.char_indices() {
                match c {
                    '"' => quoted = !quoted,
                    '#' if !quoted => return &line[..i],
                    _ => {}
                }
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn split_outside_quotes(text: &str, sep: char) -> Vec<&str> {
    let mut parts = vec![];
    let mut quoted = false;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        if c == '"' {
            quoted = !quoted;
        } else if c == sep && !quoted {
            parts.push(&text[start..i]);
            start = i + c.len_utf8();
        }
    }
    parts.push(&text[start..]);
    parts
}

fn parse_statement(statement: &str) -> RestartResult<Statement> {
    let (head, body) = statement
        .split_once(':')
        .ok_or_else(|| RestartError::Unexpected {
            expected: "\"<kind>:\"",
            found: statement.to_string(),
        })?;
    let mut tokens = Tokens::new(body);
    let parsed = match head.trim() {
        "joint" => Statement::Element(parse_joint(&mut tokens)?),
        "file" => Statement::StreamDrive(parse_stream_drive(&mut tokens)?),
        other => {
            return Err(RestartError::UnknownKeyword {
                what: "statement",
                found: other.to_string(),
            })
        }
    };
    tokens.finish()?;
    Ok(parsed)
}

/// Comma separated fields of one statement.
struct Tokens {
    items: Vec<String>,
    pos: usize,
}

impl Tokens {
    fn new(body: &str) -> Self {
        let items = split_outside_quotes(body, ',')
            .into_iter()
            .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
            .collect();
        Tokens { items, pos: 0 }
    }

    fn peek(&self) -> Option<&str> {
        self.items.get(self.pos).map(String::as_str)
    }

    fn next(&mut self, expected: &'static str) -> RestartResult<&str> {
        let item = self
            .items
            .get(self.pos)
            .ok_or(RestartError::UnexpectedEnd(expected))?;
        self.pos += 1;
        Ok(item.as_str())
    }

    /// Consumes `keyword` if it is next.
    fn accept(&mut self, keyword: &str) -> bool {
        let found = self.peek() == Some(keyword);
        if found {
            self.pos += 1;
        }
        found
    }

    fn expect(&mut self, keyword: &'static str) -> RestartResult<()> {
        let found = self.next(keyword)?;
        if found != keyword {
            return Err(RestartError::Unexpected {
                expected: keyword,
                found: found.to_string(),
            });
        }
        Ok(())
    }

    fn parse<T: FromStr>(&mut self, expected: &'static str) -> RestartResult<T> {
        let token = self.next(expected)?;
        token
            .parse()
            .map_err(|_| RestartError::InvalidNumber(token.to_string()))
    }

    fn vector(&mut self) -> RestartResult<[f64; 3]> {
        Ok([
            self.parse("x component")?,
            self.parse("y component")?,
            self.parse("z component")?,
        ])
    }

    fn yes_no(&mut self, expected: &'static str) -> RestartResult<bool> {
        match self.next(expected)? {
            "yes" => Ok(true),
            "no" => Ok(false),
            other => Err(RestartError::Unexpected {
                expected: "yes or no",
                found: other.to_string(),
            }),
        }
    }

    fn quoted(&mut self, expected: &'static str) -> RestartResult<String> {
        let token = self.next(expected)?;
        token
            .strip_prefix('"')
            .and_then(|t| t.strip_suffix('"'))
            .map(str::to_string)
            .ok_or_else(|| RestartError::Unexpected {
                expected,
                found: token.to_string(),
            })
    }

    fn finish(&self) -> RestartResult<()> {
        match self.items.get(self.pos..) {
            Some(rest) if !rest.is_empty() => Err(RestartError::Trailing(rest.join(", "))),
            _ => Ok(()),
        }
    }
}

fn parse_joint(t: &mut Tokens) -> RestartResult<ElementConfig> {
    let label = t.parse("joint label")?;
    let kind = t.next("joint type")?.to_string();
    let config = match kind.as_str() {
        "rod" => {
            let nodes = [t.parse("node label")?, t.parse("node label")?];
            ElementConfig::Rod {
                label,
                nodes,
                length: parse_length(t)?,
                law: parse_law(t)?,
                offsets: None,
                output: true,
            }
        }
        "rod with offset" => {
            let mut nodes = [0; 2];
            let mut offsets = [[0.; 3]; 2];
            for i in 0..2 {
                nodes[i] = t.parse("node label")?;
                t.expect("position")?;
                t.expect("reference")?;
                t.expect("node")?;
                offsets[i] = t.vector()?;
            }
            ElementConfig::Rod {
                label,
                nodes,
                length: parse_length(t)?,
                law: parse_law(t)?,
                offsets: Some(offsets),
                output: true,
            }
        }
        "linear velocity" => {
            let node = t.parse("node label")?;
            t.expect("reference")?;
            t.expect("global")?;
            ElementConfig::LinearVelocity {
                label,
                node,
                direction: t.vector()?,
                drive: parse_drive(t)?,
                output: true,
            }
        }
        "angular velocity" => {
            let node = t.parse("node label")?;
            t.expect("reference")?;
            t.expect("node")?;
            ElementConfig::AngularVelocity {
                label,
                node,
                direction: t.vector()?,
                drive: parse_drive(t)?,
                output: true,
            }
        }
        _ => {
            return Err(RestartError::UnknownKeyword {
                what: "joint type",
                found: kind,
            })
        }
    };
    Ok(with_output(config, parse_output(t)?))
}

fn with_output(mut config: ElementConfig, enabled: bool) -> ElementConfig {
    match &mut config {
        ElementConfig::Rod { output, .. }
        | ElementConfig::LinearVelocity { output, .. }
        | ElementConfig::AngularVelocity { output, .. } => *output = enabled,
    }
    config
}

fn parse_output(t: &mut Tokens) -> RestartResult<bool> {
    if t.accept("output") {
        t.yes_no("output flag")
    } else {
        Ok(true)
    }
}

fn parse_length(t: &mut Tokens) -> RestartResult<Option<f64>> {
    if t.accept("from nodes") {
        Ok(None)
    } else {
        Ok(Some(t.parse("reference length")?))
    }
}

fn parse_law(t: &mut Tokens) -> RestartResult<ConstitutiveLaw> {
    let kind = t.next("constitutive law")?.to_string();
    Ok(match kind.as_str() {
        "linear elastic" => ConstitutiveLaw::LinearElastic {
            stiffness: t.parse("stiffness")?,
        },
        "linear viscoelastic" => ConstitutiveLaw::LinearViscoElastic {
            stiffness: t.parse("stiffness")?,
            damping: t.parse("damping")?,
        },
        "cubic elastic" => ConstitutiveLaw::CubicElastic {
            e1: t.parse("linear coefficient")?,
            e2: t.parse("quadratic coefficient")?,
            e3: t.parse("cubic coefficient")?,
        },
        _ => {
            return Err(RestartError::UnknownKeyword {
                what: "constitutive law",
                found: kind,
            })
        }
    })
}

fn parse_cycles(t: &mut Tokens) -> RestartResult<Cycles> {
    if t.accept("forever") {
        Ok(Cycles::Forever)
    } else {
        Ok(Cycles::HalfCycles(t.parse("number of cycles")?))
    }
}

fn parse_drive(t: &mut Tokens) -> RestartResult<DriveConfig> {
    let kind = t.next("drive")?.to_string();
    Ok(match kind.as_str() {
        "const" => DriveConfig::Const {
            value: t.parse("value")?,
        },
        "linear" => DriveConfig::Linear {
            constant: t.parse("constant")?,
            slope: t.parse("slope")?,
        },
        "ramp" => DriveConfig::Ramp {
            slope: t.parse("slope")?,
            initial_time: t.parse("initial time")?,
            final_time: t.parse("final time")?,
            initial_value: t.parse("initial value")?,
        },
        "sine" => DriveConfig::Sine {
            initial_time: t.parse("initial time")?,
            omega: t.parse("omega")?,
            amplitude: t.parse("amplitude")?,
            cycles: parse_cycles(t)?,
            initial_value: t.parse("initial value")?,
        },
        "cosine" => DriveConfig::Cosine {
            initial_time: t.parse("initial time")?,
            omega: t.parse("omega")?,
            amplitude: t.parse("amplitude")?,
            cycles: parse_cycles(t)?,
            initial_value: t.parse("initial value")?,
        },
        "step" => DriveConfig::Step {
            initial_time: t.parse("initial time")?,
            step_value: t.parse("step value")?,
            initial_value: t.parse("initial value")?,
        },
        "file" => DriveConfig::File {
            drive: t.parse("stream drive label")?,
            index: t.parse("channel index")?,
        },
        _ => {
            return Err(RestartError::UnknownKeyword {
                what: "drive",
                found: kind,
            })
        }
    })
}

fn parse_stream_drive(t: &mut Tokens) -> RestartResult<StreamDriveConfig> {
    let label = t.parse("stream drive label")?;
    t.expect("socket stream")?;
    t.expect("stream drive name")?;
    let name = t.quoted("stream drive name")?;
    let create = if t.accept("create") {
        t.yes_no("create flag")?
    } else {
        false
    };

    let (mut path, mut host, mut port) = (None, None, None);
    if t.accept("path") {
        path = Some(t.quoted("socket path")?);
    } else {
        if t.accept("port") {
            port = Some(t.parse("port")?);
        }
        if t.accept("host") {
            host = Some(t.quoted("host")?);
        }
    }

    let blocking = !t.accept("non blocking");
    let input_every = if t.accept("input every") {
        t.parse("input every")?
    } else {
        1
    };
    let receive_first = if t.accept("receive first") {
        t.yes_no("receive first")?
    } else {
        true
    };
    let timeout = if t.accept("timeout") {
        t.parse("timeout")?
    } else {
        0.
    };
    let echo = if t.accept("echo") {
        let file = t.quoted("echo file")?;
        t.expect("precision")?;
        let precision = t.parse("echo precision")?;
        t.expect("shift")?;
        Some(EchoConfig {
            file,
            precision,
            shift: t.parse("echo shift")?,
        })
    } else {
        None
    };
    let channels = t.parse("number of channels")?;
    let initial_values = if t.accept("initial values") {
        let mut values = vec![];
        while t.peek().is_some() {
            values.push(t.parse("initial value")?);
        }
        Some(values)
    } else {
        None
    };

    Ok(StreamDriveConfig {
        label,
        name,
        create,
        path,
        host,
        port,
        blocking,
        input_every,
        receive_first,
        timeout,
        echo,
        channels,
        initial_values,
    })
}

//------------------------------------------------------------------------------
// Testing
//------------------------------------------------------------------------------
