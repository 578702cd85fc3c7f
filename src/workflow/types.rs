use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

pub const DETECT_OBJECT: &str = "detect-object";
pub const HIGHLIGHT_OBJECT: &str = "highlight-object";
pub const OUTPUT: &str = "output";

/// One step exactly as the client sent it, before validation.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StepSpec {
    #[serde(rename = "type", alias = "kind")]
    pub kind: String,
    #[serde(default)]
    pub object: Option<String>,
    #[serde(default, alias = "method")]
    pub highlight_method: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    DetectObject { object: String },
    HighlightObject { object: String, method: String },
    Output,
    /// Kinds this server does not know yet. They are skipped, not rejected.
    Unrecognized(String),
}

fn required(field: Option<String>, name: &str, kind: &str) -> Result<String> {
    match field {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(anyhow!("Step '{}' requires a non-empty '{}'", kind, name)),
    }
}

impl TryFrom<StepSpec> for Step {
    type Error = anyhow::Error;

    fn try_from(spec: StepSpec) -> Result<Self> {
        let step = match spec.kind.as_str() {
            DETECT_OBJECT => Step::DetectObject {
                object: required(spec.object, "object", DETECT_OBJECT)?,
            },
            HIGHLIGHT_OBJECT => Step::HighlightObject {
                object: required(spec.object, "object", HIGHLIGHT_OBJECT)?,
                method: required(spec.highlight_method, "highlightMethod", HIGHLIGHT_OBJECT)?,
            },
            OUTPUT => Step::Output,
            _ => Step::Unrecognized(spec.kind),
        };
        Ok(step)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::DetectObject { object } => write!(f, "{}({})", DETECT_OBJECT, object),
            Step::HighlightObject { object, method } => {
                write!(f, "{}({}, {})", HIGHLIGHT_OBJECT, object, method)
            }
            Step::Output => f.write_str(OUTPUT),
            Step::Unrecognized(kind) => write!(f, "unrecognized({})", kind),
        }
    }
}

/// Parses the `pipeline` form field: a JSON array of step objects.
pub fn parse_pipeline(raw: &str) -> Result<Vec<Step>> {
    let specs: Vec<StepSpec> =
        serde_json::from_str(raw).context("Pipeline must be a JSON array of step objects")?;
    specs
        .into_iter()
        .enumerate()
        .map(|(index, spec)| {
            Step::try_from(spec).with_context(|| format!("Invalid pipeline step #{}", index))
        })
        .collect()
}

/// The image flowing between steps.
#[derive(Clone, PartialEq, Eq)]
pub struct WorkingPayload {
    pub bytes: Vec<u8>,
    pub media_type: String,
}

impl WorkingPayload {
    pub fn new(bytes: Vec<u8>, media_type: impl Into<String>) -> Result<Self> {
        if bytes.is_empty() {
            bail!("Image payload is empty");
        }
        Ok(Self {
            bytes,
            media_type: media_type.into(),
        })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for WorkingPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkingPayload")
            .field("media_type", &self.media_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// One detection record from the analysis server. Every known field is
/// optional; whatever the server sends is passed through to the client.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct Detection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xmin: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ymin: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xmax: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ymax: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "step", rename_all = "camelCase")]
pub enum ExecutionLogEntry {
    #[serde(rename_all = "camelCase")]
    Input { media_type: String, size: usize },
    Detect {
        object: String,
        detections: Vec<Detection>,
    },
    Highlight { object: String, method: String },
}
