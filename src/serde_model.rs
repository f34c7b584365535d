//! JSON persistence (feature: `serde`).
//!
//! Models go through a versioned [`SerializedMlp`] so the file format does not follow
//! the internal `Mlp`/`Layer` representation. Deserialization validates dimensions,
//! parameter lengths, finiteness and the outputs unscaling.
//!
//! Training configuration, history and reports serialize their own fields directly.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::{
    Activation, Error, Layer, Mlp, OutputsUnscaling, Result, TrainingConfig, TrainingHistory,
    TrainingReport,
};

pub const MODEL_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedMlp {
    pub format_version: u32,
    pub layers: Vec<SerializedLayer>,
    pub outputs_unscaling: OutputsUnscaling,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedLayer {
    pub in_dim: usize,
    pub out_dim: usize,
    pub activation: Activation,
    /// Row-major (out_dim, in_dim).
    pub weights: Vec<f64>,
    pub biases: Vec<f64>,
}

impl SerializedMlp {
    pub fn validate(&self) -> Result<()> {
        if self.format_version != MODEL_FORMAT_VERSION {
            return Err(Error::InvalidData(format!(
                "unsupported model format_version {}; expected {}",
                self.format_version, MODEL_FORMAT_VERSION
            )));
        }
        if self.layers.is_empty() {
            return Err(Error::InvalidData(
                "serialized model must have at least one layer".to_owned(),
            ));
        }
        for (i, pair) in self.layers.windows(2).enumerate() {
            if pair[1].in_dim != pair[0].out_dim {
                return Err(Error::InvalidData(format!(
                    "layer {} in_dim {} does not match previous out_dim {}",
                    i + 1,
                    pair[1].in_dim,
                    pair[0].out_dim
                )));
            }
        }
        Ok(())
    }
}

impl From<&Mlp> for SerializedMlp {
    fn from(model: &Mlp) -> Self {
        Self {
            format_version: MODEL_FORMAT_VERSION,
            layers: model.layers().iter().map(SerializedLayer::from).collect(),
            outputs_unscaling: model.outputs_unscaling().clone(),
        }
    }
}

impl From<&Layer> for SerializedLayer {
    fn from(layer: &Layer) -> Self {
        Self {
            in_dim: layer.in_dim(),
            out_dim: layer.out_dim(),
            activation: layer.activation(),
            weights: layer.weights().to_vec(),
            biases: layer.biases().to_vec(),
        }
    }
}

impl TryFrom<SerializedMlp> for Mlp {
    type Error = Error;

    fn try_from(value: SerializedMlp) -> Result<Self> {
        value.validate()?;

        let mut layers = Vec::with_capacity(value.layers.len());
        for (i, layer) in value.layers.into_iter().enumerate() {
            // Checks shapes, the activation and finiteness.
            let l = Layer::from_parts(
                layer.in_dim,
                layer.out_dim,
                layer.activation,
                layer.weights,
                layer.biases,
            )
            .map_err(|e| Error::InvalidData(format!("layer {i} invalid: {e}")))?;
            layers.push(l);
        }

        let mut mlp = Mlp::from_layers(layers)?;
        mlp.set_outputs_unscaling(value.outputs_unscaling)
            .map_err(|e| Error::InvalidData(format!("invalid outputs unscaling: {e}")))?;
        Ok(mlp)
    }
}

fn to_json<T: Serialize>(value: &T, what: &str) -> Result<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| Error::InvalidData(format!("failed to serialize {what}: {e}")))
}

fn from_json<T: DeserializeOwned>(s: &str, what: &str) -> Result<T> {
    serde_json::from_str(s).map_err(|e| Error::InvalidData(format!("failed to parse {what} json: {e}")))
}

impl Mlp {
    /// Serialize the model to a pretty-printed JSON string.
    pub fn to_json_string_pretty(&self) -> Result<String> {
        to_json(&SerializedMlp::from(self), "model")
    }

    /// Serialize the model to a compact JSON string.
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string(&SerializedMlp::from(self))
            .map_err(|e| Error::InvalidData(format!("failed to serialize model: {e}")))
    }

    /// Parse a model from a JSON string.
    pub fn from_json_str(s: &str) -> Result<Self> {
        from_json::<SerializedMlp>(s, "model")?.try_into()
    }

    /// Save the model to a JSON file (pretty-printed).
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let s = self.to_json_string_pretty()?;
        let p = path.as_ref();
        std::fs::write(p, s)
            .map_err(|e| Error::InvalidData(format!("failed to write {}: {e}", p.display())))
    }

    /// Load a model from a JSON file.
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let p = path.as_ref();
        let s = std::fs::read_to_string(p)
            .map_err(|e| Error::InvalidData(format!("failed to read {}: {e}", p.display())))?;
        Self::from_json_str(&s)
    }
}

impl TrainingConfig {
    pub fn to_json_string_pretty(&self) -> Result<String> {
        to_json(self, "training config")
    }

    /// Parse and validate a training configuration. Missing fields take their defaults.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: Self = from_json(s, "training config")?;
        config.validate()?;
        Ok(config)
    }
}

impl TrainingHistory {
    pub fn to_json_string_pretty(&self) -> Result<String> {
        to_json(self, "training history")
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        from_json(s, "training history")
    }
}

impl TrainingReport {
    pub fn to_json_string_pretty(&self) -> Result<String> {
        to_json(self, "training report")
    }
}
