//! InsightFace model packs and ONNX execution providers.

use ort::execution_providers::{CPUExecutionProvider, ExecutionProviderDispatch};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// A detector/recognizer pair shipped together as an InsightFace pack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelPack {
    /// SCRFD-10GF + ArcFace ResNet-50.
    BuffaloL,
    /// SCRFD-500MF + ArcFace MobileFaceNet.
    BuffaloS,
}

impl ModelPack {
    pub fn name(&self) -> &'static str {
        match self {
            ModelPack::BuffaloL => "buffalo_l",
            ModelPack::BuffaloS => "buffalo_s",
        }
    }

    pub fn detector_file(&self) -> &'static str {
        match self {
            ModelPack::BuffaloL => "det_10g.onnx",
            ModelPack::BuffaloS => "det_500m.onnx",
        }
    }

    pub fn recognizer_file(&self) -> &'static str {
        match self {
            ModelPack::BuffaloL => "w600k_r50.onnx",
            ModelPack::BuffaloS => "w600k_mbf.onnx",
        }
    }

    pub fn detector_path(&self, model_dir: &Path) -> String {
        model_dir.join(self.detector_file()).to_string_lossy().into_owned()
    }

    pub fn recognizer_path(&self, model_dir: &Path) -> String {
        model_dir.join(self.recognizer_file()).to_string_lossy().into_owned()
    }
}

impl fmt::Display for ModelPack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    kind: &'static str,
    value: String,
}

impl FromStr for ModelPack {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buffalo_l" => Ok(ModelPack::BuffaloL),
            "buffalo_s" => Ok(ModelPack::BuffaloS),
            other => Err(UnknownVariant {
                kind: "model pack",
                value: other.to_string(),
            }),
        }
    }
}

/// Where ONNX Runtime executes the models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionProvider {
    Cpu,
}

impl ExecutionProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionProvider::Cpu => "cpu",
        }
    }

    pub(crate) fn dispatch(&self) -> ExecutionProviderDispatch {
        match self {
            ExecutionProvider::Cpu => CPUExecutionProvider::default().build(),
        }
    }
}

impl FromStr for ExecutionProvider {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" | "cpuexecutionprovider" => Ok(ExecutionProvider::Cpu),
            _ => Err(UnknownVariant {
                kind: "execution provider",
                value: s.to_string(),
            }),
        }
    }
}

/// `$XDG_DATA_HOME/facerec/models/<pack>`, falling back to `~/.local/share`.
pub fn default_model_dir(pack: ModelPack) -> PathBuf {
    let data_dir = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        });
    data_dir.join("facerec").join("models").join(pack.name())
}
