//! Configuration for the runtime, graph, session and sample input.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tfc_runtime::{SessionConfig, element_count};

use crate::error::{CoreError, Result};
use crate::image::ChannelOrder;

/// Sample input fed to the `input_4` operation of the example graph.
pub const SAMPLE_DIMS: [i64; 3] = [1, 5, 12];

#[rustfmt::skip]
pub const SAMPLE_VALUES: [f32; 60] = [
    -0.4809832, -0.3770838, 0.1743573, 0.7720509, -0.4064746, 0.0116595, 0.0051413, 0.9135732, 0.7197526, -0.0400658, 0.1180671, -0.6829428,
    -0.4810135, -0.3772099, 0.1745346, 0.7719303, -0.4066443, 0.0114614, 0.0051195, 0.9135003, 0.7196983, -0.0400035, 0.1178188, -0.6830465,
    -0.4809143, -0.3773398, 0.1746384, 0.7719052, -0.4067171, 0.0111654, 0.0054433, 0.9134697, 0.7192584, -0.0399981, 0.1177435, -0.6835230,
    -0.4808300, -0.3774327, 0.1748246, 0.7718700, -0.4070232, 0.0109549, 0.0059128, 0.9133330, 0.7188759, -0.0398740, 0.1181437, -0.6838635,
    -0.4807833, -0.3775733, 0.1748378, 0.7718275, -0.4073670, 0.0107582, 0.0062978, 0.9131795, 0.7187147, -0.0394935, 0.1184392, -0.6840039,
];

/// Main configuration for tfc.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TfcConfig {
    /// Runtime library configuration.
    pub runtime: RuntimeConfig,

    /// Graph file and endpoint names.
    pub graph: GraphConfig,

    /// Session creation settings.
    pub session: SessionSettings,

    /// Input tensor fed by `run` and checked by `create-tensor`.
    pub input: InputConfig,
}

/// Where to find the TensorFlow shared library.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Library path from the config file. `TFC_LIBRARY` takes precedence.
    pub library: Option<PathBuf>,

    /// Library path given on the command line. Wins over everything else.
    #[serde(skip)]
    pub library_override: Option<PathBuf>,
}

impl RuntimeConfig {
    /// Library path to load, `None` to search the platform defaults.
    ///
    /// Precedence: command line, then `TFC_LIBRARY`, then the config file.
    pub fn resolve_library(&self) -> Option<PathBuf> {
        self.resolve_library_with(std::env::var_os(tfc_runtime::native::LIBRARY_ENV))
    }

    fn resolve_library_with(&self, env: Option<OsString>) -> Option<PathBuf> {
        self.library_override
            .clone()
            .or_else(|| env.filter(|value| !value.is_empty()).map(PathBuf::from))
            .or_else(|| self.library.clone())
    }
}

/// Graph file and the operations the examples feed and fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Serialized GraphDef file.
    pub path: PathBuf,

    /// Operation receiving the input tensor.
    pub input_op: String,

    /// Operation producing the output tensor.
    pub output_op: String,

    /// Use the first and last graph operations as input and output.
    pub infer_io: bool,

    /// Channel order of color images fed to the graph.
    pub channel_order: ChannelOrder,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("graph.pb"),
            input_op: "input_4".to_string(),
            output_op: "output_node0".to_string(),
            infer_io: false,
            channel_order: ChannelOrder::Bgr,
        }
    }
}

/// Session creation settings. GPU and thread settings are exclusive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Fraction of GPU memory the process may allocate, in `(0, 1]`.
    pub gpu_memory_fraction: Option<f64>,

    /// Intra-op thread pool size (0 lets the runtime decide).
    pub intra_op_threads: Option<u8>,

    /// Inter-op thread pool size (0 lets the runtime decide).
    pub inter_op_threads: Option<u8>,
}

impl SessionSettings {
    /// Turn the settings into a session configuration.
    pub fn to_session_config(&self) -> Result<SessionConfig> {
        let threads = self.intra_op_threads.is_some() || self.inter_op_threads.is_some();
        match self.gpu_memory_fraction {
            Some(_) if threads => Err(CoreError::Config(
                "gpu_memory_fraction cannot be combined with thread settings".to_string(),
            )),
            Some(fraction) if !(fraction > 0.0 && fraction <= 1.0) => Err(CoreError::Config(
                format!("gpu_memory_fraction must be in (0, 1], got {fraction}"),
            )),
            Some(fraction) => Ok(SessionConfig::GpuMemoryFraction(fraction)),
            None if threads => Ok(SessionConfig::Threads {
                intra_op: self.intra_op_threads.unwrap_or(0),
                inter_op: self.inter_op_threads.unwrap_or(0),
            }),
            None => Ok(SessionConfig::Default),
        }
    }
}

/// Shape and values of the float input tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub dims: Vec<i64>,
    pub values: Vec<f32>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            dims: SAMPLE_DIMS.to_vec(),
            values: SAMPLE_VALUES.to_vec(),
        }
    }
}

impl InputConfig {
    /// Check that the values exactly fill the shape.
    pub fn validate(&self) -> Result<()> {
        if let Some(d) = self.dims.iter().find(|&&d| d < 0) {
            return Err(CoreError::Config(format!(
                "input dimension {d} is negative"
            )));
        }
        let expected =
            element_count(&self.dims).map_err(|e| CoreError::Config(e.to_string()))?;
        if self.values.len() != expected {
            return Err(CoreError::Config(format!(
                "input has {} values but shape {:?} needs {}",
                self.values.len(),
                self.dims,
                expected
            )));
        }
        Ok(())
    }
}

impl TfcConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| CoreError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| CoreError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = TfcConfig::default();
        assert_eq!(config.graph.path, PathBuf::from("graph.pb"));
        assert_eq!(config.graph.input_op, "input_4");
        assert_eq!(config.graph.output_op, "output_node0");
        assert_eq!(config.input.dims, vec![1, 5, 12]);
        assert_eq!(config.input.values.len(), 60);
        assert!(config.input.validate().is_ok());
        assert_eq!(
            config.session.to_session_config().unwrap(),
            SessionConfig::Default
        );
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: TfcConfig =
            serde_json::from_str(r#"{"graph": {"path": "model.pb"}, "session": {"intra_op_threads": 2}}"#)
                .unwrap();
        assert_eq!(config.graph.path, PathBuf::from("model.pb"));
        assert_eq!(config.graph.input_op, "input_4");
        assert_eq!(
            config.session.to_session_config().unwrap(),
            SessionConfig::Threads {
                intra_op: 2,
                inter_op: 0
            }
        );
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = TfcConfig::default();
        config.runtime.library = Some(PathBuf::from("/opt/tf/libtensorflow.so"));
        config.session.gpu_memory_fraction = Some(0.2);
        config.save(&path).unwrap();

        assert_eq!(TfcConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            TfcConfig::from_file(&path),
            Err(CoreError::Config(_))
        ));
    }

    #[test]
    fn test_gpu_fraction_validation() {
        let mut settings = SessionSettings {
            gpu_memory_fraction: Some(0.2),
            ..Default::default()
        };
        assert_eq!(
            settings.to_session_config().unwrap(),
            SessionConfig::GpuMemoryFraction(0.2)
        );

        settings.gpu_memory_fraction = Some(1.5);
        assert!(settings.to_session_config().is_err());
        settings.gpu_memory_fraction = Some(0.0);
        assert!(settings.to_session_config().is_err());
        settings.gpu_memory_fraction = Some(f64::NAN);
        assert!(settings.to_session_config().is_err());
    }

    #[test]
    fn test_gpu_and_threads_are_exclusive() {
        let settings = SessionSettings {
            gpu_memory_fraction: Some(0.5),
            inter_op_threads: Some(1),
            ..Default::default()
        };
        assert!(matches!(
            settings.to_session_config(),
            Err(CoreError::Config(_))
        ));
    }

    #[test]
    fn test_large_thread_counts_encode_as_varints() {
        let settings = SessionSettings {
            intra_op_threads: Some(128),
            inter_op_threads: Some(127),
            ..Default::default()
        };
        let config = settings.to_session_config().unwrap();
        assert_eq!(
            config.encode().unwrap(),
            vec![0x10, 0x80, 0x01, 0x28, 0x7f]
        );
    }

    #[test]
    fn test_input_validation() {
        let input = InputConfig {
            dims: vec![2, 3],
            values: vec![0.0; 5],
        };
        assert!(input.validate().is_err());

        let input = InputConfig {
            dims: vec![-1, 3],
            values: vec![],
        };
        assert!(input.validate().is_err());
    }

    #[test]
    fn test_input_shape_overflow_is_config_error() {
        let huge = 1i64 << 32;
        let input = InputConfig {
            dims: vec![huge, huge, huge],
            values: vec![],
        };
        assert!(matches!(input.validate(), Err(CoreError::Config(_))));
    }

    #[test]
    fn test_library_resolution() {
        let mut config = RuntimeConfig {
            library: Some(PathBuf::from("/opt/libtensorflow.so")),
            ..Default::default()
        };
        assert_eq!(
            config.resolve_library_with(None),
            Some(PathBuf::from("/opt/libtensorflow.so"))
        );
        assert_eq!(
            config.resolve_library_with(Some(OsString::from("/env/libtensorflow.so"))),
            Some(PathBuf::from("/env/libtensorflow.so"))
        );
        assert_eq!(
            config.resolve_library_with(Some(OsString::new())),
            Some(PathBuf::from("/opt/libtensorflow.so"))
        );
        assert_eq!(RuntimeConfig::default().resolve_library_with(None), None);

        config.library_override = Some(PathBuf::from("/cli/libtensorflow.so"));
        assert_eq!(
            config.resolve_library_with(Some(OsString::from("/env/libtensorflow.so"))),
            Some(PathBuf::from("/cli/libtensorflow.so"))
        );
    }

    #[test]
    fn test_library_override_is_not_saved() {
        let mut config = TfcConfig::default();
        config.runtime.library_override = Some(PathBuf::from("/cli/libtensorflow.so"));
        let json = serde_json::to_value(&config).unwrap();
        assert!(json["runtime"].get("library_override").is_none());
        assert_eq!(json["graph"]["channel_order"], "bgr");
    }
}
