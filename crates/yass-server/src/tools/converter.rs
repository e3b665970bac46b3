//! Voice conversion with a trained RVC model, optionally mixed back over
//! the accompaniment with ffmpeg.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, instrument};

use super::config::ToolsConfig;
use super::process::{run_command, tokio_command};
use super::trainer::F0_METHODS;
use super::ToolError;

pub const CONVERTED_FILE: &str = "converted_vocals.wav";
pub const MIX_FILE: &str = "converted_mix.wav";

/// A published object used as conversion input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    pub bucket: String,
    pub object_name: String,
}

impl StoredObject {
    fn validate(&self, field: &str) -> Result<(), ToolError> {
        for part in [&self.bucket, &self.object_name] {
            if part.is_empty() || part.contains(['/', '\\']) || part == "." || part == ".." {
                return Err(ToolError::InvalidInput(format!(
                    "{} must name a bucket and object",
                    field
                )));
            }
        }
        Ok(())
    }

    /// Extension of the object, for the local copy
    pub fn extension(&self) -> Option<&str> {
        Path::new(&self.object_name).extension()?.to_str()
    }
}

/// What to convert, with which model, and how
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionParams {
    pub vocals: StoredObject,
    /// Mixed back under the converted vocals when present
    #[serde(default)]
    pub accompaniment: Option<StoredObject>,
    pub model: StoredObject,
    #[serde(default)]
    pub index: Option<StoredObject>,
    /// Semitones
    #[serde(default)]
    pub pitch: i32,
    #[serde(default = "default_index_rate")]
    pub index_rate: f64,
    #[serde(default = "default_f0_method")]
    pub f0_method: String,
}

fn default_index_rate() -> f64 {
    0.7
}
fn default_f0_method() -> String {
    "rmvpe".to_string()
}

impl ConversionParams {
    pub fn validate(&self) -> Result<(), ToolError> {
        self.vocals.validate("vocals")?;
        self.model.validate("model")?;
        if let Some(accompaniment) = &self.accompaniment {
            accompaniment.validate("accompaniment")?;
        }
        if let Some(index) = &self.index {
            index.validate("index")?;
        }
        if !(-24..=24).contains(&self.pitch) {
            return Err(ToolError::InvalidInput(
                "pitch must be between -24 and 24".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.index_rate) {
            return Err(ToolError::InvalidInput(
                "index_rate must be between 0 and 1".to_string(),
            ));
        }
        if !F0_METHODS.contains(&self.f0_method.as_str()) {
            return Err(ToolError::InvalidInput(format!(
                "f0_method must be one of {:?}",
                F0_METHODS
            )));
        }
        Ok(())
    }
}

/// Local copies of the conversion inputs
#[derive(Debug, Clone)]
pub struct ConversionInputs {
    pub vocals: PathBuf,
    pub model: PathBuf,
    pub index: Option<PathBuf>,
}

#[async_trait]
pub trait VoiceConverter: Send + Sync {
    /// Convert the vocal track into `out_dir`, returning the converted file
    async fn convert(
        &self,
        params: &ConversionParams,
        inputs: &ConversionInputs,
        out_dir: &Path,
    ) -> Result<PathBuf, ToolError>;

    /// Lay `vocals` over `accompaniment` into `out_dir`
    async fn mix(
        &self,
        vocals: &Path,
        accompaniment: &Path,
        out_dir: &Path,
    ) -> Result<PathBuf, ToolError>;
}

/// RVC `infer.py` for conversion, ffmpeg `amix` for the mix
pub struct RvcConverter {
    python: String,
    scripts_dir: PathBuf,
    ffmpeg_bin: String,
    timeout: Duration,
}

impl RvcConverter {
    pub fn new(config: &ToolsConfig) -> Self {
        Self {
            python: config.trainer_python.clone(),
            scripts_dir: config.trainer_scripts_dir.clone(),
            ffmpeg_bin: config.ffmpeg_bin.clone(),
            timeout: Duration::from_secs(config.conversion_timeout_secs),
        }
    }
}

/// Positional arguments of `infer.py`.
///
/// The script reads its argv by position, so a negative pitch is a value
/// and never an option.
pub fn infer_args(
    params: &ConversionParams,
    inputs: &ConversionInputs,
    output: &Path,
) -> Vec<OsString> {
    let index = inputs
        .index
        .as_ref()
        .map(|p| p.as_os_str().to_os_string())
        .unwrap_or_default();
    vec![
        params.pitch.to_string().into(),
        // filter radius
        "3".into(),
        params.index_rate.to_string().into(),
        // hop length
        "128".into(),
        params.f0_method.clone().into(),
        inputs.vocals.as_os_str().to_os_string(),
        output.as_os_str().to_os_string(),
        inputs.model.as_os_str().to_os_string(),
        index,
        // split audio
        "False".into(),
        // f0 autotune
        "False".into(),
        // rms mix rate
        "1.0".into(),
        // protect
        "0.33".into(),
        // clean audio
        "False".into(),
        // clean strength
        "0.7".into(),
        "WAV".into(),
    ]
}

pub fn mix_args(vocals: &Path, accompaniment: &Path, output: &Path) -> Vec<OsString> {
    vec![
        "-y".into(),
        "-i".into(),
        vocals.as_os_str().to_os_string(),
        "-i".into(),
        accompaniment.as_os_str().to_os_string(),
        "-filter_complex".into(),
        "amix=inputs=2:duration=longest".into(),
        output.as_os_str().to_os_string(),
    ]
}

async fn require_output(tool: &str, path: &Path) -> Result<(), ToolError> {
    let size = match tokio::fs::metadata(path).await {
        Ok(meta) => meta.len(),
        Err(_) => 0,
    };
    if size == 0 {
        return Err(ToolError::failed(tool, "no audio produced"));
    }
    Ok(())
}

#[async_trait]
impl VoiceConverter for RvcConverter {
    #[instrument(skip(self, params, inputs), fields(pitch = params.pitch))]
    async fn convert(
        &self,
        params: &ConversionParams,
        inputs: &ConversionInputs,
        out_dir: &Path,
    ) -> Result<PathBuf, ToolError> {
        params.validate()?;

        let output_path = out_dir.join(CONVERTED_FILE);
        let mut cmd = tokio_command(&self.python);
        cmd.arg(self.scripts_dir.join("infer").join("infer.py"))
            .args(infer_args(params, inputs, &output_path));

        let output = run_command("infer", &mut cmd, Some(self.timeout)).await?;
        if !output.status.success() {
            return Err(ToolError::failed("infer", output.failure_summary()));
        }
        require_output("infer", &output_path).await?;

        info!(elapsed_secs = output.duration.as_secs(), "Conversion complete");
        Ok(output_path)
    }

    #[instrument(skip(self))]
    async fn mix(
        &self,
        vocals: &Path,
        accompaniment: &Path,
        out_dir: &Path,
    ) -> Result<PathBuf, ToolError> {
        let output_path = out_dir.join(MIX_FILE);
        let mut cmd = tokio_command(&self.ffmpeg_bin);
        cmd.args(mix_args(vocals, accompaniment, &output_path));

        let output = run_command("ffmpeg", &mut cmd, Some(self.timeout)).await?;
        if !output.status.success() {
            return Err(ToolError::failed("ffmpeg", output.failure_summary()));
        }
        require_output("ffmpeg", &output_path).await?;

        info!("Mix complete");
        Ok(output_path)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params() -> ConversionParams {
        serde_json::from_value(json!({
            "vocals": {"bucket": "separation-bucket", "object_name": "20260101T000000Z-abc-vocals.wav"},
            "model": {"bucket": "training-bucket", "object_name": "20260101T000000Z-def-minji.pth"}
        }))
        .unwrap()
    }

    fn inputs(index: Option<&str>) -> ConversionInputs {
        ConversionInputs {
            vocals: PathBuf::from("/ws/vocals.wav"),
            model: PathBuf::from("/ws/model.pth"),
            index: index.map(PathBuf::from),
        }
    }

    #[test]
    fn test_defaults_fill_in() {
        let p = params();
        assert_eq!(p.pitch, 0);
        assert_eq!(p.index_rate, 0.7);
        assert_eq!(p.f0_method, "rmvpe");
        assert!(p.accompaniment.is_none());
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut p = params();
        p.pitch = -25;
        assert!(p.validate().is_err());

        let mut p = params();
        p.index_rate = 1.5;
        assert!(p.validate().is_err());

        let mut p = params();
        p.index_rate = f64::NAN;
        assert!(p.validate().is_err());

        let mut p = params();
        p.model.object_name = "../weights.pth".to_string();
        assert!(matches!(p.validate(), Err(ToolError::InvalidInput(_))));

        let mut p = params();
        p.accompaniment = Some(StoredObject {
            bucket: String::new(),
            object_name: "x.wav".to_string(),
        });
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_infer_args_are_positional() {
        let mut p = params();
        p.pitch = -3;
        let args = infer_args(&p, &inputs(Some("/ws/model.index")), Path::new("/ws/out.wav"));

        assert_eq!(args.len(), 16);
        assert_eq!(args[0], "-3");
        assert_eq!(args[2], "0.7");
        assert_eq!(args[4], "rmvpe");
        assert_eq!(args[5], "/ws/vocals.wav");
        assert_eq!(args[6], "/ws/out.wav");
        assert_eq!(args[7], "/ws/model.pth");
        assert_eq!(args[8], "/ws/model.index");
        assert_eq!(args[15], "WAV");

        let args = infer_args(&p, &inputs(None), Path::new("/ws/out.wav"));
        assert_eq!(args[8], "");
    }

    #[test]
    fn test_mix_args() {
        let args = mix_args(
            Path::new("/ws/converted_vocals.wav"),
            Path::new("/ws/accompaniment.wav"),
            Path::new("/ws/converted_mix.wav"),
        );
        assert_eq!(args[6], "amix=inputs=2:duration=longest");
        assert_eq!(args.last().unwrap(), "/ws/converted_mix.wav");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_silent_engine_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let converter = RvcConverter {
            python: "true".to_string(),
            scripts_dir: PathBuf::from("rvc"),
            ffmpeg_bin: "true".to_string(),
            timeout: Duration::from_secs(5),
        };

        let err = converter
            .convert(&params(), &inputs(None), dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Failed { ref tool, .. } if tool == "infer"));

        let err = converter
            .mix(Path::new("a.wav"), Path::new("b.wav"), dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Failed { ref tool, .. } if tool == "ffmpeg"));
    }
}
