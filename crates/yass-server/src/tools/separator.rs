use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use super::config::ToolsConfig;
use super::ToolError;

pub const VOCALS_FILE: &str = "vocals.wav";
pub const ACCOMPANIMENT_FILE: &str = "accompaniment.wav";

/// A loaded 2-stem separation model. Calls are blocking.
pub trait SeparationModel: Send {
    /// Write `<out_dir>/<input stem>/{vocals,accompaniment}.wav`
    fn separate(&mut self, input: &Path, out_dir: &Path) -> Result<(), ToolError>;
}

pub type ModelFactory =
    Arc<dyn Fn() -> Result<Box<dyn SeparationModel>, ToolError> + Send + Sync>;

/// The two stems of a separated track
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stems {
    /// Directory holding both stems, named after the input file
    pub name: String,
    pub vocals: PathBuf,
    pub accompaniment: PathBuf,
}

/// Runs separations one at a time against a lazily created, reused model.
///
/// Clones share the same model slot, so a single `Separator` built at startup
/// serializes every separation in the process.
#[derive(Clone)]
pub struct Separator {
    model: Arc<Mutex<Option<Box<dyn SeparationModel>>>>,
    factory: ModelFactory,
}

impl Separator {
    pub fn new(factory: ModelFactory) -> Self {
        Self {
            model: Arc::new(Mutex::new(None)),
            factory,
        }
    }

    /// Separator backed by the spleeter CLI
    pub fn spleeter(config: &ToolsConfig) -> Self {
        let bin = config.spleeter_bin.clone();
        let model = config.spleeter_model.clone();
        Self::new(Arc::new(move || {
            Ok::<_, ToolError>(Box::new(SpleeterCli {
                bin: bin.clone(),
                model: model.clone(),
            }) as Box<dyn SeparationModel>)
        }))
    }

    pub fn is_loaded(&self) -> bool {
        self.model.lock().is_some()
    }

    #[instrument(skip(self), fields(input = %input.display()))]
    pub async fn separate(&self, input: &Path, out_dir: &Path) -> Result<Stems, ToolError> {
        let name = input
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| ToolError::InvalidInput(format!("bad input path {}", input.display())))?
            .to_string();

        let slot = self.model.clone();
        let factory = self.factory.clone();
        let input_owned = input.to_path_buf();
        let out_owned = out_dir.to_path_buf();

        tokio::task::spawn_blocking(move || {
            let mut slot = slot.lock();
            if slot.is_none() {
                info!("Loading separation model");
                *slot = Some(factory()?);
            }
            let Some(model) = slot.as_mut() else {
                return Err(ToolError::SeparationFailed("model unavailable".to_string()));
            };
            model.separate(&input_owned, &out_owned)
        })
        .await
        .map_err(|e| ToolError::SeparationFailed(format!("separation task failed: {}", e)))??;

        let stem_dir = out_dir.join(&name);
        let stems = Stems {
            vocals: stem_dir.join(VOCALS_FILE),
            accompaniment: stem_dir.join(ACCOMPANIMENT_FILE),
            name,
        };

        for path in [&stems.vocals, &stems.accompaniment] {
            if !tokio::fs::try_exists(path).await? {
                return Err(ToolError::SeparationFailed(format!(
                    "expected stem missing: {}",
                    path.display()
                )));
            }
        }

        debug!(name = %stems.name, "Separation produced both stems");
        Ok(stems)
    }
}

/// `spleeter separate -p <model> -c wav -o <out_dir> <input>`
struct SpleeterCli {
    bin: String,
    model: String,
}

impl SeparationModel for SpleeterCli {
    fn separate(&mut self, input: &Path, out_dir: &Path) -> Result<(), ToolError> {
        let output = std::process::Command::new(&self.bin)
            .args(["separate", "-p", &self.model, "-c", "wav", "-o"])
            .arg(out_dir)
            .arg(input)
            .stdin(std::process::Stdio::null())
            .output()
            .map_err(|e| ToolError::failed("spleeter", format!("failed to spawn: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let summary = stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .unwrap_or("no output")
                .trim()
                .to_string();
            return Err(ToolError::SeparationFailed(summary));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingModel {
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
        write_stems: bool,
    }

    impl SeparationModel for CountingModel {
        fn separate(&mut self, input: &Path, out_dir: &Path) -> Result<(), ToolError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(20));

            if self.write_stems {
                let dir = out_dir.join(input.file_stem().unwrap());
                std::fs::create_dir_all(&dir).unwrap();
                std::fs::write(dir.join(VOCALS_FILE), b"v").unwrap();
                std::fs::write(dir.join(ACCOMPANIMENT_FILE), b"a").unwrap();
            }

            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn counting_separator(write_stems: bool) -> (Separator, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let loads = Arc::new(AtomicUsize::new(0));
        let (a, p, l) = (active.clone(), peak.clone(), loads.clone());
        let separator = Separator::new(Arc::new(move || {
            l.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ToolError>(Box::new(CountingModel {
                active: a.clone(),
                peak: p.clone(),
                write_stems,
            }) as Box<dyn SeparationModel>)
        }));
        (separator, peak, loads)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_separations_never_overlap() {
        let (separator, peak, loads) = counting_separator(true);
        let dir = tempfile::tempdir().unwrap();

        let mut tasks = Vec::new();
        for i in 0..6 {
            let separator = separator.clone();
            let out = dir.path().join(format!("ws-{}", i));
            std::fs::create_dir_all(&out).unwrap();
            let input = out.join("input.mp3");
            std::fs::write(&input, b"mp3").unwrap();
            tasks.push(tokio::spawn(async move {
                separator.separate(&input, &out).await
            }));
        }

        for task in futures::future::join_all(tasks).await {
            let stems = task.unwrap().unwrap();
            assert_eq!(stems.name, "input");
            assert!(stems.vocals.ends_with("input/vocals.wav"));
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(separator.is_loaded());
    }

    #[tokio::test]
    async fn test_missing_stems_is_separation_failure() {
        let (separator, _, _) = counting_separator(false);
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.mp3");
        std::fs::write(&input, b"mp3").unwrap();

        let err = separator.separate(&input, dir.path()).await.unwrap_err();
        assert!(matches!(err, ToolError::SeparationFailed(_)));
    }

    #[tokio::test]
    async fn test_factory_error_propagates() {
        let separator = Separator::new(Arc::new(|| {
            Err::<Box<dyn SeparationModel>, _>(ToolError::failed(
                "spleeter",
                "model weights missing",
            ))
        }));
        let dir = tempfile::tempdir().unwrap();
        let err = separator
            .separate(&dir.path().join("input.mp3"), dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Failed { .. }));
        assert!(!separator.is_loaded());
    }
}
