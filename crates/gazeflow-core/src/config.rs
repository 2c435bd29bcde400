use crate::action::RecordingKind;
use crate::error::{GazeflowError, Result};
use crate::paths;
use gazeflow_pool::PoolSettings;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

/// Free-form parameters handed through to action workers untouched.
pub type Options = BTreeMap<String, serde_yaml::Value>;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// RecordingDef
// ---------------------------------------------------------------------------

/// One recording every session of the study is expected to contain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingDef {
    pub name: String,
    pub kind: RecordingKind,
}

impl RecordingDef {
    pub fn new(name: impl Into<String>, kind: RecordingKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

// ---------------------------------------------------------------------------
// SyncFunctionRef
// ---------------------------------------------------------------------------

/// Reference to a user-supplied eye-tracker/camera sync function. Only the
/// worker resolves it; the orchestrator just checks that one is configured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncFunctionRef {
    pub path: PathBuf,
    pub function: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: Options,
}

// ---------------------------------------------------------------------------
// MappedVideoConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MappedVideoConfig {
    /// Markers are detected again while rendering, so an earlier
    /// detect_markers run does not invalidate the video.
    #[serde(default)]
    pub redetect_markers: bool,
    #[serde(flatten)]
    pub options: Options,
}

// ---------------------------------------------------------------------------
// WorkerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Executable that performs one action per invocation, reading a JSON
    /// work request on stdin.
    #[serde(default = "default_worker_program")]
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_auto_cleanup")]
    pub auto_cleanup: bool,
}

fn default_worker_program() -> String {
    "gazeflow-worker".to_string()
}

fn default_workers() -> usize {
    PoolSettings::default().workers
}

fn default_auto_cleanup() -> bool {
    true
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            program: default_worker_program(),
            args: Vec::new(),
            workers: default_workers(),
            auto_cleanup: default_auto_cleanup(),
        }
    }
}

impl WorkerConfig {
    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            workers: self.workers.max(1),
            auto_cleanup: self.auto_cleanup,
        }
    }
}

// ---------------------------------------------------------------------------
// StudyConfig (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StudyConfig {
    #[serde(default)]
    pub session_def: Vec<RecordingDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_ref_recording: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_code_sync: Option<Options>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_code_trials: Option<Options>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub et_cam_sync: Option<SyncFunctionRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<Options>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapped_video: Option<MappedVideoConfig>,
    #[serde(default)]
    pub worker: WorkerConfig,
}

impl StudyConfig {
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::study_config_path(root);
        if !path.exists() {
            return Err(GazeflowError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: StudyConfig = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::study_config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    pub fn recording(&self, name: &str) -> Option<&RecordingDef> {
        self.session_def.iter().find(|r| r.name == name)
    }

    pub fn is_sync_ref(&self, recording: &str) -> bool {
        self.sync_ref_recording.as_deref() == Some(recording)
    }

    /// Either form of automatic episode coding is configured.
    pub fn has_auto_coding(&self) -> bool {
        self.auto_code_sync.is_some() || self.auto_code_trials.is_some()
    }

    pub fn redetects_markers_for_mapped_video(&self) -> bool {
        self.mapped_video
            .as_ref()
            .map(|m| m.redetect_markers)
            .unwrap_or(false)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        // 1. Recording names must be usable as directory names and unique
        let mut seen = HashSet::new();
        for rec in &self.session_def {
            if paths::validate_name(&rec.name).is_err() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("invalid recording name '{}' in session_def", rec.name),
                });
            }
            if !seen.insert(rec.name.as_str()) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("recording '{}' is defined more than once", rec.name),
                });
            }
        }

        if self.session_def.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "session_def lists no recordings".to_string(),
            });
        }

        // 2. The sync reference must be one of the defined recordings
        if let Some(reference) = &self.sync_ref_recording {
            if self.recording(reference).is_none() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!(
                        "sync_ref_recording '{reference}' is not defined in session_def"
                    ),
                });
            }
        }

        // 3. Camera sync needs both an eye tracker and a camera to pair
        if self.et_cam_sync.is_some() {
            let has = |kind: RecordingKind| self.session_def.iter().any(|r| r.kind == kind);
            if !has(RecordingKind::EyeTracker) || !has(RecordingKind::Camera) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: "et_cam_sync is configured but session_def lacks an eye tracker \
                              or camera recording"
                        .to_string(),
                });
            }
            if let Some(sync) = &self.et_cam_sync {
                if sync.function.trim().is_empty() {
                    warnings.push(ConfigWarning {
                        level: WarnLevel::Error,
                        message: "et_cam_sync.function is empty".to_string(),
                    });
                }
            }
        }

        // 4. Worker settings
        if self.worker.workers == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "worker.workers is 0; one worker will be used".to_string(),
            });
        }
        if which::which(&self.worker.program).is_err() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "worker program '{}' was not found on PATH",
                    self.worker.program
                ),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
