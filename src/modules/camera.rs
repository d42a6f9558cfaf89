//! `camera/yolo`: object detection through an external detector program.
//!
//! Inference runs in a separate program (the `detector` setting) so the agent
//! stays free of model runtimes. The detector gets `MODEL_PATH` in its
//! environment and prints one JSON object per detection:
//!
//! ```text
//! {"label":"person","confidence":0.91,"bbox":[12,40,64,180]}
//! ```
//!
//! Detections under `min_confidence`, or outside `labels` when that list is
//! set, are dropped. The rest are emitted as [`Detection::Object`] lines.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::error::WorkerError;
use crate::modules::Detection;
use crate::worker::{Emit, Module, terminate_child};

const DETECTOR_GRACE: Duration = Duration::from_secs(5);

/// `camera` settings subtree.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct CameraSettings {
    /// Detector executable.
    #[serde(alias = "DETECTOR")]
    pub detector: String,
    /// Extra detector arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// Model directory, passed as `MODEL_PATH`.
    #[serde(default, alias = "MODEL_PATH")]
    pub model_path: Option<String>,
    /// Weak detections below this score are dropped.
    #[serde(default = "default_min_confidence", alias = "MIN_CONFIDENCE")]
    pub min_confidence: f32,
    /// Labels to keep; empty keeps all.
    #[serde(default)]
    pub labels: Vec<String>,
}

fn default_min_confidence() -> f32 {
    0.6
}

#[derive(Deserialize)]
struct RawDetection {
    label: String,
    confidence: f32,
    #[serde(default)]
    bbox: Option<[i32; 4]>,
}

/// Camera object detector.
pub struct ObjectDetector {
    settings: CameraSettings,
}

impl ObjectDetector {
    /// Creates the detector module.
    pub fn new(settings: CameraSettings) -> Self {
        Self { settings }
    }

    /// Filters one detector output line.
    pub fn accept(&self, line: &str) -> Option<Detection> {
        let raw: RawDetection = serde_json::from_str(line.trim()).ok()?;
        if raw.confidence < self.settings.min_confidence {
            return None;
        }
        if !self.settings.labels.is_empty() && !self.settings.labels.contains(&raw.label) {
            return None;
        }
        Some(Detection::Object {
            label: raw.label,
            confidence: raw.confidence,
            bbox: raw.bbox,
        })
    }
}

#[async_trait]
impl Module for ObjectDetector {
    fn name(&self) -> &str {
        "camera/yolo"
    }

    async fn run(&self, ctx: CancellationToken, out: &dyn Emit) -> Result<(), WorkerError> {
        let detector = &self.settings.detector;
        let mut cmd = Command::new(detector);
        cmd.args(&self.settings.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(model) = &self.settings.model_path {
            cmd.env("MODEL_PATH", model);
        }
        let mut child = cmd
            .spawn()
            .map_err(|e| WorkerError::failed(format!("{detector}: {e}")))?;
        log::info!(target: "edgevisor::camera", "detector '{detector}' started");

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| WorkerError::failed("detector stdout unavailable"))?;
        let mut lines = BufReader::new(stdout).lines();

        let result = loop {
            tokio::select! {
                _ = ctx.cancelled() => break Ok(()),
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        if let Some(d) = self.accept(&line) {
                            out.emit(&d.to_line());
                        }
                    }
                    Ok(None) => break Err(WorkerError::failed(format!("detector '{detector}' exited"))),
                    Err(e) => break Err(WorkerError::failed(format!("detector read failed: {e}"))),
                }
            }
        };

        terminate_child(&mut child, detector, DETECTOR_GRACE).await;
        result
    }
}
