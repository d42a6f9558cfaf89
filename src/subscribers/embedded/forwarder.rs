//! # DetectionForwarder: relays worker detections to the broker
//!
//! Workers print one JSON object per detection on stdout. The process backend
//! turns each line into a [`EventKind::WorkerOutput`] event; this subscriber
//! picks the stdout lines that parse as JSON objects and publishes them
//! verbatim to the configured detection topic. Anything else (diagnostics,
//! stderr) is ignored here and left to the [`LogWriter`](super::LogWriter).

use std::sync::Arc;

use async_trait::async_trait;
use rumqttc::QoS;

use crate::control::Publish;
use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Publishes worker detection lines to a topic.
pub struct DetectionForwarder {
    publisher: Arc<dyn Publish>,
    topic: String,
    qos: QoS,
}

impl DetectionForwarder {
    /// Creates a forwarder publishing at QoS 0.
    #[must_use]
    pub fn new(publisher: Arc<dyn Publish>, topic: impl Into<String>) -> Self {
        Self {
            publisher,
            topic: topic.into(),
            qos: QoS::AtMostOnce,
        }
    }

    /// Overrides the publish QoS.
    #[must_use]
    pub fn with_qos(mut self, qos: QoS) -> Self {
        self.qos = qos;
        self
    }

    fn detection_line(ev: &Event) -> Option<&str> {
        if ev.kind != EventKind::WorkerOutput || ev.topic.as_deref() != Some("stdout") {
            return None;
        }
        let line = ev.reason.as_deref()?.trim();
        match serde_json::from_str::<serde_json::Value>(line) {
            Ok(v) if v.is_object() => Some(line),
            _ => None,
        }
    }
}

#[async_trait]
impl Subscribe for DetectionForwarder {
    async fn on_event(&self, ev: &Event) {
        let Some(line) = Self::detection_line(ev) else {
            return;
        };
        if let Err(e) = self
            .publisher
            .publish(&self.topic, self.qos, line.as_bytes().to_vec())
            .await
        {
            log::debug!(target: "edgevisor", "detection not forwarded to '{}': {e}", self.topic);
        }
    }

    fn name(&self) -> &'static str {
        "DetectionForwarder"
    }

    fn queue_capacity(&self) -> usize {
        4096
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ControlError;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(String, Vec<u8>)>>);

    #[async_trait]
    impl Publish for Recorder {
        async fn publish(&self, topic: &str, _qos: QoS, payload: Vec<u8>) -> Result<(), ControlError> {
            self.0.lock().unwrap().push((topic.to_string(), payload));
            Ok(())
        }
    }

    fn output(stream: &str, line: &str) -> Event {
        Event::new(EventKind::WorkerOutput)
            .with_worker("wifi/native")
            .with_generation(1)
            .with_topic(stream)
            .with_reason(line)
    }

    #[tokio::test]
    async fn forwards_only_json_objects_from_stdout() {
        let rec = Arc::new(Recorder::default());
        let fwd = DetectionForwarder::new(rec.clone(), "devices/pi-1/detections");

        fwd.on_event(&output("stdout", r#"{"kind":"probe","mac":"aa:bb:cc:dd:ee:ff","rssi":-40}"#))
            .await;
        fwd.on_event(&output("stdout", "monitor mode enabled on wlan0")).await;
        fwd.on_event(&output("stderr", r#"{"kind":"probe"}"#)).await;
        fwd.on_event(&output("stdout", "[1,2,3]")).await;

        let seen = rec.0.lock().unwrap().clone();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "devices/pi-1/detections");
        assert!(seen[0].1.starts_with(b"{\"kind\":\"probe\""));
    }
}
