//! Outbound side of the control channel.

use std::sync::Arc;

use async_trait::async_trait;
use rumqttc::{AsyncClient, QoS};

use crate::error::ControlError;
use crate::subscribers::{Report, ReportSink};

/// Publishes payloads to the broker.
#[async_trait]
pub trait Publish: Send + Sync + 'static {
    /// Queues one message for delivery. Must not wait for the broker.
    async fn publish(&self, topic: &str, qos: QoS, payload: Vec<u8>) -> Result<(), ControlError>;
}

/// [`Publish`] over the MQTT client.
///
/// Requests are queued without waiting, so a stalled connection drops
/// messages instead of back-pressuring subscribers.
#[derive(Clone)]
pub struct ControlPublisher {
    client: AsyncClient,
}

impl ControlPublisher {
    pub(crate) fn new(client: AsyncClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Publish for ControlPublisher {
    async fn publish(&self, topic: &str, qos: QoS, payload: Vec<u8>) -> Result<(), ControlError> {
        self.client.try_publish(topic, qos, false, payload)?;
        Ok(())
    }
}

/// [`ReportSink`] publishing JSON reports to a topic.
pub struct TopicSink {
    publisher: Arc<dyn Publish>,
    topic: String,
}

impl TopicSink {
    /// Creates a sink publishing at QoS 1.
    pub fn new(publisher: Arc<dyn Publish>, topic: impl Into<String>) -> Self {
        Self {
            publisher,
            topic: topic.into(),
        }
    }
}

#[async_trait]
impl ReportSink for TopicSink {
    async fn report(&self, report: &Report) -> Result<(), String> {
        let payload = serde_json::to_vec(report).map_err(|e| e.to_string())?;
        self.publisher
            .publish(&self.topic, QoS::AtLeastOnce, payload)
            .await
            .map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Event, EventKind};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(String, QoS, Vec<u8>)>>);

    #[async_trait]
    impl Publish for Recorder {
        async fn publish(&self, topic: &str, qos: QoS, payload: Vec<u8>) -> Result<(), ControlError> {
            self.0.lock().unwrap().push((topic.into(), qos, payload));
            Ok(())
        }
    }

    #[tokio::test]
    async fn reports_are_json_on_the_report_topic() {
        let rec = Arc::new(Recorder::default());
        let sink = TopicSink::new(rec.clone(), "devices/pi-1/reports");
        let ev = Event::new(EventKind::WorkerStartFailed)
            .with_worker("camera/unknown")
            .with_label("worker_unknown_variant")
            .with_reason("no implementation registered");

        sink.report(&Report::from_event(&ev)).await.unwrap();

        let seen = rec.0.lock().unwrap();
        assert_eq!(seen[0].0, "devices/pi-1/reports");
        assert_eq!(seen[0].1, QoS::AtLeastOnce);
        let json: serde_json::Value = serde_json::from_slice(&seen[0].2).unwrap();
        assert_eq!(json["label"], "worker_unknown_variant");
        assert_eq!(json["step"], "start");
        assert_eq!(json["worker"], "camera/unknown");
    }
}
