//! # MQTT control loop
//!
//! [`connect`] builds the client pair: a cloneable [`ControlPublisher`] and a
//! [`ControlLoop`] that owns the event loop. The loop runs on its own task and
//! never touches the worker; it only hands payloads to the registered
//! [`MessageHandler`].
//!
//! ```text
//! ControlLoop::run
//! loop {
//!   poll() ─┬─ ConnAck(ok)  ─► ChannelConnected, failures = 0, subscribe(all topics)
//!           ├─ SubAck       ─► ChannelSubscribed
//!           ├─ Publish      ─► handler.on_message(topic, payload)      (non-blocking)
//!           ├─ Disconnect   ─► ChannelDisconnected
//!           └─ Err(e)       ─► ChannelDisconnected{retry_in}, sleep(backoff.next(failures++))
//! } until token cancelled
//! ```
//!
//! Sessions are clean, so subscriptions are re-issued after every `ConnAck`.

use std::sync::Arc;
use std::time::Duration;

use rumqttc::{
    AsyncClient, ConnectReturnCode, Event as MqttEvent, EventLoop, Outgoing, Packet, SubscribeFilter,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::publish::ControlPublisher;
use super::settings::ControlSettings;
use crate::error::ControlError;
use crate::events::{Bus, Event, EventKind};
use crate::policies::BackoffPolicy;

const REQUEST_CAPACITY: usize = 64;
const DISCONNECT_FLUSH: Duration = Duration::from_millis(500);

/// Receives inbound control messages.
///
/// Called on the control loop's task; implementations must return quickly.
pub trait MessageHandler: Send + Sync + 'static {
    /// One inbound message.
    fn on_message(&self, topic: &str, payload: &[u8]);
}

/// Owner of the broker connection.
pub struct ControlLoop {
    client: AsyncClient,
    eventloop: EventLoop,
    subscriptions: Vec<SubscribeFilter>,
    backoff: BackoffPolicy,
    handler: Option<Arc<dyn MessageHandler>>,
}

/// Creates the publisher and the (not yet running) control loop.
///
/// No network I/O happens until the loop runs.
pub fn connect(settings: &ControlSettings) -> Result<(ControlPublisher, ControlLoop), ControlError> {
    let subscriptions = settings.subscriptions()?;
    let (client, eventloop) = AsyncClient::new(settings.mqtt_options(), REQUEST_CAPACITY);
    let control = ControlLoop {
        client: client.clone(),
        eventloop,
        subscriptions,
        backoff: BackoffPolicy::default(),
        handler: None,
    };
    Ok((ControlPublisher::new(client), control))
}

impl ControlLoop {
    /// Registers the message handler, replacing any previous one.
    #[must_use]
    pub fn on_message(mut self, handler: Arc<dyn MessageHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Overrides the reconnect backoff.
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Runs the loop on a new task.
    pub fn spawn(self, bus: Bus, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(bus, token))
    }

    /// Polls the connection until `token` is cancelled.
    pub async fn run(mut self, bus: Bus, token: CancellationToken) {
        let mut failures: u32 = 0;
        loop {
            let polled = tokio::select! {
                _ = token.cancelled() => break,
                polled = self.eventloop.poll() => polled,
            };

            match polled {
                Ok(MqttEvent::Incoming(Packet::ConnAck(ack))) => {
                    if ack.code == ConnectReturnCode::Success {
                        failures = 0;
                        bus.publish(Event::new(EventKind::ChannelConnected));
                        self.subscribe(&bus);
                    } else {
                        bus.publish(
                            Event::new(EventKind::ChannelDisconnected)
                                .with_reason(format!("connection refused: {:?}", ack.code)),
                        );
                    }
                }
                Ok(MqttEvent::Incoming(Packet::SubAck(_))) => {
                    bus.publish(Event::new(EventKind::ChannelSubscribed));
                }
                Ok(MqttEvent::Incoming(Packet::Publish(msg))) => {
                    if let Some(handler) = &self.handler {
                        handler.on_message(&msg.topic, &msg.payload);
                    }
                }
                Ok(MqttEvent::Incoming(Packet::Disconnect)) => {
                    bus.publish(Event::new(EventKind::ChannelDisconnected).with_reason("broker disconnect"));
                }
                Ok(_) => {}
                Err(e) => {
                    let delay = self.backoff.next(failures);
                    failures = failures.saturating_add(1);
                    bus.publish(
                        Event::new(EventKind::ChannelDisconnected)
                            .with_reason(e.to_string())
                            .with_timeout(delay),
                    );
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
        self.flush_disconnect().await;
    }

    /// Sends a clean DISCONNECT if the connection is up; bounded by [`DISCONNECT_FLUSH`].
    async fn flush_disconnect(&mut self) {
        if self.client.try_disconnect().is_err() {
            return;
        }
        let eventloop = &mut self.eventloop;
        let _ = tokio::time::timeout(DISCONNECT_FLUSH, async {
            loop {
                match eventloop.poll().await {
                    Ok(MqttEvent::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        })
        .await;
    }

    fn subscribe(&self, bus: &Bus) {
        if self.subscriptions.is_empty() {
            return;
        }
        if let Err(e) = self.client.try_subscribe_many(self.subscriptions.clone()) {
            bus.publish(
                Event::new(EventKind::ChannelDisconnected)
                    .with_reason(format!("subscribe failed: {e}"))
                    .with_label(ControlError::from(e).as_label()),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigDocument;
    use crate::policies::JitterPolicy;

    #[tokio::test]
    async fn unreachable_broker_backs_off_and_stops_on_cancel() {
        let doc = ConfigDocument::parse(
            br#"{"main":{"mqtt_host":"127.0.0.1","mqtt_port":1,"mqtt_topics":["cfg"]}}"#,
        )
        .unwrap();
        let settings = ControlSettings::from_document(&doc).unwrap();
        let (_publisher, control) = connect(&settings).unwrap();

        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let token = CancellationToken::new();
        let handle = control
            .with_backoff(BackoffPolicy {
                first: Duration::from_millis(20),
                max: Duration::from_millis(20),
                factor: 1.0,
                jitter: JitterPolicy::None,
            })
            .spawn(bus.clone(), token.clone());

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::ChannelDisconnected);
        assert_eq!(ev.timeout_ms, Some(20));

        token.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
