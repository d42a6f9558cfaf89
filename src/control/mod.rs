//! MQTT control channel.
//!
//! ## Contents
//! - [`ControlSettings`], [`TopicSpec`] broker and topic settings from the `main` subtree
//! - [`connect`], [`ControlLoop`], [`MessageHandler`] inbound messages
//! - [`Publish`], [`ControlPublisher`], [`TopicSink`] outbound detections and reports

mod client;
mod publish;
mod settings;

pub use client::{ControlLoop, MessageHandler, connect};
pub use publish::{ControlPublisher, Publish, TopicSink};
pub use settings::{ControlSettings, SECTION, TopicSpec, qos_from_level};
