//! Outbound alert delivery.
//!
//! Transports implement `Notifier`; failures surface as `Err` at this
//! boundary and the caller logs and continues. Delivery is bounded by the
//! configured timeout so a dead endpoint delays, but never deadlocks, the
//! frame loop. Nothing here rolls back cooldown state or persisted
//! evidence.

use anyhow::{anyhow, Context, Result};
use rumqttc::v5::{mqttbytes::QoS, Client, Connection, Event, MqttOptions};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

use crate::config::NotifySettings;
use crate::now_s;

pub trait Notifier: Send {
    fn name(&self) -> &'static str;

    fn deliver(&mut self, snapshot: &Path, message: &str) -> Result<()>;
}

/// Build the configured transports. An unconfigured channel is simply
/// absent; an empty vector means alerts are persist-only.
pub fn build_notifiers(settings: &NotifySettings) -> Vec<Box<dyn Notifier>> {
    let mut notifiers: Vec<Box<dyn Notifier>> = Vec::new();
    if let Some(webhook_url) = &settings.webhook_url {
        notifiers.push(Box::new(WebhookNotifier::new(
            webhook_url.clone(),
            settings.timeout,
        )));
    }
    if let Some(mqtt_addr) = &settings.mqtt_addr {
        match MqttNotifier::new(mqtt_addr, settings.mqtt_topic.clone()) {
            Ok(notifier) => notifiers.push(Box::new(notifier)),
            Err(e) => log::warn!("mqtt notifier disabled: {}", e),
        }
    }
    notifiers
}

// ----------------------------------------------------------------------------
// Webhook
// ----------------------------------------------------------------------------

/// Posts the snapshot JPEG to a configured URL with the alert message as a
/// `caption` query parameter.
pub struct WebhookNotifier {
    url: String,
    agent: ureq::Agent,
}

impl WebhookNotifier {
    pub fn new(url: String, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self { url, agent }
    }
}

impl Notifier for WebhookNotifier {
    fn name(&self) -> &'static str {
        "webhook"
    }

    fn deliver(&mut self, snapshot: &Path, message: &str) -> Result<()> {
        let jpeg = std::fs::read(snapshot)
            .with_context(|| format!("failed to read snapshot {}", snapshot.display()))?;
        let mut url = url::Url::parse(&self.url)
            .with_context(|| format!("invalid webhook url '{}'", self.url))?;
        url.query_pairs_mut().append_pair("caption", message);

        let response = self
            .agent
            .post(url.as_str())
            .set("Content-Type", "image/jpeg")
            .send_bytes(&jpeg)
            .map_err(|e| anyhow!("webhook delivery failed: {}", e))?;
        log::debug!("webhook delivered, status {}", response.status());
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// MQTT
// ----------------------------------------------------------------------------

#[derive(Serialize)]
struct AlertPayload<'a> {
    message: &'a str,
    snapshot_path: &'a str,
    timestamp: u64,
}

/// Publishes alerts to an MQTT topic with QoS 1.
///
/// The connection event loop drains on a background thread; publish calls
/// enqueue and return, so a slow broker does not stall the frame loop past
/// the client's internal bounds.
pub struct MqttNotifier {
    client: Client,
    topic: String,
    drain_handle: Option<std::thread::JoinHandle<()>>,
}

impl MqttNotifier {
    pub fn new(broker_addr: &str, topic: String) -> Result<Self> {
        let (host, port) = split_host_port(broker_addr)?;
        let mut options = MqttOptions::new("sentinel-notifier", host, port);
        options.set_keep_alive(Duration::from_secs(30));
        let (client, connection) = Client::new(options, 10);
        let drain_handle = Some(spawn_drain(connection));
        Ok(Self {
            client,
            topic,
            drain_handle,
        })
    }
}

fn spawn_drain(mut connection: Connection) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        for event in connection.iter() {
            match event {
                Ok(Event::Incoming(_)) | Ok(Event::Outgoing(_)) => {}
                Err(e) => {
                    log::warn!("mqtt connection error: {}", e);
                    break;
                }
            }
        }
    })
}

fn split_host_port(addr: &str) -> Result<(String, u16)> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("mqtt address '{}' must be host:port", addr))?;
    let port: u16 = port
        .parse()
        .map_err(|_| anyhow!("mqtt address '{}' has an invalid port", addr))?;
    if host.is_empty() {
        return Err(anyhow!("mqtt address '{}' has an empty host", addr));
    }
    Ok((host.to_string(), port))
}

impl Notifier for MqttNotifier {
    fn name(&self) -> &'static str {
        "mqtt"
    }

    fn deliver(&mut self, snapshot: &Path, message: &str) -> Result<()> {
        let payload = AlertPayload {
            message,
            snapshot_path: &snapshot.to_string_lossy(),
            timestamp: now_s()?,
        };
        let body = serde_json::to_vec(&payload)?;
        self.client
            .publish(self.topic.as_str(), QoS::AtLeastOnce, false, body)
            .map_err(|e| anyhow!("mqtt publish failed: {}", e))?;
        Ok(())
    }
}

impl Drop for MqttNotifier {
    fn drop(&mut self) {
        let _ = self.client.disconnect();
        if let Some(handle) = self.drain_handle.take() {
            let _ = handle.join();
        }
    }
}
