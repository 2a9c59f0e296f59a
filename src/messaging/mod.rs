use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use parking_lot::Mutex;
use rumqttc::{AsyncClient, Event, LastWill, MqttOptions, Packet, QoS};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// QoS a message should be published at. Mirrors the wire value but
/// keeps call sites readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageQos {
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

impl From<MessageQos> for QoS {
    fn from(q: MessageQos) -> Self {
        match q {
            MessageQos::AtMostOnce => QoS::AtMostOnce,
            MessageQos::AtLeastOnce => QoS::AtLeastOnce,
            MessageQos::ExactlyOnce => QoS::ExactlyOnce,
        }
    }
}

#[derive(Debug, Clone)]
struct BufferedMessage {
    topic: String,
    payload: String,
    qos: MessageQos,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagingConfig {
    pub broker_host: String,
    pub broker_port: u16,
    pub client_id: String,
    pub site_id: String,
    pub topic_root: String,
    pub keepalive_secs: u64,
    pub reconnect_min_delay_secs: u64,
    pub reconnect_max_delay_secs: u64,
    pub offline_buffer_size: usize,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            broker_host: "localhost".to_string(),
            broker_port: 1883,
            client_id: "bess-edge".to_string(),
            site_id: "site-001".to_string(),
            topic_root: "bess".to_string(),
            keepalive_secs: 60,
            reconnect_min_delay_secs: 1,
            reconnect_max_delay_secs: 120,
            offline_buffer_size: 1000,
        }
    }
}

/// MQTT client with QoS-differentiated publish, a bounded offline FIFO
/// buffer, and a Last Will and Testament for abrupt-disconnect
/// detection. The connection loop itself runs as a background task
/// (`run`); callers interact through `publish_*` and `is_connected`.
pub struct MessagingClient {
    config: MessagingConfig,
    client: AsyncClient,
    connected: Arc<std::sync::atomic::AtomicBool>,
    offline_buffer: Arc<Mutex<VecDeque<BufferedMessage>>>,
}

impl MessagingClient {
    pub fn new(config: MessagingConfig) -> (Self, rumqttc::EventLoop) {
        let mut opts = MqttOptions::new(&config.client_id, &config.broker_host, config.broker_port);
        opts.set_keep_alive(StdDuration::from_secs(config.keepalive_secs));
        let status_topic = format!("{}/{}/status", config.topic_root, config.site_id);
        opts.set_last_will(LastWill::new(
            &status_topic,
            json!({ "online": false, "site_id": config.site_id }).to_string(),
            QoS::AtLeastOnce,
            true,
        ));
        let (client, eventloop) = AsyncClient::new(opts, 64);
        (
            Self {
                config,
                client,
                connected: Arc::new(std::sync::atomic::AtomicBool::new(false)),
                offline_buffer: Arc::new(Mutex::new(VecDeque::new())),
            },
            eventloop,
        )
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(std::sync::atomic::Ordering::Relaxed)
    }

    fn topic(&self, suffix: &str) -> String {
        format!("{}/{}/{}", self.config.topic_root, self.config.site_id, suffix)
    }

    async fn publish_raw(&self, topic: &str, payload: &str, qos: MessageQos) -> anyhow::Result<()> {
        self.client
            .publish(topic, qos.into(), false, payload.as_bytes())
            .await?;
        Ok(())
    }

    fn buffer(&self, topic: String, payload: String, qos: MessageQos) {
        let mut buf = self.offline_buffer.lock();
        if buf.len() >= self.config.offline_buffer_size {
            buf.pop_front();
        }
        buf.push_back(BufferedMessage { topic, payload, qos });
    }

    /// Telemetry (1 Hz), QoS 0, buffered offline: old telemetry still
    /// has retrospective value for charts, unlike fast telemetry.
    pub async fn publish_telemetry(&self, payload: &str) -> anyhow::Result<()> {
        let topic = self.topic("telemetry");
        if self.is_connected() {
            self.publish_raw(&topic, payload, MessageQos::AtMostOnce).await
        } else {
            self.buffer(topic, payload.to_string(), MessageQos::AtMostOnce);
            Ok(())
        }
    }

    /// High-rate telemetry, QoS 0, never buffered: stale fast data has
    /// no value once the broker catches up.
    pub async fn publish_fast_telemetry(&self, payload: &str) -> anyhow::Result<()> {
        if self.is_connected() {
            let topic = self.topic("telemetry/fast");
            self.publish_raw(&topic, payload, MessageQos::AtMostOnce).await
        } else {
            Ok(())
        }
    }

    pub async fn publish_alarm(&self, payload: &str) -> anyhow::Result<()> {
        let topic = self.topic("alarms");
        if self.is_connected() {
            self.publish_raw(&topic, payload, MessageQos::AtLeastOnce).await
        } else {
            self.buffer(topic, payload.to_string(), MessageQos::AtLeastOnce);
            Ok(())
        }
    }

    pub async fn publish_decision(&self, payload: &str) -> anyhow::Result<()> {
        let topic = self.topic("decisions");
        if self.is_connected() {
            self.publish_raw(&topic, payload, MessageQos::AtLeastOnce).await
        } else {
            self.buffer(topic, payload.to_string(), MessageQos::AtLeastOnce);
            Ok(())
        }
    }

    /// Heartbeat is live-only, like fast telemetry: a buffered
    /// heartbeat from ten minutes ago tells the cloud nothing useful.
    pub async fn publish_heartbeat(&self, grid_state: &str) -> anyhow::Result<()> {
        if self.is_connected() {
            let topic = self.topic("heartbeat");
            let payload = json!({ "site_id": self.config.site_id, "grid_state": grid_state }).to_string();
            self.publish_raw(&topic, &payload, MessageQos::AtMostOnce).await
        } else {
            Ok(())
        }
    }

    pub async fn publish_buffered_payload(&self, topic: &str, payload: &str, qos: MessageQos) -> anyhow::Result<()> {
        self.publish_raw(topic, payload, qos).await
    }

    /// Published once on graceful shutdown, retained, ahead of the LWT
    /// that would otherwise fire only on an abrupt disconnect.
    pub async fn publish_offline_status(&self) -> anyhow::Result<()> {
        let topic = self.topic("status");
        let payload = json!({ "online": false, "site_id": self.config.site_id }).to_string();
        self.client.publish(topic, QoS::AtLeastOnce, true, payload).await?;
        Ok(())
    }

    pub async fn subscribe_commands(&self) -> anyhow::Result<()> {
        self.client.subscribe(self.topic("commands"), QoS::ExactlyOnce).await?;
        Ok(())
    }

    pub async fn subscribe_config(&self) -> anyhow::Result<()> {
        self.client.subscribe(self.topic("config"), QoS::ExactlyOnce).await?;
        Ok(())
    }

    pub async fn subscribe_models(&self) -> anyhow::Result<()> {
        self.client.subscribe(self.topic("models"), QoS::ExactlyOnce).await?;
        Ok(())
    }

    async fn flush_offline_buffer(&self) {
        let drained: Vec<BufferedMessage> = {
            let mut buf = self.offline_buffer.lock();
            buf.drain(..).collect()
        };
        for msg in drained {
            if let Err(e) = self.publish_raw(&msg.topic, &msg.payload, msg.qos).await {
                warn!(error = %e, topic = %msg.topic, "failed to flush buffered message, re-queuing");
                self.buffer(msg.topic, msg.payload, msg.qos);
                break;
            }
        }
    }

    /// Drives the rumqttc event loop: reconnects with doubling backoff,
    /// republishes a retained online status, re-subscribes, and drains
    /// the offline buffer on every successful (re)connect. Intended to
    /// be spawned as its own task; `inbound` receives routed inbound
    /// publishes for the control loop to act on.
    pub async fn run(
        self: Arc<Self>,
        mut eventloop: rumqttc::EventLoop,
        inbound: mpsc::Sender<(String, Vec<u8>)>,
    ) {
        let mut reconnect_delay = self.config.reconnect_min_delay_secs;
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    self.connected.store(true, std::sync::atomic::Ordering::Relaxed);
                    reconnect_delay = self.config.reconnect_min_delay_secs;
                    info!("messaging broker connected");

                    let status_topic = self.topic("status");
                    let payload = json!({ "online": true, "site_id": self.config.site_id }).to_string();
                    if let Err(e) = self.client.publish(&status_topic, QoS::AtLeastOnce, true, payload).await {
                        warn!(error = %e, "failed to publish online status");
                    }
                    let _ = self.subscribe_commands().await;
                    let _ = self.subscribe_config().await;
                    let _ = self.subscribe_models().await;
                    self.flush_offline_buffer().await;
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let _ = inbound.send((publish.topic.clone(), publish.payload.to_vec())).await;
                }
                Ok(Event::Incoming(_)) | Ok(Event::Outgoing(_)) => {}
                Err(e) => {
                    self.connected.store(false, std::sync::atomic::Ordering::Relaxed);
                    error!(error = %e, "messaging connection lost, retrying in {}s", reconnect_delay);
                    tokio::time::sleep(StdDuration::from_secs(reconnect_delay)).await;
                    reconnect_delay = (reconnect_delay * 2).min(self.config.reconnect_max_delay_secs);
                }
            }
        }
    }
}
