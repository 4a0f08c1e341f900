use crate::config::MqttConfig;
use crate::queue::{EventReceiver, EventSender, EventSink};
use crate::remote::hlo::HloFrame;
use crate::remote::HloError;
use crate::vscp::{Guid, VscpEvent};
use log::{debug, error, info};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::time::Duration;

pub fn event_topic(prefix: &str, event: &VscpEvent) -> String {
    format!("{}/event/{}/{}", prefix, event.vscp_class, event.vscp_type)
}

pub fn command_topic(prefix: &str) -> String {
    format!("{}/command", prefix)
}

/// Wraps a JSON command payload into an HLO command event addressed to `guid`.
pub fn command_to_event(payload: &[u8], guid: Guid) -> Result<VscpEvent, HloError> {
    let json = serde_json::from_slice(payload).map_err(|e| HloError::Json(e.to_string()))?;
    HloFrame { guid, json }.into_command_event(guid)
}

/// Publishes receive queue events and feeds command payloads into the send queue.
pub struct MqttManager {
    client: AsyncClient,
    topic: String,
    receiver: EventReceiver,
}

impl MqttManager {
    pub fn new(config: &MqttConfig, receiver: EventReceiver, send_queue: EventSender, guid: Guid) -> Self {
        info!("MQTT connection starting up");
        let mut mqttoptions = MqttOptions::new(config.client_name.clone(), config.host.clone(), config.port);
        mqttoptions.set_keep_alive(Duration::from_secs(5));
        if !config.user.is_empty() {
            mqttoptions.set_credentials(config.user.clone(), config.pass.clone());
        }

        let (client, mut eventloop) = AsyncClient::new(mqttoptions, 10);

        // Spawn a new task to handle the incoming commands
        let reconnect_c = client.clone();
        let cmd_topic = command_topic(&config.topic);
        tokio::spawn(async move {
            info!("MQTT Eventloop started");
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(p))) => {
                        if p.topic != cmd_topic {
                            continue;
                        }
                        debug!("Received MQTT command {:?}", String::from_utf8_lossy(&p.payload));

                        match command_to_event(&p.payload, guid) {
                            Ok(ev) => {
                                if let Err(e) = send_queue.push(ev) {
                                    error!("Dropping MQTT command: {}", e);
                                }
                            }
                            Err(e) => error!("Invalid MQTT command: {}", e),
                        }
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("Connected, subscribing to {}", cmd_topic);

                        /* Move the subscription to its own task */
                        let client_clone = reconnect_c.clone();
                        let topic = cmd_topic.clone();
                        tokio::spawn(async move {
                            if let Err(e) = client_clone.subscribe(topic, QoS::AtLeastOnce).await {
                                error!("Subscribing failed: {}", e);
                            }
                        });
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!("Error in MQTT {:?}, reconnecting ", e);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        MqttManager {
            client,
            topic: config.topic.clone(),
            receiver,
        }
    }

    pub async fn start_thread(&mut self) {
        while let Some(event) = self.receiver.pop().await {
            let payload = match serde_json::to_string(&event) {
                Ok(p) => p,
                Err(e) => {
                    error!("Unable to serialize event: {}", e);
                    continue;
                }
            };

            match self
                .client
                .publish(event_topic(&self.topic, &event), QoS::AtLeastOnce, false, payload)
                .await
            {
                Err(e) => error!("Error sending: {}", e),
                Ok(_) => debug!("Send successfully"),
            }
        }

        info!("Receive queue closed, MQTT thread exits");
    }
}

/// Host side used when no broker is configured, events are only logged.
pub struct LogDrain {
    receiver: EventReceiver,
}

impl LogDrain {
    pub fn new(receiver: EventReceiver) -> Self {
        LogDrain { receiver }
    }

    /// Returns the number of events drained once the queue closes.
    pub async fn start_thread(&mut self) -> usize {
        info!("No MQTT configured, logging events");
        let mut count = 0;
        while let Some(event) = self.receiver.pop().await {
            info!(
                "Event class={} type={} guid={} data={}",
                event.vscp_class,
                event.vscp_type,
                event.guid,
                hex::encode_upper(&event.data)
            );
            count += 1;
        }
        count
    }
}
