use std::time::Duration;

use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};

use crate::checks::{CheckError, CheckOutcome, required};
use crate::db::entities::monitor;

/// Connect to the broker, subscribe to the configured topic and let the
/// first message published on it decide the outcome. The caller bounds the
/// whole exchange with the monitor interval rather than the fleet timeout,
/// since brokers may publish sparsely.
pub async fn check_mqtt(monitor: &monitor::Model) -> Result<CheckOutcome, CheckError> {
    let hostname = required(&monitor.hostname, "hostname")?;
    let topic = required(&monitor.mqtt_topic, "mqtt_topic")?;
    let port = monitor.port.unwrap_or(1883) as u16;

    let client_id = format!("uptimed-{}", monitor.id);
    let mut options = MqttOptions::new(client_id, hostname, port);
    options.set_keep_alive(Duration::from_secs(5));
    if let (Some(user), Some(pass)) = (&monitor.mqtt_username, &monitor.mqtt_password) {
        options.set_credentials(user, pass);
    }

    let (client, mut eventloop) = AsyncClient::new(options, 10);
    client
        .subscribe(topic, QoS::AtLeastOnce)
        .await
        .map_err(|e| CheckError::probe(e.to_string()))?;

    loop {
        let event = eventloop
            .poll()
            .await
            .map_err(|e| CheckError::probe(e.to_string()))?;
        if let Event::Incoming(Packet::Publish(publish)) = event {
            let message = String::from_utf8_lossy(&publish.payload).into_owned();
            let _ = client.disconnect().await;
            return settle(topic, &message, monitor.mqtt_success_message.as_deref());
        }
    }
}

fn settle(
    topic: &str,
    message: &str,
    expected: Option<&str>,
) -> Result<CheckOutcome, CheckError> {
    match expected {
        Some(want) if !want.is_empty() && message != want => Err(CheckError::probe(format!(
            "Message Mismatch - Topic: {topic}; Message: {message}"
        ))),
        _ => Ok(CheckOutcome::up(
            format!("Topic: {topic}; Message: {message}"),
            None,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::status::Status;

    #[test]
    fn matching_message_is_up() {
        let outcome = settle("sensors/ok", "1", Some("1")).unwrap();
        assert_eq!(outcome.status, Status::Up);
        assert_eq!(outcome.message, "Topic: sensors/ok; Message: 1");
    }

    #[test]
    fn no_expectation_accepts_anything() {
        let outcome = settle("sensors/ok", "whatever", None).unwrap();
        assert_eq!(outcome.status, Status::Up);
    }

    #[test]
    fn empty_expectation_accepts_anything() {
        assert!(settle("t", "x", Some("")).is_ok());
    }

    #[test]
    fn mismatch_is_a_probe_failure() {
        let err = settle("sensors/ok", "0", Some("1")).unwrap_err();
        assert!(err.to_string().contains("Message Mismatch"));
    }
}
