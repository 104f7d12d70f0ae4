use async_trait::async_trait;
use lapin::options::{
    BasicPublishOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info};

use super::{EventSink, SinkAck, SinkError};
use crate::models::{IngestedEvent, iso_millis};

// routing key failed deliveries are dead-lettered with
pub const DEAD_LETTER_ROUTING_KEY: &str = "webhook_failed";

const PERSISTENT_DELIVERY: u8 = 2;

#[derive(Debug, Clone)]
pub struct QueueOptions {
    pub queue: String,
    pub durable: bool,
    pub persistent: bool,
    pub dead_letter: bool,
    pub dead_letter_exchange: String,
}

impl QueueOptions {
    pub fn dead_letter_queue(&self) -> String {
        format!("{}_dlq", self.queue)
    }
}

/// Body written to the queue, the format downstream consumers decode.
#[derive(Debug, Serialize)]
pub struct QueueMessage<'a> {
    pub content: &'a Value,
    pub timestamp: String,
    pub event_name: &'a str,
    pub source_id: &'a str,
}

impl<'a> From<&'a IngestedEvent> for QueueMessage<'a> {
    fn from(event: &'a IngestedEvent) -> Self {
        Self {
            content: &event.payload,
            timestamp: iso_millis(event.occurred_at),
            event_name: &event.name,
            source_id: &event.source_id,
        }
    }
}

struct AmqpLink {
    // held so the connection lives as long as the sink
    _connection: Connection,
    channel: Channel,
}

/// Fire-and-forget publisher onto one AMQP queue.
///
/// The channel is opened once at startup. If that fails the sink stays
/// disconnected for the life of the process and every publish reports
/// [`SinkError::Unavailable`].
pub struct QueueSink {
    link: Option<AmqpLink>,
    options: QueueOptions,
}

impl QueueSink {
    pub async fn connect(url: &str, options: QueueOptions) -> Self {
        match open_link(url, &options).await {
            Ok(link) => {
                info!(queue = %options.queue, durable = options.durable, "Connected to broker");
                Self {
                    link: Some(link),
                    options,
                }
            }
            Err(e) => {
                error!(error = %e, queue = %options.queue, "Broker connection failed, queue sink disabled");
                Self::disconnected(options)
            }
        }
    }

    pub fn disconnected(options: QueueOptions) -> Self {
        Self {
            link: None,
            options,
        }
    }

    fn properties(&self) -> BasicProperties {
        let props = BasicProperties::default().with_content_type("application/json".into());
        if self.options.persistent {
            props.with_delivery_mode(PERSISTENT_DELIVERY)
        } else {
            props
        }
    }
}

async fn open_link(url: &str, options: &QueueOptions) -> Result<AmqpLink, lapin::Error> {
    let connection = Connection::connect(url, ConnectionProperties::default()).await?;
    let channel = connection.create_channel().await?;
    declare_topology(&channel, options).await?;
    Ok(AmqpLink {
        _connection: connection,
        channel,
    })
}

// x-arguments of the main queue, empty unless dead-lettering is on
fn queue_arguments(options: &QueueOptions) -> FieldTable {
    let mut arguments = FieldTable::default();
    if options.dead_letter {
        arguments.insert(
            "x-dead-letter-exchange".into(),
            AMQPValue::LongString(options.dead_letter_exchange.as_str().into()),
        );
        arguments.insert(
            "x-dead-letter-routing-key".into(),
            AMQPValue::LongString(DEAD_LETTER_ROUTING_KEY.into()),
        );
    }
    arguments
}

async fn declare_topology(channel: &Channel, options: &QueueOptions) -> Result<(), lapin::Error> {
    if options.dead_letter {
        let dlx = &options.dead_letter_exchange;
        let dlq = options.dead_letter_queue();

        channel
            .exchange_declare(
                dlx,
                ExchangeKind::Direct,
                ExchangeDeclareOptions::default(),
                FieldTable::default(),
            )
            .await?;
        channel
            .queue_declare(&dlq, QueueDeclareOptions::default(), FieldTable::default())
            .await?;
        channel
            .queue_bind(
                &dlq,
                dlx,
                DEAD_LETTER_ROUTING_KEY,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;
        debug!(exchange = %dlx, queue = %dlq, "Declared dead-letter topology");
    }

    channel
        .queue_declare(
            &options.queue,
            QueueDeclareOptions {
                durable: options.durable,
                ..QueueDeclareOptions::default()
            },
            queue_arguments(options),
        )
        .await?;
    Ok(())
}

fn classify(err: lapin::Error) -> SinkError {
    match err {
        lapin::Error::InvalidChannelState(_) | lapin::Error::InvalidConnectionState(_) => {
            SinkError::Unavailable(err.to_string())
        }
        other => SinkError::Failed(other.to_string()),
    }
}

#[async_trait]
impl EventSink for QueueSink {
    fn name(&self) -> &'static str {
        "queue"
    }

    fn is_ready(&self) -> bool {
        self.link
            .as_ref()
            .is_some_and(|l| l.channel.status().connected())
    }

    async fn publish(&self, event: &IngestedEvent) -> Result<SinkAck, SinkError> {
        let Some(link) = &self.link else {
            return Err(SinkError::Unavailable("no channel".to_string()));
        };
        if !link.channel.status().connected() {
            return Err(SinkError::Unavailable("channel closed".to_string()));
        }

        let body = serde_json::to_vec(&QueueMessage::from(event))
            .map_err(|e| SinkError::Failed(format!("encode message: {e}")))?;

        // the publisher confirm is not awaited
        link.channel
            .basic_publish(
                "",
                &self.options.queue,
                BasicPublishOptions::default(),
                &body,
                self.properties(),
            )
            .await
            .map_err(classify)?;

        Ok(SinkAck::Queued {
            queued_at: event.occurred_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use lapin::types::ShortString;
    use serde_json::json;

    fn options() -> QueueOptions {
        QueueOptions {
            queue: "webhook_queue".into(),
            durable: false,
            persistent: true,
            dead_letter: true,
            dead_letter_exchange: "webhook_dlx".into(),
        }
    }

    fn event() -> IngestedEvent {
        IngestedEvent {
            name: "subscriber.unsubscribed".into(),
            occurred_at: Utc::now(),
            payload: json!({"subscriber": {"id": "42"}}),
            source_id: "0f".repeat(16),
        }
    }

    #[tokio::test]
    async fn disconnected_sink_is_unavailable() {
        let sink = QueueSink::disconnected(options());
        assert!(!sink.is_ready());

        let err = sink.publish(&event()).await.unwrap_err();
        assert!(matches!(err, SinkError::Unavailable(_)));
    }

    #[test]
    fn message_wraps_payload() {
        let ev = event();
        let value = serde_json::to_value(QueueMessage::from(&ev)).unwrap();
        assert_eq!(value["content"], ev.payload);
        assert_eq!(value["timestamp"], iso_millis(ev.occurred_at));
        assert_eq!(value["event_name"], "subscriber.unsubscribed");
        assert_eq!(value["source_id"], ev.source_id);
    }

    #[test]
    fn dead_letter_queue_follows_queue_name() {
        assert_eq!(options().dead_letter_queue(), "webhook_queue_dlq");
    }

    #[test]
    fn queue_arguments_route_to_configured_exchange() {
        let arguments = queue_arguments(&options());
        let args = arguments.inner();
        assert_eq!(args.len(), 2);
        assert_eq!(
            args.get(&ShortString::from("x-dead-letter-exchange")),
            Some(&AMQPValue::LongString("webhook_dlx".into()))
        );
        assert_eq!(
            args.get(&ShortString::from("x-dead-letter-routing-key")),
            Some(&AMQPValue::LongString("webhook_failed".into()))
        );
    }

    #[test]
    fn queue_arguments_empty_without_dead_letter() {
        let opts = QueueOptions {
            dead_letter: false,
            ..options()
        };
        assert!(queue_arguments(&opts).inner().is_empty());
    }

    #[test]
    fn persistent_sets_delivery_mode() {
        let sink = QueueSink::disconnected(options());
        assert_eq!(*sink.properties().delivery_mode(), Some(PERSISTENT_DELIVERY));

        let transient = QueueSink::disconnected(QueueOptions {
            persistent: false,
            ..options()
        });
        assert_eq!(*transient.properties().delivery_mode(), None);
    }
}
