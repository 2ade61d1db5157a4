use async_trait::async_trait;
use haven_core::repository::EventPublisher;
use haven_core::StoreResult;
use haven_shared::models::events::{BookingConfirmationRequested, PaymentSettledEvent};
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;
use tracing::{error, info};

#[derive(Clone)]
pub struct EventProducer {
    producer: FutureProducer,
    confirmation_topic: String,
    settlement_topic: String,
}

impl EventProducer {
    pub fn new(
        brokers: &str,
        confirmation_topic: &str,
        settlement_topic: &str,
    ) -> Result<Self, rdkafka::error::KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self {
            producer,
            confirmation_topic: confirmation_topic.to_string(),
            settlement_topic: settlement_topic.to_string(),
        })
    }

    pub async fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: &str,
    ) -> Result<(), rdkafka::error::KafkaError> {
        let record = FutureRecord::to(topic).key(key).payload(payload);

        match self
            .producer
            .send(record, Timeout::After(Duration::from_secs(0)))
            .await
        {
            Ok(delivery) => {
                info!(
                    "Sent message to {}/{}: partition {} offset {}",
                    topic, key, delivery.partition, delivery.offset
                );
                Ok(())
            }
            Err((e, _msg)) => {
                error!("Failed to send message to {}: {}", topic, e);
                Err(e)
            }
        }
    }
}

#[async_trait]
impl EventPublisher for EventProducer {
    async fn booking_confirmation_requested(
        &self,
        event: &BookingConfirmationRequested,
    ) -> StoreResult<()> {
        let payload = serde_json::to_string(event)?;
        self.publish(&self.confirmation_topic, &event.booking_reference, &payload)
            .await?;
        Ok(())
    }

    async fn payment_settled(&self, event: &PaymentSettledEvent) -> StoreResult<()> {
        let payload = serde_json::to_string(event)?;
        self.publish(&self.settlement_topic, &event.booking_id.to_string(), &payload)
            .await?;
        Ok(())
    }
}
