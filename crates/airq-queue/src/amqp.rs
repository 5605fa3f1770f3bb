use crate::broker::{AckMode, Broker, QueueConsumer, QueueOptions, QueuePublisher};
use crate::dead_letter_queue;
use crate::delivery::{Acker, Delivery};
use crate::error::{QueueError, Result};
use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
    BasicRejectOptions, QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 持久化投递模式
const PERSISTENT: u8 = 2;

/// RabbitMQ（AMQP 0-9-1）消息代理
pub struct AmqpBroker {
    connection: Connection,
}

impl AmqpBroker {
    pub async fn connect(url: &str) -> Result<Self> {
        let connection = Connection::connect(url, ConnectionProperties::default())
            .await
            .map_err(|e| QueueError::Connection(e.to_string()))?;

        info!("Connected to AMQP broker");
        Ok(Self { connection })
    }

    /// 声明持久队列；手动确认模式下同时声明死信队列并挂上死信路由
    async fn declare(&self, channel: &Channel, queue: &str, options: &QueueOptions) -> Result<()> {
        let declare = QueueDeclareOptions {
            durable: options.durable,
            ..Default::default()
        };

        let mut arguments = FieldTable::default();
        if options.dead_letter() {
            let dead = dead_letter_queue(queue);
            channel
                .queue_declare(&dead, declare.clone(), FieldTable::default())
                .await?;

            arguments.insert(
                "x-dead-letter-exchange".into(),
                AMQPValue::LongString("".into()),
            );
            arguments.insert(
                "x-dead-letter-routing-key".into(),
                AMQPValue::LongString(dead.into()),
            );
        }

        channel.queue_declare(queue, declare, arguments).await?;
        debug!(queue = %queue, durable = options.durable, "Queue declared");
        Ok(())
    }
}

struct AmqpAcker {
    acker: lapin::acker::Acker,
}

#[async_trait]
impl Acker for AmqpAcker {
    async fn ack(self: Box<Self>) -> Result<()> {
        self.acker
            .ack(BasicAckOptions::default())
            .await
            .map_err(|e| QueueError::Ack(e.to_string()))
    }

    async fn reject(self: Box<Self>, requeue: bool) -> Result<()> {
        self.acker
            .reject(BasicRejectOptions { requeue })
            .await
            .map_err(|e| QueueError::Ack(e.to_string()))
    }
}

struct AmqpConsumer {
    queue: String,
    ack_mode: AckMode,
    consumer: lapin::Consumer,
    _channel: Channel,
}

#[async_trait]
impl QueueConsumer for AmqpConsumer {
    async fn next(&mut self) -> Option<Result<Delivery>> {
        let delivery = match self.consumer.next().await? {
            Ok(delivery) => delivery,
            Err(e) => return Some(Err(e.into())),
        };

        Some(Ok(match self.ack_mode {
            AckMode::Auto => Delivery::auto(delivery.data),
            AckMode::Manual => Delivery::manual(
                delivery.data,
                Box::new(AmqpAcker {
                    acker: delivery.acker,
                }),
            ),
        }))
    }

    fn queue(&self) -> &str {
        &self.queue
    }
}

struct AmqpPublisher {
    queue: String,
    channel: Channel,
}

#[async_trait]
impl QueuePublisher for AmqpPublisher {
    async fn publish(&self, payload: &[u8]) -> Result<()> {
        let properties = BasicProperties::default()
            .with_delivery_mode(PERSISTENT)
            .with_content_type("application/json".into());

        let to_error = |e: lapin::Error| QueueError::Publish {
            queue: self.queue.clone(),
            reason: e.to_string(),
        };

        self.channel
            .basic_publish(
                "",
                &self.queue,
                BasicPublishOptions::default(),
                payload,
                properties,
            )
            .await
            .map_err(to_error)?
            .await
            .map_err(to_error)?;

        Ok(())
    }

    fn queue(&self) -> &str {
        &self.queue
    }
}

#[async_trait]
impl Broker for AmqpBroker {
    async fn consumer(&self, queue: &str, options: &QueueOptions) -> Result<Box<dyn QueueConsumer>> {
        let channel = self.connection.create_channel().await?;
        self.declare(&channel, queue, options).await?;

        if options.ack_mode == AckMode::Manual {
            channel
                .basic_qos(options.prefetch, BasicQosOptions::default())
                .await?;
        }

        let consumer = channel
            .basic_consume(
                queue,
                &format!("airq-{}", uuid::Uuid::new_v4()),
                BasicConsumeOptions {
                    no_ack: options.ack_mode == AckMode::Auto,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        info!(queue = %queue, ack_mode = ?options.ack_mode, "Consuming AMQP queue");
        Ok(Box::new(AmqpConsumer {
            queue: queue.to_string(),
            ack_mode: options.ack_mode,
            consumer,
            _channel: channel,
        }))
    }

    async fn publisher(&self, queue: &str, options: &QueueOptions) -> Result<Arc<dyn QueuePublisher>> {
        let channel = self.connection.create_channel().await?;
        self.declare(&channel, queue, options).await?;

        Ok(Arc::new(AmqpPublisher {
            queue: queue.to_string(),
            channel,
        }))
    }

    fn name(&self) -> &str {
        "amqp"
    }

    async fn close(&self) -> Result<()> {
        if let Err(e) = self.connection.close(200, "shutdown").await {
            warn!(error = %e, "Failed to close AMQP connection cleanly");
        }
        Ok(())
    }
}
