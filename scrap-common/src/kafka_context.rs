use rdkafka::consumer::ConsumerContext;
use rdkafka::{ClientContext, Statistics};

use crate::health::HealthHandle;

/// Client context shared by the scrap consumer and the notification producer.
///
/// librdkafka calls `stats` from its own thread every `statistics.interval.ms`,
/// which makes it a convenient heartbeat for the client's liveness.
pub struct KafkaContext {
    liveness: HealthHandle,
}

impl From<HealthHandle> for KafkaContext {
    fn from(liveness: HealthHandle) -> Self {
        KafkaContext { liveness }
    }
}

impl ClientContext for KafkaContext {
    fn stats(&self, stats: Statistics) {
        self.liveness.report_healthy();

        metrics::gauge!("scrap_kafka_callback_queue_depth").set(stats.replyq as f64);
        metrics::gauge!("scrap_kafka_producer_queue_depth").set(stats.msg_cnt as f64);
    }
}

impl ConsumerContext for KafkaContext {}
