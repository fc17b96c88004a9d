use std::time::Duration;

use scrap_common::health::{HealthHandle, HealthRegistry};

/// The producer polls librdkafka on its own thread, so its statistics keep flowing
/// whatever the processing loop is doing.
const PRODUCER_DEADLINE: time::Duration = time::Duration::seconds(30);

/// Liveness handles for the long-running parts of the worker.
pub struct WorkerLiveness {
    pub consumer: HealthHandle,
    pub producer: HealthHandle,
    pub worker: HealthHandle,
}

impl WorkerLiveness {
    /// The consumer only serves its statistics callback while it is being polled,
    /// which does not happen while a batch is processed. It gets the same deadline
    /// as the processing loop so a long batch does not fail it first.
    pub fn register(registry: &HealthRegistry, loop_deadline: Duration) -> Self {
        let millis = i64::try_from(loop_deadline.as_millis()).unwrap_or(i64::MAX);
        let loop_deadline = time::Duration::milliseconds(millis);

        Self {
            consumer: registry.register("consumer", loop_deadline),
            producer: registry.register("producer", PRODUCER_DEADLINE),
            worker: registry.register("worker", loop_deadline),
        }
    }
}
