//! Binary wrapper around `simcore`'s tick coordinator (spec §4.3, C3):
//! registers a small fleet of simulation components, seeds them with
//! synthetic operations, and drives the coordinator until interrupted.

use rand::Rng;
use simcore::{Coordinator, DefaultComponent, Operation};
use std::sync::Arc;
use std::time::Duration;

const COMPONENT_COUNT: usize = 4;
const SEED_OPERATIONS_PER_COMPONENT: usize = 25;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    common_telemetry::init_default("simd");

    let config = common_config::SimConfig::from_env()?;
    tracing::info!(
        tick_duration = ?config.tick_duration,
        as_fast_as_possible = config.as_fast_as_possible,
        mailbox_capacity = config.mailbox_capacity,
        "simd starting"
    );

    let coordinator = Coordinator::new(config.clone());

    let mut components = Vec::with_capacity(COMPONENT_COUNT);
    for i in 0..COMPONENT_COUNT {
        let component = Arc::new(DefaultComponent::new(
            format!("component-{i}"),
            config.tick_duration,
            config.startup_batch_size,
        ));
        seed_operations(&component, config.tick_duration);
        coordinator.register(component.clone()).await?;
        components.push(component);
    }

    coordinator.start().await;

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    tokio::pin!(shutdown);

    let mut report = tokio::time::interval(Duration::from_secs(5));
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("simd received shutdown signal");
                break;
            }
            _ = report.tick() => {
                let metrics = coordinator.metrics().await;
                tracing::info!(
                    total_ticks = metrics.total_ticks,
                    simulation_time = ?metrics.simulation_time,
                    real_time_elapsed = ?metrics.real_time_elapsed,
                    ticks_per_second = metrics.ticks_per_second,
                    efficiency_ratio = metrics.efficiency_ratio,
                    "simd tick coordinator metrics"
                );
                for id in coordinator.component_ids().await {
                    if let Some(m) = coordinator.component_metrics(&id).await {
                        tracing::debug!(component = %id, processed = m.processed_count, depths = ?m.queue_depths, "component metrics");
                    }
                }
            }
        }
    }

    coordinator.stop().await;
    Ok(())
}

fn seed_operations(component: &Arc<DefaultComponent>, tick_duration: Duration) {
    let mut rng = rand::rng();
    for _ in 0..SEED_OPERATIONS_PER_COMPONENT {
        let ticks = rng.random_range(1..=20u32);
        component.enqueue(Operation::new(
            "synthetic",
            serde_json::json!({}),
            tick_duration * ticks,
        ));
    }
}
