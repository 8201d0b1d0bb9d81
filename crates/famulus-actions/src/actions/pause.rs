use std::time::Duration;

use async_trait::async_trait;
use famulus_core::action::PauseParams;
use famulus_core::{ActionParams, ActionSpec, ConfigError, DataItem};
use rand::Rng;

use crate::context::ExecutionContext;
use crate::error::ActionError;
use crate::registry::Action;

/// Delays each item by a configured number of milliseconds, with optional
/// uniform jitter. The delay only suspends this stage's worker task, other
/// jobs and stages keep running.
pub struct PauseAction {
    params: PauseParams,
}

pub(crate) fn construct(spec: &ActionSpec) -> Result<Box<dyn Action>, ConfigError> {
    match &spec.params {
        ActionParams::Pause(params) => Ok(Box::new(PauseAction {
            params: params.clone(),
        })),
        _ => Err(super::mismatch(spec, "pause")),
    }
}

impl PauseAction {
    fn delay_millis(&self) -> u64 {
        let base = self.params.milliseconds;
        let variance = self.params.variance;
        if variance == 0 {
            return base;
        }
        let roll = rand::thread_rng().gen_range(0..=variance.saturating_mul(2));
        if roll >= variance {
            base.saturating_add(roll - variance)
        } else {
            base.saturating_sub(variance - roll)
        }
    }
}

#[async_trait]
impl Action for PauseAction {
    fn kind(&self) -> &'static str {
        "pause"
    }

    fn simulation_safe(&self) -> bool {
        false
    }

    async fn process(
        &self,
        mut item: DataItem,
        ctx: &ExecutionContext,
    ) -> Result<Vec<DataItem>, ActionError> {
        let delay = self.delay_millis();

        if item.is_simulation() {
            item.log_simulation(format!("Would have paused for {delay} milliseconds."));
            return Ok(vec![item]);
        }

        tracing::debug!(job = %ctx.job_name, delay, "pausing");
        tokio::time::sleep(Duration::from_millis(delay)).await;
        Ok(vec![item])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::test_support;
    use famulus_core::item::SIMULATION_LOG_KEY;
    use uuid::Uuid;

    #[test]
    fn test_delay_stays_within_variance() {
        let action = PauseAction {
            params: PauseParams {
                milliseconds: 1000,
                variance: 200,
            },
        };
        for _ in 0..100 {
            let delay = action.delay_millis();
            assert!((800..=1200).contains(&delay), "delay out of range: {delay}");
        }
    }

    #[tokio::test]
    async fn test_simulation_skips_the_sleep() {
        let ctx = test_support::context(true);
        let action = PauseAction {
            params: PauseParams {
                milliseconds: 60_000,
                variance: 0,
            },
        };

        let item = DataItem::empty(Uuid::new_v4(), true);
        let started = std::time::Instant::now();
        let output = action.process(item, &ctx).await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(
            output[0].value_at(SIMULATION_LOG_KEY),
            Some(&serde_json::json!("Would have paused for 60000 milliseconds."))
        );
    }
}
