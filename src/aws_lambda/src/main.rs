use lambda_runtime::{service_fn, Error, LambdaEvent};

use depth_serve::{Config, DepthEstimator, Job, JobOutput, Timer};
use log::{debug, error, info};
use serde_json::Value;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::init();

    let config = Config::from_env()?;

    // Model loading blocks on disk and device setup
    let estimator = tokio::task::spawn_blocking(move || DepthEstimator::new(&config)).await??;
    let estimator = Arc::new(estimator);

    debug!("Loaded model in memory");

    let func = service_fn(move |event: LambdaEvent<Value>| {
        let estimator = Arc::clone(&estimator);
        async move { handle_request(event, estimator).await }
    });

    info!("Dispatching handler");
    lambda_runtime::run(func).await?;

    Ok(())
}

async fn handle_request(
    event: LambdaEvent<Value>,
    estimator: Arc<DepthEstimator>,
) -> Result<JobOutput, Error> {
    let (payload, ctx) = event.into_parts();
    debug!("Received request {}: {:#?}", ctx.request_id, payload);

    let mut job = Job::from_value(payload);
    if job.id.is_none() {
        job.id = Some(ctx.request_id);
    }

    let mut t = Timer::new_start("Job worker");
    let output = match tokio::task::spawn_blocking(move || estimator.handle(&job)).await {
        Ok(output) => output,
        Err(e) => {
            let elapsed = t.stop();
            error!("Job worker died after {}ms: {}", elapsed, e);
            JobOutput::aborted(&e.to_string(), elapsed)
        }
    };

    Ok(output)
}
