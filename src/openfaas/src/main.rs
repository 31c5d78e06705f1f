use depth_serve::{Config, DepthEstimator, Job, JobOutput, Timer};
use hyper::server::conn::AddrStream;
use hyper::service::{make_service_fn, service_fn};
use hyper::{body, Body, Method, Request, Response, Server, StatusCode};
use log::{error, info};
use std::convert::Infallible;
use std::sync::Arc;

fn reply(status: StatusCode, output: &JobOutput) -> Response<Body> {
    let body = serde_json::to_string(output).unwrap_or_else(|e| {
        format!(
            "{{\"status\":\"failed\",\"error\":\"could not serialize result: {}\",\"processing_time_ms\":0}}",
            e
        )
    });

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    response
}

fn rejected(reason: String) -> JobOutput {
    JobOutput::Failed {
        error: reason,
        processing_time_ms: 0,
    }
}

async fn handle(
    req: Request<Body>,
    estimator: Arc<DepthEstimator>,
) -> Result<Response<Body>, Infallible> {
    if req.method() != Method::POST {
        let output = rejected(format!("Unsupported method {}", req.method()));
        return Ok(reply(StatusCode::METHOD_NOT_ALLOWED, &output));
    }

    let raw = match body::to_bytes(req.into_body()).await {
        Ok(raw) => raw,
        Err(e) => {
            let output = rejected(format!("Could not read request body: {}", e));
            return Ok(reply(StatusCode::BAD_REQUEST, &output));
        }
    };

    let job = match serde_json::from_slice(&raw) {
        Ok(value) => Job::from_value(value),
        Err(e) => {
            let output = rejected(format!("Invalid job payload: {}", e));
            return Ok(reply(StatusCode::BAD_REQUEST, &output));
        }
    };

    let mut t = Timer::new_start("Job worker");
    let output = match tokio::task::spawn_blocking(move || estimator.handle(&job)).await {
        Ok(output) => output,
        Err(e) => {
            let elapsed = t.stop();
            error!("Job worker died after {}ms: {}", elapsed, e);
            JobOutput::aborted(&e.to_string(), elapsed)
        }
    };

    let status = if output.is_success() {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };

    Ok(reply(status, &output))
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };
    let addr = config.http_addr;

    let estimator = match tokio::task::spawn_blocking(move || DepthEstimator::new(&config)).await
    {
        Ok(Ok(estimator)) => Arc::new(estimator),
        Ok(Err(e)) => {
            error!("{}", e);
            std::process::exit(1);
        }
        Err(e) => {
            error!("Model loader panicked: {}", e);
            std::process::exit(1);
        }
    };

    // A `MakeService` that produces a `Service` to handle each connection.
    let make_service = make_service_fn(move |_conn: &AddrStream| {
        let estimator = Arc::clone(&estimator);

        let service = service_fn(move |req| handle(req, Arc::clone(&estimator)));

        async move { Ok::<_, Infallible>(service) }
    });

    let server = Server::bind(&addr).serve(make_service);
    info!("Listening on http://{}", addr);

    if let Err(e) = server.await {
        error!("server error: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depth_serve::depth::DepthField;
    use depth_serve::fetch::ImageSource;
    use depth_serve::model::DepthModel;
    use depth_serve::preprocess::{ModelInput, TensorLayout};
    use depth_serve::DepthError;
    use image::{Rgb, RgbImage};
    use serde_json::Value;

    struct FixedImage;

    impl ImageSource for FixedImage {
        fn fetch(&self, url: &str) -> depth_serve::Result<RgbImage> {
            if url.contains("crash") {
                panic!("decoder blew up");
            }
            Ok(RgbImage::from_pixel(40, 30, Rgb([90, 120, 150])))
        }
    }

    /// Depth increases left to right at model resolution
    struct RampModel;

    impl DepthModel for RampModel {
        fn input_size(&self) -> u32 {
            28
        }

        fn layout(&self) -> TensorLayout {
            TensorLayout::Nchw
        }

        fn predict(&self, input: &ModelInput) -> depth_serve::Result<DepthField> {
            let values = (0..input.width * input.height)
                .map(|i| (i % input.width) as f32)
                .collect();
            DepthField::new(input.width, input.height, values)
        }
    }

    fn estimator() -> Arc<DepthEstimator> {
        Arc::new(DepthEstimator::with_parts(
            Box::new(FixedImage),
            Box::new(RampModel),
        ))
    }

    async fn call(method: Method, body: &str) -> (StatusCode, Value) {
        let req = Request::builder()
            .method(method)
            .uri("/")
            .body(Body::from(body.to_owned()))
            .unwrap();

        let resp = handle(req, estimator()).await.unwrap();
        let status = resp.status();
        let raw = body::to_bytes(resp.into_body()).await.unwrap();

        (status, serde_json::from_slice(&raw).unwrap())
    }

    #[tokio::test]
    async fn get_is_not_allowed() {
        let (status, out) = call(Method::GET, "").await;

        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(out["status"], "failed");
        assert_eq!(out["error"], "Unsupported method GET");
    }

    #[tokio::test]
    async fn non_json_body_is_rejected() {
        let (status, out) = call(Method::POST, "image_url=http://a/b.jpg").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(out["status"], "failed");
        assert!(out["error"]
            .as_str()
            .unwrap()
            .starts_with("Invalid job payload"));
    }

    #[tokio::test]
    async fn missing_url_is_a_failed_record() {
        let (status, out) = call(Method::POST, r#"{"input": {}}"#).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(out["status"], "failed");
        assert_eq!(out["error"], DepthError::MissingImageUrl.to_string());
        assert!(out["processing_time_ms"].is_i64());
    }

    #[tokio::test]
    async fn valid_job_succeeds() {
        let job = r#"{"input": {"image_url": "https://bucket.example.com/room.jpg"}}"#;
        let (status, out) = call(Method::POST, job).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(out["status"], "success");
        assert_eq!(out["width"], 40);
        assert_eq!(out["height"], 30);
        assert!(!out["depth_map_base64"].as_str().unwrap().is_empty());
        assert!(out["timings"]["inference_ms"].is_i64());
    }

    #[tokio::test]
    async fn worker_panic_becomes_aborted_record() {
        let job = r#"{"input": {"image_url": "https://bucket.example.com/crash.jpg"}}"#;
        let (status, out) = call(Method::POST, job).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(out["status"], "failed");
        let error = out["error"].as_str().unwrap();
        assert!(error.starts_with("Job aborted"), "{}", error);
        assert!(!error.contains("inference"));
    }
}
