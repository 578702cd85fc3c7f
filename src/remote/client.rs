use anyhow::{Context, Result, anyhow, bail};
use log::{error, info};
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use reqwest::{Response, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Instant;

use super::{AnalysisService, DetectResponse, HighlightResponse, Operation};
use crate::config::AppConfig;
use crate::utils::{essence, extension_for, is_image_media_type, sniff_media_type};
use crate::workflow::types::WorkingPayload;

pub struct AnalysisClient {
    http_client: reqwest::Client,
    detect_endpoint: Url,
    highlight_endpoint: Url,
}

impl AnalysisClient {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http_client,
            detect_endpoint: config.detect_endpoint()?,
            highlight_endpoint: config.highlight_endpoint()?,
        })
    }

    /// POST the payload as the `image` part plus text fields, returning the JSON body.
    async fn post_multipart<T: DeserializeOwned>(
        &self,
        operation: Operation,
        endpoint: &Url,
        payload: &WorkingPayload,
        fields: &[(&'static str, &str)],
    ) -> Result<T> {
        let start_time = Instant::now();
        let form = build_form(payload, fields)?;

        let response = self
            .http_client
            .post(endpoint.clone())
            .multipart(form)
            .send()
            .await
            .with_context(|| format!("Failed to reach {} endpoint {}", operation, endpoint))?;
        let response = ensure_success(operation, response).await?;

        let body: Value = response
            .json()
            .await
            .with_context(|| format!("{} endpoint returned a non-JSON body", operation))?;

        info!(duration = &*format!("{:?}", start_time.elapsed());
            "Remote {} call to {} succeeded",
            operation,
            endpoint
        );

        serde_json::from_value(body)
            .with_context(|| format!("{} endpoint returned an unexpected JSON shape", operation))
    }
}

#[rocket::async_trait]
impl AnalysisService for AnalysisClient {
    async fn detect(&self, payload: &WorkingPayload, object: &str) -> Result<DetectResponse> {
        let mut response: DetectResponse = self
            .post_multipart(
                Operation::Detect,
                &self.detect_endpoint,
                payload,
                &[("object", object)],
            )
            .await?;
        response.file_url = resolve_file_url(&self.detect_endpoint, &response.file_url)?.into();
        Ok(response)
    }

    async fn highlight(
        &self,
        payload: &WorkingPayload,
        object: &str,
        method: &str,
    ) -> Result<HighlightResponse> {
        let mut response: HighlightResponse = self
            .post_multipart(
                Operation::Highlight,
                &self.highlight_endpoint,
                payload,
                &[("object", object), ("highlightMethod", method)],
            )
            .await?;
        response.file_url =
            resolve_file_url(&self.highlight_endpoint, &response.file_url)?.into();
        Ok(response)
    }

    async fn fetch(&self, file_url: &str, fallback_media_type: &str) -> Result<WorkingPayload> {
        let start_time = Instant::now();
        let response = self
            .http_client
            .get(file_url)
            .send()
            .await
            .with_context(|| format!("Failed to download {}", file_url))?;
        let response = ensure_success(Operation::Fetch, response).await?;

        let declared = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(essence);
        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("Failed to read body of {}", file_url))?
            .to_vec();

        let media_type = match declared {
            Some(declared) if is_image_media_type(&declared) => declared,
            _ => sniff_media_type(&bytes)
                .map(str::to_string)
                .unwrap_or_else(|| fallback_media_type.to_string()),
        };

        info!(duration = &*format!("{:?}", start_time.elapsed());
            "Fetched {} ({} bytes, {})",
            file_url,
            bytes.len(),
            media_type
        );

        WorkingPayload::new(bytes, media_type)
            .with_context(|| format!("Image at {} is empty", file_url))
    }
}

fn build_form(payload: &WorkingPayload, fields: &[(&'static str, &str)]) -> Result<Form> {
    let file_name = format!("image.{}", extension_for(&payload.media_type));
    let part = Part::bytes(payload.bytes.clone())
        .file_name(file_name)
        .mime_str(&payload.media_type)
        .with_context(|| format!("Invalid media type: {}", payload.media_type))?;

    let form = fields
        .iter()
        .fold(Form::new().part("image", part), |form, (name, value)| {
            form.text(*name, value.to_string())
        });
    Ok(form)
}

/// Turns a non-2xx response into an error carrying the upstream message.
async fn ensure_success(operation: Operation, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<no body>".to_string());
    let message = upstream_message(&body);
    error!("Remote {} call returned {}: {}", operation, status, message);
    bail!("{} endpoint returned {}: {}", operation, status, message)
}

/// Prefers the `error` field of a JSON error body, falling back to the raw text.
fn upstream_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("error")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

/// The server normally answers with an absolute URL; relative ones are joined to the endpoint.
fn resolve_file_url(endpoint: &Url, file_url: &str) -> Result<Url> {
    if file_url.trim().is_empty() {
        return Err(anyhow!("Response from {} has an empty fileUrl", endpoint));
    }
    endpoint
        .join(file_url)
        .with_context(|| format!("Invalid fileUrl: {}", file_url))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rocket::State;
    use rocket::fairing::AdHoc;
    use rocket::form::{Form, FromForm};
    use rocket::fs::TempFile;
    use rocket::http::{ContentType, Status};
    use rocket::serde::json::Json;
    use rocket::{get, post, routes};
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use tokio::io::AsyncReadExt;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    /// What the stand-in analysis server saw in one multipart request.
    #[derive(Debug, Clone, Default)]
    struct Received {
        object: Option<String>,
        highlight_method: Option<String>,
        file_name: Option<String>,
        content_type: Option<String>,
        image: Vec<u8>,
    }

    type Inbox = Arc<Mutex<Vec<Received>>>;

    #[derive(FromForm)]
    struct AnalysisForm<'r> {
        image: TempFile<'r>,
        object: Option<String>,
        #[field(name = "highlightMethod")]
        highlight_method: Option<String>,
    }

    async fn receive(inbox: &Inbox, form: Form<AnalysisForm<'_>>) {
        let form = form.into_inner();
        let file_name = form
            .image
            .raw_name()
            .map(|name| name.dangerous_unsafe_unsanitized_raw().as_str().to_string());
        let content_type = form.image.content_type().map(|ct| ct.to_string());

        let mut image = Vec::new();
        let reader = form.image.open().await.unwrap();
        tokio::pin!(reader);
        reader.read_to_end(&mut image).await.unwrap();

        inbox.lock().unwrap().push(Received {
            object: form.object,
            highlight_method: form.highlight_method,
            file_name,
            content_type,
            image,
        });
    }

    #[post("/detect", data = "<form>")]
    async fn detect_route(inbox: &State<Inbox>, form: Form<AnalysisForm<'_>>) -> Json<Value> {
        receive(inbox, form).await;
        Json(json!({
            "fileUrl": "/files/png",
            "detections": [{
                "xmin": 1.0, "ymin": 2.0, "xmax": 30.0, "ymax": 40.0,
                "confidence": 0.9, "class": 15, "name": "cat"
            }]
        }))
    }

    #[post("/highlight", data = "<form>")]
    async fn highlight_route(inbox: &State<Inbox>, form: Form<AnalysisForm<'_>>) -> Json<Value> {
        receive(inbox, form).await;
        Json(json!({"fileUrl": "/files/untyped"}))
    }

    #[post("/broken", data = "<form>")]
    async fn broken_route(inbox: &State<Inbox>, form: Form<AnalysisForm<'_>>) -> (Status, Json<Value>) {
        receive(inbox, form).await;
        (
            Status::InternalServerError,
            Json(json!({"error": "Missing parameters"})),
        )
    }

    #[get("/files/png")]
    fn png_file() -> (ContentType, &'static [u8]) {
        (ContentType::PNG, PNG)
    }

    #[get("/files/untyped")]
    fn untyped_file() -> (ContentType, &'static [u8]) {
        (ContentType::Binary, PNG)
    }

    #[get("/files/opaque")]
    fn opaque_file() -> (ContentType, &'static [u8]) {
        (ContentType::Binary, &b"opaque-bytes"[..])
    }

    /// Launches a stand-in analysis server on a free local port and waits for liftoff.
    async fn spawn_analysis_server() -> (String, Inbox) {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let inbox = Inbox::default();
        let (ready_tx, ready_rx) = tokio::sync::oneshot::channel::<()>();
        let ready_tx = Mutex::new(Some(ready_tx));

        let figment = rocket::Config::figment()
            .merge(("address", "127.0.0.1"))
            .merge(("port", port))
            .merge(("log_level", "off"))
            .merge(("shutdown.ctrlc", false));
        let server = rocket::custom(figment)
            .mount(
                "/",
                routes![
                    detect_route,
                    highlight_route,
                    broken_route,
                    png_file,
                    untyped_file,
                    opaque_file
                ],
            )
            .manage(inbox.clone())
            .attach(AdHoc::on_liftoff("Ready", move |_| {
                Box::pin(async move {
                    if let Some(tx) = ready_tx.lock().unwrap().take() {
                        let _ = tx.send(());
                    }
                })
            }));

        tokio::spawn(server.launch());
        ready_rx.await.unwrap();
        (format!("http://127.0.0.1:{}", port), inbox)
    }

    fn client_for(base: &str, detect_path: &str) -> AnalysisClient {
        AnalysisClient::new(&AppConfig {
            detect_url: format!("{}{}", base, detect_path),
            highlight_url: format!("{}/highlight", base),
            ..AppConfig::default()
        })
        .unwrap()
    }

    fn png_payload() -> WorkingPayload {
        WorkingPayload::new(PNG.to_vec(), "image/png").unwrap()
    }

    #[tokio::test]
    async fn detect_sends_image_and_object_parts() {
        let (base, inbox) = spawn_analysis_server().await;
        let client = client_for(&base, "/detect");

        let response = client.detect(&png_payload(), "cat").await.unwrap();

        assert_eq!(response.file_url, format!("{}/files/png", base));
        assert_eq!(response.detections.len(), 1);
        assert_eq!(response.detections[0].name.as_deref(), Some("cat"));
        assert_eq!(response.detections[0].class, Some(15));
        assert_eq!(response.detections[0].xmax, Some(30.0));

        let received = inbox.lock().unwrap().clone();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].object.as_deref(), Some("cat"));
        assert_eq!(received[0].highlight_method, None);
        assert_eq!(received[0].file_name.as_deref(), Some("image.png"));
        assert_eq!(received[0].content_type.as_deref(), Some("image/png"));
        assert_eq!(received[0].image, PNG);
    }

    #[tokio::test]
    async fn highlight_sends_highlight_method_part() {
        let (base, inbox) = spawn_analysis_server().await;
        let client = client_for(&base, "/detect");

        let response = client
            .highlight(&png_payload(), "cat", "blue-border")
            .await
            .unwrap();

        assert_eq!(response.file_url, format!("{}/files/untyped", base));
        let received = inbox.lock().unwrap().clone();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].object.as_deref(), Some("cat"));
        assert_eq!(received[0].highlight_method.as_deref(), Some("blue-border"));
        assert_eq!(received[0].content_type.as_deref(), Some("image/png"));
    }

    #[tokio::test]
    async fn non_success_status_carries_upstream_error() {
        let (base, inbox) = spawn_analysis_server().await;
        let client = client_for(&base, "/broken");

        let error = client.detect(&png_payload(), "cat").await.unwrap_err();

        let message = error.to_string();
        assert!(message.contains("detect endpoint returned 500"));
        assert!(message.contains("Missing parameters"));
        assert_eq!(inbox.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn fetch_prefers_header_then_sniffing_then_fallback() {
        let (base, _inbox) = spawn_analysis_server().await;
        let client = client_for(&base, "/detect");

        let typed = client
            .fetch(&format!("{}/files/png", base), "image/jpeg")
            .await
            .unwrap();
        assert_eq!(typed.media_type, "image/png");
        assert_eq!(typed.bytes, PNG);

        let sniffed = client
            .fetch(&format!("{}/files/untyped", base), "image/jpeg")
            .await
            .unwrap();
        assert_eq!(sniffed.media_type, "image/png");

        let opaque = client
            .fetch(&format!("{}/files/opaque", base), "image/jpeg")
            .await
            .unwrap();
        assert_eq!(opaque.media_type, "image/jpeg");
        assert_eq!(opaque.bytes, b"opaque-bytes");

        let missing = client
            .fetch(&format!("{}/files/gone", base), "image/jpeg")
            .await
            .unwrap_err();
        assert!(missing.to_string().contains("fetch endpoint returned 404"));
    }

    #[test]
    fn absolute_file_url_is_kept() {
        let endpoint = Url::parse("http://ai:5000/detect").unwrap();
        let url = resolve_file_url(
            &endpoint,
            "http://cdn:8080/static/processed/detect_20250101120000.jpg",
        )
        .unwrap();
        assert_eq!(
            url.as_str(),
            "http://cdn:8080/static/processed/detect_20250101120000.jpg"
        );
    }

    #[test]
    fn relative_file_url_is_joined_to_endpoint() {
        let endpoint = Url::parse("http://ai:5000/detect").unwrap();
        let url = resolve_file_url(&endpoint, "/static/processed/a.jpg").unwrap();
        assert_eq!(url.as_str(), "http://ai:5000/static/processed/a.jpg");
        assert!(resolve_file_url(&endpoint, " ").is_err());
    }

    #[test]
    fn upstream_error_field_is_preferred() {
        assert_eq!(
            upstream_message(r#"{"error": "Missing object parameter"}"#),
            "Missing object parameter"
        );
        assert_eq!(upstream_message("Bad Gateway\n"), "Bad Gateway");
        assert_eq!(upstream_message(r#"{"detail": "x"}"#), r#"{"detail": "x"}"#);
    }

    #[test]
    fn form_rejects_unparseable_media_type() {
        let payload = WorkingPayload::new(vec![1, 2, 3], "not a mime").unwrap();
        assert!(build_form(&payload, &[("object", "cat")]).is_err());

        let payload = WorkingPayload::new(vec![1, 2, 3], "image/png").unwrap();
        assert!(build_form(&payload, &[("object", "cat")]).is_ok());
    }

    #[test]
    fn client_builds_from_default_config() {
        assert!(AnalysisClient::new(&AppConfig::default()).is_ok());
    }

    #[tokio::test]
    async fn unreachable_server_is_an_error() {
        let config = AppConfig {
            detect_url: "http://127.0.0.1:9/detect".to_string(),
            ..AppConfig::default()
        };
        let client = AnalysisClient::new(&config).unwrap();
        let payload = WorkingPayload::new(vec![1, 2, 3], "image/png").unwrap();
        let error = client.detect(&payload, "cat").await.unwrap_err();
        assert!(error.to_string().contains("detect"));
    }
}
