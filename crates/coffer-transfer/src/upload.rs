use std::io::{self, Write};

use anyhow::{bail, Context, Result};
use coffer_core::transfer::BodyProducer;
use futures::Stream;
use reqwest::{
    header::USER_AGENT,
    multipart::{Form, Part},
    Body, Client,
};
use serde::Deserialize;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{info, instrument};

use crate::TrackedBody;

/// Chunks buffered between the producer thread and the HTTP stream.
const CHANNEL_DEPTH: usize = 4;

/// Where the server says the uploaded file now lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub file_url: String,
    pub file_size: u64,
    pub file_name: String,
    pub mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    file_url: Option<String>,
    #[serde(default)]
    file_size: Option<u64>,
    #[serde(default)]
    file_name: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
}

/// Posts tracked bodies as the `file` part of a multipart form.
pub struct Uploader {
    client: Client,
    endpoint: String,
}

impl Uploader {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_client(Client::new(), endpoint)
    }

    pub fn with_client(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    /// Stream `body` to the endpoint, authenticated with `auth_token`.
    ///
    /// Progress callbacks on `body` fire as chunks are handed to the HTTP stream.
    #[instrument(skip_all, fields(endpoint = %self.endpoint, file_name = %file_name))]
    pub async fn upload<P: BodyProducer + 'static>(
        &self,
        body: TrackedBody<P>,
        file_name: &str,
        auth_token: &str,
    ) -> Result<UploadReceipt> {
        let content_type = body.content_type().map(str::to_string);
        let length = body.content_length();
        info!(?length, ?content_type, "starting upload");

        let (stream, writer) = body_stream(body);
        let stream_body = Body::wrap_stream(stream);
        let mut part = match length {
            Some(len) => Part::stream_with_length(stream_body, len),
            None => Part::stream(stream_body),
        }
        .file_name(file_name.to_string());
        if let Some(mime) = &content_type {
            part = part
                .mime_str(mime)
                .with_context(|| format!("invalid content type {mime}"))?;
        }

        let sent = self
            .client
            .post(&self.endpoint)
            .header(USER_AGENT, "coffer")
            .bearer_auth(auth_token)
            .multipart(Form::new().part("file", part))
            .send()
            .await;
        let produced = writer.await.context("body writer task failed")?;

        let response = sent
            .context("upload request failed")?
            .error_for_status()
            .context("upload rejected")?;
        let written = produced.context("body producer failed")?;

        let parsed: UploadResponse = response
            .json()
            .await
            .context("upload response is not valid json")?;
        let receipt = receipt_from_response(parsed, file_name, content_type.as_deref())?;
        info!(written, file_url = %receipt.file_url, "upload finished");
        Ok(receipt)
    }
}

/// Run the producer on a blocking thread and expose its output as a byte stream.
///
/// The returned handle resolves to the number of bytes produced, or to the
/// producer's error (which is also forwarded into the stream).
pub fn body_stream<P: BodyProducer + 'static>(
    body: TrackedBody<P>,
) -> (
    impl Stream<Item = io::Result<Vec<u8>>> + Send + 'static,
    JoinHandle<io::Result<u64>>,
) {
    let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);

    let writer = tokio::task::spawn_blocking(move || {
        let mut sink = ChannelSink { tx: tx.clone() };
        let result = body.write_session(&mut sink);
        if let Err(err) = &result {
            // The receiver may already be gone; the handle still reports the error.
            let _ = tx.blocking_send(Err(io::Error::new(err.kind(), err.to_string())));
        }
        result
    });

    let stream = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    });

    (stream, writer)
}

struct ChannelSink {
    tx: mpsc::Sender<io::Result<Vec<u8>>>,
}

impl Write for ChannelSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.tx
            .blocking_send(Ok(buf.to_vec()))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "upload stream closed"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn receipt_from_response(
    response: UploadResponse,
    uploaded_name: &str,
    uploaded_mime: Option<&str>,
) -> Result<UploadReceipt> {
    if response.status != "success" {
        bail!(
            "upload failed with status {}: {}",
            response.status,
            response.message.as_deref().unwrap_or("no message")
        );
    }

    Ok(UploadReceipt {
        file_url: response
            .file_url
            .context("upload response missing file_url")?,
        file_size: response
            .file_size
            .context("upload response missing file_size")?,
        file_name: response
            .file_name
            .unwrap_or_else(|| uploaded_name.to_string()),
        mime_type: response
            .mime_type
            .or_else(|| uploaded_mime.map(str::to_string)),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use futures::StreamExt;

    use super::*;
    use crate::BytesBody;

    #[tokio::test]
    async fn stream_yields_exact_producer_bytes() {
        let data: Vec<u8> = (0..40_000u32).map(|i| (i % 253) as u8).collect();
        let progress = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&progress);
        let body = TrackedBody::with_listener(
            BytesBody::new(data.clone(), Some("application/octet-stream")),
            move |written: u64, _total: Option<u64>| seen.lock().expect("lock").push(written),
        );

        let (stream, writer) = body_stream(body);
        let chunks: Vec<io::Result<Vec<u8>>> = stream.collect().await;
        let written = writer.await.expect("join").expect("producer");

        let received: Vec<u8> = chunks
            .into_iter()
            .flat_map(|c| c.expect("chunk"))
            .collect();
        assert_eq!(received, data);
        assert_eq!(written, 40_000);
        assert_eq!(progress.lock().expect("lock").last(), Some(&40_000));
    }

    #[tokio::test]
    async fn producer_errors_reach_stream_and_handle() {
        struct Failing;
        impl BodyProducer for Failing {
            fn content_type(&self) -> Option<&str> {
                None
            }
            fn content_length(&self) -> Option<u64> {
                None
            }
            fn write_to(&self, sink: &mut dyn Write) -> io::Result<()> {
                sink.write_all(b"partial")?;
                Err(io::Error::new(io::ErrorKind::UnexpectedEof, "source truncated"))
            }
        }

        let (stream, writer) = body_stream(TrackedBody::untracked(Failing));
        let chunks: Vec<io::Result<Vec<u8>>> = stream.collect().await;

        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].is_ok());
        let err = chunks[1].as_ref().expect_err("stream error");
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);

        let handle_err = writer.await.expect("join").expect_err("producer error");
        assert_eq!(handle_err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn parses_success_response_with_fallbacks() {
        let response: UploadResponse = serde_json::from_str(
            r#"{"status":"success","file_url":"https://cdn.example/f/1.png","file_size":1234}"#,
        )
        .expect("parse");

        let receipt = receipt_from_response(response, "1.png", Some("image/png")).expect("ok");
        assert_eq!(
            receipt,
            UploadReceipt {
                file_url: "https://cdn.example/f/1.png".into(),
                file_size: 1234,
                file_name: "1.png".into(),
                mime_type: Some("image/png".into()),
            }
        );
    }

    #[test]
    fn server_fields_override_uploaded_metadata() {
        let response: UploadResponse = serde_json::from_str(
            r#"{"status":"success","file_url":"u","file_size":1,"file_name":"renamed.jpg","mime_type":"image/jpeg"}"#,
        )
        .expect("parse");

        let receipt = receipt_from_response(response, "orig.bin", None).expect("ok");
        assert_eq!(receipt.file_name, "renamed.jpg");
        assert_eq!(receipt.mime_type.as_deref(), Some("image/jpeg"));
    }

    #[test]
    fn non_success_status_is_an_error() {
        let response: UploadResponse =
            serde_json::from_str(r#"{"status":"error","message":"too large"}"#).expect("parse");

        let err = receipt_from_response(response, "a", None).expect_err("should fail");
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn success_without_url_is_an_error() {
        let response: UploadResponse =
            serde_json::from_str(r#"{"status":"success","file_size":3}"#).expect("parse");

        assert!(receipt_from_response(response, "a", None).is_err());
    }
}
