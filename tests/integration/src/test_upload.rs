//! Upload buffering and size limits.

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use colvault_core::upload::UploadSettings;
    use futures::stream;

    use crate::{TestGateway, test_bucket_name};

    const LIMIT: u64 = 64;

    async fn limited_gateway() -> TestGateway {
        TestGateway::start(UploadSettings {
            force_buffering: true,
            max_buffer_bytes: LIMIT,
            temp_dir: None,
        })
        .await
    }

    #[tokio::test]
    async fn test_should_accept_upload_at_exact_limit() {
        let gateway = limited_gateway().await;
        let bucket = test_bucket_name("limit");
        gateway.backend.create_bucket(&bucket);

        let resp = gateway
            .client()
            .put(gateway.url(&format!("/{bucket}/exact.bin")))
            .body(vec![b'x'; 64])
            .send()
            .await
            .expect("put");
        assert_eq!(resp.status(), 200);
        assert_eq!(
            resp.headers()
                .get("x-upload-buffered-size")
                .and_then(|v| v.to_str().ok()),
            Some("64")
        );
        let stored = gateway.backend.object(&bucket, "exact.bin").expect("stored");
        assert_eq!(stored.data.len(), 64);
    }

    #[tokio::test]
    async fn test_should_reject_upload_over_limit() {
        let gateway = limited_gateway().await;
        let bucket = test_bucket_name("over");
        gateway.backend.create_bucket(&bucket);

        let resp = gateway
            .client()
            .put(gateway.url(&format!("/{bucket}/big.bin")))
            .body(vec![b'x'; 65])
            .send()
            .await
            .expect("put");
        assert_eq!(resp.status(), 413);
        let json: serde_json::Value = resp.json().await.expect("json body");
        assert_eq!(json["error"], "Upload exceeds max buffer size");
        assert!(gateway.backend.object(&bucket, "big.bin").is_none());
    }

    #[tokio::test]
    async fn test_should_reject_streamed_upload_over_limit() {
        let gateway = limited_gateway().await;
        let bucket = test_bucket_name("streamover");
        gateway.backend.create_bucket(&bucket);

        let chunks: Vec<Result<Bytes, std::io::Error>> =
            (0..5).map(|_| Ok(Bytes::from_static(&[b'y'; 20]))).collect();
        let resp = gateway
            .client()
            .put(gateway.url(&format!("/{bucket}/chunked.bin")))
            .body(reqwest::Body::wrap_stream(stream::iter(chunks)))
            .send()
            .await
            .expect("put");
        assert_eq!(resp.status(), 413);
        assert!(gateway.backend.object(&bucket, "chunked.bin").is_none());
    }

    #[tokio::test]
    async fn test_should_buffer_streamed_upload_and_report_size() {
        let gateway = TestGateway::start_default().await;
        let bucket = test_bucket_name("stream");
        gateway.backend.create_bucket(&bucket);

        let chunks: Vec<Result<Bytes, std::io::Error>> = ["alpha,", "beta,", "gamma"]
            .into_iter()
            .map(|c| Ok(Bytes::from_static(c.as_bytes())))
            .collect();
        let resp = gateway
            .client()
            .put(gateway.url(&format!("/{bucket}/list.csv")))
            .header("Content-Type", "text/csv")
            .body(reqwest::Body::wrap_stream(stream::iter(chunks)))
            .send()
            .await
            .expect("put");
        assert_eq!(resp.status(), 200);
        assert_eq!(
            resp.headers()
                .get("x-upload-buffered")
                .and_then(|v| v.to_str().ok()),
            Some("true")
        );
        assert_eq!(
            resp.headers()
                .get("x-upload-buffered-size")
                .and_then(|v| v.to_str().ok()),
            Some("16")
        );

        let stored = gateway.backend.object(&bucket, "list.csv").expect("stored");
        assert_eq!(stored.data.as_ref(), b"alpha,beta,gamma");
        assert_eq!(stored.content_type, "text/csv");
    }

    #[tokio::test]
    async fn test_should_report_missing_bucket_with_buffering_headers() {
        let gateway = TestGateway::start_default().await;

        let resp = gateway
            .client()
            .put(gateway.url("/no-such-bucket/file.txt"))
            .body("abc")
            .send()
            .await
            .expect("put");
        assert_eq!(resp.status(), 404);
        assert_eq!(
            resp.headers()
                .get("x-upload-buffered")
                .and_then(|v| v.to_str().ok()),
            Some("true")
        );
    }
}
