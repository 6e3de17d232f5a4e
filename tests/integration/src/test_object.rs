//! Pass-through object reads and writes.

#[cfg(test)]
mod tests {
    use crate::{TestGateway, test_bucket_name};

    #[tokio::test]
    async fn test_should_report_health() {
        let gateway = TestGateway::start_default().await;

        let resp = gateway
            .client()
            .get(gateway.url("/health"))
            .send()
            .await
            .expect("health");
        assert_eq!(resp.status(), 200);
        assert!(resp.headers().contains_key("x-request-id"));
        let json: serde_json::Value = resp.json().await.expect("json body");
        assert_eq!(json["status"], "running");
    }

    #[tokio::test]
    async fn test_should_put_and_get_object() {
        let gateway = TestGateway::start_default().await;
        let bucket = test_bucket_name("putget");
        gateway.backend.create_bucket(&bucket);
        let url = gateway.url(&format!("/{bucket}/docs/greeting.txt"));

        let resp = gateway
            .client()
            .put(&url)
            .header("Content-Type", "text/plain")
            .header("x-amz-meta-owner", "tests")
            .body("hello, colvault!")
            .send()
            .await
            .expect("put");
        assert_eq!(resp.status(), 200);
        let json: serde_json::Value = resp.json().await.expect("json body");
        assert_eq!(json["versionId"], "v1");

        let stored = gateway
            .backend
            .object(&bucket, "docs/greeting.txt")
            .expect("stored");
        assert_eq!(stored.metadata.get("owner").map(String::as_str), Some("tests"));

        let resp = gateway.client().get(&url).send().await.expect("get");
        assert_eq!(resp.status(), 200);
        assert_eq!(
            resp.headers()
                .get("content-type")
                .and_then(|v| v.to_str().ok()),
            Some("text/plain")
        );
        assert_eq!(
            resp.headers()
                .get("accept-ranges")
                .and_then(|v| v.to_str().ok()),
            Some("bytes")
        );
        assert_eq!(resp.content_length(), Some(16));
        assert_eq!(resp.text().await.expect("text"), "hello, colvault!");
    }

    #[tokio::test]
    async fn test_should_decode_percent_encoded_keys() {
        let gateway = TestGateway::start_default().await;
        let bucket = test_bucket_name("encoded");
        gateway.backend.insert(&bucket, "a b/c.txt", "spaced", "text/plain");

        let resp = gateway
            .client()
            .get(gateway.url(&format!("/{bucket}/a%20b/c.txt")))
            .send()
            .await
            .expect("get");
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.text().await.expect("text"), "spaced");
    }

    #[tokio::test]
    async fn test_should_return_not_found_json() {
        let gateway = TestGateway::start_default().await;
        let bucket = test_bucket_name("missing");
        gateway.backend.create_bucket(&bucket);

        let resp = gateway
            .client()
            .get(gateway.url(&format!("/{bucket}/nope.txt")))
            .send()
            .await
            .expect("get");
        assert_eq!(resp.status(), 404);
        let json: serde_json::Value = resp.json().await.expect("json body");
        assert_eq!(json["error"], "Bucket or object not found");
    }

    #[tokio::test]
    async fn test_should_require_object_key() {
        let gateway = TestGateway::start_default().await;

        let resp = gateway
            .client()
            .get(gateway.url("/only-bucket"))
            .send()
            .await
            .expect("get");
        assert_eq!(resp.status(), 400);
        let json: serde_json::Value = resp.json().await.expect("json body");
        assert!(json["error"].is_string());
    }

    #[tokio::test]
    async fn test_should_reject_malformed_and_unsatisfiable_ranges() {
        let gateway = TestGateway::start_default().await;
        let bucket = test_bucket_name("ranges");
        gateway
            .backend
            .insert(&bucket, "data.bin", "0123456789", "application/octet-stream");
        let url = gateway.url(&format!("/{bucket}/data.bin"));

        let resp = gateway
            .client()
            .get(&url)
            .header("Range", "bytes=-0")
            .send()
            .await
            .expect("get");
        assert_eq!(resp.status(), 400);

        let resp = gateway
            .client()
            .get(&url)
            .header("Range", "bytes=10-")
            .send()
            .await
            .expect("get");
        assert_eq!(resp.status(), 416);
        assert_eq!(
            resp.headers()
                .get("content-range")
                .and_then(|v| v.to_str().ok()),
            Some("bytes */10")
        );

        let resp = gateway
            .client()
            .get(&url)
            .header("Range", "bytes=3-100")
            .send()
            .await
            .expect("get");
        assert_eq!(resp.status(), 206);
        assert_eq!(
            resp.headers()
                .get("content-range")
                .and_then(|v| v.to_str().ok()),
            Some("bytes 3-9/10")
        );
        assert_eq!(resp.text().await.expect("text"), "3456789");
    }

    #[tokio::test]
    async fn test_should_reject_other_methods() {
        let gateway = TestGateway::start_default().await;

        let resp = gateway
            .client()
            .delete(gateway.url("/bucket/key"))
            .send()
            .await
            .expect("delete");
        assert_eq!(resp.status(), 405);
    }
}
