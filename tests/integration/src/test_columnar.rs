//! Parquet encryption round trips through the gateway.

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use colvault_core::columnar::EncryptionKeyMaterial;
    use futures::stream;
    use parquet::arrow::arrow_reader::{ArrowReaderMetadata, ArrowReaderOptions};

    use crate::{TestGateway, parquet_row_count, sample_parquet, test_bucket_name};

    #[tokio::test]
    async fn test_should_store_parquet_encrypted_and_serve_plaintext() {
        let gateway = TestGateway::start_default().await;
        let bucket = test_bucket_name("parquet");
        gateway.backend.create_bucket(&bucket);
        let plain = sample_parquet(500);

        let resp = gateway
            .client()
            .put(gateway.url(&format!("/{bucket}/people.parquet")))
            .body(plain.to_vec())
            .send()
            .await
            .expect("put parquet");
        assert_eq!(resp.status(), 200);
        assert_eq!(
            resp.headers()
                .get("x-upload-buffered")
                .and_then(|v| v.to_str().ok()),
            Some("false"),
            "columnar uploads are encrypted in memory"
        );

        let stored = gateway
            .backend
            .object(&bucket, "people.parquet")
            .expect("stored object");
        assert_ne!(stored.data, plain, "object should be stored encrypted");
        let decryption = EncryptionKeyMaterial::process_wide()
            .decryption_properties()
            .expect("decryption properties");
        let metadata = ArrowReaderMetadata::load(
            &stored.data,
            ArrowReaderOptions::new().with_file_decryption_properties(decryption),
        )
        .expect("stored metadata");
        for row_group in metadata.metadata().row_groups() {
            assert!(
                row_group
                    .columns()
                    .iter()
                    .all(|column| column.crypto_metadata().is_some()),
                "every column should be encrypted"
            );
        }

        let resp = gateway
            .client()
            .get(gateway.url(&format!("/{bucket}/people.parquet")))
            .send()
            .await
            .expect("get parquet");
        assert_eq!(resp.status(), 200);
        assert_eq!(
            resp.headers()
                .get("content-type")
                .and_then(|v| v.to_str().ok()),
            Some("application/vnd.apache.parquet")
        );
        let body = resp.bytes().await.expect("body");
        assert_eq!(parquet_row_count(body), 500);
    }

    #[tokio::test]
    async fn test_should_slice_ranges_from_decrypted_parquet() {
        let gateway = TestGateway::start_default().await;
        let bucket = test_bucket_name("prange");
        gateway.backend.create_bucket(&bucket);
        let url = gateway.url(&format!("/{bucket}/people.parquet"));

        gateway
            .client()
            .put(&url)
            .body(sample_parquet(300).to_vec())
            .send()
            .await
            .expect("put parquet");

        let full = gateway
            .client()
            .get(&url)
            .send()
            .await
            .expect("full get")
            .bytes()
            .await
            .expect("full body");
        assert!(full.len() > 100);

        let resp = gateway
            .client()
            .get(&url)
            .header("Range", "bytes=0-99")
            .send()
            .await
            .expect("ranged get");
        assert_eq!(resp.status(), 206);
        assert_eq!(
            resp.headers()
                .get("content-range")
                .and_then(|v| v.to_str().ok()),
            Some(format!("bytes 0-99/{}", full.len()).as_str())
        );
        let slice = resp.bytes().await.expect("slice");
        assert_eq!(slice, full.slice(..100));

        let resp = gateway
            .client()
            .get(&url)
            .header("Range", "bytes=-4")
            .send()
            .await
            .expect("suffix get");
        assert_eq!(resp.status(), 206);
        let tail = resp.bytes().await.expect("tail");
        assert_eq!(tail.as_ref(), b"PAR1");
    }

    #[tokio::test]
    async fn test_should_encrypt_parquet_streamed_without_length() {
        let gateway = TestGateway::start_default().await;
        let bucket = test_bucket_name("pstream");
        gateway.backend.create_bucket(&bucket);
        let plain = sample_parquet(200);

        let chunks: Vec<Result<Bytes, std::io::Error>> = plain
            .chunks(97)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        let resp = gateway
            .client()
            .put(gateway.url(&format!("/{bucket}/blob")))
            .header("Content-Type", "application/vnd.apache.parquet")
            .body(reqwest::Body::wrap_stream(stream::iter(chunks)))
            .send()
            .await
            .expect("streamed put");
        assert_eq!(resp.status(), 200);
        let json: serde_json::Value = resp.json().await.expect("json body");
        assert!(json["etag"].is_string());

        let stored = gateway.backend.object(&bucket, "blob").expect("stored");
        assert_eq!(stored.content_type, "application/vnd.apache.parquet");
        let decrypted = colvault_core::columnar::decrypt(stored.data)
            .await
            .expect("decrypt stored object");
        assert_eq!(parquet_row_count(decrypted), 200);
    }

    #[tokio::test]
    async fn test_should_reject_invalid_parquet_upload() {
        let gateway = TestGateway::start_default().await;
        let bucket = test_bucket_name("pbad");
        gateway.backend.create_bucket(&bucket);

        let resp = gateway
            .client()
            .put(gateway.url(&format!("/{bucket}/broken.parquet")))
            .body("definitely not parquet")
            .send()
            .await
            .expect("put");
        assert_eq!(resp.status(), 400);
        let json: serde_json::Value = resp.json().await.expect("json body");
        let message = json["error"].as_str().expect("error message");
        assert!(message.starts_with("Failed to encrypt parquet file: "));
        assert!(gateway.backend.object(&bucket, "broken.parquet").is_none());
    }
}
