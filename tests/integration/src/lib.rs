//! End-to-end tests for the colvault gateway.
//!
//! Each test starts a gateway in-process on an ephemeral port, backed by a
//! [`MemoryBackend`], and talks to it over real HTTP with `reqwest`.
//!
//! Run them with:
//! ```text
//! cargo test -p colvault-integration
//! ```

use std::sync::{Arc, Once};

use colvault_core::ClientResolver;
use colvault_core::backend::memory::MemoryBackend;
use colvault_core::backend::s3::S3BackendFactory;
use colvault_core::upload::UploadSettings;
use colvault_http::{GatewayService, ObjectHandler};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as HttpConnBuilder;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

static INIT: Once = Once::new();

/// Initialize tracing (once).
fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// A gateway listening on a loopback port. The accept loop stops on drop.
#[derive(Debug)]
pub struct TestGateway {
    /// Storage behind the gateway.
    pub backend: Arc<MemoryBackend>,
    base_url: String,
    client: reqwest::Client,
    accept_loop: JoinHandle<()>,
}

impl TestGateway {
    /// Start a gateway with the given upload settings.
    pub async fn start(upload: UploadSettings) -> Self {
        init_tracing();

        let backend = Arc::new(MemoryBackend::new());
        let resolver = ClientResolver::new(
            Arc::clone(&backend) as _,
            Arc::new(S3BackendFactory::new("us-east-1", None)),
        );
        let service = GatewayService::new(ObjectHandler::new(resolver, upload));

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind ephemeral port");
        let addr = listener.local_addr().expect("local addr");

        let accept_loop = tokio::spawn(async move {
            let http = HttpConnBuilder::new(TokioExecutor::new());
            while let Ok((stream, _)) = listener.accept().await {
                let conn = http
                    .serve_connection(TokioIo::new(stream), service.clone())
                    .into_owned();
                tokio::spawn(async move {
                    let _ = conn.await;
                });
            }
        });

        Self {
            backend,
            base_url: format!("http://{addr}"),
            client: reqwest::Client::new(),
            accept_loop,
        }
    }

    /// Start a gateway with forced buffering and a 1 MiB upload limit.
    pub async fn start_default() -> Self {
        Self::start(UploadSettings {
            force_buffering: true,
            max_buffer_bytes: 1024 * 1024,
            temp_dir: None,
        })
        .await
    }

    /// Absolute URL for a gateway path.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// HTTP client for requests against this gateway.
    #[must_use]
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.accept_loop.abort();
    }
}

/// Generate a unique bucket name for a test.
#[must_use]
pub fn test_bucket_name(prefix: &str) -> String {
    let id = uuid::Uuid::new_v4().to_string()[..8].to_owned();
    format!("test-{prefix}-{id}")
}

/// Build a plain Parquet file with `rows` rows of `(id INT64, name UTF8)`.
#[must_use]
pub fn sample_parquet(rows: i64) -> bytes::Bytes {
    use parquet::data_type::{ByteArray, ByteArrayType, Int64Type};
    use parquet::file::properties::WriterProperties;
    use parquet::file::writer::SerializedFileWriter;
    use parquet::schema::parser::parse_message_type;

    let schema = Arc::new(
        parse_message_type(
            "message people { REQUIRED INT64 id; REQUIRED BYTE_ARRAY name (UTF8); }",
        )
        .expect("schema"),
    );
    let mut out = Vec::new();
    let mut writer = SerializedFileWriter::new(
        &mut out,
        schema,
        Arc::new(WriterProperties::builder().build()),
    )
    .expect("writer");

    let ids: Vec<i64> = (0..rows).collect();
    let names: Vec<ByteArray> = ids
        .iter()
        .map(|i| ByteArray::from(format!("person-{i:05}").as_str()))
        .collect();

    let mut rg = writer.next_row_group().expect("row group");
    let mut column = rg.next_column().expect("id column").expect("id present");
    column
        .typed::<Int64Type>()
        .write_batch(&ids, None, None)
        .expect("write ids");
    column.close().expect("close ids");
    let mut column = rg.next_column().expect("name column").expect("name present");
    column
        .typed::<ByteArrayType>()
        .write_batch(&names, None, None)
        .expect("write names");
    column.close().expect("close names");
    rg.close().expect("close row group");
    writer.close().expect("close file");

    bytes::Bytes::from(out)
}

/// Number of rows in a plain Parquet file.
#[must_use]
pub fn parquet_row_count(data: bytes::Bytes) -> i64 {
    use parquet::file::reader::FileReader;
    use parquet::file::serialized_reader::SerializedFileReader;

    let reader = SerializedFileReader::new(data).expect("plain parquet reader");
    reader.metadata().file_metadata().num_rows()
}

mod test_columnar;
mod test_object;
mod test_upload;
