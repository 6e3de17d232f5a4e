//! Fixed key material for Parquet modular encryption.
//!
//! One footer key and one column key, each bound to a short identifier that is
//! stored in the file metadata. The same material is used for every file this
//! process handles; there is no per-object or per-tenant key.

use std::fmt;
use std::sync::Arc;

use parquet::encryption::decrypt::{FileDecryptionProperties, KeyRetriever};
use parquet::encryption::encrypt::FileEncryptionProperties;
use parquet::errors::ParquetError;

use super::CodecError;

/// Identifier stored with the footer key.
pub const FOOTER_KEY_ID: &str = "footer_key";

/// Identifier stored with the column key.
pub const COLUMN_KEY_ID: &str = "column_key";

static PROCESS_KEYS: EncryptionKeyMaterial = EncryptionKeyMaterial {
    footer_key_id: FOOTER_KEY_ID,
    footer_key: *b"0123456789abcdef",
    column_key_id: COLUMN_KEY_ID,
    column_key: *b"abcdef0123456789",
};

/// Two AES-128 keys and their identifiers.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct EncryptionKeyMaterial {
    footer_key_id: &'static str,
    footer_key: [u8; 16],
    column_key_id: &'static str,
    column_key: [u8; 16],
}

impl fmt::Debug for EncryptionKeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKeyMaterial")
            .field("footer_key_id", &self.footer_key_id)
            .field("column_key_id", &self.column_key_id)
            .finish_non_exhaustive()
    }
}

impl EncryptionKeyMaterial {
    /// Create key material from explicit keys and identifiers.
    #[must_use]
    pub const fn new(
        footer_key_id: &'static str,
        footer_key: [u8; 16],
        column_key_id: &'static str,
        column_key: [u8; 16],
    ) -> Self {
        Self {
            footer_key_id,
            footer_key,
            column_key_id,
            column_key,
        }
    }

    /// The material shared by every file processed by this process.
    #[must_use]
    pub fn process_wide() -> &'static Self {
        &PROCESS_KEYS
    }

    /// Resolve a key identifier read from file metadata.
    pub fn key_for(&self, key_metadata: &[u8]) -> Result<Vec<u8>, CodecError> {
        if key_metadata == self.footer_key_id.as_bytes() {
            Ok(self.footer_key.to_vec())
        } else if key_metadata == self.column_key_id.as_bytes() {
            Ok(self.column_key.to_vec())
        } else {
            Err(CodecError::UnknownKeyMetadata(
                String::from_utf8_lossy(key_metadata).into_owned(),
            ))
        }
    }

    /// Encryption properties for a file whose listed columns are encrypted.
    ///
    /// The footer stays in plaintext (signed with the footer key) so the schema
    /// can be read without keys; every listed column uses the column key.
    pub fn encryption_properties(
        &self,
        column_paths: &[String],
    ) -> Result<FileEncryptionProperties, CodecError> {
        let builder = column_paths.iter().fold(
            FileEncryptionProperties::builder(self.footer_key.to_vec())
                .with_footer_key_metadata(self.footer_key_id.as_bytes().to_vec())
                .with_plaintext_footer(true),
            |builder, path| {
                builder.with_column_key_and_metadata(
                    path,
                    self.column_key.to_vec(),
                    self.column_key_id.as_bytes().to_vec(),
                )
            },
        );
        Ok(builder.build()?)
    }

    /// Decryption properties resolving this material's two identifiers.
    pub fn decryption_properties(&self) -> Result<FileDecryptionProperties, CodecError> {
        let retriever: Arc<dyn KeyRetriever> = Arc::new(FixedKeyRetriever { keys: *self });
        Ok(FileDecryptionProperties::with_key_retriever(retriever).build()?)
    }
}

/// [`KeyRetriever`] backed by [`EncryptionKeyMaterial`].
struct FixedKeyRetriever {
    keys: EncryptionKeyMaterial,
}

impl KeyRetriever for FixedKeyRetriever {
    fn retrieve_key(&self, key_metadata: &[u8]) -> parquet::errors::Result<Vec<u8>> {
        self.keys
            .key_for(key_metadata)
            .map_err(|e| ParquetError::General(e.to_string()))
    }
}
