//! Parquet rewrites in both directions.
//!
//! Encryption copies the plain source column by column: open it, create a
//! writer with the same schema and key-value metadata plus the encryption
//! properties, then copy every row group in order and every column in schema
//! order. Each column moves in record-bounded batches through the
//! definition/repetition-level interface, so nulls and nested repetition
//! survive unchanged.
//!
//! Decryption goes through the arrow reader, the only reader that decrypts
//! pages. Each source row group is decoded and flushed as one output row
//! group, and the source key-value metadata is carried over. Arrow has no
//! INT96 or bare repeated field, so those come back as
//! `INT64 TIMESTAMP(NANOS)` and a standard `LIST` respectively.

use std::sync::Arc;

use bytes::Bytes;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::{
    ArrowReaderMetadata, ArrowReaderOptions, ParquetRecordBatchReaderBuilder,
};
use parquet::basic::Type as PhysicalType;
use parquet::column::reader::{ColumnReader, ColumnReaderImpl};
use parquet::column::writer::{ColumnWriter, ColumnWriterImpl};
use parquet::data_type::DataType;
use parquet::encryption::encrypt::FileEncryptionProperties;
use parquet::errors::ParquetError;
use parquet::file::properties::WriterProperties;
use parquet::file::reader::FileReader;
use parquet::file::serialized_reader::SerializedFileReader;
use parquet::file::writer::SerializedFileWriter;
use parquet::schema::types::{ColumnDescriptor, SchemaDescriptor};
use tracing::debug;

use super::CodecError;
use super::keys::EncryptionKeyMaterial;

/// Maximum number of records moved per batch.
const RECORD_BATCH_SIZE: usize = 1024;

/// The eight physical column representations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnPhysicalType {
    /// Bit-packed booleans.
    Boolean,
    /// 32-bit signed integers.
    Int32,
    /// 64-bit signed integers.
    Int64,
    /// 12-byte legacy timestamps.
    Int96,
    /// IEEE 754 single precision.
    Float32,
    /// IEEE 754 double precision.
    Float64,
    /// Length-prefixed byte arrays.
    VariableByteArray,
    /// Byte arrays of a fixed length.
    FixedByteArray,
}

impl From<PhysicalType> for ColumnPhysicalType {
    fn from(value: PhysicalType) -> Self {
        match value {
            PhysicalType::BOOLEAN => Self::Boolean,
            PhysicalType::INT32 => Self::Int32,
            PhysicalType::INT64 => Self::Int64,
            PhysicalType::INT96 => Self::Int96,
            PhysicalType::FLOAT => Self::Float32,
            PhysicalType::DOUBLE => Self::Float64,
            PhysicalType::BYTE_ARRAY => Self::VariableByteArray,
            PhysicalType::FIXED_LEN_BYTE_ARRAY => Self::FixedByteArray,
        }
    }
}

/// Encrypt `input`, returning the rewritten file.
///
/// `columns` selects columns by leaf name or dotted path, case-insensitively;
/// `None` encrypts every column. A selection matching no column produces an
/// unencrypted copy.
pub fn encrypt(
    input: Bytes,
    columns: Option<&[String]>,
    keys: &EncryptionKeyMaterial,
) -> Result<Vec<u8>, CodecError> {
    let reader = SerializedFileReader::new(input)?;
    let schema = reader.metadata().file_metadata().schema_descr_ptr();
    let selected = select_columns(&schema, columns);

    let encryption = if selected.is_empty() {
        debug!("no column selected for encryption, writing plain copy");
        None
    } else {
        Some(keys.encryption_properties(&selected)?)
    };
    debug!(columns = selected.len(), "encrypting columnar file");
    rewrite(&reader, encryption)
}

/// Decrypt `input`, returning an unencrypted file.
///
/// The output keeps the source row-group boundaries and key-value metadata.
pub fn decrypt(input: Bytes, keys: &EncryptionKeyMaterial) -> Result<Vec<u8>, CodecError> {
    let options =
        ArrowReaderOptions::new().with_file_decryption_properties(keys.decryption_properties()?);
    let metadata = ArrowReaderMetadata::load(&input, options)?;
    let file_metadata = metadata.metadata().file_metadata();
    let num_row_groups = metadata.metadata().num_row_groups();

    let mut props = WriterProperties::builder()
        .set_key_value_metadata(file_metadata.key_value_metadata().cloned());
    let largest_row_group = metadata
        .metadata()
        .row_groups()
        .iter()
        .filter_map(|rg| usize::try_from(rg.num_rows()).ok())
        .max()
        .unwrap_or_default();
    if largest_row_group > 0 {
        props = props.set_max_row_group_size(largest_row_group);
    }

    let mut out = Vec::new();
    let mut writer =
        ArrowWriter::try_new(&mut out, Arc::clone(metadata.schema()), Some(props.build()))?;

    for rg_index in 0..num_row_groups {
        let batches =
            ParquetRecordBatchReaderBuilder::new_with_metadata(input.clone(), metadata.clone())
                .with_row_groups(vec![rg_index])
                .with_batch_size(RECORD_BATCH_SIZE)
                .build()?;
        for batch in batches {
            writer.write(&batch.map_err(ParquetError::from)?)?;
        }
        writer.flush()?;
    }

    debug!(row_groups = num_row_groups, "decrypted columnar file");
    writer.close()?;
    Ok(out)
}

/// Rewrite an unencrypted file without changing its encryption state.
pub fn reencode(input: Bytes) -> Result<Vec<u8>, CodecError> {
    let reader = SerializedFileReader::new(input)?;
    rewrite(&reader, None)
}

/// Dotted paths of the leaf columns picked by `selection`.
#[must_use]
pub fn select_columns(schema: &SchemaDescriptor, selection: Option<&[String]>) -> Vec<String> {
    schema
        .columns()
        .iter()
        .filter(|column| {
            selection.is_none_or(|names| {
                let path = column.path().string();
                names.iter().any(|name| {
                    name.eq_ignore_ascii_case(column.name()) || name.eq_ignore_ascii_case(&path)
                })
            })
        })
        .map(|column| column.path().string())
        .collect()
}

/// Copy a plain file, encrypting it when `encryption` is set.
fn rewrite(
    reader: &SerializedFileReader<Bytes>,
    encryption: Option<FileEncryptionProperties>,
) -> Result<Vec<u8>, CodecError> {
    let file_metadata = reader.metadata().file_metadata();
    let schema = file_metadata.schema_descr_ptr();

    let mut props = WriterProperties::builder()
        .set_key_value_metadata(file_metadata.key_value_metadata().cloned());
    if let Some(encryption) = encryption {
        props = props.with_file_encryption_properties(encryption);
    }

    let mut out = Vec::new();
    let mut writer =
        SerializedFileWriter::new(&mut out, schema.root_schema_ptr(), Arc::new(props.build()))?;

    for rg_index in 0..reader.num_row_groups() {
        let row_group = reader.get_row_group(rg_index)?;
        let num_rows = usize::try_from(row_group.metadata().num_rows()).unwrap_or_default();
        let mut rg_writer = writer.next_row_group()?;

        for col_index in 0..schema.num_columns() {
            let descr = schema.column(col_index);
            let column_reader = row_group.get_column_reader(col_index)?;
            let mut column_writer = rg_writer
                .next_column()?
                .ok_or_else(|| CodecError::ColumnMismatch(descr.path().string()))?;
            copy_column(&descr, column_reader, column_writer.untyped(), num_rows)?;
            column_writer.close()?;
        }
        rg_writer.close()?;
    }

    writer.close()?;
    Ok(out)
}

#[derive(Debug, Clone, Copy)]
struct Levels {
    definition: bool,
    repetition: bool,
}

macro_rules! copy_as {
    ($reader:expr, $writer:expr, $descr:expr, $rows:expr, $levels:expr, $r:ident, $w:ident) => {
        match ($reader, $writer) {
            (ColumnReader::$r(mut reader), ColumnWriter::$w(writer)) => {
                copy_batches(&mut reader, writer, $rows, $levels)
            }
            _ => Err(CodecError::ColumnMismatch($descr.path().string())),
        }
    };
}

/// Copy one column chunk, dispatching on its physical type.
fn copy_column(
    descr: &ColumnDescriptor,
    reader: ColumnReader,
    writer: &mut ColumnWriter<'_>,
    num_rows: usize,
) -> Result<(), CodecError> {
    let levels = Levels {
        definition: descr.max_def_level() > 0,
        repetition: descr.max_rep_level() > 0,
    };

    match ColumnPhysicalType::from(descr.physical_type()) {
        ColumnPhysicalType::Boolean => copy_as!(
            reader,
            writer,
            descr,
            num_rows,
            levels,
            BoolColumnReader,
            BoolColumnWriter
        ),
        ColumnPhysicalType::Int32 => copy_as!(
            reader,
            writer,
            descr,
            num_rows,
            levels,
            Int32ColumnReader,
            Int32ColumnWriter
        ),
        ColumnPhysicalType::Int64 => copy_as!(
            reader,
            writer,
            descr,
            num_rows,
            levels,
            Int64ColumnReader,
            Int64ColumnWriter
        ),
        ColumnPhysicalType::Int96 => copy_as!(
            reader,
            writer,
            descr,
            num_rows,
            levels,
            Int96ColumnReader,
            Int96ColumnWriter
        ),
        ColumnPhysicalType::Float32 => copy_as!(
            reader,
            writer,
            descr,
            num_rows,
            levels,
            FloatColumnReader,
            FloatColumnWriter
        ),
        ColumnPhysicalType::Float64 => copy_as!(
            reader,
            writer,
            descr,
            num_rows,
            levels,
            DoubleColumnReader,
            DoubleColumnWriter
        ),
        ColumnPhysicalType::VariableByteArray => copy_as!(
            reader,
            writer,
            descr,
            num_rows,
            levels,
            ByteArrayColumnReader,
            ByteArrayColumnWriter
        ),
        ColumnPhysicalType::FixedByteArray => copy_as!(
            reader,
            writer,
            descr,
            num_rows,
            levels,
            FixedLenByteArrayColumnReader,
            FixedLenByteArrayColumnWriter
        ),
    }
}

/// Move records from `reader` to `writer` until `num_rows` records were
/// copied or the reader runs dry.
fn copy_batches<T: DataType>(
    reader: &mut ColumnReaderImpl<T>,
    writer: &mut ColumnWriterImpl<'_, T>,
    num_rows: usize,
    levels: Levels,
) -> Result<(), CodecError> {
    let mut values: Vec<T::T> = Vec::with_capacity(RECORD_BATCH_SIZE);
    let mut def_levels: Vec<i16> = Vec::new();
    let mut rep_levels: Vec<i16> = Vec::new();

    let mut remaining = num_rows;
    while remaining > 0 {
        values.clear();
        def_levels.clear();
        rep_levels.clear();

        let (records, _, _) = reader.read_records(
            remaining.min(RECORD_BATCH_SIZE),
            levels.definition.then_some(&mut def_levels),
            levels.repetition.then_some(&mut rep_levels),
            &mut values,
        )?;
        if records == 0 {
            break;
        }

        writer.write_batch(
            &values,
            levels.definition.then_some(def_levels.as_slice()),
            levels.repetition.then_some(rep_levels.as_slice()),
        )?;
        remaining = remaining.saturating_sub(records);
    }
    Ok(())
}
