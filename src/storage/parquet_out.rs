use crate::pipeline::processing::report::CleanedRow;
use parquet::basic::{Compression, LogicalType, Repetition, Type as PhysicalType, ZstdLevel};
use parquet::data_type::{BoolType, ByteArray, ByteArrayType, DoubleType, Int64Type};
use parquet::errors::{ParquetError, Result};
use parquet::file::properties::WriterProperties;
use parquet::file::writer::{SerializedColumnWriter, SerializedFileWriter};
use parquet::schema::types::{Type, TypePtr};
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

enum ColumnValues {
    Utf8(Vec<Option<String>>),
    Bool(Vec<bool>),
    Int64(Vec<Option<i64>>),
    Double(Vec<Option<f64>>),
}

struct Column {
    name: &'static str,
    required: bool,
    values: ColumnValues,
}

impl Column {
    fn required(name: &'static str, values: ColumnValues) -> Self {
        Self { name, required: true, values }
    }

    fn optional(name: &'static str, values: ColumnValues) -> Self {
        Self { name, required: false, values }
    }

    fn field_type(&self) -> Result<TypePtr> {
        let (physical, logical) = match self.values {
            ColumnValues::Utf8(_) => (PhysicalType::BYTE_ARRAY, Some(LogicalType::String)),
            ColumnValues::Bool(_) => (PhysicalType::BOOLEAN, None),
            ColumnValues::Int64(_) => (PhysicalType::INT64, None),
            ColumnValues::Double(_) => (PhysicalType::DOUBLE, None),
        };
        let repetition = if self.required {
            Repetition::REQUIRED
        } else {
            Repetition::OPTIONAL
        };
        let field = Type::primitive_type_builder(self.name, physical)
            .with_logical_type(logical)
            .with_repetition(repetition)
            .build()?;
        Ok(Arc::new(field))
    }

    fn write(&self, writer: &mut SerializedColumnWriter<'_>) -> Result<()> {
        match &self.values {
            ColumnValues::Utf8(values) => {
                let (present, levels) = split_present(values, |s| ByteArray::from(s.as_str()));
                writer
                    .typed::<ByteArrayType>()
                    .write_batch(&present, self.def_levels(&levels), None)?;
            }
            ColumnValues::Bool(values) => {
                writer.typed::<BoolType>().write_batch(values, None, None)?;
            }
            ColumnValues::Int64(values) => {
                let (present, levels) = split_present(values, |v| *v);
                writer
                    .typed::<Int64Type>()
                    .write_batch(&present, self.def_levels(&levels), None)?;
            }
            ColumnValues::Double(values) => {
                let (present, levels) = split_present(values, |v| *v);
                writer
                    .typed::<DoubleType>()
                    .write_batch(&present, self.def_levels(&levels), None)?;
            }
        }
        Ok(())
    }

    fn def_levels<'a>(&self, levels: &'a [i16]) -> Option<&'a [i16]> {
        (!self.required).then_some(levels)
    }
}

/// Non-null values plus one definition level per row
fn split_present<T, V>(values: &[Option<T>], convert: impl Fn(&T) -> V) -> (Vec<V>, Vec<i16>) {
    let mut present = Vec::with_capacity(values.len());
    let mut levels = Vec::with_capacity(values.len());
    for value in values {
        match value {
            Some(v) => {
                present.push(convert(v));
                levels.push(1);
            }
            None => levels.push(0),
        }
    }
    (present, levels)
}

fn some_strings<'a>(rows: &'a [CleanedRow], field: impl Fn(&'a CleanedRow) -> &'a str) -> ColumnValues {
    ColumnValues::Utf8(rows.iter().map(|r| Some(field(r).to_string())).collect())
}

fn cleaned_columns(rows: &[CleanedRow]) -> Vec<Column> {
    use ColumnValues::*;

    vec![
        Column::required("ad_id", some_strings(rows, |r| r.ad_id.as_str())),
        Column::required("ad_link", some_strings(rows, |r| r.ad_link.as_str())),
        Column::required("is_active", Bool(rows.iter().map(|r| r.is_active).collect())),
        Column::optional("start_date_ts", Int64(rows.iter().map(|r| r.start_date_ts).collect())),
        Column::optional("end_date_ts", Int64(rows.iter().map(|r| r.end_date_ts).collect())),
        Column::optional("hours_passed", Double(rows.iter().map(|r| r.hours_passed).collect())),
        Column::required("media_mix", some_strings(rows, |r| r.media_mix.as_str())),
        Column::required("ad_text", some_strings(rows, |r| r.ad_text.as_str())),
        Column::optional("ad_lang_code", Utf8(rows.iter().map(|r| r.ad_lang_code.clone()).collect())),
        Column::required("rankable", Bool(rows.iter().map(|r| r.rankable).collect())),
        Column::optional("advertiser_id", Utf8(rows.iter().map(|r| r.advertiser_id.clone()).collect())),
        Column::optional("display_format", Utf8(rows.iter().map(|r| r.display_format.clone()).collect())),
        Column::optional("ad_group_id", Utf8(rows.iter().map(|r| r.ad_group_id.clone()).collect())),
        Column::optional("grouped_ads_count", Int64(rows.iter().map(|r| r.grouped_ads_count).collect())),
        Column::required(
            "media_ref_count",
            Int64(rows.iter().map(|r| Some(r.media_ref_count)).collect()),
        ),
        Column::required("dedup_key", some_strings(rows, |r| r.dedup_key.as_str())),
    ]
}

/// Write the cleaned record set as a single-row-group, ZSTD-compressed parquet file
pub fn write_cleaned_parquet(rows: &[CleanedRow], path: &Path) -> Result<()> {
    let columns = cleaned_columns(rows);
    let fields = columns
        .iter()
        .map(Column::field_type)
        .collect::<Result<Vec<_>>>()?;
    let schema = Type::group_type_builder("cleaned_ads")
        .with_fields(fields)
        .build()?;

    let props = WriterProperties::builder()
        .set_compression(Compression::ZSTD(ZstdLevel::try_new(3)?))
        .build();

    let file = File::create(path)?;
    let mut writer = SerializedFileWriter::new(file, Arc::new(schema), Arc::new(props))?;

    if !rows.is_empty() {
        let mut row_group = writer.next_row_group()?;
        for column in &columns {
            let mut col_writer = row_group.next_column()?.ok_or_else(|| {
                ParquetError::General(format!("schema has no column for {}", column.name))
            })?;
            column.write(&mut col_writer)?;
            col_writer.close()?;
        }
        row_group.close()?;
    }
    writer.close()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MediaMix;
    use parquet::file::reader::{FileReader, SerializedFileReader};
    use tempfile::tempdir;

    fn row(id: &str, lang: Option<&str>) -> CleanedRow {
        CleanedRow {
            ad_id: id.to_string(),
            ad_link: format!("https://www.facebook.com/ads/library/?id={}", id),
            is_active: true,
            start_date_ts: Some(1_704_067_200),
            end_date_ts: None,
            hours_passed: Some(12.5),
            media_mix: MediaMix::Image,
            ad_text: "Copy".to_string(),
            ad_lang_code: lang.map(str::to_string),
            rankable: true,
            advertiser_id: None,
            display_format: Some("IMAGE".to_string()),
            ad_group_id: None,
            grouped_ads_count: Some(2),
            media_ref_count: 1,
            dedup_key: "abc".to_string(),
        }
    }

    #[test]
    fn test_writes_all_rows_and_columns() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cleaned.parquet");
        write_cleaned_parquet(&[row("1", Some("eng")), row("2", None)], &path).unwrap();

        let reader = SerializedFileReader::new(File::open(&path).unwrap()).unwrap();
        let metadata = reader.metadata().file_metadata();
        assert_eq!(metadata.num_rows(), 2);

        let names: Vec<String> = metadata
            .schema_descr()
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        assert_eq!(names.len(), 16);
        assert_eq!(&names[..3], &["ad_id", "ad_link", "is_active"]);
        assert_eq!(names.last().map(String::as_str), Some("dedup_key"));
    }

    #[test]
    fn test_empty_set_still_produces_a_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.parquet");
        write_cleaned_parquet(&[], &path).unwrap();

        let reader = SerializedFileReader::new(File::open(&path).unwrap()).unwrap();
        assert_eq!(reader.metadata().file_metadata().num_rows(), 0);
    }
}
