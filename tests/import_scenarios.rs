use csv_io::{
    ColumnType, CsvIoError, ExportColumn, ExportPipeline, ExportSchema, ImportColumn,
    ImportPipeline, ImportSchema, InputSource, Record, Value, ERR_CSV_IO_INVALID_VALUE,
};
use std::io::Write;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tempfile::NamedTempFile;
use tokio::io::{AsyncRead, ReadBuf};

const SAMPLE: &str = "SomeTextWithoutQuote1;\"Some text with quote1\";1,12;;1\n\r\
SomeTextWithoutQuote2;\"Some text with quote2\";1.23;;true\n\r\
\n\r\
SomeTextWithoutQuote3;\"Some text with quote3\";1,34;null;1\n\r\
SomeTextWithoutQuote4;\"Some text with quote4\";2;;1\n\r\
SomeTextWithoutQuote5;\"Some text with quote5\";3;;1\n\r";

fn sample_schema() -> ImportSchema {
    ImportSchema::new(vec![
        ImportColumn::typed("column1", ColumnType::String),
        ImportColumn::typed("column2", ColumnType::String),
        ImportColumn::typed("column3", ColumnType::Number),
        ImportColumn::typed("column4", ColumnType::String).nullable(true),
        ImportColumn::typed("column5", ColumnType::Boolean),
    ])
}

fn expected() -> Vec<Record> {
    [1.12, 1.23, 1.34, 2.0, 3.0]
        .iter()
        .enumerate()
        .map(|(i, number)| {
            let mut record: Record = [
                ("column1", Value::from(format!("SomeTextWithoutQuote{}", i + 1))),
                ("column2", Value::from(format!("Some text with quote{}", i + 1))),
                ("column3", Value::from(*number)),
            ]
            .into_iter()
            .collect();
            if i == 2 {
                record.insert("column4", Value::Null);
            }
            record.insert("column5", Value::Boolean(true));
            record
        })
        .collect()
}

fn temp_csv(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[tokio::test]
async fn test_buffer_import_collects_records() {
    let mut pipeline = ImportPipeline::new(sample_schema()).unwrap();
    pipeline.feed(SAMPLE).await.unwrap();
    let done = pipeline.end().await.unwrap();
    assert_eq!(done.collected, expected());
}

#[tokio::test]
async fn test_split_buffers_give_same_records() {
    let bytes = SAMPLE.as_bytes();
    let mut pipeline = ImportPipeline::new(sample_schema()).unwrap();
    pipeline.feed(bytes[..100].to_vec()).await.unwrap();
    pipeline.feed(bytes[100..].to_vec()).await.unwrap();
    let done = pipeline.end().await.unwrap();
    assert_eq!(done.collected, expected());
}

#[tokio::test]
async fn test_callback_gets_records_in_order() {
    let mut pipeline = ImportPipeline::new(sample_schema()).unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    pipeline
        .attach_row_callback(move |record, next| {
            sink.lock().unwrap().push(record);
            next.resume();
        })
        .await;
    pipeline.feed(SAMPLE).await.unwrap();
    let done = pipeline.end().await.unwrap();

    assert!(done.collected.is_empty());
    assert_eq!(done.rows_delivered, 5);
    assert_eq!(*seen.lock().unwrap(), expected());
}

#[tokio::test]
async fn test_file_stream_import() {
    let file = temp_csv(SAMPLE);
    let source = InputSource::new(file.path().to_str().unwrap());

    let mut pipeline = ImportPipeline::new(sample_schema()).unwrap();
    pipeline.attach_reader(source.open().await.unwrap()).unwrap();
    pipeline.feed("ignored;\"x\";1;;1\n").await.unwrap();
    let second = source.open().await.unwrap();
    assert!(matches!(
        pipeline.attach_reader(second),
        Err(CsvIoError::InputConflict(_))
    ));

    let done = pipeline.end().await.unwrap();
    assert_eq!(done.collected, expected());
}

#[tokio::test]
async fn test_large_stream_with_slow_callback() {
    let content: String = (0..5000)
        .map(|i| format!("text{};\"quoted {}\";{},5;;{}\n", i, i, i, i % 2))
        .collect();
    let file = temp_csv(&content);
    let source = InputSource::new(file.path().to_str().unwrap());

    let mut pipeline = ImportPipeline::new(sample_schema()).unwrap();
    let count = Arc::new(Mutex::new(0usize));
    let counter = count.clone();
    pipeline
        .attach_row_callback(move |record, next| {
            let mut seen = counter.lock().unwrap();
            assert_eq!(
                record.get("column1"),
                Some(&Value::from(format!("text{}", *seen)))
            );
            *seen += 1;
            tokio::spawn(async move {
                tokio::task::yield_now().await;
                next.resume();
            });
        })
        .await;
    pipeline.attach_reader(source.open().await.unwrap()).unwrap();

    let done = pipeline.end().await.unwrap();
    assert_eq!(done.rows_delivered, 5000);
    assert_eq!(*count.lock().unwrap(), 5000);
}

#[tokio::test]
async fn test_invalid_number_halts_pipeline() {
    let mut pipeline = ImportPipeline::new(
        ImportSchema::new(vec![
            ImportColumn::typed("id", ColumnType::Number),
            ImportColumn::typed("name", ColumnType::String),
        ]),
    )
    .unwrap();

    let subscriber = pipeline.subscribe().await;
    let reader = tokio::spawn(subscriber.collect());
    pipeline
        .feed("bad data;\"first\"\n2;\"second\"\n")
        .await
        .unwrap();

    let err = pipeline.end().await.unwrap_err();
    let signal = err.signal().expect("validation fault");
    assert_eq!(signal.code, ERR_CSV_IO_INVALID_VALUE);
    assert_eq!(signal.column_name, "id");
    assert_eq!(signal.column_type, "number");
    assert_eq!(signal.row_number, 1);
    assert_eq!(signal.value.as_deref(), Some("bad data"));

    assert!(reader.await.unwrap().is_empty());
}

#[tokio::test]
async fn test_numbers_with_trailing_text_keep_their_prefix() {
    let schema = ImportSchema::new(vec![ImportColumn::typed("n", ColumnType::Number)]);
    let mut pipeline = ImportPipeline::new(schema).unwrap();
    pipeline.feed("12 kg\n1.5.2\n").await.unwrap();
    let done = pipeline.end().await.unwrap();

    let numbers: Vec<f64> = done
        .collected
        .iter()
        .filter_map(|r| r.get("n").and_then(Value::as_f64))
        .collect();
    assert_eq!(numbers, vec![12.0, 1.5]);
}

#[tokio::test]
async fn test_source_offset_and_skip_first_line() {
    let schema = ImportSchema::new(vec![ImportColumn::typed("n", ColumnType::Number)])
        .source_row_offset(2)
        .skip_first_line(true);
    let mut pipeline = ImportPipeline::new(schema).unwrap();
    pipeline.feed("0\nheader\n1\n2\n").await.unwrap();
    let done = pipeline.end().await.unwrap();

    let numbers: Vec<f64> = done
        .collected
        .iter()
        .filter_map(|r| r.get("n").and_then(Value::as_f64))
        .collect();
    assert_eq!(numbers, vec![1.0, 2.0]);
}

#[tokio::test]
async fn test_feed_after_end_is_ignored() {
    let mut pipeline = ImportPipeline::new(sample_schema()).unwrap();
    pipeline.end().await.unwrap();
    pipeline.feed(SAMPLE).await.unwrap();
    let again = pipeline.end().await.unwrap();
    assert!(again.collected.is_empty());
}

struct FailingReader;

impl AsyncRead for FailingReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Poll::Ready(Err(std::io::Error::new(
            std::io::ErrorKind::Other,
            "device unplugged",
        )))
    }
}

#[tokio::test]
async fn test_stream_read_error_is_reported() {
    let mut pipeline = ImportPipeline::new(sample_schema()).unwrap();
    pipeline.attach_reader(FailingReader).unwrap();
    match pipeline.end().await {
        Err(CsvIoError::SourceFailed(reason)) => assert!(reason.contains("device unplugged")),
        other => panic!("unexpected outcome: {:?}", other.map(|c| c.rows_delivered)),
    }
}

#[tokio::test]
async fn test_round_trip_reproduces_text() {
    let line = "7;\"say \"\"hi\"\"\";1;-2.5;0\n";

    let mut import = ImportPipeline::new(ImportSchema::new(vec![
        ImportColumn::typed("id", ColumnType::Number),
        ImportColumn::typed("text", ColumnType::String),
        ImportColumn::typed("flag", ColumnType::Boolean),
        ImportColumn::typed("amount", ColumnType::Number),
        ImportColumn::typed("other", ColumnType::Boolean),
    ]))
    .unwrap();
    import.feed(line).await.unwrap();
    let records = import.end().await.unwrap().collected;

    let mut export = ExportPipeline::new(
        ExportSchema::new(vec![
            ExportColumn::typed("id", ColumnType::Number),
            ExportColumn::typed("text", ColumnType::String),
            ExportColumn::typed("flag", ColumnType::Boolean),
            ExportColumn::typed("amount", ColumnType::Number),
            ExportColumn::typed("other", ColumnType::Boolean),
        ])
        .row_delimiter("\n"),
    )
    .unwrap();
    export.feed_batch(records).await.unwrap();
    assert_eq!(export.end().await.unwrap().text(), line);
}

#[tokio::test]
async fn test_describe_sample() {
    let pipeline = ImportPipeline::new(sample_schema()).unwrap();
    let info = pipeline.describe_input(SAMPLE.as_bytes()).unwrap();
    assert_eq!(info.entry_count, 5);
    assert!(info.approx_byte_size > 0);
}
