use crate::format::{ExportFieldPipeline, HeaderInjector};
use crate::pipeline::mode::{Completion, Continuation, RowSubscriber};
use crate::pipeline::worker::{PipelineCommand, PipelineCore, RowStage};
use crate::schema::{ExportSchema, Record};
use crate::utils::Result;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;

pub enum ExportUnit {
    /// Header labels in column order.
    Header(Vec<String>),
    Data(Record),
}

/// Formats records into delimited lines, putting the header row first.
pub struct ExportStage {
    fields: ExportFieldPipeline,
    header: HeaderInjector,
    faults: usize,
}

impl ExportStage {
    pub fn new(fields: ExportFieldPipeline) -> Self {
        let header = HeaderInjector::new(fields.table());
        Self {
            fields,
            header,
            faults: 0,
        }
    }

    fn inject_header(&mut self, pending: &mut VecDeque<ExportUnit>) {
        if let Some(header) = self.header.take() {
            tracing::debug!("Injecting header row");
            pending.push_back(ExportUnit::Header(header));
        }
    }
}

impl RowStage for ExportStage {
    type Input = Record;
    type Unit = ExportUnit;
    type Row = String;

    fn split(&mut self, segment: Vec<Record>, pending: &mut VecDeque<ExportUnit>) -> Result<()> {
        self.inject_header(pending);
        pending.extend(segment.into_iter().map(ExportUnit::Data));
        Ok(())
    }

    fn finish(&mut self, pending: &mut VecDeque<ExportUnit>) -> Result<()> {
        self.inject_header(pending);
        Ok(())
    }

    fn build(&mut self, unit: ExportUnit) -> Result<Option<String>> {
        let formatted = match unit {
            ExportUnit::Header(labels) => self.fields.format_header(&labels),
            ExportUnit::Data(record) => self.fields.format(&record),
        };
        self.faults += formatted.faults;
        Ok(formatted.line)
    }

    fn formatting_faults(&self) -> usize {
        self.faults
    }
}

/// Record → delimited text pipeline.
///
/// Rows go to the row callback and to subscribers when either is attached,
/// otherwise they are collected and returned by [`ExportPipeline::end`].
/// Formatting faults never stop an export: the field is written unformatted
/// and the fault is counted in the completion.
pub struct ExportPipeline {
    core: PipelineCore<Record, String>,
    header_line: String,
}

impl ExportPipeline {
    /// Resolves the schema and starts the row worker. Must be called from
    /// within a tokio runtime.
    pub fn new(schema: ExportSchema) -> Result<Self> {
        let table = Arc::new(schema.resolve()?);
        let config = table.config().clone();
        let stage = ExportStage::new(ExportFieldPipeline::new(table));
        let header_line = HeaderInjector::new(stage.fields.table()).line().to_string();

        Ok(Self {
            core: PipelineCore::spawn(stage, &config),
            header_line,
        })
    }

    pub async fn feed(&mut self, record: Record) -> Result<()> {
        self.core.push(vec![record]).await
    }

    /// Batches are relayed in bounded segments.
    pub async fn feed_batch(&mut self, records: Vec<Record>) -> Result<()> {
        self.core.push(records).await
    }

    /// Drives the pipeline from a channel of records. The source runs until
    /// its senders are dropped; pushed records are ignored meanwhile.
    pub fn attach_source(&mut self, mut source: mpsc::Receiver<Record>) -> Result<()> {
        let Some(relay) = self.core.attach_stream()? else {
            return Ok(());
        };

        tokio::spawn(async move {
            while let Some(record) = source.recv().await {
                if relay.relay(vec![record]).await.is_err() {
                    tracing::debug!("Record source stopped, row worker has halted");
                    return;
                }
            }
            let _ = relay.forward(PipelineCommand::EndOfInput).await;
        });
        Ok(())
    }

    pub async fn attach_row_callback<C>(&mut self, callback: C)
    where
        C: FnMut(String, Continuation) + Send + 'static,
    {
        self.core.on_row(Box::new(callback)).await;
    }

    pub async fn subscribe(&mut self) -> RowSubscriber<String> {
        self.core.subscribe().await
    }

    pub async fn unsubscribe(&mut self, id: usize) {
        self.core.unsubscribe(id).await;
    }

    pub async fn end(&mut self) -> Result<Completion<String>> {
        self.core.end().await
    }

    /// Header text including the row delimiter, whether or not headers are
    /// shown.
    pub fn header_line(&self) -> &str {
        &self.header_line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnType, ExportColumn, FormatFault, Value};
    use std::sync::Mutex;

    fn schema() -> ExportSchema {
        ExportSchema::new(vec![
            ExportColumn::typed("id", ColumnType::Number).header("ID"),
            ExportColumn::typed("name", ColumnType::String).header("Name"),
        ])
        .row_delimiter("\n")
    }

    fn record(id: i64, name: &str) -> Record {
        [("id", Value::from(id)), ("name", Value::from(name))]
            .into_iter()
            .collect()
    }

    #[tokio::test]
    async fn test_collects_lines() {
        let mut pipeline = ExportPipeline::new(schema()).unwrap();
        pipeline.feed(record(1, "a")).await.unwrap();
        pipeline.feed(record(2, "b")).await.unwrap();
        let done = pipeline.end().await.unwrap();
        assert_eq!(done.text(), "1;\"a\"\n2;\"b\"\n");
        assert_eq!(done.rows_delivered, 2);
    }

    #[tokio::test]
    async fn test_header_emitted_once_first() {
        let mut pipeline = ExportPipeline::new(schema().show_headers(true)).unwrap();
        assert_eq!(pipeline.header_line(), "ID;Name\n");
        pipeline.feed(record(1, "a")).await.unwrap();
        pipeline.feed(record(2, "b")).await.unwrap();
        let done = pipeline.end().await.unwrap();
        assert_eq!(done.collected, vec!["ID;Name\n", "1;\"a\"\n", "2;\"b\"\n"]);
    }

    #[tokio::test]
    async fn test_header_without_records() {
        let mut pipeline = ExportPipeline::new(schema().show_headers(true)).unwrap();
        let done = pipeline.end().await.unwrap();
        assert_eq!(done.collected, vec!["ID;Name\n"]);
    }

    #[tokio::test]
    async fn test_header_reaches_late_callback() {
        let mut pipeline = ExportPipeline::new(schema().show_headers(true)).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        pipeline
            .attach_row_callback(move |line, next| {
                sink.lock().unwrap().push(line);
                next.resume();
            })
            .await;
        pipeline.feed(record(7, "x")).await.unwrap();
        let done = pipeline.end().await.unwrap();

        assert!(done.collected.is_empty());
        assert_eq!(*seen.lock().unwrap(), vec!["ID;Name\n", "7;\"x\"\n"]);
    }

    #[tokio::test]
    async fn test_header_keeps_labels_of_columns_sharing_a_name() {
        let schema = ExportSchema::new(vec![
            ExportColumn::typed("a", ColumnType::Number).header("First"),
            ExportColumn::typed("a", ColumnType::Number).header("Second"),
        ])
        .row_delimiter("\n")
        .show_headers(true);
        let mut pipeline = ExportPipeline::new(schema).unwrap();
        pipeline
            .feed([("a", Value::from(1))].into_iter().collect())
            .await
            .unwrap();
        let done = pipeline.end().await.unwrap();

        assert_eq!(done.collected, vec!["First;Second\n", "1;1\n"]);
        assert_eq!(done.collected[0], pipeline.header_line());
    }

    #[tokio::test]
    async fn test_dropped_subscriber_does_not_lose_rows() {
        let mut pipeline = ExportPipeline::new(schema()).unwrap();
        let subscriber = pipeline.subscribe().await;
        drop(subscriber);

        pipeline.feed(record(0, "a")).await.unwrap();
        pipeline.feed(record(1, "b")).await.unwrap();
        let done = pipeline.end().await.unwrap();
        assert_eq!(done.collected, vec!["0;\"a\"\n", "1;\"b\"\n"]);
        assert_eq!(done.rows_delivered, 2);
    }

    #[tokio::test]
    async fn test_formatting_fault_counted() {
        let schema = ExportSchema::new(vec![
            ExportColumn::new("code").formatter(|_, _| Err(FormatFault::new("boom"))),
            ExportColumn::typed("n", ColumnType::Number),
        ]);
        let mut pipeline = ExportPipeline::new(schema).unwrap();
        let row: Record = [("code", Value::from("raw")), ("n", Value::from(3))]
            .into_iter()
            .collect();
        pipeline.feed(row).await.unwrap();
        let done = pipeline.end().await.unwrap();
        assert_eq!(done.text(), "raw;3\n\r");
        assert_eq!(done.formatting_faults, 1);
    }

    #[tokio::test]
    async fn test_attach_source_and_ignore_push() {
        let mut pipeline = ExportPipeline::new(schema()).unwrap();
        let (tx, rx) = mpsc::channel(4);
        pipeline.attach_source(rx).unwrap();
        pipeline.feed(record(99, "pushed")).await.unwrap();

        tokio::spawn(async move {
            for i in 0..3 {
                tx.send(record(i, "s")).await.unwrap();
            }
        });
        let done = pipeline.end().await.unwrap();
        assert_eq!(done.text(), "0;\"s\"\n1;\"s\"\n2;\"s\"\n");
    }

    #[tokio::test]
    async fn test_invalid_schema_fails_construction() {
        let schema = ExportSchema::new(vec![ExportColumn::new("id")]);
        assert!(ExportPipeline::new(schema).is_err());
    }
}
