use crate::csv_processor::{
    describe_input, InputDescription, RawRow, RecordTokenizer, RowNormalizer, TextDecoder,
    TokenizerSettings,
};
use crate::format::ImportFieldPipeline;
use crate::pipeline::mode::{Completion, Continuation, RowSubscriber};
use crate::pipeline::worker::{PipelineCommand, PipelineCore, RowStage};
use crate::schema::{ColumnTable, ImportFormatFn, ImportSchema, Record};
use crate::utils::{CsvIoError, Result};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};

const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Decodes, tokenizes and normalizes raw bytes, then assembles records.
pub struct ImportStage {
    decoder: TextDecoder,
    tokenizer: RecordTokenizer,
    normalizer: RowNormalizer,
    fields: ImportFieldPipeline,
    skip_pending: bool,
    row_number: usize,
}

impl ImportStage {
    pub fn new(fields: ImportFieldPipeline, settings: TokenizerSettings) -> Self {
        let config = fields.table().config();
        Self {
            decoder: TextDecoder::new(&config.encoding),
            tokenizer: RecordTokenizer::new(settings),
            normalizer: RowNormalizer::new(fields.table().len(), config.source_row_offset),
            skip_pending: config.skip_first_line,
            row_number: 0,
            fields,
        }
    }

    fn queue(&mut self, records: Vec<Vec<String>>, pending: &mut VecDeque<RawRow>) {
        for fields in records {
            let Some(row) = self.normalizer.accept(fields) else {
                continue;
            };
            if self.skip_pending {
                self.skip_pending = false;
                tracing::debug!("Skipping first line");
                continue;
            }
            pending.push_back(row);
        }
    }
}

impl RowStage for ImportStage {
    type Input = u8;
    type Unit = RawRow;
    type Row = Record;

    fn split(&mut self, segment: Vec<u8>, pending: &mut VecDeque<RawRow>) -> Result<()> {
        let text = self.decoder.decode(&segment, false);
        let mut records = Vec::new();
        self.tokenizer.feed(text.as_bytes(), &mut records);
        self.queue(records, pending);
        Ok(())
    }

    fn finish(&mut self, pending: &mut VecDeque<RawRow>) -> Result<()> {
        let text = self.decoder.finish();
        let mut records = Vec::new();
        self.tokenizer.feed(text.as_bytes(), &mut records);
        self.tokenizer.finish(&mut records);
        self.queue(records, pending);
        Ok(())
    }

    fn build(&mut self, unit: RawRow) -> Result<Option<Record>> {
        self.row_number += 1;
        self.fields
            .assemble(&unit, self.row_number)
            .map(Some)
            .map_err(CsvIoError::from)
    }
}

/// Delimited text → record pipeline.
///
/// The first value that fails coercion or validation halts the pipeline; no
/// further rows are delivered and [`ImportPipeline::end`] returns
/// [`CsvIoError::InvalidValue`] with the offending token.
pub struct ImportPipeline {
    core: PipelineCore<u8, Record>,
    table: Arc<ColumnTable<ImportFormatFn>>,
}

impl ImportPipeline {
    /// Resolves the schema and starts the row worker. Must be called from
    /// within a tokio runtime.
    pub fn new(schema: ImportSchema) -> Result<Self> {
        let table = Arc::new(schema.resolve()?);
        let settings = TokenizerSettings::from_config(table.config())?;
        let stage = ImportStage::new(ImportFieldPipeline::new(table.clone()), settings);

        Ok(Self {
            core: PipelineCore::spawn(stage, table.config()),
            table,
        })
    }

    /// Pushes raw bytes. Chunks may end anywhere, even inside a quoted field
    /// or a multi-byte character.
    pub async fn feed(&mut self, chunk: impl Into<Vec<u8>>) -> Result<()> {
        self.core.push(chunk.into()).await
    }

    /// Drives the pipeline from a byte stream until it reaches EOF.
    pub fn attach_reader<Rd>(&mut self, mut reader: Rd) -> Result<()>
    where
        Rd: AsyncRead + Unpin + Send + 'static,
    {
        let Some(relay) = self.core.attach_stream()? else {
            return Ok(());
        };

        tokio::spawn(async move {
            let mut buffer = vec![0u8; READ_BUFFER_SIZE];
            loop {
                let message = match reader.read(&mut buffer).await {
                    Ok(0) => PipelineCommand::EndOfInput,
                    Ok(n) => {
                        if relay.relay(buffer[..n].to_vec()).await.is_err() {
                            tracing::debug!("Byte source stopped, row worker has halted");
                            return;
                        }
                        continue;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to read source: {}", e);
                        PipelineCommand::SourceFailed(e.to_string())
                    }
                };
                let _ = relay.forward(message).await;
                return;
            }
        });
        Ok(())
    }

    pub async fn attach_row_callback<C>(&mut self, callback: C)
    where
        C: FnMut(Record, Continuation) + Send + 'static,
    {
        self.core.on_row(Box::new(callback)).await;
    }

    pub async fn subscribe(&mut self) -> RowSubscriber<Record> {
        self.core.subscribe().await
    }

    pub async fn unsubscribe(&mut self, id: usize) {
        self.core.unsubscribe(id).await;
    }

    pub async fn end(&mut self) -> Result<Completion<Record>> {
        self.core.end().await
    }

    /// Counts the rows of a sample with this pipeline's text settings.
    pub fn describe_input(&self, sample: &[u8]) -> Result<InputDescription> {
        describe_input(sample, &self.table.names(), self.table.config())
    }
}
