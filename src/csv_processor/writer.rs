use crate::pipeline::RowSubscriber;
use crate::schema::Record;
use crate::utils::Result;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};

/// Buffered sink for pipeline output units.
pub struct TextStreamWriter<W: AsyncWrite + Unpin> {
    writer: BufWriter<W>,
    units_written: usize,
}

impl<W: AsyncWrite + Unpin> TextStreamWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            writer: BufWriter::new(inner),
            units_written: 0,
        }
    }

    /// Writes an export line as is; it already carries its row delimiter.
    pub async fn write_unit(&mut self, unit: &str) -> Result<()> {
        self.writer.write_all(unit.as_bytes()).await?;
        self.units_written += 1;
        Ok(())
    }

    pub async fn write_json_line(&mut self, record: &Record) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        self.write_unit(&line).await
    }

    pub async fn flush(&mut self) -> Result<()> {
        self.writer.flush().await?;
        Ok(())
    }

    pub async fn finish(mut self) -> Result<usize> {
        self.writer.flush().await?;
        Ok(self.units_written)
    }

    pub fn units_written(&self) -> usize {
        self.units_written
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

/// Writes export lines from a subscriber until the pipeline finishes.
pub async fn drain_lines<W: AsyncWrite + Unpin>(
    mut subscriber: RowSubscriber<String>,
    writer: &mut TextStreamWriter<W>,
) -> Result<usize> {
    let mut written = 0;
    while let Some(line) = subscriber.recv().await {
        writer.write_unit(&line).await?;
        written += 1;
    }
    writer.flush().await?;
    Ok(written)
}

/// Writes imported records as JSON lines until the pipeline finishes.
pub async fn drain_records<W: AsyncWrite + Unpin>(
    mut subscriber: RowSubscriber<Record>,
    writer: &mut TextStreamWriter<W>,
) -> Result<usize> {
    let mut written = 0;
    while let Some(record) = subscriber.recv().await {
        writer.write_json_line(&record).await?;
        written += 1;
    }
    writer.flush().await?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Value;

    #[tokio::test]
    async fn test_units_are_written_verbatim() {
        let mut writer = TextStreamWriter::new(Vec::new());
        writer.write_unit("a;b\n\r").await.unwrap();
        writer.write_unit("1;2\n\r").await.unwrap();
        writer.flush().await.unwrap();
        assert_eq!(writer.units_written(), 2);
        assert_eq!(writer.into_inner(), b"a;b\n\r1;2\n\r");
    }

    #[tokio::test]
    async fn test_json_lines_keep_field_order() {
        let mut writer = TextStreamWriter::new(Vec::new());
        let record: Record = [("z", Value::from(1)), ("a", Value::Null)]
            .into_iter()
            .collect();
        writer.write_json_line(&record).await.unwrap();
        writer.flush().await.unwrap();
        assert_eq!(
            String::from_utf8(writer.into_inner()).unwrap(),
            "{\"z\":1.0,\"a\":null}\n"
        );
    }
}
