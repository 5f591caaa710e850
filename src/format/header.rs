use crate::schema::{ColumnTable, ExportFormatFn};

/// Builds the header row from the column labels and hands it out once.
#[derive(Debug, Clone)]
pub struct HeaderInjector {
    labels: Vec<String>,
    line: String,
    pending: bool,
}

impl HeaderInjector {
    pub fn new(table: &ColumnTable<ExportFormatFn>) -> Self {
        let config = table.config();
        // Positional, so columns sharing a name keep their own labels.
        let labels: Vec<String> = table.columns().iter().map(|c| c.info.header.clone()).collect();
        let mut line = labels.join(&config.column_delimiter);
        line.push_str(&config.row_delimiter);

        Self {
            labels,
            line,
            pending: config.show_headers,
        }
    }

    /// Header labels in column order, on the first call only and only when
    /// headers are enabled.
    pub fn take(&mut self) -> Option<Vec<String>> {
        if !self.pending {
            return None;
        }
        self.pending = false;
        Some(self.labels.clone())
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn line(&self) -> &str {
        &self.line
    }
}
