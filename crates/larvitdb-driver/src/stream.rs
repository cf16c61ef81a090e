//! Incremental row delivery.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use larvitdb_types::{DriverError, Row};
use tokio::sync::mpsc;

/// Rows buffered between a producing driver task and the consumer.
pub const DEFAULT_STREAM_BUFFER: usize = 64;

/// A stream of rows produced by one statement.
///
/// Each item is either a row or the error that ended the statement. The
/// stream ends after the last row or after the first error.
#[derive(Debug)]
pub struct RowStream {
    rx: mpsc::Receiver<Result<Row, DriverError>>,
}

/// Producing half of a [`RowStream`].
#[derive(Debug, Clone)]
pub struct RowSender {
    tx: mpsc::Sender<Result<Row, DriverError>>,
}

impl RowStream {
    /// Create a connected sender and stream with the given buffer size.
    #[must_use]
    pub fn channel(buffer: usize) -> (RowSender, Self) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (RowSender { tx }, Self { rx })
    }

    /// A stream over rows that are already in memory.
    #[must_use]
    pub fn from_rows(rows: Vec<Row>) -> Self {
        let (tx, rx) = mpsc::channel(rows.len().max(1));
        for row in rows {
            // Capacity covers every row.
            let _ = tx.try_send(Ok(row));
        }
        Self { rx }
    }

    /// Receive the next item.
    pub async fn next_row(&mut self) -> Option<Result<Row, DriverError>> {
        self.rx.recv().await
    }

    /// Drain the stream into a vector, stopping at the first error.
    pub async fn collect_rows(mut self) -> Result<Vec<Row>, DriverError> {
        let mut rows = Vec::new();
        while let Some(item) = self.next_row().await {
            rows.push(item?);
        }
        Ok(rows)
    }
}

impl Stream for RowStream {
    type Item = Result<Row, DriverError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl RowSender {
    /// Send a row. Returns `false` once the consumer has gone away.
    pub async fn send_row(&self, row: Row) -> bool {
        self.tx.send(Ok(row)).await.is_ok()
    }

    /// Send the error that ends the stream.
    pub async fn send_error(&self, err: DriverError) {
        let _ = self.tx.send(Err(err)).await;
    }

    /// Whether the consumer has dropped the stream.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
