use crate::utils::{CsvIoError, Result};
use std::marker::PhantomData;
use tokio::sync::mpsc;

/// Largest segment the relay forwards in one send.
pub const SEGMENT_SIZE: usize = 1000;

/// Splits oversized input units into bounded segments and forwards them over
/// a bounded channel. A full channel suspends the sender, which is how a slow
/// row worker holds back the caller.
pub struct ChunkRelay<T, M> {
    tx: mpsc::Sender<M>,
    segment_size: usize,
    _unit: PhantomData<fn(T)>,
}

impl<T, M> Clone for ChunkRelay<T, M> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            segment_size: self.segment_size,
            _unit: PhantomData,
        }
    }
}

impl<T, M> ChunkRelay<T, M>
where
    M: From<Vec<T>> + Send,
{
    pub fn new(tx: mpsc::Sender<M>, segment_size: usize) -> Self {
        Self {
            tx,
            segment_size: segment_size.max(1),
            _unit: PhantomData,
        }
    }

    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<M>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx, SEGMENT_SIZE), rx)
    }

    pub fn segment_size(&self) -> usize {
        self.segment_size
    }

    /// Forwards `unit` in order as segments of at most `segment_size` items.
    /// Returns the number of segments sent.
    pub async fn relay(&self, unit: Vec<T>) -> Result<usize> {
        let mut sent = 0;
        for segment in split_segments(unit, self.segment_size) {
            self.forward(M::from(segment)).await?;
            sent += 1;
        }
        tracing::trace!(segments = sent, "Relayed input unit");
        Ok(sent)
    }

    /// Sends a message that is not subject to splitting.
    pub async fn forward(&self, message: M) -> Result<()> {
        self.tx
            .send(message)
            .await
            .map_err(|_| CsvIoError::ChannelClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Content-preserving split into segments of at most `segment_size` items.
/// An empty unit yields no segments.
pub fn split_segments<T>(unit: Vec<T>, segment_size: usize) -> Vec<Vec<T>> {
    let segment_size = segment_size.max(1);
    if unit.len() <= segment_size {
        return if unit.is_empty() { Vec::new() } else { vec![unit] };
    }

    let mut segments = Vec::with_capacity(unit.len().div_ceil(segment_size));
    let mut items = unit.into_iter();
    loop {
        let segment: Vec<T> = items.by_ref().take(segment_size).collect();
        if segment.is_empty() {
            break;
        }
        segments.push(segment);
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_preserves_content_and_order() {
        let data: Vec<u32> = (0..2503).collect();
        let segments = split_segments(data.clone(), SEGMENT_SIZE);
        assert_eq!(
            segments.iter().map(Vec::len).collect::<Vec<_>>(),
            vec![1000, 1000, 503]
        );
        assert_eq!(segments.concat(), data);
    }

    #[test]
    fn test_split_small_and_empty_units() {
        assert_eq!(split_segments(vec![1, 2, 3], 1000), vec![vec![1, 2, 3]]);
        assert!(split_segments(Vec::<u8>::new(), 1000).is_empty());
        assert_eq!(split_segments(vec![1, 2, 3], 1), vec![vec![1], vec![2], vec![3]]);
    }

    #[test]
    fn test_split_any_boundary_concatenates_back() {
        let data: Vec<u8> = (0..=255u8).cycle().take(4097).collect();
        for size in [1, 7, 999, 1000, 1001, 5000] {
            assert_eq!(split_segments(data.clone(), size).concat(), data);
        }
    }

    #[tokio::test]
    async fn test_relay_waits_for_slow_receiver() {
        let (tx, mut rx) = mpsc::channel::<Vec<u8>>(1);
        let relay: ChunkRelay<u8, Vec<u8>> = ChunkRelay::new(tx, 10);

        let producer = tokio::spawn(async move { relay.relay(vec![7u8; 35]).await });

        let mut received = Vec::new();
        while let Some(segment) = rx.recv().await {
            assert!(segment.len() <= 10);
            received.extend(segment);
        }
        assert_eq!(producer.await.unwrap().unwrap(), 4);
        assert_eq!(received.len(), 35);
    }

    #[tokio::test]
    async fn test_relay_reports_closed_channel() {
        let (tx, rx) = mpsc::channel::<Vec<u8>>(1);
        drop(rx);
        let relay: ChunkRelay<u8, Vec<u8>> = ChunkRelay::new(tx, 10);
        assert!(relay.is_closed());
        assert!(matches!(
            relay.relay(vec![1, 2, 3]).await,
            Err(CsvIoError::ChannelClosed)
        ));
    }
}
