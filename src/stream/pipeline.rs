//! Stage pipeline for one physical stream: byte counter, transforms, batcher

use anyhow::Context;

use crate::models::RecordContext;

use super::error::{StreamError, StreamResult};
use super::source::{StreamChunk, StreamTransform};

/// Runs chunks of one stream through its transforms and groups records into batches
///
/// Backpressure comes from the caller: nothing is read from the source until the
/// batches returned by the previous [`push`](Self::push) have been handled.
pub(crate) struct StagePipeline {
    stream_name: String,
    transforms: Vec<Box<dyn StreamTransform>>,
    batch: Vec<RecordContext>,
    batch_size: usize,
    bytes_read: u64,
}

impl StagePipeline {
    pub(crate) fn new(
        stream_name: impl Into<String>,
        transforms: Vec<Box<dyn StreamTransform>>,
        batch_size: usize,
    ) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            stream_name: stream_name.into(),
            transforms,
            batch: Vec::with_capacity(batch_size),
            batch_size,
            bytes_read: 0,
        }
    }

    /// Raw bytes seen so far
    pub(crate) fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Feed one chunk from the source; returns the batches it completed
    pub(crate) async fn push(
        &mut self,
        chunk: StreamChunk,
    ) -> StreamResult<Vec<Vec<RecordContext>>> {
        self.bytes_read += chunk.byte_len() as u64;
        let chunks = self.run_transforms(0, vec![chunk]).await?;
        self.collect(chunks)
    }

    /// Flush every transform in order and emit the final partial batch
    pub(crate) async fn finish(&mut self) -> StreamResult<Vec<Vec<RecordContext>>> {
        let mut batches = Vec::new();

        for index in 0..self.transforms.len() {
            let transform = &mut self.transforms[index];
            let name = transform.name().to_string();
            let flushed = transform
                .flush()
                .await
                .with_context(|| format!("transform '{name}' failed to flush"))
                .map_err(|e| StreamError::source_failure(&self.stream_name, e))?;
            let downstream = self.run_transforms(index + 1, flushed).await?;
            batches.extend(self.collect(downstream)?);
        }

        if !self.batch.is_empty() {
            batches.push(std::mem::take(&mut self.batch));
        }
        Ok(batches)
    }

    async fn run_transforms(
        &mut self,
        start: usize,
        chunks: Vec<StreamChunk>,
    ) -> StreamResult<Vec<StreamChunk>> {
        let mut current = chunks;
        for transform in self.transforms.iter_mut().skip(start) {
            let mut next = Vec::with_capacity(current.len());
            for chunk in current {
                let out = transform
                    .transform(chunk)
                    .await
                    .with_context(|| format!("transform '{}' failed", transform.name()))
                    .map_err(|e| StreamError::source_failure(&self.stream_name, e))?;
                next.extend(out);
            }
            current = next;
        }
        Ok(current)
    }

    fn collect(&mut self, chunks: Vec<StreamChunk>) -> StreamResult<Vec<Vec<RecordContext>>> {
        let mut full = Vec::new();
        for chunk in chunks {
            match chunk {
                StreamChunk::Record(record) => {
                    self.batch.push(record);
                    if self.batch.len() >= self.batch_size {
                        full.push(std::mem::replace(
                            &mut self.batch,
                            Vec::with_capacity(self.batch_size),
                        ));
                    }
                }
                StreamChunk::Bytes(bytes) if bytes.is_empty() => {}
                StreamChunk::Bytes(_) => {
                    return Err(StreamError::UnparsedBytes {
                        stream: self.stream_name.clone(),
                    });
                }
            }
        }
        Ok(full)
    }
}
