//! Output pipelines: ordered async stream-to-stream transforms.
//!
//! An empty pipeline is never involved in a render; the renderer writes
//! straight to the sink. A non-empty pipeline receives the fully buffered
//! output and feeds it through each step in registration order, every step
//! reading a fresh stream positioned at the start of the previous result.

use std::io::{self, Cursor};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

pub type ByteStream = Box<dyn AsyncRead + Send + Unpin>;

/// One transform step
#[async_trait]
pub trait StreamFilter: Send + Sync {
    /// Consume `input` and produce the transformed stream
    async fn transform(&self, input: ByteStream) -> io::Result<ByteStream>;
}

/// Passes the stream through untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityFilter;

#[async_trait]
impl StreamFilter for IdentityFilter {
    async fn transform(&self, input: ByteStream) -> io::Result<ByteStream> {
        Ok(input)
    }
}

/// Adapts a whole-buffer closure into a stream step
pub struct BytesFilter<F> {
    f: F,
}

#[async_trait]
impl<F> StreamFilter for BytesFilter<F>
where
    F: Fn(Vec<u8>) -> io::Result<Vec<u8>> + Send + Sync,
{
    async fn transform(&self, mut input: ByteStream) -> io::Result<ByteStream> {
        let mut bytes = Vec::new();
        input.read_to_end(&mut bytes).await?;
        let out = (self.f)(bytes)?;
        Ok(Box::new(Cursor::new(out)))
    }
}

/// Build a step from a closure over the buffered bytes
pub fn map_bytes<F>(f: F) -> BytesFilter<F>
where
    F: Fn(Vec<u8>) -> io::Result<Vec<u8>> + Send + Sync,
{
    BytesFilter { f }
}

#[derive(Clone, Default)]
pub struct OutputPipeline {
    steps: Vec<Arc<dyn StreamFilter>>,
}

impl OutputPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, step: impl StreamFilter + 'static) {
        self.steps.push(Arc::new(step));
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run `buffered` through every step and copy the result to `sink`
    pub async fn apply(
        &self,
        buffered: Vec<u8>,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> io::Result<()> {
        let mut bytes = buffered;
        for (index, step) in self.steps.iter().enumerate() {
            debug!(step = index, bytes = bytes.len(), "applying output filter");
            let input: ByteStream = Box::new(Cursor::new(bytes));
            let mut output = step.transform(input).await?;
            let mut next = Vec::new();
            output.read_to_end(&mut next).await?;
            bytes = next;
        }
        sink.write_all(&bytes).await
    }
}

impl std::fmt::Debug for OutputPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputPipeline")
            .field("steps", &self.steps.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn wrap(tag: &'static str) -> impl Fn(Vec<u8>) -> io::Result<Vec<u8>> + Send + Sync {
        move |bytes| {
            let mut out = format!("<{}>", tag).into_bytes();
            out.extend(bytes);
            out.extend(format!("</{}>", tag).into_bytes());
            Ok(out)
        }
    }

    #[tokio::test]
    async fn test_steps_apply_in_registration_order() {
        let mut pipeline = OutputPipeline::new();
        pipeline.push(map_bytes(wrap("a")));
        pipeline.push(map_bytes(wrap("b")));

        let mut sink = Vec::new();
        pipeline.apply(b"x".to_vec(), &mut sink).await.unwrap();
        assert_eq!(String::from_utf8(sink).unwrap(), "<b><a>x</a></b>");
    }

    #[tokio::test]
    async fn test_identity_is_byte_identical() {
        let mut pipeline = OutputPipeline::new();
        pipeline.push(IdentityFilter);
        let input = "héllo <world>".as_bytes().to_vec();

        let mut sink = Vec::new();
        pipeline.apply(input.clone(), &mut sink).await.unwrap();
        assert_eq!(sink, input);
    }

    #[tokio::test]
    async fn test_step_error_propagates() {
        let mut pipeline = OutputPipeline::new();
        pipeline.push(map_bytes(|_| Err(io::Error::new(io::ErrorKind::InvalidData, "bad"))));
        let mut sink = Vec::new();
        let err = pipeline.apply(b"x".to_vec(), &mut sink).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(sink.is_empty());
    }
}
