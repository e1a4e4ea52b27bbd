//! Turns raw response chunks into a stream of text fragments.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use futures::Stream;

use crate::client::ResponseStream;
use crate::error::{Error, Result};
use crate::observability::{
    STREAM_DURATION, STREAM_ERRORS, STREAM_FRAGMENTS, STREAM_MID_STREAM_FAILURES, STREAM_TTFF,
};
use crate::types::{FinishReason, GenerateContentResponse, UsageMetadata};

/// One non-empty piece of streamed answer text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextFragment {
    pub text: String,
}

/// A finite, non-restartable stream of answer fragments.
///
/// Each fragment is yielded as soon as its chunk arrives. Once the stream
/// has produced an error or ended it yields nothing further.
///
/// A failure before the first fragment is passed through unchanged. A
/// failure after it is wrapped in [`Error::MidStream`] so that callers can
/// tell a partial answer from no answer. A stream that ends without the
/// provider saying why is treated as a failure, as is a finish reason other
/// than a normal stop or the token limit.
pub struct ReplyStream {
    inner: ResponseStream,
    fragments: usize,
    finish_reason: Option<FinishReason>,
    usage: Option<UsageMetadata>,
    started: Instant,
    time_to_first_fragment: Option<Duration>,
    stopped: Option<Error>,
    done: bool,
}

impl ReplyStream {
    pub fn new(inner: ResponseStream) -> Self {
        Self {
            inner,
            fragments: 0,
            finish_reason: None,
            usage: None,
            started: Instant::now(),
            time_to_first_fragment: None,
            stopped: None,
            done: false,
        }
    }

    /// Number of fragments yielded so far.
    pub fn fragments_received(&self) -> usize {
        self.fragments
    }

    /// The finish reason, once the provider has sent one.
    pub fn finish_reason(&self) -> Option<FinishReason> {
        self.finish_reason
    }

    /// The latest token accounting reported by the provider.
    pub fn usage(&self) -> Option<UsageMetadata> {
        self.usage
    }

    pub fn time_to_first_fragment(&self) -> Option<Duration> {
        self.time_to_first_fragment
    }

    fn fail(&mut self, err: Error) -> Error {
        self.done = true;
        STREAM_ERRORS.click();
        if self.fragments == 0 {
            return err;
        }
        STREAM_MID_STREAM_FAILURES.click();
        Error::mid_stream(err.to_string(), self.fragments, Some(err))
    }

    /// Inspect one chunk; returns the text to yield, if any.
    ///
    /// Text that arrives in the same chunk as an early stop is still yielded;
    /// the stop is reported on the following poll.
    fn absorb(&mut self, chunk: GenerateContentResponse) -> Result<Option<String>> {
        if let Some(usage) = chunk.usage_metadata {
            self.usage = Some(usage);
        }
        let text = chunk.text();
        let stop = if let Some(reason) = chunk.block_reason() {
            Some(Error::content_blocked("the prompt was blocked", reason))
        } else {
            match chunk.finish_reason() {
                Some(reason) if !reason.is_complete() => Some(Error::content_blocked(
                    format!("the response was stopped early ({reason})"),
                    reason.to_string(),
                )),
                Some(reason) => {
                    self.finish_reason = Some(reason);
                    None
                }
                None => None,
            }
        };
        match stop {
            Some(err) if text.is_empty() => Err(err),
            Some(err) => {
                self.stopped = Some(err);
                Ok(Some(text))
            }
            None if text.is_empty() => Ok(None),
            None => Ok(Some(text)),
        }
    }
}

impl Stream for ReplyStream {
    type Item = Result<TextFragment>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if self.done {
                return Poll::Ready(None);
            }
            if let Some(err) = self.stopped.take() {
                return Poll::Ready(Some(Err(self.fail(err))));
            }
            match self.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => match self.absorb(chunk) {
                    Ok(Some(text)) => {
                        self.fragments += 1;
                        STREAM_FRAGMENTS.click();
                        if self.time_to_first_fragment.is_none() {
                            let ttff = self.started.elapsed();
                            STREAM_TTFF.add(ttff.as_secs_f64());
                            self.time_to_first_fragment = Some(ttff);
                        }
                        return Poll::Ready(Some(Ok(TextFragment { text })));
                    }
                    Ok(None) => continue,
                    Err(err) => return Poll::Ready(Some(Err(self.fail(err)))),
                },
                Poll::Ready(Some(Err(err))) => return Poll::Ready(Some(Err(self.fail(err)))),
                Poll::Ready(None) => {
                    if self.finish_reason.is_none() {
                        let err = Error::streaming("stream ended without a finish reason", None);
                        return Poll::Ready(Some(Err(self.fail(err))));
                    }
                    self.done = true;
                    STREAM_DURATION.add(self.started.elapsed().as_secs_f64());
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use futures::stream;

    fn reply(chunks: Vec<Result<GenerateContentResponse>>) -> ReplyStream {
        ReplyStream::new(Box::pin(stream::iter(chunks)))
    }

    async fn drain(mut stream: ReplyStream) -> (Vec<String>, Option<Error>, ReplyStream) {
        let mut texts = Vec::new();
        let mut error = None;
        while let Some(item) = stream.next().await {
            match item {
                Ok(fragment) => texts.push(fragment.text),
                Err(err) => error = Some(err),
            }
        }
        (texts, error, stream)
    }

    #[tokio::test]
    async fn yields_fragments_in_order() {
        let stream = reply(vec![
            Ok(GenerateContentResponse::from_text("Kidney ")),
            Ok(GenerateContentResponse::from_text("stones")),
            Ok(GenerateContentResponse::from_text(".")
                .with_finish_reason(FinishReason::Stop)
                .with_usage(UsageMetadata::new(12, 3))),
        ]);
        let (texts, error, stream) = drain(stream).await;
        assert_eq!(texts, vec!["Kidney ", "stones", "."]);
        assert!(error.is_none());
        assert_eq!(stream.fragments_received(), 3);
        assert_eq!(stream.finish_reason(), Some(FinishReason::Stop));
        assert_eq!(stream.usage(), Some(UsageMetadata::new(12, 3)));
        assert!(stream.time_to_first_fragment().is_some());
    }

    #[tokio::test]
    async fn skips_empty_chunks() {
        let stream = reply(vec![
            Ok(GenerateContentResponse::from_text("")),
            Ok(GenerateContentResponse::from_text("a")),
            Ok(GenerateContentResponse::default().with_finish_reason(FinishReason::MaxTokens)),
        ]);
        let (texts, error, _) = drain(stream).await;
        assert_eq!(texts, vec!["a"]);
        assert!(error.is_none());
    }

    #[tokio::test]
    async fn error_before_first_fragment_passes_through() {
        let stream = reply(vec![Err(Error::service_unavailable("overloaded", None))]);
        let (texts, error, _) = drain(stream).await;
        assert!(texts.is_empty());
        let error = error.unwrap();
        assert!(error.is_transient());
        assert!(!error.is_mid_stream());
    }

    #[tokio::test]
    async fn error_after_fragment_is_mid_stream() {
        let stream = reply(vec![
            Ok(GenerateContentResponse::from_text("partial")),
            Err(Error::streaming("connection reset", None)),
            Ok(GenerateContentResponse::from_text("never seen")),
        ]);
        let (texts, error, _) = drain(stream).await;
        assert_eq!(texts, vec!["partial"]);
        let error = error.unwrap();
        assert!(error.is_mid_stream());
        assert_eq!(error.fragments_received(), Some(1));
    }

    #[tokio::test]
    async fn missing_finish_reason_is_an_error() {
        let (_, error, _) = drain(reply(vec![Ok(GenerateContentResponse::from_text("a"))])).await;
        assert!(error.unwrap().is_mid_stream());

        let (_, error, _) = drain(reply(Vec::new())).await;
        let error = error.unwrap();
        assert!(error.is_transient());
        assert!(!error.is_mid_stream());
    }

    #[tokio::test]
    async fn safety_stop_is_content_blocked() {
        let stream = reply(vec![
            Ok(GenerateContentResponse::from_text("Some")),
            Ok(GenerateContentResponse::default().with_finish_reason(FinishReason::Safety)),
        ]);
        let (_, error, _) = drain(stream).await;
        let error = error.unwrap();
        assert!(error.is_mid_stream());
        assert!(error.to_string().contains("SAFETY"));
    }

    #[tokio::test]
    async fn text_with_early_stop_is_shown_before_the_error() {
        let stream = reply(vec![
            Ok(GenerateContentResponse::from_text("Drink ")),
            Ok(GenerateContentResponse::from_text("water")
                .with_finish_reason(FinishReason::Safety)),
            Ok(GenerateContentResponse::from_text("never seen")),
        ]);
        let (texts, error, stream) = drain(stream).await;
        assert_eq!(texts, vec!["Drink ", "water"]);
        let error = error.unwrap();
        assert!(error.is_mid_stream());
        assert_eq!(error.fragments_received(), Some(2));
        assert_eq!(stream.finish_reason(), None);
    }

    #[tokio::test]
    async fn blocked_prompt() {
        let chunk: GenerateContentResponse =
            serde_json::from_str(r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#).unwrap();
        let (texts, error, _) = drain(reply(vec![Ok(chunk)])).await;
        assert!(texts.is_empty());
        assert!(error.unwrap().is_content_blocked());
    }

    #[tokio::test]
    async fn ends_after_error() {
        let mut stream = reply(vec![
            Err(Error::streaming("boom", None)),
            Ok(GenerateContentResponse::from_text("late")),
        ]);
        assert!(stream.next().await.unwrap().is_err());
        assert!(stream.next().await.is_none());
        assert!(stream.next().await.is_none());
    }
}
