//! Output rendering for the chat transcript and streamed answers.
//!
//! This module provides the renderer trait, a plain-text implementation, and
//! the helpers that drive a renderer from a transcript or a fragment stream.

use std::io::{self, Stdout, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::{Stream, StreamExt};

use crate::chat::{Author, TextFragment, Transcript};
use crate::error::{Error, Result};

/// ANSI escape code for dim text (used for captions).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code for bold text (used for author labels).
const ANSI_BOLD: &str = "\x1b[1m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for cyan text (used for the user label).
const ANSI_CYAN: &str = "\x1b[36m";

/// ANSI escape code for yellow text (used for the incomplete marker).
const ANSI_YELLOW: &str = "\x1b[33m";

/// ANSI escape code for red text (used for errors).
const ANSI_RED: &str = "\x1b[31m";

/// Shown after the partial text while an answer is still streaming.
pub const IN_PROGRESS_MARKER: &str = "▌";

/// Shown after a partial answer that will not be kept.
pub const INCOMPLETE_MARKER: &str = "[incomplete response discarded]";

/// How often a stalled stream checks for a user interrupt.
const INTERRUPT_POLL: Duration = Duration::from_millis(100);

/// Trait for rendering chat output.
///
/// This abstraction allows for different rendering strategies:
/// - Plain text with ANSI styling
/// - Plain text without styling (for piping/redirecting)
/// - Recording renderers in tests
pub trait Renderer: Send {
    /// Print one committed message, used when replaying history.
    fn print_message(&mut self, author: Author, text: &str);

    /// Called before the first fragment of an answer.
    fn start_response(&mut self) {}

    /// Show a newly received fragment.
    ///
    /// `buffer` holds the whole answer so far, `fragment` included, for
    /// renderers that redraw rather than append.
    fn print_partial(&mut self, fragment: &str, buffer: &str);

    /// Called once when an answer has streamed to completion.
    fn finish_response(&mut self, text: &str);

    /// Called when an answer failed part way; `partial` will be discarded.
    fn print_incomplete(&mut self, partial: &str);

    /// Print the per-answer summary line.
    fn print_caption(&mut self, caption: &str);

    /// Print an error message.
    fn print_error(&mut self, error: &str);

    /// Print an informational message.
    fn print_info(&mut self, info: &str);

    /// Called when the stream is interrupted by the user.
    fn print_interrupted(&mut self) {}

    /// Returns true if streaming should be interrupted.
    fn should_interrupt(&self) -> bool {
        false
    }
}

/// Replay a transcript in insertion order.
pub fn render_history(transcript: &Transcript, renderer: &mut dyn Renderer) {
    for message in transcript {
        renderer.print_message(message.author(), message.text());
    }
}

/// Drive a renderer from a fragment stream and return the complete text.
///
/// On failure the partial text is shown as incomplete and the error is
/// returned. A user interrupt ends the stream with [`Error::Abort`].
pub async fn render_streaming<S>(mut fragments: S, renderer: &mut dyn Renderer) -> Result<String>
where
    S: Stream<Item = Result<TextFragment>> + Unpin,
{
    let mut buffer = String::new();
    renderer.start_response();
    loop {
        let item = match until_interrupted(fragments.next(), renderer).await {
            Ok(item) => item,
            Err(err) => {
                renderer.print_incomplete(&buffer);
                return Err(err);
            }
        };
        match item {
            Some(Ok(fragment)) => {
                buffer.push_str(&fragment.text);
                renderer.print_partial(&fragment.text, &buffer);
            }
            Some(Err(err)) => {
                renderer.print_incomplete(&buffer);
                return Err(err);
            }
            None => {
                renderer.finish_response(&buffer);
                return Ok(buffer);
            }
        }
    }
}

/// Await `future` while watching the renderer for a user interrupt.
///
/// The interrupt is checked before the first poll and then every
/// `INTERRUPT_POLL` while the future is pending, so a request stalled on the
/// network can still be abandoned. On interrupt the future is dropped and
/// [`Error::Abort`] is returned.
pub async fn until_interrupted<F>(future: F, renderer: &mut dyn Renderer) -> Result<F::Output>
where
    F: Future,
{
    tokio::pin!(future);
    loop {
        if renderer.should_interrupt() {
            renderer.print_interrupted();
            return Err(Error::abort("response interrupted by user"));
        }
        tokio::select! {
            output = &mut future => return Ok(output),
            _ = tokio::time::sleep(INTERRUPT_POLL) => {}
        }
    }
}

/// Plain text renderer with optional ANSI styling.
///
/// Answers are appended to stdout as they stream. With color enabled an
/// in-progress marker trails the text and is erased before each new
/// fragment.
pub struct PlainTextRenderer {
    stdout: Stdout,
    use_color: bool,
    marker_visible: bool,
    line_start: bool,
    interrupted: Option<Arc<AtomicBool>>,
}

impl PlainTextRenderer {
    /// Creates a new PlainTextRenderer with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new PlainTextRenderer with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self {
            stdout: io::stdout(),
            use_color,
            marker_visible: false,
            line_start: true,
            interrupted: None,
        }
    }

    /// Attaches an interrupt flag to the renderer.
    pub fn with_interrupt(mut self, interrupted: Arc<AtomicBool>) -> Self {
        self.interrupted = Some(interrupted);
        self
    }

    /// Flushes stdout to ensure immediate display of streamed content.
    fn flush(&mut self) {
        let _ = self.stdout.flush();
    }

    fn write(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        print!("{text}");
        self.line_start = text.ends_with('\n');
        self.flush();
    }

    fn erase_marker(&mut self) {
        if self.marker_visible {
            print!("\x08 \x08");
            self.marker_visible = false;
        }
    }

    fn end_line(&mut self) {
        if !self.line_start {
            self.write("\n");
        }
    }

    fn styled(&self, style: &str, text: &str) -> String {
        if self.use_color {
            format!("{style}{text}{ANSI_RESET}")
        } else {
            text.to_string()
        }
    }
}

impl Default for PlainTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for PlainTextRenderer {
    fn print_message(&mut self, author: Author, text: &str) {
        let label = match author {
            Author::User => self.styled(ANSI_CYAN, &format!("{}:", author.label())),
            Author::Assistant => self.styled(ANSI_BOLD, &format!("{}:", author.label())),
        };
        self.end_line();
        self.write(&format!("{label} {text}\n"));
        if author == Author::Assistant {
            self.write("\n");
        }
    }

    fn start_response(&mut self) {
        self.end_line();
        let label = self.styled(ANSI_BOLD, &format!("{}:", Author::Assistant.label()));
        self.write(&format!("{label}\n"));
    }

    fn print_partial(&mut self, fragment: &str, _buffer: &str) {
        self.erase_marker();
        print!("{fragment}");
        if self.use_color {
            print!("{IN_PROGRESS_MARKER}");
            self.marker_visible = true;
            self.line_start = false;
        } else {
            self.line_start = fragment.ends_with('\n');
        }
        self.flush();
    }

    fn finish_response(&mut self, _text: &str) {
        self.erase_marker();
        self.line_start = false;
        self.write("\n");
    }

    fn print_incomplete(&mut self, _partial: &str) {
        self.erase_marker();
        self.end_line();
        let marker = self.styled(ANSI_YELLOW, INCOMPLETE_MARKER);
        self.write(&format!("{marker}\n"));
    }

    fn print_caption(&mut self, caption: &str) {
        self.end_line();
        let caption = self.styled(ANSI_DIM, caption);
        self.write(&format!("{caption}\n\n"));
    }

    fn print_error(&mut self, error: &str) {
        self.erase_marker();
        self.end_line();
        let error = self.styled(ANSI_RED, error);
        eprintln!("{error}");
    }

    fn print_info(&mut self, info: &str) {
        self.end_line();
        println!("{info}");
        self.line_start = true;
        self.flush();
    }

    fn print_interrupted(&mut self) {
        self.erase_marker();
        self.end_line();
        self.write("[interrupted]\n");
    }

    fn should_interrupt(&self) -> bool {
        self.interrupted
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use futures::stream;

    use super::*;

    #[derive(Default)]
    struct Recording {
        events: Vec<String>,
        interrupt_after: Option<usize>,
    }

    impl Renderer for Recording {
        fn print_message(&mut self, author: Author, text: &str) {
            self.events.push(format!("{}: {text}", author.label()));
        }

        fn print_partial(&mut self, fragment: &str, buffer: &str) {
            self.events.push(format!("partial {fragment}|{buffer}"));
        }

        fn finish_response(&mut self, text: &str) {
            self.events.push(format!("finish {text}"));
        }

        fn print_incomplete(&mut self, partial: &str) {
            self.events.push(format!("incomplete {partial}"));
        }

        fn print_caption(&mut self, caption: &str) {
            self.events.push(format!("caption {caption}"));
        }

        fn print_error(&mut self, error: &str) {
            self.events.push(format!("error {error}"));
        }

        fn print_info(&mut self, info: &str) {
            self.events.push(format!("info {info}"));
        }

        fn print_interrupted(&mut self) {
            self.events.push("interrupted".to_string());
        }

        fn should_interrupt(&self) -> bool {
            let partials = self
                .events
                .iter()
                .filter(|e| e.starts_with("partial"))
                .count();
            self.interrupt_after.is_some_and(|n| partials >= n)
        }
    }

    fn fragments(items: Vec<Result<&str>>) -> impl Stream<Item = Result<TextFragment>> + Unpin {
        stream::iter(
            items
                .into_iter()
                .map(|item| {
                    item.map(|text| TextFragment {
                        text: text.to_string(),
                    })
                })
                .collect::<Vec<_>>(),
        )
    }

    #[test]
    fn renderer_default_has_color() {
        let renderer = PlainTextRenderer::new();
        assert!(renderer.use_color);
    }

    #[test]
    fn renderer_without_color() {
        let renderer = PlainTextRenderer::with_color(false);
        assert!(!renderer.use_color);
        assert_eq!(renderer.styled(ANSI_RED, "plain"), "plain");
    }

    #[test]
    fn interrupt_flag() {
        let flag = Arc::new(AtomicBool::new(false));
        let renderer = PlainTextRenderer::with_color(false).with_interrupt(flag.clone());
        assert!(!renderer.should_interrupt());
        flag.store(true, Ordering::Relaxed);
        assert!(renderer.should_interrupt());
    }

    #[test]
    fn history_replays_in_order() {
        let mut transcript = Transcript::new();
        transcript.push_exchange("q1", "a1");
        transcript.push_exchange("q2", "a2");
        let mut renderer = Recording::default();
        render_history(&transcript, &mut renderer);
        assert_eq!(
            renderer.events,
            vec!["You: q1", "Assistant: a1", "You: q2", "Assistant: a2"]
        );
    }

    #[tokio::test]
    async fn streaming_accumulates_buffer() {
        let mut renderer = Recording::default();
        let text = render_streaming(fragments(vec![Ok("a"), Ok("b"), Ok("c")]), &mut renderer)
            .await
            .unwrap();
        assert_eq!(text, "abc");
        assert_eq!(
            renderer.events,
            vec!["partial a|a", "partial b|ab", "partial c|abc", "finish abc"]
        );
    }

    #[tokio::test]
    async fn streaming_error_marks_incomplete() {
        let mut renderer = Recording::default();
        let err = render_streaming(
            fragments(vec![Ok("half"), Err(Error::streaming("reset", None))]),
            &mut renderer,
        )
        .await
        .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(renderer.events, vec!["partial half|half", "incomplete half"]);
    }

    #[tokio::test]
    async fn pending_future_yields_to_interrupt() {
        let mut renderer = Recording {
            interrupt_after: Some(0),
            ..Recording::default()
        };
        let err = until_interrupted(futures::future::pending::<()>(), &mut renderer)
            .await
            .unwrap_err();
        assert!(err.is_abort());
        assert_eq!(renderer.events, vec!["interrupted"]);
    }

    #[tokio::test]
    async fn ready_future_passes_through() {
        let mut renderer = Recording::default();
        let value = until_interrupted(async { 7 }, &mut renderer).await.unwrap();
        assert_eq!(value, 7);
        assert!(renderer.events.is_empty());
    }

    #[tokio::test]
    async fn streaming_interrupt_aborts() {
        let mut renderer = Recording {
            interrupt_after: Some(1),
            ..Recording::default()
        };
        let err = render_streaming(fragments(vec![Ok("one"), Ok("two")]), &mut renderer)
            .await
            .unwrap_err();
        assert!(err.is_abort());
        assert_eq!(
            renderer.events,
            vec!["partial one|one", "interrupted", "incomplete one"]
        );
    }
}
