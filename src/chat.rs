//! Interactive question/answer session.
//!
//! A line-oriented loop over any async reader and writer (stdin/stdout in the
//! binary, byte buffers in tests). Commands:
//!
//! | Input | Effect |
//! |-------|--------|
//! | `exit`, `quit`, EOF | end the session |
//! | `/history` | print this session's questions and answers |
//! | `/debug` | toggle the retrieved-chunk view |
//! | anything else | ask it |
//!
//! Asking the same question twice in a row shows the previous answer again
//! instead of calling the model.

use std::future::Future;
use std::io::Write;

use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::warn;

use crate::answer::AnswerGenerator;
use crate::error::QueryError;
use crate::models::{Answer, Retrieval, Turn};

const DEBUG_PREVIEW_CHARS: usize = 150;
const PLACEHOLDER: &str = "[...]";

/// Questions and answers for the lifetime of one session. Not persisted.
#[derive(Debug, Default)]
pub struct ConversationHistory {
    turns: Vec<Turn>,
}

impl ConversationHistory {
    pub fn push(&mut self, question: impl Into<String>, answer: impl Into<String>) {
        self.turns.push(Turn {
            question: question.into(),
            answer: answer.into(),
        });
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

/// Collapse whitespace and cut at a word boundary so the result fits in
/// `width` characters, marking the cut with `[...]`.
pub fn shorten(text: &str, width: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    let collapsed = words.join(" ");
    if collapsed.chars().count() <= width {
        return collapsed;
    }

    let budget = width.saturating_sub(PLACEHOLDER.len() + 1);
    let mut out = String::new();
    for word in words {
        let extra = if out.is_empty() { 0 } else { 1 };
        if out.chars().count() + extra + word.chars().count() > budget {
            break;
        }
        if extra == 1 {
            out.push(' ');
        }
        out.push_str(word);
    }

    if out.is_empty() {
        PLACEHOLDER.to_string()
    } else {
        format!("{} {}", out, PLACEHOLDER)
    }
}

/// One line per retrieved chunk: source, chunk index, shortened text.
pub fn render_sources<W: Write>(out: &mut W, sources: &Retrieval) -> Result<()> {
    for chunk in sources.chunks() {
        writeln!(
            out,
            "- {} [chunk {}] → {}",
            chunk.metadata.filename,
            chunk.metadata.chunk_index,
            shorten(&chunk.text, DEBUG_PREVIEW_CHARS)
        )?;
    }
    Ok(())
}

/// Print an answer, optionally followed by the chunks behind it.
pub fn render_answer<W: Write>(out: &mut W, answer: &Answer, show_context: bool) -> Result<()> {
    writeln!(out, "Answer: {}", answer.text)?;
    if show_context {
        writeln!(out)?;
        writeln!(out, "Top retrieved chunks:")?;
        render_sources(out, &answer.sources)?;
    }
    Ok(())
}

/// User-facing text for a failed question.
pub fn render_failure<W: Write>(out: &mut W, err: &QueryError) -> Result<()> {
    match err {
        QueryError::NoContext => writeln!(out, "No relevant documents found.")?,
        other => writeln!(out, "No answer ({}).", other)?,
    }
    Ok(())
}

pub struct ChatSession<'a> {
    generator: &'a AnswerGenerator,
    history: ConversationHistory,
    debug: bool,
    last_sources: Option<Retrieval>,
}

impl<'a> ChatSession<'a> {
    pub fn new(generator: &'a AnswerGenerator) -> Self {
        Self {
            generator,
            history: ConversationHistory::default(),
            debug: false,
            last_sources: None,
        }
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    /// Read questions until `exit`/`quit`, end of input, or `interrupt`.
    pub async fn run<R, W, F>(&mut self, input: R, out: &mut W, interrupt: F) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
        F: Future<Output = ()>,
    {
        tokio::pin!(interrupt);
        let mut lines = input.lines();

        writeln!(out, "Ask My Docs (local). Type 'exit' to quit, '/debug' to show retrieved chunks.")?;
        loop {
            write!(out, "\n? ")?;
            out.flush()?;

            let line = tokio::select! {
                _ = &mut interrupt => None,
                line = lines.next_line() => line?,
            };
            let Some(line) = line else {
                writeln!(out)?;
                break;
            };

            let question = line.trim();
            if question.is_empty() {
                continue;
            }
            if matches!(question.to_lowercase().as_str(), "exit" | "quit") {
                break;
            }
            self.handle(question, out).await?;
        }

        writeln!(out, "Goodbye!")?;
        Ok(())
    }

    async fn handle<W: Write>(&mut self, question: &str, out: &mut W) -> Result<()> {
        match question {
            "/history" => {
                if self.history.is_empty() {
                    writeln!(out, "(no questions yet)")?;
                }
                for (i, turn) in self.history.turns().iter().enumerate() {
                    writeln!(out, "{}. Q: {}", i + 1, turn.question)?;
                    writeln!(out, "   A: {}", turn.answer)?;
                }
                return Ok(());
            }
            "/debug" => {
                self.debug = !self.debug;
                writeln!(out, "debug view {}", if self.debug { "on" } else { "off" })?;
                if self.debug {
                    if let Some(sources) = &self.last_sources {
                        render_sources(out, sources)?;
                    }
                }
                return Ok(());
            }
            _ => {}
        }

        if let Some(turn) = self.history.last() {
            if turn.question == question {
                writeln!(out, "Answer: {}", turn.answer)?;
                return Ok(());
            }
        }

        match self.generator.answer(question).await {
            Ok(answer) => {
                render_answer(out, &answer, self.debug)?;
                self.history.push(question, answer.text.clone());
                self.last_sources = Some(answer.sources);
            }
            Err(e) => {
                warn!(error = %e, "question failed");
                render_failure(out, &e)?;
            }
        }
        Ok(())
    }
}
