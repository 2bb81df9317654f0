//! Authorship tracking
//!
//! A note's authorship is a run-length list covering the whole document.
//! Each run records who last inserted that stretch of text. Applying an
//! edit maps the runs through the edit: retained text keeps its author,
//! deleted text disappears, inserted text belongs to the editor.
//!
//! Persisted form is the list of attributed spans,
//! `[user_id, start, length, created_at_ms, updated_at_ms]`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ot::{Component, OtError, TextOperation};

type SpanTuple = (Uuid, usize, usize, i64, i64);

/// A contiguous stretch of text written by one user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "SpanTuple", into = "SpanTuple")]
pub struct AuthorshipSpan {
    pub user_id: Uuid,
    pub start: usize,
    pub length: usize,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<SpanTuple> for AuthorshipSpan {
    fn from((user_id, start, length, created_at, updated_at): SpanTuple) -> Self {
        Self {
            user_id,
            start,
            length,
            created_at,
            updated_at,
        }
    }
}

impl From<AuthorshipSpan> for SpanTuple {
    fn from(s: AuthorshipSpan) -> Self {
        (s.user_id, s.start, s.length, s.created_at, s.updated_at)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Run {
    author: Option<Uuid>,
    len: usize,
    created_at: i64,
    updated_at: i64,
}

/// Run-length authorship of a whole document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Authorship {
    runs: Vec<Run>,
}

impl Authorship {
    /// Document of `len` characters written entirely by `author`
    pub fn whole(author: Option<Uuid>, len: usize, now_ms: i64) -> Self {
        let mut runs = Vec::new();
        push_run(
            &mut runs,
            Run {
                author,
                len,
                created_at: now_ms,
                updated_at: now_ms,
            },
        );
        Self { runs }
    }

    /// Rebuild from persisted spans for a document of `doc_len` characters
    ///
    /// Gaps become unattributed; overlapping or out-of-range parts of spans
    /// are clipped.
    pub fn from_spans(spans: &[AuthorshipSpan], doc_len: usize) -> Self {
        let mut sorted: Vec<&AuthorshipSpan> = spans.iter().collect();
        sorted.sort_by_key(|s| s.start);

        let mut runs = Vec::new();
        let mut pos = 0;
        for span in sorted {
            let start = span.start.max(pos).min(doc_len);
            let end = (span.start + span.length).min(doc_len);
            if end <= start {
                continue;
            }
            push_run(&mut runs, unattributed(start - pos));
            push_run(
                &mut runs,
                Run {
                    author: Some(span.user_id),
                    len: end - start,
                    created_at: span.created_at,
                    updated_at: span.updated_at,
                },
            );
            pos = end;
        }
        push_run(&mut runs, unattributed(doc_len - pos));
        Self { runs }
    }

    /// Total document length covered
    pub fn len(&self) -> usize {
        self.runs.iter().map(|r| r.len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Map authorship through an edit made by `author`
    pub fn apply(&mut self, op: &TextOperation, author: Option<Uuid>, now_ms: i64) -> Result<(), OtError> {
        let total = self.len();
        if total != op.base_len() {
            return Err(OtError::BaseLengthMismatch {
                expected: op.base_len(),
                actual: total,
            });
        }

        let mut out = Vec::with_capacity(self.runs.len() + 2);
        let mut runs = std::mem::take(&mut self.runs).into_iter();
        let mut current = runs.next();

        for component in op.ops() {
            let (mut remaining, keep) = match component {
                Component::Retain(n) => (*n, true),
                Component::Delete(n) => (*n, false),
                Component::Insert(text) => {
                    push_run(
                        &mut out,
                        Run {
                            author,
                            len: text.chars().count(),
                            created_at: now_ms,
                            updated_at: now_ms,
                        },
                    );
                    continue;
                }
            };

            while remaining > 0 {
                let Some(mut run) = current.take() else {
                    return Err(OtError::Incompatible("authorship shorter than operation".into()));
                };
                if run.len > remaining {
                    let mut head = run.clone();
                    head.len = remaining;
                    run.len -= remaining;
                    if keep {
                        push_run(&mut out, head);
                    }
                    current = Some(run);
                    remaining = 0;
                } else {
                    remaining -= run.len;
                    if keep {
                        push_run(&mut out, run);
                    }
                    current = runs.next();
                }
            }
        }

        self.runs = out;
        Ok(())
    }

    /// Attributed spans with absolute offsets
    pub fn spans(&self) -> Vec<AuthorshipSpan> {
        let mut spans = Vec::new();
        let mut start = 0;
        for run in &self.runs {
            if let Some(user_id) = run.author {
                spans.push(AuthorshipSpan {
                    user_id,
                    start,
                    length: run.len,
                    created_at: run.created_at,
                    updated_at: run.updated_at,
                });
            }
            start += run.len;
        }
        spans
    }
}

fn unattributed(len: usize) -> Run {
    Run {
        author: None,
        len,
        created_at: 0,
        updated_at: 0,
    }
}

fn push_run(runs: &mut Vec<Run>, run: Run) {
    if run.len == 0 {
        return;
    }
    if let Some(last) = runs.last_mut() {
        if last.author == run.author {
            last.len += run.len;
            last.created_at = last.created_at.min(run.created_at);
            last.updated_at = last.updated_at.max(run.updated_at);
            return;
        }
    }
    runs.push(run);
}
