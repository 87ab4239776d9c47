//! Grounded prompt construction.
//!
//! A [`PromptTemplate`] has exactly two slots, `{context}` and `{question}`.
//! Rendering is a single pass over the parsed template, so slot-like text
//! inside the question or the retrieved paragraphs is never substituted.

use std::sync::LazyLock;

use mediphant_core::{Error, Result};
use mediphant_vector::Match;
use regex::Regex;

/// Instruction that confines the model to the retrieved context.
pub const GROUNDING_INSTRUCTION: &str = "Answer the user's question based only on the following context. If the context doesn't contain the answer, say you don't have enough information.";

/// Default template text.
pub const DEFAULT_TEMPLATE: &str = "Answer the user's question based only on the following context. If the context doesn't contain the answer, say you don't have enough information.

Context:
{context}

Question:
{question}

Concise Answer:";

/// Separator placed between retrieved paragraphs in the context block.
pub const CONTEXT_SEPARATOR: &str = "\n\n";

#[allow(clippy::expect_used)]
static SLOT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("slot pattern is a valid literal")
});

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Context,
    Question,
}

/// A parsed prompt template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    segments: Vec<Segment>,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            segments: vec![
                Segment::Literal(format!("{GROUNDING_INSTRUCTION}\n\nContext:\n")),
                Segment::Context,
                Segment::Literal("\n\nQuestion:\n".to_string()),
                Segment::Question,
                Segment::Literal("\n\nConcise Answer:".to_string()),
            ],
        }
    }
}

impl PromptTemplate {
    /// Parse `template`, which must contain `{context}` and `{question}`
    /// exactly once each and no other `{name}` slot.
    pub fn parse(template: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let (mut contexts, mut questions) = (0, 0);
        let mut last = 0;

        for caps in SLOT.captures_iter(template) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if whole.start() > last {
                segments.push(Segment::Literal(template[last..whole.start()].to_string()));
            }
            match name.as_str() {
                "context" => {
                    contexts += 1;
                    segments.push(Segment::Context);
                }
                "question" => {
                    questions += 1;
                    segments.push(Segment::Question);
                }
                other => {
                    return Err(Error::config(format!(
                        "prompt template has unknown slot '{{{other}}}'; only {{context}} and {{question}} are allowed"
                    )));
                }
            }
            last = whole.end();
        }
        if last < template.len() {
            segments.push(Segment::Literal(template[last..].to_string()));
        }

        if contexts != 1 || questions != 1 {
            return Err(Error::config(format!(
                "prompt template must contain {{context}} and {{question}} exactly once (found {contexts} and {questions})"
            )));
        }
        Ok(Self { segments })
    }

    /// Fill both slots.
    pub fn render(&self, context: &str, question: &str) -> String {
        let mut out = String::with_capacity(
            self.literal_len() + context.len() + question.len(),
        );
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Context => out.push_str(context),
                Segment::Question => out.push_str(question),
            }
        }
        out
    }

    /// Whether the template carries the grounding instruction verbatim.
    pub fn is_grounded(&self) -> bool {
        self.segments.iter().any(|s| match s {
            Segment::Literal(text) => text.contains(GROUNDING_INSTRUCTION),
            _ => false,
        })
    }

    fn literal_len(&self) -> usize {
        self.segments
            .iter()
            .map(|s| match s {
                Segment::Literal(text) => text.len(),
                _ => 0,
            })
            .sum()
    }
}

/// Join match texts in the order given, separated by a blank line.
pub fn assemble_context(matches: &[Match]) -> String {
    matches
        .iter()
        .map(|m| m.text.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

// ============================================================================
// Tests
// ============================================================================
