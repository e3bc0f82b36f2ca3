//! Answer composer
//!
//! Turns a question and its retrieved chunks into a prompt, asks the
//! language model, and splits the reply into the answer text and the set of
//! sources the model says it used.
//!
//! Author: hephaex@gmail.com

use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock};

use assistant_core::{Answer, AssistantError, LlmClient, Result, ScoredRecord};
use regex::{Captures, Regex};

/// Default prompt. `{question}` and `{source_documents}` are substituted.
pub const DEFAULT_TEMPLATE: &str = "\
You are an assistant for question-answering tasks on Formula One (F1) documentation.
Given the following extracted parts of a long document and a question, create a final answer with used references (named \"sources\").
Keep the answer concise. If you don't know the answer, just say that you don't know. Don't try to make up an answer.
ALWAYS return used sources in your answer.

QUESTION: {question}
=========
{source_documents}
=========
FINAL ANSWER: ";

/// Render retrieved chunks as `Content: ..\nSource: ..` blocks separated by
/// blank lines
pub fn format_docs(results: &[ScoredRecord]) -> String {
    results
        .iter()
        .map(|r| format!("Content: {}\nSource: {}", r.record.text, r.record.source()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn sources_marker() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| Regex::new(r"(?i)\bsources\s*:").expect("valid sources regex"))
}

fn placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\{(question|source_documents)\}").expect("valid placeholder regex")
    })
}

/// Split a model reply at its last `SOURCES:` marker.
///
/// Entries after the marker may be separated by commas or newlines and may
/// carry list bullets. A reply without a marker has no sources.
pub fn parse_answer(reply: &str) -> Answer {
    let Some(marker) = sources_marker().find_iter(reply).last() else {
        return Answer {
            text: reply.trim().to_string(),
            sources: BTreeSet::new(),
        };
    };

    let sources = reply[marker.end()..]
        .split([',', '\n'])
        .map(|entry| {
            entry
                .trim()
                .trim_start_matches(['-', '*', '•'])
                .trim()
                .to_string()
        })
        .filter(|entry| !entry.is_empty())
        .collect();

    Answer {
        text: reply[..marker.start()].trim().to_string(),
        sources,
    }
}

/// Produces answers grounded in retrieved chunks
#[derive(Clone)]
pub struct AnswerComposer {
    llm: Arc<dyn LlmClient>,
    template: String,
}

impl AnswerComposer {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            template: DEFAULT_TEMPLATE.to_string(),
        }
    }

    /// Replace the prompt template. It must contain both `{question}` and
    /// `{source_documents}`.
    pub fn with_template(mut self, template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        for key in ["{question}", "{source_documents}"] {
            if !template.contains(key) {
                return Err(AssistantError::ConfigError(format!(
                    "prompt template lacks {key}"
                )));
            }
        }
        self.template = template;
        Ok(self)
    }

    /// Fill the template in a single pass, so placeholder text inside the
    /// question or the chunks is left as is.
    pub fn build_prompt(&self, question: &str, results: &[ScoredRecord]) -> String {
        let docs = format_docs(results);
        placeholder()
            .replace_all(&self.template, |caps: &Captures| match &caps[1] {
                "question" => question.to_string(),
                _ => docs.clone(),
            })
            .into_owned()
    }

    /// Ask the model to answer `question` from `results`
    pub async fn answer(&self, question: &str, results: &[ScoredRecord]) -> Result<Answer> {
        let prompt = self.build_prompt(question, results);
        tracing::info!(
            chunks = results.len(),
            prompt_chars = prompt.len(),
            "Calling LLM"
        );

        let reply = self.llm.generate(&prompt).await.map_err(|e| match e {
            AssistantError::UpstreamError(_) => e,
            other => AssistantError::UpstreamError(other.to_string()),
        })?;

        let answer = parse_answer(&reply);
        if answer.text.is_empty() {
            return Err(AssistantError::UpstreamError(
                "language model returned an empty answer".to_string(),
            ));
        }

        tracing::info!(
            answer_chars = answer.text.len(),
            sources = answer.sources.len(),
            "LLM response received"
        );
        Ok(answer)
    }
}
