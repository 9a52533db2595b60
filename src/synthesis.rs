//! Answer synthesis.
//!
//! Builds the grounded prompt, invokes the completion service, and
//! canonicalizes the source list. A single request walks at most four
//! states: SmallTalk, NoGrounding, Synthesize, SourceInjection.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::completion::{ChatTurn, CompletionRequest, CompletionService};
use crate::prompts::PromptResolver;
use crate::retrieval::{Query, RetrievedFragment};

/// Greeting phrases answered without retrieval or an LLM call.
const SMALL_TALK: &[&str] = &[
    "hello",
    "hi",
    "hey",
    "hi there",
    "hello there",
    "good morning",
    "good afternoon",
    "good evening",
    "how are you",
    "how are you?",
    "thanks",
    "thank you",
];

const SMALL_TALK_REPLY: &str =
    "Hello! I'm here to help you find answers from your documents. What would you like to know?";

/// Fixed degraded-answer template; used for both missing grounding and
/// completion-service failures so raw errors never reach the user.
pub const NO_GROUNDING_REPLY: &str =
    "I wasn't able to retrieve a confident answer from the available documents. \
     Please try rephrasing your question.";

const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";
const HISTORY_WINDOW: usize = 6;

/// Final answer handed back to the caller.
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    /// Distinct source file names backing the answer, alphabetical.
    pub sources: Vec<String>,
    /// False for small talk and degraded replies.
    pub grounded: bool,
}

impl Answer {
    fn small_talk() -> Self {
        Self {
            text: SMALL_TALK_REPLY.to_string(),
            sources: Vec::new(),
            grounded: false,
        }
    }

    fn no_grounding() -> Self {
        Self {
            text: NO_GROUNDING_REPLY.to_string(),
            sources: Vec::new(),
            grounded: false,
        }
    }
}

/// Case-insensitive, whitespace-trimmed exact match against the greeting set.
pub fn is_small_talk(text: &str) -> bool {
    let normalized = text.trim().to_lowercase();
    SMALL_TALK.contains(&normalized.as_str())
}

pub struct AnswerSynthesizer {
    resolver: PromptResolver,
    completion: std::sync::Arc<dyn CompletionService>,
}

impl AnswerSynthesizer {
    pub fn new(
        resolver: PromptResolver,
        completion: std::sync::Arc<dyn CompletionService>,
    ) -> Self {
        Self {
            resolver,
            completion,
        }
    }

    pub fn small_talk_answer() -> Answer {
        Answer::small_talk()
    }

    pub fn no_grounding_answer() -> Answer {
        Answer::no_grounding()
    }

    /// Synthesize a grounded answer from already-retrieved fragments.
    ///
    /// Completion failures are logged and mapped to the fixed degraded
    /// reply; they are not retried and never propagate to the caller.
    pub async fn synthesize(&self, query: &Query, fragments: &[RetrievedFragment]) -> Answer {
        if fragments.is_empty() {
            return Answer::no_grounding();
        }

        let prompt_config = self.resolver.resolve(query.collection_id.as_deref()).await;
        let prompt = build_prompt(
            &prompt_config.system_prompt,
            &query.history,
            fragments,
            &query.text,
        );

        let request = CompletionRequest {
            model: prompt_config.model_name,
            max_tokens: prompt_config.max_tokens,
            temperature: prompt_config.temperature,
            messages: vec![ChatTurn::user(prompt)],
        };

        match self.completion.complete(&request).await {
            Ok(raw) => {
                let (text, sources) = inject_sources(&raw, fragments);
                Answer {
                    text,
                    sources,
                    grounded: true,
                }
            }
            Err(err) => {
                tracing::error!("Completion service failed: {}", err);
                Answer::no_grounding()
            }
        }
    }
}

/// Assemble the final prompt: system prompt, conversation window, citation
/// instruction, context blocks, then the question.
fn build_prompt(
    system_prompt: &str,
    history: &[ChatTurn],
    fragments: &[RetrievedFragment],
    question: &str,
) -> String {
    let conversation_context = if history.is_empty() {
        String::new()
    } else {
        let window = &history[history.len().saturating_sub(HISTORY_WINDOW)..];
        let lines: Vec<String> = window
            .iter()
            .map(|turn| {
                let speaker = if turn.role == "user" { "Human" } else { "Assistant" };
                format!("{}: {}", speaker, turn.content)
            })
            .collect();
        format!("\n\nPrevious conversation:\n{}", lines.join("\n"))
    };

    let context = fragments
        .iter()
        .enumerate()
        .map(|(i, fragment)| {
            format!(
                "Source {} (from {}):\n{}",
                i + 1,
                fragment.file_name,
                fragment.text
            )
        })
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR);

    format!(
        "{}{}\n\nAnswer using only the context below. Always end your answer with a \
         \"Sources:\" section listing the documents you used.\n\nContext:\n{}\n\nQuestion: {}\nAnswer:",
        system_prompt, conversation_context, context, question
    )
}

fn sources_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Matches a model-authored "Sources:" section from its marker to the end
    // of the text. Textual heuristic; see DESIGN.md.
    RE.get_or_init(|| Regex::new(r"(?is)\n*\s*sources:\s*.*$").expect("static regex"))
}

/// Replace whatever source list the model produced with a canonical one.
///
/// The canonical section lists the distinct file names of the fragments
/// actually used, alphabetically, one per line. Idempotent.
fn inject_sources(raw_answer: &str, fragments: &[RetrievedFragment]) -> (String, Vec<String>) {
    let body = sources_marker().replace(raw_answer, "");
    let body = body.trim();

    let sources: Vec<String> = fragments
        .iter()
        .map(|fragment| fragment.file_name.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let listing = sources
        .iter()
        .map(|name| format!("- {}", name))
        .collect::<Vec<_>>()
        .join("\n");

    (format!("{}\n\nSources:\n{}", body, listing), sources)
}
