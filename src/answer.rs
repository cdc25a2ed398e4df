//! Grounded answer generation.
//!
//! retrieve → assemble context → fill the prompt template → one chat call.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::context::assemble;
use crate::embedding::ChatModel;
use crate::error::QueryError;
use crate::models::Answer;
use crate::retrieve::Retriever;

/// Fill the fixed grounding template.
pub fn build_prompt(context: &str, question: &str) -> String {
    format!(
        "You are a helpful assistant.\n\
         Use the provided context to answer accurately and concisely.\n\
         \n\
         Context:\n\
         {context}\n\
         \n\
         Question: {question}\n\
         Answer:"
    )
}

pub struct AnswerGenerator {
    retriever: Retriever,
    chat: Arc<dyn ChatModel>,
    top_k: usize,
    max_context_chars: usize,
}

impl AnswerGenerator {
    pub fn new(
        retriever: Retriever,
        chat: Arc<dyn ChatModel>,
        top_k: usize,
        max_context_chars: usize,
    ) -> Self {
        Self {
            retriever,
            chat,
            top_k,
            max_context_chars,
        }
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub async fn answer(&self, question: &str) -> Result<Answer, QueryError> {
        let sources = self.retriever.retrieve(question, self.top_k).await?;
        if sources.is_empty() {
            return Err(QueryError::NoContext);
        }

        let context = assemble(&sources.texts(), self.max_context_chars);
        if context.is_empty() {
            warn!(
                max_context_chars = self.max_context_chars,
                "every retrieved chunk exceeds the context budget"
            );
            return Err(QueryError::NoContext);
        }

        let prompt = build_prompt(&context, question);
        debug!(
            model = self.chat.model_name(),
            prompt_chars = prompt.chars().count(),
            "generating answer"
        );

        let text = self
            .chat
            .chat(&prompt)
            .await
            .map_err(|e| QueryError::Generation(format!("{:#}", e)))?;

        Ok(Answer {
            text: text.trim().to_string(),
            sources,
        })
    }
}
