mod llm;
mod summarizer;

pub use llm::{ChatClient, ModelTier, OpenAiClient};
#[cfg(test)]
pub use llm::ChatMessage;
pub use summarizer::Summarizer;
