//! Prompt construction for document questions.

use crate::types::ChatMessage;

const INSTRUCTIONS: &str = "You are a helpful assistant. Use the following context to answer \
the question directly and concisely.

If the user greets you, respond with a greeting. If the user says thanks, respond with a \
welcome message.

Do NOT start your answer with phrases like 'According to the PDF', 'This PDF contains', \
'Based on the PDF', or any variation mentioning 'PDF'.

Provide a clear, concise, and relevant answer. If the answer is long, summarize it to be \
between 200 and 300 words, focusing on key points only.";

/// Build the single prompt string sent to the model.
pub fn build_prompt(question: &str, context: &str) -> String {
    format!(
        "{}\n\n\nContext:\n\"\"\"\n{}\n\"\"\"\n\nQuestion: {}\nAnswer:",
        INSTRUCTIONS, context, question
    )
}

/// Message list for a document question: one user message carrying the prompt.
pub fn build_messages(question: &str, context: &str) -> Vec<ChatMessage> {
    vec![ChatMessage::user(build_prompt(question, context))]
}
