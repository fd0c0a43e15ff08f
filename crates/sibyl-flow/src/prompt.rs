//! Prompt templates.
//!
//! Every prompt is a single user turn in the instruction-tuned chat format,
//! left open for the model's reply.

/// One background document in the answer prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    pub page_id: i64,
    pub title: String,
    /// Raw page text, or a summary of it.
    pub content: String,
}

/// Wrap `text` as a user turn followed by an open model turn.
pub fn user_turn(text: &str) -> String {
    format!("<start_of_turn>user\n{text} <end_of_turn>\n<start_of_turn>model\n")
}

/// Ask for search terms that would find material relevant to `question`.
pub fn search_prompt(question: &str) -> String {
    user_turn(&format!(
        "You are helping to look up information in a wiki about esoteric programming languages.
Find the search term most likely to return relevant results for the question below.

{question}

Reply with the best keyword only, without any formatting."
    ))
}

/// Ask for a summary of `article` that keeps what `question` needs.
pub fn summary_prompt(question: &str, article: &str, max_words: usize) -> String {
    user_turn(&format!(
        "Summarize the text below, keeping the details needed to answer this question:

{question}

Use {max_words} words or fewer.

{article}"
    ))
}

/// The final answer prompt, with background articles in commitment order.
pub fn response_prompt(question: &str, background: &[Article]) -> String {
    let mut text = String::from(
        "You answer questions about esoteric programming languages on an IRC channel.\n",
    );

    if !background.is_empty() {
        text.push_str("Here is some background material:\n");
        for article in background {
            text.push_str("\nTitle: ");
            text.push_str(&article.title);
            text.push_str("\n\n");
            text.push_str(&article.content);
            text.push('\n');
        }
    }

    text.push_str("\nAnswer the following question:\n\n");
    text.push_str(question);
    text.push_str("\n\nAnswer in at most 100 words.");
    user_turn(&text)
}
