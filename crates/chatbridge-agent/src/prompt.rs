//! System prompt for the writing assistant.

use chrono::{DateTime, Utc};

/// Build the system prompt for the current date.
pub fn system_prompt(writing_task: Option<&str>) -> String {
    system_prompt_at(Utc::now(), writing_task)
}

/// Build the system prompt for a fixed point in time.
pub fn system_prompt_at(now: DateTime<Utc>, writing_task: Option<&str>) -> String {
    let mut prompt = format!(
        "You are an expert writing assistant embedded in a chat application. \
         Help users draft, edit and improve their writing with clear, well-structured \
         answers.\n\n\
         Today's date is {}.\n\n\
         You have access to a web_search tool. Use it when the user asks about current \
         events, recent facts, or anything you cannot answer confidently from your own \
         knowledge. When you use search results, summarize them in your own words and \
         mention where the information came from. If a search reports that it is not \
         available, answer from your own knowledge and say that you could not search.",
        now.format("%Y-%m-%d")
    );

    if let Some(task) = writing_task.map(str::trim).filter(|t| !t.is_empty()) {
        prompt.push_str("\n\n## Context\n\nWriting Task: ");
        prompt.push_str(task);
    }

    prompt
}
