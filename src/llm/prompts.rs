//! Prompt templates for summaries and grounded answers

/// Reply the answer model is told to give when the context does not cover the question
pub const REFUSAL: &str = "I'm sorry, but I don't know the answer to that question.";

/// Truncate to at most `max_chars` characters without splitting a code point
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

pub fn code_summary_prompt(file_name: &str, code: &str) -> String {
    format!(
        "You are an intelligent senior software developer who specializes in code summarization.\n\
         You are onboarding a new junior software developer, explaining to them the purpose of \
         the {file_name} file, and you need to summarize the code they will be working with.\n\
         Here is the code they will be working with:\n\n\
         {code}\n\n\
         Generate a short summary of no more than 100 words."
    )
}

pub fn diff_summary_prompt(diff: &str) -> String {
    format!(
        "You are an expert software developer, and you are trying to summarize a git diff.\n\
         Reminders about the git diff format:\n\
         For every file there are a few metadata lines, for example:\n\
         ```\n\
         diff --git a/lib/index.js b/lib/index.js\n\
         index 9e7e2c8..6b6e2c8 100644\n\
         --- a/lib/index.js\n\
         +++ b/lib/index.js\n\
         ```\n\
         This means that `lib/index.js` was updated in this commit. This is only an example.\n\
         Then there is a specifier of the lines that were modified.\n\
         A line starting with `+` is a line that was added.\n\
         A line starting with `-` is a line that was removed.\n\
         A line that starts with neither `+` nor `-` is context given for better understanding.\n\
         Describe only what the diff shows. Do not invent rules about who changed what \
         or draw conclusions from how many files were touched.\n\
         Please summarize the following diff in under 100 words:\n\n\
         {diff}\n\n\
         Keep it as short as possible with a max limit of 100 words."
    )
}

pub fn answer_prompt(context: &str, question: &str) -> String {
    format!(
        "You are an AI code assistant who answers questions about the codebase.\n\
         Your target audience is a technical intern.\n\
         If the question is asking about code or a specific file, provide a detailed answer \
         with step by step instructions on how to achieve the result.\n\
         START CONTEXT BLOCK\n\
         {context}\n\
         END CONTEXT BLOCK\n\n\
         START QUESTION\n\
         {question}\n\
         END QUESTION\n\n\
         Take into account the CONTEXT BLOCK that is provided.\n\
         If the context does not provide the answer to the question, reply exactly: \"{REFUSAL}\"\n\
         Do not invent anything that is not directly drawn from the context.\n\
         Answer in markdown syntax, with code snippets if needed. Be as detailed as possible \
         and make sure nothing is missed."
    )
}
