use pi_agent_universal_schema::RequestContext;

/// Prepend the editor context, when there is any, to the user's prompt.
pub fn build_prompt(prompt: &str, context: Option<&RequestContext>) -> String {
    let Some(context) = context else {
        return prompt.to_string();
    };

    let mut parts = Vec::new();
    if let Some(file) = context.file() {
        parts.push(format!("File: {file}"));
    }
    if let Some((start, end)) = context.range {
        parts.push(format!("Range: {start}-{end}"));
    }
    if let Some(selection) = context.selection() {
        parts.push(format!("Selected code:\n{selection}"));
    }

    if parts.is_empty() {
        return prompt.to_string();
    }
    format!("{}\n\nUser request: {prompt}", parts.join("\n"))
}
