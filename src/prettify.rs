//! Readable rendering of raw build instructions

/// Shell wrappers the builder puts in front of instructions, longest first.
const SHELL_PREFIXES: &[&str] = &["/bin/sh -c #(nop) ", "/bin/sh -c "];

/// Turn a raw `created_by` instruction into a readable, possibly multi-line,
/// command.
///
/// Run this once per raw record: the line-breaking steps are not idempotent.
pub fn prettify_command(raw: &str) -> String {
    let stripped = SHELL_PREFIXES
        .iter()
        .find_map(|prefix| raw.strip_prefix(prefix))
        .unwrap_or(raw);

    let mut command = collapse_whitespace(stripped.trim());

    if command.contains(" --") {
        command = command.replace(" --", "\n\t--");
    }

    command.replace(';', ";\n\t")
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
