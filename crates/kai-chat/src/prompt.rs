//! Prompt assembly and reply chunking.

use kai_core::types::MemoryEntry;

/// Flatten the system instruction, prior turns, and the new message into
/// the single prompt string sent to the provider.
pub fn build_prompt(system_prompt: &str, history: &[MemoryEntry], message: &str) -> String {
    let history = history
        .iter()
        .map(|entry| format!("{}: {}", entry.role, entry.text))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "{}\n\nConversation history:\n{}\n\nUser: {}\nAssistant:",
        system_prompt.trim(),
        history,
        message
    )
}

/// Split text into consecutive pieces of `size` characters.
///
/// Splits on character count only, never on word boundaries. The last piece
/// may be shorter; empty input yields no pieces.
pub fn chunk_text(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(size.max(1))
        .map(|piece| piece.iter().collect())
        .collect()
}
