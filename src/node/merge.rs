//! Commit-time three-way merge (spec §4.5 "Commit (ETIRW)"): reconciles a
//! swap file's edited sentence against the live file as it stands *at
//! commit time*, not against the snapshot taken when the WRITE session
//! opened. This is what lets two clients editing distinct sentences of
//! the same file both commit successfully (spec §8 "Sentence independence").

use crate::domain::sentence::{render_sentences, split_sentences};

/// Merges sentence `n` (1-based) of `swap_content` into `live_content`,
/// leaving every other sentence of the live file untouched.
pub fn commit(live_content: &str, swap_content: &str, n: usize) -> String {
    let live = split_sentences(live_content);
    let swap = split_sentences(swap_content);

    let mut merged = Vec::with_capacity(live.len().max(n));
    merged.extend(live.iter().take(n.saturating_sub(1)).cloned());
    if let Some(sentence) = swap.get(n - 1) {
        merged.push(sentence.clone());
    }
    if n < live.len() {
        merged.extend(live[n..].iter().cloned());
    }

    render_sentences(&merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overwrites_only_the_target_sentence() {
        let live = "one. two. three.";
        let swap = "one. ZERO two. three.";
        assert_eq!(commit(live, swap, 2), "one. ZERO two. three.");
    }

    #[test]
    fn appends_past_the_end_of_the_live_file() {
        let live = "one.";
        let swap = "one. two.";
        assert_eq!(commit(live, swap, 2), "one. two.");
    }

    #[test]
    fn disjoint_concurrent_edits_both_survive_in_sequence() {
        let original = "one. two. three.";
        let swap_for_first = "ZERO one. two. three.";
        let after_first = commit(original, swap_for_first, 1);
        assert_eq!(after_first, "ZERO one. two. three.");

        let swap_for_third = "one. two. FINAL three.";
        let after_second = commit(&after_first, swap_for_third, 3);
        assert_eq!(after_second, "ZERO one. two. FINAL three.");
    }

    #[test]
    fn empty_live_file_accepts_the_first_sentence() {
        assert_eq!(commit("", "hello world.", 1), "hello world.");
    }
}
