use log::debug;

/// Turns cumulative text snapshots into pure deltas.
///
/// Each snapshot is expected to extend the previous one. Repeated or stale
/// snapshots (a prefix of what was already seen) produce nothing. A snapshot
/// that rewrites earlier text only contributes the characters past the
/// previously seen length, since emitted text cannot be retracted.
#[derive(Debug, Default)]
pub struct DeltaNormalizer {
    emitted: String,
    snapshot_len: usize,
}

impl DeltaNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next snapshot; returns the unseen suffix, if any.
    pub fn push(&mut self, snapshot: &str) -> Option<String> {
        if snapshot.len() <= self.snapshot_len && self.emitted.starts_with(snapshot) {
            return None;
        }

        let delta = if let Some(suffix) = snapshot.strip_prefix(self.emitted.as_str()) {
            suffix.to_string()
        } else {
            debug!(
                "local snapshot diverged from emitted text (emitted_len={}, snapshot_len={})",
                self.emitted.len(),
                snapshot.len()
            );
            let start = (self.snapshot_len..=snapshot.len())
                .find(|idx| snapshot.is_char_boundary(*idx))
                .unwrap_or(snapshot.len());
            snapshot[start..].to_string()
        };

        self.snapshot_len = self.snapshot_len.max(snapshot.len());
        if delta.is_empty() {
            return None;
        }
        self.emitted.push_str(&delta);
        Some(delta)
    }

    /// Concatenation of every delta returned so far.
    pub fn text(&self) -> &str {
        &self.emitted
    }
}

#[cfg(test)]
mod tests {
    use super::DeltaNormalizer;
    use pretty_assertions::assert_eq;

    fn normalize(snapshots: &[&str]) -> (Vec<String>, String) {
        let mut normalizer = DeltaNormalizer::new();
        let deltas = snapshots
            .iter()
            .filter_map(|snapshot| normalizer.push(snapshot))
            .collect();
        (deltas, normalizer.text().to_string())
    }

    #[test]
    fn cumulative_snapshots_become_suffixes() {
        let (deltas, text) = normalize(&["Hi", "Hi there", "Hi there!"]);
        assert_eq!(deltas, vec!["Hi", " there", "!"]);
        assert_eq!(text, "Hi there!");
    }

    #[test]
    fn repeated_and_empty_snapshots_are_skipped() {
        let (deltas, text) = normalize(&["", "Hel", "Hel", "Hello", "Hello", "Hello world"]);
        assert_eq!(deltas, vec!["Hel", "lo", " world"]);
        assert_eq!(text, "Hello world");
    }

    #[test]
    fn stale_out_of_order_snapshot_is_ignored() {
        let (deltas, text) = normalize(&["Hi", "Hi there", "Hi", "Hi there!"]);
        assert_eq!(deltas, vec!["Hi", " there", "!"]);
        assert_eq!(text, "Hi there!");
    }

    #[test]
    fn rewritten_snapshot_only_contributes_new_length() {
        let (deltas, text) = normalize(&["Hi there", "Hi, there!"]);
        assert_eq!(deltas, vec!["Hi there", "e!"]);
        assert_eq!(text, "Hi theree!");
    }

    #[test]
    fn divergence_respects_char_boundaries() {
        let (deltas, _) = normalize(&["a", "éx"]);
        assert_eq!(deltas, vec!["a", "x"]);
    }

    #[test]
    fn reassembly_matches_final_snapshot_for_monotonic_input() {
        let snapshots = ["Once", "Once upon", "Once upon a", "Once upon a time."];
        let (deltas, text) = normalize(&snapshots);
        assert_eq!(deltas.concat(), snapshots[3]);
        assert_eq!(text, snapshots[3]);
    }
}
