//! Reviewer confirmations: context-anchored ranges tied to one version's
//! hash.

use crate::constants::CONFIRMATION_CONTEXT_CHARS;
use crate::error::{EngineError, Result};
use crate::store::VersionStore;
use crate::text::{canonicalize, sha256_hex};
use crate::types::Confirmation;

/// Build the anchored confirmation set for `ranges` over `full_text`.
///
/// Offsets are character indices; each anchor captures up to 16 characters
/// of context on each side so the range can be re-located on later
/// versions.
#[must_use]
pub fn build_anchors(full_text: &str, base_sha256: &str, ranges: &[(u32, u32)]) -> Vec<Confirmation> {
    let chars: Vec<char> = full_text.chars().collect();
    let total = chars.len();

    ranges
        .iter()
        .map(|&(start, end)| {
            let start = (start as usize).min(total);
            let end = (end as usize).clamp(start, total);
            let prefix_from = start.saturating_sub(CONFIRMATION_CONTEXT_CHARS);
            let suffix_to = (end + CONFIRMATION_CONTEXT_CHARS).min(total);
            Confirmation {
                start_offset: start as u32,
                end_offset: end as u32,
                prefix: chars[prefix_from..start].iter().collect(),
                exact: chars[start..end].iter().collect(),
                suffix: chars[end..suffix_to].iter().collect(),
                base_sha256: base_sha256.to_string(),
            }
        })
        .collect()
}

/// Replace the confirmation set for `(doc, version)`.
///
/// The client proves it is confirming what is stored by sending the
/// version's hash and the full text it sees; a mismatch on either means it
/// must save first.
pub fn save_confirmations(
    store: &VersionStore,
    doc: &str,
    version: u32,
    base_sha256: &str,
    ranges: &[(u32, u32)],
    full_text: &str,
) -> Result<usize> {
    if base_sha256.is_empty() {
        return Err(EngineError::invalid_input("missing base_sha256"));
    }
    let stored = store
        .get(doc, version)?
        .ok_or_else(|| EngineError::VersionNotFound {
            doc: doc.to_string(),
            version,
        })?;
    if stored.base_sha256 != base_sha256 {
        return Err(EngineError::HashMismatch {
            expected: stored.base_sha256,
            got: base_sha256.to_string(),
        });
    }
    let canonical = canonicalize(full_text);
    let client_hash = sha256_hex(&canonical);
    if client_hash != stored.base_sha256 {
        return Err(EngineError::HashMismatch {
            expected: stored.base_sha256,
            got: client_hash,
        });
    }

    let items = build_anchors(&canonical, &stored.base_sha256, ranges);
    let count = items.len();
    store.replace_confirmations(doc, version, items)?;
    tracing::debug!(
        confirm.doc = doc,
        confirm.version = version,
        confirm.count = count,
        "confirmations replaced"
    );
    Ok(count)
}

/// Re-locate a confirmation's `exact` range inside a later text.
///
/// Tries the original offset first, then every occurrence of `exact`,
/// scoring each by how much of the stored prefix/suffix context survives
/// around it. Returns character offsets.
#[must_use]
pub fn relocate(confirmation: &Confirmation, text: &str) -> Option<(u32, u32)> {
    if confirmation.exact.is_empty() {
        return None;
    }
    let chars: Vec<char> = text.chars().collect();
    let exact: Vec<char> = confirmation.exact.chars().collect();
    let prefix: Vec<char> = confirmation.prefix.chars().collect();
    let suffix: Vec<char> = confirmation.suffix.chars().collect();

    let original = confirmation.start_offset as usize;
    let mut best: Option<(usize, usize)> = None; // (score, start)

    let mut at = 0usize;
    while at + exact.len() <= chars.len() {
        if chars[at..at + exact.len()] == exact[..] {
            let mut score = 0usize;
            // Context before: longest shared tail of the stored prefix.
            let before = &chars[at.saturating_sub(prefix.len())..at];
            score += prefix
                .iter()
                .rev()
                .zip(before.iter().rev())
                .take_while(|(a, b)| a == b)
                .count();
            // Context after: longest shared head of the stored suffix.
            let after_end = (at + exact.len() + suffix.len()).min(chars.len());
            let after = &chars[at + exact.len()..after_end];
            score += suffix
                .iter()
                .zip(after.iter())
                .take_while(|(a, b)| a == b)
                .count();
            // Exact original position wins ties.
            if at == original {
                score += 1;
            }
            if best.map_or(true, |(best_score, _)| score > best_score) {
                best = Some((score, at));
            }
        }
        at += 1;
    }

    best.map(|(_, start)| (start as u32, (start + exact.len()) as u32))
}
