//! Chain verification: replay v1 through every edit record and compare the
//! final hash with the latest version's.

use crate::diff::{reconstruct_new, reconstruct_old};
use crate::error::Result;
use crate::store::VersionStore;
use crate::text::{canonicalize, sha256_hex};
use crate::types::VerifyOutcome;

/// Replay the document's edit chain.
///
/// Verification failures come back as [`VerifyOutcome`] variants, not
/// errors; only store access failures propagate as `Err`.
pub fn verify(store: &VersionStore, doc: &str) -> Result<VerifyOutcome> {
    let Some(latest) = store.latest(doc)? else {
        return Ok(VerifyOutcome::NoVersion);
    };
    let Some(v1) = store.get(doc, 1)? else {
        return Ok(VerifyOutcome::MissingV1);
    };

    let mut text = canonicalize(&v1.text);
    let mut expected_child = 2u32;
    for edit in store.edits(doc)? {
        if edit.child_version != expected_child {
            return Ok(VerifyOutcome::BadOps {
                at: edit.child_version,
                reason: format!(
                    "edit chain breaks: expected child {expected_child}, found {}",
                    edit.child_version
                ),
            });
        }
        if edit.text_ops.is_empty() && !text.is_empty() {
            return Ok(VerifyOutcome::BadOps {
                at: edit.child_version,
                reason: "empty ops for non-empty parent".into(),
            });
        }
        if canonicalize(&reconstruct_old(&edit.text_ops)) != text {
            return Ok(VerifyOutcome::OpsMismatchParent {
                at: edit.child_version,
            });
        }
        text = reconstruct_new(&edit.text_ops);
        expected_child += 1;
    }

    if expected_child != latest.version + 1 {
        return Ok(VerifyOutcome::BadOps {
            at: expected_child,
            reason: format!(
                "missing edit records: replay reaches {} but latest is {}",
                expected_child - 1,
                latest.version
            ),
        });
    }

    let got = sha256_hex(&canonicalize(&text));
    if got == latest.base_sha256 {
        Ok(VerifyOutcome::Ok { base_sha256: got })
    } else {
        Ok(VerifyOutcome::HashMismatch {
            expected: latest.base_sha256,
            got,
        })
    }
}
