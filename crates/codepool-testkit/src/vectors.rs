//! Golden vectors for code canonicalization.
//!
//! Any client that pre-normalizes codes must agree with these.

use codepool_core::canonicalize;

/// A golden canonicalization vector.
#[derive(Debug, Clone)]
pub struct GoldenVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    /// Code as a user might submit it.
    pub raw: &'static str,
    /// Expected canonical form.
    pub expected: &'static str,
}

/// Get all golden vectors.
pub fn all_vectors() -> Vec<GoldenVector> {
    vec![
        GoldenVector {
            name: "already canonical",
            raw: "vanilla0",
            expected: "vanilla0",
        },
        GoldenVector {
            name: "mixed case",
            raw: "VaNiLla0",
            expected: "vanilla0",
        },
        GoldenVector {
            name: "dashes and spaces",
            raw: " ab-12 cd-34 ",
            expected: "ab12cd34",
        },
        GoldenVector {
            name: "punctuation only",
            raw: "-_.,!?#/",
            expected: "",
        },
        GoldenVector {
            name: "empty",
            raw: "",
            expected: "",
        },
        GoldenVector {
            name: "non-ascii letters dropped",
            raw: "CAFÉ-9",
            expected: "caf9",
        },
        GoldenVector {
            name: "full-width digits dropped",
            raw: "x１y2",
            expected: "xy2",
        },
        GoldenVector {
            name: "tabs and newlines",
            raw: "\tq1\r\nw2\n",
            expected: "q1w2",
        },
    ]
}

/// Check every vector, reporting the first failure.
pub fn verify_all_vectors() -> Result<(), String> {
    for vector in all_vectors() {
        let actual = canonicalize(vector.raw);
        if actual != vector.expected {
            return Err(format!(
                "{}: canonicalize({:?}) = {:?}, expected {:?}",
                vector.name, vector.raw, actual, vector.expected
            ));
        }
    }
    Ok(())
}
