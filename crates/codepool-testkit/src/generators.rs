//! Proptest generators for property-based testing.

use proptest::prelude::*;

use codepool_core::{AuditParams, CodeRecord, PoolName};

/// Generate a code already in canonical form.
pub fn canonical_code() -> impl Strategy<Value = String> {
    "[a-z0-9]{1,16}".prop_map(String::from)
}

/// Generate a flavour tag.
pub fn flavour() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("vanilla".to_string()),
        Just("chocolate".to_string()),
        Just("strawberry".to_string()),
    ]
}

/// Generate a valid pool name.
pub fn pool_name() -> impl Strategy<Value = PoolName> {
    "[A-Za-z0-9_-]{1,32}".prop_filter_map("valid pool name", |s| PoolName::new(s).ok())
}

/// Generate a request id.
pub fn request_id() -> impl Strategy<Value = String> {
    "req-[a-z0-9]{1,12}".prop_map(String::from)
}

/// Generate an identity for a redemption request.
pub fn audit_params() -> impl Strategy<Value = AuditParams> {
    (request_id(), "tx-[0-9]{1,6}", "user-[0-9]{1,6}")
        .prop_map(|(request_id, tx, user)| AuditParams::new(request_id, tx, user))
}

/// Generate an import row with a canonical code.
pub fn code_record() -> impl Strategy<Value = CodeRecord> {
    (flavour(), canonical_code()).prop_map(|(flavour, code)| CodeRecord::new(flavour, code))
}

/// Generate an import batch of up to `max_len` rows.
pub fn code_batch(max_len: usize) -> impl Strategy<Value = Vec<CodeRecord>> {
    prop::collection::vec(code_record(), 0..=max_len)
}

/// A canonical code and a noisy spelling of it that a user might type.
#[derive(Debug, Clone)]
pub struct DecoratedCode {
    pub canonical: String,
    pub decorated: String,
}

impl Arbitrary for DecoratedCode {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            canonical_code(),
            prop::collection::vec(any::<bool>(), 16),          // uppercase mask
            prop::collection::vec("[ ._#/-]{0,2}", 17),        // noise between chars
        )
            .prop_map(|(canonical, upper, noise)| {
                let mut decorated = String::new();
                for (i, c) in canonical.chars().enumerate() {
                    decorated.push_str(&noise[i]);
                    if upper[i] {
                        decorated.extend(c.to_uppercase());
                    } else {
                        decorated.push(c);
                    }
                }
                decorated.push_str(&noise[16]);
                DecoratedCode {
                    canonical,
                    decorated,
                }
            })
            .boxed()
    }
}
