//! Canned quips.
//!
//! With quips enabled, every few successful SAYs a random logged-in user
//! appears to answer the sender with one of these lines.

use crate::env::Environment;

/// Lines a quip may carry. Each fits in a single terminal chunk.
pub const QUIPS: &[&str] = &[
    "Have you tried turning it off and on again?",
    "That is either genius or a typo.",
    "I was told there would be snacks.",
    "Bold of you to assume I read the scrollback.",
    "Somewhere a packet is lost and nobody misses it.",
    "This meeting could have been a datagram.",
    "I agree, but only out of politeness.",
    "Let me check with my other eleven tabs.",
];

/// Pick a quip.
pub fn pick<E: Environment>(env: &E) -> &'static str {
    QUIPS[env.random_index(QUIPS.len())]
}
