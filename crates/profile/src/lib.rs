//! Language profile for the Talkie runtime
//!
//! Assembles the personalization context appended to the completion system
//! prompt: user context, identity settings, training facts, corrections,
//! and accepted completions, each as a labeled section. [`LanguageProfile`]
//! caches the assembled text for a short TTL and is invalidated whenever
//! history changes.

pub mod builder;
pub mod store;

pub use builder::{build_profile_text, ProfileInputs};
pub use store::{
    LanguageProfile, ProfileFacts, ProfileHistory, ProfileSettings,
    ACCEPTED_DISPLAY_CAP, ACCEPTED_PROFILE_LIMIT, CORRECTION_DISPLAY_CAP,
    CORRECTION_PROFILE_LIMIT,
};
