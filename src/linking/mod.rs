//! Linking core: membership index, matching, cleaning, multi-step bridging
//! and cross-step resolution.

pub mod bridge;
pub mod cleaner;
pub mod driver;
pub mod matcher;
pub mod membership;
pub mod merit;
pub mod resolver;
pub mod types;

pub use bridge::{BridgeArena, BridgeRecord};
pub use cleaner::{CleanPolicy, clean};
pub use driver::{DirectionPass, StoreView, WorkerLinks, run_direction};
pub use matcher::cross_match;
pub use membership::{IndexPass, MembershipIndex, MembershipMode, Owner};
pub use merit::Overlap;
pub use resolver::{Resolution, ResolvePolicy, resolve};
pub use types::{
    Candidate, CandidateList, Claim, Direction, Link, LinkState, ObjectLinks, cmp_candidates,
    cmp_claims,
};
