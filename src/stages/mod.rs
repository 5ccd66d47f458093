//! The record stages of a campaign, in pipeline order.

pub mod classify;
pub mod dispatch;
pub mod drafting;
pub mod replies;
pub mod scoring;

pub use classify::{ReplyClassification, ReplyClassifier};
pub use dispatch::{DeliveryStatus, OutreachDispatcher};
pub use drafting::{EmailDraft, EmailDrafter};
pub use replies::{RandomReplies, ReplyDecider, ReplyKind, ReplySimulator, SimulatedReply};
pub use scoring::{LeadScore, LeadScorer};
