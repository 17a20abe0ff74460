//! Admission rules for slots and bookings.
//!
//! A [`RulePipeline`] runs its rules in order and stops at the first
//! failure. Rules are pure functions of a prepared subject; loading the
//! data they look at is the caller's job.

pub mod booking;
pub mod slot;

pub use booking::{BookingCandidate, NoOverlapRule, SlotOpenRule, StandardPrerequisiteRule, TrialEligibilityRule};
pub use slot::{SlotCandidate, SlotShapeRule, TutorOverlapRule};

use crate::error::{BookingError, BookingResult};

/// Outcome of one rule.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RuleDecision {
    Pass,
    Fail { reason: String },
}

impl RuleDecision {
    pub fn fail(reason: impl Into<String>) -> Self {
        Self::Fail { reason: reason.into() }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }
}

/// One admission check over a subject of type `S`.
pub trait Rule<S>: Send + Sync {
    fn name(&self) -> &str;

    fn evaluate(&self, subject: &S) -> RuleDecision;
}

/// What a single rule said during a pipeline run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuleResult {
    pub rule: String,
    pub decision: RuleDecision,
}

/// Ordered, fail-fast list of rules.
pub struct RulePipeline<S> {
    rules: Vec<Box<dyn Rule<S>>>,
}

impl<S> RulePipeline<S> {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn with_rule(mut self, rule: impl Rule<S> + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Results of every rule evaluated, ending at the first failure.
    pub fn run(&self, subject: &S) -> Vec<RuleResult> {
        let mut results = Vec::with_capacity(self.rules.len());
        for rule in &self.rules {
            let decision = rule.evaluate(subject);
            let failed = !decision.is_pass();
            results.push(RuleResult {
                rule: rule.name().to_string(),
                decision,
            });
            if failed {
                break;
            }
        }
        results
    }

    /// Run the pipeline and turn the first failure into an error.
    pub fn check(&self, subject: &S) -> BookingResult<()> {
        match self.run(subject).pop() {
            Some(RuleResult { rule, decision: RuleDecision::Fail { reason } }) => {
                Err(BookingError::Rejected { rule, reason })
            }
            _ => Ok(()),
        }
    }
}

impl<S> Default for RulePipeline<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl RulePipeline<BookingCandidate> {
    /// Slot open, trial or standard eligibility, no overlap.
    pub fn booking_rules() -> Self {
        Self::new()
            .with_rule(SlotOpenRule)
            .with_rule(TrialEligibilityRule)
            .with_rule(StandardPrerequisiteRule)
            .with_rule(NoOverlapRule)
    }
}

impl RulePipeline<SlotCandidate> {
    pub fn slot_rules() -> Self {
        Self::new().with_rule(SlotShapeRule).with_rule(TutorOverlapRule)
    }
}
