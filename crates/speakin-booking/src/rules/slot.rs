use crate::model::{AvailabilitySlot, NewSlot};
use crate::rules::{Rule, RuleDecision};

/// A slot creation request with the tutor's existing slots.
#[derive(Clone, Debug)]
pub struct SlotCandidate {
    pub new: NewSlot,
    /// Each existing slot of the tutor, and whether an active booking holds it.
    pub tutor_slots: Vec<(AvailabilitySlot, bool)>,
}

pub struct SlotShapeRule;

impl Rule<SlotCandidate> for SlotShapeRule {
    fn name(&self) -> &str {
        "slot_shape"
    }

    fn evaluate(&self, c: &SlotCandidate) -> RuleDecision {
        if c.new.start_time >= c.new.end_time {
            RuleDecision::fail("start_time must be before end_time")
        } else if c.new.credits_required == 0 {
            RuleDecision::fail("credits_required must be positive")
        } else {
            RuleDecision::Pass
        }
    }
}

/// A tutor's live slots do not overlap. Booked slots whose booking ended
/// or was canceled no longer count.
pub struct TutorOverlapRule;

impl Rule<SlotCandidate> for TutorOverlapRule {
    fn name(&self) -> &str {
        "tutor_overlap"
    }

    fn evaluate(&self, c: &SlotCandidate) -> RuleDecision {
        let clash = c.tutor_slots.iter().find(|(slot, actively_booked)| {
            (!slot.is_booked || *actively_booked) && slot.overlaps(c.new.start_time, c.new.end_time)
        });
        match clash {
            Some((slot, _)) => RuleDecision::fail(format!("overlaps slot {}", slot.id)),
            None => RuleDecision::Pass,
        }
    }
}
