use chrono::{DateTime, Utc};

use speakin_types::{AccountId, BookingStatus, SessionType};

use crate::model::{AvailabilitySlot, Booking};
use crate::rules::{Rule, RuleDecision};

/// A booking request with the data the rules look at.
#[derive(Clone, Debug)]
pub struct BookingCandidate {
    pub slot: AvailabilitySlot,
    pub student_id: AccountId,
    pub now: DateTime<Utc>,
    /// The student's existing bookings with the slot each one is on.
    pub history: Vec<(Booking, AvailabilitySlot)>,
}

impl BookingCandidate {
    /// History entries with the same tutor and session type as the slot.
    fn with_tutor(&self, session_type: SessionType) -> impl Iterator<Item = &(Booking, AvailabilitySlot)> {
        let tutor = self.slot.tutor_id;
        self.history
            .iter()
            .filter(move |(_, slot)| slot.tutor_id == tutor && slot.session_type == session_type)
    }
}

/// The slot is free, still in the future, and not the student's own.
pub struct SlotOpenRule;

impl Rule<BookingCandidate> for SlotOpenRule {
    fn name(&self) -> &str {
        "slot_open"
    }

    fn evaluate(&self, c: &BookingCandidate) -> RuleDecision {
        if c.slot.is_booked {
            RuleDecision::fail(format!("slot {} is already booked", c.slot.id))
        } else if c.slot.has_started(c.now) {
            RuleDecision::fail(format!("slot {} has already started", c.slot.id))
        } else if c.slot.tutor_id == c.student_id {
            RuleDecision::fail("tutors cannot book their own slots")
        } else {
            RuleDecision::Pass
        }
    }
}

/// One trial per tutor: none completed, none pending.
pub struct TrialEligibilityRule;

impl Rule<BookingCandidate> for TrialEligibilityRule {
    fn name(&self) -> &str {
        "trial_eligibility"
    }

    fn evaluate(&self, c: &BookingCandidate) -> RuleDecision {
        if c.slot.session_type != SessionType::Trial {
            return RuleDecision::Pass;
        }
        for (booking, slot) in c.with_tutor(SessionType::Trial) {
            if booking.booking_status == BookingStatus::Completed {
                return RuleDecision::fail("a trial with this tutor was already completed");
            }
            if booking.booking_status.is_active() && !slot.has_ended(c.now) {
                return RuleDecision::fail("a trial with this tutor is already booked");
            }
        }
        RuleDecision::Pass
    }
}

/// Standard sessions follow a completed trial with the same tutor.
pub struct StandardPrerequisiteRule;

impl Rule<BookingCandidate> for StandardPrerequisiteRule {
    fn name(&self) -> &str {
        "standard_prerequisite"
    }

    fn evaluate(&self, c: &BookingCandidate) -> RuleDecision {
        if c.slot.session_type != SessionType::Standard {
            return RuleDecision::Pass;
        }
        let trial_done = c
            .with_tutor(SessionType::Trial)
            .any(|(b, _)| b.booking_status == BookingStatus::Completed);
        if trial_done {
            RuleDecision::Pass
        } else {
            RuleDecision::fail("complete a trial session with this tutor first")
        }
    }
}

/// The student is not already booked at an overlapping time.
pub struct NoOverlapRule;

impl Rule<BookingCandidate> for NoOverlapRule {
    fn name(&self) -> &str {
        "no_overlap"
    }

    fn evaluate(&self, c: &BookingCandidate) -> RuleDecision {
        let clash = c.history.iter().find(|(booking, slot)| {
            booking.booking_status.is_active() && slot.overlaps(c.slot.start_time, c.slot.end_time)
        });
        match clash {
            Some((booking, _)) => {
                RuleDecision::fail(format!("overlaps booking {}", booking.id))
            }
            None => RuleDecision::Pass,
        }
    }
}
