//! Clock hands and their rotation animation.

use std::time::{Duration, Instant};

use serde::Deserialize;

use crate::geometry::{self, Position};
use crate::svg::{ElementId, ElementKind, Surface};

/// Total duration of a smooth hand transition.
pub const TRANSITION_DURATION: Duration = Duration::from_millis(70);

/// Number of steps in a smooth hand transition.
pub const TRANSITION_STEPS: u32 = 5;

/// Upper bound on frame-timed steps when frames stall.
const MAX_FRAME_STEPS: u32 = TRANSITION_STEPS * 2;

/// Transitions smaller than this are applied instantly.
const MIN_TRANSITION_DEGREES: f64 = 1.;

/// Host timing used between transition steps.
#[derive(Deserialize, Copy, Clone, Default, PartialEq, Eq, Debug)]
#[serde(rename_all = "lowercase")]
pub enum StepTiming {
    /// Equal angle per step, assuming steps fire on time.
    #[default]
    Delay,
    /// Angle scaled by the elapsed fraction of the transition duration.
    Frame,
}

/// Result of retargeting an [`AngleInterpolator`].
#[derive(Copy, Clone, PartialEq, Debug)]
pub enum Advance {
    /// Target matches the current angle.
    Unchanged,
    /// Angle was set without animation.
    Jump(f64),
    /// Animation started; the first step is already applied.
    Animate { angle: f64, next_step: Duration },
    /// Another animation is still in flight; the target was dropped.
    Busy,
}

/// Result of a single animation step.
#[derive(Copy, Clone, PartialEq, Debug)]
pub enum Step {
    /// Intermediate angle, with the delay until the next step.
    Continue { angle: f64, next_step: Duration },
    /// Animation is complete and snapped to its target.
    Done(f64),
}

impl Step {
    pub fn angle(&self) -> f64 {
        match self {
            Self::Continue { angle, .. } | Self::Done(angle) => *angle,
        }
    }
}

/// In-flight transition.
#[derive(Copy, Clone, Debug)]
struct Transition {
    start: f64,
    delta: f64,
    target: f64,
    started: Instant,
    step: u32,
}

/// Smooth rotation between hand angles.
#[derive(Clone, Debug)]
pub struct AngleInterpolator {
    current: Option<f64>,
    transition: Option<Transition>,
    timing: StepTiming,
    enabled: bool,
}

impl AngleInterpolator {
    pub fn new(timing: StepTiming) -> Self {
        Self { timing, enabled: true, current: None, transition: None }
    }

    /// Last angle the hand settled on.
    pub fn current(&self) -> Option<f64> {
        self.current
    }

    /// Check if a transition is in flight.
    pub fn moving(&self) -> bool {
        self.transition.is_some()
    }

    /// Enable or disable smooth transitions.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Move towards a new target angle.
    pub fn advance_to(&mut self, target: f64, now: Instant) -> Advance {
        let target = geometry::normalize_degrees(target);

        let current = match self.current {
            Some(current) if current == target => return Advance::Unchanged,
            Some(current) => current,
            None => {
                self.current = Some(target);
                return Advance::Jump(target);
            },
        };

        let delta = geometry::forward_delta(current, target);
        if delta < MIN_TRANSITION_DEGREES || !self.enabled {
            // Never jump away from under an in-flight transition.
            if self.transition.is_some() {
                return Advance::Busy;
            }

            self.current = Some(target);
            return Advance::Jump(target);
        }

        if self.transition.is_some() {
            return Advance::Busy;
        }

        self.transition = Some(Transition { start: current, delta, target, started: now, step: 0 });

        match self.step(now) {
            Some(Step::Continue { angle, next_step }) => Advance::Animate { angle, next_step },
            Some(Step::Done(angle)) => Advance::Jump(angle),
            None => Advance::Unchanged,
        }
    }

    /// Advance the in-flight transition by one step.
    ///
    /// Returns `None` if no transition is active.
    pub fn step(&mut self, now: Instant) -> Option<Step> {
        let transition = self.transition.as_mut()?;
        transition.step += 1;

        let (fraction, done) = match self.timing {
            StepTiming::Delay => {
                let fraction = transition.step as f64 / TRANSITION_STEPS as f64;
                (fraction, transition.step >= TRANSITION_STEPS)
            },
            StepTiming::Frame => {
                let elapsed = now.saturating_duration_since(transition.started);
                let fraction = elapsed.as_secs_f64() / TRANSITION_DURATION.as_secs_f64();
                (fraction, fraction >= 1. || transition.step >= MAX_FRAME_STEPS)
            },
        };

        if done {
            let target = transition.target;
            self.current = Some(target);
            self.transition = None;
            return Some(Step::Done(target));
        }

        let angle = geometry::normalize_degrees(transition.start + transition.delta * fraction);
        Some(Step::Continue { angle, next_step: TRANSITION_DURATION / TRANSITION_STEPS })
    }
}

/// Capability of a drawn hand.
pub trait RenderableHand {
    /// Rotate the hand on its surface.
    fn set_angle(&mut self, surface: &mut dyn Surface, degrees: f64);

    /// Angle the hand has settled on.
    fn current_angle(&self) -> Option<f64>;
}

/// Hand kinds.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum HandKind {
    Hours,
    Minutes,
    Seconds,
}

impl HandKind {
    /// CSS class of the hand element.
    pub fn class(&self) -> &'static str {
        match self {
            Self::Hours => "hours",
            Self::Minutes => "minutes",
            Self::Seconds => "seconds",
        }
    }

    /// Distance between the hand's tip and the face's edge, relative to the radius.
    pub fn margin(&self) -> f64 {
        match self {
            Self::Hours => 0.4,
            Self::Minutes | Self::Seconds => 0.1,
        }
    }
}

/// Hand line on a clock face.
#[derive(Debug)]
pub struct Hand {
    pub kind: HandKind,
    interpolator: AngleInterpolator,
    element: ElementId,
    radius: f64,
}

impl Hand {
    /// Draw a new hand pointing at twelve o'clock.
    pub fn draw(
        surface: &mut dyn Surface,
        kind: HandKind,
        radius: f64,
        timing: StepTiming,
    ) -> Self {
        let element = surface.create(None, ElementKind::Line);
        surface.add_class(Some(element), kind.class());
        surface.add_class(Some(element), "hand");
        surface.set_attribute(Some(element), "x1", radius.to_string());
        surface.set_attribute(Some(element), "y1", (radius * kind.margin()).to_string());
        surface.set_attribute(Some(element), "x2", radius.to_string());
        surface.set_attribute(Some(element), "y2", radius.to_string());

        Self { kind, element, radius, interpolator: AngleInterpolator::new(timing) }
    }

    /// Move the hand towards a new angle.
    ///
    /// Returns the delay until [`Self::step`] must be called, if an animation
    /// was started.
    pub fn advance_to(
        &mut self,
        surface: &mut dyn Surface,
        degrees: f64,
        transitions: bool,
        now: Instant,
    ) -> Option<Duration> {
        self.interpolator.set_enabled(transitions);

        match self.interpolator.advance_to(degrees, now) {
            Advance::Jump(angle) => self.set_angle(surface, angle),
            Advance::Animate { angle, next_step } => {
                self.set_angle(surface, angle);
                return Some(next_step);
            },
            Advance::Unchanged | Advance::Busy => (),
        }

        None
    }

    /// Apply the next animation step.
    ///
    /// Returns the delay until the following step, if the animation is not done.
    pub fn step(&mut self, surface: &mut dyn Surface, now: Instant) -> Option<Duration> {
        let step = self.interpolator.step(now)?;
        self.set_angle(surface, step.angle());

        match step {
            Step::Continue { next_step, .. } => Some(next_step),
            Step::Done(_) => None,
        }
    }

    /// Check if an animation is in flight.
    pub fn moving(&self) -> bool {
        self.interpolator.moving()
    }
}

impl RenderableHand for Hand {
    fn set_angle(&mut self, surface: &mut dyn Surface, degrees: f64) {
        let center = Position::new(self.radius, self.radius);
        let length = self.radius - self.radius * self.kind.margin();
        let tip = center.polar(length, degrees);

        surface.set_attribute(Some(self.element), "x1", tip.x.to_string());
        surface.set_attribute(Some(self.element), "y1", tip.y.to_string());
    }

    fn current_angle(&self) -> Option<f64> {
        self.interpolator.current()
    }
}
