//! Analog clock face.

use std::time::{Duration, Instant};

use chrono::{DateTime, Local, TimeZone, Utc};
use smallvec::SmallVec;
use tracing::debug;

use crate::config::{ClockConfig, Colors};
use crate::error::Error;
use crate::hand::{Hand, HandKind, RenderableHand};
use crate::scheduler::{Callback, RedrawBatching, RegistrationId, SurfaceId, TickScheduler};
use crate::svg::{ElementId, ElementKind, Surface};
use crate::timebase::{self, NumberingBase, TimeReading};

/// Distance of minute digits from the face's edge, relative to the radius.
const MINUTE_DIGITS_DISTANCE: f64 = 0.3;

/// Length of minute ticks, relative to the radius.
const MINUTE_TICKS_LENGTH: f64 = 0.06;

/// Distance of hour digits from the face's edge, relative to the radius.
const HOUR_DIGITS_DISTANCE: f64 = 0.175;

/// Length of hour ticks, relative to the radius.
const HOUR_TICKS_LENGTH: f64 = 0.08;

/// Baseline offset of rotated digits, relative to the radius.
const ROTATED_DIGITS_OFFSET: f64 = 0.05;

/// Source of wall clock time.
pub trait HostClock {
    /// Current time.
    fn now(&self) -> DateTime<Utc>;

    /// Local timezone's UTC offset in seconds at `time`.
    fn local_offset(&self, time: DateTime<Utc>) -> i32;
}

/// System wall clock and timezone.
pub struct SystemClock;

impl HostClock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn local_offset(&self, time: DateTime<Utc>) -> i32 {
        Local.offset_from_utc_datetime(&time.naive_utc()).local_minus_utc()
    }
}

/// Display state broadcast whenever the smallest displayed unit changes.
#[derive(Clone, PartialEq, Debug)]
pub struct TickEvent {
    pub reading: TimeReading,
    pub display: String,
}

/// Subscriber to [`TickEvent`]s.
pub type TickListener = Box<dyn FnMut(&TickEvent)>;

/// Hand animation waiting for its next step.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct PendingStep {
    pub hand: HandKind,
    pub delay: Duration,
}

/// Geometry emitted by [`ClockFace::draw`].
struct Dial {
    base: NumberingBase,
    hands: SmallVec<[Hand; 3]>,
}

enum FaceState {
    Unrendered,
    Rendered(Dial),
}

/// Analog clock face.
pub struct ClockFace {
    config: ClockConfig,
    colors: Colors,
    state: FaceState,

    registration: Option<RegistrationId>,
    listeners: Vec<TickListener>,
    last_tick: Option<TickEvent>,
}

impl ClockFace {
    pub fn new(config: ClockConfig, colors: Colors) -> Self {
        Self {
            config,
            colors,
            state: FaceState::Unrendered,
            registration: Default::default(),
            last_tick: Default::default(),
            listeners: Default::default(),
        }
    }

    pub fn config(&self) -> &ClockConfig {
        &self.config
    }

    /// Mutable access to the configuration.
    ///
    /// Changes to the dial's geometry only take effect on a new face, while
    /// time reference, smoothing and transitions apply on the next update.
    pub fn config_mut(&mut self) -> &mut ClockConfig {
        &mut self.config
    }

    /// Check if the face was drawn.
    pub fn is_rendered(&self) -> bool {
        matches!(self.state, FaceState::Rendered(_))
    }

    /// Check if the face is registered with a scheduler.
    pub fn is_running(&self) -> bool {
        self.registration.is_some()
    }

    /// Heartbeat interval required by the face's numbering base.
    pub fn tick_interval(&self) -> Duration {
        self.base().strategy().tick_interval()
    }

    /// Last tick broadcast to listeners.
    pub fn last_tick(&self) -> Option<&TickEvent> {
        self.last_tick.as_ref()
    }

    /// Subscribe to tick events.
    pub fn on_tick(&mut self, listener: impl FnMut(&TickEvent) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Emit the face's geometry.
    pub fn draw(&mut self, surface: &mut dyn Surface) -> Result<(), Error> {
        if self.is_rendered() {
            return Err(Error::AlreadyRendered);
        }

        let config = &self.config;
        let radius = config.radius;
        let base = config.base;
        let strategy = base.strategy();

        // Batch the whole face into a single frame.
        let handle = surface.suspend_redraw();

        surface.add_class(None, "clock");
        surface.add_class(None, base.name());
        surface.set_attribute(None, "width", (radius * 2.).to_string());
        surface.set_attribute(None, "height", (radius * 2.).to_string());
        surface.set_attribute(None, "viewBox", format!("0 0 {0} {0}", radius * 2.));

        let style = surface.create(None, ElementKind::Style);
        surface.set_text(style, &self.stylesheet());

        let face = surface.create(None, ElementKind::Circle);
        surface.add_class(Some(face), "face");
        surface.set_attribute(Some(face), "cx", radius.to_string());
        surface.set_attribute(Some(face), "cy", radius.to_string());
        surface.set_attribute(Some(face), "r", radius.to_string());

        if config.minutes_digits {
            self.draw_digits(surface, strategy.minute_digits(), MINUTE_DIGITS_DISTANCE, "minute");
        }
        if config.minutes_ticks {
            self.draw_ticks(surface, strategy.minute_ticks(), MINUTE_TICKS_LENGTH, "minute");
        }
        if config.hours_digits {
            match &config.hour_labels {
                Some(labels) => self.draw_digits(surface, labels, HOUR_DIGITS_DISTANCE, "hour"),
                None => {
                    self.draw_digits(surface, strategy.hour_digits(), HOUR_DIGITS_DISTANCE, "hour")
                },
            }
        }
        if config.hours_ticks {
            self.draw_ticks(surface, strategy.hour_ticks(), HOUR_TICKS_LENGTH, "hour");
        }

        let mut hands = SmallVec::new();
        for (kind, visible) in [
            (HandKind::Hours, config.hours_hand),
            (HandKind::Minutes, config.minutes_hand),
            (HandKind::Seconds, config.seconds_hand),
        ] {
            if visible {
                hands.push(Hand::draw(surface, kind, radius, config.step_timing));
            }
        }

        if let Some(handle) = handle {
            surface.unsuspend_redraw(handle);
        }

        debug!("Drew {base} clock face with radius {radius}");

        self.state = FaceState::Rendered(Dial { base, hands });

        Ok(())
    }

    /// Register the face's update callback with a scheduler.
    ///
    /// The callback is expected to call [`Self::update`] on this face.
    pub fn start<D: RedrawBatching>(
        &mut self,
        scheduler: &mut TickScheduler<D>,
        surface: Option<SurfaceId>,
        update: Callback<D>,
    ) -> Result<RegistrationId, Error> {
        if !self.is_rendered() {
            return Err(Error::NotRendered);
        }

        if let Some(registration) = self.registration {
            return Ok(registration);
        }

        let registration = scheduler.register(update, self.tick_interval(), surface)?;
        self.registration = Some(registration);

        Ok(registration)
    }

    /// Remove the face's update callback from its scheduler.
    pub fn stop<D: RedrawBatching>(&mut self, scheduler: &mut TickScheduler<D>) -> bool {
        match self.registration.take() {
            Some(registration) => scheduler.unregister(registration),
            None => false,
        }
    }

    /// Move the hands to the host's current time.
    ///
    /// Returns all hand animations which need to be stepped.
    pub fn update(
        &mut self,
        surface: &mut dyn Surface,
        clock: &dyn HostClock,
        now: Instant,
    ) -> SmallVec<[PendingStep; 3]> {
        let time = clock.now();
        let local_offset = clock.local_offset(time);
        self.update_at(surface, time, local_offset, self.config.transitions, now)
    }

    /// Show a fixed instant without animation.
    pub fn display(&mut self, surface: &mut dyn Surface, time: DateTime<Utc>, local_offset: i32) {
        let steps = self.update_at(surface, time, local_offset, false, Instant::now());
        debug_assert!(steps.is_empty());
    }

    /// Apply the next animation step of a hand.
    ///
    /// Returns the delay until the following step, if the animation is not done.
    pub fn step_hand(
        &mut self,
        surface: &mut dyn Surface,
        kind: HandKind,
        now: Instant,
    ) -> Option<Duration> {
        let dial = match &mut self.state {
            FaceState::Rendered(dial) => dial,
            FaceState::Unrendered => return None,
        };

        let hand = dial.hands.iter_mut().find(|hand| hand.kind == kind)?;
        hand.step(surface, now)
    }

    /// Current angle of a hand.
    pub fn hand_angle(&self, kind: HandKind) -> Option<f64> {
        match &self.state {
            FaceState::Rendered(dial) => {
                dial.hands.iter().find(|hand| hand.kind == kind)?.current_angle()
            },
            FaceState::Unrendered => None,
        }
    }

    fn update_at(
        &mut self,
        surface: &mut dyn Surface,
        time: DateTime<Utc>,
        local_offset: i32,
        transitions: bool,
        now: Instant,
    ) -> SmallVec<[PendingStep; 3]> {
        let mut steps = SmallVec::new();

        let dial = match &mut self.state {
            FaceState::Rendered(dial) => dial,
            FaceState::Unrendered => return steps,
        };

        let reading = timebase::convert(dial.base, time, &self.config.reckoning(), local_offset);

        for hand in &mut dial.hands {
            let angle = match hand.kind {
                HandKind::Hours => reading.hours_angle,
                HandKind::Minutes => reading.minutes_angle,
                HandKind::Seconds => reading.seconds_angle,
            };

            if let Some(delay) = hand.advance_to(surface, angle, transitions, now) {
                steps.push(PendingStep { hand: hand.kind, delay });
            }
        }

        // Only format and broadcast when the displayed unit changes.
        if self.last_tick.as_ref().is_none_or(|tick| tick.reading.unit != reading.unit) {
            let tick = TickEvent { display: reading.display(), reading };
            for listener in &mut self.listeners {
                listener(&tick);
            }
            self.last_tick = Some(tick);
        }

        steps
    }

    /// Numbering base of the drawn dial, or the configured one before drawing.
    fn base(&self) -> NumberingBase {
        match &self.state {
            FaceState::Rendered(dial) => dial.base,
            FaceState::Unrendered => self.config.base,
        }
    }

    /// CSS for the configured colors.
    fn stylesheet(&self) -> String {
        let colors = &self.colors;
        let radius = self.config.radius;

        format!(
            ".face {{ fill: {}; stroke: {}; stroke-width: {}; }} \
             .tick {{ stroke: {}; stroke-width: {}; }} \
             .letter text {{ fill: {}; font-family: sans-serif; font-size: {}px; }} \
             .hand {{ stroke-linecap: round; }} \
             .hours {{ stroke: {}; stroke-width: {}; }} \
             .minutes {{ stroke: {}; stroke-width: {}; }} \
             .seconds {{ stroke: {}; stroke-width: {}; }}",
            colors.face,
            colors.border,
            radius * 0.02,
            colors.ticks,
            radius * 0.015,
            colors.digits,
            radius * 0.12,
            colors.hours_hand,
            radius * 0.05,
            colors.minutes_hand,
            radius * 0.035,
            colors.seconds_hand,
            radius * 0.015,
        )
    }

    /// Draw `count` evenly spaced tick marks.
    fn draw_ticks(&self, surface: &mut dyn Surface, count: u32, length: f64, class: &str) {
        let radius = self.config.radius;

        for i in 1..=count {
            let degrees = (360 * i) as f64 / count as f64;

            let line = surface.create(None, ElementKind::Line);
            surface.add_class(Some(line), "tick");
            surface.add_class(Some(line), class);
            surface.set_attribute(Some(line), "x1", radius.to_string());
            surface.set_attribute(Some(line), "y1", "0".into());
            surface.set_attribute(Some(line), "x2", radius.to_string());
            surface.set_attribute(Some(line), "y2", (radius * length).to_string());
            surface.set_attribute(Some(line), "transform", rotate_around(degrees, radius));
        }
    }

    /// Draw labels evenly spaced around the dial.
    ///
    /// The first label sits one step clockwise from the top.
    fn draw_digits(
        &self,
        surface: &mut dyn Surface,
        digits: &[impl AsRef<str>],
        distance: f64,
        class: &str,
    ) {
        let radius = self.config.radius;

        for (i, digit) in digits.iter().enumerate() {
            let degrees = (360 * (i + 1)) as f64 / digits.len() as f64;

            let outer = surface.create(None, ElementKind::Group);
            surface.add_class(Some(outer), "letter");
            surface.add_class(Some(outer), class);
            surface.set_attribute(Some(outer), "transform", rotate_around(degrees, radius));

            let inner = surface.create(Some(outer), ElementKind::Group);
            let translate = format!("translate({radius}, {})", radius * distance);
            surface.set_attribute(Some(inner), "transform", translate);

            self.draw_digit(surface, inner, digit.as_ref(), degrees);
        }
    }

    fn draw_digit(&self, surface: &mut dyn Surface, parent: ElementId, digit: &str, degrees: f64) {
        let text = surface.create(Some(parent), ElementKind::Text);
        surface.set_text(text, digit);
        surface.set_attribute(Some(text), "text-anchor", "middle".into());

        if self.config.rotate_digits {
            let offset = self.config.radius * ROTATED_DIGITS_OFFSET;
            surface.set_attribute(Some(text), "transform", format!("translate(0, {offset})"));
        } else {
            // Keep digits upright.
            surface.set_attribute(Some(text), "transform", format!("rotate(-{degrees})"));
            surface.set_attribute(Some(text), "dominant-baseline", "central".into());
        }
    }
}

/// SVG rotation around the face's center.
fn rotate_around(degrees: f64, radius: f64) -> String {
    format!("rotate({degrees}, {radius}, {radius})")
}
