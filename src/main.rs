use std::error::Error;
use std::path::{Path, PathBuf};
use std::result::Result as StdResult;
use std::time::{Duration, Instant};
use std::{fs, io, mem, process};

use calloop::signals::{Signal, Signals};
use calloop::timer::{TimeoutAction, Timer};
use calloop::{EventLoop, LoopHandle, RegistrationToken};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use smallvec::SmallVec;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use crate::config::{ClockConfig, Colors, Config, Output};
use crate::face::{ClockFace, HostClock, PendingStep, SystemClock};
use crate::geometry::Size;
use crate::raster::Rasterizer;
use crate::scheduler::{Heartbeat, RedrawBatching, SurfaceId, TickScheduler};
use crate::svg::{SuspendHandle, Surface, SvgSurface};
use crate::timebase::NumberingBase;

mod config;
mod error;
mod face;
mod geometry;
mod hand;
mod raster;
mod scheduler;
mod svg;
mod timebase;

/// Identifier of the only surface driven by the event loop.
const FACE_SURFACE: SurfaceId = SurfaceId(0);

/// Convenience result wrapper.
pub type Result<T> = StdResult<T, Box<dyn Error>>;

/// Analog SVG clock faces.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Configuration file path.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Numbering base: sexagesimal, 24, decimal or hexadecimal.
    #[arg(long, global = true)]
    base: Option<NumberingBase>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Draw the clock for a single instant.
    Render {
        /// Instant to show, as RFC 3339 timestamp; defaults to now.
        #[arg(long)]
        at: Option<DateTime<Utc>>,

        /// Output file; `.png` files are rasterized.
        #[arg(long)]
        output: Option<PathBuf>,

        /// PNG width and height in pixels.
        #[arg(long)]
        png_size: Option<u32>,
    },
    /// Animate the clock, rewriting the output file on every frame.
    Run {
        /// Output file; `.png` files are rasterized.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Exit after this many seconds.
        #[arg(long)]
        duration: Option<u64>,
    },
}

fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).init();

    if let Err(err) = run(cli) {
        eprintln!("Error: {err}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(base) = cli.base {
        config.clock.base = base;
    }

    match cli.command {
        Command::Render { at, output, png_size } => {
            if let Some(path) = output {
                config.output.path = path;
            }
            if let Some(png_size) = png_size {
                config.output.png_size = png_size;
            }

            render(config, at)
        },
        Command::Run { output, duration } => {
            if let Some(path) = output {
                config.output.path = path;
            }

            animate(config, duration.map(Duration::from_secs))
        },
    }
}

/// Write the clock face for a single instant.
fn render(config: Config, at: Option<DateTime<Utc>>) -> Result<()> {
    let clock = SystemClock;
    let time = at.unwrap_or_else(|| clock.now());

    let mut face = ClockFace::new(config.clock, config.colors);
    let mut surface = SvgSurface::new();
    face.draw(&mut surface)?;
    face.display(&mut surface, time, clock.local_offset(time));

    let mut writer = OutputWriter::new(config.output);
    writer.write(&surface)?;

    if let Some(tick) = face.last_tick() {
        info!("Rendered {} to {}", tick.display, writer.output.path.display());
    }

    Ok(())
}

/// Animate the clock face until terminated.
fn animate(config: Config, duration: Option<Duration>) -> Result<()> {
    let mut event_loop = EventLoop::try_new()?;
    let mut state = State::new(event_loop.handle(), config, duration)?;

    // Shut down gracefully on interrupt.
    let signals = Signals::new(&[Signal::SIGINT, Signal::SIGTERM])?;
    event_loop.handle().insert_source(signals, |event, _, state| {
        info!("Received {:?}, shutting down", event.signal());
        state.terminate();
    })?;

    while !state.terminated {
        event_loop.dispatch(None, &mut state)?;
    }

    info!("Committed {} frames", state.board.surface.frames());

    Ok(())
}

/// Event loop state.
struct State {
    event_loop: LoopHandle<'static, Self>,
    scheduler: TickScheduler<Board>,
    writer: OutputWriter,
    terminated: bool,
    board: Board,
}

impl State {
    /// Draw the clock face and start its heartbeat.
    ///
    /// With a `duration`, the state terminates itself once it has elapsed.
    fn new(
        event_loop: LoopHandle<'static, Self>,
        config: Config,
        duration: Option<Duration>,
    ) -> Result<Self> {
        let heartbeat = CalloopHeartbeat::new(event_loop.clone());
        let mut scheduler: TickScheduler<Board> = TickScheduler::new(Box::new(heartbeat));

        let mut board = Board::new(config.clock, config.colors);
        board.face.on_tick(|tick| info!("{}", tick.display));
        board.face.draw(&mut board.surface)?;
        board.face.start(&mut scheduler, Some(FACE_SURFACE), Box::new(Board::update))?;
        info!(
            "Running {} clock every {:?}",
            board.face.config().base,
            board.face.tick_interval()
        );

        if let Some(duration) = duration {
            event_loop.insert_source(Timer::from_duration(duration), |_, _, state| {
                state.terminate();
                TimeoutAction::Drop
            })?;
        }

        let mut state = Self {
            writer: OutputWriter::new(config.output),
            terminated: false,
            event_loop,
            scheduler,
            board,
        };

        // Write the initial face without waiting for the first tick.
        state.flush(Instant::now());

        Ok(state)
    }

    /// Run all scheduled updates.
    fn tick(&mut self, now: Instant) {
        self.scheduler.tick(now, &mut self.board);

        for step in mem::take(&mut self.board.pending_steps) {
            self.schedule_step(step);
        }

        self.flush(now);
    }

    /// Start the timer for a hand's next animation step.
    fn schedule_step(&self, step: PendingStep) {
        let hand = step.hand;
        let timer = Timer::from_duration(step.delay);
        let result = self.event_loop.insert_source(timer, move |_, _, state| {
            let now = Instant::now();

            let board = &mut state.board;
            let delay = board.face.step_hand(&mut board.surface, hand, now);
            state.flush(now);

            match delay {
                Some(delay) => TimeoutAction::ToDuration(delay),
                None => TimeoutAction::Drop,
            }
        });

        if let Err(err) = result {
            error!("Could not schedule {hand:?} hand animation: {}", err.error);
        }
    }

    /// Write the latest frame to the output file.
    fn flush(&mut self, now: Instant) {
        if self.board.surface.take_frame() {
            self.writer.dirty = true;
        }

        if let Err(err) = self.writer.write_throttled(&self.board.surface, now) {
            error!("Could not write {}: {err}", self.writer.output.path.display());
        }
    }

    /// Stop the clock and exit the event loop.
    fn terminate(&mut self) {
        self.board.face.stop(&mut self.scheduler);
        self.terminated = true;

        if self.writer.dirty
            && let Err(err) = self.writer.write(&self.board.surface)
        {
            error!("Could not write {}: {err}", self.writer.output.path.display());
        }
    }
}

/// Data passed to scheduler callbacks.
struct Board {
    face: ClockFace,
    surface: SvgSurface,
    clock: SystemClock,
    pending_steps: SmallVec<[PendingStep; 3]>,
}

impl Board {
    fn new(config: ClockConfig, colors: Colors) -> Self {
        Self {
            face: ClockFace::new(config, colors),
            surface: SvgSurface::new(),
            clock: SystemClock,
            pending_steps: Default::default(),
        }
    }

    /// Scheduler callback moving the hands to the current time.
    fn update(&mut self, now: Instant) {
        let steps = self.face.update(&mut self.surface, &self.clock, now);
        self.pending_steps.extend(steps);
    }
}

impl RedrawBatching for Board {
    fn suspend_redraw(&mut self, _surface: SurfaceId) -> Option<SuspendHandle> {
        self.surface.suspend_redraw()
    }

    fn unsuspend_redraw(&mut self, _surface: SurfaceId, handle: SuspendHandle) {
        self.surface.unsuspend_redraw(handle);
    }
}

/// Heartbeat backed by a calloop timer.
struct CalloopHeartbeat {
    event_loop: LoopHandle<'static, State>,
    token: Option<RegistrationToken>,
}

impl CalloopHeartbeat {
    fn new(event_loop: LoopHandle<'static, State>) -> Self {
        Self { event_loop, token: None }
    }
}

impl Heartbeat for CalloopHeartbeat {
    fn start(&mut self, period: Duration) {
        let timer = Timer::from_duration(period);
        let result = self.event_loop.insert_source(timer, move |deadline, _, state| {
            state.tick(Instant::now());
            TimeoutAction::ToInstant(deadline + period)
        });

        match result {
            Ok(token) => self.token = Some(token),
            Err(err) => error!("Could not start heartbeat: {}", err.error),
        }
    }

    fn stop(&mut self) {
        if let Some(token) = self.token.take() {
            self.event_loop.remove(token);
        }
    }
}

/// Output file writer.
struct OutputWriter {
    output: Output,
    rasterizer: Option<Rasterizer>,
    last_write: Option<Instant>,
    dirty: bool,
}

impl OutputWriter {
    fn new(output: Output) -> Self {
        Self { output, rasterizer: None, last_write: None, dirty: false }
    }

    /// Write the surface unless the last write was too recent.
    fn write_throttled(&mut self, surface: &SvgSurface, now: Instant) -> Result<()> {
        let interval = self.output.write_interval;
        if !self.dirty || self.last_write.is_some_and(|last| now < last + interval) {
            return Ok(());
        }

        self.write(surface)?;
        self.last_write = Some(now);

        Ok(())
    }

    /// Write the surface to the output file.
    fn write(&mut self, surface: &SvgSurface) -> Result<()> {
        let svg = surface.to_svg();

        if is_png(&self.output.path) {
            let size = Size::new(self.output.png_size, self.output.png_size);
            let rasterizer = self.rasterizer.get_or_insert_with(Rasterizer::new);
            fs::write(&self.output.path, rasterizer.encode_png(&svg, size)?)?;
        } else {
            fs::write(&self.output.path, svg)?;
        }

        debug!("Wrote {}", self.output.path.display());
        self.dirty = false;

        Ok(())
    }
}

/// Check if a path should be rasterized.
fn is_png(path: &Path) -> bool {
    path.extension().is_some_and(|extension| extension.eq_ignore_ascii_case("png"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn png_extension() {
        assert!(is_png(Path::new("clock.png")));
        assert!(is_png(Path::new("out/Clock.PNG")));
        assert!(!is_png(Path::new("clock.svg")));
        assert!(!is_png(Path::new("png")));
    }

    #[test]
    fn cli_base_override() {
        let cli = Cli::try_parse_from(["borda", "--base", "24", "render"]).unwrap();
        assert_eq!(cli.base, Some(NumberingBase::TwentyFour));

        let cli = Cli::try_parse_from(["borda", "run", "--base", "decimal", "--duration", "3"]);
        let cli = cli.unwrap();
        assert_eq!(cli.base, Some(NumberingBase::Decimal));
        assert!(matches!(cli.command, Command::Run { duration: Some(3), .. }));

        let err = Cli::try_parse_from(["borda", "--base", "duodecimal", "render"]).unwrap_err();
        assert!(err.to_string().contains("unknown numbering base"), "{err}");
    }

    #[test]
    fn cli_render_instant() {
        let cli = Cli::try_parse_from(["borda", "render", "--at", "2024-01-01T00:00:00Z"]);
        match cli.unwrap().command {
            Command::Render { at: Some(at), .. } => assert_eq!(at.timestamp(), 1_704_067_200),
            command => panic!("unexpected command {command:?}"),
        }
    }

    #[test]
    fn render_svg_file() {
        let path = std::env::temp_dir().join(format!("borda-render-{}.svg", process::id()));

        let mut config = Config::default();
        config.clock.offset = Some(0);
        config.output.path = path.clone();

        let at = "2024-01-01T03:00:00Z".parse::<DateTime<Utc>>().unwrap();
        render(config, Some(at)).unwrap();

        let svg = fs::read_to_string(&path).unwrap();
        fs::remove_file(&path).unwrap();
        assert!(svg.starts_with("<svg xmlns=\"http://www.w3.org/2000/svg\""));
        assert!(svg.contains("class=\"clock sexagesimal\""));
        assert!(svg.contains("class=\"hours hand\""));
    }

    #[test]
    fn timed_run_terminates() {
        let path = std::env::temp_dir().join(format!("borda-run-{}.svg", process::id()));

        let mut config = Config::default();
        config.clock.offset = Some(0);
        config.output.path = path.clone();
        config.output.write_interval = Duration::ZERO;

        let mut event_loop = EventLoop::try_new().unwrap();
        let duration = Some(Duration::from_millis(200));
        let mut state = State::new(event_loop.handle(), config, duration).unwrap();
        assert!(state.board.face.is_running());

        // Initial face is written before the first tick.
        assert!(path.exists());
        let frames = state.board.surface.frames();

        while !state.terminated {
            event_loop.dispatch(None, &mut state).unwrap();
        }

        assert!(!state.board.face.is_running());
        assert_eq!(state.scheduler.period(), None);
        assert!(state.board.surface.frames() > frames);
        assert!(state.board.face.last_tick().is_some());

        let svg = fs::read_to_string(&path).unwrap();
        fs::remove_file(&path).unwrap();
        assert_eq!(svg, state.board.surface.to_svg());
    }

    #[test]
    fn throttled_writes() {
        let path = std::env::temp_dir().join(format!("borda-throttle-{}.svg", process::id()));
        let write_interval = Duration::from_millis(100);
        let output = Output { path: path.clone(), write_interval, ..Default::default() };
        let mut writer = OutputWriter::new(output);
        let surface = SvgSurface::new();
        let now = Instant::now();

        // Clean writers never touch the file.
        writer.write_throttled(&surface, now).unwrap();
        assert!(!path.exists());

        writer.dirty = true;
        writer.write_throttled(&surface, now).unwrap();
        assert!(!writer.dirty);

        writer.dirty = true;
        writer.write_throttled(&surface, now + Duration::from_millis(50)).unwrap();
        assert!(writer.dirty);

        writer.write_throttled(&surface, now + Duration::from_millis(100)).unwrap();
        assert!(!writer.dirty);

        fs::remove_file(&path).unwrap();
    }
}
