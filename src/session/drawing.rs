//! Drawing capture, throttled emission, and remote replay.
//!
//! One `DrawingPipeline` instance is scoped to one canvas attachment and owns
//! every piece of mutable drawing state: the active stroke, the pointer
//! capture, the outbound slot, and the single flush deadline. Local rendering
//! is always complete (every sample draws a smoothed curve immediately);
//! what goes on the wire is lossy under load, because the outbound slot keeps
//! only the most recent segment between flushes.
//!
//! Rendering goes through [`DrawSurface`], implemented by the embedding
//! shell; a recording double stands in for it in tests.

use std::time::{Duration, Instant};

use tracing::debug;

use super::message::DrawingSegment;

/// Outbound drain interval (~30 Hz).
pub const FLUSH_INTERVAL: Duration = Duration::from_millis(33);

/// Default brush color.
pub const DEFAULT_COLOR: &str = "#000000";

/// Default brush width.
pub const DEFAULT_LINE_WIDTH: f64 = 5.0;

/// A canvas-local point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn midpoint(&self, other: Point) -> Point {
        Point::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }
}

/// Line cap for stroke rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineCap {
    Butt,
    #[default]
    Round,
    Square,
}

/// Line join for stroke rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineJoin {
    Miter,
    #[default]
    Round,
    Bevel,
}

/// Full stroke style. Resizing a native surface resets this on the render
/// state, so the pipeline reapplies it after every resize.
#[derive(Debug, Clone, PartialEq)]
pub struct StrokeStyle {
    pub color: String,
    pub line_width: f64,
    pub cap: LineCap,
    pub join: LineJoin,
}

impl Default for StrokeStyle {
    fn default() -> Self {
        Self {
            color: DEFAULT_COLOR.to_string(),
            line_width: DEFAULT_LINE_WIDTH,
            cap: LineCap::Round,
            join: LineJoin::Round,
        }
    }
}

/// Opaque pixel snapshot used to carry content across a resize.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceSnapshot(pub Vec<u8>);

/// Render target for both local capture and remote replay.
pub trait DrawSurface {
    /// Set the stroke style for subsequent operations.
    fn apply_style(&mut self, style: &StrokeStyle);

    /// Straight segment.
    fn line(&mut self, from: Point, to: Point);

    /// Quadratic segment through `control`.
    fn curve(&mut self, from: Point, control: Point, to: Point);

    /// Wipe the whole surface.
    fn clear(&mut self);

    /// Capture current pixels.
    fn snapshot(&mut self) -> SurfaceSnapshot;

    /// Resize the backing store. Resets render state on native surfaces.
    fn resize(&mut self, width: u32, height: u32);

    /// Paint a snapshot back.
    fn restore(&mut self, snapshot: &SurfaceSnapshot);
}

#[derive(Debug)]
struct ActiveStroke {
    /// Captured pointer; samples from any other pointer are ignored.
    pointer: i64,
    last: Point,
    last_mid: Point,
}

/// Capture, throttle, and replay for one canvas attachment.
#[derive(Debug)]
pub struct DrawingPipeline {
    /// Only the current artist's pipeline captures input.
    is_artist: bool,
    style: StrokeStyle,
    active: Option<ActiveStroke>,

    /// Most recent unsent segment; older ones are discarded unsent.
    pending: Option<DrawingSegment>,

    /// The one flush deadline; armed when the slot fills, never per-segment.
    flush_due: Option<Instant>,
    flush_interval: Duration,

    /// Cleared on detach so a stale deadline firing later is a no-op.
    attached: bool,
}

impl Default for DrawingPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl DrawingPipeline {
    pub fn new() -> Self {
        Self {
            is_artist: false,
            style: StrokeStyle::default(),
            active: None,
            pending: None,
            flush_due: None,
            flush_interval: FLUSH_INTERVAL,
            attached: true,
        }
    }

    /// Override the drain interval.
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    pub fn style(&self) -> &StrokeStyle {
        &self.style
    }

    pub fn set_color(&mut self, color: impl Into<String>) {
        self.style.color = color.into();
    }

    pub fn set_line_width(&mut self, width: f64) {
        self.style.line_width = width;
    }

    /// Flip capture on or off as the artist role moves. Losing the role
    /// closes any open stroke and drops unsent output.
    pub fn set_artist(&mut self, is_artist: bool) {
        if self.is_artist == is_artist {
            return;
        }
        self.is_artist = is_artist;
        if !is_artist {
            self.active = None;
            self.pending = None;
            self.flush_due = None;
        }
    }

    pub fn is_artist(&self) -> bool {
        self.is_artist
    }

    // Capture

    /// Pointer went down: open a stroke and capture this pointer
    /// exclusively. A second pointer going down mid-stroke is ignored.
    pub fn pointer_down(&mut self, pointer: i64, at: Point) {
        if !self.attached || !self.is_artist || self.active.is_some() {
            return;
        }
        self.active = Some(ActiveStroke {
            pointer,
            last: at,
            last_mid: at,
        });
    }

    /// Pointer moved: render a smoothed quadratic locally right away and
    /// queue the raw segment for throttled emission.
    pub fn pointer_move(&mut self, pointer: i64, at: Point, surface: &mut dyn DrawSurface) {
        if !self.attached || !self.is_artist {
            return;
        }
        let Some(stroke) = self.active.as_mut() else {
            return;
        };
        if stroke.pointer != pointer {
            return;
        }

        let mid = stroke.last.midpoint(at);
        surface.apply_style(&self.style);
        surface.curve(stroke.last_mid, stroke.last, mid);

        let segment = DrawingSegment {
            x0: stroke.last.x,
            y0: stroke.last.y,
            x1: at.x,
            y1: at.y,
            color: self.style.color.clone(),
            line_width: self.style.line_width,
        };
        stroke.last = at;
        stroke.last_mid = mid;

        self.pending = Some(segment);
        if self.flush_due.is_none() {
            self.flush_due = Some(Instant::now() + self.flush_interval);
        }
    }

    /// Pointer up, cancel, or leave: close the stroke and force-flush.
    /// Returns the segment to send, if one was still buffered.
    pub fn pointer_up(&mut self, pointer: i64) -> Option<DrawingSegment> {
        if !matches!(&self.active, Some(stroke) if stroke.pointer == pointer) {
            return None;
        }
        self.active = None;
        self.force_flush()
    }

    // Throttled emission

    /// When the next flush is due, if one is armed.
    pub fn next_flush_at(&self) -> Option<Instant> {
        self.flush_due
    }

    /// Fire the flush deadline if it is due: at most one segment per
    /// interval, always the most recent sample. An empty slot sends
    /// nothing; a stale deadline after detach is a no-op.
    pub fn poll_flush(&mut self) -> Option<DrawingSegment> {
        if !self.attached {
            return None;
        }
        match self.flush_due {
            Some(due) if Instant::now() >= due => {
                self.flush_due = None;
                self.pending.take()
            }
            _ => None,
        }
    }

    fn force_flush(&mut self) -> Option<DrawingSegment> {
        self.flush_due = None;
        self.pending.take()
    }

    /// Tear down on session exit: cancels the pending flush and ignores
    /// anything that fires afterwards.
    pub fn detach(&mut self) {
        debug!("drawing pipeline detached");
        self.attached = false;
        self.active = None;
        self.pending = None;
        self.flush_due = None;
    }

    // Remote replay

    /// Replay one received segment: an unsmoothed straight line in the
    /// transmitted color and width. Never runs concurrently with capture;
    /// the event loop serializes both onto the surface.
    pub fn apply_remote(&self, segment: &DrawingSegment, surface: &mut dyn DrawSurface) {
        surface.apply_style(&StrokeStyle {
            color: segment.color.clone(),
            line_width: segment.line_width,
            cap: LineCap::Round,
            join: LineJoin::Round,
        });
        surface.line(
            Point::new(segment.x0, segment.y0),
            Point::new(segment.x1, segment.y1),
        );
    }

    /// Wipe the whole surface, on every device, unscoped.
    pub fn clear_surface(&self, surface: &mut dyn DrawSurface) {
        surface.clear();
    }

    /// Container resized: preserve pixels (snapshot, resize, restore) and
    /// reapply the stroke style the resize reset.
    pub fn handle_resize(&self, width: u32, height: u32, surface: &mut dyn DrawSurface) {
        let snapshot = surface.snapshot();
        surface.resize(width, height);
        surface.restore(&snapshot);
        surface.apply_style(&self.style);
    }
}
