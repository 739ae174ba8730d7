use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::Error;
use crate::events::UserInput;
use crate::meta::MetadataProvider;
use crate::render::compositor::{DisplayFrame, Frame, Transition};
use crate::render::loader;
use crate::render::overlay::{Caption, caption_text};
use crate::scan::MediaFile;
use crate::tasks::files::WorkingSetSource;

// Roughly 30 years, what tokio uses for an unreachable deadline.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `now + wait`, clamped to a far-future instant instead of overflowing.
fn deadline_after(now: Instant, wait: Duration) -> Instant {
    now.checked_add(wait)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// Output surface the controller presents composited frames to.
pub trait Display {
    /// Current surface size in physical pixels.
    fn size(&self) -> (u32, u32);

    /// Show `frame`. A caption is only passed for settled frames.
    fn present(&mut self, frame: &Frame, caption: Option<&Caption>) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackPhase {
    Idle,
    Transitioning,
    Waiting,
    Stopped,
}

/// When the driver should call [`PlaybackController::handle_timer`] next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    At(Instant),
    Stop,
}

#[derive(Debug, Clone)]
pub struct PlaybackSettings {
    pub display_time: Duration,
    pub fade_time: Duration,
    pub place_label: String,
    pub photo_root: PathBuf,
}

/// Position inside the working set of the current cycle.
#[derive(Debug, Default)]
pub struct PlaybackState {
    working_set: Vec<MediaFile>,
    index: usize,
    generation: u64,
    needs_rebuild: bool,
}

impl PlaybackState {
    fn reset(&mut self, working_set: Vec<MediaFile>) {
        self.working_set = working_set;
        self.index = 0;
        self.generation += 1;
        self.needs_rebuild = false;
    }

    /// Step forward; wrapping past the end schedules a rebuild.
    fn advance(&mut self) {
        if self.working_set.is_empty() {
            self.needs_rebuild = true;
            return;
        }
        if self.index + 1 >= self.working_set.len() {
            self.index = 0;
            self.needs_rebuild = true;
        } else {
            self.index += 1;
        }
    }

    /// Step back, wrapping to the end of the same working set.
    fn retreat(&mut self) {
        self.needs_rebuild = false;
        let len = self.working_set.len();
        if len == 0 {
            return;
        }
        self.index = if self.index == 0 {
            len - 1
        } else {
            self.index - 1
        };
    }

    #[must_use]
    pub fn current(&self) -> Option<&MediaFile> {
        self.working_set.get(self.index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.working_set.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.working_set.is_empty()
    }

    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Number of working sets built so far.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub const fn needs_rebuild(&self) -> bool {
        self.needs_rebuild
    }
}

struct ActiveTransition {
    steps: Transition,
    caption: Caption,
    due: Instant,
}

/// Slideshow state machine.
///
/// The controller never sleeps. Every entry point returns a [`Wake`] telling
/// the driver when the next step is due; the driver waits for that deadline or
/// for user input, whichever comes first.
pub struct PlaybackController<S, M> {
    source: S,
    metadata: M,
    settings: PlaybackSettings,
    state: PlaybackState,
    phase: PlaybackPhase,
    current: Option<DisplayFrame>,
    transition: Option<ActiveTransition>,
    deadline: Option<Instant>,
}

impl<S: WorkingSetSource, M: MetadataProvider> PlaybackController<S, M> {
    pub fn new(source: S, metadata: M, settings: PlaybackSettings) -> Self {
        Self {
            source,
            metadata,
            settings,
            state: PlaybackState {
                needs_rebuild: true,
                ..PlaybackState::default()
            },
            phase: PlaybackPhase::Idle,
            current: None,
            transition: None,
            deadline: None,
        }
    }

    #[must_use]
    pub const fn phase(&self) -> PlaybackPhase {
        self.phase
    }

    #[must_use]
    pub const fn state(&self) -> &PlaybackState {
        &self.state
    }

    /// Build the first working set and begin showing it.
    ///
    /// # Errors
    /// [`Error::EmptySelection`] if the library has nothing to show; the
    /// controller then stays idle. [`Error::Render`] if presenting fails.
    pub fn start(&mut self, display: &mut impl Display, now: Instant) -> Result<Wake, Error> {
        self.show_current(display, now)
    }

    /// Apply one batch of inputs. An exit anywhere in the batch wins;
    /// otherwise every navigation is applied in order and the resulting photo
    /// is shown once.
    ///
    /// # Errors
    /// As for [`PlaybackController::start`].
    pub fn handle_inputs(
        &mut self,
        display: &mut impl Display,
        inputs: &[UserInput],
        now: Instant,
    ) -> Result<Wake, Error> {
        if self.phase == PlaybackPhase::Stopped || inputs.contains(&UserInput::Exit) {
            self.stop();
            return Ok(Wake::Stop);
        }
        if inputs.is_empty() || self.phase == PlaybackPhase::Idle {
            return Ok(self.wake());
        }

        if let Some(active) = self.transition.take() {
            debug!("transition abandoned");
            self.current = Some(active.steps.finish());
        }
        for input in inputs {
            match input {
                UserInput::Next => self.state.advance(),
                UserInput::Previous => self.state.retreat(),
                UserInput::Exit => {}
            }
        }
        debug!(index = self.state.index(), "navigated");
        self.show_current(display, now)
    }

    /// Drive the transition or the auto-advance timer.
    ///
    /// # Errors
    /// As for [`PlaybackController::start`].
    pub fn handle_timer(&mut self, display: &mut impl Display, now: Instant) -> Result<Wake, Error> {
        match self.phase {
            PlaybackPhase::Idle => self.start(display, now),
            PlaybackPhase::Stopped => Ok(Wake::Stop),
            PlaybackPhase::Transitioning => match self.transition.as_ref() {
                Some(active) if now < active.due => Ok(Wake::At(active.due)),
                _ => self.step_transition(display, now),
            },
            PlaybackPhase::Waiting => match self.deadline {
                Some(deadline) if now < deadline => Ok(Wake::At(deadline)),
                _ => {
                    self.state.advance();
                    self.show_current(display, now)
                }
            },
        }
    }

    pub fn stop(&mut self) {
        if self.phase != PlaybackPhase::Stopped {
            info!(shown_cycles = self.state.generation(), "slideshow stopped");
        }
        self.phase = PlaybackPhase::Stopped;
        self.transition = None;
        self.deadline = None;
    }

    fn wake(&self) -> Wake {
        match self.phase {
            PlaybackPhase::Transitioning => self
                .transition
                .as_ref()
                .map_or(Wake::Stop, |active| Wake::At(active.due)),
            PlaybackPhase::Waiting => self.deadline.map_or(Wake::Stop, Wake::At),
            PlaybackPhase::Idle | PlaybackPhase::Stopped => Wake::Stop,
        }
    }

    fn rebuild(&mut self) -> Result<(), Error> {
        let working_set = self.source.rebuild();
        self.metadata.begin_cycle();
        if working_set.is_empty() {
            self.phase = PlaybackPhase::Idle;
            return Err(Error::EmptySelection(self.settings.photo_root.clone()));
        }
        self.state.reset(working_set);
        info!(
            generation = self.state.generation(),
            size = self.state.len(),
            "working set rebuilt"
        );
        Ok(())
    }

    /// Decode the photo at the current index, skipping files that fail, and
    /// start the transition to it.
    fn show_current(&mut self, display: &mut impl Display, now: Instant) -> Result<Wake, Error> {
        let surface = display.size();
        let mut failures = 0usize;
        loop {
            if failures > 0 && failures >= self.state.len() {
                warn!(
                    failures,
                    retry_in = ?self.settings.display_time,
                    "no photo of the working set could be shown"
                );
                self.phase = PlaybackPhase::Waiting;
                let deadline = deadline_after(now, self.settings.display_time);
                self.deadline = Some(deadline);
                return Ok(Wake::At(deadline));
            }
            if self.state.needs_rebuild() {
                self.rebuild()?;
            }
            let Some(file) = self.state.current().cloned() else {
                self.state.needs_rebuild = true;
                continue;
            };

            let prepared = loader::prepare(file.path())
                .and_then(|image| loader::fit(&image, surface.0, surface.1));
            match prepared {
                Ok(next) => {
                    let caption = self.caption_for(&file);
                    info!(
                        path = %file.path().display(),
                        index = self.state.index(),
                        of = self.state.len(),
                        "showing photo"
                    );
                    let steps = Transition::new(
                        self.current.take(),
                        next,
                        surface,
                        self.settings.fade_time,
                    );
                    self.transition = Some(ActiveTransition {
                        steps,
                        caption,
                        due: now,
                    });
                    self.deadline = None;
                    self.phase = PlaybackPhase::Transitioning;
                    return self.step_transition(display, now);
                }
                Err(err) => {
                    warn!(path = %file.path().display(), error = %err, "skipping photo");
                    failures += 1;
                    self.state.advance();
                }
            }
        }
    }

    fn caption_for(&self, file: &MediaFile) -> Caption {
        let meta = self.metadata.lookup(file.path());
        Caption {
            info: caption_text(
                meta.date.as_deref(),
                meta.place.as_deref(),
                &self.settings.place_label,
            ),
            path: file.display_path(&self.settings.photo_root),
        }
    }

    /// Present the next transition frame, or settle on the new photo once the
    /// sequence is exhausted.
    fn step_transition(&mut self, display: &mut impl Display, now: Instant) -> Result<Wake, Error> {
        let Some(mut active) = self.transition.take() else {
            return Ok(self.wake());
        };
        if let Some(step) = active.steps.next() {
            display.present(&step.frame, None).map_err(Error::Render)?;
            active.due = deadline_after(now, step.hold);
            let wake = Wake::At(active.due);
            self.transition = Some(active);
            return Ok(wake);
        }

        let current = active.steps.finish();
        let (width, height) = display.size();
        let mut settled = Frame::black(width, height);
        settled.blit(&current, 1.0);
        display
            .present(&settled, Some(&active.caption))
            .map_err(Error::Render)?;
        self.current = Some(current);

        let deadline = deadline_after(now, self.settings.display_time);
        self.phase = PlaybackPhase::Waiting;
        self.deadline = Some(deadline);
        Ok(Wake::At(deadline))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with(n: usize) -> PlaybackState {
        let mut state = PlaybackState::default();
        state.reset(
            (0..n)
                .map(|i| MediaFile::new(PathBuf::from(format!("/p/{i}.png"))))
                .collect(),
        );
        state
    }

    #[test]
    fn advance_wraps_and_requests_rebuild() {
        let mut state = state_with(3);
        state.advance();
        state.advance();
        assert_eq!(state.index(), 2);
        assert!(!state.needs_rebuild());
        state.advance();
        assert_eq!(state.index(), 0);
        assert!(state.needs_rebuild());
    }

    #[test]
    fn retreat_wraps_without_rebuild() {
        let mut state = state_with(5);
        state.retreat();
        assert_eq!(state.index(), 4);
        assert!(!state.needs_rebuild());
        state.retreat();
        assert_eq!(state.index(), 3);
    }

    #[test]
    fn retreat_cancels_pending_wrap() {
        let mut state = state_with(2);
        state.advance();
        state.advance();
        assert!(state.needs_rebuild());
        state.retreat();
        assert_eq!(state.index(), 1);
        assert!(!state.needs_rebuild());
    }

    #[test]
    fn huge_waits_clamp_instead_of_overflowing() {
        let now = Instant::now();
        let due = deadline_after(now, Duration::MAX);
        assert!(due > now);
        assert_eq!(
            deadline_after(now, Duration::from_secs(5)),
            now + Duration::from_secs(5)
        );
    }

    #[test]
    fn reset_bumps_generation() {
        let mut state = state_with(1);
        assert_eq!(state.generation(), 1);
        state.reset(Vec::new());
        assert_eq!(state.generation(), 2);
        assert!(state.is_empty());
        assert!(state.current().is_none());
    }
}
