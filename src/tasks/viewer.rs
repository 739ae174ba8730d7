pub mod playback;

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use chrono::{Local, Timelike};
use softbuffer::{Context as SoftContext, Surface};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use winit::application::ApplicationHandler;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Fullscreen, Window, WindowId};

use crate::config::Configuration;
use crate::events::{UserInput, ViewerEvent};
use crate::geocode::OpenCageGeocoder;
use crate::meta::ExifMetadataProvider;
use crate::render::compositor::Frame;
use crate::render::overlay::{Caption, OverlayRenderer, load_font};
use crate::tasks::files::PhotoLibrary;
use playback::{Display, PlaybackController, PlaybackPhase, PlaybackSettings, Wake};

type WindowHandle = Arc<Window>;
type Controller = PlaybackController<PhotoLibrary, ExifMetadataProvider<OpenCageGeocoder>>;

/// Hides the pointer while alive.
struct CursorGuard {
    window: WindowHandle,
}

impl CursorGuard {
    fn hide(window: WindowHandle) -> Self {
        window.set_cursor_visible(false);
        Self { window }
    }
}

impl Drop for CursorGuard {
    fn drop(&mut self) {
        self.window.set_cursor_visible(true);
    }
}

/// softbuffer-backed [`Display`]; paints the caption overlay on settled frames.
struct SoftDisplay {
    window: WindowHandle,
    surface: Surface<WindowHandle, WindowHandle>,
    _context: SoftContext<WindowHandle>,
    overlay: OverlayRenderer,
    // Last presented frame (overlay included), replayed on expose.
    shown: Option<Frame>,
    settled: Option<(Frame, Caption)>,
}

impl SoftDisplay {
    fn new(window: WindowHandle, overlay: OverlayRenderer) -> Result<Self> {
        let context = SoftContext::new(window.clone())
            .map_err(|err| anyhow!("failed to create softbuffer context: {err}"))?;
        let surface = Surface::new(&context, window.clone())
            .map_err(|err| anyhow!("failed to create softbuffer surface: {err}"))?;
        Ok(Self {
            window,
            surface,
            _context: context,
            overlay,
            shown: None,
            settled: None,
        })
    }

    fn blit(&mut self, frame: &Frame) -> Result<()> {
        let (Some(width), Some(height)) = (
            NonZeroU32::new(frame.width()),
            NonZeroU32::new(frame.height()),
        ) else {
            return Ok(());
        };
        self.surface
            .resize(width, height)
            .map_err(|err| anyhow!("failed to resize surface: {err}"))?;
        let mut buffer = self
            .surface
            .buffer_mut()
            .map_err(|err| anyhow!("failed to map surface buffer: {err}"))?;
        buffer.copy_from_slice(frame.pixels());
        buffer
            .present()
            .map_err(|err| anyhow!("failed to present frame: {err}"))?;
        Ok(())
    }

    fn clock_text() -> String {
        Local::now().format("%H:%M").to_string()
    }

    fn paint_settled(&mut self) -> Result<()> {
        let Some((frame, caption)) = self.settled.as_ref() else {
            return Ok(());
        };
        let mut out = frame.clone();
        let clock = Self::clock_text();
        self.overlay.paint(&mut out, caption, Some(&clock));
        self.blit(&out)?;
        self.shown = Some(out);
        Ok(())
    }

    /// Repaint the settled photo with the current time.
    fn refresh_clock(&mut self) -> Result<()> {
        if self.overlay.clock_enabled() {
            self.paint_settled()?;
        }
        Ok(())
    }

    fn redraw(&mut self) -> Result<()> {
        match self.shown.take() {
            Some(frame) => {
                let result = self.blit(&frame);
                self.shown = Some(frame);
                result
            }
            None => Ok(()),
        }
    }
}

impl Display for SoftDisplay {
    fn size(&self) -> (u32, u32) {
        let size = self.window.inner_size();
        (size.width.max(1), size.height.max(1))
    }

    fn present(&mut self, frame: &Frame, caption: Option<&Caption>) -> Result<()> {
        match caption {
            Some(caption) => {
                self.settled = Some((frame.clone(), caption.clone()));
                self.paint_settled()
            }
            None => {
                self.settled = None;
                self.blit(frame)?;
                self.shown = Some(frame.clone());
                Ok(())
            }
        }
    }
}

/// Time until the wall clock reaches the next full minute.
fn until_next_minute() -> Duration {
    let now = Local::now();
    let elapsed = Duration::new(u64::from(now.second()), now.nanosecond() % 1_000_000_000);
    Duration::from_secs(60).saturating_sub(elapsed)
}

struct ViewerApp {
    cancel: CancellationToken,
    controller: Controller,
    overlay: Option<OverlayRenderer>,
    window: Option<WindowHandle>,
    display: Option<SoftDisplay>,
    cursor: Option<CursorGuard>,
    pending: Vec<UserInput>,
    started: bool,
    wake: Option<Instant>,
    next_clock: Option<Instant>,
    failure: Option<anyhow::Error>,
}

impl ViewerApp {
    fn new(cancel: CancellationToken, controller: Controller, overlay: OverlayRenderer) -> Self {
        Self {
            cancel,
            controller,
            overlay: Some(overlay),
            window: None,
            display: None,
            cursor: None,
            pending: Vec::new(),
            started: false,
            wake: None,
            next_clock: None,
            failure: None,
        }
    }

    fn ensure_window(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        if self.window.is_some() {
            return Ok(());
        }
        let attrs = Window::default_attributes()
            .with_title("fotowand")
            .with_decorations(false)
            .with_fullscreen(Some(Fullscreen::Borderless(None)))
            .with_active(true);
        let window = Arc::new(
            event_loop
                .create_window(attrs)
                .context("failed to create viewer window")?,
        );
        let overlay = self
            .overlay
            .take()
            .context("overlay renderer already consumed")?;
        self.display = Some(SoftDisplay::new(window.clone(), overlay)?);
        self.cursor = Some(CursorGuard::hide(window.clone()));
        self.window = Some(window);
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!(error = ?err, "viewer stopped on error");
        self.failure = Some(err);
        event_loop.exit();
    }

    fn step(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let Some(display) = self.display.as_mut() else {
            return Ok(());
        };
        let now = Instant::now();

        let wake = if !self.started {
            self.started = true;
            Some(self.controller.start(display, now)?)
        } else if !self.pending.is_empty() {
            let inputs = std::mem::take(&mut self.pending);
            debug!(?inputs, "input batch");
            Some(self.controller.handle_inputs(display, &inputs, now)?)
        } else if self.wake.is_some_and(|at| now >= at) {
            Some(self.controller.handle_timer(display, now)?)
        } else {
            None
        };

        match wake {
            Some(Wake::Stop) => {
                event_loop.exit();
                return Ok(());
            }
            Some(Wake::At(at)) => self.wake = Some(at),
            None => {}
        }

        if self.controller.phase() == PlaybackPhase::Waiting {
            let due = *self
                .next_clock
                .get_or_insert_with(|| now + until_next_minute());
            if now >= due {
                display.refresh_clock()?;
                self.next_clock = Some(now + until_next_minute());
            }
        } else {
            self.next_clock = None;
        }

        let deadline = match (self.wake, self.next_clock) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        match deadline {
            Some(at) => event_loop.set_control_flow(ControlFlow::WaitUntil(at)),
            None => event_loop.set_control_flow(ControlFlow::Wait),
        }
        Ok(())
    }

    fn on_key(&mut self, event: &KeyEvent) {
        if event.state != ElementState::Pressed {
            return;
        }
        let input = match event.logical_key {
            Key::Named(NamedKey::ArrowRight) => UserInput::Next,
            Key::Named(NamedKey::ArrowLeft) => UserInput::Previous,
            Key::Named(NamedKey::Escape) => UserInput::Exit,
            _ => return,
        };
        self.pending.push(input);
    }
}

impl ApplicationHandler<ViewerEvent> for ViewerApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.cancel.is_cancelled() {
            event_loop.exit();
            return;
        }
        if let Err(err) = self.ensure_window(event_loop) {
            self.fail(event_loop, err);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        let Some(window) = self.window.clone() else {
            return;
        };
        if window.id() != window_id {
            return;
        }

        match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                info!("viewer window close requested");
                self.pending.push(UserInput::Exit);
            }
            WindowEvent::KeyboardInput { event, .. } => self.on_key(&event),
            WindowEvent::Resized(_) => window.request_redraw(),
            WindowEvent::RedrawRequested => {
                if let Some(display) = self.display.as_mut()
                    && let Err(err) = display.redraw()
                {
                    self.fail(event_loop, err);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if let Err(err) = self.step(event_loop) {
            self.fail(event_loop, err);
        }
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: ViewerEvent) {
        match event {
            ViewerEvent::Cancelled => {
                info!("viewer received cancellation event");
                self.controller.stop();
                event_loop.exit();
            }
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.controller.stop();
        self.display = None;
        self.cursor = None;
        self.window = None;
    }
}

/// Run the slideshow in a fullscreen window until the user exits or `cancel`
/// fires. Must be called on the main thread, outside the tokio runtime.
pub fn run_windowed(cfg: Configuration, cancel: CancellationToken, runtime: Handle) -> Result<()> {
    let font = load_font().context("failed to load overlay font")?;
    let overlay = OverlayRenderer::new(font, cfg.font_size, cfg.clock_size);

    let geocoder = OpenCageGeocoder::new(cfg.api_key.clone(), cfg.geocode_timeout, runtime.clone())
        .context("failed to build geocoding client")?;
    let controller = PlaybackController::new(
        PhotoLibrary::new(cfg.photo_root.clone(), cfg.budget),
        ExifMetadataProvider::new(geocoder),
        PlaybackSettings {
            display_time: cfg.display_time,
            fade_time: cfg.fade_time,
            place_label: cfg.place_label.clone(),
            photo_root: cfg.photo_root.clone(),
        },
    );

    let event_loop = EventLoop::<ViewerEvent>::with_user_event()
        .build()
        .context("failed to build viewer event loop")?;
    let proxy = event_loop.create_proxy();

    let cancel_task = {
        let cancel = cancel.clone();
        runtime.spawn(async move {
            cancel.cancelled().await;
            let _ = proxy.send_event(ViewerEvent::Cancelled);
        })
    };

    let mut app = ViewerApp::new(cancel, controller, overlay);
    let run_result = event_loop.run_app(&mut app);
    cancel_task.abort();

    run_result.context("viewer event loop failed")?;
    match app.failure.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
