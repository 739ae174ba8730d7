//! CPU compositing: opacity blits onto a black surface and the two-phase
//! cross-fade between consecutive photos.

use std::time::Duration;

use image::RgbaImage;

/// Transition cadence in steps per second.
pub const FRAME_RATE: u32 = 25;

/// A packed `0x00RRGGBB` pixel buffer, the layout softbuffer presents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    pixels: Vec<u32>,
}

impl Frame {
    #[must_use]
    pub fn black(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize],
        }
    }

    /// Convert RGBA8, compositing translucent pixels over black.
    #[must_use]
    pub fn from_rgba(image: &RgbaImage) -> Self {
        let pixels = image
            .pixels()
            .map(|p| {
                let [r, g, b, a] = p.0;
                let a = u32::from(a);
                let scale = |c: u8| u32::from(c) * a / 255;
                (scale(r) << 16) | (scale(g) << 8) | scale(b)
            })
            .collect();
        Self {
            width: image.width(),
            height: image.height(),
            pixels,
        }
    }

    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u32] {
        &mut self.pixels
    }

    /// Copy `source` onto this frame at its offset, scaled by `opacity`
    /// (0.0 = black, 1.0 = unchanged). Parts outside the frame are clipped.
    pub fn blit(&mut self, source: &DisplayFrame, opacity: f32) {
        let alpha = (opacity.clamp(0.0, 1.0) * 256.0).round() as u32;
        let src = &source.frame;
        let x0 = source.x.min(self.width);
        let y0 = source.y.min(self.height);
        let cols = src.width.min(self.width - x0) as usize;
        let rows = src.height.min(self.height - y0);

        for row in 0..rows {
            let src_start = (row * src.width) as usize;
            let dst_start = ((y0 + row) * self.width + x0) as usize;
            let src_row = &src.pixels[src_start..src_start + cols];
            let dst_row = &mut self.pixels[dst_start..dst_start + cols];
            if alpha >= 256 {
                dst_row.copy_from_slice(src_row);
            } else {
                for (dst, &px) in dst_row.iter_mut().zip(src_row) {
                    *dst = scale_pixel(px, alpha);
                }
            }
        }
    }
}

#[inline]
fn scale_pixel(px: u32, alpha: u32) -> u32 {
    let r = (((px >> 16) & 0xFF) * alpha) >> 8;
    let g = (((px >> 8) & 0xFF) * alpha) >> 8;
    let b = ((px & 0xFF) * alpha) >> 8;
    (r << 16) | (g << 8) | b
}

/// A scaled photo and its top-left position in the output surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayFrame {
    pub frame: Frame,
    pub x: u32,
    pub y: u32,
}

/// One composited step of a transition and how long it stays on screen
/// before the next step is due.
#[derive(Debug, Clone)]
pub struct TransitionFrame {
    pub frame: Frame,
    pub hold: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FadePhase {
    FadeOut,
    Emerge,
    Done,
}

/// Lazy cross-fade from the current photo to the next one.
///
/// With a previous frame the sequence fades it to black first, then lets the
/// new photo emerge from black; without one only the second phase runs. Each
/// phase lasts half of the configured duration. The iterator is not
/// restartable; [`Transition::finish`] hands back the new current frame at any
/// point, which is how a key press abandons the remaining steps.
#[derive(Debug)]
pub struct Transition {
    previous: Option<DisplayFrame>,
    next: DisplayFrame,
    surface: (u32, u32),
    steps: u32,
    hold: Duration,
    phase: FadePhase,
    step: u32,
}

impl Transition {
    pub fn new(
        previous: Option<DisplayFrame>,
        next: DisplayFrame,
        surface: (u32, u32),
        duration: Duration,
    ) -> Self {
        let phase_duration = duration / 2;
        let steps = steps_for(phase_duration);
        let phase = if previous.is_some() {
            FadePhase::FadeOut
        } else {
            FadePhase::Emerge
        };
        Self {
            previous,
            next,
            surface,
            steps,
            hold: phase_duration / steps,
            phase,
            step: 0,
        }
    }

    /// Frames per phase.
    #[must_use]
    pub const fn steps_per_phase(&self) -> u32 {
        self.steps
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.phase == FadePhase::Done
    }

    /// End the transition and return the frame that is now current.
    #[must_use]
    pub fn finish(self) -> DisplayFrame {
        self.next
    }

    fn compose(&self, source: &DisplayFrame, opacity: f32) -> Frame {
        let mut frame = Frame::black(self.surface.0, self.surface.1);
        frame.blit(source, opacity);
        frame
    }
}

impl Iterator for Transition {
    type Item = TransitionFrame;

    fn next(&mut self) -> Option<Self::Item> {
        let frame = match self.phase {
            FadePhase::Done => return None,
            FadePhase::FadeOut => {
                self.step += 1;
                let opacity = 1.0 - self.step as f32 / self.steps as f32;
                let frame = match self.previous.as_ref() {
                    Some(previous) => self.compose(previous, opacity),
                    None => Frame::black(self.surface.0, self.surface.1),
                };
                if self.step >= self.steps {
                    self.phase = FadePhase::Emerge;
                    self.step = 0;
                }
                frame
            }
            FadePhase::Emerge => {
                self.step += 1;
                let opacity = self.step as f32 / self.steps as f32;
                let frame = self.compose(&self.next, opacity);
                if self.step >= self.steps {
                    self.phase = FadePhase::Done;
                }
                frame
            }
        };
        Some(TransitionFrame {
            frame,
            hold: self.hold,
        })
    }
}

fn steps_for(phase_duration: Duration) -> u32 {
    let steps = (f64::from(FRAME_RATE) * phase_duration.as_secs_f64()).round();
    (steps as u32).max(1)
}
