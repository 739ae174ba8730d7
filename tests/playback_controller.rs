use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::{Duration, Instant};

use fotowand::error::Error;
use fotowand::events::UserInput;
use fotowand::meta::{MetadataProvider, PhotoMetadata};
use fotowand::render::compositor::Frame;
use fotowand::render::overlay::Caption;
use fotowand::scan::MediaFile;
use fotowand::select::SelectionBudget;
use fotowand::tasks::files::{PhotoLibrary, WorkingSetSource};
use fotowand::tasks::viewer::playback::{
    Display, PlaybackController, PlaybackPhase, PlaybackSettings, Wake,
};
use tempfile::{TempDir, tempdir};

const DISPLAY_TIME: Duration = Duration::from_secs(30);

/// Returns the same files in the same order on every rebuild.
struct FixedSource {
    files: Vec<MediaFile>,
    rebuilds: Rc<Cell<usize>>,
}

impl WorkingSetSource for FixedSource {
    fn rebuild(&mut self) -> Vec<MediaFile> {
        self.rebuilds.set(self.rebuilds.get() + 1);
        self.files.clone()
    }
}

struct FakeMetadata {
    cycles: Rc<Cell<usize>>,
}

impl MetadataProvider for FakeMetadata {
    fn lookup(&self, path: &Path) -> PhotoMetadata {
        if path.file_name().is_some_and(|n| n == "plain.png") {
            return PhotoMetadata::default();
        }
        PhotoMetadata {
            date: Some("01.01.2020".to_string()),
            place: Some("Berlin, Germany".to_string()),
        }
    }

    fn begin_cycle(&self) {
        self.cycles.set(self.cycles.get() + 1);
    }
}

#[derive(Default)]
struct RecordingDisplay {
    presented: Vec<(Frame, Option<Caption>)>,
}

impl Display for RecordingDisplay {
    fn size(&self) -> (u32, u32) {
        (8, 6)
    }

    fn present(&mut self, frame: &Frame, caption: Option<&Caption>) -> anyhow::Result<()> {
        self.presented.push((frame.clone(), caption.cloned()));
        Ok(())
    }
}

struct Harness {
    _dir: TempDir,
    root: PathBuf,
    controller: PlaybackController<FixedSource, FakeMetadata>,
    display: RecordingDisplay,
    rebuilds: Rc<Cell<usize>>,
    cycles: Rc<Cell<usize>>,
}

fn write_png(path: &Path, rgb: [u8; 3]) {
    image::RgbaImage::from_pixel(4, 3, image::Rgba([rgb[0], rgb[1], rgb[2], 255]))
        .save(path)
        .unwrap();
}

/// `names` ending in `.png` become real images, anything else holds garbage.
fn harness(names: &[&str], fade_time: Duration) -> Harness {
    harness_with(names, fade_time, DISPLAY_TIME)
}

fn harness_with(names: &[&str], fade_time: Duration, display_time: Duration) -> Harness {
    let dir = tempdir().unwrap();
    let root = dir.path().to_path_buf();
    let files = names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let path = root.join(name);
            if name.ends_with(".png") {
                write_png(&path, [40 * i as u8, 200, 10]);
            } else {
                std::fs::write(&path, b"definitely not an image").unwrap();
            }
            MediaFile::new(path)
        })
        .collect();

    let rebuilds = Rc::new(Cell::new(0));
    let cycles = Rc::new(Cell::new(0));
    let controller = PlaybackController::new(
        FixedSource {
            files,
            rebuilds: rebuilds.clone(),
        },
        FakeMetadata {
            cycles: cycles.clone(),
        },
        PlaybackSettings {
            display_time,
            fade_time,
            place_label: "Ort".to_string(),
            photo_root: root.clone(),
        },
    );
    Harness {
        _dir: dir,
        root,
        controller,
        display: RecordingDisplay::default(),
        rebuilds,
        cycles,
    }
}

impl Harness {
    /// Run timer steps until the transition has settled; returns the
    /// auto-advance deadline.
    fn settle(&mut self, mut wake: Wake) -> Instant {
        while self.controller.phase() == PlaybackPhase::Transitioning {
            let Wake::At(at) = wake else {
                panic!("transition asked to stop");
            };
            wake = self.controller.handle_timer(&mut self.display, at).unwrap();
        }
        assert_eq!(self.controller.phase(), PlaybackPhase::Waiting);
        match wake {
            Wake::At(at) => at,
            Wake::Stop => panic!("waiting phase asked to stop"),
        }
    }

    fn start(&mut self, now: Instant) -> Instant {
        let wake = self.controller.start(&mut self.display, now).unwrap();
        self.settle(wake)
    }

    fn navigate(&mut self, inputs: &[UserInput], now: Instant) -> Instant {
        let wake = self
            .controller
            .handle_inputs(&mut self.display, inputs, now)
            .unwrap();
        self.settle(wake)
    }

    fn last_caption(&self) -> Caption {
        self.display
            .presented
            .last()
            .and_then(|(_, caption)| caption.clone())
            .expect("settled frame carries a caption")
    }
}

fn five() -> Vec<&'static str> {
    vec!["0.png", "1.png", "2.png", "3.png", "4.png"]
}

#[test]
fn first_photo_fades_in_then_shows_caption() {
    let mut h = harness(&["a.png"], Duration::from_millis(400));
    let t0 = Instant::now();
    let wake = h.controller.start(&mut h.display, t0).unwrap();
    assert_eq!(wake, Wake::At(t0 + Duration::from_millis(40)));
    assert_eq!(h.controller.phase(), PlaybackPhase::Transitioning);

    let deadline = h.settle(wake);
    // five emerge frames plus the settled frame
    assert_eq!(h.display.presented.len(), 6);
    assert!(h.display.presented[..5].iter().all(|(_, c)| c.is_none()));
    assert_eq!(
        h.last_caption(),
        Caption {
            info: "01.01.2020 | Ort: Berlin, Germany".to_string(),
            path: "a.png".to_string(),
        }
    );
    assert_eq!(
        deadline,
        t0 + Duration::from_millis(200) + DISPLAY_TIME
    );
    assert_eq!(h.rebuilds.get(), 1);
    assert_eq!(h.cycles.get(), 1);
}

#[test]
fn settled_frame_is_centered_and_letterboxed() {
    let mut h = harness(&["a.png"], Duration::ZERO);
    h.start(Instant::now());
    let (frame, _) = h.display.presented.last().unwrap();
    assert_eq!((frame.width(), frame.height()), (8, 6));
    // 4x3 on 8x6 fills the surface exactly
    assert!(frame.pixels().iter().all(|&px| px != 0));
}

#[test]
fn second_transition_fades_out_the_previous_photo() {
    let mut h = harness(&["a.png", "b.png"], Duration::from_millis(400));
    let deadline = h.start(Instant::now());
    let before = h.display.presented.len();
    let wake = h.controller.handle_timer(&mut h.display, deadline).unwrap();
    h.settle(wake);
    // fade-out and emerge phases, five frames each, plus the settled frame
    assert_eq!(h.display.presented.len() - before, 11);
    assert_eq!(h.controller.state().index(), 1);
}

#[test]
fn left_from_first_wraps_without_rebuild() {
    let mut h = harness(&five(), Duration::ZERO);
    let t0 = Instant::now();
    h.start(t0);
    assert_eq!(h.controller.state().index(), 0);

    h.navigate(&[UserInput::Previous], t0);
    assert_eq!(h.controller.state().index(), 4);
    assert_eq!(h.controller.state().generation(), 1);
    assert_eq!(h.rebuilds.get(), 1);
    assert_eq!(h.last_caption().path, "4.png");
}

#[test]
fn right_from_last_rebuilds_and_restarts() {
    let mut h = harness(&five(), Duration::ZERO);
    let t0 = Instant::now();
    h.start(t0);
    h.navigate(&[UserInput::Previous], t0);
    assert_eq!(h.controller.state().index(), 4);

    h.navigate(&[UserInput::Next], t0);
    assert_eq!(h.controller.state().index(), 0);
    assert_eq!(h.controller.state().generation(), 2);
    assert_eq!(h.rebuilds.get(), 2);
    assert_eq!(h.cycles.get(), 2);
}

#[test]
fn auto_advance_moves_to_next_photo() {
    let mut h = harness(&five(), Duration::ZERO);
    let deadline = h.start(Instant::now());

    let early = deadline - Duration::from_secs(1);
    assert_eq!(
        h.controller.handle_timer(&mut h.display, early).unwrap(),
        Wake::At(deadline)
    );
    assert_eq!(h.controller.state().index(), 0);

    let wake = h.controller.handle_timer(&mut h.display, deadline).unwrap();
    h.settle(wake);
    assert_eq!(h.controller.state().index(), 1);
    assert_eq!(h.last_caption().path, "1.png");
}

#[test]
fn auto_advance_past_the_end_rebuilds() {
    let mut h = harness(&["a.png", "b.png"], Duration::ZERO);
    let mut deadline = h.start(Instant::now());
    for _ in 0..2 {
        let wake = h.controller.handle_timer(&mut h.display, deadline).unwrap();
        deadline = h.settle(wake);
    }
    assert_eq!(h.controller.state().index(), 0);
    assert_eq!(h.controller.state().generation(), 2);
}

#[test]
fn batch_navigation_is_applied_in_order() {
    let mut h = harness(&five(), Duration::ZERO);
    let t0 = Instant::now();
    h.start(t0);
    let shown_before = h.display.presented.len();
    h.navigate(
        &[UserInput::Next, UserInput::Next, UserInput::Previous, UserInput::Next],
        t0,
    );
    assert_eq!(h.controller.state().index(), 2);
    // a single fade-out, emerge and settled frame for the whole batch
    assert_eq!(h.display.presented.len() - shown_before, 3);
}

#[test]
fn exit_in_batch_wins_over_navigation() {
    let mut h = harness(&five(), Duration::ZERO);
    let t0 = Instant::now();
    h.start(t0);
    let wake = h
        .controller
        .handle_inputs(&mut h.display, &[UserInput::Next, UserInput::Exit], t0)
        .unwrap();
    assert_eq!(wake, Wake::Stop);
    assert_eq!(h.controller.phase(), PlaybackPhase::Stopped);
    assert_eq!(h.controller.state().index(), 0);
    assert_eq!(
        h.controller.handle_timer(&mut h.display, t0 + DISPLAY_TIME).unwrap(),
        Wake::Stop
    );
}

#[test]
fn navigation_abandons_a_running_transition() {
    let mut h = harness(&five(), Duration::from_secs(2));
    let t0 = Instant::now();
    let wake = h.controller.start(&mut h.display, t0).unwrap();
    assert_eq!(h.controller.phase(), PlaybackPhase::Transitioning);
    let Wake::At(due) = wake else { panic!() };

    let wake = h
        .controller
        .handle_inputs(&mut h.display, &[UserInput::Next], due)
        .unwrap();
    assert_eq!(h.controller.state().index(), 1);
    assert_eq!(h.controller.phase(), PlaybackPhase::Transitioning);
    h.settle(wake);
    assert_eq!(h.last_caption().path, "1.png");
}

#[test]
fn undecodable_files_are_skipped() {
    let mut h = harness(&["bad.jpg", "good.png"], Duration::ZERO);
    h.start(Instant::now());
    assert_eq!(h.controller.state().index(), 1);
    assert_eq!(h.last_caption().path, "good.png");
}

#[test]
fn all_files_failing_waits_and_retries() {
    let mut h = harness(&["a.jpg", "b.jpg"], Duration::ZERO);
    let t0 = Instant::now();
    let wake = h.controller.start(&mut h.display, t0).unwrap();
    assert_eq!(wake, Wake::At(t0 + DISPLAY_TIME));
    assert_eq!(h.controller.phase(), PlaybackPhase::Waiting);
    assert!(h.display.presented.is_empty());

    let wake = h
        .controller
        .handle_timer(&mut h.display, t0 + DISPLAY_TIME)
        .unwrap();
    assert!(matches!(wake, Wake::At(_)));
    assert!(h.display.presented.is_empty());
}

#[test]
fn photo_without_metadata_has_empty_info_line() {
    let mut h = harness(&["plain.png"], Duration::ZERO);
    h.start(Instant::now());
    let caption = h.last_caption();
    assert_eq!(caption.info, "");
    assert_eq!(caption.path, "plain.png");
    assert!(h.root.join("plain.png").exists());
}

#[test]
fn empty_library_is_an_error_and_stays_idle() {
    let mut h = harness(&[], Duration::ZERO);
    let err = h
        .controller
        .start(&mut h.display, Instant::now())
        .unwrap_err();
    assert!(matches!(err, Error::EmptySelection(ref root) if *root == h.root));
    assert_eq!(h.controller.phase(), PlaybackPhase::Idle);
    assert!(h.display.presented.is_empty());
}

#[test]
fn empty_directory_is_an_error_and_stays_idle() {
    let dir = tempdir().unwrap();
    std::fs::create_dir(dir.path().join("2024")).unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"not a photo").unwrap();
    let mut controller = PlaybackController::new(
        PhotoLibrary::new(dir.path().to_path_buf(), SelectionBudget::default()),
        FakeMetadata {
            cycles: Rc::new(Cell::new(0)),
        },
        PlaybackSettings {
            display_time: DISPLAY_TIME,
            fade_time: Duration::ZERO,
            place_label: "Ort".to_string(),
            photo_root: dir.path().to_path_buf(),
        },
    );
    let mut display = RecordingDisplay::default();

    let err = controller.start(&mut display, Instant::now()).unwrap_err();
    assert!(matches!(err, Error::EmptySelection(ref root) if root == dir.path()));
    assert_eq!(controller.phase(), PlaybackPhase::Idle);
    assert!(display.presented.is_empty());
}

#[test]
fn very_long_display_time_does_not_overflow() {
    let mut h = harness_with(&["a.png", "b.png"], Duration::ZERO, Duration::MAX);
    let t0 = Instant::now();
    let deadline = h.start(t0);
    assert!(deadline > t0);

    let wake = h
        .controller
        .handle_inputs(&mut h.display, &[UserInput::Next], t0)
        .unwrap();
    h.settle(wake);
    assert_eq!(h.controller.state().index(), 1);
}
