use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};

use crate::error::Error;
use crate::render::overlay::DEFAULT_PLACE_LABEL;
use crate::select::SelectionBudget;

/// Upper bound for `Display_Time` and `GL_fadetime`.
pub const MAX_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Command line of the slideshow binary.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "fotowand",
    version,
    about = "Fullscreen photo frame slideshow with EXIF captions"
)]
pub struct CliArgs {
    /// Root directory to scan recursively for images.
    #[arg(value_name = "FOLDER")]
    pub folder: PathBuf,

    /// OpenCage API key used for reverse geocoding.
    #[arg(value_name = "API_KEY")]
    pub api_key: String,

    /// Seconds each photo stays on screen.
    #[arg(long = "Display_Time", value_name = "SECS", default_value_t = 30)]
    pub display_time: u64,

    /// Caption text size in pixels.
    #[arg(long = "GL_fontsize", value_name = "PX", default_value_t = 21)]
    pub font_size: u32,

    /// Transition duration in seconds.
    #[arg(
        long = "GL_fadetime",
        value_name = "SECS",
        default_value_t = 0.4,
        allow_negative_numbers = true
    )]
    pub fade_time: f64,

    /// Photos drawn per cycle from the current and previous year.
    #[arg(long = "GL_anz_2_year", value_name = "N", default_value_t = 250)]
    pub recent: usize,

    /// Photos drawn per cycle from the rest of the last five years.
    #[arg(long = "GL_anz_5_year", value_name = "N", default_value_t = 250)]
    pub five_year: usize,

    /// Photos drawn per cycle from the whole library.
    #[arg(long = "GL_anz_all", value_name = "N", default_value_t = 500)]
    pub all: usize,

    /// Clock text size in pixels; 0 hides the clock.
    #[arg(long = "Displ_Time_Size", value_name = "PX", default_value_t = 30)]
    pub clock_size: u32,

    /// Label printed before the place name.
    #[arg(long = "place-label", value_name = "TEXT", default_value = DEFAULT_PLACE_LABEL)]
    pub place_label: String,

    /// Upper bound for one reverse-geocoding request, in seconds.
    #[arg(long = "geocode-timeout", value_name = "SECS", default_value_t = 5)]
    pub geocode_timeout: u64,

    /// Increase log verbosity (repeatable).
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,
}

/// Validated runtime settings.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub photo_root: PathBuf,
    pub api_key: String,
    pub display_time: Duration,
    pub font_size: u32,
    pub fade_time: Duration,
    pub budget: SelectionBudget,
    /// Zero disables the clock.
    pub clock_size: u32,
    pub place_label: String,
    pub geocode_timeout: Duration,
}

impl Configuration {
    /// Check invariants clap cannot express.
    ///
    /// # Errors
    /// [`Error::InvalidConfig`] for out-of-range values and
    /// [`Error::NotADirectory`] if the photo root is not a directory.
    pub fn validated(self) -> Result<Self, Error> {
        if self.display_time.is_zero() {
            return Err(Error::InvalidConfig(
                "Display_Time must be greater than zero".into(),
            ));
        }
        if self.display_time > MAX_INTERVAL {
            return Err(Error::InvalidConfig(format!(
                "Display_Time must not exceed {} seconds",
                MAX_INTERVAL.as_secs()
            )));
        }
        if self.fade_time > MAX_INTERVAL {
            return Err(Error::InvalidConfig(format!(
                "GL_fadetime must not exceed {} seconds",
                MAX_INTERVAL.as_secs()
            )));
        }
        if self.font_size == 0 {
            return Err(Error::InvalidConfig(
                "GL_fontsize must be greater than zero".into(),
            ));
        }
        if self.geocode_timeout.is_zero() {
            return Err(Error::InvalidConfig(
                "geocode-timeout must be greater than zero".into(),
            ));
        }
        if !self.photo_root.is_dir() {
            return Err(Error::NotADirectory(self.photo_root));
        }
        Ok(self)
    }
}

impl TryFrom<CliArgs> for Configuration {
    type Error = Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let fade_time = Duration::try_from_secs_f64(args.fade_time).map_err(|_| {
            Error::InvalidConfig(format!(
                "GL_fadetime must be a non-negative number of seconds, got {}",
                args.fade_time
            ))
        })?;
        Self {
            photo_root: args.folder,
            api_key: args.api_key,
            display_time: Duration::from_secs(args.display_time),
            font_size: args.font_size,
            fade_time,
            budget: SelectionBudget {
                recent: args.recent,
                five_year: args.five_year,
                all: args.all,
            },
            clock_size: args.clock_size,
            place_label: args.place_label,
            geocode_timeout: Duration::from_secs(args.geocode_timeout),
        }
        .validated()
    }
}
