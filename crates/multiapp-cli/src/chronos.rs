//! Built-in `chronos` plugin: endurance race pit windows.
//!
//! From a race start time and duration, a pit window opens every 40 minutes
//! and spans ten minutes either side of the nominal stop, up to and including
//! the finish.

use chrono::{Duration, NaiveTime};
use multiapp_core::{PluginEntry, RenderSurface};

pub const NAME: &str = "chronos";

/// Race durations offered by the plugin, in hours.
pub const RACE_HOURS: [u32; 4] = [6, 8, 12, 25];

const STINT_MINUTES: i64 = 40;
const WINDOW_MARGIN_MINUTES: i64 = 10;
const DEFAULT_RACE_HOURS: u32 = 6;

/// One pit window. Times wrap past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PitWindow {
    pub number: usize,
    pub opens: NaiveTime,
    pub closes: NaiveTime,
}

/// Every pit window of a race starting at `start` and lasting `race_hours`.
pub fn pit_windows(start: NaiveTime, race_hours: u32) -> Vec<PitWindow> {
    let race_minutes = i64::from(race_hours) * 60;
    let margin = Duration::minutes(WINDOW_MARGIN_MINUTES);

    (0..=race_minutes)
        .step_by(STINT_MINUTES as usize)
        .enumerate()
        .map(|(i, offset)| {
            let stop = start + Duration::minutes(offset);
            PitWindow {
                number: i + 1,
                opens: stop - margin,
                closes: stop + margin,
            }
        })
        .collect()
}

/// Parse `6h` or `6` into one of [`RACE_HOURS`].
fn parse_race_hours(input: &str) -> Option<u32> {
    let hours: u32 = input.trim().trim_end_matches('h').parse().ok()?;
    RACE_HOURS.contains(&hours).then_some(hours)
}

/// The plugin, bound to the arguments given on the command line.
pub struct Chronos {
    start: Option<String>,
    race: Option<String>,
}

impl Chronos {
    /// `args` is `[START] [DURATION]`, e.g. `["14:00", "6h"]`.
    pub fn from_args(args: &[String]) -> Self {
        Self {
            start: args.first().cloned(),
            race: args.get(1).cloned(),
        }
    }
}

impl PluginEntry for Chronos {
    fn render(&self, surface: &mut dyn RenderSurface) -> anyhow::Result<()> {
        surface.add_text("Pit window calculator");

        let Some(start) = &self.start else {
            surface.add_text(&format!(
                "Usage: open {} HH:MM [{}]",
                NAME,
                RACE_HOURS.map(|h| format!("{}h", h)).join("|")
            ));
            return Ok(());
        };

        let start = match NaiveTime::parse_from_str(start.trim(), "%H:%M") {
            Ok(start) => start,
            Err(_) => {
                surface.add_text("Invalid start time (HH:MM)");
                return Ok(());
            }
        };
        let race_hours = match self.race.as_deref() {
            None => DEFAULT_RACE_HOURS,
            Some(race) => match parse_race_hours(race) {
                Some(hours) => hours,
                None => {
                    surface.add_text(&format!("Unsupported race duration: {}", race));
                    return Ok(());
                }
            },
        };

        surface.add_text(&format!(
            "{}h race from {}",
            race_hours,
            start.format("%H:%M")
        ));
        for window in pit_windows(start, race_hours) {
            surface.add_text(&format!(
                "Window {}: {} -> {}",
                window.number,
                window.opens.format("%H:%M"),
                window.closes.format("%H:%M")
            ));
        }
        Ok(())
    }
}
