//! Message texts and inline keyboards

use crate::db::UserState;
use crate::state_machine::Notice;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

// Callback data carried by inline buttons
pub const SCHEDULE: &str = "schedule";
pub const INTERVAL_PREFIX: &str = "interval_";
pub const RECORD_EVENT: &str = "record_event";
pub const MARK_DONE: &str = "mark_done";
pub const START_DAY: &str = "start_day";
pub const STOP_SCHEDULE: &str = "stop_schedule";

/// Intervals offered by the schedule menu, in minutes
pub const INTERVAL_OPTIONS: [u32; 6] = [30, 45, 60, 120, 180, 240];

const READY: &str = "You can go now!";

/// Human-readable interval: "45 minutes", "2h", "1h 30m"
pub fn format_interval(minutes: u32) -> String {
    if minutes < 60 {
        return format!("{minutes} minutes");
    }
    let (hours, rest) = (minutes / 60, minutes % 60);
    if rest > 0 {
        format!("{hours}h {rest}m")
    } else {
        format!("{hours}h")
    }
}

/// Button label: "30m", "1h"
fn short_label(minutes: u32) -> String {
    if minutes < 60 || minutes % 60 != 0 {
        format!("{minutes}m")
    } else {
        format!("{}h", minutes / 60)
    }
}

pub fn text(notice: &Notice) -> String {
    match *notice {
        Notice::Menu { .. } => "Welcome to Pacer!\nManage your schedule below.".to_string(),
        Notice::ChooseInterval => "How long should each interval be?".to_string(),
        Notice::IntervalSet { minutes } => {
            format!("Interval set to {}.\n\n{READY}", format_interval(minutes))
        }
        Notice::EventRecorded { minutes } => format!(
            "Noted! Next one in {}. I'll notify you when it's time.",
            format_interval(minutes)
        ),
        Notice::IntervalElapsed => READY.to_string(),
        Notice::DayDone => "Done for the day! Use /start when you're ready tomorrow.".to_string(),
        Notice::DayStarted { minutes } => {
            format!("New day! Interval: {}.\n\n{READY}", format_interval(minutes))
        }
        Notice::ScheduleStopped => "Schedule stopped. Use /start to begin again.".to_string(),
    }
}

/// Keyboard attached to a notice. `None` clears the buttons on edit.
pub fn keyboard(notice: &Notice) -> Option<InlineKeyboardMarkup> {
    match *notice {
        Notice::Menu {
            state,
            interval_minutes,
        } => Some(main_menu(state, interval_minutes)),
        Notice::ChooseInterval => Some(interval_menu()),
        Notice::IntervalSet { .. } | Notice::IntervalElapsed | Notice::DayStarted { .. } => {
            Some(action_menu())
        }
        Notice::EventRecorded { .. } | Notice::DayDone | Notice::ScheduleStopped => None,
    }
}

fn main_menu(state: UserState, interval_minutes: Option<u32>) -> InlineKeyboardMarkup {
    // Only buttons the current state accepts
    let mut rows = vec![];
    if state == UserState::Idle {
        rows.push(vec![InlineKeyboardButton::callback("Schedule", SCHEDULE)]);
        if interval_minutes.is_some() {
            rows.push(vec![InlineKeyboardButton::callback("Start the Day", START_DAY)]);
        }
    } else {
        rows.push(vec![InlineKeyboardButton::callback(
            "Stop Schedule",
            STOP_SCHEDULE,
        )]);
    }
    InlineKeyboardMarkup::new(rows)
}

fn interval_menu() -> InlineKeyboardMarkup {
    let rows = INTERVAL_OPTIONS.chunks(3).map(|row| {
        row.iter()
            .map(|&minutes| {
                InlineKeyboardButton::callback(
                    short_label(minutes),
                    format!("{INTERVAL_PREFIX}{minutes}"),
                )
            })
            .collect::<Vec<_>>()
    });
    InlineKeyboardMarkup::new(rows)
}

fn action_menu() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new([
        [InlineKeyboardButton::callback("I did it", RECORD_EVENT)],
        [InlineKeyboardButton::callback("Last one of the day", MARK_DONE)],
    ])
}
