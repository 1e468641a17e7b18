//! Triggers that drive user state transitions

/// Named triggers delivered per user, either from the chat transport or
/// from an expired countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    // User triggers
    ShowMenu,
    OpenSchedule,
    ChooseInterval { minutes: u32 },
    RecordEvent,
    MarkDone,
    StartDay,
    Stop,

    // Timer triggers
    TimerFired,
}

impl Trigger {
    pub fn name(self) -> &'static str {
        match self {
            Trigger::ShowMenu => "show_menu",
            Trigger::OpenSchedule => "open_schedule",
            Trigger::ChooseInterval { .. } => "choose_interval",
            Trigger::RecordEvent => "record_event",
            Trigger::MarkDone => "mark_done",
            Trigger::StartDay => "start_day",
            Trigger::Stop => "stop",
            Trigger::TimerFired => "timer_fired",
        }
    }
}
