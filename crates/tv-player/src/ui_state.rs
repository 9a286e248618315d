//! Loading / error / list / OSD indicator rules.
//!
//! `reduce` is a pure function of the previous `UiState` and one signal; the
//! caller stores the result and runs the returned directives (timers).

use tv_proto::protocol::SessionPhase;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UiState {
    pub loading: bool,
    pub channel_error: bool,
    pub list_visible: bool,
    pub osd: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UiSignal {
    Phase(SessionPhase),
    FetchStarted,
    FetchFailed,
    ListLoaded { count: usize },
    ProbesSettled,
    SettleElapsed,
    ListVisibility(bool),
    Osd(String),
    OsdExpired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiDirective {
    ScheduleSettle,
    CancelSettle,
    ScheduleOsdExpiry,
}

pub fn reduce(state: &UiState, signal: &UiSignal) -> (UiState, Vec<UiDirective>) {
    let mut next = state.clone();
    let mut directives = Vec::new();

    match signal {
        UiSignal::Phase(SessionPhase::Loading) => {
            next.loading = true;
            next.channel_error = false;
            directives.push(UiDirective::CancelSettle);
        }
        UiSignal::Phase(SessionPhase::Recovering) => {
            next.loading = true;
            directives.push(UiDirective::CancelSettle);
        }
        UiSignal::Phase(SessionPhase::Playing) => {
            next.channel_error = false;
            directives.push(UiDirective::ScheduleSettle);
        }
        UiSignal::Phase(SessionPhase::Failed) => {
            next.channel_error = true;
            directives.push(UiDirective::ScheduleSettle);
        }
        UiSignal::Phase(SessionPhase::Idle | SessionPhase::Disposed) => {}
        UiSignal::FetchStarted => {
            next.loading = true;
            directives.push(UiDirective::CancelSettle);
        }
        UiSignal::FetchFailed | UiSignal::ListLoaded { count: 0 } => {
            next.channel_error = true;
            directives.push(UiDirective::ScheduleSettle);
        }
        UiSignal::ListLoaded { .. } => {
            next.channel_error = false;
        }
        UiSignal::ProbesSettled => {
            directives.push(UiDirective::ScheduleSettle);
        }
        UiSignal::SettleElapsed => {
            next.loading = false;
        }
        UiSignal::ListVisibility(visible) => {
            next.list_visible = *visible;
        }
        UiSignal::Osd(text) => {
            next.osd = Some(text.clone());
            directives.push(UiDirective::ScheduleOsdExpiry);
        }
        UiSignal::OsdExpired => {
            next.osd = None;
        }
    }

    (next, directives)
}
