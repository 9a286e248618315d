//! Remote-control style navigation.
//!
//! `Navigator` turns keys into `NavCommand`s.  It owns the numeric-entry
//! buffer, the overlay list visibility and highlight, and the pending arrow
//! delta; timers are requested through commands and fed back in through
//! `commit_numeric` / `fire_arrow` by the core.
//!
//! ```text
//!  digits ──► buffer ──(commit timer)──► SelectIndex(n-1) | InvalidSelection
//!  Up/Down, list closed ──► Previous / Next
//!  Up/Down, list open   ──► delta ──(arrow timer)──► Highlight(i)
//!  Enter, list open     ──► SelectIndex(highlight), close list
//! ```

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Digit(u8),
    Up,
    Down,
    Left,
    Right,
    PageUp,
    PageDown,
    Enter,
    Escape,
    /// Pointer activation of list entry `i` (0-based).
    Click(usize),
    Refresh,
    ToggleFullscreen,
    Quit,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NavCommand {
    SelectIndex(usize),
    Next,
    Previous,
    /// `Some(v)` forces visibility, `None` toggles.
    SetListVisible(Option<bool>),
    Highlight(usize),
    ScheduleNumericCommit,
    CancelNumericCommit,
    ScheduleArrow,
    CancelArrow,
    ShowOsd(String),
    InvalidSelection(String),
    SetFullscreen(bool),
    Refresh,
    Quit,
}

/// What the navigator needs to know about the roster right now.
#[derive(Debug, Clone, Copy, Default)]
pub struct NavContext {
    pub len: usize,
    pub active: Option<usize>,
}

#[derive(Debug, Default)]
pub struct Navigator {
    digits: String,
    list_open: bool,
    highlight: Option<usize>,
    arrow_delta: i64,
    fullscreen: bool,
}

impl Navigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn highlight(&self) -> Option<usize> {
        self.highlight
    }

    pub fn fullscreen(&self) -> bool {
        self.fullscreen
    }

    pub fn set_fullscreen(&mut self, on: bool) {
        self.fullscreen = on;
    }

    pub fn handle_key(&mut self, key: Key, ctx: NavContext) -> Vec<NavCommand> {
        if let Key::Digit(d) = key {
            self.digits.push(char::from(b'0' + d.min(9)));
            return vec![
                NavCommand::ShowOsd(self.digits.clone()),
                NavCommand::ScheduleNumericCommit,
            ];
        }

        let mut cmds = Vec::new();
        if !self.digits.is_empty() {
            self.digits.clear();
            cmds.push(NavCommand::CancelNumericCommit);
        }

        match key {
            Key::Digit(_) => {}
            Key::Up | Key::PageUp => cmds.push(self.step(-1)),
            Key::Down | Key::PageDown => cmds.push(self.step(1)),
            Key::Left => cmds.push(NavCommand::SetListVisible(Some(true))),
            Key::Right => {
                if self.list_open {
                    cmds.push(NavCommand::SetListVisible(Some(false)));
                }
            }
            Key::Enter => {
                if self.list_open {
                    if self.arrow_delta != 0 {
                        self.apply_delta(ctx);
                        cmds.push(NavCommand::CancelArrow);
                    }
                    if let Some(target) = self.highlight.or(ctx.active) {
                        cmds.push(NavCommand::SelectIndex(target));
                    }
                    cmds.push(NavCommand::SetListVisible(Some(false)));
                }
            }
            Key::Escape => {
                if self.list_open {
                    cmds.push(NavCommand::SetListVisible(Some(false)));
                } else if self.fullscreen {
                    cmds.push(NavCommand::SetFullscreen(false));
                }
            }
            Key::Click(i) => cmds.push(NavCommand::SelectIndex(i)),
            Key::Refresh => cmds.push(NavCommand::Refresh),
            Key::ToggleFullscreen => cmds.push(NavCommand::SetFullscreen(!self.fullscreen)),
            Key::Quit => cmds.push(NavCommand::Quit),
        }
        cmds
    }

    /// The numeric-entry timer fired.  The buffer is cleared either way.
    pub fn commit_numeric(&mut self, ctx: NavContext) -> Vec<NavCommand> {
        let entered = std::mem::take(&mut self.digits);
        if entered.is_empty() {
            return Vec::new();
        }
        match entered.parse::<usize>() {
            Ok(n) if n >= 1 && n <= ctx.len => vec![
                NavCommand::SelectIndex(n - 1),
                NavCommand::SetListVisible(Some(false)),
            ],
            _ => vec![NavCommand::InvalidSelection(format!(
                "No channel {}",
                entered
            ))],
        }
    }

    /// The arrow-repeat timer fired: move the highlight by the accumulated delta.
    pub fn fire_arrow(&mut self, ctx: NavContext) -> Vec<NavCommand> {
        if !self.list_open || ctx.len == 0 {
            self.arrow_delta = 0;
            return Vec::new();
        }
        self.apply_delta(ctx);
        self.highlight
            .map(NavCommand::Highlight)
            .into_iter()
            .collect()
    }

    /// Apply a visibility request.  Returns the resulting visibility.
    /// Opening highlights the active channel; closing drops the highlight.
    pub fn set_list_visible(&mut self, visible: Option<bool>, active: Option<usize>) -> bool {
        let open = visible.unwrap_or(!self.list_open);
        if open && !self.list_open {
            self.highlight = active;
        }
        if !open {
            self.highlight = None;
        }
        self.list_open = open;
        self.arrow_delta = 0;
        open
    }

    /// The roster was replaced; keep the highlight inside it.
    pub fn reset_for_list(&mut self, len: usize) {
        self.arrow_delta = 0;
        if self.highlight.is_some_and(|h| h >= len) {
            self.highlight = len.checked_sub(1);
        }
    }

    fn step(&mut self, delta: i64) -> NavCommand {
        if self.list_open {
            self.arrow_delta += delta;
            NavCommand::ScheduleArrow
        } else if delta < 0 {
            NavCommand::Previous
        } else {
            NavCommand::Next
        }
    }

    fn apply_delta(&mut self, ctx: NavContext) {
        if ctx.len > 0 {
            let base = self.highlight.or(ctx.active).unwrap_or(0) as i64;
            let len = ctx.len as i64;
            self.highlight = Some((base + self.arrow_delta).rem_euclid(len) as usize);
        }
        self.arrow_delta = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(len: usize) -> NavContext {
        NavContext {
            len,
            active: Some(0),
        }
    }

    #[test]
    fn test_two_digits_commit_one_based() {
        let mut nav = Navigator::new();
        nav.handle_key(Key::Digit(1), ctx(20));
        let cmds = nav.handle_key(Key::Digit(2), ctx(20));
        assert_eq!(cmds[0], NavCommand::ShowOsd("12".into()));
        assert_eq!(
            nav.commit_numeric(ctx(20)),
            vec![
                NavCommand::SelectIndex(11),
                NavCommand::SetListVisible(Some(false))
            ]
        );
        assert_eq!(nav.digits, "");
    }

    #[test]
    fn test_out_of_range_is_invalid_and_clears() {
        let mut nav = Navigator::new();
        nav.handle_key(Key::Digit(9), ctx(20));
        nav.handle_key(Key::Digit(9), ctx(20));
        let cmds = nav.commit_numeric(ctx(20));
        assert!(matches!(cmds.as_slice(), [NavCommand::InvalidSelection(_)]));
        assert_eq!(nav.digits, "");

        nav.handle_key(Key::Digit(0), ctx(20));
        assert!(matches!(
            nav.commit_numeric(ctx(20)).as_slice(),
            [NavCommand::InvalidSelection(_)]
        ));
    }

    #[test]
    fn test_other_key_clears_buffer() {
        let mut nav = Navigator::new();
        nav.handle_key(Key::Digit(3), ctx(5));
        let cmds = nav.handle_key(Key::Down, ctx(5));
        assert_eq!(cmds, vec![NavCommand::CancelNumericCommit, NavCommand::Next]);
        assert!(nav.commit_numeric(ctx(5)).is_empty());
    }

    #[test]
    fn test_arrows_switch_when_list_closed() {
        let mut nav = Navigator::new();
        assert_eq!(nav.handle_key(Key::Up, ctx(3)), vec![NavCommand::Previous]);
        assert_eq!(nav.handle_key(Key::PageDown, ctx(3)), vec![NavCommand::Next]);
    }

    #[test]
    fn test_list_arrows_accumulate_and_wrap() {
        let mut nav = Navigator::new();
        assert!(nav.set_list_visible(Some(true), Some(0)));
        assert_eq!(nav.highlight(), Some(0));

        assert_eq!(nav.handle_key(Key::Up, ctx(3)), vec![NavCommand::ScheduleArrow]);
        nav.handle_key(Key::Up, ctx(3));
        assert_eq!(nav.fire_arrow(ctx(3)), vec![NavCommand::Highlight(1)]);

        let cmds = nav.handle_key(Key::Enter, ctx(3));
        assert_eq!(
            cmds,
            vec![
                NavCommand::SelectIndex(1),
                NavCommand::SetListVisible(Some(false))
            ]
        );
    }

    #[test]
    fn test_enter_flushes_pending_delta() {
        let mut nav = Navigator::new();
        nav.set_list_visible(Some(true), Some(2));
        nav.handle_key(Key::Down, ctx(4));
        let cmds = nav.handle_key(Key::Enter, ctx(4));
        assert_eq!(cmds[0], NavCommand::CancelArrow);
        assert_eq!(cmds[1], NavCommand::SelectIndex(3));
    }

    #[test]
    fn test_escape_closes_list_then_fullscreen() {
        let mut nav = Navigator::new();
        nav.set_fullscreen(true);
        nav.set_list_visible(Some(true), None);
        assert_eq!(
            nav.handle_key(Key::Escape, ctx(2)),
            vec![NavCommand::SetListVisible(Some(false))]
        );
        nav.set_list_visible(Some(false), None);
        assert_eq!(
            nav.handle_key(Key::Escape, ctx(2)),
            vec![NavCommand::SetFullscreen(false)]
        );
    }

    #[test]
    fn test_highlight_clamped_after_shrink() {
        let mut nav = Navigator::new();
        nav.set_list_visible(Some(true), Some(7));
        nav.reset_for_list(3);
        assert_eq!(nav.highlight(), Some(2));
    }
}
