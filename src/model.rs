use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Behavioural mode of a process, fixed at startup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProcessRole {
    Main,
    Ball,
}

impl ProcessRole {
    /// Parses the role selector. Anything other than `ball` means `main`.
    pub fn from_arg(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("ball") {
            ProcessRole::Ball
        } else {
            ProcessRole::Main
        }
    }

    /// Reads `--mode <role>`, `-mode <role>`, `--mode=<role>` or a bare role word.
    /// The first element is expected to be the program name.
    pub fn from_args<I>(args: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = args.into_iter().skip(1);
        while let Some(arg) = args.next() {
            if arg == "--mode" || arg == "-mode" {
                return args
                    .next()
                    .map(|v| Self::from_arg(&v))
                    .unwrap_or(ProcessRole::Main);
            }
            if let Some(value) = arg
                .strip_prefix("--mode=")
                .or_else(|| arg.strip_prefix("-mode="))
            {
                return Self::from_arg(value);
            }
            if arg.eq_ignore_ascii_case("ball") || arg.eq_ignore_ascii_case("main") {
                return Self::from_arg(&arg);
            }
        }
        ProcessRole::Main
    }

    pub fn as_arg(self) -> &'static str {
        match self {
            ProcessRole::Main => "main",
            ProcessRole::Ball => "ball",
        }
    }

    pub fn peer(self) -> Self {
        match self {
            ProcessRole::Main => ProcessRole::Ball,
            ProcessRole::Ball => ProcessRole::Main,
        }
    }

    /// Title used to locate this role's top-level window from either process.
    pub fn window_title(self) -> &'static str {
        match self {
            ProcessRole::Main => "Todo List",
            ProcessRole::Ball => "Todo Ball",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DockSide {
    Left,
    Right,
}

impl DockSide {
    pub fn as_str(self) -> &'static str {
        match self {
            DockSide::Left => "left",
            DockSide::Right => "right",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DockState {
    #[default]
    Undocked,
    DockedLeft,
    DockedRight,
}

impl DockState {
    pub fn docked(side: DockSide) -> Self {
        match side {
            DockSide::Left => DockState::DockedLeft,
            DockSide::Right => DockState::DockedRight,
        }
    }

    pub fn side(self) -> Option<DockSide> {
        match self {
            DockState::Undocked => None,
            DockState::DockedLeft => Some(DockSide::Left),
            DockState::DockedRight => Some(DockSide::Right),
        }
    }

    /// Wire value sent to the front-end: `none`, `left` or `right`.
    pub fn as_str(self) -> &'static str {
        self.side().map_or("none", DockSide::as_str)
    }
}

/// Integer screen rectangle, edges exclusive on the right/bottom.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn from_origin(left: i32, top: i32, width: i32, height: i32) -> Self {
        Self::new(left, top, left + width, top + height)
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }
}

/// Monitor hosting a window: full bounds and the work area (minus taskbars).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MonitorInfo {
    pub bounds: Rect,
    pub work: Rect,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TodoItem {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Days before the due date at which the todo counts as upcoming.
    #[serde(default)]
    pub reminder_days: u32,
}

impl TodoItem {
    pub fn new(title: String, due_date: Option<DateTime<Utc>>, reminder_days: u32) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title,
            due_date,
            completed: false,
            deleted: false,
            created_at: Utc::now(),
            completed_at: None,
            reminder_days,
        }
    }
}

/// What the floating widget highlights: open todos, and how many need attention.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TodoSummary {
    pub pending: usize,
    pub overdue: usize,
    pub upcoming: usize,
}

impl TodoSummary {
    pub fn from_todos(todos: &[TodoItem], now: DateTime<Utc>) -> Self {
        let mut summary = TodoSummary::default();
        for todo in todos.iter().filter(|t| !t.completed && !t.deleted) {
            summary.pending += 1;
            let Some(due) = todo.due_date else {
                continue;
            };
            let remaining = due - now;
            if remaining < chrono::Duration::zero() {
                summary.overdue += 1;
            } else if remaining <= chrono::Duration::days(i64::from(todo.reminder_days)) {
                summary.upcoming += 1;
            }
        }
        summary
    }

    pub fn is_urgent(&self) -> bool {
        self.overdue > 0 || self.upcoming > 0
    }
}

/// Notification pushed from the core to the UI layer.
#[derive(Clone, Debug, PartialEq)]
pub enum AppEvent {
    DataChanged,
    DockStateChanged(DockState),
    /// The peer raised the shared quit signal.
    QuitObserved,
    /// The local window should go away now (coordinated quit in progress).
    ExitRequested,
    ShowMainWindow,
    ResizeMainWindow { width: u32, height: u32 },
}

impl AppEvent {
    /// Event name as seen by the front-end.
    pub fn name(&self) -> &'static str {
        match self {
            AppEvent::DataChanged => "todos_updated",
            AppEvent::DockStateChanged(_) => "dock_state_change",
            AppEvent::QuitObserved => "quit_observed",
            AppEvent::ExitRequested => "exit_requested",
            AppEvent::ShowMainWindow => "show_main",
            AppEvent::ResizeMainWindow { .. } => "resize_main",
        }
    }
}

#[derive(Clone, Debug)]
pub enum UserEvent {
    App(AppEvent),
    MenuAction(MenuAction),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MenuAction {
    ShowMain,
    Quit,
}

/// Answer to an external window-close request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseDecision {
    Allow,
    Suppress,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn role_selector_defaults_to_main() {
        assert_eq!(ProcessRole::from_args(args(&["todoball"])), ProcessRole::Main);
        assert_eq!(
            ProcessRole::from_args(args(&["todoball", "--mode", "widget"])),
            ProcessRole::Main
        );
        assert_eq!(ProcessRole::from_args(args(&["todoball", "--mode"])), ProcessRole::Main);
    }

    #[test]
    fn role_selector_forms() {
        assert_eq!(
            ProcessRole::from_args(args(&["todoball", "-mode", "ball"])),
            ProcessRole::Ball
        );
        assert_eq!(
            ProcessRole::from_args(args(&["todoball", "--mode=BALL"])),
            ProcessRole::Ball
        );
        assert_eq!(ProcessRole::from_args(args(&["todoball", "ball"])), ProcessRole::Ball);
        assert_eq!(ProcessRole::Ball.peer(), ProcessRole::Main);
    }

    #[test]
    fn dock_state_wire_names() {
        assert_eq!(DockState::Undocked.as_str(), "none");
        assert_eq!(DockState::docked(DockSide::Left).as_str(), "left");
        assert_eq!(DockState::DockedRight.side(), Some(DockSide::Right));
    }

    #[test]
    fn summary_counts_overdue_and_upcoming() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let mut overdue = TodoItem::new("late".into(), Some(now - chrono::Duration::hours(1)), 0);
        overdue.id = "a".into();
        let upcoming = TodoItem::new("soon".into(), Some(now + chrono::Duration::days(1)), 2);
        let later = TodoItem::new("later".into(), Some(now + chrono::Duration::days(10)), 2);
        let undated = TodoItem::new("whenever".into(), None, 0);
        let mut done = TodoItem::new("done".into(), Some(now - chrono::Duration::days(3)), 0);
        done.completed = true;

        let summary =
            TodoSummary::from_todos(&[overdue, upcoming, later, undated, done], now);
        assert_eq!(
            summary,
            TodoSummary {
                pending: 4,
                overdue: 1,
                upcoming: 1
            }
        );
        assert!(summary.is_urgent());
    }

    #[test]
    fn todo_record_reads_legacy_fields() {
        let json = r#"{"id":"1717","title":"Buy milk","due_date":"2024-06-01T00:00:00Z",
            "completed":false,"deleted":false,"created_at":"2024-05-30T10:00:00Z","reminder_days":2}"#;
        let todo: TodoItem = serde_json::from_str(json).unwrap();
        assert_eq!(todo.title, "Buy milk");
        assert_eq!(todo.reminder_days, 2);
        assert!(todo.completed_at.is_none());
    }
}
