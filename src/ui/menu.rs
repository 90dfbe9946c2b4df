#[cfg(any(target_os = "windows", target_os = "macos"))]
use anyhow::Result;
#[cfg(any(target_os = "windows", target_os = "macos"))]
use tray_icon::menu::{Menu, MenuItem, PredefinedMenuItem};

use crate::model::{MenuAction, TodoSummary};

const MENU_ID_SHOW_MAIN: &str = "show_main";
const MENU_ID_QUIT: &str = "quit";

#[cfg(any(target_os = "windows", target_os = "macos"))]
pub fn build_menu() -> Result<Menu> {
    let menu = Menu::new();
    let show_item = MenuItem::with_id(MENU_ID_SHOW_MAIN, "Show Todo List", true, None);
    menu.append(&show_item)?;
    menu.append(&PredefinedMenuItem::separator())?;
    let quit_item = MenuItem::with_id(MENU_ID_QUIT, "Quit", true, None);
    menu.append(&quit_item)?;
    Ok(menu)
}

pub fn parse_menu_action(id: &str) -> Option<MenuAction> {
    match id {
        MENU_ID_SHOW_MAIN => Some(MenuAction::ShowMain),
        MENU_ID_QUIT => Some(MenuAction::Quit),
        _ => None,
    }
}

pub fn build_tooltip(summary: &TodoSummary) -> String {
    if summary.pending == 0 {
        return "Todo Ball: nothing pending".to_string();
    }

    let mut lines = vec![format!("Todo Ball: {} pending", summary.pending)];
    if summary.overdue > 0 {
        lines.push(format!("⛔ {} overdue", summary.overdue));
    }
    if summary.upcoming > 0 {
        lines.push(format!("⚠️ {} due soon", summary.upcoming));
    }
    lines.join("\n")
}
