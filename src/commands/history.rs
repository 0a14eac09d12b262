use colored::Colorize;
use prettytable::{format, Table};

use crate::session::{HistoryEntry, SessionState};

/// Find the archived session whose id equals or starts with `id`
///
/// An ambiguous prefix matches nothing.
pub fn find_entry<'a>(state: &'a SessionState, id: &str) -> Option<&'a HistoryEntry> {
    if let Some(entry) = state.history_entry(id) {
        return Some(entry);
    }
    let mut matches = state.history.iter().filter(|e| e.id.starts_with(id));
    match (matches.next(), matches.next()) {
        (Some(entry), None) => Some(entry),
        _ => None,
    }
}

/// Print the archived sessions, newest first
pub fn print_history(state: &SessionState) {
    if state.history.is_empty() {
        println!("{}", "No archived sessions yet.".yellow());
        return;
    }

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);

    table.add_row(prettytable::row![
        "ID".bold(),
        "Question".bold(),
        "Messages".bold(),
        "Last Updated".bold()
    ]);

    for entry in state.history.iter().rev() {
        let id_short: String = entry.id.chars().take(8).collect();
        let label = truncate(&entry.input, 40);
        let updated = entry.timestamp.format("%Y-%m-%d %H:%M").to_string();

        table.add_row(prettytable::row![
            id_short.cyan(),
            label,
            entry.messages.len(),
            updated
        ]);
    }

    println!("\nArchived Sessions:");
    table.printstd();
    println!();
    println!("Use {} to reopen a session.", "/open <ID>".cyan());
    println!();
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let head: String = text.chars().take(max - 3).collect();
        format!("{}...", head)
    } else if text.is_empty() {
        "-".to_string()
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Action, Message, SessionStore};

    fn archived(ids: &[&str]) -> SessionState {
        let store = SessionStore::new();
        for id in ids {
            store.dispatch(Action::SetMessages(vec![
                Message::user(format!("question {}", id)),
                Message::user("reply"),
            ]));
            store.archive_session(id);
        }
        store.snapshot()
    }

    #[test]
    fn test_find_entry_by_prefix() {
        let state = archived(&["abc-123", "def-456"]);
        assert_eq!(find_entry(&state, "abc").unwrap().id, "abc-123");
        assert_eq!(find_entry(&state, "def-456").unwrap().id, "def-456");
        assert!(find_entry(&state, "zzz").is_none());
    }

    #[test]
    fn test_ambiguous_prefix_matches_nothing() {
        let state = archived(&["abc-1", "abc-2"]);
        assert!(find_entry(&state, "abc").is_none());
        assert!(find_entry(&state, "abc-2").is_some());
    }

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(truncate("héllo", 40), "héllo");
        assert_eq!(truncate("", 40), "-");
        let long = "é".repeat(50);
        assert_eq!(truncate(&long, 10).chars().count(), 10);
    }
}
