//! Keyboard and mouse routing. `route_key_down` encodes the key table and
//! reports whether the event was consumed; unconsumed keys fall through to
//! the default-edit pass, which plays the role the browser's native input
//! editing plays for a DOM widget (char insertion, deletion, caret movement).
//! `route_key_up` re-issues the pattern search so it always sees the text
//! *after* the edit, mirroring the keydown/keyup split of the interaction
//! contract; terminals deliver one press event, so the event loop runs all
//! three passes per key.

use crate::composer::Composer;
use crate::ui::Regions;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};

/// Mode-aware key table. Returns true when the default edit pass must be
/// suppressed (list navigation and commit/cancel actions).
pub fn route_key_down(composer: &mut Composer, key: KeyEvent) -> bool {
    match key.code {
        KeyCode::Enter => {
            // In the pattern list, Enter locks the highlighted pattern.
            if composer.is_pattern_list() && composer.lock_highlighted() {
                true
            } else if composer.is_pattern_locked() {
                composer.submit_question();
                true
            } else {
                false
            }
        }

        KeyCode::Right => {
            // Right commits like Enter while the list is showing; otherwise
            // it is caret movement for the focused input.
            if composer.is_pattern_list() && composer.lock_highlighted() {
                true
            } else {
                composer.request_redraw();
                false
            }
        }

        KeyCode::Backspace => {
            if composer.is_pattern_list() {
                // Unhighlight, but let the character delete and the key-up
                // pass re-issue the search.
                composer.unhighlight();
                false
            } else if composer.is_pattern_locked() && composer.entity_cursor_at_start() {
                if composer.active_is_first_entity() {
                    composer.cancel_pattern();
                } else {
                    composer.focus_prev_entity();
                }
                true
            } else {
                false
            }
        }

        KeyCode::Esc => {
            if composer.is_pattern_list() {
                composer.unhighlight();
                true
            } else if composer.is_pattern_locked() {
                composer.cancel_pattern();
                true
            } else {
                false
            }
        }

        KeyCode::Left => {
            if composer.is_pattern_list() && composer.highlighted().is_some() {
                composer.unhighlight();
                true
            } else {
                composer.request_redraw();
                false
            }
        }

        KeyCode::Up => {
            if composer.is_pattern_list() {
                composer.highlight_prev();
                true
            } else {
                false
            }
        }

        KeyCode::Down => {
            if composer.is_pattern_list() {
                composer.highlight_next();
                true
            } else {
                false
            }
        }

        KeyCode::Tab => {
            if composer.is_pattern_locked() {
                composer.focus_next_entity();
                true
            } else {
                false
            }
        }

        KeyCode::BackTab => {
            if composer.is_pattern_locked() {
                composer.focus_prev_entity();
                true
            } else {
                false
            }
        }

        _ => {
            // Plain typing never transitions state on key-down; a locked
            // pattern still redraws so the live width and caret track it.
            if composer.is_pattern_locked() {
                composer.request_redraw();
            }
            false
        }
    }
}

/// Apply the edit an unconsumed key implies to whichever input has focus.
pub fn apply_default_edit(composer: &mut Composer, key: KeyEvent) {
    match key.code {
        KeyCode::Char(ch) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            if composer.is_pattern_locked() {
                composer.insert_entity_char(ch);
            } else {
                composer.push_input_char(ch);
            }
        }
        KeyCode::Backspace => {
            if composer.is_pattern_locked() {
                composer.backspace_entity();
            } else {
                composer.backspace_input();
            }
        }
        KeyCode::Left => {
            if composer.is_pattern_locked() {
                composer.move_entity_cursor_left();
            }
        }
        KeyCode::Right => {
            if composer.is_pattern_locked() {
                composer.move_entity_cursor_right();
            }
        }
        _ => {}
    }
}

/// Key-up pass: anything that is not navigation or commit re-issues the
/// pattern search, so the search always sees the post-edit text.
pub fn route_key_up(composer: &mut Composer, key: KeyEvent) {
    match key.code {
        KeyCode::Enter
        | KeyCode::Esc
        | KeyCode::Left
        | KeyCode::Right
        | KeyCode::Up
        | KeyCode::Down => {}
        _ => {
            if !composer.is_pattern_locked() {
                composer.refresh_patterns();
            }
        }
    }
}

/// Run the full routing sequence for one terminal key event.
pub fn handle_key(composer: &mut Composer, key: KeyEvent) {
    let consumed = route_key_down(composer, key);
    if !consumed {
        apply_default_edit(composer, key);
    }
    route_key_up(composer, key);
}

/// Mouse routing against the regions the renderer laid out: clicking a
/// pattern row commits it, moving over a row highlights it.
pub fn route_mouse(composer: &mut Composer, mouse: MouseEvent, regions: &Regions) {
    match mouse.kind {
        MouseEventKind::Down(MouseButton::Left) => {
            if let Some(index) = regions.pattern_row_at(mouse.column, mouse.row) {
                composer.lock_index(index);
            }
        }
        MouseEventKind::Moved => {
            if let Some(index) = regions.pattern_row_at(mouse.column, mouse.row) {
                composer.highlight_index(index);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composer::Mode;
    use crate::config::WidgetConfig;
    use crate::lookup::{set_pattern_fetch_hook, PatternFetchHook};
    use crate::pattern::Segment;
    use crate::types::{EntityType, TypeRegistry};
    use clap::Parser;
    use ratatui::layout::Rect;
    use std::collections::HashMap;
    use std::sync::{Mutex, OnceLock};
    use std::thread;
    use std::time::Duration;

    static TEST_HOOK_GUARD: OnceLock<Mutex<()>> = OnceLock::new();

    fn with_pattern_hook<R>(hook: PatternFetchHook, f: impl FnOnce() -> R) -> R {
        let _guard = TEST_HOOK_GUARD
            .get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(|e| e.into_inner());

        set_pattern_fetch_hook(Some(hook));

        struct Reset;
        impl Drop for Reset {
            fn drop(&mut self) {
                set_pattern_fetch_hook(None);
            }
        }
        let _reset = Reset; // clears hook even if f() panics

        f()
    }

    fn test_composer() -> Composer {
        let config = WidgetConfig::parse_from(["test-widget"]);
        let mut composer = Composer::new(&config).expect("composer builds");
        let mut map = HashMap::new();
        map.insert(
            "date".to_string(),
            EntityType {
                code: "date".to_string(),
                display_name: "Date".to_string(),
                validation: crate::types::PERMISSIVE_VALIDATION.to_string(),
                description: String::new(),
            },
        );
        composer.set_registry(TypeRegistry::from_map(map));
        composer
    }

    fn seed_results(composer: &mut Composer, patterns: &[&str]) {
        composer.apply_pattern_outcome(0, Ok(patterns.iter().map(|p| p.to_string()).collect()));
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::empty())
    }

    fn wait_for_patterns(composer: &mut Composer) {
        for _ in 0..100 {
            composer.poll_jobs();
            if !composer.is_loading() {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("pattern search did not resolve in time");
    }

    #[test]
    fn down_and_up_are_consumed_in_the_list() {
        let mut composer = test_composer();
        seed_results(&mut composer, &["a", "b"]);
        assert!(route_key_down(&mut composer, key(KeyCode::Down)));
        assert_eq!(composer.highlighted(), Some(0));
        assert!(route_key_down(&mut composer, key(KeyCode::Up)));
        assert_eq!(composer.highlighted(), None);
    }

    #[test]
    fn arrows_are_not_consumed_outside_the_list() {
        let mut composer = test_composer();
        assert!(!route_key_down(&mut composer, key(KeyCode::Down)));
        assert!(!route_key_down(&mut composer, key(KeyCode::Up)));
        assert!(!route_key_down(&mut composer, key(KeyCode::Left)));
    }

    #[test]
    fn enter_locks_the_highlighted_pattern() {
        let mut composer = test_composer();
        seed_results(&mut composer, &["when is {date}", "other {date}"]);
        handle_key(&mut composer, key(KeyCode::Down));
        assert!(route_key_down(&mut composer, key(KeyCode::Enter)));
        assert_eq!(composer.mode(), Mode::Locked);
        assert_eq!(composer.locked_pattern(), Some("when is {date}"));
    }

    #[test]
    fn right_commits_like_enter_in_the_list() {
        let mut composer = test_composer();
        seed_results(&mut composer, &["when is {date}", "other {date}"]);
        handle_key(&mut composer, key(KeyCode::Down));
        assert!(route_key_down(&mut composer, key(KeyCode::Right)));
        assert_eq!(composer.mode(), Mode::Locked);
    }

    #[test]
    fn left_unhighlights_without_leaving_the_search() {
        let mut composer = test_composer();
        seed_results(&mut composer, &["a", "b"]);
        handle_key(&mut composer, key(KeyCode::Down));
        assert!(route_key_down(&mut composer, key(KeyCode::Left)));
        assert_eq!(composer.highlighted(), None);
        assert_eq!(composer.mode(), Mode::Searching);
    }

    #[test]
    fn escape_unhighlights_in_search_and_cancels_a_lock() {
        let mut composer = test_composer();
        seed_results(&mut composer, &["a"]);
        handle_key(&mut composer, key(KeyCode::Down));
        assert!(route_key_down(&mut composer, key(KeyCode::Esc)));
        assert_eq!(composer.mode(), Mode::Searching);
        assert_eq!(composer.highlighted(), None);

        composer.lock_pattern("when is {date}");
        assert!(route_key_down(&mut composer, key(KeyCode::Esc)));
        assert_eq!(composer.mode(), Mode::Free);
    }

    #[test]
    fn backspace_at_start_of_first_input_cancels_the_pattern() {
        let mut composer = test_composer();
        composer.lock_pattern("when is {date}");
        assert!(route_key_down(&mut composer, key(KeyCode::Backspace)));
        assert_eq!(composer.mode(), Mode::Free);
    }

    #[test]
    fn backspace_at_start_of_a_later_input_refocuses_the_previous_one() {
        let mut composer = test_composer();
        composer.lock_pattern("{date} to {date}");
        composer.focus_next_entity();
        assert!(route_key_down(&mut composer, key(KeyCode::Backspace)));
        assert_eq!(composer.mode(), Mode::Locked);
        assert_eq!(composer.active_entity(), Some(1));
    }

    #[test]
    fn backspace_mid_value_deletes_instead_of_canceling() {
        let mut composer = test_composer();
        composer.lock_pattern("when is {date}");
        handle_key(&mut composer, key(KeyCode::Char('x')));
        handle_key(&mut composer, key(KeyCode::Backspace));
        assert_eq!(composer.mode(), Mode::Locked);
        assert_eq!(composer.active_entity_value(), Some(""));
    }

    #[test]
    fn enter_while_locked_submits_the_question() {
        let mut composer = test_composer();
        composer.lock_pattern("when is {date}");
        assert!(route_key_down(&mut composer, key(KeyCode::Enter)));
        assert_eq!(composer.mode(), Mode::Locked);
        assert!(composer.is_loading(), "the answer request is inflight");
    }

    #[test]
    fn tab_cycles_entity_focus_while_locked() {
        let mut composer = test_composer();
        composer.lock_pattern("{date} to {date}");
        assert!(route_key_down(&mut composer, key(KeyCode::Tab)));
        assert_eq!(composer.active_entity(), Some(3));
        assert!(route_key_down(&mut composer, key(KeyCode::BackTab)));
        assert_eq!(composer.active_entity(), Some(1));
        // Outside a lock, Tab passes through.
        composer.cancel_pattern();
        assert!(!route_key_down(&mut composer, key(KeyCode::Tab)));
    }

    #[test]
    fn typing_in_free_mode_edits_the_text_and_issues_a_search() {
        let mut composer = test_composer();
        handle_key(&mut composer, key(KeyCode::Char('a')));
        assert_eq!(composer.raw_text(), "a");
        assert!(composer.is_loading(), "key-up must issue the search");
    }

    #[test]
    fn typing_while_locked_edits_the_focused_segment() {
        let mut composer = test_composer();
        composer.lock_pattern("when is {date}");
        handle_key(&mut composer, key(KeyCode::Char('j')));
        assert_eq!(composer.active_entity_value(), Some("j"));
        assert_eq!(composer.raw_text(), "");
        assert!(!composer.is_loading(), "no search while locked");
    }

    #[test]
    fn mouse_click_commits_and_motion_highlights() {
        let mut composer = test_composer();
        seed_results(&mut composer, &["a {date}", "b {date}"]);
        let regions = Regions {
            question: Rect::new(1, 1, 40, 1),
            status: Rect::new(0, 3, 42, 1),
            pattern_list: Rect::new(1, 5, 40, 5),
            pattern_rows: 2,
        };

        let moved = MouseEvent {
            kind: MouseEventKind::Moved,
            column: 4,
            row: 6,
            modifiers: KeyModifiers::empty(),
        };
        route_mouse(&mut composer, moved, &regions);
        assert_eq!(composer.highlighted(), Some(1));

        let clicked = MouseEvent {
            kind: MouseEventKind::Down(MouseButton::Left),
            column: 4,
            row: 5,
            modifiers: KeyModifiers::empty(),
        };
        route_mouse(&mut composer, clicked, &regions);
        assert_eq!(composer.locked_pattern(), Some("a {date}"));
    }

    #[test]
    fn mouse_outside_the_list_does_nothing() {
        let mut composer = test_composer();
        seed_results(&mut composer, &["a"]);
        let regions = Regions {
            question: Rect::new(1, 1, 40, 1),
            status: Rect::new(0, 3, 42, 1),
            pattern_list: Rect::new(1, 5, 40, 5),
            pattern_rows: 1,
        };
        let clicked = MouseEvent {
            kind: MouseEventKind::Down(MouseButton::Left),
            column: 4,
            row: 9, // below the populated rows
            modifiers: KeyModifiers::empty(),
        };
        route_mouse(&mut composer, clicked, &regions);
        assert_eq!(composer.mode(), Mode::Searching);
    }

    #[test]
    fn locks_pattern_end_to_end_via_keyboard() {
        with_pattern_hook(
            Box::new(|_| Ok(vec!["when is {date}".to_string()])),
            || {
                let mut composer = test_composer();
                for ch in "when is".chars() {
                    handle_key(&mut composer, key(KeyCode::Char(ch)));
                }
                wait_for_patterns(&mut composer);
                assert_eq!(
                    composer.pattern_results(),
                    Some(["when is {date}".to_string()].as_slice())
                );

                handle_key(&mut composer, key(KeyCode::Down));
                assert_eq!(composer.highlighted(), Some(0));
                handle_key(&mut composer, key(KeyCode::Enter));

                assert_eq!(composer.mode(), Mode::Locked);
                assert_eq!(composer.segments().len(), 3);
                assert_eq!(composer.segments()[0], Segment::Text("when is ".into()));
                match &composer.segments()[1] {
                    Segment::Entity { ty, value } => {
                        assert_eq!(ty.display_name, "Date");
                        assert!(value.is_empty());
                    }
                    other => panic!("expected entity segment, got {other:?}"),
                }
                assert_eq!(composer.active_entity(), Some(1));
                assert_eq!(composer.entity_cursor(), 0);
            },
        );
    }
}
