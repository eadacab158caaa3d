use findsuite::config::Settings;
use findsuite::decoration::{RevealTarget, SelectionManager, ThemeColors, ThemeKind};
use findsuite::host::Range;

mod common;
use common::FakeEditor;

fn manager(editor: &FakeEditor) -> SelectionManager {
    let settings = Settings::default();
    SelectionManager::new(
        Box::new(editor.clone()),
        ThemeColors::from_settings(&settings.rg),
        ThemeKind::Dark,
    )
}

#[test]
fn browsing_keeps_a_single_highlight() {
    let editor = FakeEditor::default();
    let mut selection = manager(&editor);
    for line in 1..=10 {
        let record = common::record(&format!("/src/f{}.rs", line % 3), line, 4, 9);
        selection.preview(&RevealTarget::from(&record)).unwrap();
        assert_eq!(editor.0.borrow().live_highlights(), 1);
    }
    let (_, range) = selection.active_highlight().unwrap();
    assert_eq!(range, Range::on_line(9, 4, 9));
    assert_eq!(editor.0.borrow().opened.len(), 3);
}

#[test]
fn match_columns_become_zero_based_range() {
    let editor = FakeEditor::default();
    let mut selection = manager(&editor);
    let record = common::record("/a/b.ts", 3, 4, 7);
    selection.preview(&RevealTarget::from(&record)).unwrap();
    let state = editor.0.borrow();
    assert_eq!(state.selection, Some(Range::on_line(2, 4, 7)));
    assert_eq!(state.revealed.last(), Some(&Range::on_line(2, 4, 7)));
}

#[test]
fn accepting_does_not_leave_a_highlight() {
    let editor = FakeEditor::default();
    let mut selection = manager(&editor);
    let target = RevealTarget::from(&common::record("/x.rs", 2, 0, 1));
    selection.preview(&target).unwrap();
    selection.open_and_reveal(&target, None).unwrap();
    assert_eq!(editor.0.borrow().live_highlights(), 0);
    assert!(selection.active_highlight().is_none());
}

#[test]
fn theme_change_repaints_current_highlight() {
    let editor = FakeEditor::default();
    let mut selection = manager(&editor);
    assert_eq!(selection.color(), "#ffa500");
    selection
        .preview(&RevealTarget::from(&common::record("/x.rs", 5, 1, 2)))
        .unwrap();
    let before = editor.0.borrow().disposed.len();

    selection.set_theme(ThemeKind::Light);
    assert_eq!(selection.color(), "#ff1b51");
    let state = editor.0.borrow();
    assert_eq!(state.disposed.len(), before + 1);
    assert_eq!(state.live_highlights(), 1);
    drop(state);
    assert_eq!(selection.active_highlight().unwrap().1, Range::on_line(4, 1, 2));

    // 同一主题不重绘
    selection.set_theme(ThemeKind::Light);
    assert_eq!(editor.0.borrow().disposed.len(), before + 1);
}

#[test]
fn clear_and_drop_release_the_handle() {
    let editor = FakeEditor::default();
    {
        let mut selection = manager(&editor);
        selection
            .preview(&RevealTarget::from(&common::record("/x.rs", 1, 0, 1)))
            .unwrap();
        selection.clear();
        assert_eq!(editor.0.borrow().live_highlights(), 0);
        selection
            .preview(&RevealTarget::from(&common::record("/y.rs", 1, 0, 1)))
            .unwrap();
    }
    assert_eq!(editor.0.borrow().live_highlights(), 0);
}
