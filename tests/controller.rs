use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use findsuite::config::Settings;
use findsuite::controller::{
    ItemButton, Listing, PickerController, PickerEvent, QuerySource, Scrollback, SessionState, StaticSource,
    Step,
};
use findsuite::error::FindError;
use findsuite::host::Range;
use findsuite::types::{group_by_file, EntryType, IndexEntry, ListEntry, MatchRecord, SearchOutcome};

mod common;
use common::{Host, RecordingPicker, ScriptedSource};

const TIMEOUT: Duration = Duration::from_secs(5);

fn listing(value: &str, records: Vec<MatchRecord>) -> Listing {
    let outcome = SearchOutcome {
        total: records.len(),
        matches: records.len(),
        records,
        ..Default::default()
    };
    Listing {
        entries: group_by_file(&outcome.records),
        title: format!("Scripted <{}>", value),
        outcome: Some(outcome),
    }
}

fn query_ticket(step: Step) -> u64 {
    match step {
        Step::Query(ticket) => ticket.generation,
        other => panic!("expected query, got {:?}", other),
    }
}

fn press(c: &mut PickerController<'_>, index: usize, button: ItemButton, view: &mut RecordingPicker) {
    c.handle(PickerEvent::TriggerButton { index, button }, view);
}

#[tokio::test]
async fn slow_earlier_response_never_replaces_newer_one() {
    let dir = tempfile::tempdir().unwrap();
    let host = Host::default();
    let mut bench = common::workbench(dir.path(), &Settings::default(), &host);
    let source = ScriptedSource::new(vec![common::record("/a.rs", 1, 0, 1)])
        .delay("a", Duration::from_millis(300))
        .delay("ab", Duration::from_millis(10));
    let controller = PickerController::new(&mut bench, common::shared(source), Scrollback::default(), TIMEOUT);

    let (tx, rx) = mpsc::unbounded_channel();
    tx.send(PickerEvent::ChangeValue("a".into())).unwrap();
    tx.send(PickerEvent::ChangeValue("ab".into())).unwrap();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        let _ = tx.send(PickerEvent::Hide);
    });

    let mut view = RecordingPicker::default();
    let end = controller.run(&mut view, rx, None).await;

    assert_eq!(end.state, SessionState::Cancelled);
    assert_eq!(view.titles.last().map(String::as_str), Some("Scripted <ab>"));
    assert!(!view.titles.iter().any(|t| t == "Scripted <a>"));
    let recorded: Vec<String> = bench.history.list().iter().map(|e| e.query.clone()).collect();
    assert_eq!(recorded, vec!["ab".to_string()]);
}

#[tokio::test]
async fn expired_query_is_reported_as_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let host = Host::default();
    let mut bench = common::workbench(dir.path(), &Settings::default(), &host);
    let source = ScriptedSource::new(vec![]).delay("slow", Duration::from_millis(300));
    let controller = PickerController::new(
        &mut bench,
        common::shared(source),
        Scrollback::default(),
        Duration::from_millis(50),
    );

    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let _ = tx.send(PickerEvent::Hide);
    });
    let mut view = RecordingPicker::default();
    controller.run(&mut view, rx, Some("slow".into())).await;

    assert_eq!(view.values, vec!["slow".to_string()]);
    assert!(host.notifier.messages.borrow().iter().any(|m| m.contains("50 ms")));
    assert!(!view.busy);
}

#[test]
fn accept_opens_selected_match_and_records_history() {
    let dir = tempfile::tempdir().unwrap();
    let host = Host::default();
    let mut bench = common::workbench(dir.path(), &Settings::default(), &host);
    let records = vec![common::record("/a.rs", 3, 4, 7), common::record("/b.rs", 1, 0, 2)];
    let mut view = RecordingPicker::default();
    {
        let source = common::shared(ScriptedSource::new(records.clone()));
        let mut controller = PickerController::new(&mut bench, source, Scrollback::default(), TIMEOUT);
        let generation = query_ticket(controller.handle(PickerEvent::ChangeValue("value".into()), &mut view));
        controller.complete(generation, Ok(listing("value", records)), &mut view);
        assert_eq!(view.last_items().len(), 3);

        match controller.handle(PickerEvent::Accept(vec![2]), &mut view) {
            Step::Finished(selected) => assert_eq!(selected.len(), 1),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(controller.session().state(), SessionState::Accepted);
        assert_eq!(controller.session().scrollback().rows(), vec![ListEntry::Recent("value".into())]);
    }

    let editor = host.editor.0.borrow();
    assert_eq!(editor.opened.last().and_then(|p| p.to_str()), Some("/b.rs"));
    assert_eq!(editor.selection, Some(Range::on_line(0, 0, 2)));
    assert_eq!(editor.live_highlights(), 0);
    assert_eq!(bench.history.list()[0].query, "value");
    assert_eq!(bench.history.list()[0].total, 2);
}

#[test]
fn browsing_previews_and_hide_clears_highlight() {
    let dir = tempfile::tempdir().unwrap();
    let host = Host::default();
    let mut bench = common::workbench(dir.path(), &Settings::default(), &host);
    let records = vec![common::record("/a.rs", 3, 4, 7), common::record("/b.rs", 1, 0, 2)];
    let mut view = RecordingPicker::default();
    let source = common::shared(ScriptedSource::new(records.clone()));
    let mut controller = PickerController::new(&mut bench, source, Scrollback::default(), TIMEOUT);
    let generation = query_ticket(controller.handle(PickerEvent::ChangeValue("v".into()), &mut view));
    controller.complete(generation, Ok(listing("v", records)), &mut view);

    controller.handle(PickerEvent::ChangeActive(0), &mut view);
    // 分隔行不预览
    controller.handle(PickerEvent::ChangeActive(1), &mut view);
    controller.handle(PickerEvent::ChangeActive(2), &mut view);
    assert_eq!(host.editor.0.borrow().live_highlights(), 1);
    assert_eq!(host.editor.0.borrow().opened.len(), 2);

    assert!(matches!(
        controller.handle(PickerEvent::Hide, &mut view),
        Step::Finished(ref s) if s.is_empty()
    ));
    assert_eq!(host.editor.0.borrow().live_highlights(), 0);
    assert_eq!(controller.session().state(), SessionState::Cancelled);
}

#[test]
fn item_buttons_copy_append_and_favorite() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.rs");
    let b = dir.path().join("b.rs");
    std::fs::write(&a, "a").unwrap();
    std::fs::write(&b, "b").unwrap();
    let a = a.to_string_lossy().to_string();
    let b = b.to_string_lossy().to_string();

    let host = Host::default();
    let mut bench = common::workbench(dir.path(), &Settings::default(), &host);
    let records = vec![common::record(&a, 1, 0, 1), common::record(&b, 2, 0, 1)];
    let mut view = RecordingPicker::default();
    {
        let source = common::shared(ScriptedSource::new(records.clone()));
        let mut controller = PickerController::new(&mut bench, source, Scrollback::default(), TIMEOUT);
        let generation = query_ticket(controller.handle(PickerEvent::ChangeValue("v".into()), &mut view));
        controller.complete(generation, Ok(listing("v", records)), &mut view);

        press(&mut controller, 0, ItemButton::CopyPath, &mut view);
        assert_eq!(*host.clipboard.0.borrow(), a);
        press(&mut controller, 2, ItemButton::AppendPath, &mut view);
        assert_eq!(*host.clipboard.0.borrow(), format!("{}\n{}", a, b));

        press(&mut controller, 2, ItemButton::Favorite, &mut view);
        press(&mut controller, 2, ItemButton::Favorite, &mut view);
        // 分隔行没有按钮
        press(&mut controller, 1, ItemButton::CopyPath, &mut view);
    }
    assert_eq!(bench.favorites.paths(), vec![b.clone()]);
    let messages = host.notifier.messages.borrow();
    assert!(messages.iter().any(|m| m == &format!("已收藏 {}", b)));
    assert!(messages.last().map(|m| m.contains("第 1 项")).unwrap_or(false));
    assert!(host.notifier.errors.borrow().is_empty());
}

#[test]
fn diff_button_compares_two_marked_items() {
    let dir = tempfile::tempdir().unwrap();
    let host = Host::default();
    let mut bench = common::workbench(dir.path(), &Settings::default(), &host);
    let records = vec![common::record("/l.rs", 1, 0, 1), common::record("/r.rs", 1, 0, 1)];
    let mut view = RecordingPicker::default();
    let source = common::shared(ScriptedSource::new(records.clone()));
    let mut controller = PickerController::new(&mut bench, source, Scrollback::default(), TIMEOUT);
    let generation = query_ticket(controller.handle(PickerEvent::ChangeValue("v".into()), &mut view));
    controller.complete(generation, Ok(listing("v", records)), &mut view);

    controller.handle(PickerEvent::TriggerButton { index: 0, button: ItemButton::Diff }, &mut view);
    assert!(host.diff_view.0.borrow().is_empty());
    controller.handle(PickerEvent::TriggerButton { index: 2, button: ItemButton::Diff }, &mut view);

    let shown = host.diff_view.0.borrow();
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].0.to_str(), Some("/l.rs"));
    assert_eq!(shown[0].1.to_str(), Some("/r.rs"));
}

#[test]
fn recent_query_is_recalled() {
    let dir = tempfile::tempdir().unwrap();
    let host = Host::default();
    let mut bench = common::workbench(dir.path(), &Settings::default(), &host);
    let mut scrollback = Scrollback::default();
    scrollback.push("older");
    scrollback.push("newer");
    let source: Arc<dyn QuerySource> = common::shared(ScriptedSource::new(vec![]));
    let mut controller = PickerController::new(&mut bench, source, scrollback, TIMEOUT);
    let mut view = RecordingPicker::default();

    match controller.handle(PickerEvent::Accept(vec![1]), &mut view) {
        Step::Query(ticket) => assert_eq!(ticket.value, "older"),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(view.values, vec!["older".to_string()]);
    assert!(view.busy);
    assert_eq!(controller.session().state(), SessionState::Querying);
}

#[test]
fn history_row_shows_saved_results() {
    let dir = tempfile::tempdir().unwrap();
    let host = Host::default();
    let mut bench = common::workbench(dir.path(), &Settings::default(), &host);
    bench
        .history
        .record(
            "saved",
            vec![common::record("/a.rs", 1, 0, 1), common::record("/b.rs", 1, 0, 1)],
            2,
        )
        .unwrap();
    let rows = bench.history.rows();

    let mut view = RecordingPicker::default();
    let source = common::shared(ScriptedSource::new(vec![]));
    let mut controller = PickerController::new(&mut bench, source, Scrollback::default(), TIMEOUT);
    let generation = query_ticket(controller.handle(PickerEvent::ChangeValue("s".into()), &mut view));
    controller.complete(
        generation,
        Ok(Listing {
            entries: rows,
            title: "History".into(),
            outcome: None,
        }),
        &mut view,
    );

    assert!(matches!(
        controller.handle(PickerEvent::Accept(vec![0]), &mut view),
        Step::Continue
    ));
    assert_eq!(view.titles.last().map(String::as_str), Some("History Details :: <2>"));
    assert_eq!(view.last_items().len(), 3);
    assert_eq!(controller.session().state(), SessionState::Displaying);
}

#[test]
fn cleared_input_ignores_late_result() {
    let dir = tempfile::tempdir().unwrap();
    let host = Host::default();
    let mut bench = common::workbench(dir.path(), &Settings::default(), &host);
    let mut scrollback = Scrollback::default();
    scrollback.push("old");
    let mut view = RecordingPicker::default();
    {
        let source = common::shared(ScriptedSource::new(vec![]));
        let mut controller = PickerController::new(&mut bench, source, scrollback, TIMEOUT);
        let generation = query_ticket(controller.handle(PickerEvent::ChangeValue("a".into()), &mut view));
        assert!(matches!(
            controller.handle(PickerEvent::ChangeValue(String::new()), &mut view),
            Step::Continue
        ));
        assert!(!view.busy);

        controller.complete(
            generation,
            Ok(listing("a", vec![common::record("/a.rs", 1, 0, 1)])),
            &mut view,
        );
        assert_eq!(controller.session().value(), "");
        assert_eq!(controller.session().entries(), &[ListEntry::Recent("old".into())]);
    }
    assert!(bench.history.list().is_empty());
}

#[test]
fn history_keeps_the_query_that_produced_the_results() {
    let dir = tempfile::tempdir().unwrap();
    let host = Host::default();
    let mut bench = common::workbench(dir.path(), &Settings::default(), &host);
    let mut view = RecordingPicker::default();
    {
        let source = common::shared(ScriptedSource::new(vec![]));
        let mut controller = PickerController::new(&mut bench, source, Scrollback::default(), TIMEOUT);
        let a = query_ticket(controller.handle(PickerEvent::ChangeValue("a".into()), &mut view));
        let ab = query_ticket(controller.handle(PickerEvent::ChangeValue("ab".into()), &mut view));
        controller.complete(a, Ok(listing("a", vec![common::record("/only-a.rs", 1, 0, 1)])), &mut view);
        controller.complete(ab, Err(FindError::Timeout(50)), &mut view);
    }
    let recorded: Vec<(String, Vec<String>)> = bench
        .history
        .list()
        .iter()
        .map(|e| (e.query.clone(), e.file_entries.iter().map(|r| r.file_path.clone()).collect()))
        .collect();
    assert_eq!(recorded, vec![("a".to_string(), vec!["/only-a.rs".to_string()])]);
}

#[test]
fn folder_and_file_pair_is_compared_as_directories() {
    let dir = tempfile::tempdir().unwrap();
    let host = Host::default();
    let mut bench = common::workbench(dir.path(), &Settings::default(), &host);
    let mut view = RecordingPicker::default();
    let source = common::shared(ScriptedSource::new(vec![]));
    let mut controller = PickerController::new(&mut bench, source, Scrollback::default(), TIMEOUT);
    let generation = query_ticket(controller.handle(PickerEvent::ChangeValue("v".into()), &mut view));
    controller.complete(
        generation,
        Ok(Listing {
            entries: vec![
                ListEntry::Path(IndexEntry::from_full_path("/proj/src", EntryType::Folder)),
                ListEntry::Path(IndexEntry::from_full_path("/proj/main.rs", EntryType::File)),
            ],
            title: "Paths".into(),
            outcome: None,
        }),
        &mut view,
    );

    press(&mut controller, 0, ItemButton::Diff, &mut view);
    press(&mut controller, 1, ItemButton::Diff, &mut view);

    // 没有外部比较程序时目录不能比较
    assert!(host.diff_view.0.borrow().is_empty());
    assert_eq!(host.notifier.messages.borrow().len(), 2);
}

#[tokio::test]
async fn removed_favorite_does_not_come_back_on_next_keystroke() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["a.rs", "b.rs"] {
        std::fs::write(dir.path().join(name), name).unwrap();
    }
    let host = Host::default();
    let mut bench = common::workbench(dir.path(), &Settings::default(), &host);
    bench.favorites.add(&dir.path().join("a.rs")).unwrap();
    bench.favorites.add(&dir.path().join("b.rs")).unwrap();

    let source: Arc<dyn QuerySource> = Arc::new(StaticSource::new("Favorites", bench.favorites.rows()));
    let mut view = RecordingPicker::default();
    {
        let mut controller = PickerController::new(&mut bench, Arc::clone(&source), Scrollback::default(), TIMEOUT);
        let generation = query_ticket(controller.handle(PickerEvent::ChangeValue("rs".into()), &mut view));
        controller.complete(generation, source.query("rs").await, &mut view);
        assert_eq!(view.last_items().len(), 2);

        press(&mut controller, 0, ItemButton::Remove, &mut view);
        assert_eq!(view.last_items().len(), 1);

        let generation = query_ticket(controller.handle(PickerEvent::ChangeValue("r".into()), &mut view));
        controller.complete(generation, source.query("r").await, &mut view);
        assert_eq!(view.last_items().len(), 1);
    }
    assert_eq!(bench.favorites.paths().len(), 1);
    assert!(host.notifier.errors.borrow().is_empty());
}
