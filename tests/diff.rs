use findsuite::config::CompareSettings;
use findsuite::diff::{DiffDispatcher, DiffInvocation, DiffKind};
use findsuite::error::FindError;

mod common;
use common::{RecordingDiffView, RecordingLauncher};

fn dispatcher(settings: CompareSettings) -> (DiffDispatcher, RecordingDiffView, RecordingLauncher) {
    let view = RecordingDiffView::default();
    let launcher = RecordingLauncher::default();
    let d = DiffDispatcher::new(settings, Box::new(view.clone()), Box::new(launcher.clone()));
    (d, view, launcher)
}

fn external() -> CompareSettings {
    CompareSettings {
        external_enabled: true,
        external_program: "/opt/bc/bcompare".into(),
        external_option: "-fv".into(),
    }
}

fn paths(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn three_selected_items_are_rejected() {
    let (mut d, view, launcher) = dispatcher(external());
    let err = d
        .diff_pair(&paths(&["/a", "/b", "/c"]), DiffKind::File)
        .unwrap_err();
    assert!(matches!(err, FindError::Validation(_)));
    assert!(view.0.borrow().is_empty());
    assert!(launcher.0.borrow().is_empty());
}

#[test]
fn identical_paths_are_rejected() {
    let (mut d, view, _) = dispatcher(CompareSettings::default());
    assert!(matches!(
        d.diff_pair(&paths(&["/same", "/same"]), DiffKind::File),
        Err(FindError::Validation(_))
    ));
    assert!(view.0.borrow().is_empty());
}

#[test]
fn directories_need_an_external_program() {
    let (mut d, view, _) = dispatcher(CompareSettings::default());
    assert!(matches!(
        d.diff_pair(&paths(&["/l", "/r"]), DiffKind::Directory),
        Err(FindError::Validation(_))
    ));
    assert!(view.0.borrow().is_empty());

    let disabled = CompareSettings {
        external_enabled: false,
        ..external()
    };
    let (mut d, _, launcher) = dispatcher(disabled);
    assert!(d.diff_pair(&paths(&["/l", "/r"]), DiffKind::Directory).is_err());
    assert!(launcher.0.borrow().is_empty());
}

#[test]
fn files_use_in_process_view_without_external_program() {
    let (mut d, view, launcher) = dispatcher(CompareSettings::default());
    let out = d.diff_pair(&paths(&["/l.rs", "/r.rs"]), DiffKind::File).unwrap();
    assert_eq!(
        out,
        DiffInvocation::InProcess {
            left: "/l.rs".into(),
            right: "/r.rs".into()
        }
    );
    assert_eq!(view.0.borrow().len(), 1);
    assert!(launcher.0.borrow().is_empty());
}

#[cfg(not(windows))]
#[test]
fn external_command_quotes_both_paths() {
    let (mut d, view, launcher) = dispatcher(external());
    let out = d
        .diff_pair(&paths(&["/my docs/a.txt", "/b.txt"]), DiffKind::Directory)
        .unwrap();
    let expected = "/opt/bc/bcompare -fv '/my docs/a.txt' /b.txt";
    assert_eq!(out, DiffInvocation::External(expected.into()));
    assert_eq!(launcher.0.borrow().as_slice(), &[expected.to_string()]);
    assert!(view.0.borrow().is_empty());
}

#[test]
fn sequence_pairs_in_order_and_ignores_odd_item() {
    let (mut d, view, _) = dispatcher(CompareSettings::default());
    let out = d
        .diff_sequence(&paths(&["/1", "/2", "/3", "/4", "/5"]), DiffKind::File)
        .unwrap();
    assert_eq!(out.len(), 2);
    let shown = view.0.borrow();
    assert_eq!(shown[0].0.to_str(), Some("/1"));
    assert_eq!(shown[1].1.to_str(), Some("/4"));
}

#[test]
fn sequence_validates_before_running_any_pair() {
    let (mut d, view, _) = dispatcher(CompareSettings::default());
    assert!(d
        .diff_sequence(&paths(&["/1", "/2", "/3", "/3"]), DiffKind::File)
        .is_err());
    assert!(view.0.borrow().is_empty());
}
