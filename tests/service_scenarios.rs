use chrono::{TimeZone, Utc};
use codex_todo_store::{
    ConfigManager, ErrorKind, FileTodoRepository, NewTodo, OpContext, SectionDefinition, TodoFilter,
    TodoRepository, TodoService, archive_path_for, derive_base_id,
};
use std::fs;
use tempfile::tempdir;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()))
        .with_test_writer()
        .try_init();
}

fn service(dir: &std::path::Path) -> TodoService {
    init_tracing();
    TodoService::new(FileTodoRepository::new(dir))
}

#[test]
fn create_writes_active_file() {
    let dir = tempdir().unwrap();
    let svc = service(dir.path());
    let ctx = OpContext::background();

    let t = svc.create_todo(&ctx, "Valid task description", "high", "feature").unwrap();
    assert_eq!(t.id, "valid-task-description");
    assert_eq!(t.status, "in_progress");
    assert_eq!(t.priority, "high");
    assert_eq!(t.todo_type, "feature");
    assert!(dir.path().join("valid-task-description.md").is_file());
}

#[test]
fn repeated_tasks_get_numbered_ids() {
    let dir = tempdir().unwrap();
    let svc = service(dir.path());
    let ctx = OpContext::background();

    let ids: Vec<_> = (0..4)
        .map(|_| svc.create_todo(&ctx, "Valid task description", "high", "feature").unwrap().id)
        .collect();
    assert_eq!(ids, [
        "valid-task-description",
        "valid-task-description-2",
        "valid-task-description-3",
        "valid-task-description-4",
    ]);
    assert_eq!(svc.list_todos(&ctx, "", "", 0).unwrap().len(), 4);
}

#[test]
fn fresh_service_does_not_overwrite_existing_files() {
    let dir = tempdir().unwrap();
    let ctx = OpContext::background();
    let first = service(dir.path()).create_todo(&ctx, "Same task", "low", "bug").unwrap();
    let second = service(dir.path()).create_todo(&ctx, "Same task", "high", "bug").unwrap();
    assert_eq!(first.id, "same-task");
    assert_eq!(second.id, "same-task-2");

    let unprobed = service(dir.path()).probe_existing_ids(false);
    assert_eq!(unprobed.create_todo(&ctx, "Same task", "medium", "bug").unwrap().id, "same-task");
}

#[test]
fn empty_task_is_rejected() {
    let dir = tempdir().unwrap();
    let svc = service(dir.path());
    let err = svc.create_todo(&OpContext::background(), "", "high", "feature").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(fs::read_dir(dir.path()).unwrap().next().is_none());
}

#[test]
fn blank_priority_and_type_use_defaults() {
    let dir = tempdir().unwrap();
    let svc = service(dir.path());
    let ctx = OpContext::background();
    let t = svc.create_todo(&ctx, "T", "", "").unwrap();
    assert_eq!(t.priority, "medium");
    assert_eq!(t.todo_type, "task");
    assert_eq!(svc.get_todo(&ctx, &t.id).unwrap().todo_type, "task");
}

#[test]
fn archiving_incomplete_todo_fails() {
    let dir = tempdir().unwrap();
    let svc = service(dir.path());
    let ctx = OpContext::background();
    let t = svc.create_todo(&ctx, "Not done yet", "low", "bug").unwrap();
    let err = svc.archive_todo(&ctx, &t.id).unwrap_err();
    assert_eq!(err.to_string(), "cannot archive incomplete todo");
    assert!(err.is_validation());
    assert!(dir.path().join("not-done-yet.md").is_file());
}

#[test]
fn completed_todo_archives_by_start_date() {
    let dir = tempdir().unwrap();
    let svc = service(dir.path());
    let ctx = OpContext::background();
    let mut t = svc.create_todo(&ctx, "Ship release", "high", "feature").unwrap();
    t.started = Utc.with_ymd_and_hms(2025, 1, 15, 8, 0, 0).unwrap();
    svc.repository().save(&ctx, &t).unwrap();

    let done = svc.update_todo_status(&ctx, &t.id, "completed").unwrap();
    assert!(done.is_completed());
    assert!(done.completed.is_some());
    assert_eq!(archive_path_for(&done), "2025/01/15");

    svc.archive_todo(&ctx, &t.id).unwrap();
    assert!(dir.path().join("archive/2025/01/15/ship-release.md").is_file());
    assert!(!dir.path().join("ship-release.md").exists());
    assert!(svc.get_todo(&ctx, &t.id).unwrap_err().is_not_found());
    assert!(svc.list_todos(&ctx, "", "", 0).unwrap().is_empty());
}

#[test]
fn status_update_preserves_everything_else() {
    let dir = tempdir().unwrap();
    let svc = service(dir.path());
    let ctx = OpContext::background();
    let mut req = NewTodo::new("Keep my metadata", "low", "research");
    req.tags = vec!["a".into(), "b".into()];
    let t = svc.create_todo_with(&ctx, req).unwrap();
    let t = svc.add_section(&ctx, &t.id, "notes", SectionDefinition::new("Notes", 1)
        .with_content("some *markdown*")
        .with_meta("author", "x")).unwrap();

    svc.update_todo_status(&ctx, &t.id, "completed").unwrap();
    let back = svc.get_todo(&ctx, &t.id).unwrap();
    assert_eq!(back.status, "completed");
    assert_eq!(back.task, t.task);
    assert_eq!(back.started, t.started);
    assert_eq!(back.priority, t.priority);
    assert_eq!(back.todo_type, t.todo_type);
    assert_eq!(back.tags, ["a", "b"]);
    assert_eq!(back.sections["notes"].title, "Notes");
    assert_eq!(back.sections["notes"].metadata["author"], "x");
    assert_eq!(back.sections["notes"].content, "some *markdown*");

    let reopened = svc.update_todo_status(&ctx, &t.id, "blocked").unwrap();
    assert_eq!(reopened.completed, None);
    assert!(svc.update_todo_status(&ctx, &t.id, " ").unwrap_err().is_validation());
}

#[test]
fn created_todo_reads_back_equal() {
    let dir = tempdir().unwrap();
    let svc = service(dir.path());
    let ctx = OpContext::background();
    for (task, priority, ty) in [("Refactor: parser!", "high", "refactor"), ("phase 2 / rollout", "low", "phase"), ("x", "", "")] {
        let created = svc.create_todo(&ctx, task, priority, ty).unwrap();
        let found = svc.get_todo(&ctx, &created.id).unwrap();
        assert_eq!(found, created);
        assert_eq!(created.id, derive_base_id(task));
    }
}

#[test]
fn save_of_loaded_todo_is_idempotent() {
    let dir = tempdir().unwrap();
    let svc = service(dir.path());
    let ctx = OpContext::background();
    let t = svc.create_todo(&ctx, "Idempotent", "high", "bug").unwrap();
    svc.add_section(&ctx, &t.id, "log", SectionDefinition::new("Log", 3).with_content("a\n\nb").with_meta("n", 1)).unwrap();

    let (first, raw_first) = svc.get_todo_with_content(&ctx, &t.id).unwrap();
    svc.repository().save(&ctx, &first).unwrap();
    let (second, raw_second) = svc.get_todo_with_content(&ctx, &t.id).unwrap();
    assert_eq!(first, second);
    assert_eq!(raw_first, raw_second);
}

#[test]
fn list_by_status_matches_manual_filter() {
    let dir = tempdir().unwrap();
    let svc = service(dir.path());
    let ctx = OpContext::background();
    for (i, status) in ["blocked", "in_progress", "blocked", "completed", "in_progress"].iter().enumerate() {
        let t = svc.create_todo(&ctx, &format!("item {i}"), "medium", "feature").unwrap();
        svc.update_todo_status(&ctx, &t.id, status).unwrap();
    }
    let all = svc.list_todos(&ctx, "", "", 0).unwrap();
    assert_eq!(all.len(), 5);
    for status in ["blocked", "in_progress", "completed", "missing"] {
        let mut got: Vec<_> = svc.list_todos(&ctx, status, "", 0).unwrap().into_iter().map(|t| t.id).collect();
        let mut want: Vec<_> = all.iter().filter(|t| t.status == status).map(|t| t.id.clone()).collect();
        got.sort();
        want.sort();
        assert_eq!(got, want, "{status}");
    }
}

#[test]
fn subtodos_and_children() {
    let dir = tempdir().unwrap();
    let svc = service(dir.path());
    let ctx = OpContext::background();
    let parent = svc.create_todo(&ctx, "Epic", "high", "multi-phase").unwrap();
    let child = svc.create_subtodo(&ctx, &parent.id, "Phase one", "high", "phase").unwrap();
    svc.create_todo(&ctx, "Unrelated", "low", "bug").unwrap();

    assert_eq!(child.parent_id.as_deref(), Some("epic"));
    let kids = svc.list_children(&ctx, &parent.id).unwrap();
    assert_eq!(kids.len(), 1);
    assert_eq!(kids[0].id, "phase-one");
    let filter = TodoFilter { parent_id: Some("epic".into()), priority: Some("low".into()), ..Default::default() };
    assert!(svc.list_filtered(&ctx, &filter).unwrap().is_empty());

    let err = svc.create_subtodo(&ctx, "nope", "Orphan", "", "").unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn section_update_and_delete() {
    let dir = tempdir().unwrap();
    let svc = service(dir.path());
    let ctx = OpContext::background();
    let t = svc.create_todo(&ctx, "Edit sections", "", "").unwrap();
    svc.add_section(&ctx, &t.id, "plan", SectionDefinition::new("Plan", 1).with_content("draft")).unwrap();
    svc.add_section(&ctx, &t.id, "notes", SectionDefinition::new("Notes", 2).with_content("keep me")).unwrap();

    svc.update_todo_section(&ctx, &t.id, "plan", "1. do it\n2. ship it").unwrap();
    let (back, raw) = svc.get_todo_with_content(&ctx, &t.id).unwrap();
    assert_eq!(back.sections["plan"].content, "1. do it\n2. ship it");
    assert_eq!(back.sections["notes"].content, "keep me");
    assert!(raw.contains("\n## Plan\n\n1. do it\n2. ship it\n\n## Notes\n\nkeep me\n"));

    let err = svc.update_todo_section(&ctx, &t.id, "missing", "x").unwrap_err();
    assert!(err.is_validation());

    svc.delete_todo(&ctx, &t.id).unwrap();
    assert!(svc.delete_todo(&ctx, &t.id).unwrap_err().is_not_found());
}

#[test]
fn list_skips_corrupt_files_and_archive() {
    let dir = tempdir().unwrap();
    let svc = service(dir.path());
    let ctx = OpContext::background();
    svc.create_todo(&ctx, "Good one", "", "").unwrap();
    fs::write(dir.path().join("truncated.md"), "---\ntodo_id: truncated\nstar").unwrap();
    fs::create_dir_all(dir.path().join("archive/2024/01/01")).unwrap();
    let archived = fs::read_to_string(dir.path().join("good-one.md")).unwrap();
    fs::write(dir.path().join("archive/2024/01/01/old.md"), archived.replace("good-one", "old")).unwrap();
    fs::create_dir_all(dir.path().join("nested")).unwrap();
    fs::write(dir.path().join("nested/other.md"), archived.replace("good-one", "other")).unwrap();

    let mut ids: Vec<_> = svc.list_todos(&ctx, "", "", 0).unwrap().into_iter().map(|t| t.id).collect();
    ids.sort();
    assert_eq!(ids, ["good-one", "other"]);
    let report = svc.repository().list_with_report(&ctx, &TodoFilter::default()).unwrap();
    assert_eq!(report.skipped.len(), 1);
}

#[test]
fn cancelled_context_stops_work() {
    let dir = tempdir().unwrap();
    let svc = service(dir.path());
    let ctx = OpContext::background();
    let child = ctx.child();
    child.cancel();
    assert!(svc.create_todo(&child, "never", "", "").unwrap_err().is_operation());
    assert!(svc.list_todos(&child, "", "", 0).is_err());
    assert!(!dir.path().join("never.md").exists());
    assert!(svc.create_todo(&ctx, "still works", "", "").is_ok());
}

#[test]
fn service_opens_from_config() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join(".codex")).unwrap();
    fs::write(root.join(".codex/todos.yaml"), "todos:\n  dir: state/todos\n").unwrap();
    let cm = ConfigManager::with_dirs(root, root.join("sys"), root.join("user"), root.join(".codex")).unwrap();

    let svc = TodoService::open(&cm);
    let t = svc.create_todo(&OpContext::background(), "Configured", "", "").unwrap();
    assert!(root.join("state/todos").join(format!("{}.md", t.id)).is_file());
}

#[test]
fn multiline_task_reads_back_as_created() {
    let dir = tempdir().unwrap();
    let svc = service(dir.path());
    let ctx = OpContext::background();

    let t = svc.create_todo(&ctx, "first line\nsecond line", "", "").unwrap();
    assert_eq!(t.task, "first line second line");
    assert_eq!(t.id, "first-line-second-line");
    assert_eq!(svc.get_todo(&ctx, &t.id).unwrap(), t);
}

#[test]
fn rearchiving_a_reused_id_keeps_the_first_archive() {
    let dir = tempdir().unwrap();
    let ctx = OpContext::background();
    let archived = dir.path().join("archive/2025/01/15/same.md");

    for round in 0..2 {
        let svc = service(dir.path());
        let mut t = svc.create_todo(&ctx, "Same", "", "").unwrap();
        assert_eq!(t.id, "same");
        t.started = Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap();
        t.tags = vec![format!("round-{round}")];
        svc.repository().save(&ctx, &t).unwrap();
        svc.update_todo_status(&ctx, &t.id, "completed").unwrap();

        let res = svc.archive_todo(&ctx, &t.id);
        if round == 0 {
            res.unwrap();
        } else {
            assert!(res.unwrap_err().is(ErrorKind::Conflict));
            assert!(svc.get_todo(&ctx, "same").unwrap().is_completed());
        }
    }
    let kept = fs::read_to_string(&archived).unwrap();
    assert!(kept.contains("round-0"));
}

#[test]
fn huge_day_window_lists_everything() {
    let dir = tempdir().unwrap();
    let svc = service(dir.path());
    let ctx = OpContext::background();
    svc.create_todo(&ctx, "Anything", "", "").unwrap();
    assert_eq!(svc.list_todos(&ctx, "", "", u32::MAX).unwrap().len(), 1);
}
