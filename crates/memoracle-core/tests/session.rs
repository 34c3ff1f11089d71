//! Tests for snapshot sessions: block selection, frame handling and export

use memoracle_core::prelude::*;
use pretty_assertions::assert_eq;

fn quiet() -> TraversalConfig
{
    TraversalConfig {
        install_watches: false,
        ..TraversalConfig::default()
    }
}

#[test]
fn test_globals_skip_constants()
{
    let mut process = SimProcess::new();
    let counter = process.add_global("counter", RawType::int()).unwrap();
    process.write_int(counter, 3, 4).unwrap();
    let entry_point = process.add_function("main", "int (void)").unwrap();
    let hook = process
        .add_global("hook", RawType::named(TypeCode::Function, "int (void)").pointer())
        .unwrap();
    process.write_pointer(hook, entry_point).unwrap();
    let main = process.push_frame("main");

    let mut session = Session::new(process, quiet());
    let report = session.serialize_globals(main).unwrap();
    let repository = session.repository();

    assert_eq!(report.kind, PassKind::Globals);
    assert_eq!(report.roots, vec!["counter".to_string(), "hook".to_string()]);
    assert_eq!(repository.get(Kind::Primitive, counter).unwrap().value.as_deref(), Some("3"));

    let pointer = repository.get(Kind::Pointer, hook).unwrap();
    assert_eq!(pointer.value.as_deref(), Some(format!("(int (void) *) {entry_point}").as_str()));
    let function = repository.get(Kind::Function, entry_point).unwrap();
    assert_eq!(function.name, "(*hook)");
    assert_eq!(function.value.as_deref(), Some(format!("{{int (void)}} {entry_point} <main>").as_str()));
}

#[test]
fn test_upward_pass_merges_frames()
{
    let mut process = SimProcess::new();
    let main = process.push_frame("main");
    let total = process.add_local(main, "total", RawType::int()).unwrap();
    process.write_int(total, 100, 4).unwrap();
    let helper = process.push_frame("helper");
    let out = process.add_local(helper, "out", RawType::int().pointer()).unwrap();
    process.write_pointer(out, total).unwrap();

    let mut session = Session::new(process, quiet());
    let report = session.serialize_upward(helper).unwrap();
    let repository = session.repository();

    assert!(report.is_clean());
    assert_eq!(report.kind, PassKind::Upward);
    assert_eq!(report.frames, vec![helper, main]);
    assert_eq!(report.roots, vec!["out".to_string(), "total".to_string()]);
    assert_eq!(repository.len(), 2);

    let shared = repository.get(Kind::Primitive, total).unwrap();
    assert_eq!(shared.name, "(*out)");
    assert_eq!(
        shared.names.iter().map(String::as_str).collect::<Vec<_>>(),
        vec!["(*out)", "total"]
    );
    assert_eq!(shared.frames.len(), 2);
    assert!(shared.has_parent(Relation::Pointer, out));
    assert_eq!(repository.lookup(main, "total").map(|entry| entry.address), Some(total));
    assert_eq!(repository.lookup(helper, "(*out)").map(|entry| entry.address), Some(total));

    // The selection is restored to what it was before the pass
    assert_eq!(session.debuggee().selected_frame().unwrap(), helper);
}

#[test]
fn test_stale_frame_is_rejected()
{
    let mut process = SimProcess::new();
    let main = process.push_frame("main");
    let helper = process.push_frame("helper");
    process.pop_frame();

    let mut session = Session::new(process, quiet());
    assert!(matches!(session.serialize_locals(helper), Err(OracleError::StaleFrame(frame)) if frame == helper));
    assert!(matches!(session.serialize_upward(helper), Err(OracleError::StaleFrame(_))));
    assert!(session.serialize_locals(main).unwrap().is_clean());
    assert!(session.repository().is_empty());
}

#[test]
fn test_export_json_lines()
{
    let mut process = SimProcess::new();
    let main = process.push_frame("main");
    let values = process.add_local(main, "values", process.parse_type("int [2]").unwrap()).unwrap();
    process.write_int(values, 4, 4).unwrap();

    let mut session = Session::new(process, quiet()).with_execution("run-7");
    session.serialize_locals(main).unwrap();

    let mut sink = JsonLinesSink::new(Vec::new());
    let count = session.export(&mut sink).unwrap();
    assert_eq!(count, 3);
    assert_eq!(sink.written(), 3);

    let text = String::from_utf8(sink.into_inner()).unwrap();
    let records = text
        .lines()
        .map(|line| serde_json::from_str::<EntryRecord>(line).unwrap())
        .collect::<Vec<_>>();
    assert!(records.iter().all(|record| record.execution == "run-7"));

    let array = records.iter().find(|record| record.kind == Kind::Array).unwrap();
    assert_eq!(array.key(), ("run-7", values, "values"));
    assert_eq!(array.range, Some((0, 1)));
    assert_eq!(array.children.len(), 2);

    let first: serde_json::Value = serde_json::from_str(text.lines().next().unwrap()).unwrap();
    assert_eq!(first["kind"], "primitive");
    assert_eq!(first["address"], format!("{values}"));
    assert_eq!(first["value"], "4");
    assert_eq!(first["status"]["state"], "valid");
}

#[test]
fn test_export_into_vec_matches_repository()
{
    let mut process = SimProcess::new();
    let main = process.push_frame("main");
    process.add_local(main, "x", RawType::int()).unwrap();
    process.add_local(main, "y", RawType::named(TypeCode::Char, "char")).unwrap();

    let mut session = Session::new(process, quiet());
    session.serialize_locals(main).unwrap();

    let mut records: Vec<EntryRecord> = Vec::new();
    session.export(&mut records).unwrap();
    assert_eq!(records, session.repository().records(session.execution()));
    assert_eq!(
        records.iter().map(|record| record.value.as_deref()).collect::<Vec<_>>(),
        // Stack grows down, so `y` sorts first
        vec![Some("0 '\\000'"), Some("0")]
    );
}
