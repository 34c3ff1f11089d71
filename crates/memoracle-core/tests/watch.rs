//! Tests for watch-driven incremental updates

use memoracle_core::prelude::*;
use pretty_assertions::assert_eq;

struct List
{
    session: Session<SimProcess>,
    main: FrameId,
    head: Address,
    first: Address,
    second: Address,
}

/// `head -> first -> second -> null`
fn list() -> List
{
    let mut process = SimProcess::new();
    process
        .define_struct("node", &[("value", "int"), ("next", "node *")])
        .unwrap();
    let node = process.parse_type("node").unwrap();
    let first = process.alloc(&node).unwrap();
    let second = process.alloc(&node).unwrap();
    process.write_int(first, 1, 4).unwrap();
    process.write_pointer(first + 8, second).unwrap();
    process.write_int(second, 2, 4).unwrap();
    let main = process.push_frame("main");
    let head = process.add_local(main, "head", process.parse_type("node *").unwrap()).unwrap();
    process.write_pointer(head, first).unwrap();

    let mut session = Session::new(process, TraversalConfig::default());
    session.serialize_locals(main).unwrap();
    List {
        session,
        main,
        head,
        first,
        second,
    }
}

#[test]
fn test_every_recorded_address_is_observed()
{
    let list = list();
    let watches = list.session.watches();

    assert_eq!(
        watches.addresses(),
        vec![list.first, list.first + 8, list.second, list.second + 8, list.head]
    );
    assert_eq!(list.session.debuggee().watchpoint_count(), 5);

    // Struct and first field share an observer, each with its own root
    let shared = watches.observer(list.second).unwrap();
    let names = shared.roots.iter().map(|root| root.name.as_str()).collect::<Vec<_>>();
    assert_eq!(names, vec!["(*(*head).next)", "(*(*head).next).value"]);
}

#[test]
fn test_write_refreshes_only_affected_names()
{
    let mut list = list();
    let subtree = [list.second, list.second + 8];
    let outside = |session: &Session<SimProcess>| {
        session
            .repository()
            .records(session.execution())
            .into_iter()
            .filter(|record| !subtree.contains(&record.address))
            .collect::<Vec<_>>()
    };
    let untouched = outside(&list.session);
    assert_eq!(untouched.len(), 4);

    list.session.debuggee_mut().write_int(list.second, 42, 4).unwrap();

    let reports = list.session.process_mutations().unwrap();
    assert_eq!(outside(&list.session), untouched);
    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!(report.kind, PassKind::Mutation);
    assert!(report.is_clean());
    assert_eq!(report.frames, vec![list.main]);
    assert_eq!(
        report.roots,
        vec!["(*(*head).next)".to_string(), "(*(*head).next).value".to_string()]
    );
    assert_eq!(report.created, 0);

    let repository = list.session.repository();
    assert_eq!(repository.get(Kind::Primitive, list.second).unwrap().value.as_deref(), Some("42"));
    assert_eq!(repository.get(Kind::Primitive, list.first).unwrap().value.as_deref(), Some("1"));
    assert_eq!(list.session.watches().observer(list.second).unwrap().hit_count, 1);
}

#[test]
fn test_repeated_writes_collapse_into_one_pass()
{
    let mut list = list();
    for value in [7, 8, 9] {
        list.session.debuggee_mut().write_int(list.first, value, 4).unwrap();
    }

    let reports = list.session.process_mutations().unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(
        list.session.repository().get(Kind::Primitive, list.first).unwrap().value.as_deref(),
        Some("9")
    );
    assert!(list.session.process_mutations().unwrap().is_empty());
}

#[test]
fn test_new_link_extends_graph_and_keeps_outside_parents()
{
    let mut list = list();
    let node = list.session.debuggee().parse_type("node").unwrap();
    let third = list.session.debuggee_mut().alloc(&node).unwrap();
    list.session.debuggee_mut().write_int(third, 3, 4).unwrap();
    list.session.debuggee_mut().write_pointer(list.second + 8, third).unwrap();

    let reports = list.session.process_mutations().unwrap();
    assert_eq!(reports.len(), 1);
    // The new node and both of its fields
    assert_eq!(reports[0].created, 3);

    let repository = list.session.repository();
    let tail = repository.get(Kind::Struct, third).unwrap();
    assert_eq!(tail.name, "(*(*(*head).next).next)");
    assert!(tail.has_parent(Relation::Pointer, list.second + 8));
    assert_eq!(repository.get(Kind::Primitive, third).unwrap().value.as_deref(), Some("3"));
    assert!(list.session.watches().observer(third).is_some());

    // The incremental pass did not forget who points at `second`
    let second = repository.get(Kind::Struct, list.second).unwrap();
    assert!(second.has_parent(Relation::Pointer, list.first + 8));
}

#[test]
fn test_repointed_name_leaves_old_target()
{
    let mut list = list();
    list.session.debuggee_mut().write_pointer(list.head, list.second).unwrap();

    let reports = list.session.process_mutations().unwrap();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].is_clean());
    assert_eq!(reports[0].roots, vec!["head".to_string()]);
    assert_eq!(reports[0].created, 0);

    // The old target keeps its entries and last values but nothing watches it
    let repository = list.session.repository();
    assert_eq!(repository.len(), 7);
    let old = repository.get(Kind::Struct, list.first).unwrap();
    assert!(old.names.is_empty());
    assert_eq!(repository.get(Kind::Primitive, list.first).unwrap().value.as_deref(), Some("1"));
    assert!(list.session.watches().observer(list.first).is_none());
    assert!(list.session.watches().observer(list.first + 8).is_none());
    assert_eq!(list.session.watches().addresses(), vec![list.second, list.second + 8, list.head]);

    // `second` is now only reachable as `(*head)`
    let target = repository.get(Kind::Struct, list.second).unwrap();
    assert_eq!(target.name, "(*head)");
    assert_eq!(target.names.iter().cloned().collect::<Vec<_>>(), vec!["(*head)".to_string()]);
    assert!(repository.lookup(list.main, "(*(*head).next)").is_none());

    list.session.debuggee_mut().write_int(list.first, 77, 4).unwrap();
    assert!(list.session.process_mutations().unwrap().is_empty());
    assert_eq!(
        list.session.repository().get(Kind::Primitive, list.first).unwrap().value.as_deref(),
        Some("1")
    );

    list.session.debuggee_mut().write_int(list.second, 5, 4).unwrap();
    let reports = list.session.process_mutations().unwrap();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].is_clean());
    assert_eq!(reports[0].roots, vec!["(*head)".to_string(), "(*head).value".to_string()]);
    assert_eq!(
        list.session.repository().get(Kind::Primitive, list.second).unwrap().value.as_deref(),
        Some("5")
    );
}

#[test]
fn test_out_of_scope_root_tears_down_observer()
{
    let mut list = list();
    let helper = list.session.debuggee_mut().push_frame("helper");
    let scratch = list.session.debuggee_mut().add_local(helper, "scratch", RawType::int()).unwrap();
    list.session.debuggee_mut().write_int(scratch, 11, 4).unwrap();
    list.session.serialize_locals(helper).unwrap();
    assert!(list.session.watches().observer(scratch).is_some());

    list.session.debuggee_mut().pop_frame();
    list.session.debuggee_mut().write_int(scratch, 99, 4).unwrap();
    let reports = list.session.process_mutations().unwrap();

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].failures.len(), 1);
    assert_eq!(reports[0].failures[0].name, "scratch");
    assert!(list.session.watches().observer(scratch).is_none());
    // The entry keeps its last known value
    let entry = list.session.repository().get(Kind::Primitive, scratch).unwrap();
    assert_eq!(entry.value.as_deref(), Some("11"));

    list.session.debuggee_mut().write_int(scratch, 100, 4).unwrap();
    assert!(list.session.process_mutations().unwrap().is_empty());
}

#[test]
fn test_frame_exited_releases_frame_state()
{
    let mut list = list();
    let node_ptr = list.session.debuggee().parse_type("node *").unwrap();
    let helper = list.session.debuggee_mut().push_frame("helper");
    let cursor = list.session.debuggee_mut().add_local(helper, "cursor", node_ptr).unwrap();
    list.session.debuggee_mut().write_pointer(cursor, list.second).unwrap();
    list.session.serialize_locals(helper).unwrap();
    let before = list.session.repository().len();

    let release = list.session.frame_exited(helper).unwrap();
    list.session.debuggee_mut().pop_frame();

    // Only `cursor` itself lived in the helper frame
    assert_eq!(release, FrameRelease { observers: 1, entries: 1 });
    assert_eq!(list.session.repository().len(), before - 1);
    assert!(list.session.repository().get(Kind::Pointer, cursor).is_err());
    assert!(list.session.watches().observer(cursor).is_none());

    let second = list.session.repository().get(Kind::Struct, list.second).unwrap();
    assert!(!second.names.contains("(*cursor)"));
    assert!(second.frames.contains(&list.main));
    assert!(!second.frames.contains(&helper));
    let observer = list.session.watches().observer(list.second).unwrap();
    assert!(observer.roots.iter().all(|root| root.frame == list.main));
}

#[test]
fn test_exhausted_watch_slots_leave_addresses_unobserved()
{
    let mut process = SimProcess::new();
    process.set_watch_slots(Some(2));
    let main = process.push_frame("main");
    for name in ["a", "b", "c"] {
        process.add_local(main, name, RawType::int()).unwrap();
    }

    let mut session = Session::new(process, TraversalConfig::default());
    let report = session.serialize_locals(main).unwrap();

    assert!(report.is_clean());
    assert_eq!(session.repository().len(), 3);
    assert_eq!(session.watches().len(), 2);
}

#[test]
fn test_watches_can_be_disabled()
{
    let mut process = SimProcess::new();
    let main = process.push_frame("main");
    let x = process.add_local(main, "x", RawType::int()).unwrap();

    let config = TraversalConfig {
        install_watches: false,
        ..TraversalConfig::default()
    };
    let mut session = Session::new(process, config);
    session.serialize_locals(main).unwrap();
    session.debuggee_mut().write_int(x, 5, 4).unwrap();

    assert!(session.watches().is_empty());
    assert!(session.process_mutations().unwrap().is_empty());
    assert_eq!(session.repository().get(Kind::Primitive, x).unwrap().value.as_deref(), Some("0"));
}
