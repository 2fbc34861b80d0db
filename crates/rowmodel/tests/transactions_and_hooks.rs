use rowmodel::prelude::*;
use rowmodel::{DEFAULT_SERVER, DestroyOptions, HookKind};
use std::sync::{Arc, Mutex};

fn setup(hooks: HookSet) -> (Arc<MockConnection>, Arc<Model>) {
    let mock = Arc::new(MockConnection::new());
    mock.set_default_rows(vec![Row::from_pairs([("id", 1), ("x", 1)])]);
    let model = Model::builder(Database::new(mock.clone()), "items")
        .columns(&["id", "x", "y"])
        .hooks(hooks)
        .build();
    (mock, model)
}

fn reject_save() -> HookSet {
    HookSet::new().before_save(|_| Ok(false))
}

fn hook_kind(err: &Error) -> Option<HookKind> {
    match err {
        Error::HookFailed(e) => Some(e.hook),
        _ => None,
    }
}

/// Records hook names in call order.
fn tracing_hooks(log: &Arc<Mutex<Vec<&'static str>>>) -> HookSet {
    let push = |name: &'static str| {
        let log = Arc::clone(log);
        move || log.lock().unwrap().push(name)
    };
    let (bv, av, bs, bi, bu, bd) = (
        push("before_validation"),
        push("after_validation"),
        push("before_save"),
        push("before_insert"),
        push("before_update"),
        push("before_destroy"),
    );
    let (ai, au, asv, ad) = (
        push("after_insert"),
        push("after_update"),
        push("after_save"),
        push("after_destroy"),
    );
    HookSet::new()
        .before_validation(move |_| {
            bv();
            Ok(true)
        })
        .after_validation(move |_| {
            av();
            Ok(())
        })
        .before_save(move |_| {
            bs();
            Ok(true)
        })
        .before_insert(move |_| {
            bi();
            Ok(true)
        })
        .before_update(move |_| {
            bu();
            Ok(true)
        })
        .before_destroy(move |_| {
            bd();
            Ok(true)
        })
        .after_insert(move |_| {
            ai();
            Ok(())
        })
        .after_update(move |_| {
            au();
            Ok(())
        })
        .after_save(move |_| {
            asv();
            Ok(())
        })
        .after_destroy(move |_| {
            ad();
            Ok(())
        })
}

// ==================== Hook order ====================

#[test]
fn hooks_run_in_lifecycle_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let (_mock, model) = setup(tracing_hooks(&log));

    let mut record = model.new_record([("x", 1)]).expect("new record");
    record.save().expect("insert");
    record.assign("x", 2).expect("assign");
    record.save_changes().expect("update");
    record.destroy().expect("destroy");

    assert_eq!(
        *log.lock().unwrap(),
        [
            "before_validation",
            "after_validation",
            "before_save",
            "before_insert",
            "after_insert",
            "after_save",
            "before_validation",
            "after_validation",
            "before_save",
            "before_update",
            "after_update",
            "after_save",
            "before_destroy",
            "after_destroy",
        ]
    );
}

// ==================== Hook failure ====================

#[test]
fn rejected_save_raises_and_rolls_back() {
    let (mock, model) = setup(reject_save());
    let mut record = model.load([("id", 1), ("x", 1)]);

    let err = record.save().unwrap_err();
    assert_eq!(hook_kind(&err), Some(HookKind::Save));
    assert_eq!(mock.sqls(), vec!["BEGIN", "ROLLBACK"]);
}

#[test]
fn rejected_save_is_silent_when_not_raising() {
    let (mock, model) = setup(reject_save());
    model.set_setting(Setting::RaiseOnSaveFailure, false);
    let mut record = model.load([("id", 1), ("x", 1)]);

    assert!(record.save().expect("silent failure").is_none());
    assert_eq!(mock.sqls(), vec!["BEGIN", "ROLLBACK"]);
}

#[test]
fn raise_option_overrides_record_setting() {
    let (mock, model) = setup(reject_save());
    let mut record = model.load([("id", 1), ("x", 1)]);
    record.set_setting(Setting::RaiseOnSaveFailure, false);

    let err = record
        .save_with(None, SaveOptions::new().raise_on_failure(true))
        .unwrap_err();
    assert!(err.is_hook_failure());

    let saved = record
        .save_with(
            None,
            SaveOptions::new().raise_on_failure(false).transaction(false),
        )
        .expect("silent failure");
    assert!(saved.is_none());
    assert_eq!(mock.sqls(), vec!["BEGIN", "ROLLBACK"]);
}

#[test]
fn silent_failure_does_not_roll_back_outer_transaction() {
    let (mock, model) = setup(reject_save());
    model.set_setting(Setting::RaiseOnSaveFailure, false);
    let db = Arc::clone(model.db());
    let mut record = model.load([("id", 1), ("x", 1)]);

    db.transaction(DEFAULT_SERVER, || {
        assert!(record.save_columns(&["y"])?.is_none());
        db.run("BLAH")
    })
    .expect("outer transaction");
    assert_eq!(mock.sqls(), vec!["BEGIN", "BLAH", "COMMIT"]);
}

#[test]
fn insert_and_update_hooks_can_reject() {
    let (mock, model) = setup(HookSet::new().before_insert(|_| Ok(false)));
    let mut record = model.new_record([("x", 1)]).expect("new record");
    let err = record.save().unwrap_err();
    assert_eq!(hook_kind(&err), Some(HookKind::Insert));
    assert!(record.is_new());
    assert_eq!(mock.sqls(), vec!["BEGIN", "ROLLBACK"]);

    let (mock, model) = setup(HookSet::new().before_update(|_| Ok(false)));
    let mut record = model.load([("id", 1), ("x", 1)]);
    let err = record.save().unwrap_err();
    assert_eq!(hook_kind(&err), Some(HookKind::Update));
    assert_eq!(mock.sqls(), vec!["BEGIN", "ROLLBACK"]);
}

#[test]
fn rejected_validation_is_a_hook_failure() {
    let (mock, model) = setup(HookSet::new().before_validation(|_| Ok(false)));
    let mut record = model.load([("id", 1), ("x", 1)]);

    let err = record.save().unwrap_err();
    assert_eq!(hook_kind(&err), Some(HookKind::Validation));
    assert!(mock.sqls().is_empty());

    let saved = record
        .save_with(None, SaveOptions::new().validate(false))
        .expect("save");
    assert!(saved.is_some());
}

// ==================== Rollback signal ====================

#[test]
fn rollback_signal_in_hook_is_swallowed_by_own_transaction() {
    let (mock, model) = setup(HookSet::new().before_save(|_| Err(Error::Rollback)));
    let mut record = model.load([("id", 1), ("x", 1)]);

    assert!(record.save().expect("rollback swallowed").is_none());
    assert_eq!(mock.sqls(), vec!["BEGIN", "ROLLBACK"]);
}

#[test]
fn rollback_signal_after_update_undoes_the_update() {
    let (mock, model) = setup(HookSet::new().after_save(|_| Err(Error::Rollback)));
    let mut record = model.load([("id", 1), ("x", 1)]);

    assert!(record.save().expect("rollback swallowed").is_none());
    assert_eq!(
        mock.sqls(),
        vec!["BEGIN", "UPDATE items SET x = 1 WHERE (id = 1)", "ROLLBACK"]
    );
    assert!(record.columns_updated().is_none());
}

#[test]
fn rollback_signal_propagates_without_transaction() {
    let (mock, model) = setup(HookSet::new().before_save(|_| Err(Error::Rollback)));
    model.set_setting(Setting::RaiseOnSaveFailure, false);
    let mut record = model.load([("id", 1), ("x", 1)]);

    let err = record
        .save_with(None, SaveOptions::new().transaction(false))
        .unwrap_err();
    assert!(err.is_rollback());
    assert!(mock.sqls().is_empty());
}

#[test]
fn transactions_can_be_disabled_per_record() {
    let (mock, model) = setup(HookSet::new());
    let mut record = model.load([("id", 1), ("x", 1)]);
    record.set_setting(Setting::UseTransactions, false);

    record.save().expect("save");
    assert_eq!(mock.sqls(), vec!["UPDATE items SET x = 1 WHERE (id = 1)"]);

    mock.reset();
    record
        .save_with(None, SaveOptions::new().transaction(true))
        .expect("save");
    assert_eq!(mock.sqls().first().map(String::as_str), Some("BEGIN"));
}

// ==================== Destroy ====================

#[test]
fn destroy_deletes_inside_transaction() {
    let (mock, model) = setup(HookSet::new());
    let mut record = model.load([("id", 1), ("x", 1)]);

    assert!(record.destroy().expect("destroy").is_some());
    assert_eq!(
        mock.sqls(),
        vec!["BEGIN", "DELETE FROM items WHERE (id = 1)", "COMMIT"]
    );
}

#[test]
fn destroy_follows_save_failure_policy() {
    let (mock, model) = setup(HookSet::new().before_destroy(|_| Ok(false)));
    let mut record = model.load([("id", 1), ("x", 1)]);

    let err = record.destroy().unwrap_err();
    assert_eq!(hook_kind(&err), Some(HookKind::Destroy));

    let silent = record
        .destroy_with(DestroyOptions::new().raise_on_failure(false))
        .expect("silent failure");
    assert!(silent.is_none());
    assert_eq!(mock.sqls(), vec!["BEGIN", "ROLLBACK", "BEGIN", "ROLLBACK"]);
}

#[test]
fn destroy_checks_affected_rows() {
    let (mock, model) = setup(HookSet::new());
    mock.push_affected(0);
    let mut record = model.load([("id", 1), ("x", 1)]);

    let err = record
        .destroy_with(DestroyOptions::new().transaction(false))
        .unwrap_err();
    assert!(matches!(err, Error::NoExistingObject(_)));
    assert_eq!(mock.sqls(), vec!["DELETE FROM items WHERE (id = 1)"]);
}

#[test]
fn delete_skips_hooks_and_transactions() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let (mock, model) = setup(tracing_hooks(&log));
    let mut record = model.load([("id", 1), ("x", 1)]);

    record.delete().expect("delete");
    assert_eq!(mock.sqls(), vec!["DELETE FROM items WHERE (id = 1)"]);
    assert!(log.lock().unwrap().is_empty());
}
