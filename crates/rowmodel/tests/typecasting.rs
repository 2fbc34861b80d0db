use chrono::{FixedOffset, NaiveDate, TimeZone};
use rowmodel::prelude::*;
use std::sync::Arc;

fn model_with(column: &str, schema: ColumnSchema) -> Arc<Model> {
    let db = Database::new(Arc::new(MockConnection::new()));
    Model::builder(db, "items")
        .columns(&["id"])
        .schema(column, schema)
        .build()
}

fn typed(ty: ColumnType) -> Arc<Model> {
    model_with("x", ColumnSchema::new(ty))
}

fn assigned(model: &Arc<Model>, value: impl Into<Value>) -> Result<Value> {
    let mut record = model.load([("id", 1)]);
    record.assign("x", value)?;
    Ok(record.get("x").cloned().unwrap_or(Value::Null))
}

#[test]
fn integer_columns_parse_text() {
    let model = typed(ColumnType::Integer);
    assert_eq!(assigned(&model, "1").unwrap(), Value::Integer(1));
    assert_eq!(assigned(&model, 1.9).unwrap(), Value::Integer(1));
    assert_eq!(assigned(&model, "").unwrap(), Value::Null);

    let err = assigned(&model, "a").unwrap_err();
    assert!(matches!(err, Error::InvalidValue(ref e) if e.expected == "integer"));
}

#[test]
fn typecast_failure_keeps_raw_value_when_not_raising() {
    let model = typed(ColumnType::Integer);
    model.set_setting(Setting::RaiseOnTypecastFailure, false);
    assert_eq!(assigned(&model, "a").unwrap(), Value::from("a"));
}

#[test]
fn typecasting_can_be_disabled() {
    let model = typed(ColumnType::Integer);
    let mut record = model.load([("id", 1)]);
    record.set_setting(Setting::TypecastOnAssignment, false);
    record.assign("x", "1").unwrap();
    assert_eq!(record.get("x"), Some(&Value::from("1")));
}

#[test]
fn typecast_result_decides_dirtiness() {
    let model = typed(ColumnType::Integer);
    let mut record = model.load([("id", 1), ("x", 1)]);
    record.assign("x", "1").unwrap();
    record.assign("x", 1.0).unwrap();
    assert!(record.changed_columns().is_empty());

    record.assign("x", "2").unwrap();
    record.assign("x", "3").unwrap();
    assert_eq!(record.changed_columns(), ["x"]);
}

#[test]
fn boolean_token_table() {
    let model = typed(ColumnType::Boolean);
    for input in ["t", "T", "true", "TRUE", "1", "yes"] {
        assert_eq!(assigned(&model, input).unwrap(), Value::Bool(true), "{input}");
    }
    for input in ["f", "F", "false", "FALSE", "0"] {
        assert_eq!(assigned(&model, input).unwrap(), Value::Bool(false), "{input}");
    }
    assert_eq!(assigned(&model, 0).unwrap(), Value::Bool(false));
    assert_eq!(assigned(&model, Value::Null).unwrap(), Value::Null);
    assert_eq!(assigned(&model, "").unwrap(), Value::Null);
}

#[test]
fn empty_strings_survive_in_string_columns() {
    let model = typed(ColumnType::String);
    assert_eq!(assigned(&model, "").unwrap(), Value::from(""));
    assert_eq!(assigned(&model, 1).unwrap(), Value::from("1"));
}

#[test]
fn empty_string_is_invalid_without_nil_conversion() {
    let model = typed(ColumnType::Integer);
    model.set_setting(Setting::TypecastEmptyStringToNil, false);
    assert!(matches!(assigned(&model, ""), Err(Error::InvalidValue(_))));
}

#[test]
fn null_respects_allow_null() {
    let model = model_with("x", ColumnSchema::new(ColumnType::Integer).nullable(false));
    assert!(matches!(
        assigned(&model, Value::Null),
        Err(Error::InvalidValue(_))
    ));
    assert!(matches!(assigned(&model, ""), Err(Error::InvalidValue(_))));

    let model = model_with("x", ColumnSchema::new(ColumnType::Integer).nullable(true));
    assert_eq!(assigned(&model, Value::Null).unwrap(), Value::Null);
}

#[test]
fn decimals_normalize() {
    let model = typed(ColumnType::Decimal);
    let one = assigned(&model, "1.0").unwrap();
    assert_eq!(assigned(&model, 1).unwrap(), one);
    assert_eq!(assigned(&model, 1.0).unwrap(), one);
    assert!(matches!(assigned(&model, "a"), Err(Error::InvalidValue(_))));
}

#[test]
fn dates_parse_and_narrow() {
    let model = typed(ColumnType::Date);
    let date = NaiveDate::from_ymd_opt(2007, 10, 21).unwrap();
    assert_eq!(assigned(&model, "2007-10-21").unwrap(), Value::Date(date));
    assert_eq!(
        assigned(&model, date.and_hms_opt(10, 0, 0).unwrap()).unwrap(),
        Value::Date(date)
    );
    let parts: Value = [("year", "2007"), ("month", "10"), ("day", "21")]
        .into_iter()
        .collect();
    assert_eq!(assigned(&model, parts).unwrap(), Value::Date(date));
    assert!(matches!(assigned(&model, "banana"), Err(Error::InvalidValue(_))));
}

#[test]
fn time_columns_reject_dates() {
    let model = typed(ColumnType::Time);
    let date = NaiveDate::from_ymd_opt(2007, 10, 21).unwrap();
    assert!(matches!(
        assigned(&model, date),
        Err(Error::InvalidValue(_))
    ));
    assert!(assigned(&model, "10:20:30").is_ok());
}

#[test]
fn timestamp_representation_is_shared_through_the_database() {
    let model = typed(ColumnType::DateTime);
    let local = NaiveDate::from_ymd_opt(2007, 10, 21)
        .unwrap()
        .and_hms_opt(10, 20, 30)
        .unwrap();
    assert_eq!(
        assigned(&model, "2007-10-21 10:20:30").unwrap(),
        Value::Timestamp(local)
    );

    model.db().set_timestamp_repr(TimestampRepr::Zoned);
    let utc = FixedOffset::east_opt(0)
        .unwrap()
        .from_local_datetime(&local)
        .unwrap();
    assert_eq!(
        assigned(&model, "2007-10-21 10:20:30").unwrap(),
        Value::TimestampTz(utc)
    );
}

#[test]
fn mass_assignment_typecasts_too() {
    let model = typed(ColumnType::Integer);
    let record = model.new_record([("x", "12")]).unwrap();
    assert_eq!(record.get("x"), Some(&Value::Integer(12)));
}
