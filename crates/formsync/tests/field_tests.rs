use formsync::prelude::*;
use formsync::{FormError, NodeRef, ValidateOptions};
use formsync_convert::Binding;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn hooked_form(calls: Arc<AtomicUsize>) -> Form {
    Form::new()
        .field("b", Field::new(converters::string()))
        .field(
            "c",
            Field::new(converters::integer()).change(move |node: &mut NodeRef<'_>, value: &i64| {
                calls.fetch_add(1, Ordering::SeqCst);
                node.set("b", format!("set by c: {value}"))
            }),
        )
}

#[tokio::test]
async fn test_change_hook_runs_once_for_same_value() {
    let calls = Arc::new(AtomicUsize::new(0));
    let state = FormState::new(
        hooked_form(Arc::clone(&calls)),
        json!({"b": "", "c": 1}),
        FormStateOptions::new(),
    )
    .unwrap();
    let c = state.field("c").unwrap();

    c.set_raw("17").await.unwrap();
    c.set_raw("17").await.unwrap();
    c.set_raw(" 17 ").await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(state.value(), json!({"b": "set by c: 17", "c": 17}));
    assert_eq!(state.field("b").unwrap().raw().unwrap(), json!("set by c: 17"));
}

#[tokio::test]
async fn test_validate_does_not_run_change_hook() {
    let calls = Arc::new(AtomicUsize::new(0));
    let state = FormState::new(
        hooked_form(Arc::clone(&calls)),
        json!({"b": "", "c": 1}),
        FormStateOptions::new(),
    )
    .unwrap();
    let c = state.field("c").unwrap();
    c.set_raw("2").await.unwrap();
    assert!(c.validate().await.unwrap());
    assert!(state.validate().await.unwrap());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_blank_required_field_reports_required_not_conversion() {
    let form = Form::new().field("n", Field::new(converters::number()).required());
    let state = FormState::new(form, json!({"n": 3}), FormStateOptions::new()).unwrap();
    let n = state.field("n").unwrap();

    n.set_raw("").await.unwrap();
    assert_eq!(n.error().unwrap().as_deref(), Some("Required"));
    assert_eq!(n.raw().unwrap(), json!(""));

    n.set_raw("1foo").await.unwrap();
    assert_eq!(n.error().unwrap().as_deref(), Some("Could not convert"));
    assert_eq!(n.raw().unwrap(), json!("1foo"));

    // invalid input never reaches the tree
    assert_eq!(n.value().unwrap(), Some(json!(3)));
    assert!(!state.is_valid().unwrap());

    n.set_raw("19.").await.unwrap();
    assert_eq!(n.error().unwrap(), None);
    assert_eq!(n.value_as::<f64>().unwrap(), 19.0);
}

#[tokio::test]
async fn test_value_validator_failure_then_success() {
    let calls = Arc::new(AtomicUsize::new(0));
    let hook_calls = Arc::clone(&calls);
    let form = Form::new().field(
        "age",
        Field::new(converters::integer())
            .validator(|age: &i64| (*age > 150).then(|| "too old".to_string()))
            .change(move |_node: &mut NodeRef<'_>, _age: &i64| {
                hook_calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
    );
    let state = FormState::new(form, json!({"age": 30}), FormStateOptions::new()).unwrap();
    let age = state.field("age").unwrap();

    age.set_raw("200").await.unwrap();
    assert_eq!(age.error().unwrap().as_deref(), Some("too old"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    age.set_raw("40").await.unwrap();
    assert_eq!(age.error().unwrap(), None);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(state.value(), json!({"age": 40}));
}

#[tokio::test(start_paused = true)]
async fn test_slow_outcome_for_replaced_raw_is_discarded() {
    let form = Form::new().field(
        "n",
        Field::new(converters::integer()).validator_async(|n: &i64| {
            let n = *n;
            async move {
                if n == 1 {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
                None
            }
        }),
    );
    let state = FormState::new(form, json!({"n": 0}), FormStateOptions::new()).unwrap();
    let n = state.field("n").unwrap();

    let slow = {
        let n = n.clone();
        tokio::spawn(async move { n.set_raw("1").await })
    };
    tokio::task::yield_now().await;
    assert_eq!(n.raw().unwrap(), json!("1"));

    n.set_raw("2").await.unwrap();
    slow.await.unwrap().unwrap();

    assert_eq!(n.raw().unwrap(), json!("2"));
    assert_eq!(state.value(), json!({"n": 2}));
}

#[tokio::test]
async fn test_read_only_policy_ignores_input() {
    let form = Form::new()
        .field("locked", Field::new(converters::string()))
        .field("open", Field::new(converters::string()));
    let options = FormStateOptions::new().with_read_only(|info| info.path == "/locked");
    let state = FormState::new(form, json!({"locked": "a", "open": "b"}), options).unwrap();

    let locked = state.field("locked").unwrap();
    assert!(locked.read_only().unwrap());
    assert!(!locked.input_allowed().unwrap());
    locked.set_raw("changed").await.unwrap();
    assert_eq!(locked.raw().unwrap(), json!("a"));

    let open = state.field("open").unwrap();
    assert!(open.input_allowed().unwrap());
    open.set_raw("changed").await.unwrap();
    assert_eq!(state.value(), json!({"locked": "a", "open": "changed"}));
}

#[tokio::test]
async fn test_raw_of_wrong_shape_is_an_error() {
    let form = Form::new().field("s", Field::new(converters::string()));
    let state = FormState::new(form, json!({"s": "x"}), FormStateOptions::new()).unwrap();
    let s = state.field("s").unwrap();
    assert!(matches!(s.set_raw(5).await, Err(FormError::TypeMismatch(_))));
    assert_eq!(s.raw().unwrap(), json!("x"));
}

#[tokio::test]
async fn test_derived_field_follows_sources() {
    let form = Form::new()
        .field("price", Field::new(converters::integer()))
        .field("qty", Field::new(converters::integer()))
        .field(
            "total",
            Field::new(converters::integer()).derived(|record: &Value| {
                record["price"].as_i64().unwrap_or(0) * record["qty"].as_i64().unwrap_or(0)
            }),
        );
    let state = FormState::new(
        form,
        json!({"price": 2, "qty": 3, "total": 6}),
        FormStateOptions::new(),
    )
    .unwrap();

    state.field("qty").unwrap().set_raw("5").await.unwrap();
    assert_eq!(state.get("/total"), Some(json!(10)));
    assert_eq!(state.field("total").unwrap().raw().unwrap(), json!("10"));

    // a manual override sticks until the sources move again
    state.field("total").unwrap().set_raw("11").await.unwrap();
    assert_eq!(state.get("/total"), Some(json!(11)));
    state.field("price").unwrap().set_raw("3").await.unwrap();
    assert_eq!(state.get("/total"), Some(json!(15)));
}

#[tokio::test]
async fn test_sub_form_paths_and_set_value() {
    let form = Form::new().sub_form(
        "address",
        SubForm::new(
            Form::new()
                .field("city", Field::new(converters::string()))
                .field("zip", Field::new(converters::maybe_null(converters::integer()))),
        ),
    );
    let state = FormState::new(
        form,
        json!({"address": {"city": "Oslo", "zip": null}}),
        FormStateOptions::new(),
    )
    .unwrap();
    let address = state.sub_form("address").unwrap();
    let zip = address.field("zip").unwrap();
    assert_eq!(zip.path().unwrap(), "/address/zip");
    assert_eq!(zip.fieldref().unwrap(), "address.zip");
    assert_eq!(zip.raw().unwrap(), json!(""));

    zip.set_raw("0150").await.unwrap();
    assert_eq!(zip.error().unwrap().as_deref(), Some("Could not convert"));
    zip.set_raw("150").await.unwrap();
    assert_eq!(state.get("/address/zip"), Some(json!(150)));
    zip.set_raw("").await.unwrap();
    assert_eq!(state.get("/address/zip"), Some(Value::Null));

    address.field("city").unwrap().set_value("Bergen").unwrap();
    assert_eq!(address.field("city").unwrap().raw().unwrap(), json!("Bergen"));
}

#[tokio::test]
async fn test_groups_validate_their_fields_only() {
    let form = Form::new()
        .field("a", Field::new(converters::string()).required())
        .field("b", Field::new(converters::string()).required())
        .field("c", Field::new(converters::string()))
        .group("first", Group::include(["a"]))
        .group("rest", Group::exclude(["a"]));
    let state = FormState::new(form, json!({"a": "x", "b": "", "c": ""}), FormStateOptions::new())
        .unwrap();
    let root = state.root();

    let first = root.group("first").unwrap();
    assert!(first.validate().await.unwrap());

    let rest = root.group("rest").unwrap();
    let keys: Vec<String> = rest
        .field_accessors()
        .unwrap()
        .iter()
        .map(|f| f.path().unwrap())
        .collect();
    assert_eq!(keys, vec!["/b", "/c"]);
    assert!(!rest.validate().await.unwrap());
    assert!(!rest.is_valid().unwrap());
    assert!(first.is_valid().unwrap());

    assert!(matches!(root.group("nope"), Err(FormError::UnknownPath(_))));
}

#[tokio::test]
async fn test_ignore_required_validation() {
    let form = Form::new().field("a", Field::new(converters::string()).required());
    let state = FormState::new(form, json!({"a": ""}), FormStateOptions::new()).unwrap();
    let root = state.root();
    let lenient = ValidateOptions {
        ignore_required: true,
        ..ValidateOptions::default()
    };
    assert!(root.validate_with(lenient).await.unwrap());
    assert!(!root.validate().await.unwrap());
}

#[test]
fn test_binding_and_lookup_errors() {
    let form = Form::new()
        .field("flag", Field::new(converters::boolean()))
        .field("name", Field::new(converters::string()));
    let state = FormState::new(form, json!({"flag": true, "name": "x"}), FormStateOptions::new())
        .unwrap();
    assert_eq!(state.field("flag").unwrap().binding().unwrap(), Binding::Checked);
    assert_eq!(state.field("name").unwrap().binding().unwrap(), Binding::Value);
    assert!(matches!(state.field("missing"), Err(FormError::UnknownPath(_))));
    assert!(matches!(
        state.repeating_form("name"),
        Err(FormError::WrongKind { .. })
    ));
}
