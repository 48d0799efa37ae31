//! Search expressions against realistic API response pages.

use serde_json::{Value, json};

use huginn::query::{Query, extract};

fn describe_instances() -> Value {
    json!({
        "Reservations": [
            {"Instances": [
                {"InstanceId": "i-1", "InstanceType": "t3.micro", "PublicIpAddress": "1.2.3.4",
                 "State": {"Name": "running"}},
                {"InstanceId": "i-2", "InstanceType": "m5.large",
                 "State": {"Name": "stopped"}}
            ]},
            {"Instances": [
                {"InstanceId": "i-3", "InstanceType": "t3.micro", "PublicIpAddress": "5.6.7.8",
                 "State": {"Name": "running"}}
            ]}
        ],
        "NextToken": "abc"
    })
}

fn search(expression: &str, data: &Value) -> Value {
    Query::compile(expression).unwrap().search(data).unwrap()
}

#[test]
fn unit_records_for_every_instance() {
    let records = extract(
        "Reservations[].Instances[].{id: InstanceId, value: `1`}[]",
        &describe_instances(),
    )
    .unwrap();
    assert_eq!(
        records,
        vec![
            json!({"id": "i-1", "value": 1}),
            json!({"id": "i-2", "value": 1}),
            json!({"id": "i-3", "value": 1}),
        ]
    );
}

#[test]
fn filter_on_field_presence() {
    let records = extract(
        "Reservations[].Instances[?PublicIpAddress].{id: InstanceId, value: `1`}[]",
        &describe_instances(),
    )
    .unwrap();
    let ids: Vec<&Value> = records.iter().map(|r| &r["id"]).collect();
    assert_eq!(ids, [&json!("i-1"), &json!("i-3")]);
}

#[test]
fn flatten_then_filter_then_field() {
    assert_eq!(
        search(
            "Reservations[].Instances[?PublicIpAddress][].InstanceId",
            &describe_instances()
        ),
        json!(["i-1", "i-3"])
    );
}

#[test]
fn filter_with_comparison() {
    assert_eq!(
        search(
            "Reservations[].Instances[?State.Name == 'running'][].InstanceId",
            &describe_instances()
        ),
        json!(["i-1", "i-3"])
    );
    assert_eq!(
        search(
            "Reservations[].Instances[?State.Name != `\"running\"`][].InstanceId",
            &describe_instances()
        ),
        json!(["i-2"])
    );
}

#[test]
fn filter_with_boolean_operators() {
    let data = json!({"Volumes": [
        {"id": "v-1", "size": 8, "encrypted": true},
        {"id": "v-2", "size": 100, "encrypted": false},
        {"id": "v-3", "size": 500, "encrypted": true}
    ]});
    assert_eq!(
        search("Volumes[?size > `10` && encrypted].id", &data),
        json!(["v-3"])
    );
    assert_eq!(
        search("Volumes[?size < `10` || !encrypted].id", &data),
        json!(["v-1", "v-2"])
    );
}

#[test]
fn single_value_becomes_one_record() {
    let data = json!({"Attributes": {"ApproximateNumberOfMessages": "17"}});
    let records = extract(
        "{value: to_number(Attributes.ApproximateNumberOfMessages)}",
        &data,
    )
    .unwrap();
    assert_eq!(records, vec![json!({"value": 17.0})]);
}

#[test]
fn counts_with_length() {
    let data = json!({"Clusters": [{"Id": "j-1"}, {"Id": "j-2"}]});
    assert_eq!(
        search("{value: length(Clusters)}", &data),
        json!({"value": 2})
    );
}

#[test]
fn missing_fields_yield_no_records() {
    let data = json!({"Other": []});
    assert!(extract("Reservations[].Instances[]", &data).unwrap().is_empty());
    assert_eq!(search("Reservations[0].Instances", &data), Value::Null);
}

#[test]
fn projection_drops_nulls() {
    let data = json!({"Items": [{"name": "a"}, {}, {"name": "c"}]});
    assert_eq!(search("Items[*].name", &data), json!(["a", "c"]));
}

#[test]
fn index_and_slice() {
    let data = json!({"Items": [1, 2, 3, 4, 5]});
    assert_eq!(search("Items[0]", &data), json!(1));
    assert_eq!(search("Items[-1]", &data), json!(5));
    assert_eq!(search("Items[1:3]", &data), json!([2, 3]));
    assert_eq!(search("Items[::2]", &data), json!([1, 3, 5]));
}

#[test]
fn object_projection_over_values() {
    let data = json!({"Counts": {"a": {"n": 1}, "b": {"n": 2}}});
    let mut values = search("Counts.*.n", &data).as_array().unwrap().clone();
    values.sort_by_key(|v| v.as_i64());
    assert_eq!(values, vec![json!(1), json!(2)]);
}

#[test]
fn pipe_stops_projection() {
    assert_eq!(
        search(
            "Reservations[].Instances[].InstanceId | [0]",
            &describe_instances()
        ),
        json!("i-1")
    );
}

#[test]
fn multi_select_list() {
    let data = json!({"a": 1, "b": 2});
    assert_eq!(search("[a, b]", &data), json!([1, 2]));
}

#[test]
fn quoted_identifiers() {
    let data = json!({"with space": {"x": 1}});
    assert_eq!(search(r#""with space".x"#, &data), json!(1));
}

#[test]
fn syntax_errors_report_position() {
    let err = Query::compile("Reservations[].{id: }").unwrap_err();
    assert!(err.position().is_some(), "{err}");
    assert!(Query::compile("a[?b").is_err());
    assert!(Query::compile("`{bad json`").is_err());
    assert!(Query::compile("").is_err());
}

#[test]
fn unknown_function_is_rejected() {
    let query = Query::compile("nope(a)");
    let failed = match query {
        Err(_) => true,
        Ok(query) => query.search(&json!({"a": 1})).is_err(),
    };
    assert!(failed);
}

#[test]
fn type_errors_fail_evaluation() {
    let query = Query::compile("length(a)").unwrap();
    let err = query.search(&json!({"a": 5})).unwrap_err();
    assert!(err.position().is_none());
}

#[test]
fn expression_text_is_kept() {
    let query = Query::compile("Clusters[].Id").unwrap();
    assert_eq!(query.expression(), "Clusters[].Id");
    assert_eq!(query.to_string(), "Clusters[].Id");
}
