//! Protocol tests for the auth and object services.
//!
//! A scripted `Transport` answers calls in order and records what was sent,
//! so these tests pin down exact argument shapes without a server.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pretty_assertions::assert_eq;

use openerp_rpc::error::Result;
use openerp_rpc::{
    Client, Credentials, DomainItem, Fault, FieldSelection, Record, RpcError, RpcResult,
    Transport, Value,
};

#[derive(Debug, Clone, PartialEq)]
struct SentCall {
    service: String,
    method: String,
    args: Vec<Value>,
}

/// Replays canned results in order and records each call.
#[derive(Default)]
struct ScriptedTransport {
    script: Mutex<VecDeque<RpcResult>>,
    sent: Mutex<Vec<SentCall>>,
}

impl ScriptedTransport {
    fn new(script: Vec<RpcResult>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            sent: Mutex::new(Vec::new()),
        })
    }

    fn sent(&self) -> Vec<SentCall> {
        self.sent.lock().unwrap().clone()
    }

    /// Object-service calls, with the `(db, uid, password)` prefix dropped.
    fn object_calls(&self) -> Vec<Vec<Value>> {
        self.sent()
            .into_iter()
            .filter(|c| c.service == "object")
            .map(|c| c.args[3..].to_vec())
            .collect()
    }

    fn logins(&self) -> usize {
        self.sent()
            .iter()
            .filter(|c| c.service == "common" && c.method == "login")
            .count()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn call(&self, service: &str, method: &str, args: Vec<Value>) -> Result<RpcResult> {
        self.sent.lock().unwrap().push(SentCall {
            service: service.to_string(),
            method: method.to_string(),
            args,
        });
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| RpcError::Decode("script exhausted".into()))
    }
}

fn ok(value: impl Into<Value>) -> RpcResult {
    RpcResult::Success(value.into())
}

fn record(pairs: &[(&str, Value)]) -> Value {
    Value::Struct(
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect::<Record>(),
    )
}

fn client(transport: Arc<ScriptedTransport>) -> Client {
    Client::with_transport(transport, Credentials::new("acme", "admin", "x"))
}

#[tokio::test]
async fn test_login_search_read_scenario() {
    let transport = ScriptedTransport::new(vec![
        ok(7),
        ok(vec![15]),
        ok(Value::Array(vec![record(&[("name", Value::from("Doe"))])])),
    ]);
    let client = client(transport.clone());
    let object = client.object();

    let ids = object
        .search("res.partner", &[DomainItem::term("name", "=", "Doe")], 0, 1000)
        .await
        .expect("search");
    assert_eq!(ids, vec![15]);

    let records = object
        .read("res.partner", ids, &["name"])
        .await
        .expect("read");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].get("name"), Some(&Value::from("Doe")));

    let sent = transport.sent();
    assert_eq!(sent.len(), 3);
    assert_eq!(
        sent[0],
        SentCall {
            service: "common".into(),
            method: "login".into(),
            args: vec![Value::from("acme"), Value::from("admin"), Value::from("x")],
        }
    );
    assert_eq!(sent[1].service, "object");
    assert_eq!(sent[1].method, "execute");
    assert_eq!(
        sent[1].args,
        vec![
            Value::from("acme"),
            Value::Int(7),
            Value::from("x"),
            Value::from("res.partner"),
            Value::from("search"),
            Value::Array(vec![Value::from(vec!["name", "=", "Doe"])]),
            Value::Int(0),
            Value::Int(1000),
        ]
    );
    assert_eq!(
        sent[2].args[3..].to_vec(),
        vec![
            Value::from("res.partner"),
            Value::from("read"),
            Value::from(vec![15i64]),
            Value::from(vec!["name"]),
        ]
    );
}

#[tokio::test]
async fn test_lazy_login_happens_once() {
    let transport = ScriptedTransport::new(vec![ok(7), ok(vec![1, 2]), ok(vec![3])]);
    let client = client(transport.clone());

    client
        .object()
        .search("res.partner", &[], 0, 10)
        .await
        .expect("first search");
    client
        .object()
        .search("res.partner", &[], 0, 10)
        .await
        .expect("second search");

    assert_eq!(transport.logins(), 1);
    assert_eq!(transport.sent().len(), 3);
}

#[tokio::test]
async fn test_search_rewraps_bare_id() {
    let transport = ScriptedTransport::new(vec![ok(7), ok(42)]);
    let ids = client(transport)
        .object()
        .search("res.partner", &[], 0, 1000)
        .await
        .expect("search");
    assert_eq!(ids, vec![42]);
}

#[tokio::test]
async fn test_read_single_id_and_bare_record() {
    let transport = ScriptedTransport::new(vec![
        ok(7),
        ok(record(&[("id", Value::Int(15)), ("name", Value::from("Doe"))])),
    ]);
    let client = client(transport.clone());

    let records = client
        .object()
        .read("res.partner", 15i64, &[])
        .await
        .expect("read");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].get("id"), Some(&Value::Int(15)));

    let calls = transport.object_calls();
    assert_eq!(calls[0][2], Value::Array(vec![Value::Int(15)]));
    assert_eq!(calls[0][3], Value::Array(Vec::new()));
}

#[tokio::test]
async fn test_read_empty_ids_skips_network() {
    let transport = ScriptedTransport::new(vec![]);
    let records = client(transport.clone())
        .object()
        .read("res.partner", Vec::<i64>::new(), &["name"])
        .await
        .expect("read");
    assert!(records.is_empty());
    assert!(transport.sent().is_empty());
}

#[tokio::test]
async fn test_login_failure_surfaces_from_object_call() {
    let transport = ScriptedTransport::new(vec![ok(false)]);
    let client = client(transport.clone());

    let err = client
        .object()
        .search("res.partner", &[], 0, 1000)
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::AuthenticationFailed { .. }), "got {:?}", err);
    assert!(transport.object_calls().is_empty());
    assert!(!client.session().read().await.is_authenticated());
}

#[tokio::test]
async fn test_execute_fault_propagates() {
    let transport = ScriptedTransport::new(vec![
        ok(7),
        RpcResult::Fault(Fault {
            code: 0,
            message: "Object res.partnr doesn't exist".into(),
        }),
    ]);

    let err = client(transport)
        .object()
        .execute("res.partnr", "search", vec![Value::Array(Vec::new())])
        .await
        .unwrap_err();
    match err {
        RpcError::ProtocolFault { code, message } => {
            assert_eq!(code, 0);
            assert_eq!(message, "Object res.partnr doesn't exist");
        }
        other => panic!("Expected ProtocolFault, got {:?}", other),
    }
}

#[tokio::test]
async fn test_resolve_external_ids_two_modules() {
    let transport = ScriptedTransport::new(vec![
        ok(7),
        ok(vec![101, 102]),
        ok(Value::Array(vec![
            record(&[
                ("module", Value::from("base")),
                ("name", Value::from("us")),
                ("complete_name", Value::from("base.us")),
                ("res_id", Value::Int(233)),
            ]),
            record(&[
                ("module", Value::from("sale")),
                ("name", Value::from("order1")),
                ("complete_name", Value::from("sale.order1")),
                ("res_id", Value::Int(5)),
            ]),
        ])),
    ]);
    let client = client(transport.clone());

    let resolved = client
        .object()
        .resolve_external_ids("res.country", &["base.us", "sale.order1", "sale.missing"])
        .await
        .expect("resolve");

    assert_eq!(
        resolved,
        BTreeMap::from([("base.us".to_string(), 233), ("sale.order1".to_string(), 5)])
    );

    let calls = transport.object_calls();
    assert_eq!(calls[0][0], Value::from("ir.model.data"));
    assert_eq!(calls[0][1], Value::from("search"));
    assert_eq!(
        calls[0][2],
        Value::Array(vec![
            Value::from(vec!["model", "=", "res.country"]),
            Value::from("|"),
            Value::from("&"),
            Value::from(vec!["module", "=", "base"]),
            Value::Array(vec![
                Value::from("name"),
                Value::from("in"),
                Value::from(vec!["us"]),
            ]),
            Value::from("&"),
            Value::from(vec!["module", "=", "sale"]),
            Value::Array(vec![
                Value::from("name"),
                Value::from("in"),
                Value::from(vec!["order1", "missing"]),
            ]),
        ])
    );
    // Unlimited search on the mapping model.
    assert_eq!(calls[0][4], Value::Int(0));
    assert_eq!(calls[1][1], Value::from("read"));
    assert_eq!(calls[1][2], Value::from(vec![101i64, 102]));
}

#[tokio::test]
async fn test_resolve_with_no_mapping_rows_skips_read() {
    let transport = ScriptedTransport::new(vec![ok(7), ok(Value::Array(Vec::new()))]);
    let client = client(transport.clone());

    let resolved = client
        .object()
        .resolve_external_ids("res.country", &["base.nowhere"])
        .await
        .expect("resolve");

    assert!(resolved.is_empty());
    assert_eq!(transport.object_calls().len(), 1);
}

#[tokio::test]
async fn test_resolve_single_external_id() {
    let transport = ScriptedTransport::new(vec![
        ok(7),
        ok(101),
        ok(record(&[
            ("module", Value::from("")),
            ("name", Value::from("order2")),
            ("res_id", Value::Int(9)),
        ])),
    ]);

    let id = client(transport)
        .object()
        .resolve_external_id("sale.order", "order2")
        .await
        .expect("resolve");
    assert_eq!(id, Some(9));
}

#[tokio::test]
async fn test_read_by_external_ids_follows_input_order() {
    let transport = ScriptedTransport::new(vec![
        ok(7),
        ok(vec![101, 102]),
        ok(Value::Array(vec![
            record(&[
                ("module", Value::from("base")),
                ("name", Value::from("uk")),
                ("res_id", Value::Int(231)),
            ]),
            record(&[
                ("module", Value::from("base")),
                ("name", Value::from("us")),
                ("res_id", Value::Int(233)),
            ]),
        ])),
        ok(Value::Array(vec![
            record(&[("id", Value::Int(233)), ("code", Value::from("US"))]),
            record(&[("id", Value::Int(231)), ("code", Value::from("GB"))]),
        ])),
    ]);
    let client = client(transport.clone());

    let records = client
        .object()
        .read_by_external_ids("res.country", &["base.us", "base.uk"], &["code"])
        .await
        .expect("read");
    assert_eq!(records.len(), 2);

    let calls = transport.object_calls();
    assert_eq!(calls[2][0], Value::from("res.country"));
    assert_eq!(calls[2][2], Value::from(vec![233i64, 231]));
}

#[tokio::test]
async fn test_list_with_external_ids_drops_dangling_mappings() {
    let transport = ScriptedTransport::new(vec![
        ok(7),
        ok(vec![101, 102]),
        ok(Value::Array(vec![
            record(&[
                ("id", Value::Int(101)),
                ("display_name", Value::from("United States")),
                ("complete_name", Value::from("base.us")),
                ("res_id", Value::Int(233)),
            ]),
            record(&[
                ("id", Value::Int(102)),
                ("display_name", Value::from("Gone")),
                ("complete_name", Value::from("base.gone")),
                ("res_id", Value::Int(999)),
            ]),
        ])),
        // Only 233 still exists.
        ok(record(&[
            ("id", Value::Int(233)),
            ("name", Value::from("United States")),
            ("code", Value::from("US")),
        ])),
    ]);
    let client = client(transport.clone());

    let listed = client
        .object()
        .list_with_external_ids("res.country", FieldSelection::Extra(vec!["code".into()]))
        .await
        .expect("list");

    assert_eq!(listed.keys().copied().collect::<Vec<_>>(), vec![233]);
    let row = &listed[&233];
    assert_eq!(row.get("complete_name"), Some(&Value::from("base.us")));
    assert_eq!(row.get("code"), Some(&Value::from("US")));
    // Mapping row keeps its own id; the target id is res_id.
    assert_eq!(row.get("id"), Some(&Value::Int(101)));
    assert_eq!(row.get("res_id"), Some(&Value::Int(233)));

    let calls = transport.object_calls();
    assert_eq!(
        calls[0][2],
        Value::Array(vec![Value::from(vec!["model", "=", "res.country"])])
    );
    assert_eq!(calls[2][2], Value::from(vec![233i64, 999]));
    assert_eq!(calls[2][3], Value::from(vec!["id", "name", "code"]));
}

#[tokio::test]
async fn test_exists_handles_list_and_boolean_answers() {
    let transport = ScriptedTransport::new(vec![ok(7), ok(3), ok(true)]);
    let client = client(transport);

    let existing = client
        .object()
        .exists("res.partner", vec![3i64, 4])
        .await
        .expect("exists");
    assert_eq!(existing, vec![3]);

    let existing = client
        .object()
        .exists("res.partner", vec![5i64, 6])
        .await
        .expect("exists");
    assert_eq!(existing, vec![5, 6]);
}

#[tokio::test]
async fn test_create_write_unlink() {
    let transport = ScriptedTransport::new(vec![ok(7), ok(15), ok(true), ok(true)]);
    let client = client(transport.clone());
    let object = client.object();

    let mut fields = Record::new();
    fields.insert("name".into(), Value::from("Doe"));
    let id = object
        .create("res.partner", fields.clone())
        .await
        .expect("create");
    assert_eq!(id, 15);
    assert!(object.write("res.partner", id, fields).await.expect("write"));
    assert!(object.unlink("res.partner", id).await.expect("unlink"));

    let methods: Vec<Value> = transport
        .object_calls()
        .into_iter()
        .map(|args| args[1].clone())
        .collect();
    assert_eq!(
        methods,
        vec![Value::from("create"), Value::from("write"), Value::from("unlink")]
    );
}

#[tokio::test]
async fn test_get_object_reference() {
    let transport = ScriptedTransport::new(vec![
        ok(7),
        ok(Value::Array(vec![Value::from("res.country"), Value::Int(233)])),
    ]);
    let client = client(transport.clone());

    let reference = client
        .object()
        .get_object_reference("base.us")
        .await
        .expect("reference");
    assert_eq!(reference, ("res.country".to_string(), 233));

    let calls = transport.object_calls();
    assert_eq!(
        calls[0],
        vec![
            Value::from("ir.model.data"),
            Value::from("get_object_reference"),
            Value::from("base"),
            Value::from("us"),
        ]
    );
}

#[tokio::test]
async fn test_read_as_typed_records() {
    #[derive(serde::Deserialize, Debug, PartialEq)]
    struct Partner {
        id: i64,
        name: String,
    }

    let transport = ScriptedTransport::new(vec![
        ok(7),
        ok(Value::Array(vec![record(&[
            ("id", Value::Int(15)),
            ("name", Value::from("Doe")),
        ])])),
    ]);

    let partners: Vec<Partner> = client(transport)
        .object()
        .read_as("res.partner", 15i64, &["name"])
        .await
        .expect("read_as");
    assert_eq!(
        partners,
        vec![Partner {
            id: 15,
            name: "Doe".into()
        }]
    );
}

#[tokio::test]
async fn test_new_credentials_force_a_new_login() {
    let transport = ScriptedTransport::new(vec![ok(7), ok(vec![1]), ok(8), ok(vec![2])]);
    let client = client(transport.clone());

    client
        .object()
        .search("res.partner", &[], 0, 10)
        .await
        .expect("search");
    client
        .set_credentials(Credentials::new("acme", "demo", "y"))
        .await;
    client
        .object()
        .search("res.partner", &[], 0, 10)
        .await
        .expect("search");

    assert_eq!(transport.logins(), 2);
    let sent = transport.sent();
    assert_eq!(sent[3].args[1], Value::Int(8));
    assert_eq!(sent[3].args[2], Value::from("y"));
}

#[tokio::test]
async fn test_distinct_field_get_argument_order() {
    let transport = ScriptedTransport::new(vec![
        ok(7),
        ok(vec!["Brussels", "Paris"]),
        ok(Value::Array(Vec::new())),
    ]);
    let client = client(transport.clone());
    let object = client.object();
    let active = [DomainItem::term("active", "=", true)];

    let values = object
        .distinct_field_get(
            "res.partner",
            "city",
            "Par",
            Some(&active[..]),
            5,
            Some(20),
        )
        .await
        .expect("distinct_field_get");
    assert_eq!(values, Value::from(vec!["Brussels", "Paris"]));

    object
        .distinct_field_get("res.partner", "city", "", None, 0, None)
        .await
        .expect("distinct_field_get");

    let calls = transport.object_calls();
    assert_eq!(
        calls[0],
        vec![
            Value::from("res.partner"),
            Value::from("distinct_field_get"),
            Value::from("city"),
            Value::from("Par"),
            Value::Array(vec![Value::Array(vec![
                Value::from("active"),
                Value::from("="),
                Value::Bool(true),
            ])]),
            Value::Int(5),
            Value::Int(20),
        ]
    );
    assert_eq!(
        calls[1][2..].to_vec(),
        vec![
            Value::from("city"),
            Value::from(""),
            Value::Nil,
            Value::Int(0),
            Value::Nil,
        ]
    );
}
