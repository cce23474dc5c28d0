use rowbind_core::{Record, Value};
use rowbind_macros::Record;
use std::time::SystemTime;

#[derive(Record)]
struct Credentials {
    #[record(name = "id")]
    id: i32,
    #[record(name = "salt")]
    salt: String,
    #[record(name = "passhash")]
    pass_hash: String,
    #[record(name = "created_at")]
    created_at: SystemTime,
}

#[derive(Record)]
struct Users {
    #[record(name = "id")]
    id: i32,
    #[record(name = "username")]
    username: String,
    #[record(name = "email")]
    email: String,
    #[record(name = "credentials_id", reference = "credentials")]
    credentials: Credentials,
    nickname: String,
}

/// Scratch state a record carries but never stores.
#[derive(Debug, Default)]
struct LoginAttempts {
    recent: Vec<SystemTime>,
}

#[derive(Record)]
#[record(table = "devices")]
struct Device {
    #[record(name = "label")]
    label: String,
    attempts: LoginAttempts,
}

#[derive(Record)]
#[record(table = "audit_log")]
struct AuditEntry {
    #[record(name = "message")]
    message: String,
    #[record(name = "attempts")]
    attempts: Option<i64>,
}

fn credentials() -> Credentials {
    Credentials {
        id: 0,
        salt: "s@lt".to_string(),
        pass_hash: String::new(),
        created_at: SystemTime::now(),
    }
}

#[test]
fn descriptor_lists_fields_in_declaration_order() {
    let user = Users {
        id: 0,
        username: "alice".to_string(),
        email: "alice@example.com".to_string(),
        credentials: credentials(),
        nickname: "al".to_string(),
    };
    let desc = user.descriptor();

    assert_eq!(desc.type_name, "Users");
    assert_eq!(desc.table, "users");
    let columns: Vec<_> = desc.fields.iter().map(|f| f.column).collect();
    assert_eq!(
        columns,
        vec!["id", "username", "email", "credentials_id", ""]
    );
    assert_eq!(desc.fields[3].reference, Some("credentials"));
    assert_eq!(desc.fields[3].type_name, "Credentials");
    assert!(desc.fields[4].reference.is_none());
}

#[test]
fn values_follow_the_default_rule() {
    let user = Users {
        id: 0,
        username: "alice".to_string(),
        email: String::new(),
        credentials: credentials(),
        nickname: "al".to_string(),
    };
    assert_eq!(
        user.values(),
        vec![
            Value::Default,
            Value::Text("alice".to_string()),
            Value::Default,
            Value::Default,
            Value::Default,
        ]
    );
    assert_eq!(user.values().len(), user.descriptor().fields.len());

    let creds = credentials();
    assert_eq!(
        creds.values(),
        vec![
            Value::Default,
            Value::Text("s@lt".to_string()),
            Value::Default,
            Value::Default,
        ]
    );
}

#[test]
fn relations_expose_nested_records() {
    let user = Users {
        id: 0,
        username: "alice".to_string(),
        email: "alice@example.com".to_string(),
        credentials: credentials(),
        nickname: String::new(),
    };
    let relations = user.relations();
    assert_eq!(relations.len(), 1);
    assert_eq!(relations[0].descriptor().type_name, "Credentials");
    assert!(credentials().relations().is_empty());
}

#[test]
fn explicit_table_name_and_optional_fields() {
    let entry = AuditEntry {
        message: "login".to_string(),
        attempts: Some(3),
    };
    assert_eq!(entry.descriptor().table, "audit_log");
    assert_eq!(
        entry.values(),
        vec![Value::Text("login".to_string()), Value::BigInt(3)]
    );

    let empty = AuditEntry {
        message: String::new(),
        attempts: None,
    };
    assert_eq!(empty.values(), vec![Value::Default, Value::Default]);
}

#[test]
fn untagged_fields_need_not_be_column_values() {
    let device = Device {
        label: "phone".to_string(),
        attempts: LoginAttempts {
            recent: vec![SystemTime::now()],
        },
    };
    assert_eq!(device.attempts.recent.len(), 1);
    assert_eq!(device.descriptor().fields[1].column, "");
    assert_eq!(device.descriptor().fields[1].type_name, "LoginAttempts");
    assert_eq!(
        device.values(),
        vec![Value::Text("phone".to_string()), Value::Default]
    );
}
