//! Records shared by the unit tests.

use rowbind_core::{ColumnValue, FieldDescriptor, Record, RecordDescriptor, Value};
use rowbind_macros::Record;

#[derive(Record)]
pub(crate) struct Credentials {
    #[record(name = "id")]
    pub id: i32,
    #[record(name = "salt")]
    pub salt: String,
    #[record(name = "passhash")]
    pub pass_hash: String,
}

#[derive(Record)]
pub(crate) struct Users {
    #[record(name = "id")]
    pub id: i32,
    #[record(name = "username")]
    pub username: String,
    #[record(name = "email")]
    pub email: String,
    #[record(name = "credentials_id", reference = "credentials")]
    pub credentials: Credentials,
    pub note: String,
}

#[derive(Record)]
#[record(table = "sessions")]
pub(crate) struct Session {
    #[record(name = "id")]
    pub id: i32,
    #[record(name = "token")]
    pub token: String,
    #[record(name = "user_id", reference = "users")]
    pub user: Users,
}

#[derive(Record)]
pub(crate) struct Empty {
    pub scratch: String,
}

/// Declares a relation to `Credentials` without a column to store its id.
/// The derive rejects this shape, so the impl is written by hand.
pub(crate) struct Device {
    pub id: i32,
    pub label: String,
    pub owner: Credentials,
}

impl Record for Device {
    fn descriptor(&self) -> &'static RecordDescriptor {
        static DESCRIPTOR: RecordDescriptor = RecordDescriptor {
            type_name: "Device",
            table: "device",
            fields: &[
                FieldDescriptor {
                    name: "id",
                    column: "id",
                    reference: None,
                    type_name: "i32",
                },
                FieldDescriptor {
                    name: "label",
                    column: "label",
                    reference: None,
                    type_name: "String",
                },
                FieldDescriptor {
                    name: "owner",
                    column: "",
                    reference: Some("credentials"),
                    type_name: "Credentials",
                },
            ],
        };
        &DESCRIPTOR
    }

    fn values(&self) -> Vec<Value> {
        vec![
            self.id.column_value(),
            self.label.column_value(),
            Value::Default,
        ]
    }

    fn relations(&self) -> Vec<&dyn Record> {
        vec![&self.owner as &dyn Record]
    }
}
