//! Statement attempt events.
//!
//! A [`SqlEvent`] is built fresh for every firewall evaluation and every
//! refusal-trigger call. It is never mutated after `build()`; consumers only
//! get read access through the accessors.

use serde::Serialize;

/// Identity of the remote caller issuing a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Caller {
    /// Authenticated username.
    pub username: String,
    /// Remote IP address as seen by the transport.
    pub ip_address: String,
}

impl Caller {
    pub fn new(username: impl Into<String>, ip_address: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ip_address: ip_address.into(),
        }
    }
}

/// Audit-relevant facts of one statement attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SqlEvent {
    username: String,
    database: String,
    ip_address: String,
    sql: String,
    is_prepared_statement: bool,
    parameter_values: Vec<String>,
    is_metadata_query: bool,
}

impl SqlEvent {
    /// Start building an event for `caller` against `database`.
    pub fn builder(caller: &Caller, database: impl Into<String>) -> SqlEventBuilder {
        SqlEventBuilder {
            event: SqlEvent {
                username: caller.username.clone(),
                database: database.into(),
                ip_address: caller.ip_address.clone(),
                sql: String::new(),
                is_prepared_statement: false,
                parameter_values: Vec::new(),
                is_metadata_query: false,
            },
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn ip_address(&self) -> &str {
        &self.ip_address
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn is_prepared_statement(&self) -> bool {
        self.is_prepared_statement
    }

    /// Parameter values in index order, in their wire form.
    pub fn parameter_values(&self) -> &[String] {
        &self.parameter_values
    }

    pub fn is_metadata_query(&self) -> bool {
        self.is_metadata_query
    }

    /// Caller identity the event was built for.
    pub fn caller(&self) -> Caller {
        Caller::new(self.username.clone(), self.ip_address.clone())
    }
}

/// Builder for [`SqlEvent`].
#[derive(Debug)]
pub struct SqlEventBuilder {
    event: SqlEvent,
}

impl SqlEventBuilder {
    pub fn sql(mut self, sql: impl Into<String>) -> Self {
        self.event.sql = sql.into();
        self
    }

    pub fn prepared_statement(mut self, prepared: bool) -> Self {
        self.event.is_prepared_statement = prepared;
        self
    }

    pub fn parameter_values(mut self, values: Vec<String>) -> Self {
        self.event.parameter_values = values;
        self
    }

    pub fn metadata_query(mut self, metadata: bool) -> Self {
        self.event.is_metadata_query = metadata;
        self
    }

    pub fn build(self) -> SqlEvent {
        self.event
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_builder() {
        let caller = Caller::new("alice", "10.0.0.7");
        let event = SqlEvent::builder(&caller, "sales")
            .sql("SELECT * FROM customer WHERE customer_id = ?")
            .prepared_statement(true)
            .parameter_values(vec!["42".to_string()])
            .build();

        assert_eq!(event.username(), "alice");
        assert_eq!(event.database(), "sales");
        assert_eq!(event.ip_address(), "10.0.0.7");
        assert!(event.is_prepared_statement());
        assert!(!event.is_metadata_query());
        assert_eq!(event.parameter_values(), ["42".to_string()]);
        assert_eq!(event.caller(), caller);
    }

    #[test]
    fn test_event_serializes_all_fields() {
        let caller = Caller::new("bob", "127.0.0.1");
        let event = SqlEvent::builder(&caller, "db").sql("DELETE FROM t").build();
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["username"], "bob");
        assert_eq!(json["sql"], "DELETE FROM t");
        assert_eq!(json["is_prepared_statement"], false);
        assert!(json["parameter_values"].as_array().unwrap().is_empty());
    }
}
