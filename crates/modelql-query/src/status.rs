//! Outcome of INSERT, UPDATE and DELETE statements.

use modelql_core::{Message, Record};

/// Whether a mutation succeeded, with the record involved.
///
/// A failed UPDATE or DELETE carries the record that refused the write; its
/// messages explain why.
#[derive(Debug, Clone, PartialEq)]
pub struct Status {
    success: bool,
    record: Option<Record>,
}

impl Status {
    pub fn new(success: bool, record: Option<Record>) -> Self {
        Self { success, record }
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn record(&self) -> Option<&Record> {
        self.record.as_ref()
    }

    pub fn into_record(self) -> Option<Record> {
        self.record
    }

    /// Messages of the record, empty when there is none.
    pub fn get_messages(&self) -> Vec<Message> {
        self.record
            .as_ref()
            .map(|record| record.messages().to_vec())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_come_from_the_record() {
        let mut record = Record::new("Robots");
        record.append_message(Message::new("Name is required").with_field("name"));
        let status = Status::new(false, Some(record));
        assert!(!status.success());
        assert_eq!(status.get_messages().len(), 1);
        assert!(Status::new(true, None).get_messages().is_empty());
    }
}
