//! Transaction wrapper.
//!
//! A [`Transaction`] owns a connection for the span of a unit of work. It is
//! shared as `Arc<Transaction>` so it can be attached to several queries;
//! the mutable state sits behind a mutex.

use modelql_core::error::{TransactionErrorKind, TransactionFailed};
use modelql_core::{Connection, Container, Error, Message, Record, Result};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

const DEFAULT_ROLLBACK_MESSAGE: &str = "Transaction aborted";
const ABORTED_MESSAGE: &str = "The request was aborted";

/// Receives commit and rollback notifications of managed transactions.
pub trait TransactionManager: Send + Sync {
    fn notify_commit(&self, transaction: &Transaction);

    fn notify_rollback(&self, transaction: &Transaction);
}

#[derive(Default)]
struct TransactionState {
    active: bool,
    is_new_transaction: bool,
    rollback_on_abort: bool,
    throw_rollback_exception: bool,
    rollback_record: Option<Record>,
    messages: Vec<Message>,
    manager: Option<Arc<dyn TransactionManager>>,
    abort_signal: Option<Arc<AtomicBool>>,
}

/// A unit of work on one connection.
pub struct Transaction {
    connection: Arc<dyn Connection>,
    state: Mutex<TransactionState>,
}

impl Transaction {
    pub fn new(connection: Arc<dyn Connection>, auto_begin: bool) -> Result<Self> {
        let transaction = Self {
            connection,
            state: Mutex::new(TransactionState {
                is_new_transaction: true,
                ..TransactionState::default()
            }),
        };
        if auto_begin {
            transaction.begin()?;
        }
        Ok(transaction)
    }

    /// Open a transaction on a connection service of `container`.
    pub fn from_container(container: &Container, service: &str, auto_begin: bool) -> Result<Self> {
        Self::new(container.get_connection(service)?, auto_begin)
    }

    fn state(&self) -> std::sync::MutexGuard<'_, TransactionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub fn begin(&self) -> Result<()> {
        self.connection.begin()?;
        self.state().active = true;
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub fn commit(&self) -> Result<()> {
        let manager = {
            let state = self.state();
            if !state.active {
                return Err(Error::transaction(
                    TransactionErrorKind::NotActive,
                    "There is no active transaction",
                ));
            }
            state.manager.clone()
        };
        if let Some(manager) = manager {
            manager.notify_commit(self);
        }
        self.connection.commit()?;
        self.state().active = false;
        Ok(())
    }

    /// Roll back, recording `message` (default "Transaction aborted") and the
    /// record that caused it.
    ///
    /// With [`throw_rollback_exception`](Self::throw_rollback_exception) set,
    /// a successful rollback returns `Error::TransactionFailed`.
    #[tracing::instrument(level = "debug", skip(self, record))]
    pub fn rollback(&self, message: Option<&str>, record: Option<Record>) -> Result<()> {
        let manager = self.state().manager.clone();
        if let Some(manager) = manager {
            manager.notify_rollback(self);
        }
        self.connection.rollback()?;

        let message = message.unwrap_or(DEFAULT_ROLLBACK_MESSAGE).to_string();
        let mut state = self.state();
        state.active = false;
        if record.is_some() {
            state.rollback_record = record;
        }
        let mut failure = Message::new(message.clone());
        if let Some(record) = &state.rollback_record {
            failure = failure.with_field(record.model());
        }
        state.messages.push(failure);

        if state.throw_rollback_exception {
            tracing::debug!(message = %message, "rollback raises");
            return Err(Error::TransactionFailed(TransactionFailed {
                message,
                record: state.rollback_record.clone().map(Box::new),
            }));
        }
        Ok(())
    }

    /// The transaction's connection.
    ///
    /// When rollback-on-abort is enabled and the abort signal has been
    /// raised, the transaction is rolled back first.
    pub fn get_connection(&self) -> Result<Arc<dyn Connection>> {
        let aborted = {
            let state = self.state();
            state.rollback_on_abort
                && state.active
                && state
                    .abort_signal
                    .as_ref()
                    .is_some_and(|signal| signal.load(Ordering::SeqCst))
        };
        if aborted {
            tracing::warn!("request aborted, rolling back transaction");
            self.rollback(Some(ABORTED_MESSAGE), None)?;
        }
        Ok(Arc::clone(&self.connection))
    }

    pub fn set_rollback_on_abort(&self, rollback_on_abort: bool) {
        self.state().rollback_on_abort = rollback_on_abort;
    }

    /// Flag checked by [`get_connection`](Self::get_connection); raise it to
    /// signal that the request driving this transaction went away.
    pub fn set_abort_signal(&self, signal: Arc<AtomicBool>) {
        self.state().abort_signal = Some(signal);
    }

    pub fn set_transaction_manager(&self, manager: Arc<dyn TransactionManager>) {
        self.state().manager = Some(manager);
    }

    pub fn is_managed(&self) -> bool {
        self.state().manager.is_some()
    }

    pub fn set_is_new_transaction(&self, is_new: bool) {
        self.state().is_new_transaction = is_new;
    }

    pub fn is_new_transaction(&self) -> bool {
        self.state().is_new_transaction
    }

    pub fn throw_rollback_exception(&self, enabled: bool) {
        self.state().throw_rollback_exception = enabled;
    }

    pub fn set_rollbacked_record(&self, record: Record) {
        self.state().rollback_record = Some(record);
    }

    pub fn rollbacked_record(&self) -> Option<Record> {
        self.state().rollback_record.clone()
    }

    /// Whether the connection is inside a transaction.
    pub fn is_valid(&self) -> bool {
        self.connection.is_under_transaction()
    }

    pub fn get_messages(&self) -> Vec<Message> {
        self.state().messages.clone()
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("Transaction")
            .field("db_type", &self.connection.db_type())
            .field("active", &state.active)
            .field("managed", &state.manager.is_some())
            .field("messages", &state.messages.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockConnection;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingManager {
        commits: AtomicUsize,
        rollbacks: AtomicUsize,
    }

    impl TransactionManager for CountingManager {
        fn notify_commit(&self, _transaction: &Transaction) {
            self.commits.fetch_add(1, Ordering::SeqCst);
        }

        fn notify_rollback(&self, _transaction: &Transaction) {
            self.rollbacks.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn begin_commit_notifies_manager() {
        let connection = MockConnection::new();
        let state = connection.state();
        let transaction = Transaction::new(Arc::new(connection), true).unwrap();
        let manager = Arc::new(CountingManager::default());
        transaction.set_transaction_manager(manager.clone());

        assert!(transaction.is_managed());
        assert!(transaction.is_valid());
        transaction.commit().unwrap();

        assert_eq!(manager.commits.load(Ordering::SeqCst), 1);
        let state = state.lock().unwrap();
        assert_eq!(state.begins, 1);
        assert_eq!(state.commits, 1);
    }

    #[test]
    fn commit_without_begin_fails() {
        let transaction = Transaction::new(Arc::new(MockConnection::new()), false).unwrap();
        assert!(matches!(
            transaction.commit(),
            Err(Error::Transaction(ref e)) if e.kind == TransactionErrorKind::NotActive
        ));
    }

    #[test]
    fn rollback_records_message_and_may_raise() {
        let transaction = Transaction::new(Arc::new(MockConnection::new()), true).unwrap();
        transaction.rollback(None, None).unwrap();
        assert_eq!(transaction.get_messages()[0].message, "Transaction aborted");

        transaction.begin().unwrap();
        transaction.throw_rollback_exception(true);
        let err = transaction
            .rollback(Some("Cannot save robot"), Some(Record::new("Robots")))
            .unwrap_err();
        match err {
            Error::TransactionFailed(failed) => {
                assert_eq!(failed.message, "Cannot save robot");
                assert_eq!(failed.record.unwrap().model(), "Robots");
            }
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn abort_signal_rolls_back_on_access() {
        let connection = MockConnection::new();
        let state = connection.state();
        let transaction = Transaction::new(Arc::new(connection), true).unwrap();
        let signal = Arc::new(AtomicBool::new(false));
        transaction.set_abort_signal(signal.clone());
        transaction.set_rollback_on_abort(true);

        transaction.get_connection().unwrap();
        assert_eq!(state.lock().unwrap().rollbacks, 0);

        signal.store(true, Ordering::SeqCst);
        transaction.get_connection().unwrap();
        assert_eq!(state.lock().unwrap().rollbacks, 1);
        assert_eq!(
            transaction.get_messages()[0].message,
            "The request was aborted"
        );
    }
}
