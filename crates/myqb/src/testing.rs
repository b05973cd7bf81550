//! Scripted in-memory driver for unit tests.

use crate::client::{ColumnMeta, ColumnType, Connection, Connector, Outcome, RowCursor};
use crate::config::ConnectionProfile;
use crate::error::DriverError;
use crate::value::{Params, Value};
use std::collections::VecDeque;
use std::future::{Future, ready};
use std::sync::{Arc, Mutex};

/// Driver calls, in the order they happened.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Connect(String),
    Execute { sql: String, params: Vec<Value> },
    Unprepared(String),
    Autocommit(bool),
    Commit,
    Rollback,
    Ping,
    Charset(String),
    StoreResult,
}

enum Reply {
    Done { affected_rows: u64, insert_id: u64 },
    Rows { columns: Vec<ColumnMeta>, rows: Vec<Vec<Value>> },
    Fail(DriverError),
}

#[derive(Default)]
struct MockState {
    calls: Vec<Call>,
    replies: VecDeque<Reply>,
    connect_failures: VecDeque<DriverError>,
    ping_failure: Option<DriverError>,
}

/// Statements take queued replies in order; with nothing queued they
/// succeed with no rows and no affected rows.
#[derive(Clone, Default)]
pub(crate) struct MockConnector {
    state: Arc<Mutex<MockState>>,
}

impl MockConnector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_ok(&self, affected_rows: u64, insert_id: u64) -> &Self {
        self.lock().replies.push_back(Reply::Done {
            affected_rows,
            insert_id,
        });
        self
    }

    /// Queue a result set whose columns carry no table and a string type.
    pub(crate) fn push_rows(&self, columns: &[&str], rows: Vec<Vec<Value>>) -> &Self {
        let columns = columns
            .iter()
            .map(|name| ColumnMeta::new(*name, "", ColumnType::String))
            .collect();
        self.push_rows_meta(columns, rows)
    }

    pub(crate) fn push_rows_meta(&self, columns: Vec<ColumnMeta>, rows: Vec<Vec<Value>>) -> &Self {
        self.lock().replies.push_back(Reply::Rows { columns, rows });
        self
    }

    pub(crate) fn push_error(&self, code: u32, message: &str) -> &Self {
        self.lock()
            .replies
            .push_back(Reply::Fail(DriverError::new(code, message)));
        self
    }

    pub(crate) fn fail_next_connect(&self, code: u32, message: &str) -> &Self {
        self.lock()
            .connect_failures
            .push_back(DriverError::new(code, message));
        self
    }

    pub(crate) fn fail_ping(&self, code: u32, message: &str) -> &Self {
        self.lock().ping_failure = Some(DriverError::new(code, message));
        self
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// SQL of every prepared or unprepared statement.
    pub(crate) fn executed(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::Execute { sql, .. } | Call::Unprepared(sql) => Some(sql.clone()),
                _ => None,
            })
            .collect()
    }

    /// Parameters of the last prepared statement.
    pub(crate) fn last_params(&self) -> Vec<Value> {
        self.lock()
            .calls
            .iter()
            .rev()
            .find_map(|call| match call {
                Call::Execute { params, .. } => Some(params.clone()),
                _ => None,
            })
            .unwrap_or_default()
    }

    pub(crate) fn connects(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| matches!(call, Call::Connect(_)))
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }
}

impl Connector for MockConnector {
    type Conn = MockConnection;

    fn connect(
        &self,
        profile: &ConnectionProfile,
    ) -> impl Future<Output = Result<MockConnection, DriverError>> + Send {
        let mut state = self.lock();
        state.calls.push(Call::Connect(profile.db.clone()));
        let result = match state.connect_failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(MockConnection {
                state: Arc::clone(&self.state),
            }),
        };
        ready(result)
    }
}

pub(crate) struct MockConnection {
    state: Arc<Mutex<MockState>>,
}

impl MockConnection {
    fn run(&mut self, call: Call) -> Result<Outcome<MockCursor>, DriverError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        match state.replies.pop_front() {
            None => Ok(Outcome::done(0, 0)),
            Some(Reply::Done {
                affected_rows,
                insert_id,
            }) => Ok(Outcome::done(affected_rows, insert_id)),
            Some(Reply::Rows { columns, rows }) => Ok(Outcome::rows(MockCursor {
                state: Arc::clone(&self.state),
                columns,
                rows: rows.into(),
            })),
            Some(Reply::Fail(err)) => Err(err),
        }
    }

    fn record(&mut self, call: Call) {
        self.state.lock().unwrap().calls.push(call);
    }
}

impl Connection for MockConnection {
    type Cursor = MockCursor;

    fn execute(
        &mut self,
        sql: &str,
        params: &Params,
    ) -> impl Future<Output = Result<Outcome<MockCursor>, DriverError>> + Send {
        ready(self.run(Call::Execute {
            sql: sql.to_string(),
            params: params.values().to_vec(),
        }))
    }

    fn execute_unprepared(
        &mut self,
        sql: &str,
    ) -> impl Future<Output = Result<Outcome<MockCursor>, DriverError>> + Send {
        ready(self.run(Call::Unprepared(sql.to_string())))
    }

    fn set_autocommit(&mut self, enabled: bool) -> impl Future<Output = Result<(), DriverError>> + Send {
        self.record(Call::Autocommit(enabled));
        ready(Ok(()))
    }

    fn commit(&mut self) -> impl Future<Output = Result<(), DriverError>> + Send {
        self.record(Call::Commit);
        ready(Ok(()))
    }

    fn rollback(&mut self) -> impl Future<Output = Result<(), DriverError>> + Send {
        self.record(Call::Rollback);
        ready(Ok(()))
    }

    fn ping(&mut self) -> impl Future<Output = Result<(), DriverError>> + Send {
        self.record(Call::Ping);
        let failure = self.state.lock().unwrap().ping_failure.take();
        ready(failure.map_or(Ok(()), Err))
    }

    fn set_charset(&mut self, charset: &str) -> impl Future<Output = Result<(), DriverError>> + Send {
        self.record(Call::Charset(charset.to_string()));
        ready(Ok(()))
    }
}

pub(crate) struct MockCursor {
    state: Arc<Mutex<MockState>>,
    columns: Vec<ColumnMeta>,
    rows: VecDeque<Vec<Value>>,
}

impl RowCursor for MockCursor {
    fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    fn store_result(&mut self) -> impl Future<Output = Result<(), DriverError>> + Send {
        self.state.lock().unwrap().calls.push(Call::StoreResult);
        ready(Ok(()))
    }

    fn fetch(&mut self) -> impl Future<Output = Result<Option<Vec<Value>>, DriverError>> + Send {
        ready(Ok(self.rows.pop_front()))
    }
}

/// Profile that is addressable and uses database `app`.
pub(crate) fn profile() -> ConnectionProfile {
    ConnectionProfile::new("localhost", "root", "secret", "app")
}
