//! Scripted in-memory driver for unit tests.

use crate::config::ConnectionConfig;
use crate::driver::{Driver, DriverError, QueryOutput, RawConnection};
use crate::row::Row;
use crate::value::Value;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Default)]
struct Script {
    executed: Vec<String>,
    connects: usize,
    closes: usize,
    connect_failures: VecDeque<DriverError>,
    query_failures: VecDeque<(String, DriverError)>,
    responses: Vec<(String, QueryOutput)>,
}

/// Records every statement and answers from a script.
///
/// Responses and failures match when the SQL contains their pattern.
#[derive(Clone, Default)]
pub(crate) struct ScriptedDriver {
    script: Arc<Mutex<Script>>,
}

impl ScriptedDriver {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Answer statements containing `pattern` with `output`. First match wins.
    pub(crate) fn respond(&self, pattern: &str, output: QueryOutput) -> &Self {
        self.lock().responses.push((pattern.to_string(), output));
        self
    }

    /// Answer statements containing `pattern` with a result set.
    pub(crate) fn respond_rows(&self, pattern: &str, rows: Vec<Row>) -> &Self {
        self.respond(pattern, QueryOutput::rows(rows))
    }

    /// Fail the next statement containing `pattern`. Failures are consumed in order.
    pub(crate) fn fail_next(&self, pattern: &str, err: DriverError) -> &Self {
        self.lock()
            .query_failures
            .push_back((pattern.to_string(), err));
        self
    }

    pub(crate) fn fail_connect(&self, err: DriverError) -> &Self {
        self.lock().connect_failures.push_back(err);
        self
    }

    pub(crate) fn executed(&self) -> Vec<String> {
        self.lock().executed.clone()
    }

    /// Executed statements, session setup excluded.
    pub(crate) fn statements(&self) -> Vec<String> {
        self.lock()
            .executed
            .iter()
            .filter(|sql| !sql.starts_with("SET NAMES") && !sql.starts_with("SET time_zone"))
            .cloned()
            .collect()
    }

    pub(crate) fn count_matching(&self, pattern: &str) -> usize {
        self.lock()
            .executed
            .iter()
            .filter(|sql| sql.contains(pattern))
            .count()
    }

    pub(crate) fn connects(&self) -> usize {
        self.lock().connects
    }

    pub(crate) fn closes(&self) -> usize {
        self.lock().closes
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Driver for ScriptedDriver {
    type Conn = ScriptedConnection;

    fn connect(
        &self,
        _config: &ConnectionConfig,
    ) -> impl Future<Output = Result<Self::Conn, DriverError>> + Send {
        let result = {
            let mut script = self.lock();
            match script.connect_failures.pop_front() {
                Some(err) => Err(err),
                None => {
                    script.connects += 1;
                    Ok(ScriptedConnection {
                        script: self.script.clone(),
                    })
                }
            }
        };
        async move { result }
    }
}

pub(crate) struct ScriptedConnection {
    script: Arc<Mutex<Script>>,
}

impl RawConnection for ScriptedConnection {
    fn query(&mut self, sql: &str) -> impl Future<Output = Result<QueryOutput, DriverError>> + Send {
        let result = {
            let mut script = self
                .script
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            script.executed.push(sql.to_string());

            let fails = script
                .query_failures
                .front()
                .is_some_and(|(pattern, _)| sql.contains(pattern.as_str()));
            let failure = if fails {
                script.query_failures.pop_front().map(|(_, err)| err)
            } else {
                None
            };
            match failure {
                Some(err) => Err(err),
                None => Ok(script
                    .responses
                    .iter()
                    .find(|(pattern, _)| sql.contains(pattern.as_str()))
                    .map(|(_, output)| output.clone())
                    .unwrap_or_default()),
            }
        };
        async move { result }
    }

    fn close(self) -> impl Future<Output = Result<(), DriverError>> + Send {
        self.script
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .closes += 1;
        async { Ok(()) }
    }
}

/// Rows with the given column holding `values`.
pub(crate) fn rows_of(column: &str, values: &[i64]) -> Vec<Row> {
    values
        .iter()
        .map(|v| Row::from_pairs([(column, Value::Int(*v))]))
        .collect()
}
